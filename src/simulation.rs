//! Synthetic straight tracks through a misaligned telescope.
//!
//! Each event holds one track with a uniform entry point and Gaussian
//! slopes. On plane `i` at `z_i` the measured hit is
//!
//! ```text
//! x = x0 + N(0, σ) + shift_x_i + z_i·tan(slope_x) − γ_i·y0 − β_i·z_i
//! y = y0 + N(0, σ) + shift_y_i + z_i·tan(slope_y) + γ_i·x0 − α_i·z_i
//! ```
//!
//! Positions are produced directly in micrometres; no pre-alignment is
//! applied. Simulated events exercise the finder, the fit and the record
//! emitter with known misalignments.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Uniform};

use crate::config::SimulationConfig;
use crate::error::ConfigError;
use crate::hit::{Hit, PlaneHits};

/// True parameters of a simulated track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrueTrack {
    pub x0: f64,
    pub y0: f64,
    pub slope_x: f64,
    pub slope_y: f64,
}

/// Generator of single-track events.
#[derive(Debug)]
pub struct TrackSimulator<R: Rng> {
    config: SimulationConfig,
    n_planes: usize,
    entry: Uniform<f64>,
    slope_x: Normal<f64>,
    slope_y: Normal<f64>,
    smear: Normal<f64>,
    rng: R,
}

impl TrackSimulator<StdRng> {
    /// Simulator seeded from `config.seed`, or from the OS if unset.
    pub fn from_config(config: SimulationConfig, n_planes: usize) -> Result<Self, ConfigError> {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self::new(config, n_planes, rng)
    }
}

impl<R: Rng> TrackSimulator<R> {
    pub fn new(config: SimulationConfig, n_planes: usize, rng: R) -> Result<Self, ConfigError> {
        config.validate(n_planes)?;

        let width = |name: &'static str, value: f64| ConfigError::InvalidWidth { name, value };
        let half = config.beam_half_width;
        let entry = Uniform::new_inclusive(-half, half)
            .map_err(|_| width("simulation.beam_half_width", half))?;
        let slope_x = Normal::new(0.0, config.x_track_slope)
            .map_err(|_| width("simulation.x_track_slope", config.x_track_slope))?;
        let slope_y = Normal::new(0.0, config.y_track_slope)
            .map_err(|_| width("simulation.y_track_slope", config.y_track_slope))?;
        let smear = Normal::new(0.0, config.sensor_resolution)
            .map_err(|_| ConfigError::InvalidResolution(config.sensor_resolution))?;

        Ok(Self {
            config,
            n_planes,
            entry,
            slope_x,
            slope_y,
            smear,
            rng,
        })
    }

    pub fn n_planes(&self) -> usize {
        self.n_planes
    }

    /// Fit resolution of every plane for simulated hits.
    pub fn resolution(&self) -> Vec<f64> {
        vec![self.config.sensor_resolution; self.n_planes]
    }

    /// Draw the next track.
    pub fn next_track(&mut self) -> TrueTrack {
        TrueTrack {
            x0: self.entry.sample(&mut self.rng),
            y0: self.entry.sample(&mut self.rng),
            slope_x: self.slope_x.sample(&mut self.rng),
            slope_y: self.slope_y.sample(&mut self.rng),
        }
    }

    /// Measured hits of `track`, one per plane.
    pub fn measure(&mut self, track: &TrueTrack) -> PlaneHits {
        let c = &self.config;
        let mut hits = PlaneHits::new(self.n_planes);
        for i in 0..self.n_planes {
            let z = c.z_positions[i];
            let x = track.x0
                + self.smear.sample(&mut self.rng)
                + c.x_shifts[i]
                + z * track.slope_x.tan()
                - c.gamma[i] * track.y0
                - c.beta[i] * z;
            let y = track.y0
                + self.smear.sample(&mut self.rng)
                + c.y_shifts[i]
                + z * track.slope_y.tan()
                + c.gamma[i] * track.x0
                - c.alpha[i] * z;
            hits.push(Hit::new(x, y, z, i));
        }
        hits
    }

    /// One simulated event with its true track.
    pub fn simulate_event(&mut self) -> (PlaneHits, TrueTrack) {
        let track = self.next_track();
        (self.measure(&track), track)
    }
}
