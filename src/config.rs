//! Run-level configuration.
//!
//! A [`RunConfig`] is fixed for the lifetime of a run. It can be built in
//! code (all fields are public, [`Default`] carries the standard values) or
//! loaded from a TOML file:
//!
//! ```toml
//! resolution = 3.0
//! distance_max = 2000.0
//! align_mode = "shift+rotation"
//! sensor_ids = [0, 1, 2, 3, 4, 5]
//!
//! [[plane_transforms]]
//! off_x = 12.0
//! off_y = -4.5
//! theta_x = 0.0
//! theta_y = 0.0
//! theta_z = 0.0013
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, Result};
use crate::geometry::{PlaneTransform, SensorLayout, TelescopeGeometry};
use crate::input::RunHeader;

/// Global parameter basis used for the alignment records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AlignMode {
    /// Shifts in x and y per plane (2 global parameters per plane).
    ShiftOnly,
    /// Shifts in x and y plus a rotation about z (3 global parameters per plane).
    ShiftAndRotation,
}

impl AlignMode {
    /// Number of global parameters each plane contributes.
    pub fn params_per_plane(&self) -> usize {
        match self {
            AlignMode::ShiftOnly => 2,
            AlignMode::ShiftAndRotation => 3,
        }
    }

    /// Canonical configuration name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignMode::ShiftOnly => "shift-only",
            AlignMode::ShiftAndRotation => "shift+rotation",
        }
    }
}

impl FromStr for AlignMode {
    type Err = ConfigError;

    /// Accepts the canonical names and the legacy numeric codes
    /// (`1` = shifts + rotation, `2` = shifts only).
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shift-only" | "shift_only" | "2" => Ok(AlignMode::ShiftOnly),
            "shift+rotation" | "shift_and_rotation" | "1" => Ok(AlignMode::ShiftAndRotation),
            _ => Err(ConfigError::UnknownAlignMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for AlignMode {
    type Error = ConfigError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AlignMode> for String {
    fn from(mode: AlignMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for AlignMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the per-event track candidates come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputMode {
    /// Hits are read and candidates built by the distance-cut finder.
    #[default]
    Hits,
    /// Candidates are taken from tracks fitted by an upstream processor.
    PrefitTracks,
    /// Hits are generated internally (see [`SimulationConfig`]) and run
    /// through the finder.
    Simulation,
}

/// Per-plane residual window. Units are micrometres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResidualBounds {
    pub x_min: Vec<f64>,
    pub x_max: Vec<f64>,
    pub y_min: Vec<f64>,
    pub y_max: Vec<f64>,
}

impl Default for ResidualBounds {
    fn default() -> Self {
        Self {
            x_min: vec![0.0; 6],
            x_max: vec![0.0; 6],
            y_min: vec![0.0; 6],
            y_max: vec![0.0; 6],
        }
    }
}

impl ResidualBounds {
    /// The same symmetric window `[-half_width, half_width]` on every plane and axis.
    pub fn symmetric(n_planes: usize, half_width: f64) -> Self {
        Self {
            x_min: vec![-half_width; n_planes],
            x_max: vec![half_width; n_planes],
            y_min: vec![-half_width; n_planes],
            y_max: vec![half_width; n_planes],
        }
    }

    fn validate(&self, n_planes: usize) -> std::result::Result<(), ConfigError> {
        for (name, v) in [
            ("residual_cuts.x_min", &self.x_min),
            ("residual_cuts.x_max", &self.x_max),
            ("residual_cuts.y_min", &self.y_min),
            ("residual_cuts.y_max", &self.y_max),
        ] {
            check_len(name, v.len(), n_planes)?;
        }
        Ok(())
    }
}

/// Parameters of the built-in track simulation.
///
/// Lengths in micrometres, angles in radians.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Gaussian smearing applied to each simulated hit; also used as the
    /// per-plane fit resolution for simulated events.
    pub sensor_resolution: f64,
    /// Width of the Gaussian track-slope distribution in x.
    pub x_track_slope: f64,
    /// Width of the Gaussian track-slope distribution in y.
    pub y_track_slope: f64,
    /// Half-width of the uniform entry-point distribution in x and y.
    pub beam_half_width: f64,
    pub z_positions: Vec<f64>,
    /// True x misalignment of each plane.
    pub x_shifts: Vec<f64>,
    /// True y misalignment of each plane.
    pub y_shifts: Vec<f64>,
    /// True rotation of each plane about z.
    pub gamma: Vec<f64>,
    /// True rotation of each plane about x.
    pub alpha: Vec<f64>,
    /// True rotation of each plane about y.
    pub beta: Vec<f64>,
    /// RNG seed; unset draws one from the OS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            sensor_resolution: 3.0,
            x_track_slope: 0.0005,
            y_track_slope: 0.0005,
            beam_half_width: 3500.0,
            z_positions: vec![20000.0, 40000.0, 60000.0, 80000.0, 100000.0, 120000.0],
            x_shifts: vec![0.0; 6],
            y_shifts: vec![0.0; 6],
            gamma: vec![0.0; 6],
            alpha: vec![0.0; 6],
            beta: vec![0.0; 6],
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Check widths, resolution and per-plane array lengths.
    pub fn validate(&self, n_planes: usize) -> std::result::Result<(), ConfigError> {
        check_resolution(self.sensor_resolution)?;
        for (name, width) in [
            ("simulation.x_track_slope", self.x_track_slope),
            ("simulation.y_track_slope", self.y_track_slope),
            ("simulation.beam_half_width", self.beam_half_width),
        ] {
            if !(width.is_finite() && width >= 0.0) {
                return Err(ConfigError::InvalidWidth { name, value: width });
            }
        }
        for (name, v) in [
            ("simulation.z_positions", &self.z_positions),
            ("simulation.x_shifts", &self.x_shifts),
            ("simulation.y_shifts", &self.y_shifts),
            ("simulation.gamma", &self.gamma),
            ("simulation.alpha", &self.alpha),
            ("simulation.beta", &self.beta),
        ] {
            check_len(name, v.len(), n_planes)?;
        }
        Ok(())
    }
}

/// Plane-to-plane hit correlation histograms (see [`crate::correlation`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    pub enabled: bool,
    /// Bins per axis.
    pub n_bins: usize,
    /// Both axes span `[-half_range, half_range)` micrometres.
    pub half_range: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            n_bins: 100,
            half_range: 7000.0,
        }
    }
}

impl CorrelationConfig {
    fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.n_bins == 0 || !(self.half_range.is_finite() && self.half_range > 0.0) {
            return Err(ConfigError::InvalidCorrelationBinning {
                n_bins: self.n_bins,
                half_range: self.half_range,
            });
        }
        Ok(())
    }
}

/// Configuration of one alignment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Source of track candidates.
    pub input_mode: InputMode,
    /// Sensor IDs in plane order. The plane count of the run is the length
    /// of this list.
    pub sensor_ids: Vec<i32>,
    /// Geometry identifier expected in run headers.
    pub geometry_id: i32,
    /// Single-plane resolution in micrometres. Used as the fit weight of
    /// every plane and as the sigma of every alignment record.
    pub resolution: f64,
    /// Maximum transverse distance between hits on consecutive planes,
    /// per 10 cm (100000 µm) of plane separation.
    pub distance_max: f64,
    /// Upper bound on track candidates per event.
    pub max_track_candidates: usize,
    /// 1-based index of a plane left out of the fit; 0 uses all planes.
    pub exclude_plane: usize,
    pub align_mode: AlignMode,
    /// Apply [`RunConfig::residual_cuts`] to fitted tracks.
    pub use_residual_cuts: bool,
    /// Build candidates only if every plane holds exactly one hit.
    pub only_single_hit_events: bool,
    /// Fit candidates only if the event yields exactly one candidate.
    pub only_single_track_events: bool,
    /// Pre-alignment constants for planes 1, 2, ...
    pub plane_transforms: Vec<PlaneTransform>,
    pub residual_cuts: ResidualBounds,
    pub simulation: SimulationConfig,
    pub correlation: CorrelationConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input_mode: InputMode::Hits,
            sensor_ids: (0..6).collect(),
            geometry_id: 0,
            resolution: 3.0,
            distance_max: 2000.0,
            max_track_candidates: 2000,
            exclude_plane: 0,
            align_mode: AlignMode::ShiftOnly,
            use_residual_cuts: false,
            only_single_hit_events: false,
            only_single_track_events: false,
            plane_transforms: Vec::new(),
            residual_cuts: ResidualBounds::default(),
            simulation: SimulationConfig::default(),
            correlation: CorrelationConfig::default(),
        }
    }
}

impl RunConfig {
    /// Parse a configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Number of planes in the stack.
    pub fn n_planes(&self) -> usize {
        self.sensor_ids.len()
    }

    /// 0-based excluded plane, if any.
    pub fn excluded_plane(&self) -> Option<usize> {
        self.exclude_plane.checked_sub(1)
    }

    /// Build the geometry described by this configuration.
    pub fn geometry(&self) -> std::result::Result<TelescopeGeometry, ConfigError> {
        let layout = SensorLayout::new(self.sensor_ids.clone())?;
        Ok(TelescopeGeometry::new(layout, self.plane_transforms.clone()))
    }

    /// Check a run header against this configuration.
    ///
    /// A plane-count mismatch is fatal. A different geometry ID is only
    /// reported.
    pub fn check_run_header(&self, header: &RunHeader) -> Result<()> {
        let n_planes = self.n_planes();
        if header.detector_count != n_planes {
            return Err(ConfigError::PlaneCountMismatch {
                header: header.detector_count,
                geometry: n_planes,
            }
            .into());
        }
        if header.geometry_id != self.geometry_id {
            warn!(
                "Run {}: geometry id {} differs from the configured {}; continuing",
                header.run, header.geometry_id, self.geometry_id
            );
        }
        Ok(())
    }

    /// Check the configuration for everything that would make the run
    /// meaningless. Any error returned here is fatal.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let n_planes = self.n_planes();
        if n_planes < 2 {
            return Err(ConfigError::InvalidPlaneCount(n_planes));
        }
        check_resolution(self.resolution)?;
        if self.max_track_candidates == 0 {
            return Err(ConfigError::ZeroCandidateCap);
        }
        if self.exclude_plane > n_planes {
            return Err(ConfigError::ExcludePlaneOutOfRange {
                index: self.exclude_plane,
                n_planes,
            });
        }
        if self.use_residual_cuts {
            self.residual_cuts.validate(n_planes)?;
        }
        if self.input_mode == InputMode::Simulation {
            self.simulation.validate(n_planes)?;
        }
        if self.correlation.enabled {
            self.correlation.validate()?;
        }
        SensorLayout::new(self.sensor_ids.clone())?;
        Ok(())
    }
}

fn check_resolution(r: f64) -> std::result::Result<(), ConfigError> {
    if r.is_finite() && r > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidResolution(r))
    }
}

fn check_len(
    name: &'static str,
    found: usize,
    expected: usize,
) -> std::result::Result<(), ConfigError> {
    if found < expected {
        Err(ConfigError::PerPlaneLength {
            name,
            expected,
            found,
        })
    } else {
        Ok(())
    }
}
