//! Residual-based track selection.

use tracing::debug;

use crate::config::{ResidualBounds, RunConfig};

use super::fit::FittedTrack;

/// Accepts or rejects fitted tracks by their per-plane residuals.
///
/// Without bounds every track is accepted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackSelector {
    bounds: Option<ResidualBounds>,
}

impl TrackSelector {
    /// Selector that accepts every track.
    pub fn accept_all() -> Self {
        Self { bounds: None }
    }

    /// Selector applying the given residual windows.
    pub fn with_bounds(bounds: ResidualBounds) -> Self {
        Self {
            bounds: Some(bounds),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        if config.use_residual_cuts {
            Self::with_bounds(config.residual_cuts.clone())
        } else {
            Self::accept_all()
        }
    }

    /// `true` if every plane's x and y residual lies inside its window
    /// (bounds inclusive).
    pub fn accept(&self, track: &FittedTrack) -> bool {
        let Some(bounds) = &self.bounds else {
            return true;
        };
        let inside = |r: f64, min: f64, max: f64| min <= r && r <= max;
        let ok = (0..track.n_planes()).all(|plane| {
            let [rx, ry] = track.residual(plane);
            inside(rx, bounds.x_min[plane], bounds.x_max[plane])
                && inside(ry, bounds.y_min[plane], bounds.y_max[plane])
        });
        if !ok {
            debug!("Track did not pass the residual cuts");
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hit::Hit;
    use crate::tracking::{fit_track, TrackCandidate};

    /// Three planes, middle hit displaced by `dx` so residuals are
    /// `[dx/3, -2dx/3, dx/3]` in x and zero in y.
    fn kinked_track(dx: f64) -> FittedTrack {
        let c = TrackCandidate::new(vec![
            Hit::new(0.0, 0.0, 0.0, 0),
            Hit::new(dx, 0.0, 1000.0, 1),
            Hit::new(0.0, 0.0, 2000.0, 2),
        ]);
        fit_track(c, &[1.0; 3], &[1.0; 3], None).unwrap()
    }

    #[test]
    fn test_no_bounds_accepts_everything() {
        assert!(TrackSelector::accept_all().accept(&kinked_track(1.0e6)));
        let config = RunConfig::default();
        assert!(TrackSelector::from_config(&config).accept(&kinked_track(1.0e6)));
    }

    #[test]
    fn test_window_applies_per_plane() {
        let selector = TrackSelector::with_bounds(ResidualBounds::symmetric(3, 10.0));
        assert!(selector.accept(&kinked_track(9.0)));
        // middle residual -20 falls outside
        assert!(!selector.accept(&kinked_track(30.0)));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let track = kinked_track(0.0);
        // All residuals are exactly zero: a [0, 0] window still accepts
        let selector = TrackSelector::with_bounds(ResidualBounds::symmetric(3, 0.0));
        assert!(selector.accept(&track));
    }

    #[test]
    fn test_asymmetric_y_window() {
        let track = kinked_track(3.0);
        let mut bounds = ResidualBounds::symmetric(3, 100.0);
        // y residuals are zero, a window excluding zero rejects the track
        bounds.y_min[1] = 0.5;
        assert!(!TrackSelector::with_bounds(bounds).accept(&track));
    }
}
