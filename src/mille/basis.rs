//! Global-parameter bases: how a measurement on one plane depends on that
//! plane's alignment parameters.
//!
//! Labels are 1-based and dense: global slot `i` carries label `i + 1`.
//! Derivatives are of the residual (fitted − measured) with respect to
//! the alignment corrections of the plane the hit was measured on.

use std::fmt;

use crate::config::AlignMode;
use crate::hit::Hit;
use crate::tracking::Axis;

/// A choice of global alignment parameters per plane.
pub trait DerivativeBasis: fmt::Debug + Send + Sync {
    /// Number of global parameters per plane.
    fn params_per_plane(&self) -> usize;

    /// Write the non-zero global derivatives of the `axis` measurement of
    /// `hit` into `global`, a zeroed slice of length
    /// `params_per_plane() * n_planes`.
    fn fill(&self, axis: Axis, hit: &Hit, global: &mut [f32]);

    /// Length of the global derivative vector for a stack of `n_planes`.
    fn n_global(&self, n_planes: usize) -> usize {
        self.params_per_plane() * n_planes
    }

    /// Labels parallel to the global derivative vector.
    fn labels(&self, n_planes: usize) -> Vec<i32> {
        (1..=self.n_global(n_planes) as i32).collect()
    }
}

/// x and y shifts: slots `2p` (x) and `2p + 1` (y).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShiftOnly;

impl DerivativeBasis for ShiftOnly {
    fn params_per_plane(&self) -> usize {
        2
    }

    fn fill(&self, axis: Axis, hit: &Hit, global: &mut [f32]) {
        let base = 2 * hit.plane;
        match axis {
            Axis::X => global[base] = -1.0,
            Axis::Y => global[base + 1] = -1.0,
        }
    }
}

/// x and y shifts plus a rotation about z: slots `3p` (x), `3p + 1` (y),
/// `3p + 2` (rotation).
///
/// The rotation derivative is `+y` for an x measurement and `-x` for a y
/// measurement, using the measured hit position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShiftAndRotation;

impl DerivativeBasis for ShiftAndRotation {
    fn params_per_plane(&self) -> usize {
        3
    }

    fn fill(&self, axis: Axis, hit: &Hit, global: &mut [f32]) {
        let base = 3 * hit.plane;
        match axis {
            Axis::X => {
                global[base] = -1.0;
                global[base + 2] = hit.y as f32;
            }
            Axis::Y => {
                global[base + 1] = -1.0;
                global[base + 2] = -hit.x as f32;
            }
        }
    }
}

impl AlignMode {
    /// The derivative basis implementing this mode.
    pub fn basis(&self) -> &'static dyn DerivativeBasis {
        match self {
            AlignMode::ShiftOnly => &ShiftOnly,
            AlignMode::ShiftAndRotation => &ShiftAndRotation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_only_slots() {
        let hit = Hit::new(120.0, -40.0, 0.0, 2);
        let mut g = vec![0.0f32; ShiftOnly.n_global(4)];
        ShiftOnly.fill(Axis::X, &hit, &mut g);
        assert_eq!(g.len(), 8);
        assert_eq!(g[4], -1.0);
        assert_eq!(g.iter().filter(|v| **v != 0.0).count(), 1);

        let mut g = vec![0.0f32; 8];
        ShiftOnly.fill(Axis::Y, &hit, &mut g);
        assert_eq!(g[5], -1.0);
        assert_eq!(g.iter().filter(|v| **v != 0.0).count(), 1);
    }

    #[test]
    fn test_shift_and_rotation_slots() {
        let hit = Hit::new(120.0, -40.0, 0.0, 1);
        let mut g = vec![0.0f32; ShiftAndRotation.n_global(3)];
        ShiftAndRotation.fill(Axis::X, &hit, &mut g);
        assert_eq!(g.len(), 9);
        assert_eq!(g[3], -1.0);
        assert_eq!(g[5], -40.0);

        let mut g = vec![0.0f32; 9];
        ShiftAndRotation.fill(Axis::Y, &hit, &mut g);
        assert_eq!(g[4], -1.0);
        assert_eq!(g[5], -120.0);
        assert_eq!(g.iter().filter(|v| **v != 0.0).count(), 2);
    }

    #[test]
    fn test_labels_are_one_based() {
        assert_eq!(ShiftOnly.labels(2), vec![1, 2, 3, 4]);
        assert_eq!(ShiftAndRotation.labels(2), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_mode_selects_basis() {
        assert_eq!(AlignMode::ShiftOnly.basis().params_per_plane(), 2);
        assert_eq!(AlignMode::ShiftAndRotation.basis().params_per_plane(), 3);
    }
}
