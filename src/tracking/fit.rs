//! Straight-line track fit.
//!
//! x(z) and y(z) are fitted as two independent weighted linear regressions
//! (see Blobel & Lohrmann, "Statistische und numerische Methoden der
//! Datenanalyse", §8.2). With weights `w = 1/σ²`:
//!
//! ```text
//! S1  = Σ w            zbar = Σ w z / S1        pbar = Σ w p / S1
//! Szp = Σ w (z - zbar) p
//! Szz = Σ w (z - zbar)²
//! slope = Szp / Szz
//! line(z) = pbar + (z - zbar) · slope
//! χ²  = Σ w (p - line(z))²
//! ```
//!
//! A plane can be excluded from the sums. Residuals are still reported for
//! every plane, the excluded one included, against the line fitted without
//! it. Residuals are fitted minus measured.

use tracing::debug;

use crate::error::{Error, Result};

use super::finder::TrackCandidate;

/// Coordinate axis of a 1D fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn name(&self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
        }
    }
}

/// Result of one axis of the fit.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisFit {
    pub slope: f64,
    /// Weighted mean z of the fitted planes.
    pub zbar: f64,
    /// Weighted mean coordinate of the fitted planes.
    pub pbar: f64,
    pub chi2: f64,
    /// `atan(slope)`.
    pub angle: f64,
    /// Line evaluated at every plane's z.
    pub fitted: Vec<f64>,
    /// Fitted minus measured, for every plane.
    pub residuals: Vec<f64>,
}

impl AxisFit {
    /// The fitted line evaluated at `z`.
    #[inline]
    pub fn at(&self, z: f64) -> f64 {
        self.pbar - self.zbar * self.slope + z * self.slope
    }
}

/// Weighted straight-line fit of `p` against `z`.
///
/// `sigma` holds the per-plane resolution. `exclude` is a 0-based plane left
/// out of the sums. Fails if fewer than two planes remain or all remaining
/// planes share one z.
pub fn fit_axis(
    z: &[f64],
    p: &[f64],
    sigma: &[f64],
    exclude: Option<usize>,
    axis: Axis,
) -> Result<AxisFit> {
    let used = |i: &usize| Some(*i) != exclude;
    let weight = |i: usize| 1.0 / (sigma[i] * sigma[i]);
    let planes: Vec<usize> = (0..z.len()).filter(used).collect();

    let degenerate = Error::DegenerateFit { axis: axis.name() };
    if planes.len() < 2 {
        return Err(degenerate);
    }
    let z_min = planes.iter().map(|&i| z[i]).fold(f64::INFINITY, f64::min);
    let z_max = planes
        .iter()
        .map(|&i| z[i])
        .fold(f64::NEG_INFINITY, f64::max);
    if z_max <= z_min {
        return Err(degenerate);
    }

    let s1: f64 = planes.iter().map(|&i| weight(i)).sum();
    let zbar = planes.iter().map(|&i| weight(i) * z[i]).sum::<f64>() / s1;
    let pbar = planes.iter().map(|&i| weight(i) * p[i]).sum::<f64>() / s1;
    let szp: f64 = planes
        .iter()
        .map(|&i| weight(i) * (z[i] - zbar) * p[i])
        .sum();
    let szz: f64 = planes
        .iter()
        .map(|&i| weight(i) * (z[i] - zbar) * (z[i] - zbar))
        .sum();
    if szz == 0.0 || !szz.is_finite() {
        return Err(degenerate);
    }
    let slope = szp / szz;

    let chi2 = planes
        .iter()
        .map(|&i| {
            let d = p[i] - pbar + zbar * slope - z[i] * slope;
            weight(i) * d * d
        })
        .sum();

    let mut fit = AxisFit {
        slope,
        zbar,
        pbar,
        chi2,
        angle: slope.atan(),
        fitted: Vec::with_capacity(z.len()),
        residuals: Vec::with_capacity(z.len()),
    };
    for (&zi, &pi) in z.iter().zip(p) {
        let f = fit.at(zi);
        fit.fitted.push(f);
        fit.residuals.push(f - pi);
    }
    Ok(fit)
}

/// A track candidate with its fit.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedTrack {
    pub candidate: TrackCandidate,
    pub x: AxisFit,
    pub y: AxisFit,
}

impl FittedTrack {
    pub fn n_planes(&self) -> usize {
        self.candidate.n_planes()
    }

    /// `[χ²_x, χ²_y]`.
    pub fn chi2(&self) -> [f64; 2] {
        [self.x.chi2, self.y.chi2]
    }

    /// `[atan(slope_x), atan(slope_y)]`.
    pub fn angle(&self) -> [f64; 2] {
        [self.x.angle, self.y.angle]
    }

    /// `[residual_x, residual_y]` of one plane.
    pub fn residual(&self, plane: usize) -> [f64; 2] {
        [self.x.residuals[plane], self.y.residuals[plane]]
    }

    pub fn axis(&self, axis: Axis) -> &AxisFit {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
        }
    }
}

/// Fit a candidate in x and y.
///
/// `resolution_x` / `resolution_y` are per-plane resolutions (µm) and must
/// have one entry per plane of the candidate.
pub fn fit_track(
    candidate: TrackCandidate,
    resolution_x: &[f64],
    resolution_y: &[f64],
    exclude: Option<usize>,
) -> Result<FittedTrack> {
    let z = candidate.zs();
    let x = fit_axis(&z, &candidate.xs(), resolution_x, exclude, Axis::X)?;
    let y = fit_axis(&z, &candidate.ys(), resolution_y, exclude, Axis::Y)?;
    debug!("Residuals X: {:?}", x.residuals);
    debug!("Residuals Y: {:?}", y.residuals);
    Ok(FittedTrack { candidate, x, y })
}
