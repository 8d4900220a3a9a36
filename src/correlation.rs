//! Hit correlations between planes.
//!
//! For every ordered pair of distinct planes `(row, col)` the x position of
//! each hit on `row` is histogrammed against the x position of each hit on
//! `col`, and the same for y. Particles crossing the telescope form a band
//! along the diagonal; its distance from the diagonal is the relative offset
//! of the two planes and gives a starting point for
//! [`PlaneTransform`](crate::geometry::PlaneTransform) constants.
//!
//! Histograms are named `HitXCorrelationHisto_d{row}_d{col}` and
//! `HitYCorrelationHisto_d{row}_d{col}`.

use tracing::info;

use crate::config::CorrelationConfig;
use crate::diagnostics::Histogram2D;
use crate::geometry::PlaneTransform;
use crate::hit::PlaneHits;

/// Correlation histograms of one ordered plane pair.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanePair {
    /// Plane on the histogram x axis.
    pub row: usize,
    /// Plane on the histogram y axis.
    pub col: usize,
    pub x: Histogram2D,
    pub y: Histogram2D,
}

/// Hit correlations for all ordered pairs of planes.
#[derive(Debug, Clone, PartialEq)]
pub struct HitCorrelations {
    n_planes: usize,
    pairs: Vec<PlanePair>,
}

impl HitCorrelations {
    /// Book `n_planes * (n_planes - 1)` pairs of histograms.
    ///
    /// # Panics
    /// If `config` has no bins or an empty range.
    pub fn new(n_planes: usize, config: &CorrelationConfig) -> Self {
        let axis = (config.n_bins, -config.half_range, config.half_range);
        let mut pairs = Vec::with_capacity(n_planes * n_planes.saturating_sub(1));
        for row in 0..n_planes {
            for col in (0..n_planes).filter(|&c| c != row) {
                let name = |a: &str| format!("Hit{a}CorrelationHisto_d{row}_d{col}");
                pairs.push(PlanePair {
                    row,
                    col,
                    x: Histogram2D::new(name("X"), axis, axis),
                    y: Histogram2D::new(name("Y"), axis, axis),
                });
            }
        }
        Self { n_planes, pairs }
    }

    pub fn n_planes(&self) -> usize {
        self.n_planes
    }

    pub fn pairs(&self) -> &[PlanePair] {
        &self.pairs
    }

    /// The histograms of `(row, col)`, `None` on the diagonal or out of range.
    pub fn pair(&self, row: usize, col: usize) -> Option<&PlanePair> {
        if row == col || row >= self.n_planes || col >= self.n_planes {
            return None;
        }
        let idx = row * (self.n_planes - 1) + if col < row { col } else { col - 1 };
        self.pairs.get(idx)
    }

    /// All histograms, x before y for each pair.
    pub fn histograms(&self) -> impl Iterator<Item = &Histogram2D> {
        self.pairs.iter().flat_map(|p| [&p.x, &p.y])
    }

    /// Fill every pair with every combination of hits of one event.
    ///
    /// Planes beyond the booked count are ignored.
    pub fn fill(&mut self, hits: &PlaneHits) {
        for pair in &mut self.pairs {
            if pair.row >= hits.n_planes() || pair.col >= hits.n_planes() {
                continue;
            }
            for a in hits.plane(pair.row) {
                for b in hits.plane(pair.col) {
                    pair.x.fill(a.x, b.x);
                    pair.y.fill(a.y, b.y);
                }
            }
        }
    }

    /// Offset `[dx, dy]` that moves hits on `plane` onto plane 0, estimated
    /// from the mean positions in the `(0, plane)` histograms.
    ///
    /// Combinatorial pairs from events with several hits per plane bias the
    /// means towards zero; single-hit events give the cleanest estimate.
    pub fn offset_to_reference(&self, plane: usize) -> Option<[f64; 2]> {
        let pair = self.pair(0, plane)?;
        let (ref_x, plane_x) = pair.x.mean()?;
        let (ref_y, plane_y) = pair.y.mean()?;
        Some([ref_x - plane_x, ref_y - plane_y])
    }

    /// Offset-only pre-alignment constants for planes `1..n_planes`, in the
    /// order of [`RunConfig::plane_transforms`](crate::config::RunConfig::plane_transforms).
    ///
    /// Planes without correlation entries get the identity.
    pub fn suggested_transforms(&self) -> Vec<PlaneTransform> {
        (1..self.n_planes)
            .map(|plane| match self.offset_to_reference(plane) {
                Some([off_x, off_y]) => PlaneTransform {
                    off_x,
                    off_y,
                    ..PlaneTransform::IDENTITY
                },
                None => PlaneTransform::IDENTITY,
            })
            .collect()
    }

    /// Report the estimated offsets at `info!`.
    pub fn log_offsets(&self) {
        for plane in 1..self.n_planes {
            if let Some([dx, dy]) = self.offset_to_reference(plane) {
                info!(
                    "Plane {} correlation offset to plane 0: dx = {:.1} um, dy = {:.1} um",
                    plane, dx, dy
                );
            }
        }
    }
}
