//! Combinatorial track-candidate finding.
//!
//! Candidates are chains of one hit per plane. The search walks the planes
//! in index order and only extends a chain from plane k to plane k+1 when
//! the transverse distance between the two hits is strictly below
//!
//! ```text
//! distance_max * (z[k+1] - z[k]) / 100000
//! ```
//!
//! i.e. `distance_max` is the tolerance per 10 cm of plane separation.
//! The cut is the only pruning; event occupancies are small enough that no
//! spatial index is needed.
//!
//! Enumeration order is fixed: plane-0 hit index is the slowest-varying,
//! the last plane's hit index the fastest. The output is therefore fully
//! determined by the insertion order of the hits.

use std::ops::ControlFlow;

use tracing::{debug, warn};

use crate::config::RunConfig;
use crate::hit::{Hit, PlaneHits};

/// Plane separation (µm) to which `distance_max` refers.
pub const DISTANCE_REFERENCE_GAP: f64 = 100000.0;

/// One hit per plane, hypothesised to come from the same particle.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackCandidate {
    /// Hits in plane order; `hits[i].plane == i` for finder output.
    pub hits: Vec<Hit>,
}

impl TrackCandidate {
    pub fn new(hits: Vec<Hit>) -> Self {
        Self { hits }
    }

    pub fn n_planes(&self) -> usize {
        self.hits.len()
    }

    pub fn xs(&self) -> Vec<f64> {
        self.hits.iter().map(|h| h.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.hits.iter().map(|h| h.y).collect()
    }

    pub fn zs(&self) -> Vec<f64> {
        self.hits.iter().map(|h| h.z).collect()
    }
}

/// Finder settings, taken from the run configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinderConfig {
    /// Allowed transverse distance per 10 cm of plane separation (µm).
    pub distance_max: f64,
    /// Hard cap on candidates per event.
    pub max_candidates: usize,
    /// Only build candidates when every plane holds exactly one hit.
    pub only_single_hit_events: bool,
}

impl From<&RunConfig> for FinderConfig {
    fn from(config: &RunConfig) -> Self {
        Self {
            distance_max: config.distance_max,
            max_candidates: config.max_track_candidates,
            only_single_hit_events: config.only_single_hit_events,
        }
    }
}

/// Output of a candidate search for one event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSearch {
    pub candidates: Vec<TrackCandidate>,
    /// More valid candidates existed than the cap allowed.
    pub truncated: bool,
    /// Input tracks rejected as malformed (pre-fit input only).
    pub dropped: usize,
}

/// Largest allowed transverse step between two planes separated by `gap`.
#[inline]
pub fn max_allowed_distance(distance_max: f64, gap: f64) -> f64 {
    distance_max * (gap / DISTANCE_REFERENCE_GAP)
}

/// Whether `next` may follow `prev` in a candidate chain.
#[inline]
pub fn within_distance_cut(prev: &Hit, next: &Hit, distance_max: f64) -> bool {
    let gap = next.z - prev.z;
    prev.transverse_distance(next) < max_allowed_distance(distance_max, gap)
}

/// Enumerate track candidates for one event.
///
/// Returns no candidates when any plane is empty, or when
/// `only_single_hit_events` is set and some plane has more than one hit.
/// Stops at `max_candidates`; if a further valid candidate exists the result
/// is flagged as truncated and a warning is logged.
pub fn find_candidates(hits: &PlaneHits, config: &FinderConfig) -> CandidateSearch {
    let mut search = CandidateSearch::default();

    if hits.n_planes() == 0 || hits.has_empty_plane() {
        debug!("At least one plane without hits: no track candidates");
        return search;
    }
    if config.only_single_hit_events && !hits.is_single_hit() {
        debug!(
            "Multiplicities {:?} not single-hit: no track candidates",
            hits.multiplicities()
        );
        return search;
    }

    let mut walker = ChainWalker {
        hits,
        config,
        out: &mut search,
        chain: Vec::with_capacity(hits.n_planes()),
    };
    let truncated = walker.descend(0).is_break();
    search.truncated = truncated;

    if search.truncated {
        warn!(
            "Maximum number of track candidates ({}) reached; further candidates were skipped",
            config.max_candidates
        );
    }
    search
}

/// Depth-first walker holding the partial chain.
struct ChainWalker<'a> {
    hits: &'a PlaneHits,
    config: &'a FinderConfig,
    out: &'a mut CandidateSearch,
    chain: Vec<Hit>,
}

impl ChainWalker<'_> {
    fn descend(&mut self, plane: usize) -> ControlFlow<()> {
        if plane == self.hits.n_planes() {
            if self.out.candidates.len() >= self.config.max_candidates {
                return ControlFlow::Break(());
            }
            self.out
                .candidates
                .push(TrackCandidate::new(self.chain.clone()));
            return ControlFlow::Continue(());
        }

        let hits = self.hits;
        for hit in hits.plane(plane) {
            if let Some(prev) = self.chain.last() {
                if !within_distance_cut(prev, hit, self.config.distance_max) {
                    continue;
                }
            }
            self.chain.push(*hit);
            let flow = self.descend(plane + 1);
            self.chain.pop();
            if flow.is_break() {
                return flow;
            }
        }
        ControlFlow::Continue(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_candidates: usize) -> FinderConfig {
        FinderConfig {
            distance_max: 2000.0,
            max_candidates,
            only_single_hit_events: false,
        }
    }

    /// Planes 10 cm apart, so the allowed step equals `distance_max`.
    fn stack(points: &[&[(f64, f64)]]) -> PlaneHits {
        let mut hits = PlaneHits::new(points.len());
        for (plane, plane_points) in points.iter().enumerate() {
            for &(x, y) in plane_points.iter() {
                hits.push(Hit::new(x, y, plane as f64 * 100000.0, plane));
            }
        }
        hits
    }

    #[test]
    fn test_single_straight_track() {
        let hits = stack(&[&[(0.0, 0.0)], &[(10.0, 5.0)], &[(20.0, 10.0)]]);
        let result = find_candidates(&hits, &config(10));
        assert_eq!(result.candidates.len(), 1);
        assert!(!result.truncated);
        let c = &result.candidates[0];
        assert_eq!(c.n_planes(), 3);
        assert_eq!(c.xs(), vec![0.0, 10.0, 20.0]);
        for (i, h) in c.hits.iter().enumerate() {
            assert_eq!(h.plane, i);
        }
    }

    #[test]
    fn test_distance_cut_is_strict() {
        // Exactly at the limit: excluded
        let hits = stack(&[&[(0.0, 0.0)], &[(2000.0, 0.0)]]);
        assert!(find_candidates(&hits, &config(10)).candidates.is_empty());

        // Just inside: accepted
        let hits = stack(&[&[(0.0, 0.0)], &[(1999.999, 0.0)]]);
        assert_eq!(find_candidates(&hits, &config(10)).candidates.len(), 1);
    }

    #[test]
    fn test_cut_scales_with_gap() {
        let mut hits = PlaneHits::new(2);
        hits.push(Hit::new(0.0, 0.0, 0.0, 0));
        // 5 cm gap allows 1000 µm
        hits.push(Hit::new(900.0, 0.0, 50000.0, 1));
        hits.push(Hit::new(1100.0, 0.0, 50000.0, 1));
        let result = find_candidates(&hits, &config(10));
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].hits[1].x, 900.0);
    }

    #[test]
    fn test_enumeration_order_is_plane_major() {
        let hits = stack(&[
            &[(0.0, 0.0), (100.0, 0.0)],
            &[(0.0, 0.0), (100.0, 0.0)],
        ]);
        let result = find_candidates(&hits, &config(10));
        let pairs: Vec<(f64, f64)> = result
            .candidates
            .iter()
            .map(|c| (c.hits[0].x, c.hits[1].x))
            .collect();
        assert_eq!(
            pairs,
            vec![(0.0, 0.0), (0.0, 100.0), (100.0, 0.0), (100.0, 100.0)]
        );
    }

    #[test]
    fn test_empty_plane_yields_nothing() {
        let hits = stack(&[&[(0.0, 0.0)], &[], &[(0.0, 0.0)]]);
        let result = find_candidates(&hits, &config(10));
        assert!(result.candidates.is_empty());
        assert!(!result.truncated);
    }

    #[test]
    fn test_cut_applies_to_every_step() {
        // Plane 1 -> 2 step is too large for the second plane-1 hit
        let hits = stack(&[
            &[(0.0, 0.0)],
            &[(0.0, 0.0), (1500.0, 0.0)],
            &[(-1000.0, 0.0)],
        ]);
        let result = find_candidates(&hits, &config(10));
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].hits[1].x, 0.0);
    }

    #[test]
    fn test_cap_truncates_and_flags() {
        let row: &[(f64, f64)] = &[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)];
        let hits = stack(&[row, row, row]);
        // 27 valid combinations
        let all = find_candidates(&hits, &config(100));
        assert_eq!(all.candidates.len(), 27);
        assert!(!all.truncated);

        let capped = find_candidates(&hits, &config(5));
        assert_eq!(capped.candidates.len(), 5);
        assert!(capped.truncated);
        assert_eq!(capped.candidates[..], all.candidates[..5]);
    }

    #[test]
    fn test_cap_equal_to_count_is_not_truncated() {
        let hits = stack(&[&[(0.0, 0.0), (1.0, 0.0)], &[(0.0, 0.0)]]);
        let result = find_candidates(&hits, &config(2));
        assert_eq!(result.candidates.len(), 2);
        assert!(!result.truncated);
    }

    #[test]
    fn test_only_single_hit_events() {
        let cfg = FinderConfig {
            only_single_hit_events: true,
            ..config(10)
        };
        // A geometrically valid chain exists, but plane 1 has two hits
        let hits = stack(&[&[(0.0, 0.0)], &[(0.0, 0.0), (5000.0, 0.0)], &[(0.0, 0.0)]]);
        assert!(find_candidates(&hits, &cfg).candidates.is_empty());

        let hits = stack(&[&[(0.0, 0.0)], &[(0.0, 0.0)], &[(0.0, 0.0)]]);
        assert_eq!(find_candidates(&hits, &cfg).candidates.len(), 1);
    }

    #[test]
    fn test_more_than_six_planes() {
        let points: Vec<Vec<(f64, f64)>> = (0..8).map(|i| vec![(i as f64, 0.0)]).collect();
        let refs: Vec<&[(f64, f64)]> = points.iter().map(|p| p.as_slice()).collect();
        let hits = stack(&refs);
        let result = find_candidates(&hits, &config(10));
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].n_planes(), 8);
    }

    #[test]
    fn test_repeated_runs_are_identical() {
        let row: &[(f64, f64)] = &[(0.0, 0.0), (700.0, 300.0), (-400.0, 800.0)];
        let hits = stack(&[row, row, row, row]);
        let a = find_candidates(&hits, &config(2000));
        let b = find_candidates(&hits, &config(2000));
        assert_eq!(a, b);
    }
}
