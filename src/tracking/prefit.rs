//! Track candidates taken from an upstream track fit.
//!
//! An upstream tracking stage stores two hit records per plane with each
//! track: the measured hit and the fitted intersection. Only the fitted
//! records (type tag [`FITTED_HIT_TYPE`]) are used, in stored order, as the
//! per-plane positions. The distance-cut finder does not run in this mode.

use tracing::{debug, warn};

use crate::error::Error;
use crate::geometry::MM_TO_UM;
use crate::hit::Hit;

use super::finder::{CandidateSearch, TrackCandidate};

/// Type tag of fitted hit records.
pub const FITTED_HIT_TYPE: i32 = 32;

/// One hit record attached to a pre-fit track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrefitHit {
    pub hit_type: i32,
    /// Position in millimetres.
    pub position: [f64; 3],
}

/// A track fitted upstream, with all its hit records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrefitTrack {
    pub hits: Vec<PrefitHit>,
}

/// Convert one pre-fit track to a candidate.
///
/// The track must carry exactly `2 * n_planes` records, `n_planes` of them
/// fitted. Positions are scaled to micrometres; no pre-alignment is applied.
pub fn candidate_from_prefit(
    track: &PrefitTrack,
    index: usize,
    n_planes: usize,
) -> Result<TrackCandidate, Error> {
    if track.hits.len() != 2 * n_planes {
        return Err(Error::MalformedTrack {
            track: index,
            reason: format!(
                "{} hit records, expected {} (two per plane)",
                track.hits.len(),
                2 * n_planes
            ),
        });
    }

    let hits: Vec<Hit> = track
        .hits
        .iter()
        .filter(|h| h.hit_type == FITTED_HIT_TYPE)
        .enumerate()
        .map(|(plane, h)| {
            Hit::new(
                h.position[0] * MM_TO_UM,
                h.position[1] * MM_TO_UM,
                h.position[2] * MM_TO_UM,
                plane,
            )
        })
        .collect();

    if hits.len() != n_planes {
        return Err(Error::MalformedTrack {
            track: index,
            reason: format!("{} fitted hits, expected {}", hits.len(), n_planes),
        });
    }
    Ok(TrackCandidate::new(hits))
}

/// Convert the pre-fit tracks of one event, dropping malformed ones.
///
/// At most `max_candidates` candidates are kept.
pub fn candidates_from_prefit(
    tracks: &[PrefitTrack],
    n_planes: usize,
    max_candidates: usize,
) -> CandidateSearch {
    debug!("Number of tracks available in track collection: {}", tracks.len());
    let mut search = CandidateSearch::default();
    for (index, track) in tracks.iter().enumerate() {
        match candidate_from_prefit(track, index, n_planes) {
            Ok(candidate) => {
                if search.candidates.len() >= max_candidates {
                    search.truncated = true;
                    break;
                }
                search.candidates.push(candidate);
            }
            Err(e) => {
                warn!("{}", e);
                search.dropped += 1;
            }
        }
    }
    if search.truncated {
        warn!(
            "Maximum number of track candidates ({}) reached; further tracks were skipped",
            max_candidates
        );
    }
    search
}
