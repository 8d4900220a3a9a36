//! Straight-line tracking through the plane stack.
//!
//! Per event the stages run in a fixed order:
//!
//! 1. **Candidate finding** ([`finder`]): depth-first search for one hit per
//!    plane, where each step to the next plane must stay inside a distance
//!    cut that scales with the plane separation. Alternatively candidates
//!    come from tracks fitted upstream ([`prefit`]).
//! 2. **Fitting** ([`fit`]): independent weighted linear regressions of x
//!    and y against z, giving χ², residuals and track angles.
//! 3. **Selection** ([`select`]): optional per-plane residual windows.
//!
//! Nothing here keeps state between events.

pub mod finder;
pub mod fit;
pub mod prefit;
pub mod select;

pub use finder::{find_candidates, CandidateSearch, FinderConfig, TrackCandidate};
pub use fit::{fit_track, Axis, AxisFit, FittedTrack};
pub use prefit::{candidates_from_prefit, PrefitHit, PrefitTrack, FITTED_HIT_TYPE};
pub use select::TrackSelector;
