//! # planealign
//!
//! Straight-line track reconstruction through a stack of planar position
//! sensors (a beam telescope), producing measurement records for a global
//! least-squares alignment with [Millepede II](https://www.desy.de/~kleinwrt/MP2/doc/html/index.html).
//!
//! For every event the pipeline
//!
//! 1. **Preprocesses** raw hits: sensor ID → plane index, millimetres →
//!    micrometres, and a small per-plane pre-alignment transform
//!    ([`geometry`])
//! 2. **Finds** track candidates: one hit per plane, chained plane by plane
//!    under a distance cut that scales with the plane separation
//!    ([`tracking::finder`])
//! 3. **Fits** each candidate with two independent weighted straight-line
//!    regressions, x(z) and y(z) ([`tracking::fit`])
//! 4. **Selects** tracks by per-plane residual windows
//!    ([`tracking::select`])
//! 5. **Emits** two alignment records per plane for each accepted track,
//!    with local derivatives for the track and global derivatives for the
//!    plane alignment parameters ([`mille`])
//!
//! Candidates can also come from an upstream track fit
//! ([`tracking::prefit`]) or from the built-in [`simulation`]. Optional
//! plane-to-plane hit [`correlation`] histograms estimate the offsets used
//! for the pre-alignment.
//!
//! ## Example
//!
//! ```no_run
//! use planealign::{AlignmentPipeline, Event, MilleFormat, MilleWriter, RawHit, RunConfig};
//!
//! let config = RunConfig::from_file("run.toml")?;
//! let writer = MilleWriter::create("mille.bin", MilleFormat::Binary)?;
//! let mut pipeline = AlignmentPipeline::new(config, writer)?;
//!
//! let hits = vec![
//!     RawHit { sensor_id: 0, position: [0.10, 0.20, 20.0] },
//!     RawHit { sensor_id: 1, position: [0.11, 0.21, 40.0] },
//!     // ... one or more hits per plane ...
//! ];
//! pipeline.process_event(&Event::with_hits(1, 0, hits))?;
//!
//! let report = pipeline.finish()?;
//! report.sink.finish()?;
//! println!("{}", report.summary);
//! # Ok::<(), planealign::Error>(())
//! ```
//!
//! ## Units and conventions
//!
//! - Lengths are micrometres after preprocessing; `z` is the beam axis.
//! - Planes are indexed from 0 in beam order.
//! - Residuals are fitted minus measured.
//! - Global labels are 1-based: plane `p` owns labels `2p+1, 2p+2` in
//!   shift-only mode and `3p+1 ..= 3p+3` in shift+rotation mode.

pub mod config;
pub mod correlation;
pub mod diagnostics;
pub mod error;
pub mod geometry;
pub mod hit;
pub mod input;
pub mod mille;
pub mod pipeline;
pub mod simulation;
pub mod tracking;

pub use config::{
    AlignMode, CorrelationConfig, InputMode, ResidualBounds, RunConfig, SimulationConfig,
};
pub use correlation::HitCorrelations;
pub use diagnostics::{Diagnostics, Histogram1D, Histogram2D};
pub use error::{ConfigError, Error, Result};
pub use geometry::{PlaneTransform, SensorLayout, TelescopeGeometry, MM_TO_UM};
pub use hit::{Hit, PlaneHits, RawHit};
pub use input::{Event, EventKind, RunHeader};
pub use mille::{
    AlignmentRecord, AlignmentSink, MemorySink, MilleFormat, MilleWriter, RecordEmitter,
};
pub use pipeline::{AlignmentPipeline, RunReport, RunSummary};
pub use simulation::{TrackSimulator, TrueTrack};
pub use tracking::{
    find_candidates, fit_track, CandidateSearch, FinderConfig, FittedTrack, TrackCandidate,
    TrackSelector,
};
