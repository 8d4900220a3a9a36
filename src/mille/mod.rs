//! Alignment records for a global least-squares alignment fit
//! (Millepede II).
//!
//! Every accepted track contributes one record per plane and axis. Each
//! record relates the measured residual to
//!
//! - four **local** parameters describing the track itself,
//!   `[intercept_x, intercept_y, slope_x, slope_y]`, and
//! - the **global** alignment parameters of the planes, in a basis chosen
//!   once per run (see [`basis`]).
//!
//! Records of one track form a block closed by an end-of-track marker.
//! [`AlignmentSink`] abstracts where the blocks go; [`MilleWriter`] writes
//! the Millepede binary format, [`MemorySink`] keeps them in memory.

pub mod basis;
pub mod emit;
pub mod writer;

pub use basis::{DerivativeBasis, ShiftAndRotation, ShiftOnly};
pub use emit::RecordEmitter;
pub use writer::{read_blocks, MilleBlock, MilleFormat, MilleMeasurement, MilleWriter};

use crate::error::Result;
use crate::tracking::Axis;

/// Number of local (per-track) parameters.
pub const N_LOCAL: usize = 4;

/// One measurement row for the alignment fit.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignmentRecord {
    /// Plane the measurement belongs to.
    pub plane: usize,
    /// Measured coordinate.
    pub axis: Axis,
    /// Derivatives with respect to the local parameters.
    pub local: [f32; N_LOCAL],
    /// Derivatives with respect to all global parameters (mostly zero).
    pub global: Vec<f32>,
    /// Labels parallel to `global`.
    pub labels: Vec<i32>,
    /// Fitted minus measured (µm).
    pub residual: f32,
    /// Measurement uncertainty (µm).
    pub sigma: f32,
}

impl AlignmentRecord {
    /// Non-zero global derivatives with their labels.
    pub fn nonzero_globals(&self) -> impl Iterator<Item = (i32, f32)> + '_ {
        self.labels
            .iter()
            .zip(&self.global)
            .filter(|(_, d)| **d != 0.0)
            .map(|(&l, &d)| (l, d))
    }
}

/// Destination of alignment records.
pub trait AlignmentSink {
    /// Append one record to the current track block.
    fn write_record(&mut self, record: &AlignmentRecord) -> Result<()>;

    /// Close the current track block.
    fn end_track(&mut self) -> Result<()>;

    /// Push buffered output to its destination.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Sink that keeps every track block in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemorySink {
    /// Closed blocks, one per track.
    pub tracks: Vec<Vec<AlignmentRecord>>,
    current: Vec<AlignmentRecord>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records written since the last end-of-track marker.
    pub fn pending(&self) -> &[AlignmentRecord] {
        &self.current
    }
}

impl AlignmentSink for MemorySink {
    fn write_record(&mut self, record: &AlignmentRecord) -> Result<()> {
        self.current.push(record.clone());
        Ok(())
    }

    fn end_track(&mut self) -> Result<()> {
        self.tracks.push(std::mem::take(&mut self.current));
        Ok(())
    }
}

impl<S: AlignmentSink + ?Sized> AlignmentSink for Box<S> {
    fn write_record(&mut self, record: &AlignmentRecord) -> Result<()> {
        (**self).write_record(record)
    }

    fn end_track(&mut self) -> Result<()> {
        (**self).end_track()
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}
