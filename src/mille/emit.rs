//! Turning fitted tracks into alignment records.

use crate::config::AlignMode;
use crate::error::Result;
use crate::tracking::{Axis, FittedTrack};

use super::basis::DerivativeBasis;
use super::{AlignmentRecord, AlignmentSink, N_LOCAL};

/// Builds the records of accepted tracks for one derivative basis.
#[derive(Debug, Clone, Copy)]
pub struct RecordEmitter {
    basis: &'static dyn DerivativeBasis,
    sigma: f32,
}

impl RecordEmitter {
    /// `sigma` is the measurement uncertainty written with every record.
    pub fn new(mode: AlignMode, sigma: f64) -> Self {
        Self {
            basis: mode.basis(),
            sigma: sigma as f32,
        }
    }

    pub fn basis(&self) -> &'static dyn DerivativeBasis {
        self.basis
    }

    /// The `2 * n_planes` records of one track: for each plane, the x record
    /// followed by the y record.
    pub fn records(&self, track: &FittedTrack) -> Vec<AlignmentRecord> {
        let n_planes = track.n_planes();
        let n_global = self.basis.n_global(n_planes);
        let labels = self.basis.labels(n_planes);

        let mut records = Vec::with_capacity(2 * n_planes);
        for (plane, hit) in track.candidate.hits.iter().enumerate() {
            let z = hit.z as f32;
            for axis in [Axis::X, Axis::Y] {
                let local: [f32; N_LOCAL] = match axis {
                    Axis::X => [1.0, 0.0, z, 0.0],
                    Axis::Y => [0.0, 1.0, 0.0, z],
                };
                let mut global = vec![0.0f32; n_global];
                self.basis.fill(axis, hit, &mut global);
                records.push(AlignmentRecord {
                    plane,
                    axis,
                    local,
                    global,
                    labels: labels.clone(),
                    residual: track.axis(axis).residuals[plane] as f32,
                    sigma: self.sigma,
                });
            }
        }
        records
    }

    /// Write one track's records to `sink` and close the block.
    ///
    /// Returns the number of records written.
    pub fn emit<S: AlignmentSink + ?Sized>(
        &self,
        track: &FittedTrack,
        sink: &mut S,
    ) -> Result<usize> {
        let records = self.records(track);
        for record in &records {
            sink.write_record(record)?;
        }
        sink.end_track()?;
        Ok(records.len())
    }
}
