//! Millepede II record file writer.
//!
//! One block per track. In binary form a block is
//!
//! ```text
//! i32          nwords = 2 * slots
//! f32[slots]   values
//! i32[slots]   indices
//! ```
//!
//! little-endian. Slot 0 is `(0.0, 0)`. Each measurement then occupies
//!
//! ```text
//! (residual, 0) (dl_i, i)... (sigma, 0) (dg_j, label_j)...
//! ```
//!
//! with local indices 1-based and only non-zero derivatives stored.
//! The text form writes the same three parts on three lines.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use tracing::{debug, warn};

use crate::error::Result;

use super::{AlignmentRecord, AlignmentSink};

/// Default capacity of one block in slots.
pub const DEFAULT_BUFFER_SIZE: usize = 5000;

/// On-disk encoding of the record file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MilleFormat {
    #[default]
    Binary,
    Text,
}

/// Writes alignment records in the Millepede record format.
#[derive(Debug)]
pub struct MilleWriter<W: Write> {
    out: W,
    format: MilleFormat,
    capacity: usize,
    floats: Vec<f32>,
    ints: Vec<i32>,
    blocks: u64,
}

impl MilleWriter<BufWriter<File>> {
    /// Create (truncate) a record file at `path`.
    pub fn create<P: AsRef<Path>>(path: P, format: MilleFormat) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        debug!("Opened Millepede record file {}", path.as_ref().display());
        Ok(Self::new(BufWriter::new(file), format))
    }
}

impl<W: Write> MilleWriter<W> {
    pub fn new(out: W, format: MilleFormat) -> Self {
        Self::with_capacity(out, format, DEFAULT_BUFFER_SIZE)
    }

    /// Writer whose blocks hold at most `capacity` slots.
    pub fn with_capacity(out: W, format: MilleFormat, capacity: usize) -> Self {
        Self {
            out,
            format,
            capacity,
            floats: Vec::new(),
            ints: Vec::new(),
            blocks: 0,
        }
    }

    /// Blocks written so far.
    pub fn blocks_written(&self) -> u64 {
        self.blocks
    }

    /// Flush and hand back the underlying writer. A block still open is
    /// discarded.
    pub fn finish(mut self) -> Result<W> {
        if self.floats.len() > 1 {
            warn!("Discarding unterminated Millepede block");
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn open_block(&mut self) {
        if self.floats.is_empty() {
            self.floats.push(0.0);
            self.ints.push(0);
        }
    }

    fn write_block(&mut self) -> io::Result<()> {
        let nwords = 2 * self.floats.len() as i32;
        match self.format {
            MilleFormat::Binary => {
                self.out.write_all(&nwords.to_le_bytes())?;
                for v in &self.floats {
                    self.out.write_all(&v.to_le_bytes())?;
                }
                for i in &self.ints {
                    self.out.write_all(&i.to_le_bytes())?;
                }
            }
            MilleFormat::Text => {
                writeln!(self.out, "{}", nwords)?;
                let floats: Vec<String> = self.floats.iter().map(|v| v.to_string()).collect();
                writeln!(self.out, "{}", floats.join(" "))?;
                let ints: Vec<String> = self.ints.iter().map(|i| i.to_string()).collect();
                writeln!(self.out, "{}", ints.join(" "))?;
            }
        }
        Ok(())
    }
}

impl<W: Write> AlignmentSink for MilleWriter<W> {
    fn write_record(&mut self, record: &AlignmentRecord) -> Result<()> {
        if record.sigma <= 0.0 {
            warn!(
                "Skipping measurement with non-positive sigma {} (plane {})",
                record.sigma, record.plane
            );
            return Ok(());
        }
        self.open_block();

        let n_local = record.local.iter().filter(|d| **d != 0.0).count();
        let n_global = record.nonzero_globals().count();
        if self.floats.len() + n_local + n_global + 2 > self.capacity {
            // Error count lives in the first index slot
            self.ints[0] += 1;
            warn!(
                "Millepede buffer too short ({}): need {} local and {} global derivatives, {} slots used",
                self.capacity,
                n_local,
                n_global,
                self.floats.len()
            );
            return Ok(());
        }

        self.floats.push(record.residual);
        self.ints.push(0);
        for (i, &d) in record.local.iter().enumerate() {
            if d != 0.0 {
                self.floats.push(d);
                self.ints.push(i as i32 + 1);
            }
        }

        self.floats.push(record.sigma);
        self.ints.push(0);
        for (label, d) in record.nonzero_globals() {
            if label <= 0 {
                warn!("Global label {} out of range, derivative ignored", label);
                continue;
            }
            self.floats.push(d);
            self.ints.push(label);
        }
        Ok(())
    }

    fn end_track(&mut self) -> Result<()> {
        if self.floats.len() > 1 {
            self.write_block()?;
            self.blocks += 1;
        }
        self.floats.clear();
        self.ints.clear();
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// One decoded block of a binary record file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MilleBlock {
    pub floats: Vec<f32>,
    pub ints: Vec<i32>,
}

/// A measurement unpacked from a block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MilleMeasurement {
    pub residual: f32,
    pub sigma: f32,
    /// `(index, derivative)` with 1-based local indices.
    pub local: Vec<(i32, f32)>,
    /// `(label, derivative)`.
    pub global: Vec<(i32, f32)>,
}

impl MilleBlock {
    /// Split the block into its measurements.
    pub fn measurements(&self) -> Vec<MilleMeasurement> {
        let mut out = Vec::new();
        let mut i = 1;
        let n = self.floats.len().min(self.ints.len());
        while i < n {
            let mut m = MilleMeasurement {
                residual: self.floats[i],
                ..Default::default()
            };
            i += 1;
            while i < n && self.ints[i] != 0 {
                m.local.push((self.ints[i], self.floats[i]));
                i += 1;
            }
            if i < n {
                m.sigma = self.floats[i];
                i += 1;
            }
            while i < n && self.ints[i] != 0 {
                m.global.push((self.ints[i], self.floats[i]));
                i += 1;
            }
            out.push(m);
        }
        out
    }
}

/// Read every block of a binary record file.
pub fn read_blocks<R: Read>(reader: R) -> Result<Vec<MilleBlock>> {
    let mut reader = BufReader::new(reader);
    let mut blocks = Vec::new();
    let mut word = [0u8; 4];
    loop {
        if reader.fill_buf()?.is_empty() {
            break;
        }
        reader.read_exact(&mut word)?;
        let nwords = i32::from_le_bytes(word);
        if nwords < 0 || nwords % 2 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid Millepede word count {}", nwords),
            )
            .into());
        }
        let slots = nwords as usize / 2;
        let mut block = MilleBlock {
            floats: Vec::with_capacity(slots),
            ints: Vec::with_capacity(slots),
        };
        for _ in 0..slots {
            reader.read_exact(&mut word)?;
            block.floats.push(f32::from_le_bytes(word));
        }
        for _ in 0..slots {
            reader.read_exact(&mut word)?;
            block.ints.push(i32::from_le_bytes(word));
        }
        blocks.push(block);
    }
    Ok(blocks)
}
