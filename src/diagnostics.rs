//! Run diagnostics: fixed-bin histograms of track multiplicity, fit χ² and
//! per-plane residuals, plus the optional plane-to-plane hit correlations.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::correlation::HitCorrelations;
use crate::error::Result;
use crate::hit::PlaneHits;
use crate::tracking::FittedTrack;

/// A 1D histogram with uniform bins over `[min, max)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram1D {
    name: String,
    min: f64,
    max: f64,
    bins: Vec<f64>,
    underflow: f64,
    overflow: f64,
    entries: u64,
    sum: f64,
}

impl Histogram1D {
    /// # Panics
    /// If `n_bins` is zero or the range is empty.
    pub fn new(name: impl Into<String>, n_bins: usize, min: f64, max: f64) -> Self {
        assert!(n_bins > 0, "histogram needs at least one bin");
        assert!(max > min, "histogram range must not be empty");
        Self {
            name: name.into(),
            min,
            max,
            bins: vec![0.0; n_bins],
            underflow: 0.0,
            overflow: 0.0,
            entries: 0,
            sum: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_bins(&self) -> usize {
        self.bins.len()
    }

    pub fn bin_width(&self) -> f64 {
        (self.max - self.min) / self.bins.len() as f64
    }

    /// Lower edge of bin `i`.
    pub fn bin_low(&self, i: usize) -> f64 {
        self.min + i as f64 * self.bin_width()
    }

    pub fn bins(&self) -> &[f64] {
        &self.bins
    }

    pub fn underflow(&self) -> f64 {
        self.underflow
    }

    pub fn overflow(&self) -> f64 {
        self.overflow
    }

    /// Number of fills, including under- and overflows.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Mean of all filled values, `None` before the first fill.
    pub fn mean(&self) -> Option<f64> {
        (self.entries > 0).then(|| self.sum / self.entries as f64)
    }

    pub fn fill(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.entries += 1;
        self.sum += value;
        if value < self.min {
            self.underflow += 1.0;
        } else if value >= self.max {
            self.overflow += 1.0;
        } else {
            let idx = ((value - self.min) / self.bin_width()) as usize;
            let last = self.bins.len() - 1;
            self.bins[idx.min(last)] += 1.0;
        }
    }
}

/// A 2D histogram with uniform bins over `[x_min, x_max) × [y_min, y_max)`.
///
/// Fills outside the range are counted together in [`Histogram2D::outside`].
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram2D {
    name: String,
    x_range: (f64, f64),
    y_range: (f64, f64),
    nx: usize,
    ny: usize,
    /// Row-major: `bins[iy * nx + ix]`.
    bins: Vec<f64>,
    outside: f64,
    entries: u64,
    sum_x: f64,
    sum_y: f64,
}

impl Histogram2D {
    /// # Panics
    /// If either axis has no bins or an empty range.
    pub fn new(
        name: impl Into<String>,
        (nx, x_min, x_max): (usize, f64, f64),
        (ny, y_min, y_max): (usize, f64, f64),
    ) -> Self {
        assert!(nx > 0 && ny > 0, "histogram needs at least one bin per axis");
        assert!(
            x_max > x_min && y_max > y_min,
            "histogram range must not be empty"
        );
        Self {
            name: name.into(),
            x_range: (x_min, x_max),
            y_range: (y_min, y_max),
            nx,
            ny,
            bins: vec![0.0; nx * ny],
            outside: 0.0,
            entries: 0,
            sum_x: 0.0,
            sum_y: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_bins(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    pub fn bin_width(&self) -> (f64, f64) {
        (
            (self.x_range.1 - self.x_range.0) / self.nx as f64,
            (self.y_range.1 - self.y_range.0) / self.ny as f64,
        )
    }

    /// Lower edges of bin `(ix, iy)`.
    pub fn bin_low(&self, ix: usize, iy: usize) -> (f64, f64) {
        let (wx, wy) = self.bin_width();
        (
            self.x_range.0 + ix as f64 * wx,
            self.y_range.0 + iy as f64 * wy,
        )
    }

    /// Content of bin `(ix, iy)`.
    pub fn get(&self, ix: usize, iy: usize) -> f64 {
        self.bins[iy * self.nx + ix]
    }

    pub fn outside(&self) -> f64 {
        self.outside
    }

    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Means of all filled x and y values, `None` before the first fill.
    pub fn mean(&self) -> Option<(f64, f64)> {
        (self.entries > 0).then(|| {
            let n = self.entries as f64;
            (self.sum_x / n, self.sum_y / n)
        })
    }

    pub fn fill(&mut self, x: f64, y: f64) {
        if x.is_nan() || y.is_nan() {
            return;
        }
        self.entries += 1;
        self.sum_x += x;
        self.sum_y += y;
        match (
            axis_index(x, self.x_range, self.nx),
            axis_index(y, self.y_range, self.ny),
        ) {
            (Some(ix), Some(iy)) => self.bins[iy * self.nx + ix] += 1.0,
            _ => self.outside += 1.0,
        }
    }

    /// Non-empty bins as `(ix, iy, content)`.
    pub fn filled_bins(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.bins
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c != 0.0)
            .map(|(i, &c)| (i % self.nx, i / self.nx, c))
    }
}

fn axis_index(value: f64, (min, max): (f64, f64), n: usize) -> Option<usize> {
    if value < min || value >= max {
        return None;
    }
    let idx = ((value - min) / (max - min) * n as f64) as usize;
    Some(idx.min(n - 1))
}

#[derive(Serialize)]
struct BinRow<'a> {
    histogram: &'a str,
    bin: String,
    low: f64,
    high: f64,
    /// y edges, empty for 1D histograms.
    y_low: Option<f64>,
    y_high: Option<f64>,
    content: f64,
}

/// Histograms filled by the alignment pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostics {
    /// Accepted tracks per event.
    pub number_tracks: Histogram1D,
    pub chi2_x: Histogram1D,
    pub chi2_y: Histogram1D,
    /// One per plane.
    pub residual_x: Vec<Histogram1D>,
    /// One per plane.
    pub residual_y: Vec<Histogram1D>,
    /// Hit correlations between planes, when enabled.
    pub correlations: Option<HitCorrelations>,
}

impl Diagnostics {
    pub fn new(n_planes: usize) -> Self {
        let residual = |axis: &str, i: usize| {
            Histogram1D::new(format!("Residual{axis}_d{i}"), 10000, -5000.0, 5000.0)
        };
        Self {
            number_tracks: Histogram1D::new("NumberTracks", 20, -0.5, 19.5),
            chi2_x: Histogram1D::new("Chi2X", 10000, 0.0, 1.0e7),
            chi2_y: Histogram1D::new("Chi2Y", 10000, 0.0, 1.0e7),
            residual_x: (0..n_planes).map(|i| residual("X", i)).collect(),
            residual_y: (0..n_planes).map(|i| residual("Y", i)).collect(),
            correlations: None,
        }
    }

    /// Also book plane-to-plane hit correlations.
    pub fn with_correlations(mut self, correlations: HitCorrelations) -> Self {
        self.correlations = Some(correlations);
        self
    }

    /// Fill the per-event hit histograms.
    pub fn fill_hits(&mut self, hits: &PlaneHits) {
        if let Some(c) = self.correlations.as_mut() {
            c.fill(hits);
        }
    }

    /// Fill the per-track histograms.
    pub fn fill_track(&mut self, track: &FittedTrack) {
        let [chi2_x, chi2_y] = track.chi2();
        self.chi2_x.fill(chi2_x);
        self.chi2_y.fill(chi2_y);
        for plane in 0..track.n_planes().min(self.residual_x.len()) {
            let [rx, ry] = track.residual(plane);
            self.residual_x[plane].fill(rx);
            self.residual_y[plane].fill(ry);
        }
    }

    /// Fill the per-event track multiplicity.
    pub fn fill_event(&mut self, accepted_tracks: usize) {
        self.number_tracks.fill(accepted_tracks as f64);
    }

    /// All histograms in booking order.
    pub fn histograms(&self) -> impl Iterator<Item = &Histogram1D> {
        [&self.number_tracks, &self.chi2_x, &self.chi2_y]
            .into_iter()
            .chain(self.residual_x.iter())
            .chain(self.residual_y.iter())
    }

    /// Look up a histogram by name.
    pub fn get(&self, name: &str) -> Option<&Histogram1D> {
        self.histograms().find(|h| h.name() == name)
    }

    /// Dump every non-empty bin as CSV rows
    /// `histogram,bin,low,high,y_low,y_high,content`. Under- and overflow
    /// appear as bins `underflow` / `overflow`. Correlation bins are named
    /// `ix:iy` and carry their y edges; their out-of-range fills are one
    /// `outside` row.
    pub fn write_csv<W: Write>(&self, out: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(out);
        for h in self.histograms() {
            let width = h.bin_width();
            if h.underflow > 0.0 {
                wtr.serialize(BinRow {
                    histogram: h.name(),
                    bin: "underflow".to_string(),
                    low: f64::NEG_INFINITY,
                    high: h.min,
                    y_low: None,
                    y_high: None,
                    content: h.underflow,
                })?;
            }
            for (i, &content) in h.bins.iter().enumerate() {
                if content == 0.0 {
                    continue;
                }
                let low = h.bin_low(i);
                wtr.serialize(BinRow {
                    histogram: h.name(),
                    bin: i.to_string(),
                    low,
                    high: low + width,
                    y_low: None,
                    y_high: None,
                    content,
                })?;
            }
            if h.overflow > 0.0 {
                wtr.serialize(BinRow {
                    histogram: h.name(),
                    bin: "overflow".to_string(),
                    low: h.max,
                    high: f64::INFINITY,
                    y_low: None,
                    y_high: None,
                    content: h.overflow,
                })?;
            }
        }
        for h in self.correlations.iter().flat_map(|c| c.histograms()) {
            let (wx, wy) = h.bin_width();
            for (ix, iy, content) in h.filled_bins() {
                let (low, y_low) = h.bin_low(ix, iy);
                wtr.serialize(BinRow {
                    histogram: h.name(),
                    bin: format!("{ix}:{iy}"),
                    low,
                    high: low + wx,
                    y_low: Some(y_low),
                    y_high: Some(y_low + wy),
                    content,
                })?;
            }
            if h.outside > 0.0 {
                wtr.serialize(BinRow {
                    histogram: h.name(),
                    bin: "outside".to_string(),
                    low: h.x_range.0,
                    high: h.x_range.1,
                    y_low: Some(h.y_range.0),
                    y_high: Some(h.y_range.1),
                    content: h.outside,
                })?;
            }
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_csv_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.write_csv(file)?;
        info!("Wrote histograms to {}", path.as_ref().display());
        Ok(())
    }
}
