//! Per-event orchestration: preprocess → find → fit → select → emit.
//!
//! An [`AlignmentPipeline`] owns everything that lives for a whole run: the
//! validated configuration, the record sink, the diagnostics and the run
//! counters. Events are processed one at a time and fully before the next.
//!
//! Only fatal errors leave [`AlignmentPipeline::process_event`]; everything
//! scoped to an event or track is logged and counted.

use std::fmt;

use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::config::{InputMode, RunConfig};
use crate::correlation::HitCorrelations;
use crate::diagnostics::Diagnostics;
use crate::error::{ConfigError, Error, Result};
use crate::geometry::TelescopeGeometry;
use crate::input::{Event, EventKind, RunHeader};
use crate::mille::{AlignmentSink, RecordEmitter};
use crate::simulation::TrackSimulator;
use crate::tracking::{
    candidates_from_prefit, find_candidates, fit_track, CandidateSearch, FinderConfig,
    TrackSelector,
};

/// Counters accumulated over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Data events seen.
    pub events: u64,
    /// Events skipped for a missing input collection.
    pub skipped_events: u64,
    /// Track candidates found.
    pub candidates: u64,
    /// Fitted tracks rejected by the residual cuts.
    pub rejected_by_residual_cuts: u64,
    /// Candidates whose fit was degenerate.
    pub failed_fits: u64,
    /// Alignment records written: one per plane and axis, so `2 * n_planes`
    /// per track. A count of measured planes is half this value.
    pub data_points: u64,
    /// Tracks written.
    pub tracks: u64,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} events ({} skipped), {} candidates, {} failed fits, {} rejected by residual cuts, {} tracks, {} data points",
            self.events,
            self.skipped_events,
            self.candidates,
            self.failed_fits,
            self.rejected_by_residual_cuts,
            self.tracks,
            self.data_points
        )
    }
}

/// What a finished run hands back.
#[derive(Debug)]
pub struct RunReport<S> {
    pub summary: RunSummary,
    pub diagnostics: Diagnostics,
    /// The flushed sink.
    pub sink: S,
}

/// Track-based alignment over a stream of events.
#[derive(Debug)]
pub struct AlignmentPipeline<S: AlignmentSink> {
    config: RunConfig,
    geometry: TelescopeGeometry,
    finder: FinderConfig,
    selector: TrackSelector,
    emitter: RecordEmitter,
    resolution: Vec<f64>,
    simulator: Option<TrackSimulator<StdRng>>,
    diagnostics: Diagnostics,
    summary: RunSummary,
    sink: S,
}

impl<S: AlignmentSink> AlignmentPipeline<S> {
    /// Validate `config` and set up a run writing to `sink`.
    ///
    /// In simulation mode the generator is seeded from
    /// `config.simulation.seed`.
    pub fn new(config: RunConfig, sink: S) -> Result<Self> {
        let simulator = match config.input_mode {
            InputMode::Simulation => Some(TrackSimulator::from_config(
                config.simulation.clone(),
                config.n_planes(),
            )?),
            _ => None,
        };
        Self::build(config, sink, simulator)
    }

    /// Simulation-mode pipeline with a caller-provided generator.
    pub fn with_simulator(
        mut config: RunConfig,
        sink: S,
        simulator: TrackSimulator<StdRng>,
    ) -> Result<Self> {
        config.input_mode = InputMode::Simulation;
        if simulator.n_planes() != config.n_planes() {
            return Err(ConfigError::PlaneCountMismatch {
                header: simulator.n_planes(),
                geometry: config.n_planes(),
            }
            .into());
        }
        Self::build(config, sink, Some(simulator))
    }

    fn build(
        config: RunConfig,
        sink: S,
        simulator: Option<TrackSimulator<StdRng>>,
    ) -> Result<Self> {
        config.validate()?;
        let geometry = config.geometry()?;
        let n_planes = config.n_planes();
        let resolution = match &simulator {
            Some(sim) => sim.resolution(),
            None => vec![config.resolution; n_planes],
        };

        info!(
            "Alignment run: {} planes, mode {}, input {:?}",
            n_planes, config.align_mode, config.input_mode
        );
        info!(
            "Resolution {} um, distance cut {} um per 10 cm, at most {} candidates per event",
            config.resolution, config.distance_max, config.max_track_candidates
        );
        if let Some(plane) = config.excluded_plane() {
            info!("Plane {} is excluded from the track fit", plane + 1);
        }
        let mut diagnostics = Diagnostics::new(n_planes);
        if config.correlation.enabled {
            info!(
                "Hit correlations booked for {} plane pairs",
                n_planes * (n_planes - 1)
            );
            diagnostics = diagnostics
                .with_correlations(HitCorrelations::new(n_planes, &config.correlation));
        }

        Ok(Self {
            finder: FinderConfig::from(&config),
            selector: TrackSelector::from_config(&config),
            emitter: RecordEmitter::new(config.align_mode, config.resolution),
            diagnostics,
            summary: RunSummary::default(),
            resolution,
            simulator,
            geometry,
            config,
            sink,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Check a run header against the configured geometry
    /// (see [`RunConfig::check_run_header`]).
    pub fn check_run_header(&self, header: &RunHeader) -> Result<()> {
        self.config.check_run_header(header)
    }

    /// Process one event.
    pub fn process_event(&mut self, event: &Event) -> Result<()> {
        if event.kind == EventKind::EndOfRun {
            debug!("End-of-run marker in run {}, event {}", event.run, event.number);
            return Ok(());
        }
        self.summary.events += 1;

        let search = match self.candidates_for(event) {
            Ok(search) => search,
            Err(e) if !e.is_fatal() => {
                warn!("{}", e);
                self.summary.skipped_events += 1;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let n_found = search.candidates.len();
        self.summary.candidates += n_found as u64;
        debug!("Event {}: {} track candidates", event.number, n_found);

        let mut accepted = 0;
        if self.config.only_single_track_events && n_found != 1 {
            debug!("Event {} is not a single-track event", event.number);
        } else {
            let exclude = self.config.excluded_plane();
            for candidate in search.candidates {
                let track = match fit_track(candidate, &self.resolution, &self.resolution, exclude) {
                    Ok(track) => track,
                    Err(e) if !e.is_fatal() => {
                        warn!("Event {}: {}", event.number, e);
                        self.summary.failed_fits += 1;
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if !self.selector.accept(&track) {
                    self.summary.rejected_by_residual_cuts += 1;
                    continue;
                }

                let written = self.emitter.emit(&track, &mut self.sink)?;
                self.summary.data_points += written as u64;
                self.summary.tracks += 1;
                self.diagnostics.fill_track(&track);
                accepted += 1;
            }
        }
        self.diagnostics.fill_event(accepted);
        Ok(())
    }

    /// Process a sequence of events, stopping at the first fatal error.
    pub fn process_events<'a, I>(&mut self, events: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        for event in events {
            self.process_event(event)?;
        }
        Ok(())
    }

    fn candidates_for(&mut self, event: &Event) -> Result<CandidateSearch> {
        let missing = |collection| Error::MissingCollection {
            collection,
            event: event.number,
            run: event.run,
        };
        if self.config.input_mode == InputMode::PrefitTracks {
            let tracks = event.tracks.as_deref().ok_or_else(|| missing("tracks"))?;
            return Ok(candidates_from_prefit(
                tracks,
                self.config.n_planes(),
                self.config.max_track_candidates,
            ));
        }
        let hits = match self.simulator.as_mut() {
            Some(sim) => sim.simulate_event().0,
            None => {
                let raw = event.hits.as_deref().ok_or_else(|| missing("hits"))?;
                self.geometry.build_plane_hits(raw)
            }
        };
        debug!("Hits per plane: {:?}", hits.multiplicities());
        self.diagnostics.fill_hits(&hits);
        Ok(find_candidates(&hits, &self.finder))
    }

    /// Flush the sink and report the run totals.
    pub fn finish(mut self) -> Result<RunReport<S>> {
        self.sink.flush()?;
        info!("Number of data points used: {}", self.summary.data_points);
        info!("Number of tracks used: {}", self.summary.tracks);
        info!("Run summary: {}", self.summary);
        if let Some(correlations) = &self.diagnostics.correlations {
            correlations.log_offsets();
        }
        Ok(RunReport {
            summary: self.summary,
            diagnostics: self.diagnostics,
            sink: self.sink,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlignMode, ResidualBounds};
    use crate::hit::RawHit;
    use crate::mille::MemorySink;
    use crate::tracking::{PrefitHit, PrefitTrack, FITTED_HIT_TYPE};

    /// Straight track through planes at z = 20, 40, ... mm.
    fn straight_hits(n_planes: usize, x0: f64, y0: f64) -> Vec<RawHit> {
        (0..n_planes)
            .map(|p| {
                let z = 20.0 * (p as f64 + 1.0);
                RawHit {
                    sensor_id: p as i32,
                    position: [x0 + 0.0001 * z, y0 - 0.0002 * z, z],
                }
            })
            .collect()
    }

    fn config(n_planes: usize) -> RunConfig {
        RunConfig {
            sensor_ids: (0..n_planes as i32).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_single_track_event() {
        let mut pipeline = AlignmentPipeline::new(config(4), MemorySink::new()).unwrap();
        pipeline
            .process_event(&Event::with_hits(1, 0, straight_hits(4, 1.0, -2.0)))
            .unwrap();
        let report = pipeline.finish().unwrap();
        assert_eq!(report.summary.events, 1);
        assert_eq!(report.summary.candidates, 1);
        assert_eq!(report.summary.tracks, 1);
        assert_eq!(report.summary.data_points, 8);
        assert_eq!(report.sink.tracks.len(), 1);
        assert_eq!(report.sink.tracks[0].len(), 8);
        assert_eq!(report.diagnostics.number_tracks.bins()[1], 1.0);
    }

    #[test]
    fn test_missing_collection_skips_event() {
        let mut pipeline = AlignmentPipeline::new(config(3), MemorySink::new()).unwrap();
        pipeline.process_event(&Event::empty(1, 3)).unwrap();
        // pre-fit tracks are not what this run reads
        pipeline
            .process_event(&Event::with_tracks(1, 4, Vec::new()))
            .unwrap();
        let summary = *pipeline.summary();
        assert_eq!(summary.events, 2);
        assert_eq!(summary.skipped_events, 2);
        assert_eq!(summary.tracks, 0);
        assert_eq!(pipeline.diagnostics().number_tracks.entries(), 0);
    }

    #[test]
    fn test_end_of_run_marker_is_ignored() {
        let mut pipeline = AlignmentPipeline::new(config(3), MemorySink::new()).unwrap();
        pipeline.process_event(&Event::end_of_run(1, 9)).unwrap();
        assert_eq!(*pipeline.summary(), RunSummary::default());
    }

    #[test]
    fn test_run_header_check() {
        let mut cfg = config(6);
        cfg.geometry_id = 12;
        let pipeline = AlignmentPipeline::new(cfg, MemorySink::new()).unwrap();
        let header = RunHeader {
            run: 1,
            detector_count: 6,
            geometry_id: 13,
        };
        assert!(pipeline.check_run_header(&header).is_ok());

        let header = RunHeader {
            detector_count: 5,
            ..header
        };
        let err = pipeline.check_run_header(&header).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            Error::Config(ConfigError::PlaneCountMismatch {
                header: 5,
                geometry: 6
            })
        ));
    }

    #[test]
    fn test_invalid_config_refuses_to_start() {
        let cfg = RunConfig {
            resolution: -1.0,
            ..Default::default()
        };
        let err = AlignmentPipeline::new(cfg, MemorySink::new()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_only_single_track_events() {
        let mut cfg = config(3);
        cfg.only_single_track_events = true;
        let mut pipeline = AlignmentPipeline::new(cfg, MemorySink::new()).unwrap();
        // two well separated tracks
        let mut hits = straight_hits(3, 0.0, 0.0);
        hits.extend(straight_hits(3, 5.0, 5.0));
        pipeline.process_event(&Event::with_hits(1, 0, hits)).unwrap();
        assert_eq!(pipeline.summary().candidates, 2);
        assert_eq!(pipeline.summary().tracks, 0);
        assert_eq!(pipeline.diagnostics().number_tracks.bins()[0], 1.0);

        pipeline
            .process_event(&Event::with_hits(1, 1, straight_hits(3, 0.0, 0.0)))
            .unwrap();
        assert_eq!(pipeline.summary().tracks, 1);
    }

    #[test]
    fn test_residual_cuts_reject_kinked_track() {
        let mut cfg = config(3);
        cfg.use_residual_cuts = true;
        cfg.residual_cuts = ResidualBounds::symmetric(3, 5.0);
        let mut pipeline = AlignmentPipeline::new(cfg, MemorySink::new()).unwrap();
        let mut hits = straight_hits(3, 0.0, 0.0);
        // 30 um kink on the middle plane
        hits[1].position[0] += 0.03;
        pipeline.process_event(&Event::with_hits(1, 0, hits)).unwrap();
        assert_eq!(pipeline.summary().rejected_by_residual_cuts, 1);
        assert_eq!(pipeline.summary().data_points, 0);
    }

    #[test]
    fn test_degenerate_fit_is_counted_not_fatal() {
        let mut pipeline = AlignmentPipeline::new(config(3), MemorySink::new()).unwrap();
        let hits: Vec<RawHit> = (0..3)
            .map(|p| RawHit {
                sensor_id: p,
                position: [0.0, 0.0, 20.0],
            })
            .collect();
        // zero gap gives a zero distance cut: no candidate at all
        pipeline.process_event(&Event::with_hits(1, 0, hits)).unwrap();
        assert_eq!(pipeline.summary().candidates, 0);

        // pre-fit input bypasses the cut and reaches the fit
        let mut cfg = config(3);
        cfg.input_mode = InputMode::PrefitTracks;
        let mut pipeline = AlignmentPipeline::new(cfg, MemorySink::new()).unwrap();
        let track = PrefitTrack {
            hits: (0..6)
                .map(|i| PrefitHit {
                    hit_type: if i % 2 == 1 { FITTED_HIT_TYPE } else { 1 },
                    position: [0.1 * i as f64, 0.0, 20.0],
                })
                .collect(),
        };
        pipeline
            .process_event(&Event::with_tracks(1, 0, vec![track]))
            .unwrap();
        assert_eq!(pipeline.summary().candidates, 1);
        assert_eq!(pipeline.summary().failed_fits, 1);
        assert_eq!(pipeline.summary().tracks, 0);
    }

    #[test]
    fn test_shift_and_rotation_records() {
        let mut cfg = config(4);
        cfg.align_mode = AlignMode::ShiftAndRotation;
        let mut pipeline = AlignmentPipeline::new(cfg, MemorySink::new()).unwrap();
        pipeline
            .process_event(&Event::with_hits(1, 0, straight_hits(4, 1.0, -2.0)))
            .unwrap();
        let report = pipeline.finish().unwrap();
        for record in &report.sink.tracks[0] {
            assert_eq!(record.global.len(), 12);
            assert_eq!(record.nonzero_globals().count(), 2);
            assert_eq!(record.sigma, 3.0);
        }
    }
}
