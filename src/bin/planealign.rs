//! planealign CLI: run track finding, fitting and selection over an event
//! file (or simulated events) and write a Millepede record file.
//!
//! # Usage
//!
//! ```bash
//! planealign --config run.toml --hits hits.csv --output mille.bin
//! planealign --config run.toml --tracks tracks.csv --output mille.bin
//! planealign --simulate 10000 --seed 7 --output mille.bin --histograms histos.csv
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};
use tracing::{error, info};

use planealign::input::{read_hit_events_from_path, read_track_events_from_path};
use planealign::{
    AlignmentPipeline, Event, InputMode, MilleFormat, MilleWriter, RunConfig, RunHeader,
};

#[derive(Parser, Debug)]
#[command(name = "planealign")]
#[command(about = "Track-based alignment records for a planar sensor telescope")]
#[command(version)]
#[command(group(ArgGroup::new("source").required(true).args(["hits", "tracks", "simulate"])))]
struct Cli {
    /// Run configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Hit CSV: event,sensor_id,x,y,z (mm)
    #[arg(long)]
    hits: Option<PathBuf>,

    /// Pre-fit track CSV: event,track,hit_type,x,y,z (mm)
    #[arg(long)]
    tracks: Option<PathBuf>,

    /// Number of events to simulate
    #[arg(long)]
    simulate: Option<u64>,

    /// Seed for the simulation
    #[arg(long)]
    seed: Option<u64>,

    /// Run number attached to the events
    #[arg(long, default_value_t = 0)]
    run: u32,

    /// Detector count of the run header; checked against the configuration
    #[arg(long)]
    detectors: Option<usize>,

    /// Geometry ID of the run header
    #[arg(long)]
    geometry_id: Option<i32>,

    /// Millepede record file
    #[arg(short, long, default_value = "mille.bin")]
    output: PathBuf,

    /// Write the text variant of the record format
    #[arg(long)]
    text: bool,

    /// Write histogram contents to this CSV file
    #[arg(long)]
    histograms: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?,
        None => RunConfig::default(),
    };
    config.input_mode = if cli.tracks.is_some() {
        InputMode::PrefitTracks
    } else if cli.simulate.is_some() {
        InputMode::Simulation
    } else {
        InputMode::Hits
    };
    if cli.seed.is_some() {
        config.simulation.seed = cli.seed;
    }

    // Everything that can reject the run happens before the record file is opened.
    config.validate().context("Invalid configuration")?;
    if cli.detectors.is_some() || cli.geometry_id.is_some() {
        config.check_run_header(&RunHeader {
            run: cli.run,
            detector_count: cli.detectors.unwrap_or(config.n_planes()),
            geometry_id: cli.geometry_id.unwrap_or(config.geometry_id),
        })?;
    }

    let events = match (&cli.hits, &cli.tracks, cli.simulate) {
        (Some(path), _, _) => read_hit_events_from_path(path, cli.run)
            .with_context(|| format!("Failed to read hits from {}", path.display()))?,
        (_, Some(path), _) => read_track_events_from_path(path, cli.run)
            .with_context(|| format!("Failed to read tracks from {}", path.display()))?,
        (_, _, Some(n)) => (0..n).map(|i| Event::empty(cli.run, i)).collect(),
        _ => Vec::new(),
    };
    info!("{} events to process", events.len());

    let format = if cli.text {
        MilleFormat::Text
    } else {
        MilleFormat::Binary
    };
    let writer = MilleWriter::create(&cli.output, format)
        .with_context(|| format!("Failed to create {}", cli.output.display()))?;
    info!("Writing Millepede records to {}", cli.output.display());

    let mut pipeline = AlignmentPipeline::new(config, writer).context("Invalid configuration")?;
    pipeline.process_events(&events)?;
    pipeline.process_event(&Event::end_of_run(cli.run, events.len() as u64))?;

    let report = pipeline.finish()?;
    let blocks = report.sink.blocks_written();
    report.sink.finish().context("Failed to close record file")?;
    info!("{} track blocks written", blocks);

    if let Some(path) = &cli.histograms {
        report
            .diagnostics
            .write_csv_file(path)
            .with_context(|| format!("Failed to write histograms to {}", path.display()))?;
    }
    Ok(())
}
