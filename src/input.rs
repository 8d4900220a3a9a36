//! Event ingestion.
//!
//! Hits and pre-fit tracks are read from CSV files with a header row:
//!
//! ```text
//! event,sensor_id,x,y,z                 # hits, millimetres
//! event,track,hit_type,x,y,z            # pre-fit track hit records
//! ```
//!
//! Rows are grouped into events by consecutive event number, in file
//! order. Within an event, track records are grouped by consecutive track
//! number.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::Result;
use crate::hit::RawHit;
use crate::tracking::{PrefitHit, PrefitTrack};

/// Run-level header delivered before the first event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunHeader {
    pub run: u32,
    /// Number of detector planes the data were taken with.
    pub detector_count: usize,
    pub geometry_id: i32,
}

/// Kind of an event record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventKind {
    #[default]
    Data,
    /// Trailer marking the end of a run. Carries no data.
    EndOfRun,
}

/// One event with its input collections. A collection that was not
/// delivered is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Event {
    pub run: u32,
    pub number: u64,
    pub kind: EventKind,
    pub hits: Option<Vec<RawHit>>,
    pub tracks: Option<Vec<PrefitTrack>>,
}

impl Event {
    /// Data event carrying a hit collection.
    pub fn with_hits(run: u32, number: u64, hits: Vec<RawHit>) -> Self {
        Self {
            run,
            number,
            hits: Some(hits),
            ..Default::default()
        }
    }

    /// Data event carrying a pre-fit track collection.
    pub fn with_tracks(run: u32, number: u64, tracks: Vec<PrefitTrack>) -> Self {
        Self {
            run,
            number,
            tracks: Some(tracks),
            ..Default::default()
        }
    }

    /// Data event with no collections attached.
    pub fn empty(run: u32, number: u64) -> Self {
        Self {
            run,
            number,
            ..Default::default()
        }
    }

    pub fn end_of_run(run: u32, number: u64) -> Self {
        Self {
            run,
            number,
            kind: EventKind::EndOfRun,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct HitRow {
    event: u64,
    sensor_id: i32,
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Debug, Deserialize)]
struct TrackRow {
    event: u64,
    track: u64,
    hit_type: i32,
    x: f64,
    y: f64,
    z: f64,
}

/// Read hit events from CSV.
pub fn read_hit_events<R: Read>(reader: R, run: u32) -> Result<Vec<Event>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut events: Vec<Event> = Vec::new();
    for row in rdr.deserialize() {
        let row: HitRow = row?;
        let hit = RawHit {
            sensor_id: row.sensor_id,
            position: [row.x, row.y, row.z],
        };
        match events.last_mut() {
            Some(event) if event.number == row.event => {
                if let Some(hits) = event.hits.as_mut() {
                    hits.push(hit);
                }
            }
            _ => events.push(Event::with_hits(run, row.event, vec![hit])),
        }
    }
    debug!("Read {} hit events", events.len());
    Ok(events)
}

/// Read pre-fit track events from CSV.
pub fn read_track_events<R: Read>(reader: R, run: u32) -> Result<Vec<Event>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut events: Vec<Event> = Vec::new();
    let mut current_track: Option<u64> = None;
    for row in rdr.deserialize() {
        let row: TrackRow = row?;
        let hit = PrefitHit {
            hit_type: row.hit_type,
            position: [row.x, row.y, row.z],
        };

        let same_event = events.last().is_some_and(|e| e.number == row.event);
        if !same_event {
            events.push(Event::with_tracks(run, row.event, Vec::new()));
            current_track = None;
        }
        let Some(tracks) = events.last_mut().and_then(|e| e.tracks.as_mut()) else {
            continue;
        };
        if current_track != Some(row.track) {
            tracks.push(PrefitTrack::default());
            current_track = Some(row.track);
        }
        if let Some(track) = tracks.last_mut() {
            track.hits.push(hit);
        }
    }
    debug!("Read {} track events", events.len());
    Ok(events)
}

pub fn read_hit_events_from_path<P: AsRef<Path>>(path: P, run: u32) -> Result<Vec<Event>> {
    read_hit_events(File::open(path)?, run)
}

pub fn read_track_events_from_path<P: AsRef<Path>>(path: P, run: u32) -> Result<Vec<Event>> {
    read_track_events(File::open(path)?, run)
}
