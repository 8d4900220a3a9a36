//! Behavioural guarantees of the candidate finder, the fit and the record
//! stream, checked through the public API.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use planealign::{
    find_candidates, fit_track, AlignMode, AlignmentPipeline, Event, FinderConfig, Hit,
    MemorySink, PlaneHits, RawHit, RunConfig, TrackCandidate,
};

fn finder(distance_max: f64, max_candidates: usize) -> FinderConfig {
    FinderConfig {
        distance_max,
        max_candidates,
        only_single_hit_events: false,
    }
}

/// Busy event: several hits per plane spread over a small area.
fn busy_event(rng: &mut StdRng, n_planes: usize, per_plane: usize) -> PlaneHits {
    let mut hits = PlaneHits::new(n_planes);
    for plane in 0..n_planes {
        for _ in 0..per_plane {
            let x = rng.random_range(-300.0..300.0);
            let y = rng.random_range(-300.0..300.0);
            hits.push(Hit::new(x, y, 20000.0 * plane as f64, plane));
        }
    }
    hits
}

/// `per_plane` hits 1 um apart on each plane, all mutually compatible.
fn close_hits(n_planes: usize, per_plane: usize) -> PlaneHits {
    let mut hits = PlaneHits::new(n_planes);
    for plane in 0..n_planes {
        for k in 0..per_plane {
            hits.push(Hit::new(k as f64, 0.0, 20000.0 * plane as f64, plane));
        }
    }
    hits
}

#[test]
fn test_finder_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..20 {
        let hits = busy_event(&mut rng, 5, 4);
        let cfg = finder(2000.0, 2000);
        let first = find_candidates(&hits, &cfg);
        let second = find_candidates(&hits, &cfg);
        assert_eq!(first, second);
    }
}

#[test]
fn test_distance_cut_is_strict() {
    let pair = |dx: f64| {
        let mut hits = PlaneHits::new(2);
        hits.push(Hit::new(0.0, 0.0, 0.0, 0));
        hits.push(Hit::new(dx, 0.0, 100000.0, 1));
        find_candidates(&hits, &finder(30.0, 10)).candidates.len()
    };
    assert_eq!(pair(30.0), 0, "equality must not pass");
    assert_eq!(pair(29.999), 1);
    assert_eq!(pair(30.001), 0);
}

#[test]
fn test_distance_cut_scales_with_gap() {
    // 20 um step over a 50000 um gap: allowed 15 with a cut of 30 per 10 cm
    let mut hits = PlaneHits::new(2);
    hits.push(Hit::new(0.0, 0.0, 0.0, 0));
    hits.push(Hit::new(12.0, 16.0, 50000.0, 1));
    assert!(find_candidates(&hits, &finder(30.0, 10)).candidates.is_empty());
    assert_eq!(find_candidates(&hits, &finder(41.0, 10)).candidates.len(), 1);
}

#[test]
fn test_fit_is_exact_on_a_line() {
    let hits = [0.0, 50000.0, 100000.0]
        .iter()
        .enumerate()
        .map(|(p, &z)| Hit::new(10.0 + 0.01 * z, -5.0 + 0.002 * z, z, p))
        .collect();
    let track = fit_track(TrackCandidate::new(hits), &[3.0; 3], &[3.0; 3], None).unwrap();
    for plane in 0..3 {
        let [rx, ry] = track.residual(plane);
        assert!(rx.abs() < 1e-9 && ry.abs() < 1e-9);
    }
    let [ax, ay] = track.angle();
    assert!((ax - 0.01f64.atan()).abs() < 1e-12);
    assert!((ay - 0.002f64.atan()).abs() < 1e-12);
}

#[test]
fn test_measured_plus_residual_is_on_the_line() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..50 {
        let hits: Vec<Hit> = (0..6)
            .map(|p| {
                let z = 20000.0 * p as f64 + rng.random_range(-500.0..500.0);
                Hit::new(rng.random_range(-10.0..10.0), rng.random_range(-10.0..10.0), z, p)
            })
            .collect();
        let track = fit_track(TrackCandidate::new(hits.clone()), &[3.0; 6], &[4.0; 6], None).unwrap();
        for (i, h) in hits.iter().enumerate() {
            assert!((h.x + track.x.residuals[i] - track.x.at(h.z)).abs() < 1e-9);
            assert!((h.y + track.y.residuals[i] - track.y.at(h.z)).abs() < 1e-9);
        }
    }
}

#[test]
fn test_candidate_cap_limits_record_stream() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
    // 3 planes x 3 close hits: 27 valid chains
    let hits = close_hits(3, 3);
    let search = find_candidates(&hits, &finder(2000.0, 5));
    assert_eq!(search.candidates.len(), 5);
    assert!(search.truncated);

    let config = RunConfig {
        sensor_ids: vec![0, 1, 2],
        max_track_candidates: 5,
        ..Default::default()
    };
    let raw: Vec<RawHit> = (0..3)
        .flat_map(|plane| {
            (0..3).map(move |k| RawHit {
                sensor_id: plane,
                position: [0.001 * k as f64, 0.0, 20.0 * (plane as f64 + 1.0)],
            })
        })
        .collect();
    let mut pipeline = AlignmentPipeline::new(config, MemorySink::new()).unwrap();
    pipeline.process_event(&Event::with_hits(1, 0, raw)).unwrap();
    let report = pipeline.finish().unwrap();
    assert_eq!(report.summary.candidates, 5);
    assert_eq!(report.summary.tracks, 5);
    assert_eq!(report.sink.tracks.len(), 5);
}

#[test]
fn test_record_count_and_global_shape_per_mode() {
    let mut rng = StdRng::seed_from_u64(8);
    for (mode, per_plane, nonzero) in [
        (AlignMode::ShiftOnly, 2, 1),
        (AlignMode::ShiftAndRotation, 3, 2),
    ] {
        for n_planes in [2usize, 4, 6, 8] {
            let config = RunConfig {
                sensor_ids: (0..n_planes as i32).collect(),
                align_mode: mode,
                ..Default::default()
            };
            let (x0, y0) = (rng.random_range(1.0..3.0), rng.random_range(1.0..3.0));
            let raw: Vec<RawHit> = (0..n_planes)
                .map(|p| RawHit {
                    sensor_id: p as i32,
                    position: [x0, y0, 20.0 * (p as f64 + 1.0)],
                })
                .collect();
            let mut pipeline = AlignmentPipeline::new(config, MemorySink::new()).unwrap();
            pipeline.process_event(&Event::with_hits(1, 0, raw)).unwrap();
            let report = pipeline.finish().unwrap();

            assert_eq!(report.sink.tracks.len(), 1);
            let records = &report.sink.tracks[0];
            assert_eq!(records.len(), 2 * n_planes);
            for (k, r) in records.iter().enumerate() {
                assert_eq!(r.plane, k / 2);
                assert_eq!(r.global.len(), per_plane * n_planes);
                assert_eq!(r.nonzero_globals().count(), nonzero);
                // every non-zero global belongs to the record's plane
                for (label, _) in r.nonzero_globals() {
                    let slot = (label - 1) as usize;
                    assert_eq!(slot / per_plane, r.plane);
                }
            }
        }
    }
}

#[test]
fn test_single_hit_filter() {
    let mut hits = PlaneHits::new(3);
    for plane in 0..3 {
        hits.push(Hit::new(0.0, 0.0, 20000.0 * plane as f64, plane));
    }
    let cfg = FinderConfig {
        only_single_hit_events: true,
        ..finder(2000.0, 100)
    };
    assert_eq!(find_candidates(&hits, &cfg).candidates.len(), 1);

    // A second hit far away on plane 1 disables the event
    hits.push(Hit::new(5000.0, 5000.0, 20000.0, 1));
    assert!(find_candidates(&hits, &cfg).candidates.is_empty());
    assert_eq!(find_candidates(&hits, &finder(2000.0, 100)).candidates.len(), 1);
}
