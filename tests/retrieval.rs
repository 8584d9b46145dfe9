use chrono::Duration;

use seisfetch::inventory::StationInventory;
use seisfetch::segment::SegmentWindow;
use seisfetch::*;

mod common;
use common::*;

#[test]
fn two_stations_two_days() {
    init_logger();
    let mut r = Retriever::new(spec(2), MemorySource::new(), RecordingWriter::default());
    r.run().unwrap();

    let written = &r.writer().written;
    assert_eq!(written.len(), 16);
    assert_eq!(r.source().fetches.borrow().len(), 4);
    assert_eq!(
        written[0].0.to_str().unwrap(),
        "/data/out/2014.213.00.00:00.000000.YH.LOBS1..HH1.SAC"
    );
    assert_eq!(
        written[15].0.to_str().unwrap(),
        "/data/out/2014.214.00.00:00.000000.YH.LOBS2..HDH.SAC"
    );
    for (_, trace) in written {
        let geometry = trace.geometry.unwrap();
        let expected_lat = if trace.id.station == "LOBS1" { -39.0 } else { -38.5 };
        assert_eq!(geometry.latitude, expected_lat);
        assert_eq!(geometry.elevation, -707.0);
        let orientation = trace.orientation.unwrap();
        let dip = if trace.id.channel == "HHZ" { -90.0 } else { 0.0 };
        assert_eq!(orientation.inclination, dip + 90.0);
        let azimuth = if trace.id.channel == "HH2" { 90.0 } else { 0.0 };
        assert_eq!(orientation.azimuth, azimuth);
        // raw data when preprocessing is off
        assert_eq!(trace.unit, Unit::Counts);
    }
}

#[test]
fn windows_step_without_overlap() {
    init_logger();
    let mut s = spec(3);
    s.segment_duration = 0.75 * common::DAY;
    let mut r = Retriever::new(s, MemorySource::new(), RecordingWriter::default());
    r.run().unwrap();

    let fetches = r.source().fetches.borrow();
    let lobs1: Vec<SegmentWindow> = fetches
        .iter()
        .filter(|(sta, _)| sta == "LOBS1")
        .map(|(_, w)| *w)
        .collect();
    // 72 h of 18 h windows
    assert_eq!(lobs1.len(), 4);
    for pair in lobs1.windows(2) {
        assert_eq!(pair[0].length(), Duration::hours(18));
        assert_eq!(pair[1].start, pair[0].end);
    }
    assert!(lobs1.last().unwrap().end <= t0() + Duration::days(3));
}

#[test]
fn failed_fetch_skips_only_that_window() {
    init_logger();
    let mut source = MemorySource::new();
    source.failing = vec![t0() + Duration::days(1)];
    let mut r = Retriever::new(spec(2), source, RecordingWriter::default());
    r.run().unwrap();

    let written = &r.writer().written;
    assert_eq!(written.len(), 8);
    assert!(written.iter().all(|(_, tr)| tr.start_time == t0()));
    assert_eq!(
        written
            .iter()
            .filter(|(_, tr)| tr.id.station == "LOBS2")
            .count(),
        4
    );
    // the failed window was attempted once per station, never retried
    assert_eq!(r.source().fetches.borrow().len(), 4);
}

#[test]
fn segment_longer_than_interval_is_fatal() {
    init_logger();
    let mut s = spec(1);
    s.segment_duration = 2.0 * common::DAY;
    let mut r = Retriever::new(s, MemorySource::new(), RecordingWriter::default());
    match r.run() {
        Err(RunError::Config(ConfigError::SegmentExceedsInterval { duration, interval })) => {
            assert_eq!(duration, 2.0 * common::DAY);
            assert_eq!(interval, common::DAY);
        }
        other => panic!("expected a configuration error, got {:?}", other),
    }
    assert_eq!(r.source().inventory_calls.get(), 0);
    assert!(r.source().fetches.borrow().is_empty());
}

#[test]
fn inventory_failure_ends_run() {
    init_logger();
    let mut source = MemorySource::new();
    source.inventory = None;
    let mut r = Retriever::new(spec(2), source, RecordingWriter::default());
    assert!(matches!(r.run(), Err(RunError::Inventory(_))));
    assert!(r.source().fetches.borrow().is_empty());
}

#[test]
fn missing_channel_not_persisted() {
    init_logger();
    let mut source = MemorySource::new();
    source.channels = vec!["HH1", "HH2", "HHZ"];
    let mut r = Retriever::new(spec(1), source, RecordingWriter::default());
    let inv = inventory();
    let window = SegmentWindow::first(t0(), Duration::days(1));
    match r.process_segment(&inv.stations()[0], &window, &inv) {
        SegmentOutcome::Failed(SegmentError::ChannelCountMismatch { expected, found }) => {
            assert_eq!(expected, 4);
            assert_eq!(found, 3);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    r.run().unwrap();
    assert!(r.writer().written.is_empty());
}

#[test]
fn all_zero_batch_rejected() {
    init_logger();
    let mut source = MemorySource::new();
    source.flat = true;
    let mut r = Retriever::new(spec(2), source, RecordingWriter::default());
    let inv = inventory();
    let window = SegmentWindow::first(t0(), Duration::days(1));
    assert!(matches!(
        r.process_segment(&inv.stations()[0], &window, &inv),
        SegmentOutcome::Failed(SegmentError::Rejected(Rejection::ConstantSignal))
    ));
    r.run().unwrap();
    assert!(r.writer().written.is_empty());
}

#[test]
fn strict_length_tolerates_one_sample() {
    init_logger();
    let inv = inventory();
    let window = SegmentWindow::first(t0(), Duration::days(1));
    let full = (common::DAY * common::RATE) as usize;

    let mut s = spec(1);
    s.strict_length = true;

    let mut source = MemorySource::new();
    source.npts = full - 1;
    let mut r = Retriever::new(s.clone(), source, RecordingWriter::default());
    assert!(r.process_segment(&inv.stations()[0], &window, &inv).is_persisted());

    let mut source = MemorySource::new();
    source.npts = full - 2;
    let mut r = Retriever::new(s.clone(), source, RecordingWriter::default());
    assert!(matches!(
        r.process_segment(&inv.stations()[0], &window, &inv),
        SegmentOutcome::Failed(SegmentError::Rejected(Rejection::ShortSegment))
    ));

    // without the flag short segments are kept
    s.strict_length = false;
    let mut source = MemorySource::new();
    source.npts = full / 2;
    let mut r = Retriever::new(s, source, RecordingWriter::default());
    assert!(r.process_segment(&inv.stations()[0], &window, &inv).is_persisted());
}

fn with_responses(mut inv: StationInventory) -> StationInventory {
    use num_complex::Complex64;
    use seisfetch::response::SacPzEntry;

    let mut entries = Vec::new();
    for station in inv.stations() {
        for channel in &station.channels {
            let input_unit = if channel.code == "HDH" {
                Unit::Pressure
            } else {
                Unit::Velocity
            };
            entries.push(SacPzEntry {
                id: TraceId::new(&station.network, &station.code, &channel.location, &channel.code),
                start: None,
                end: None,
                response: PolesZeros {
                    zeros: vec![Complex64::new(0.0, 0.0)],
                    poles: vec![Complex64::new(-0.01, 0.0)],
                    constant: 1.0e9,
                    input_unit,
                },
            });
        }
    }
    assert_eq!(inv.attach_responses(&entries), 8);
    inv
}

#[test]
fn preprocessing_sets_output_units() {
    init_logger();
    let mut source = MemorySource::new();
    source.inventory = Some(with_responses(inventory()));
    let mut s = spec(1);
    s.preprocess = true;
    let mut r = Retriever::new(s, source, RecordingWriter::default());
    r.run().unwrap();

    let written = &r.writer().written;
    assert_eq!(written.len(), 8);
    for (_, trace) in written {
        match trace.id.channel.as_str() {
            "HDH" => assert_eq!(trace.unit, Unit::Pressure),
            _ => assert_eq!(trace.unit, Unit::Displacement),
        }
        assert!(trace.data.iter().all(|x| x.is_finite()));
    }
}

#[test]
fn missing_response_fails_segment_only() {
    init_logger();
    let mut s = spec(2);
    s.preprocess = true;
    let mut r = Retriever::new(s, MemorySource::new(), RecordingWriter::default());
    let inv = inventory();
    let window = SegmentWindow::first(t0(), Duration::days(1));
    match r.process_segment(&inv.stations()[0], &window, &inv) {
        SegmentOutcome::Failed(e) => assert!(e.is_missing_response()),
        other => panic!("unexpected outcome {:?}", other),
    }
    r.run().unwrap();
    assert!(r.writer().written.is_empty());
    assert_eq!(r.source().fetches.borrow().len(), 1 + 4);
}
