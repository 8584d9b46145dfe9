#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};

use seisfetch::inventory::{Channel, Station, StationInventory};
use seisfetch::persist::file_name;
use seisfetch::segment::SegmentWindow;
use seisfetch::{FileNameFormat, RequestSpec, Trace, TraceBatch, TraceId, TraceWriter, WaveformSource};

pub const RATE: f64 = 0.1;
pub const DAY: f64 = 86_400.0;
pub const CHANNELS: [&str; 4] = ["HH1", "HH2", "HHZ", "HDH"];

pub fn init_logger() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2014, 8, 1, 0, 0, 0).unwrap()
}

pub fn channel(code: &str, dip: f64) -> Channel {
    Channel {
        location: String::new(),
        code: code.to_string(),
        azimuth: if code == "HH2" { 90.0 } else { 0.0 },
        dip,
        sample_rate: RATE,
        start: None,
        end: None,
        response: None,
    }
}

pub fn station(code: &str, latitude: f64) -> Station {
    Station {
        network: "YH".to_string(),
        code: code.to_string(),
        latitude,
        longitude: 178.9,
        elevation: -707.0,
        channels: vec![
            channel("HH1", 0.0),
            channel("HH2", 0.0),
            channel("HHZ", -90.0),
            channel("HDH", 0.0),
        ],
    }
}

pub fn inventory() -> StationInventory {
    StationInventory::new(vec![station("LOBS1", -39.0), station("LOBS2", -38.5)])
}

/// `days` of one-day segments from `t0`, four channels expected.
pub fn spec(days: i64) -> RequestSpec {
    RequestSpec::new(
        "IRIS",
        "YH",
        "LOBS1,LOBS2",
        "HH1,HH2,HHZ,HDH",
        t0(),
        t0() + chrono::Duration::days(days),
        DAY,
        4,
        "/data/out",
    )
}

/// A wiggle that never repeats a value within a window.
pub fn wiggle(n: usize) -> Vec<f64> {
    (0..n).map(|i| (i as f64 * 0.37).sin() * 1000.0).collect()
}

pub fn batch(station: &str, window: &SegmentWindow, channels: &[&str], npts: usize) -> TraceBatch {
    channels
        .iter()
        .map(|cha| Trace::new(TraceId::new("YH", station, "", cha), window.start, RATE, wiggle(npts)))
        .collect()
}

/// Serves synthetic full-length segments; windows listed in `failing`
/// return a fetch error instead.
pub struct MemorySource {
    pub inventory: Option<StationInventory>,
    pub channels: Vec<&'static str>,
    pub npts: usize,
    pub flat: bool,
    pub failing: Vec<DateTime<Utc>>,
    pub inventory_calls: Cell<usize>,
    pub fetches: RefCell<Vec<(String, SegmentWindow)>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            inventory: Some(inventory()),
            channels: CHANNELS.to_vec(),
            npts: (DAY * RATE) as usize,
            flat: false,
            failing: Vec::new(),
            inventory_calls: Cell::new(0),
            fetches: RefCell::new(Vec::new()),
        }
    }
}

impl WaveformSource for MemorySource {
    fn list_stations(&self, _spec: &RequestSpec) -> anyhow::Result<StationInventory> {
        self.inventory_calls.set(self.inventory_calls.get() + 1);
        self.inventory
            .clone()
            .ok_or_else(|| anyhow!("station service unreachable"))
    }

    fn fetch_waveforms(
        &self,
        _network: &str,
        station: &str,
        _location: &str,
        _channels: &str,
        window: &SegmentWindow,
    ) -> anyhow::Result<TraceBatch> {
        self.fetches.borrow_mut().push((station.to_string(), *window));
        if self.failing.contains(&window.start) {
            return Err(anyhow!("HTTP 503: service unavailable"));
        }
        let mut batch = batch(station, window, &self.channels, self.npts);
        if self.flat {
            for trace in batch.iter_mut() {
                trace.data.iter_mut().for_each(|x| *x = 0.0);
            }
        }
        Ok(batch)
    }
}

/// Keeps every trace it is asked to write.
#[derive(Default)]
pub struct RecordingWriter {
    pub written: Vec<(PathBuf, Trace)>,
}

impl TraceWriter for RecordingWriter {
    fn write(&mut self, trace: &Trace, format: &FileNameFormat, dir: &Path) -> anyhow::Result<PathBuf> {
        let path = dir.join(file_name(trace, format, "SAC"));
        self.written.push((path.clone(), trace.clone()));
        Ok(path)
    }
}
