//! Stations and channels returned by the catalog service.

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};

use crate::response::{parse_fdsn_time, SacPzEntry};
use crate::trace::{Geometry, TraceId};

/// One channel epoch.
#[derive(Debug, Clone)]
pub struct Channel {
    pub location: String,
    pub code: String,
    pub azimuth: f64,
    /// Degrees down from horizontal.
    pub dip: f64,
    pub sample_rate: f64,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub response: Option<crate::response::PolesZeros>,
}

impl Channel {
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| s <= t) && self.end.map_or(true, |e| t < e)
    }
}

#[derive(Debug, Clone)]
pub struct Station {
    pub network: String,
    pub code: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
    pub channels: Vec<Channel>,
}

impl Station {
    pub fn geometry(&self) -> Geometry {
        Geometry {
            latitude: self.latitude,
            longitude: self.longitude,
            elevation: self.elevation,
        }
    }

    /// The epoch of `location.code` in effect at `at`, or any epoch of it when
    /// none covers that time.
    pub fn channel(&self, location: &str, code: &str, at: DateTime<Utc>) -> Option<&Channel> {
        let mut candidates = self
            .channels
            .iter()
            .filter(|c| c.location == location && c.code == code)
            .peekable();
        let first = *candidates.peek()?;
        Some(candidates.find(|c| c.covers(at)).unwrap_or(first))
    }
}

/// All stations of a run, fetched once and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct StationInventory {
    stations: Vec<Station>,
}

impl StationInventory {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn station(&self, network: &str, code: &str) -> Option<&Station> {
        self.stations
            .iter()
            .find(|s| s.network == network && s.code == code)
    }

    /// Hangs responses onto the matching channel epochs. Returns how many
    /// channels received one.
    pub fn attach_responses(&mut self, entries: &[SacPzEntry]) -> usize {
        let mut attached = 0;
        for station in self.stations.iter_mut() {
            for channel in station.channels.iter_mut() {
                let id = TraceId::new(&station.network, &station.code, &channel.location, &channel.code);
                let at = channel.start.unwrap_or(DateTime::<Utc>::MIN_UTC);
                let entry = entries
                    .iter()
                    .filter(|e| e.id == id)
                    .find(|e| channel.start.is_none() || e.covers(at));
                if let Some(entry) = entry {
                    channel.response = Some(entry.response.clone());
                    attached += 1;
                }
            }
        }
        attached
    }

    /// Parses an FDSN station web service text response at channel level:
    ///
    /// `Network|Station|Location|Channel|Latitude|Longitude|Elevation|Depth|Azimuth|Dip|SensorDescription|Scale|ScaleFreq|ScaleUnits|SampleRate|StartTime|EndTime`
    pub fn from_fdsn_text(text: &str) -> anyhow::Result<Self> {
        let mut stations: Vec<Station> = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('|').map(str::trim).collect();
            if fields.len() < 17 {
                return Err(anyhow!(
                    "line {}: expected 17 channel fields, found {}",
                    lineno + 1,
                    fields.len()
                ));
            }
            let num = |i: usize, name: &str| -> anyhow::Result<f64> {
                fields[i]
                    .parse::<f64>()
                    .with_context(|| format!("line {}: bad {} {:?}", lineno + 1, name, fields[i]))
            };
            let (latitude, longitude, elevation) = (
                num(4, "latitude")?,
                num(5, "longitude")?,
                num(6, "elevation")?,
            );
            let channel = Channel {
                location: fields[2].trim_matches('-').to_string(),
                code: fields[3].to_string(),
                azimuth: num(8, "azimuth").unwrap_or(0.0),
                dip: num(9, "dip").unwrap_or(0.0),
                sample_rate: num(14, "sample rate").unwrap_or(0.0),
                start: parse_fdsn_time(fields[15]),
                end: parse_fdsn_time(fields[16]),
                response: None,
            };

            match stations
                .iter_mut()
                .find(|s| s.network == fields[0] && s.code == fields[1])
            {
                Some(station) => station.channels.push(channel),
                None => stations.push(Station {
                    network: fields[0].to_string(),
                    code: fields[1].to_string(),
                    latitude,
                    longitude,
                    elevation,
                    channels: vec![channel],
                }),
            }
        }
        Ok(Self { stations })
    }
}
