//! Traces and the batches the retrieval loop passes between stages.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::response::PolesZeros;

/// `NET.STA.LOC.CHA`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

impl TraceId {
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        Self {
            network: network.trim().to_string(),
            station: station.trim().to_string(),
            location: location.trim().to_string(),
            channel: channel.trim().to_string(),
        }
    }

    /// FDSN source identifier, `FDSN:NET_STA_LOC_B_S_SS`.
    pub fn fdsn_sid(&self) -> String {
        let mut chars = self.channel.chars();
        let band = chars.next().map(String::from).unwrap_or_default();
        let source = chars.next().map(String::from).unwrap_or_default();
        let subsource: String = chars.collect();
        format!(
            "FDSN:{}_{}_{}_{}_{}_{}",
            self.network, self.station, self.location, band, source, subsource
        )
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.network, self.station, self.location, self.channel
        )
    }
}

/// Sensor class of a channel, taken from the instrument letter of the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelFamily {
    /// `?H?`, seismometer
    Motion,
    /// `?D?`, pressure sensor (hydrophone, differential pressure gauge)
    Pressure,
    Other,
}

impl ChannelFamily {
    pub fn from_channel_code(code: &str) -> Self {
        match code.chars().nth(1) {
            Some('H') => ChannelFamily::Motion,
            Some('D') => ChannelFamily::Pressure,
            _ => ChannelFamily::Other,
        }
    }
}

/// Physical unit of trace samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Counts,
    Displacement,
    Velocity,
    Acceleration,
    Pressure,
    Unknown,
}

impl Unit {
    /// Parses the unit strings used by StationXML and SAC pole-zero files.
    pub fn from_response_unit(s: &str) -> Self {
        let s = s.trim().to_ascii_uppercase();
        let head = s.split_whitespace().next().unwrap_or("");
        match head {
            "M" | "NM" | "MM" | "CM" => Unit::Displacement,
            "M/S" | "NM/S" | "MM/S" | "CM/S" => Unit::Velocity,
            "M/S**2" | "M/S/S" | "M/S2" | "NM/S**2" | "NM/S/S" | "CM/S**2" => Unit::Acceleration,
            "PA" | "KPA" | "HPA" | "MBAR" | "BAR" => Unit::Pressure,
            "COUNTS" | "COUNT" => Unit::Counts,
            _ => Unit::Unknown,
        }
    }

    /// Differentiation order relative to displacement for kinematic units.
    pub(crate) fn kinematic_order(&self) -> Option<i32> {
        match self {
            Unit::Displacement => Some(0),
            Unit::Velocity => Some(1),
            Unit::Acceleration => Some(2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
}

/// Component orientation. Inclination is measured from vertical-down,
/// `inclination = dip + 90`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub azimuth: f64,
    pub inclination: f64,
}

/// One channel's continuous samples.
#[derive(Debug, Clone)]
pub struct Trace {
    pub id: TraceId,
    pub start_time: DateTime<Utc>,
    pub sampling_rate: f64,
    pub data: Vec<f64>,
    pub unit: Unit,
    /// Set by the imprinter.
    pub family: Option<ChannelFamily>,
    pub geometry: Option<Geometry>,
    pub orientation: Option<Orientation>,
    pub response: Option<PolesZeros>,
}

impl Trace {
    pub fn new(id: TraceId, start_time: DateTime<Utc>, sampling_rate: f64, data: Vec<f64>) -> Self {
        Self {
            id,
            start_time,
            sampling_rate,
            data,
            unit: Unit::Counts,
            family: None,
            geometry: None,
            orientation: None,
            response: None,
        }
    }

    pub fn npts(&self) -> usize {
        self.data.len()
    }

    pub fn delta(&self) -> f64 {
        if self.sampling_rate > 0.0 {
            1.0 / self.sampling_rate
        } else {
            0.0
        }
    }

    /// Time of the last sample.
    pub fn end_time(&self) -> DateTime<Utc> {
        let n = self.data.len().saturating_sub(1) as f64;
        self.start_time + seconds(n * self.delta())
    }

    /// Keeps the samples inside `[start, end]`, both ends inclusive, and
    /// moves `start_time` to the first kept sample. Traces without a usable
    /// rate are left as they are.
    pub fn trim(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        if !(self.sampling_rate.is_finite() && self.sampling_rate > 0.0) {
            return;
        }
        // sample times within a microsecond of an edge count as on it
        const SLACK: f64 = 1e-6;
        let rate = self.sampling_rate;
        let first = (seconds_between(self.start_time, start) * rate - SLACK * rate).ceil().max(0.0);
        let last = (seconds_between(self.start_time, end) * rate + SLACK * rate).floor();
        let n = self.data.len() as f64;
        if last < first || first >= n {
            self.data.clear();
            return;
        }
        let (first, last) = (first as usize, (last.min(n - 1.0)) as usize);
        self.data.truncate(last + 1);
        self.data.drain(..first);
        self.start_time += seconds(first as f64 * self.delta());
    }

    /// Family resolved at imprint time, or derived from the code if the trace
    /// has not been imprinted yet.
    pub fn family(&self) -> ChannelFamily {
        self.family
            .unwrap_or_else(|| ChannelFamily::from_channel_code(&self.id.channel))
    }
}

/// The traces returned for one (station, window) pair.
#[derive(Debug, Clone, Default)]
pub struct TraceBatch {
    traces: Vec<Trace>,
}

impl TraceBatch {
    pub fn new(traces: Vec<Trace>) -> Self {
        Self { traces }
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    pub fn traces(&self) -> &[Trace] {
        &self.traces
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Trace> {
        self.traces.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Trace> {
        self.traces.iter_mut()
    }

    pub fn push(&mut self, trace: Trace) {
        self.traces.push(trace)
    }

    /// Trims every trace to `[start, end]` and drops the ones left empty.
    pub fn trim(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) {
        for trace in self.traces.iter_mut() {
            trace.trim(start, end);
        }
        self.traces.retain(|t| !t.data.is_empty());
    }

    /// Distinct channel codes, gaps split one channel into several traces.
    pub fn channel_codes(&self) -> BTreeSet<&str> {
        self.traces.iter().map(|t| t.id.channel.as_str()).collect()
    }
}

impl IntoIterator for TraceBatch {
    type Item = Trace;
    type IntoIter = std::vec::IntoIter<Trace>;

    fn into_iter(self) -> Self::IntoIter {
        self.traces.into_iter()
    }
}

impl FromIterator<Trace> for TraceBatch {
    fn from_iter<I: IntoIterator<Item = Trace>>(iter: I) -> Self {
        Self {
            traces: iter.into_iter().collect(),
        }
    }
}

/// Fractional seconds as a chrono duration, nanosecond resolution.
pub fn seconds(secs: f64) -> Duration {
    Duration::nanoseconds((secs * 1e9).round() as i64)
}

/// `b - a` in fractional seconds.
pub fn seconds_between(a: DateTime<Utc>, b: DateTime<Utc>) -> f64 {
    let d = b - a;
    match d.num_nanoseconds() {
        Some(ns) => ns as f64 * 1e-9,
        None => d.num_milliseconds() as f64 * 1e-3,
    }
}
