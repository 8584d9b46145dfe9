//! Binary SAC output, header version 6, little endian.
//!
//! | section | type        | count | offset |
//! |---------|-------------|-------|--------|
//! | floats  | FLOAT32     |  70   |   0    |
//! | ints    | INT32       |  40   |  280   |
//! | strings | 8 byte char |  24   |  440   |
//! | data    | FLOAT32     | npts  |  632   |
//!
//! `kevnm` is the only 16 byte string and takes two slots.

use std::io::Write;

use anyhow::{anyhow, Context};
use chrono::{Datelike, Duration, DurationRound, Timelike};

use crate::trace::{seconds_between, Trace, Unit};

pub mod consts {
    pub const HEADER_LEN: usize = 632;
    pub const FLOAT_COUNT: usize = 70;
    pub const INT_COUNT: usize = 40;
    pub const STRING_SLOTS: usize = 24;
    pub const UNDEFINED_FLOAT: f32 = -12345.0;
    pub const UNDEFINED_INT: i32 = -12345;
    pub const UNDEFINED_STRING: &[u8; 8] = b"-12345  ";
}

/// Float header indices.
pub mod f {
    pub const DELTA: usize = 0;
    pub const DEPMIN: usize = 1;
    pub const DEPMAX: usize = 2;
    pub const B: usize = 5;
    pub const E: usize = 6;
    pub const STLA: usize = 31;
    pub const STLO: usize = 32;
    pub const STEL: usize = 33;
    pub const DEPMEN: usize = 56;
    pub const CMPAZ: usize = 57;
    pub const CMPINC: usize = 58;
}

/// Integer header indices.
pub mod i {
    pub const NZYEAR: usize = 0;
    pub const NZJDAY: usize = 1;
    pub const NZHOUR: usize = 2;
    pub const NZMIN: usize = 3;
    pub const NZSEC: usize = 4;
    pub const NZMSEC: usize = 5;
    pub const NVHDR: usize = 6;
    pub const NPTS: usize = 9;
    pub const IFTYPE: usize = 15;
    pub const IDEP: usize = 16;
    pub const IZTYPE: usize = 17;
    pub const LEVEN: usize = 35;
    pub const LOVROK: usize = 37;
}

/// String slot indices.
pub mod k {
    pub const KSTNM: usize = 0;
    pub const KHOLE: usize = 3;
    pub const KCMPNM: usize = 20;
    pub const KNETWK: usize = 21;
}

const ITIME: i32 = 1;
const IUNKN: i32 = 5;
const IDISP: i32 = 6;
const IVEL: i32 = 7;
const IACC: i32 = 8;
const IB: i32 = 9;

fn idep(unit: Unit) -> i32 {
    match unit {
        Unit::Displacement => IDISP,
        Unit::Velocity => IVEL,
        Unit::Acceleration => IACC,
        Unit::Counts | Unit::Pressure | Unit::Unknown => IUNKN,
    }
}

#[derive(Debug, Clone)]
pub struct SacHeader {
    floats: [f32; consts::FLOAT_COUNT],
    ints: [i32; consts::INT_COUNT],
    strings: [[u8; 8]; consts::STRING_SLOTS],
}

impl Default for SacHeader {
    fn default() -> Self {
        Self {
            floats: [consts::UNDEFINED_FLOAT; consts::FLOAT_COUNT],
            ints: [consts::UNDEFINED_INT; consts::INT_COUNT],
            strings: [*consts::UNDEFINED_STRING; consts::STRING_SLOTS],
        }
    }
}

impl SacHeader {
    pub fn set_float(&mut self, index: usize, value: f64) {
        self.floats[index] = value as f32;
    }

    pub fn set_int(&mut self, index: usize, value: i32) {
        self.ints[index] = value;
    }

    /// Space padded, cut at 8 bytes. Empty values stay undefined.
    pub fn set_string(&mut self, slot: usize, value: &str) {
        if value.is_empty() {
            return;
        }
        let mut field = [b' '; 8];
        for (dst, src) in field.iter_mut().zip(value.bytes()) {
            *dst = src;
        }
        self.strings[slot] = field;
    }

    pub fn float(&self, index: usize) -> f32 {
        self.floats[index]
    }

    pub fn int(&self, index: usize) -> i32 {
        self.ints[index]
    }

    pub fn bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(consts::HEADER_LEN);
        for v in &self.floats {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for v in &self.ints {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for s in &self.strings {
            bytes.extend_from_slice(s);
        }
        bytes
    }

    /// Header of an evenly sampled time series referenced to its start,
    /// truncated to the millisecond.
    pub fn from_trace(trace: &Trace) -> anyhow::Result<Self> {
        let mut hd = SacHeader::default();
        let reference = trace
            .start_time
            .duration_trunc(Duration::milliseconds(1))
            .map_err(|e| anyhow!("{}: reference time: {}", trace.id, e))?;
        let b = seconds_between(reference, trace.start_time);
        let delta = trace.delta();

        hd.set_int(i::NZYEAR, reference.year());
        hd.set_int(i::NZJDAY, reference.ordinal() as i32);
        hd.set_int(i::NZHOUR, reference.hour() as i32);
        hd.set_int(i::NZMIN, reference.minute() as i32);
        hd.set_int(i::NZSEC, reference.second() as i32);
        hd.set_int(i::NZMSEC, (reference.nanosecond() / 1_000_000) as i32);
        hd.set_int(i::NVHDR, 6);
        hd.set_int(i::NPTS, trace.npts() as i32);
        hd.set_int(i::IFTYPE, ITIME);
        hd.set_int(i::IDEP, idep(trace.unit));
        hd.set_int(i::IZTYPE, IB);
        hd.set_int(i::LEVEN, 1);
        hd.set_int(i::LOVROK, 1);

        hd.set_float(f::DELTA, delta);
        hd.set_float(f::B, b);
        hd.set_float(f::E, b + trace.npts().saturating_sub(1) as f64 * delta);
        if !trace.data.is_empty() {
            let min = trace.data.iter().copied().fold(f64::INFINITY, f64::min);
            let max = trace.data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mean = trace.data.iter().sum::<f64>() / trace.data.len() as f64;
            hd.set_float(f::DEPMIN, min);
            hd.set_float(f::DEPMAX, max);
            hd.set_float(f::DEPMEN, mean);
        }
        if let Some(g) = trace.geometry {
            hd.set_float(f::STLA, g.latitude);
            hd.set_float(f::STLO, g.longitude);
            hd.set_float(f::STEL, g.elevation);
        }
        if let Some(o) = trace.orientation {
            hd.set_float(f::CMPAZ, o.azimuth);
            hd.set_float(f::CMPINC, o.inclination);
        }

        hd.set_string(k::KSTNM, &trace.id.station);
        hd.set_string(k::KHOLE, &trace.id.location);
        hd.set_string(k::KCMPNM, &trace.id.channel);
        hd.set_string(k::KNETWK, &trace.id.network);
        Ok(hd)
    }
}

/// Header and samples of one trace.
pub fn to_bytes(trace: &Trace) -> anyhow::Result<Vec<u8>> {
    let mut bytes = SacHeader::from_trace(trace)?.bytes();
    bytes.reserve(trace.npts() * 4);
    for v in &trace.data {
        bytes.extend_from_slice(&(*v as f32).to_le_bytes());
    }
    Ok(bytes)
}

pub fn write<W: Write>(trace: &Trace, mut out: W) -> anyhow::Result<()> {
    let bytes = to_bytes(trace)?;
    out.write_all(&bytes)
        .with_context(|| format!("writing SAC for {}", trace.id))?;
    Ok(())
}
