//! Fixed headers: miniSEED 2 (SEED 2.4 FSDH) as served by FDSN dataselect,
//! and miniSEED 3 for output.
//!
//! see <https://docs.fdsn.org/projects/miniseed3/en/latest/definition.html>

use std::fmt;

use anyhow::anyhow;
use bitflags::bitflags;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::mseed::schema::ExtraHeaders;

type MSResult<T> = anyhow::Result<T>;

pub mod consts {
    pub const MS2_FIXED_HEADER_LEN: usize = 48;
    pub const MS3_FIXED_HEADER_LEN: usize = 40;
    pub const MS3_CRC_OFFSET: usize = 28;
}

macro_rules! endian {
    ($ty:ty, $be:expr, $bytes:expr) => {
        if $be {
            <$ty>::from_be_bytes($bytes)
        } else {
            <$ty>::from_le_bytes($bytes)
        }
    };
}

/// year:
///
/// |  type  | length | offset |
/// |--------|--------|--------|
/// | UINT16 |   2    |   20   |
///
macro_rules! ms2_year {
    ($fixhd:expr, $be:expr) => {
        endian!(u16, $be, [$fixhd[20], $fixhd[21]])
    };
}

/// day of year:
///
/// |  type  | length | offset |
/// |--------|--------|--------|
/// | UINT16 |   2    |   22   |
///
macro_rules! ms2_day_of_year {
    ($fixhd:expr, $be:expr) => {
        endian!(u16, $be, [$fixhd[22], $fixhd[23]])
    };
}

/// 0.0001 second ticks:
///
/// |  type  | length | offset |
/// |--------|--------|--------|
/// | UINT16 |   2    |   28   |
///
macro_rules! ms2_ticks {
    ($fixhd:expr, $be:expr) => {
        endian!(u16, $be, [$fixhd[28], $fixhd[29]])
    };
}

/// number of samples:
///
/// |  type  | length | offset |
/// |--------|--------|--------|
/// | UINT16 |   2    |   30   |
///
macro_rules! ms2_sample_count {
    ($fixhd:expr, $be:expr) => {
        endian!(u16, $be, [$fixhd[30], $fixhd[31]])
    };
}

/// sample rate factor and multiplier:
///
/// |  type  | length | offset |
/// |--------|--------|--------|
/// | INT16  |   2    |   32   |
/// | INT16  |   2    |   34   |
///
macro_rules! ms2_rate_factor {
    ($fixhd:expr, $be:expr) => {
        endian!(i16, $be, [$fixhd[32], $fixhd[33]])
    };
}

macro_rules! ms2_rate_multiplier {
    ($fixhd:expr, $be:expr) => {
        endian!(i16, $be, [$fixhd[34], $fixhd[35]])
    };
}

/// time correction, 0.0001 s:
///
/// |  type  | length | offset |
/// |--------|--------|--------|
/// | INT32  |   4    |   40   |
///
macro_rules! ms2_time_correction {
    ($fixhd:expr, $be:expr) => {
        endian!(i32, $be, [$fixhd[40], $fixhd[41], $fixhd[42], $fixhd[43]])
    };
}

/// beginning of data and first blockette:
///
/// |  type  | length | offset |
/// |--------|--------|--------|
/// | UINT16 |   2    |   44   |
/// | UINT16 |   2    |   46   |
///
macro_rules! ms2_data_offset {
    ($fixhd:expr, $be:expr) => {
        endian!(u16, $be, [$fixhd[44], $fixhd[45]])
    };
}

macro_rules! ms2_first_blockette {
    ($fixhd:expr, $be:expr) => {
        endian!(u16, $be, [$fixhd[46], $fixhd[47]])
    };
}

bitflags! {
    /// SEED 2.4 FSDH field 12.
    #[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ActivityFlags: u8 {
        const CalibrationSignals = 0x01;
        const TimeCorrectionApplied = 0x02;
        const EventBegin = 0x04;
        const EventEnd = 0x08;
        const PositiveLeapSecond = 0x10;
        const NegativeLeapSecond = 0x20;
        const EventInProgress = 0x40;
    }
}

fn ascii_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

/// SEED 2.4 fixed section of data header.
#[derive(Debug, Clone)]
pub struct MS2FixedHeader {
    pub sequence: String,
    pub quality: char,
    pub station: String,
    pub location: String,
    pub channel: String,
    pub network: String,
    pub year: u16,
    pub day_of_year: u16,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// 0.0001 s
    pub ticks: u16,
    pub sample_count: u16,
    pub rate_factor: i16,
    pub rate_multiplier: i16,
    pub activity: ActivityFlags,
    pub blockette_count: u8,
    pub time_correction: i32,
    pub data_offset: u16,
    pub first_blockette: u16,
    /// Header byte order, detected from the year field.
    pub big_endian: bool,
}

impl MS2FixedHeader {
    pub fn parse(fixhd: &[u8]) -> MSResult<Self> {
        if fixhd.len() < consts::MS2_FIXED_HEADER_LEN {
            return Err(anyhow!(
                "miniSEED 2 header needs {} bytes, got {}",
                consts::MS2_FIXED_HEADER_LEN,
                fixhd.len()
            ));
        }
        let quality = fixhd[6] as char;
        if !matches!(quality, 'D' | 'R' | 'Q' | 'M') {
            return Err(anyhow!("not a miniSEED 2 data record, quality {:?}", quality));
        }
        let plausible = |y: u16| (1900..=2100).contains(&y);
        let big_endian = if plausible(ms2_year!(fixhd, true)) {
            true
        } else if plausible(ms2_year!(fixhd, false)) {
            false
        } else {
            return Err(anyhow!("cannot determine byte order from year field"));
        };
        let be = big_endian;

        Ok(Self {
            sequence: ascii_field(&fixhd[0..6]),
            quality,
            station: ascii_field(&fixhd[8..13]),
            location: ascii_field(&fixhd[13..15]),
            channel: ascii_field(&fixhd[15..18]),
            network: ascii_field(&fixhd[18..20]),
            year: ms2_year!(fixhd, be),
            day_of_year: ms2_day_of_year!(fixhd, be),
            hour: fixhd[24],
            minute: fixhd[25],
            second: fixhd[26],
            ticks: ms2_ticks!(fixhd, be),
            sample_count: ms2_sample_count!(fixhd, be),
            rate_factor: ms2_rate_factor!(fixhd, be),
            rate_multiplier: ms2_rate_multiplier!(fixhd, be),
            activity: ActivityFlags::from_bits_retain(fixhd[36]),
            blockette_count: fixhd[39],
            time_correction: ms2_time_correction!(fixhd, be),
            data_offset: ms2_data_offset!(fixhd, be),
            first_blockette: ms2_first_blockette!(fixhd, be),
            big_endian,
        })
    }

    /// Samples per second from the factor/multiplier pair.
    pub fn sample_rate(&self) -> f64 {
        let f = self.rate_factor as f64;
        let m = self.rate_multiplier as f64;
        match (self.rate_factor, self.rate_multiplier) {
            (0, _) | (_, 0) => 0.0,
            (a, b) if a > 0 && b > 0 => f * m,
            (a, b) if a > 0 && b < 0 => -f / m,
            (a, b) if a < 0 && b > 0 => -m / f,
            _ => 1.0 / (f * m),
        }
    }

    /// Record start time, including an unapplied time correction. `micros`
    /// is the blockette 1001 microsecond offset.
    pub fn start_time(&self, micros: i8) -> MSResult<DateTime<Utc>> {
        let date = NaiveDate::from_yo_opt(self.year as i32, self.day_of_year as u32)
            .ok_or_else(|| anyhow!("invalid date {}.{:03}", self.year, self.day_of_year))?;
        // a 60 second value marks a leap second, chrono models it as 59 + 1 s
        let leap = self.second >= 60;
        let base = date
            .and_hms_opt(
                self.hour as u32,
                self.minute as u32,
                if leap { 59 } else { self.second as u32 },
            )
            .ok_or_else(|| anyhow!("invalid time of day"))?
            .and_utc();
        let mut t = base
            + Duration::microseconds(self.ticks as i64 * 100 + micros as i64)
            + Duration::seconds(if leap { 1 } else { 0 });
        if !self.activity.contains(ActivityFlags::TimeCorrectionApplied) && self.time_correction != 0 {
            t += Duration::microseconds(self.time_correction as i64 * 100);
        }
        Ok(t)
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
/// The header of a miniSEED 3.0 record.
/// A record is composed of a header followed by a data payload.
/// The byte order of binary fields in the header must be least significant byte first (little endian).
pub struct MS3Header {
    /// Format version. Set to 3 for this version.
    pub(crate) format_version: u8,
    /// Bit field flags, see [`FieldFlag`]
    pub(crate) flag: FieldFlag,
    /// Record start time, time of the first data sample.
    pub(crate) start_time: MS3Time,
    /// A code indicating the encoding format, see [`DataEncoding`].
    pub(crate) data_payload_encoding: DataEncoding,
    /// Positive: samples per second. Negative: sample period in seconds, used
    /// for rates below 1 Hz.
    pub(crate) sample_rate: SampleRP,
    pub(crate) sample_count: u32,
    /// CRC-32C (Castagnoli) of the complete record with the CRC field zeroed.
    pub(crate) castagoli: u32,
    /// 0 means unknown, as for data converted from another format.
    pub(crate) data_public_version: u8,
    pub(crate) sid_len: u8,
    pub(crate) ex_hd_len: u16,
    pub(crate) data_len: u32,
    /// [FDSN Source Identifier](https://docs.fdsn.org/projects/source-identifiers/).
    pub(crate) sid: String,
    pub(crate) ex_hd: Option<ExtraHeaders>,
}

impl Default for MS3Header {
    fn default() -> Self {
        Self {
            format_version: 3,
            flag: FieldFlag::empty(),
            start_time: MS3Time::default(),
            data_payload_encoding: DataEncoding::Text,
            sample_rate: Default::default(),
            sample_count: Default::default(),
            castagoli: Default::default(),
            data_public_version: Default::default(),
            sid_len: 0,
            ex_hd_len: Default::default(),
            data_len: Default::default(),
            sid: String::new(),
            ex_hd: None,
        }
    }
}

impl MS3Header {
    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn start_time(&self) -> &MS3Time {
        &self.start_time
    }

    /// Serialized extra headers, empty when there are none.
    pub(crate) fn extra_bytes(&self) -> MSResult<Vec<u8>> {
        match &self.ex_hd {
            Some(ex_hd) => serde_json::to_vec(ex_hd).map_err(|e| anyhow!(e)),
            None => Ok(Vec::new()),
        }
    }

    /// Fixed header, identifier and extra headers, with the CRC field as
    /// currently set.
    pub fn bytes(&self) -> MSResult<Vec<u8>> {
        let extra = self.extra_bytes()?;
        let mut bytes = Vec::with_capacity(consts::MS3_FIXED_HEADER_LEN + self.sid.len() + extra.len());
        bytes.extend_from_slice(b"MS");
        bytes.push(self.format_version);
        bytes.push(self.flag.bits());
        bytes.extend_from_slice(&self.start_time.nanosecond.to_le_bytes());
        bytes.extend_from_slice(&self.start_time.year.to_le_bytes());
        bytes.extend_from_slice(&self.start_time.day_of_year.to_le_bytes());
        bytes.push(self.start_time.hour);
        bytes.push(self.start_time.minute);
        bytes.push(self.start_time.second);
        bytes.push(self.data_payload_encoding.bits());
        bytes.extend_from_slice(&self.sample_rate.raw.to_le_bytes());
        bytes.extend_from_slice(&self.sample_count.to_le_bytes());
        bytes.extend_from_slice(&self.castagoli.to_le_bytes());
        bytes.push(self.data_public_version);
        bytes.push(self.sid_len);
        bytes.extend_from_slice(&self.ex_hd_len.to_le_bytes());
        bytes.extend_from_slice(&self.data_len.to_le_bytes());
        bytes.extend_from_slice(self.sid.as_bytes());
        bytes.extend_from_slice(&extra);
        Ok(bytes)
    }
}

#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct MS3Time {
    pub(crate) nanosecond: u32,
    pub(crate) year: u16,
    pub(crate) day_of_year: u16,
    pub(crate) hour: u8,
    pub(crate) minute: u8,
    pub(crate) second: u8,
}

impl From<DateTime<Utc>> for MS3Time {
    fn from(t: DateTime<Utc>) -> Self {
        // chrono folds a leap second into the nanoseconds of second 59
        let (second, nanosecond) = match t.nanosecond() {
            ns if ns >= 1_000_000_000 => (60, ns - 1_000_000_000),
            ns => (t.second() as u8, ns),
        };
        MS3Time {
            nanosecond,
            year: t.year() as u16,
            day_of_year: t.ordinal() as u16,
            hour: t.hour() as u8,
            minute: t.minute() as u8,
            second,
        }
    }
}

impl fmt::Display for MS3Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04},{:03},{:02}:{:02}:{:02}.{:09}",
            self.year, self.day_of_year, self.hour, self.minute, self.second, self.nanosecond
        )
    }
}

bitflags! {
    /// UINT8
    /// - 0: Calibration signals present. [same as SEED 2.4 FSDH, field 12, bit 0]
    /// - 1: Time tag is questionable. [same as SEED 2.4 FSDH, field 14, bit 7]
    /// - 2: Clock locked. [same as SEED 2.4 FSDH, field 13, bit 5]
    #[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FieldFlag: u8 {
        const CalibrationSignals = 0b001;
        const QuestionableTimeTag = 0b010;
        const ClockLocked = 0b0100;
    }
}

bitflags! {
    /// Data payload encodings in the format are identified by a code (number).
    /// Codes are shared between miniSEED 2 blockette 1000 and miniSEED 3.
    #[derive(Deserialize, Serialize, PartialEq, Eq, Debug, Clone, Copy)]
    pub struct DataEncoding: u8 {
        const Text = 0;
        const I16 = 1;
        const I32 = 3;
        const F32 = 4;
        const F64 = 5;
        const Steim1 = 10;
        const Steim2 = 11;
    }
}

impl fmt::Display for DataEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DataEncoding::Text => write!(f, "Text"),
            DataEncoding::I16 => write!(f, "I16"),
            DataEncoding::I32 => write!(f, "I32"),
            DataEncoding::F32 => write!(f, "F32"),
            DataEncoding::F64 => write!(f, "F64"),
            DataEncoding::Steim1 => write!(f, "Steim1"),
            DataEncoding::Steim2 => write!(f, "Steim2"),
            other => write!(f, "Unsupported({})", other.bits()),
        }
    }
}

/// Sample Rate and Period
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq)]
pub struct SampleRP {
    pub(crate) raw: f64,
}

impl SampleRP {
    /// Encodes rates below 1 Hz as a negative period.
    pub fn from_rate(rate: f64) -> Self {
        if rate > 0.0 && rate < 1.0 {
            SampleRP { raw: -1.0 / rate }
        } else {
            SampleRP { raw: rate }
        }
    }

    pub fn get_raw(&self) -> f64 {
        self.raw
    }

    pub fn get_sample_rate(&self) -> f64 {
        if self.raw >= 0.0 {
            self.raw
        } else {
            -1. / self.raw
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn fixed_header(big_endian: bool) -> Vec<u8> {
        let mut hd = Vec::new();
        hd.extend_from_slice(b"000001D ");
        hd.extend_from_slice(b"LOBS1");
        hd.extend_from_slice(b"  ");
        hd.extend_from_slice(b"HHZ");
        hd.extend_from_slice(b"YH");
        let put16 = |hd: &mut Vec<u8>, v: u16| {
            hd.extend_from_slice(&if big_endian { v.to_be_bytes() } else { v.to_le_bytes() })
        };
        put16(&mut hd, 2014);
        put16(&mut hd, 213);
        hd.extend_from_slice(&[1, 2, 3, 0]);
        put16(&mut hd, 5000);
        put16(&mut hd, 10);
        put16(&mut hd, 100);
        put16(&mut hd, 1);
        hd.extend_from_slice(&[0, 0, 0, 1]);
        hd.extend_from_slice(&[0; 4]);
        put16(&mut hd, 64);
        put16(&mut hd, 48);
        hd
    }

    #[test]
    fn parse_ms2_both_orders() {
        for be in [true, false] {
            let hd = MS2FixedHeader::parse(&fixed_header(be)).unwrap();
            assert_eq!(hd.big_endian, be);
            assert_eq!(hd.station, "LOBS1");
            assert_eq!(hd.location, "");
            assert_eq!(hd.channel, "HHZ");
            assert_eq!(hd.network, "YH");
            assert_eq!(hd.sample_count, 10);
            assert_eq!(hd.sample_rate(), 100.0);
            assert_eq!(hd.data_offset, 64);
            assert_eq!(
                hd.start_time(0).unwrap(),
                Utc.with_ymd_and_hms(2014, 8, 1, 1, 2, 3).unwrap() + Duration::milliseconds(500)
            );
        }
    }

    #[test]
    fn rejects_non_data_record() {
        let mut hd = fixed_header(true);
        hd[6] = b'V';
        assert!(MS2FixedHeader::parse(&hd).is_err());
        assert!(MS2FixedHeader::parse(&hd[..20]).is_err());
    }

    #[test]
    fn sample_rate_factor_forms() {
        let mut hd = MS2FixedHeader::parse(&fixed_header(true)).unwrap();
        hd.rate_factor = -10;
        hd.rate_multiplier = 1;
        assert_eq!(hd.sample_rate(), 0.1);
        hd.rate_factor = 1;
        hd.rate_multiplier = -10;
        assert_eq!(hd.sample_rate(), 0.1);
    }

    #[test]
    fn unapplied_correction() {
        let mut hd = MS2FixedHeader::parse(&fixed_header(true)).unwrap();
        hd.time_correction = 10_000;
        let t = hd.start_time(0).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2014, 8, 1, 1, 2, 4).unwrap() + Duration::milliseconds(500));
        hd.activity |= ActivityFlags::TimeCorrectionApplied;
        assert_eq!(hd.start_time(0).unwrap(), t - Duration::seconds(1));
    }

    #[test]
    fn ms3_time_from_chrono() {
        let t = Utc.with_ymd_and_hms(2022, 6, 5, 20, 32, 38).unwrap() + Duration::nanoseconds(123456789);
        let ms3: MS3Time = t.into();
        assert_eq!(ms3.year, 2022);
        assert_eq!(ms3.day_of_year, 156);
        assert_eq!(ms3.nanosecond, 123456789);
        assert_eq!(ms3.to_string(), "2022,156,20:32:38.123456789");
    }

    #[test]
    fn sub_hertz_rate_is_period() {
        assert_eq!(SampleRP::from_rate(0.1).get_raw(), -10.0);
        assert_eq!(SampleRP::from_rate(0.1).get_sample_rate(), 0.1);
        assert_eq!(SampleRP::from_rate(100.0).get_raw(), 100.0);
    }
}
