//! Whole records: miniSEED 2 volumes as served by dataselect are read into
//! traces, traces are written back out as miniSEED 3 records.

use anyhow::anyhow;
use chrono::{DateTime, Utc};

use crate::mseed::data::DecodedData;
use crate::mseed::header::{consts, DataEncoding, FieldFlag, MS2FixedHeader, MS3Header, MS3Time, SampleRP};
use crate::mseed::schema::ExtraHeaders;
use crate::trace::{seconds_between, Trace, TraceBatch, TraceId};
use crate::CRC32C;

type MSResult<T> = anyhow::Result<T>;

const BLOCKETTE_DATA_ONLY: u16 = 1000;
const BLOCKETTE_DATA_EXTENSION: u16 = 1001;

/// One decoded miniSEED 2 data record.
#[derive(Debug, Clone)]
pub struct MS2Record {
    pub header: MS2FixedHeader,
    pub encoding: DataEncoding,
    /// Total record length in bytes, from blockette 1000.
    pub record_length: usize,
    pub start_time: DateTime<Utc>,
    pub samples: Vec<f64>,
}

impl MS2Record {
    /// Parses the record at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> MSResult<Self> {
        let header = MS2FixedHeader::parse(bytes)?;
        let be = header.big_endian;
        let read_u16 = |at: usize| -> u16 {
            let b = [bytes[at], bytes[at + 1]];
            if be {
                u16::from_be_bytes(b)
            } else {
                u16::from_le_bytes(b)
            }
        };

        let mut encoding = None;
        let mut data_big_endian = be;
        let mut record_length = None;
        let mut micros = 0i8;

        let mut offset = header.first_blockette as usize;
        // at most one pass over the blockette chain, which must move forward
        for _ in 0..header.blockette_count.max(1) {
            if offset == 0 || offset + 4 > bytes.len() {
                break;
            }
            let kind = read_u16(offset);
            let next = read_u16(offset + 2) as usize;
            match kind {
                BLOCKETTE_DATA_ONLY if offset + 7 <= bytes.len() => {
                    encoding = Some(DataEncoding::from_bits_retain(bytes[offset + 4]));
                    data_big_endian = bytes[offset + 5] == 1;
                    let exponent = bytes[offset + 6] as u32;
                    if !(7..=20).contains(&exponent) {
                        return Err(anyhow!("record length exponent {} out of range", exponent));
                    }
                    record_length = Some(1usize << exponent);
                }
                BLOCKETTE_DATA_EXTENSION if offset + 6 <= bytes.len() => {
                    micros = bytes[offset + 5] as i8;
                }
                _ => log::trace!("skipping blockette {} at {}", kind, offset),
            }
            if next <= offset {
                break;
            }
            offset = next;
        }

        let id = TraceId::new(&header.network, &header.station, &header.location, &header.channel);
        let record_length =
            record_length.ok_or_else(|| anyhow!("{}: record has no blockette 1000", id))?;
        let encoding = encoding.unwrap_or(DataEncoding::Steim1);
        if bytes.len() < record_length {
            return Err(anyhow!(
                "{}: truncated record, {} of {} bytes",
                id,
                bytes.len(),
                record_length
            ));
        }
        let data_offset = header.data_offset as usize;
        let samples = if header.sample_count == 0 || data_offset == 0 {
            Vec::new()
        } else {
            if data_offset < consts::MS2_FIXED_HEADER_LEN || data_offset >= record_length {
                return Err(anyhow!("{}: data offset {} outside record", id, data_offset));
            }
            DecodedData::decode(
                encoding,
                &bytes[data_offset..record_length],
                header.sample_count as usize,
                data_big_endian,
                &id.to_string(),
            )?
            .into_f64()?
        };
        let start_time = header.start_time(micros)?;

        Ok(Self {
            header,
            encoding,
            record_length,
            start_time,
            samples,
        })
    }

    pub fn id(&self) -> TraceId {
        TraceId::new(
            &self.header.network,
            &self.header.station,
            &self.header.location,
            &self.header.channel,
        )
    }

    pub fn sample_rate(&self) -> f64 {
        self.header.sample_rate()
    }
}

/// Iterator over the records of a concatenated miniSEED 2 byte stream.
pub struct MS2Volume<'a> {
    bytes: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> MS2Volume<'a> {
    pub fn from_bytes(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for MS2Volume<'a> {
    type Item = MSResult<MS2Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.bytes.len() {
            return None;
        }
        match MS2Record::parse(&self.bytes[self.offset..]) {
            Ok(record) => {
                self.offset += record.record_length;
                Some(Ok(record))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(anyhow!("record at byte {}: {:#}", self.offset, e)))
            }
        }
    }
}

/// Reads a dataselect response into traces. Records of one channel are
/// joined while each starts within half a sample of where the previous one
/// ended; anything else opens a new trace.
pub fn read_traces(bytes: &[u8]) -> MSResult<TraceBatch> {
    let mut traces: Vec<Trace> = Vec::new();
    for record in MS2Volume::from_bytes(bytes) {
        let record = record?;
        if record.samples.is_empty() {
            continue;
        }
        let id = record.id();
        let rate = record.sample_rate();
        let contiguous = traces.iter_mut().rev().find(|t| {
            t.id == id
                && t.sampling_rate == rate
                && rate > 0.0
                && (seconds_between(t.end_time(), record.start_time) - t.delta()).abs() <= 0.5 * t.delta()
        });
        match contiguous {
            Some(trace) => trace.data.extend_from_slice(&record.samples),
            None => traces.push(Trace::new(id, record.start_time, rate, record.samples)),
        }
    }
    Ok(TraceBatch::new(traces))
}

/// A miniSEED 3 record ready to be written.
#[derive(Debug, Clone)]
pub struct MS3Record {
    header: MS3Header,
    data: Vec<u8>,
}

impl MS3Record {
    pub fn header(&self) -> &MS3Header {
        &self.header
    }

    pub fn data_raw(&self) -> &[u8] {
        &self.data
    }

    /// Serialized record with the CRC-32C filled in.
    pub fn to_bytes(&self) -> MSResult<Vec<u8>> {
        let mut header = self.header.clone();
        header.castagoli = 0;
        let mut bytes = header.bytes()?;
        bytes.extend_from_slice(&self.data);
        let crc = CRC32C.checksum(&bytes);
        bytes[consts::MS3_CRC_OFFSET..consts::MS3_CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());
        Ok(bytes)
    }

    /// One record holding the whole trace, stamped with its identifier,
    /// geometry and orientation.
    pub fn from_trace(trace: &Trace) -> MSResult<Self> {
        MS3RecordBuilder::new()
            .data(DecodedData::from_samples(&trace.data))
            .sample_rate(trace.sampling_rate)
            .start_time(MS3Time::from(trace.start_time))
            .sid(&trace.id.fdsn_sid())?
            .extra_headers(ExtraHeaders::from_trace(trace))
            .build()
    }
}

#[derive(Debug, Default)]
pub struct MS3RecordBuilder {
    header: MS3Header,
    data: DecodedData,
}

impl MS3RecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn flag(mut self, flag: FieldFlag) -> Self {
        self.header.flag = flag;
        self
    }

    pub fn start_time(mut self, start_time: MS3Time) -> Self {
        self.header.start_time = start_time;
        self
    }

    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.header.sample_rate = SampleRP::from_rate(rate);
        self
    }

    pub fn data_public_version(mut self, version: u8) -> Self {
        self.header.data_public_version = version;
        self
    }

    pub fn sid(mut self, sid: &str) -> MSResult<Self> {
        if sid.len() > u8::MAX as usize {
            return Err(anyhow!("source identifier {:?} longer than 255 bytes", sid));
        }
        self.header.sid = sid.to_string();
        self.header.sid_len = sid.len() as u8;
        Ok(self)
    }

    pub fn extra_headers(mut self, ex_hd: Option<ExtraHeaders>) -> Self {
        self.header.ex_hd = ex_hd;
        self
    }

    pub fn data(mut self, data: DecodedData) -> Self {
        self.data = data;
        self
    }

    /// Encodes the payload and fills in the derived length fields.
    pub fn build(self) -> MSResult<MS3Record> {
        let mut header = self.header;
        let (encoding, data) = self.data.encode()?;
        header.data_payload_encoding = encoding;
        header.sample_count = match self.data {
            DecodedData::Text(_) => 0,
            ref numeric => numeric.len() as u32,
        };
        header.data_len = u32::try_from(data.len()).map_err(|_| anyhow!("payload too large"))?;
        let extra = header.extra_bytes()?;
        header.ex_hd_len = u16::try_from(extra.len()).map_err(|_| anyhow!("extra headers too large"))?;
        log::trace!(
            "{}: built record of {} {} samples at {}",
            header.sid,
            header.sample_count,
            encoding,
            header.start_time
        );
        Ok(MS3Record { header, data })
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use crate::trace::{Geometry, Unit};
    use chrono::{Duration, TimeZone};

    /// A 512 byte big-endian Steim-1 record at 1 Hz with blockettes 1000
    /// and 1001.
    pub(crate) fn steim1_record(station: &str, start: DateTime<Utc>, samples: &[i32]) -> Vec<u8> {
        use chrono::{Datelike, Timelike};
        assert!(samples.len() <= 12 * 4 && !samples.is_empty());
        let mut rec = Vec::with_capacity(512);
        rec.extend_from_slice(b"000001D ");
        rec.extend_from_slice(format!("{:<5}", station).as_bytes());
        rec.extend_from_slice(b"  ");
        rec.extend_from_slice(b"HHZ");
        rec.extend_from_slice(b"YH");
        rec.extend_from_slice(&(start.year() as u16).to_be_bytes());
        rec.extend_from_slice(&(start.ordinal() as u16).to_be_bytes());
        rec.extend_from_slice(&[start.hour() as u8, start.minute() as u8, start.second() as u8, 0]);
        rec.extend_from_slice(&((start.nanosecond() / 100_000) as u16).to_be_bytes());
        rec.extend_from_slice(&(samples.len() as u16).to_be_bytes());
        rec.extend_from_slice(&1i16.to_be_bytes());
        rec.extend_from_slice(&1i16.to_be_bytes());
        rec.extend_from_slice(&[0, 0, 0, 2]);
        rec.extend_from_slice(&0i32.to_be_bytes());
        rec.extend_from_slice(&64u16.to_be_bytes());
        rec.extend_from_slice(&48u16.to_be_bytes());
        // blockette 1000 at 48, 1001 at 56
        rec.extend_from_slice(&1000u16.to_be_bytes());
        rec.extend_from_slice(&56u16.to_be_bytes());
        rec.extend_from_slice(&[10, 1, 9, 0]);
        rec.extend_from_slice(&1001u16.to_be_bytes());
        rec.extend_from_slice(&0u16.to_be_bytes());
        rec.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(rec.len(), 64);

        // byte differences, one word per four samples
        let mut diffs = vec![0i32];
        diffs.extend(samples.windows(2).map(|w| w[1] - w[0]));
        while diffs.len() % 4 != 0 {
            diffs.push(0);
        }
        let data_words: Vec<u32> = diffs
            .chunks(4)
            .map(|c| u32::from_be_bytes([c[0] as u8, c[1] as u8, c[2] as u8, c[3] as u8]))
            .collect();
        let nibbles = vec![1; data_words.len()];
        let frame = crate::mseed::steim::test::frame(&nibbles, &data_words, samples[0], samples[samples.len() - 1]);
        rec.extend_from_slice(&frame);
        rec.resize(512, 0);
        rec
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 8, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn parse_steim1_record() {
        let bytes = steim1_record("LOBS1", t0(), &[5, 6, 4, 4, 10]);
        let rec = MS2Record::parse(&bytes).unwrap();
        assert_eq!(rec.record_length, 512);
        assert_eq!(rec.encoding, DataEncoding::Steim1);
        assert_eq!(rec.id().to_string(), "YH.LOBS1..HHZ");
        assert_eq!(rec.start_time, t0());
        assert_eq!(rec.samples, vec![5.0, 6.0, 4.0, 4.0, 10.0]);
    }

    #[test]
    fn contiguous_records_merge() {
        let mut bytes = steim1_record("LOBS1", t0(), &[1, 2, 3]);
        bytes.extend(steim1_record("LOBS1", t0() + Duration::seconds(3), &[4, 5]));
        // gap of ten seconds starts a new trace
        bytes.extend(steim1_record("LOBS1", t0() + Duration::seconds(15), &[9]));
        bytes.extend(steim1_record("LOBS2", t0(), &[7, 7]));
        let batch = read_traces(&bytes).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.traces()[0].data, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(batch.traces()[1].start_time, t0() + Duration::seconds(15));
        assert_eq!(batch.traces()[2].id.station, "LOBS2");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(read_traces(&[0u8; 100]).is_err());
        assert!(read_traces(&[]).unwrap().is_empty());
    }

    #[test]
    fn builder_fields() {
        let rec = MS3RecordBuilder::new()
            .flag(FieldFlag::ClockLocked)
            .data_public_version(2)
            .start_time(MS3Time::from(t0()))
            .sample_rate(10.0)
            .sid("FDSN:YH_LOBS1__H_D_H")
            .unwrap()
            .data(DecodedData::from_samples(&[1.0, -2.0, 3.0, -4.0]))
            .build()
            .unwrap();
        assert_eq!(rec.header().sid(), "FDSN:YH_LOBS1__H_D_H");
        assert_eq!(rec.header().sample_count(), 4);
        assert_eq!(rec.header().start_time(), &MS3Time::from(t0()));
        assert_eq!(rec.data_raw().len(), 16);

        let bytes = rec.to_bytes().unwrap();
        assert_eq!(bytes[3], FieldFlag::ClockLocked.bits());
        assert_eq!(bytes[32], 2);
        assert_eq!(&bytes[bytes.len() - 16..], rec.data_raw());
        assert!(MS3RecordBuilder::new().sid(&"X".repeat(300)).is_err());
    }

    #[test]
    fn ms3_layout_and_crc() {
        let mut tr = Trace::new(TraceId::new("YH", "LOBS1", "", "HHZ"), t0(), 1.0, vec![1.0, 2.0, 3.0]);
        tr.unit = Unit::Displacement;
        tr.geometry = Some(Geometry {
            latitude: -39.0,
            longitude: 178.9,
            elevation: -707.0,
        });
        let rec = MS3Record::from_trace(&tr).unwrap();
        let bytes = rec.to_bytes().unwrap();
        let sid = "FDSN:YH_LOBS1__H_H_Z";
        assert_eq!(&bytes[0..2], b"MS");
        assert_eq!(bytes[2], 3);
        assert_eq!(bytes[15], DataEncoding::I32.bits());
        assert_eq!(u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]), 3);
        assert_eq!(bytes[33] as usize, sid.len());
        assert_eq!(&bytes[40..40 + sid.len()], sid.as_bytes());
        let ex_len = u16::from_le_bytes([bytes[34], bytes[35]]) as usize;
        let extra: serde_json::Value =
            serde_json::from_slice(&bytes[40 + sid.len()..40 + sid.len() + ex_len]).unwrap();
        assert_eq!(extra["FDSN"]["DataQuality"], "Q");
        assert_eq!(bytes.len(), 40 + sid.len() + ex_len + 12);

        let stored = u32::from_le_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]);
        let mut zeroed = bytes.clone();
        zeroed[28..32].copy_from_slice(&[0; 4]);
        assert_eq!(CRC32C.checksum(&zeroed), stored);
    }

    #[test]
    fn builder_rejects_long_sid() {
        assert!(MS3RecordBuilder::new().sid(&"X".repeat(300)).is_err());
    }
}
