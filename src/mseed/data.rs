use std::fmt;

use anyhow::anyhow;

use crate::mseed::header::DataEncoding;
use crate::mseed::steim::{decode_steim1, decode_steim2};

macro_rules! decode_data {
    ($data: expr, $typ: ident, $len: expr, $be: expr) => {
        $data
            .chunks_exact(std::mem::size_of::<$typ>())
            .map(|b| {
                let mut byte = [0; $len];
                byte.copy_from_slice(b);
                if $be {
                    <$typ>::from_be_bytes(byte)
                } else {
                    <$typ>::from_le_bytes(byte)
                }
            })
            .collect()
    };
}

/// Decoded samples of a record payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DecodedData {
    #[default]
    None,
    Text(String),
    F32(Vec<f32>),
    F64(Vec<f64>),
    I16(Vec<i16>),
    I32(Vec<i32>),
}

impl DecodedData {
    /// Decodes `sample_count` samples of `encoding` from `raw`, words in the
    /// order given by blockette 1000.
    pub fn decode(
        encoding: DataEncoding,
        raw: &[u8],
        sample_count: usize,
        big_endian: bool,
        sid: &str,
    ) -> anyhow::Result<Self> {
        let need = |width: usize| -> anyhow::Result<()> {
            if raw.len() < sample_count * width {
                Err(anyhow!(
                    "{}: payload of {} bytes too short for {} {} samples",
                    sid,
                    raw.len(),
                    sample_count,
                    encoding
                ))
            } else {
                Ok(())
            }
        };
        let data = match encoding {
            DataEncoding::Text => {
                DecodedData::Text(String::from_utf8_lossy(raw).trim_end_matches('\0').to_string())
            }
            DataEncoding::I16 => {
                need(2)?;
                DecodedData::I16(decode_data!(raw[..sample_count * 2], i16, 2, big_endian))
            }
            DataEncoding::I32 => {
                need(4)?;
                DecodedData::I32(decode_data!(raw[..sample_count * 4], i32, 4, big_endian))
            }
            DataEncoding::F32 => {
                need(4)?;
                DecodedData::F32(decode_data!(raw[..sample_count * 4], f32, 4, big_endian))
            }
            DataEncoding::F64 => {
                need(8)?;
                DecodedData::F64(decode_data!(raw[..sample_count * 8], f64, 8, big_endian))
            }
            DataEncoding::Steim1 => {
                DecodedData::I32(decode_steim1(raw, sample_count, big_endian, sid)?)
            }
            DataEncoding::Steim2 => {
                DecodedData::I32(decode_steim2(raw, sample_count, big_endian, sid)?)
            }
            other => return Err(anyhow!("{}: unsupported encoding {}", sid, other)),
        };
        Ok(data)
    }

    pub fn len(&self) -> usize {
        match self {
            DecodedData::None => 0,
            DecodedData::Text(s) => s.len(),
            DecodedData::F32(v) => v.len(),
            DecodedData::F64(v) => v.len(),
            DecodedData::I16(v) => v.len(),
            DecodedData::I32(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric samples as `f64`; text payloads have none.
    pub fn into_f64(self) -> anyhow::Result<Vec<f64>> {
        Ok(match self {
            DecodedData::None => Vec::new(),
            DecodedData::Text(_) => return Err(anyhow!("text payload has no samples")),
            DecodedData::F32(v) => v.into_iter().map(f64::from).collect(),
            DecodedData::F64(v) => v,
            DecodedData::I16(v) => v.into_iter().map(f64::from).collect(),
            DecodedData::I32(v) => v.into_iter().map(f64::from).collect(),
        })
    }

    /// Little-endian payload for a miniSEED 3 record.
    pub fn encode(&self) -> anyhow::Result<(DataEncoding, Vec<u8>)> {
        Ok(match self {
            DecodedData::None => (DataEncoding::Text, Vec::new()),
            DecodedData::Text(s) => (DataEncoding::Text, s.as_bytes().to_vec()),
            DecodedData::F32(v) => (DataEncoding::F32, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
            DecodedData::F64(v) => (DataEncoding::F64, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
            DecodedData::I16(v) => (DataEncoding::I16, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
            DecodedData::I32(v) => (DataEncoding::I32, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
        })
    }

    /// `I32` when every sample is an integer that fits, `F64` otherwise.
    pub fn from_samples(samples: &[f64]) -> Self {
        let integral = samples
            .iter()
            .all(|x| x.fract() == 0.0 && *x >= i32::MIN as f64 && *x <= i32::MAX as f64);
        if integral {
            DecodedData::I32(samples.iter().map(|&x| x as i32).collect())
        } else {
            DecodedData::F64(samples.to_vec())
        }
    }
}

impl fmt::Display for DecodedData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedData::None => write!(f, "DecodedData::None"),
            DecodedData::Text(s) => write!(f, "DecodedData::Text({})", s),
            DecodedData::F32(v) => write!(f, "DecodedData::F32({} samples)", v.len()),
            DecodedData::F64(v) => write!(f, "DecodedData::F64({} samples)", v.len()),
            DecodedData::I16(v) => write!(f, "DecodedData::I16({} samples)", v.len()),
            DecodedData::I32(v) => write!(f, "DecodedData::I32({} samples)", v.len()),
        }
    }
}
