//! Instrument response as poles and zeros, and the IRIS SAC pole-zero text
//! format it is delivered in.

use std::f64::consts::PI;

use anyhow::{anyhow, Context};
use chrono::{DateTime, NaiveDateTime, Utc};
use num_complex::Complex64;

use crate::trace::{TraceId, Unit};

/// Laplace-domain transfer function in the SAC convention: `constant`
/// includes the normalization and the overall sensitivity, the response maps
/// `input_unit` to counts.
#[derive(Debug, Clone, PartialEq)]
pub struct PolesZeros {
    pub zeros: Vec<Complex64>,
    pub poles: Vec<Complex64>,
    pub constant: f64,
    pub input_unit: Unit,
}

impl PolesZeros {
    /// Response at `freq` Hz.
    pub fn evaluate(&self, freq: f64) -> Complex64 {
        let s = Complex64::new(0.0, 2.0 * PI * freq);
        let num = self
            .zeros
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, z| acc * (s - z));
        let den = self
            .poles
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, p| acc * (s - p));
        if den.norm() == 0.0 {
            return Complex64::new(0.0, 0.0);
        }
        num / den * self.constant
    }

    /// Response at `freq` Hz for ground motion expressed in `output`.
    /// `None` if either unit is not kinematic.
    pub fn evaluate_as(&self, freq: f64, output: Unit) -> Option<Complex64> {
        let order = self.input_unit.kinematic_order()? - output.kinematic_order()?;
        let iw = Complex64::new(0.0, 2.0 * PI * freq);
        Some(self.evaluate(freq) * iw.powi(order))
    }

    /// A response that cannot be deconvolved.
    pub fn malformed(&self) -> Option<&'static str> {
        if !self.constant.is_finite() || self.constant == 0.0 {
            return Some("zero or non-finite normalization constant");
        }
        if self
            .zeros
            .iter()
            .chain(self.poles.iter())
            .any(|c| !c.re.is_finite() || !c.im.is_finite())
        {
            return Some("non-finite pole or zero");
        }
        None
    }
}

/// One channel epoch of a SAC pole-zero listing.
#[derive(Debug, Clone)]
pub struct SacPzEntry {
    pub id: TraceId,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub response: PolesZeros,
}

impl SacPzEntry {
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| s <= t) && self.end.map_or(true, |e| t < e)
    }
}

pub(crate) fn parse_fdsn_time(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim().trim_end_matches('Z');
    if s.is_empty() {
        return None;
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| {
            NaiveDateTime::parse_from_str(s, fmt).ok().or_else(|| {
                chrono::NaiveDate::parse_from_str(s, fmt)
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
        })
        .map(|naive| naive.and_utc())
}

#[derive(Default)]
struct PzBlock {
    network: String,
    station: String,
    location: String,
    channel: String,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    input_unit: Option<Unit>,
    zeros: Vec<Complex64>,
    poles: Vec<Complex64>,
    constant: Option<f64>,
}

impl PzBlock {
    fn finish(self) -> anyhow::Result<SacPzEntry> {
        let constant = self
            .constant
            .ok_or_else(|| anyhow!("{}.{}: no CONSTANT", self.station, self.channel))?;
        let location = if self.location == "--" {
            String::new()
        } else {
            self.location
        };
        Ok(SacPzEntry {
            id: TraceId::new(&self.network, &self.station, &location, &self.channel),
            start: self.start,
            end: self.end,
            response: PolesZeros {
                zeros: self.zeros,
                poles: self.poles,
                constant,
                // SAC pole-zero files are displacement unless stated otherwise
                input_unit: self.input_unit.unwrap_or(Unit::Displacement),
            },
        })
    }
}

#[derive(Clone, Copy)]
enum Section {
    Header,
    Zeros(usize),
    Poles(usize),
}

fn parse_complex(line: &str) -> anyhow::Result<Complex64> {
    let mut it = line.split_whitespace();
    let re = it.next().ok_or_else(|| anyhow!("missing real part"))?;
    let im = it.next().ok_or_else(|| anyhow!("missing imaginary part"))?;
    Ok(Complex64::new(
        re.parse().with_context(|| format!("bad real part {:?}", re))?,
        im.parse().with_context(|| format!("bad imaginary part {:?}", im))?,
    ))
}

/// Parses the output of the `irisws/sacpz` service, one entry per channel
/// epoch. Zeros declared in the count line but not listed are at the origin.
pub fn parse_sacpz(text: &str) -> anyhow::Result<Vec<SacPzEntry>> {
    let mut entries = Vec::new();
    let mut block: Option<PzBlock> = None;
    let mut section = Section::Header;

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('*') {
            let Some((key, value)) = comment.split_once(':') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            if key.starts_with("NETWORK") {
                if let Some(done) = block.take() {
                    entries.push(finish_block(done, &mut section)?);
                }
                block = Some(PzBlock {
                    network: value.to_string(),
                    ..Default::default()
                });
                continue;
            }
            let Some(b) = block.as_mut() else {
                continue;
            };
            if key.starts_with("STATION") {
                b.station = value.to_string();
            } else if key.starts_with("LOCATION") {
                b.location = value.to_string();
            } else if key.starts_with("CHANNEL") {
                b.channel = value.to_string();
            } else if key == "START" {
                b.start = parse_fdsn_time(value);
            } else if key == "END" {
                b.end = parse_fdsn_time(value);
            } else if key.starts_with("INPUT UNIT") {
                b.input_unit = Some(Unit::from_response_unit(value));
            }
            continue;
        }

        let b = block.get_or_insert_with(PzBlock::default);
        let mut words = line.split_whitespace();
        match words.next() {
            Some("ZEROS") => {
                let n: usize = words
                    .next()
                    .ok_or_else(|| anyhow!("line {}: ZEROS without count", lineno + 1))?
                    .parse()?;
                b.zeros = vec![Complex64::new(0.0, 0.0); n];
                section = Section::Zeros(0);
            }
            Some("POLES") => {
                let n: usize = words
                    .next()
                    .ok_or_else(|| anyhow!("line {}: POLES without count", lineno + 1))?
                    .parse()?;
                b.poles = vec![Complex64::new(0.0, 0.0); n];
                section = Section::Poles(0);
            }
            Some("CONSTANT") => {
                let v = words
                    .next()
                    .ok_or_else(|| anyhow!("line {}: CONSTANT without value", lineno + 1))?;
                b.constant = Some(v.parse().with_context(|| format!("bad constant {:?}", v))?);
                section = Section::Header;
            }
            Some(_) => match section {
                Section::Zeros(i) if i < b.zeros.len() => {
                    b.zeros[i] = parse_complex(line)
                        .with_context(|| format!("line {}", lineno + 1))?;
                    section = Section::Zeros(i + 1);
                }
                Section::Poles(i) if i < b.poles.len() => {
                    b.poles[i] = parse_complex(line)
                        .with_context(|| format!("line {}", lineno + 1))?;
                    section = Section::Poles(i + 1);
                }
                _ => log::debug!("sacpz: ignoring line {}: {}", lineno + 1, line),
            },
            None => {}
        }
    }
    if let Some(done) = block.take() {
        entries.push(finish_block(done, &mut section)?);
    }
    Ok(entries)
}

fn finish_block(block: PzBlock, section: &mut Section) -> anyhow::Result<SacPzEntry> {
    *section = Section::Header;
    block.finish()
}
