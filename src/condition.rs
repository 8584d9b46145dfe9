//! Fixed preprocessing applied to accepted traces: demean, linear detrend,
//! optional lowpass and resample, and instrument response removal.

use std::f64::consts::{PI, SQRT_2};

use anyhow::anyhow;
use num_complex::Complex64;
use realfft::RealFftPlanner;

use crate::error::ConditionError;
use crate::response::PolesZeros;
use crate::trace::{ChannelFamily, Trace, Unit};

const LOWPASS_FREQ: f64 = 2.5;
const RESAMPLE_RATE: f64 = 1.0;
/// Fraction of the trace tapered at each end before the transform.
const TAPER_FRACTION: f64 = 0.05;
const WATER_LEVEL_DB: f64 = 60.0;

/// Unit of the deconvolved trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutput {
    Displacement,
    /// Whatever the response's input unit is.
    Native,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConditioningPolicy {
    pub family: ChannelFamily,
    pub output: ResponseOutput,
    /// Corner frequencies `[f1, f2, f3, f4]` in Hz of the cosine band-pass
    /// applied during deconvolution.
    pub pre_filter: [f64; 4],
}

static POLICIES: [ConditioningPolicy; 2] = [
    ConditioningPolicy {
        family: ChannelFamily::Motion,
        output: ResponseOutput::Displacement,
        pre_filter: [0.001, 0.005, 45.0, 50.0],
    },
    ConditioningPolicy {
        family: ChannelFamily::Pressure,
        output: ResponseOutput::Native,
        pre_filter: [0.001, 0.005, 5.0, 10.0],
    },
];

pub fn policy_for(family: ChannelFamily) -> Option<&'static ConditioningPolicy> {
    POLICIES.iter().find(|p| p.family == family)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SignalConditioner {
    filter_resample: bool,
}

impl SignalConditioner {
    pub fn new(filter_resample: bool) -> Self {
        Self { filter_resample }
    }

    /// Runs the policy of the trace's family. Families without a policy pass
    /// through untouched. The trace is left unmodified when its response is
    /// missing or unusable.
    pub fn condition(&self, trace: &mut Trace) -> Result<(), ConditionError> {
        let Some(policy) = policy_for(trace.family()) else {
            log::debug!("{}: no conditioning policy, left as is", trace.id);
            return Ok(());
        };
        if !(trace.sampling_rate.is_finite() && trace.sampling_rate > 0.0) {
            return Err(ConditionError::Transform {
                id: trace.id.clone(),
                reason: format!("unusable sampling rate {}", trace.sampling_rate),
            });
        }
        let missing = |reason: &str| ConditionError::MissingResponse {
            id: trace.id.clone(),
            reason: reason.to_string(),
        };
        let response = trace
            .response
            .clone()
            .ok_or_else(|| missing("no response attached"))?;
        if let Some(reason) = response.malformed() {
            return Err(missing(reason));
        }
        let output = match policy.output {
            ResponseOutput::Displacement => {
                if response.input_unit.kinematic_order().is_none() {
                    return Err(missing("response input is not a ground motion unit"));
                }
                Unit::Displacement
            }
            ResponseOutput::Native => response.input_unit,
        };

        demean(&mut trace.data);
        detrend_linear(&mut trace.data);
        if self.filter_resample {
            if !lowpass_zero_phase(&mut trace.data, trace.sampling_rate, LOWPASS_FREQ) {
                log::debug!(
                    "{}: resampling {} Hz to {} Hz without the lowpass, spectrum above {} Hz is cut",
                    trace.id,
                    trace.sampling_rate,
                    RESAMPLE_RATE,
                    RESAMPLE_RATE / 2.0
                );
            }
            trace.data = resample(&trace.data, trace.sampling_rate, RESAMPLE_RATE).map_err(
                |e| ConditionError::Transform {
                    id: trace.id.clone(),
                    reason: e.to_string(),
                },
            )?;
            trace.sampling_rate = RESAMPLE_RATE;
        }
        trace.data = remove_response(
            &trace.data,
            trace.sampling_rate,
            &response,
            output,
            policy.pre_filter,
        )
        .map_err(|e| ConditionError::Transform {
            id: trace.id.clone(),
            reason: e.to_string(),
        })?;
        trace.unit = output;
        log::debug!(
            "{}: conditioned to {:?}, {} samples at {} Hz",
            trace.id,
            output,
            trace.npts(),
            trace.sampling_rate
        );
        Ok(())
    }
}

pub fn demean(data: &mut [f64]) {
    if data.is_empty() {
        return;
    }
    let mean = data.iter().sum::<f64>() / data.len() as f64;
    data.iter_mut().for_each(|x| *x -= mean);
}

/// Removes the least-squares line.
pub fn detrend_linear(data: &mut [f64]) {
    let n = data.len();
    if n < 2 {
        demean(data);
        return;
    }
    let xm = (n - 1) as f64 / 2.0;
    let ym = data.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, y) in data.iter().enumerate() {
        let dx = i as f64 - xm;
        sxy += dx * (y - ym);
        sxx += dx * dx;
    }
    let slope = sxy / sxx;
    for (i, y) in data.iter_mut().enumerate() {
        *y -= ym + slope * (i as f64 - xm);
    }
}

/// Cosine ramp over `fraction` of the samples at each end.
pub fn cosine_taper(data: &mut [f64], fraction: f64) {
    let n = data.len();
    let m = ((n as f64) * fraction) as usize;
    if m == 0 {
        return;
    }
    for i in 0..m.min(n / 2) {
        let w = 0.5 * (1.0 - (PI * i as f64 / m as f64).cos());
        data[i] *= w;
        data[n - 1 - i] *= w;
    }
}

/// Two-pole Butterworth lowpass run forward and backward. Skipped with a
/// warning when `freq` is at or above Nyquist.
pub fn lowpass_zero_phase(data: &mut [f64], sampling_rate: f64, freq: f64) -> bool {
    if freq >= sampling_rate / 2.0 {
        log::warn!(
            "lowpass corner {} Hz is not below Nyquist of {} Hz, skipped",
            freq,
            sampling_rate / 2.0
        );
        return false;
    }
    let k = (PI * freq / sampling_rate).tan();
    let norm = 1.0 / (1.0 + SQRT_2 * k + k * k);
    let b0 = k * k * norm;
    let b1 = 2.0 * b0;
    let b2 = b0;
    let a1 = 2.0 * (k * k - 1.0) * norm;
    let a2 = (1.0 - SQRT_2 * k + k * k) * norm;

    let biquad = |data: &mut [f64]| {
        let (mut x1, mut x2, mut y1, mut y2) = (0.0, 0.0, 0.0, 0.0);
        for v in data.iter_mut() {
            let x0 = *v;
            let y0 = b0 * x0 + b1 * x1 + b2 * x2 - a1 * y1 - a2 * y2;
            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;
            *v = y0;
        }
    };
    biquad(data);
    data.reverse();
    biquad(data);
    data.reverse();
    true
}

/// Fourier-domain resampling to `new_rate`.
pub fn resample(data: &[f64], old_rate: f64, new_rate: f64) -> anyhow::Result<Vec<f64>> {
    for rate in [old_rate, new_rate] {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(anyhow!("unusable sampling rate {}", rate));
        }
    }
    if (old_rate - new_rate).abs() < f64::EPSILON {
        return Ok(data.to_vec());
    }
    let n = data.len();
    let m = ((n as f64) * new_rate / old_rate).floor() as usize;
    if n == 0 || m == 0 {
        return Ok(Vec::new());
    }

    let mut planner = RealFftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(n);
    let mut input = data.to_vec();
    let mut spectrum = forward.make_output_vec();
    forward
        .process(&mut input, &mut spectrum)
        .map_err(|e| anyhow!("forward transform: {}", e))?;

    let inverse = planner.plan_fft_inverse(m);
    let mut reduced = inverse.make_input_vec();
    let keep = reduced.len().min(spectrum.len());
    reduced[..keep].copy_from_slice(&spectrum[..keep]);
    reduced[0].im = 0.0;
    if m % 2 == 0 {
        if let Some(last) = reduced.last_mut() {
            last.im = 0.0;
        }
    }
    let mut out = inverse.make_output_vec();
    inverse
        .process(&mut reduced, &mut out)
        .map_err(|e| anyhow!("inverse transform: {}", e))?;
    let scale = 1.0 / n as f64;
    out.iter_mut().for_each(|x| *x *= scale);
    Ok(out)
}

/// Frequency-domain cosine band-pass with corners `[f1, f2, f3, f4]`.
pub fn pre_filter_gain(freq: f64, corners: [f64; 4]) -> f64 {
    let [f1, f2, f3, f4] = corners;
    if freq <= f1 || freq >= f4 {
        0.0
    } else if freq < f2 {
        0.5 * (1.0 - (PI * (freq - f1) / (f2 - f1)).cos())
    } else if freq <= f3 {
        1.0
    } else {
        0.5 * (1.0 + (PI * (freq - f3) / (f4 - f3)).cos())
    }
}

/// Reciprocal of `response`, with magnitudes raised to `water_level_db`
/// below the peak first.
fn invert_with_water_level(response: &[Complex64], water_level_db: f64) -> Vec<Complex64> {
    let peak = response.iter().map(|r| r.norm()).fold(0.0, f64::max);
    let level = peak * 10f64.powf(-water_level_db / 20.0);
    response
        .iter()
        .map(|&r| {
            let mag = r.norm();
            let r = if mag < level {
                if mag > 0.0 {
                    r * (level / mag)
                } else {
                    Complex64::new(level, 0.0)
                }
            } else {
                r
            };
            if r.norm() == 0.0 {
                Complex64::new(0.0, 0.0)
            } else {
                r.inv()
            }
        })
        .collect()
}

/// Deconvolves `response` from `data`, yielding samples in `output` units.
pub fn remove_response(
    data: &[f64],
    sampling_rate: f64,
    response: &PolesZeros,
    output: Unit,
    pre_filter: [f64; 4],
) -> anyhow::Result<Vec<f64>> {
    let n = data.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let nfft = (2 * n).next_power_of_two();
    let df = sampling_rate / nfft as f64;

    let mut planner = RealFftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(nfft);
    let mut input = forward.make_input_vec();
    input[..n].copy_from_slice(data);
    cosine_taper(&mut input[..n], TAPER_FRACTION);
    let mut spectrum = forward.make_output_vec();
    forward
        .process(&mut input, &mut spectrum)
        .map_err(|e| anyhow!("forward transform: {}", e))?;

    let curve = (0..spectrum.len())
        .map(|k| {
            let f = k as f64 * df;
            if output == response.input_unit {
                Ok(response.evaluate(f))
            } else {
                response
                    .evaluate_as(f, output)
                    .ok_or_else(|| anyhow!("cannot express {:?} response as {:?}", response.input_unit, output))
            }
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let inverse_curve = invert_with_water_level(&curve, WATER_LEVEL_DB);
    for (k, (s, inv)) in spectrum.iter_mut().zip(inverse_curve).enumerate() {
        *s *= inv * pre_filter_gain(k as f64 * df, pre_filter);
    }
    spectrum[0].im = 0.0;
    if let Some(last) = spectrum.last_mut() {
        last.im = 0.0;
    }

    let inverse = planner.plan_fft_inverse(nfft);
    let mut out = inverse.make_output_vec();
    inverse
        .process(&mut spectrum, &mut out)
        .map_err(|e| anyhow!("inverse transform: {}", e))?;
    out.truncate(n);
    let scale = 1.0 / nfft as f64;
    out.iter_mut().for_each(|x| *x *= scale);
    Ok(out)
}
