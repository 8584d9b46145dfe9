//! Acceptance checks on a freshly fetched batch.

use crate::error::Rejection;
use crate::trace::{Trace, TraceBatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityVerdict {
    Pass,
    Reject(Rejection),
}

/// True when the signal is identically zero after removing its mean. Covers
/// zero traces, constant traces and traces without samples.
///
/// A demeaned signal vanishes exactly when every sample equals the first, which
/// is compared directly so rounding in the mean cannot hide a constant trace.
pub fn is_flat(data: &[f64]) -> bool {
    match data.first() {
        None => true,
        Some(&first) => data.iter().all(|&x| x == first),
    }
}

/// Samples missing from `trace` relative to a full segment of `duration`
/// seconds.
pub fn shortfall(trace: &Trace, duration: f64) -> f64 {
    duration * trace.sampling_rate - trace.npts() as f64
}

/// Read-only evaluation; the caller decides what to do with a rejection.
pub fn evaluate(batch: &TraceBatch, strict_length: bool, duration: f64) -> QualityVerdict {
    // nothing returned is treated the same as flat data
    if batch.is_empty() || batch.iter().any(|t| is_flat(&t.data)) {
        return QualityVerdict::Reject(Rejection::ConstantSignal);
    }
    if strict_length && batch.iter().any(|t| shortfall(t, duration) > 1.0) {
        return QualityVerdict::Reject(Rejection::ShortSegment);
    }
    QualityVerdict::Pass
}
