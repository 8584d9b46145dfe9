//! Error types the retrieval loop matches on.

use std::fmt;

use thiserror::Error;

use crate::trace::TraceId;

/// Invalid run configuration. Always fatal, raised before any I/O.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("segment duration {duration}s exceeds the request interval of {interval}s")]
    SegmentExceedsInterval { duration: f64, interval: f64 },
    #[error("segment duration must be positive, got {0}s")]
    NonPositiveDuration(f64),
    #[error("expected channel count must be at least 1")]
    NoChannels,
    #[error("invalid file name format {0:?}")]
    FileNameFormat(String),
    #[error("unknown FDSN client {0:?}")]
    UnknownClient(String),
    #[error("cannot read configuration: {0}")]
    Load(String),
}

/// Reason the quality gate turned a batch away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// A trace is flat after demeaning, or the batch is empty.
    ConstantSignal,
    /// A trace is more than one sample short of the segment length.
    ShortSegment,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::ConstantSignal => write!(f, "constant-valued traces"),
            Rejection::ShortSegment => write!(f, "traces shorter than the segment"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("{id}: missing instrument response: {reason}")]
    MissingResponse { id: TraceId, reason: String },
    #[error("{id}: spectral transform failed: {reason}")]
    Transform { id: TraceId, reason: String },
}

/// Why one (station, window) attempt produced no files.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("waveform fetch failed: {0:#}")]
    Fetch(anyhow::Error),
    #[error("quality control rejected segment: {0}")]
    Rejected(Rejection),
    #[error("requested channels unavailable: expected {expected}, found {found}")]
    ChannelCountMismatch { expected: usize, found: usize },
    #[error(transparent)]
    Condition(#[from] ConditionError),
    #[error("writing {id} failed: {reason:#}")]
    Persist { id: TraceId, reason: anyhow::Error },
}

impl SegmentError {
    pub fn is_missing_response(&self) -> bool {
        matches!(
            self,
            SegmentError::Condition(ConditionError::MissingResponse { .. })
        )
    }
}

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("station inventory unavailable: {0:#}")]
    Inventory(anyhow::Error),
}
