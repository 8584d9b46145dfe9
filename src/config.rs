//! Run configuration.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::trace::{seconds, seconds_between};

/// Timestamp prefix of output file names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FileNameFormat {
    /// `%Y.%j.%H.%M:%S.%6f`
    Default,
    /// Caller supplied strftime pattern.
    Pattern(String),
}

impl FileNameFormat {
    pub const DEFAULT_PATTERN: &'static str = "%Y.%j.%H.%M:%S.%6f";

    pub fn pattern(&self) -> &str {
        match self {
            FileNameFormat::Default => Self::DEFAULT_PATTERN,
            FileNameFormat::Pattern(p) => p,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.pattern().is_empty()
            && !StrftimeItems::new(self.pattern()).any(|item| matches!(item, Item::Error))
    }
}

impl Default for FileNameFormat {
    fn default() -> Self {
        FileNameFormat::Default
    }
}

impl From<String> for FileNameFormat {
    fn from(s: String) -> Self {
        if s.is_empty() || s.eq_ignore_ascii_case("default") {
            FileNameFormat::Default
        } else {
            FileNameFormat::Pattern(s)
        }
    }
}

impl From<FileNameFormat> for String {
    fn from(f: FileNameFormat) -> Self {
        match f {
            FileNameFormat::Default => "default".to_string(),
            FileNameFormat::Pattern(p) => p,
        }
    }
}

impl FromStr for FileNameFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(FileNameFormat::from(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "SAC")]
    Sac,
    #[serde(alias = "mseed3", alias = "miniseed")]
    MiniSeed3,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Sac => "SAC",
            OutputFormat::MiniSeed3 => "mseed3",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Sac => write!(f, "sac"),
            OutputFormat::MiniSeed3 => write!(f, "miniseed3"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sac" => Ok(OutputFormat::Sac),
            "miniseed3" | "mseed3" | "miniseed" => Ok(OutputFormat::MiniSeed3),
            other => Err(ConfigError::Load(format!("unknown output format {:?}", other))),
        }
    }
}

fn default_location() -> String {
    "*".to_string()
}

fn default_timeout() -> f64 {
    120.0
}

/// Everything a run needs, fixed for its duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RequestSpec {
    /// Data center name (`IRIS`, `GFZ`, ...) or base URL.
    pub client: String,
    /// Network code, wildcards allowed.
    pub network: String,
    /// Comma separated station codes, wildcards allowed.
    pub stations: String,
    /// Comma separated channel codes, wildcards allowed.
    pub channels: String,
    #[serde(default = "default_location")]
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Segment length in seconds.
    pub segment_duration: f64,
    /// Number of distinct channels a segment must contain.
    pub channel_count: usize,
    #[serde(default)]
    pub strict_length: bool,
    #[serde(default)]
    pub file_name_format: FileNameFormat,
    pub output_dir: PathBuf,
    #[serde(default)]
    pub output_format: OutputFormat,
    #[serde(default)]
    pub preprocess: bool,
    /// Lowpass at 2.5 Hz and resample to 1 Hz before response removal.
    #[serde(default)]
    pub filter_resample: bool,
    /// Network timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
}

impl RequestSpec {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: &str,
        network: &str,
        stations: &str,
        channels: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        segment_duration: f64,
        channel_count: usize,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client: client.to_string(),
            network: network.to_string(),
            stations: stations.to_string(),
            channels: channels.to_string(),
            location: default_location(),
            start_time,
            end_time,
            segment_duration,
            channel_count,
            strict_length: false,
            file_name_format: FileNameFormat::Default,
            output_dir: output_dir.into(),
            output_format: OutputFormat::Sac,
            preprocess: false,
            filter_resample: false,
            timeout: default_timeout(),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Load(e.to_string()))
    }

    pub fn segment_length(&self) -> Duration {
        seconds(self.segment_duration)
    }

    /// Length of `[start_time, end_time)` in seconds.
    pub fn interval(&self) -> f64 {
        seconds_between(self.start_time, self.end_time)
    }

    /// Checks run before any network access.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.segment_duration > 0.0) {
            return Err(ConfigError::NonPositiveDuration(self.segment_duration));
        }
        if self.segment_duration > self.interval() {
            return Err(ConfigError::SegmentExceedsInterval {
                duration: self.segment_duration,
                interval: self.interval(),
            });
        }
        if self.channel_count == 0 {
            return Err(ConfigError::NoChannels);
        }
        if !self.file_name_format.is_valid() {
            return Err(ConfigError::FileNameFormat(
                self.file_name_format.pattern().to_string(),
            ));
        }
        Ok(())
    }
}
