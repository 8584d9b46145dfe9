#![deny(unsafe_code)]
//! Download segmented seismic waveforms from an FDSN data center, quality
//! control them, optionally remove the instrument response, and write one
//! SAC or miniSEED 3 file per trace.
//!
//! The pipeline for every (station, window) pair is
//! fetch -> [`quality`] -> channel count -> [`imprint`] -> [`condition`] -> [`persist`],
//! driven by [`retrieval::Retriever`].

pub mod client;
pub mod condition;
pub mod config;
pub mod error;
pub mod imprint;
pub mod inventory;
pub mod mseed;
pub mod persist;
pub mod quality;
pub mod response;
pub mod retrieval;
pub mod sac;
pub mod segment;
pub mod trace;

pub use client::{FdsnClient, WaveformSource};
pub use condition::SignalConditioner;
pub use config::{FileNameFormat, OutputFormat, RequestSpec};
pub use error::{ConditionError, ConfigError, Rejection, RunError, SegmentError};
pub use inventory::{Channel, Station, StationInventory};
pub use persist::{FileWriter, TraceWriter};
pub use quality::QualityVerdict;
pub use response::PolesZeros;
pub use retrieval::{Retriever, SegmentOutcome};
pub use segment::{SegmentClock, SegmentWindow};
pub use trace::{ChannelFamily, Trace, TraceBatch, TraceId, Unit};

const CRC32C: crc::Crc<u32> = crc::Crc::<u32>::new(&crc::CRC_32_ISCSI); // iSCSI CRC-32C
