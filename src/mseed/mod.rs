//! miniSEED codec: miniSEED 2 records in, miniSEED 3 records out.

mod data;
mod header;
mod record;
mod schema;
mod steim;

pub use data::DecodedData;
pub use header::{consts, ActivityFlags, DataEncoding, FieldFlag, MS2FixedHeader, MS3Header, MS3Time, SampleRP};
pub use record::{read_traces, MS2Record, MS2Volume, MS3Record, MS3RecordBuilder};
pub use schema::{ExtraHeaders, Fdsn, StationHeaders};
pub use steim::{decode_steim1, decode_steim2};
