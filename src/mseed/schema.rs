//! Extra headers of the miniSEED 3 records we write.
//! ref [FDSN Extra Header schema v1.0.](https://raw.githubusercontent.com/FDSN/miniSEED3/main/extra-headers/ExtraHeaders-FDSN-v1.0.schema-2023-07.json)
//!
//! Headers outside the reserved `FDSN` namespace carry the station geometry
//! and orientation that SAC keeps in `stla`, `stlo`, `stel`, `cmpaz` and
//! `cmpinc`.

use serde::{Deserialize, Serialize};

use crate::trace::{Trace, Unit};

/// Top level of the extra header JSON object.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ExtraHeaders {
    #[serde(rename = "FDSN", skip_serializing_if = "Option::is_none")]
    pub fdsn: Option<Fdsn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub station: Option<StationHeaders>,
}

impl ExtraHeaders {
    pub fn from_trace(trace: &Trace) -> Option<Self> {
        let fdsn = Fdsn::from_trace(trace);
        let station = StationHeaders::from_trace(trace);
        if fdsn.is_none() && station.is_none() {
            None
        } else {
            Some(Self { fdsn, station })
        }
    }
}

/// Reserved extra headers defined by the FDSN, the subset we populate.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Fdsn {
    /// Data quality indicator, use D, R, Q or M. [same as SEED 2.4 FSDH, field 2]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_quality: Option<String>,
}

impl Fdsn {
    /// Deconvolved data are marked quality controlled (`Q`).
    fn from_trace(trace: &Trace) -> Option<Self> {
        (trace.unit != Unit::Counts).then(|| Fdsn {
            data_quality: Some("Q".to_string()),
        })
    }
}

/// Station geometry and component orientation imprinted from the inventory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct StationHeaders {
    /// Degrees north
    pub latitude: f64,
    /// Degrees east
    pub longitude: f64,
    /// Meters above sea level
    pub elevation: f64,
    /// Degrees clockwise from north
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuth: Option<f64>,
    /// Degrees from vertical-down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inclination: Option<f64>,
    pub unit: Unit,
}

impl StationHeaders {
    fn from_trace(trace: &Trace) -> Option<Self> {
        let geometry = trace.geometry?;
        Some(Self {
            latitude: geometry.latitude,
            longitude: geometry.longitude,
            elevation: geometry.elevation,
            azimuth: trace.orientation.map(|o| o.azimuth),
            inclination: trace.orientation.map(|o| o.inclination),
            unit: trace.unit,
        })
    }
}
