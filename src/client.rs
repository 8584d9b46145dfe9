//! FDSN web service client.
//!
//! Stations come from `fdsnws/station` at channel level in text format,
//! waveforms from `fdsnws/dataselect` as miniSEED 2, and instrument
//! responses from the IRIS `irisws/sacpz` service where the data center
//! offers it.

use std::io::Read;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::RequestSpec;
use crate::error::ConfigError;
use crate::inventory::StationInventory;
use crate::mseed;
use crate::response::parse_sacpz;
use crate::segment::SegmentWindow;
use crate::trace::TraceBatch;

const FDSN_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Data center roots by short name.
static PROVIDERS: &[(&str, &str)] = &[
    ("IRIS", "https://service.iris.edu"),
    ("GFZ", "https://geofon.gfz-potsdam.de"),
    ("ORFEUS", "https://www.orfeus-eu.org"),
    ("ETH", "https://eida.ethz.ch"),
    ("GEONET", "https://service.geonet.org.nz"),
    ("INGV", "https://webservices.ingv.it"),
    ("NCEDC", "https://service.ncedc.org"),
    ("SCEDC", "https://service.scedc.caltech.edu"),
    ("USGS", "https://earthquake.usgs.gov"),
    ("RESIF", "https://ws.resif.fr"),
];

const IRIS_SACPZ: &str = "https://service.iris.edu/irisws/sacpz/1/query";

/// The remote side of a run.
pub trait WaveformSource {
    /// Stations and channels matching the request, with responses attached
    /// where the source has them.
    fn list_stations(&self, spec: &RequestSpec) -> anyhow::Result<StationInventory>;

    fn fetch_waveforms(
        &self,
        network: &str,
        station: &str,
        location: &str,
        channels: &str,
        window: &SegmentWindow,
    ) -> anyhow::Result<TraceBatch>;
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("no data available")]
    NoData,
    #[error("HTTP {code}: {message}")]
    Status { code: u16, message: String },
    #[error("transport: {0}")]
    Transport(String),
}

fn fdsn_time(t: DateTime<Utc>) -> String {
    t.format(FDSN_TIME_FORMAT).to_string()
}

/// FDSN spells an empty location code `--`.
fn location_param(location: &str) -> &str {
    if location.is_empty() {
        "--"
    } else {
        location
    }
}

#[derive(Debug, Clone)]
pub struct FdsnClient {
    name: String,
    base_url: String,
    sacpz_url: Option<String>,
    agent: ureq::Agent,
}

impl FdsnClient {
    /// `client_id` is a data center short name, case insensitive, or an
    /// `http(s)://` base URL.
    pub fn new(client_id: &str, timeout: Duration) -> Result<Self, ConfigError> {
        let (base_url, sacpz_url) = if client_id.starts_with("http://") || client_id.starts_with("https://") {
            (client_id.trim_end_matches('/').to_string(), None)
        } else {
            let upper = client_id.to_ascii_uppercase();
            let (_, base) = PROVIDERS
                .iter()
                .find(|(name, _)| *name == upper)
                .ok_or_else(|| ConfigError::UnknownClient(client_id.to_string()))?;
            let sacpz = (upper == "IRIS").then(|| IRIS_SACPZ.to_string());
            (base.to_string(), sacpz)
        };
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(concat!("seisfetch/", env!("CARGO_PKG_VERSION")))
            .build();
        log::debug!("client {} at {}", client_id, base_url);
        Ok(Self {
            name: client_id.to_string(),
            base_url,
            sacpz_url,
            agent,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn service_url(&self, service: &str) -> String {
        format!("{}/fdsnws/{}/1/query", self.base_url, service)
    }

    fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<ureq::Response, ServiceError> {
        let mut request = self.agent.get(url);
        for (key, value) in query {
            request = request.query(key, value);
        }
        log::debug!("GET {}", request.url());
        match request.call() {
            Ok(resp) if resp.status() == 204 => Err(ServiceError::NoData),
            Ok(resp) => Ok(resp),
            Err(ureq::Error::Status(404, _)) => Err(ServiceError::NoData),
            Err(ureq::Error::Status(code, resp)) => Err(ServiceError::Status {
                code,
                message: resp.into_string().unwrap_or_default().trim().to_string(),
            }),
            Err(ureq::Error::Transport(err)) => Err(ServiceError::Transport(err.to_string())),
        }
    }

    fn get_text(&self, url: &str, query: &[(&str, &str)]) -> anyhow::Result<String> {
        let resp = self.get(url, query)?;
        resp.into_string().context("reading response body")
    }

    fn get_bytes(&self, url: &str, query: &[(&str, &str)]) -> anyhow::Result<Vec<u8>> {
        let resp = self.get(url, query)?;
        let mut bytes = Vec::new();
        resp.into_reader()
            .read_to_end(&mut bytes)
            .context("reading response body")?;
        Ok(bytes)
    }

    /// Poles and zeros for every channel of the inventory. Failures are
    /// logged, the affected channels simply have no response.
    fn attach_responses(&self, spec: &RequestSpec, inventory: &mut StationInventory) {
        let Some(url) = self.sacpz_url.as_deref() else {
            log::warn!(
                "{} offers no pole-zero service, responses unavailable",
                self.name
            );
            return;
        };
        let (start, end) = (fdsn_time(spec.start_time), fdsn_time(spec.end_time));
        let stations: Vec<(String, String)> = inventory
            .stations()
            .iter()
            .map(|s| (s.network.clone(), s.code.clone()))
            .collect();
        for (network, station) in stations {
            let query = [
                ("net", network.as_str()),
                ("sta", station.as_str()),
                ("loc", location_param(&spec.location)),
                ("cha", spec.channels.as_str()),
                ("starttime", start.as_str()),
                ("endtime", end.as_str()),
            ];
            let entries = self
                .get_text(url, &query)
                .and_then(|text| parse_sacpz(&text));
            match entries {
                Ok(entries) => {
                    let attached = inventory.attach_responses(&entries);
                    log::info!("{}.{}: {} channel responses", network, station, attached);
                }
                Err(e) => log::warn!("{}.{}: no responses: {:#}", network, station, e),
            }
        }
    }
}

impl WaveformSource for FdsnClient {
    fn list_stations(&self, spec: &RequestSpec) -> anyhow::Result<StationInventory> {
        let (start, end) = (fdsn_time(spec.start_time), fdsn_time(spec.end_time));
        let query = [
            ("network", spec.network.as_str()),
            ("station", spec.stations.as_str()),
            ("location", location_param(&spec.location)),
            ("channel", spec.channels.as_str()),
            ("starttime", start.as_str()),
            ("endtime", end.as_str()),
            ("level", "channel"),
            ("format", "text"),
        ];
        let text = self
            .get_text(&self.service_url("station"), &query)
            .with_context(|| format!("station query to {}", self.name))?;
        let mut inventory = StationInventory::from_fdsn_text(&text)?;
        if inventory.is_empty() {
            return Err(anyhow!("no stations match {}.{}", spec.network, spec.stations));
        }
        log::info!("{} stations from {}", inventory.stations().len(), self.name);
        self.attach_responses(spec, &mut inventory);
        Ok(inventory)
    }

    fn fetch_waveforms(
        &self,
        network: &str,
        station: &str,
        location: &str,
        channels: &str,
        window: &SegmentWindow,
    ) -> anyhow::Result<TraceBatch> {
        let (start, end) = (fdsn_time(window.start), fdsn_time(window.end));
        let query = [
            ("network", network),
            ("station", station),
            ("location", location_param(location)),
            ("channel", channels),
            ("starttime", start.as_str()),
            ("endtime", end.as_str()),
        ];
        let bytes = self.get_bytes(&self.service_url("dataselect"), &query)?;
        log::debug!("{}.{}: {} bytes of miniSEED", network, station, bytes.len());
        let mut batch = mseed::read_traces(&bytes)?;
        // whole records come back, usually reaching past both window edges
        batch.trim(window.start, window.end);
        Ok(batch)
    }
}
