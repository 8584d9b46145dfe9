//! Copies station geometry, component orientation and instrument response
//! from the inventory onto traces.

use crate::inventory::StationInventory;
use crate::trace::{ChannelFamily, Orientation, Trace};

/// SAC measures component inclination from vertical-down, FDSN dip from the
/// horizontal.
pub fn inclination_from_dip(dip: f64) -> f64 {
    dip + 90.0
}

/// Enriches `trace` in place. The inventory was requested for exactly the
/// stations being fetched, so a missing station only leaves the trace as is.
pub fn imprint(trace: &mut Trace, inventory: &StationInventory) {
    trace.family = Some(ChannelFamily::from_channel_code(&trace.id.channel));

    let Some(station) = inventory.station(&trace.id.network, &trace.id.station) else {
        log::warn!("{}: station not in inventory", trace.id);
        return;
    };
    trace.geometry = Some(station.geometry());

    match station.channel(&trace.id.location, &trace.id.channel, trace.start_time) {
        Some(channel) => {
            trace.orientation = Some(Orientation {
                azimuth: channel.azimuth,
                inclination: inclination_from_dip(channel.dip),
            });
            trace.response = channel.response.clone();
        }
        None => log::warn!("{}: channel not in inventory, orientation unset", trace.id),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inventory::{Channel, Station};
    use crate::response::PolesZeros;
    use crate::trace::{TraceId, Unit};
    use chrono::{TimeZone, Utc};

    fn channel(code: &str, azimuth: f64, dip: f64) -> Channel {
        Channel {
            location: String::new(),
            code: code.to_string(),
            azimuth,
            dip,
            sample_rate: 100.0,
            start: None,
            end: None,
            response: Some(PolesZeros {
                zeros: vec![],
                poles: vec![],
                constant: 1.0,
                input_unit: Unit::Displacement,
            }),
        }
    }

    fn inventory() -> StationInventory {
        StationInventory::new(vec![Station {
            network: "YH".to_string(),
            code: "LOBS1".to_string(),
            latitude: -39.0,
            longitude: 178.9,
            elevation: -707.0,
            channels: vec![
                channel("HH1", 47.0, 0.0),
                channel("HHZ", 0.0, -90.0),
                channel("EDH", 0.0, 0.0),
            ],
        }])
    }

    fn trace(code: &str) -> Trace {
        Trace::new(
            TraceId::new("YH", "LOBS1", "", code),
            Utc.with_ymd_and_hms(2014, 8, 1, 0, 0, 0).unwrap(),
            100.0,
            vec![1.0, 2.0],
        )
    }

    #[test]
    fn inclination_for_every_family() {
        let inv = inventory();
        for (code, dip) in [("HH1", 0.0), ("HHZ", -90.0), ("EDH", 0.0)] {
            let mut tr = trace(code);
            imprint(&mut tr, &inv);
            let o = tr.orientation.unwrap();
            assert_eq!(o.inclination, dip + 90.0);
        }
    }

    #[test]
    fn geometry_family_and_response() {
        let inv = inventory();
        let mut tr = trace("HH1");
        imprint(&mut tr, &inv);
        let g = tr.geometry.unwrap();
        assert_eq!((g.latitude, g.longitude, g.elevation), (-39.0, 178.9, -707.0));
        assert_eq!(tr.orientation.unwrap().azimuth, 47.0);
        assert_eq!(tr.family, Some(ChannelFamily::Motion));
        assert!(tr.response.is_some());

        let mut edh = trace("EDH");
        imprint(&mut edh, &inv);
        assert_eq!(edh.family, Some(ChannelFamily::Pressure));
    }

    #[test]
    fn unknown_channel_keeps_geometry() {
        let inv = inventory();
        let mut tr = trace("HH2");
        imprint(&mut tr, &inv);
        assert!(tr.geometry.is_some());
        assert!(tr.orientation.is_none());
        assert!(tr.response.is_none());
    }
}
