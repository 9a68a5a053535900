use serde::{Deserialize, Serialize};

/// # Aircraft Position
///
/// One state vector for a tracked aircraft, from either the live feed or the
/// military feed. Coordinates are optional because the live feed reports
/// aircraft that currently lack a position fix.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AircraftPosition {
    /// ICAO 24-bit transponder address as lowercase hex.
    pub icao24: String,
    /// Callsign with surrounding whitespace removed. Empty when unknown.
    pub callsign: String,
    /// Country inferred from the transponder address. Empty when unknown.
    pub origin_country: String,
    /// WGS-84 longitude in decimal degrees.
    pub longitude: Option<f64>,
    /// WGS-84 latitude in decimal degrees.
    pub latitude: Option<f64>,
    /// Barometric altitude in metres.
    pub altitude: Option<f64>,
    /// Ground speed in m/s.
    pub velocity: Option<f64>,
    /// True track in degrees clockwise from north.
    pub heading: Option<f64>,
    /// Vertical rate in m/s.
    pub vertical_rate: Option<f64>,
    /// Whether the aircraft reports being on the ground.
    pub on_ground: bool,
    /// Unix seconds of the last message received from the transponder.
    pub last_contact: Option<i64>,
}

impl AircraftPosition {
    /// Returns `(longitude, latitude)` when both are present.
    pub fn position(&self) -> Option<(f64, f64)> {
        match (self.longitude, self.latitude) {
            (Some(lon), Some(lat)) => Some((lon, lat)),
            _ => None,
        }
    }
}

/// # Earthquake Event
///
/// A single seismic event from the USGS feed. Events always carry a position;
/// features without one are rejected during decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarthquakeEvent {
    /// USGS event id.
    pub id: String,
    /// Event magnitude.
    pub magnitude: f64,
    /// Human readable location description.
    pub place: String,
    /// Epicentre longitude.
    pub longitude: f64,
    /// Epicentre latitude.
    pub latitude: f64,
    /// Hypocentre depth in kilometres.
    pub depth_km: f64,
    /// Origin time in Unix milliseconds.
    pub time_ms: i64,
}

/// Two-line element set for one orbital object, with its catalog name.
///
/// Propagation happens in the display layer, so the raw lines travel as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TleRecord {
    /// NORAD catalog number taken from columns 3-7 of line 1.
    pub norad_id: String,
    /// Object name from the line preceding the element set.
    pub name: String,
    /// Line 1 of the element set.
    pub line1: String,
    /// Line 2 of the element set.
    pub line2: String,
}

/// Geographic rectangle used to scope a live-feed query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum latitude.
    pub lamin: f64,
    /// Minimum longitude.
    pub lomin: f64,
    /// Maximum latitude.
    pub lamax: f64,
    /// Maximum longitude.
    pub lomax: f64,
}

impl BoundingBox {
    /// Query parameters in the order the live feed documents them.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("lamin".to_string(), self.lamin.to_string()),
            ("lomin".to_string(), self.lomin.to_string()),
            ("lamax".to_string(), self.lamax.to_string()),
            ("lomax".to_string(), self.lomax.to_string()),
        ]
    }

    /// True when the box is non-empty and inside valid coordinate ranges.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lamin)
            && (-90.0..=90.0).contains(&self.lamax)
            && (-180.0..=180.0).contains(&self.lomin)
            && (-180.0..=180.0).contains(&self.lomax)
            && self.lamin < self.lamax
            && self.lomin < self.lomax
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_requires_both_coordinates() {
        let mut ac = AircraftPosition {
            icao24: "abc123".to_string(),
            longitude: Some(-73.9),
            ..Default::default()
        };
        assert_eq!(ac.position(), None);

        ac.latitude = Some(40.7);
        assert_eq!(ac.position(), Some((-73.9, 40.7)));
    }

    #[test]
    fn test_bounding_box_validation() {
        let bbox = BoundingBox { lamin: 45.8, lomin: 5.9, lamax: 47.8, lomax: 10.5 };
        assert!(bbox.is_valid());
        assert_eq!(bbox.query_pairs()[0], ("lamin".to_string(), "45.8".to_string()));

        let inverted = BoundingBox { lamin: 47.8, lomin: 5.9, lamax: 45.8, lomax: 10.5 };
        assert!(!inverted.is_valid());
    }
}
