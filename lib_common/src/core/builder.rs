//! # Payload Builder
//!
//! Turns one cycle's worth of fetched records into the `WorldPayload`. Every
//! function here is pure: inputs are borrowed and never modified, and a result
//! is produced even when every input is empty.

use crate::models::payload::unix_timestamp;
use crate::models::{AircraftPosition, EarthquakeEvent, FeatureCollection, SourceCounts, TleRecord, WorldPayload};

/// One point feature per aircraft that has a position.
pub fn build_aircraft_geojson(aircraft: &[AircraftPosition]) -> FeatureCollection {
    FeatureCollection::from_records(aircraft)
}

/// One point feature per earthquake.
pub fn build_earthquake_geojson(events: &[EarthquakeEvent]) -> FeatureCollection {
    FeatureCollection::from_records(events)
}

/// # Build Payload
///
/// Assembles the snapshot for one cycle. `counts` reports the number of
/// records each source returned, before features without a position are
/// dropped.
pub fn build_payload(
    aircraft: &[AircraftPosition],
    military: &[AircraftPosition],
    tles: &[TleRecord],
    earthquakes: &[EarthquakeEvent],
) -> WorldPayload {
    WorldPayload {
        aircraft: build_aircraft_geojson(aircraft),
        military: build_aircraft_geojson(military),
        tles: tles.to_vec(),
        earthquakes: build_earthquake_geojson(earthquakes),
        counts: SourceCounts {
            aircraft: aircraft.len(),
            military: military.len(),
            satellites: tles.len(),
            earthquakes: earthquakes.len(),
        },
        timestamp: unix_timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn aircraft(icao24: &str, position: Option<(f64, f64)>) -> AircraftPosition {
        AircraftPosition {
            icao24: icao24.to_string(),
            longitude: position.map(|p| p.0),
            latitude: position.map(|p| p.1),
            ..Default::default()
        }
    }

    fn quake(id: &str) -> EarthquakeEvent {
        EarthquakeEvent {
            id: id.to_string(),
            magnitude: 3.1,
            place: "Offshore".to_string(),
            longitude: 140.0,
            latitude: 35.0,
            depth_km: 12.0,
            time_ms: 1_700_000_000_000,
        }
    }

    fn tle(norad_id: &str) -> TleRecord {
        TleRecord {
            norad_id: norad_id.to_string(),
            name: "SAT".to_string(),
            line1: format!("1 {norad_id}U"),
            line2: format!("2 {norad_id}"),
        }
    }

    #[test]
    fn test_records_without_position_produce_no_feature() {
        let input = vec![
            aircraft("a1", Some((1.0, 2.0))),
            aircraft("a2", None),
            aircraft("a3", Some((3.0, 4.0))),
        ];
        let fc = build_aircraft_geojson(&input);

        assert_eq!(fc.len(), 2);
        assert_eq!(fc.features[1].geometry.coordinates, [3.0, 4.0]);
    }

    #[test]
    fn test_empty_inputs_still_build_a_payload() {
        let payload = build_payload(&[], &[], &[], &[]);
        assert!(payload.aircraft.is_empty());
        assert!(payload.military.is_empty());
        assert!(payload.tles.is_empty());
        assert!(payload.earthquakes.is_empty());
        assert_eq!(payload.counts, SourceCounts::default());
        assert!(payload.timestamp > 0.0);

        let json: Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(json["aircraft"]["features"], Value::Array(Vec::new()));
        assert_eq!(json["earthquakes"]["type"], "FeatureCollection");
    }

    #[test]
    fn test_round_trip_counts_match_input_lengths() {
        let air = vec![aircraft("a1", Some((1.0, 2.0))), aircraft("a2", Some((3.0, 4.0)))];
        let mil = vec![aircraft("ae0001", Some((5.0, 6.0)))];
        let tles = vec![tle("25544"), tle("20580"), tle("43013")];
        let quakes = vec![quake("q1")];

        let payload = build_payload(&air, &mil, &tles, &quakes);
        let parsed: WorldPayload = serde_json::from_str(&payload.to_json().unwrap()).unwrap();

        assert_eq!(
            parsed.counts,
            SourceCounts {
                aircraft: 2,
                military: 1,
                satellites: 3,
                earthquakes: 1
            }
        );
        assert_eq!(parsed.aircraft.len(), 2);
        assert_eq!(parsed.tles[0].norad_id, "25544");
        assert_eq!(parsed.earthquakes.features[0].properties["id"], "q1");
    }

    #[test]
    fn test_inputs_are_untouched() {
        let air = vec![aircraft("a1", Some((1.0, 2.0)))];
        let before = air.clone();
        let _ = build_payload(&air, &[], &[], &[]);
        assert_eq!(air, before);
    }
}
