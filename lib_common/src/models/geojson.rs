use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::records::{AircraftPosition, EarthquakeEvent};

/// A GeoJSON point geometry. Coordinates are `[longitude, latitude]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Always `"Point"`.
    pub r#type: String,
    /// `[longitude, latitude]` in decimal degrees.
    pub coordinates: [f64; 2],
}

impl Point {
    /// Creates a point from a longitude/latitude pair.
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self {
            r#type: "Point".to_string(),
            coordinates: [longitude, latitude],
        }
    }
}

/// A GeoJSON feature with a point geometry and an open property map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Always `"Feature"`.
    pub r#type: String,
    /// Feature location.
    pub geometry: Point,
    /// Source specific attributes.
    pub properties: Map<String, Value>,
}

impl Feature {
    /// Creates a feature at the given point.
    pub fn new(geometry: Point, properties: Map<String, Value>) -> Self {
        Self {
            r#type: "Feature".to_string(),
            geometry,
            properties,
        }
    }
}

/// # Feature Collection
///
/// Ordered sequence of point features. Built fresh every cycle and never
/// modified after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    /// Always `"FeatureCollection"`.
    pub r#type: String,
    /// Features in input order.
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    /// Wraps already-built features.
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            r#type: "FeatureCollection".to_string(),
            features,
        }
    }

    /// Converts records into features, skipping any without a position.
    pub fn from_records<'a, T, I>(records: I) -> Self
    where
        T: ToFeature + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        Self::new(records.into_iter().filter_map(|record| record.to_feature()).collect())
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// True when the collection holds no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

impl Default for FeatureCollection {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// Conversion from a typed record into a GeoJSON feature.
///
/// Returns `None` when the record has no usable position.
pub trait ToFeature {
    /// Builds the feature for this record.
    fn to_feature(&self) -> Option<Feature>;
}

impl ToFeature for AircraftPosition {
    fn to_feature(&self) -> Option<Feature> {
        let (lon, lat) = self.position()?;

        let mut properties = Map::new();
        properties.insert("icao24".into(), Value::from(self.icao24.clone()));
        properties.insert("callsign".into(), Value::from(self.callsign.clone()));
        properties.insert("origin_country".into(), Value::from(self.origin_country.clone()));
        properties.insert("altitude".into(), Value::from(self.altitude));
        properties.insert("velocity".into(), Value::from(self.velocity));
        properties.insert("heading".into(), Value::from(self.heading));
        properties.insert("vertical_rate".into(), Value::from(self.vertical_rate));
        properties.insert("on_ground".into(), Value::from(self.on_ground));

        Some(Feature::new(Point::new(lon, lat), properties))
    }
}

impl ToFeature for EarthquakeEvent {
    fn to_feature(&self) -> Option<Feature> {
        let mut properties = Map::new();
        properties.insert("id".into(), Value::from(self.id.clone()));
        properties.insert("magnitude".into(), Value::from(self.magnitude));
        properties.insert("place".into(), Value::from(self.place.clone()));
        properties.insert("depth_km".into(), Value::from(self.depth_km));
        properties.insert("time_ms".into(), Value::from(self.time_ms));

        Some(Feature::new(Point::new(self.longitude, self.latitude), properties))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_collection_serializes_empty_features() {
        let fc = FeatureCollection::default();
        let json = serde_json::to_value(&fc).unwrap();

        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["features"], serde_json::json!([]));
    }

    #[test]
    fn test_aircraft_feature_properties() {
        let ac = AircraftPosition {
            icao24: "a1b2c3".to_string(),
            callsign: "UAL123".to_string(),
            origin_country: "United States".to_string(),
            longitude: Some(-73.9),
            latitude: Some(40.7),
            altitude: Some(10000.0),
            velocity: Some(250.0),
            heading: Some(270.0),
            vertical_rate: None,
            on_ground: false,
            last_contact: Some(1_700_000_001),
        };

        let feature = ac.to_feature().unwrap();
        let json = serde_json::to_value(&feature).unwrap();

        assert_eq!(json["type"], "Feature");
        assert_eq!(json["geometry"]["type"], "Point");
        assert_eq!(json["geometry"]["coordinates"], serde_json::json!([-73.9, 40.7]));
        assert_eq!(json["properties"]["callsign"], "UAL123");
        assert!(json["properties"]["vertical_rate"].is_null());
        assert!(json["properties"].get("last_contact").is_none());
        assert_eq!(feature.properties.len(), 8);
    }

    #[test]
    fn test_from_records_skips_missing_positions() {
        let records = vec![
            AircraftPosition { icao24: "aaa".into(), longitude: Some(1.0), latitude: Some(2.0), ..Default::default() },
            AircraftPosition { icao24: "bbb".into(), longitude: None, latitude: Some(2.0), ..Default::default() },
            AircraftPosition { icao24: "ccc".into(), longitude: Some(1.0), latitude: None, ..Default::default() },
        ];

        let fc = FeatureCollection::from_records(&records);
        assert_eq!(fc.len(), 1);
        assert_eq!(fc.features[0].properties["icao24"], "aaa");
    }
}
