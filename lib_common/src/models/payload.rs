use serde::{Deserialize, Serialize};

use super::geojson::FeatureCollection;
use super::records::TleRecord;

/// Record counts per source for one cycle, as fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SourceCounts {
    /// Live-feed aircraft records.
    pub aircraft: usize,
    /// Military aircraft records.
    pub military: usize,
    /// Satellite element sets.
    pub satellites: usize,
    /// Earthquake events.
    pub earthquakes: usize,
}

/// # World Payload
///
/// The snapshot pushed to every subscriber once per cycle. It is built once,
/// serialized once and never modified afterwards.
///
/// Wire shape:
/// `{ aircraft: FC, military: FC, tles: [..], earthquakes: FC, counts: {..}, timestamp: f64 }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldPayload {
    /// Live-feed aircraft with a position.
    pub aircraft: FeatureCollection,
    /// Military aircraft with a position.
    pub military: FeatureCollection,
    /// Raw element sets, propagated by the display layer.
    pub tles: Vec<TleRecord>,
    /// Recent earthquakes.
    pub earthquakes: FeatureCollection,
    /// Record counts keyed by source name.
    pub counts: SourceCounts,
    /// Generation time in Unix seconds with millisecond precision.
    pub timestamp: f64,
}

impl WorldPayload {
    /// Serializes the payload to the JSON text sent over the live channel.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Current wall-clock time as fractional Unix seconds.
pub fn unix_timestamp() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
