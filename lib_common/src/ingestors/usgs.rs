//! # USGS Earthquakes
//!
//! Queries the FDSN event service for recent events above a magnitude floor,
//! newest first. Results are cached for 60 seconds and the last good result
//! is served whenever a refresh fails.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, info};

use super::cache::{SourceCache, StalePolicy};
use super::{log_fetch_failure, DecodeError, FetchError, Fetcher, ERROR_EXCERPT_CHARS};
use crate::models::EarthquakeEvent;
use crate::retrieve::{ApiClient, ClientOptions, RequestOptions, RetrieveError};

/// USGS earthquake site root.
pub const USGS_URL: &str = "https://earthquake.usgs.gov/";
/// FDSN event query path.
pub const EVENT_QUERY_PATH: &str = "fdsnws/event/1/query";

/// Settings for the earthquake fetcher.
#[derive(Debug, Clone)]
pub struct UsgsConfig {
    /// Site root.
    pub base_url: String,
    /// Query path joined to the root.
    pub query_path: String,
    /// Smallest magnitude requested.
    pub min_magnitude: f64,
    /// Maximum number of events requested.
    pub limit: u32,
    /// How long a result is reused.
    pub cache_ttl: Duration,
    /// Per-request timeout.
    pub timeout: Duration,    /// Transparent retries on 5xx, 429 and connection failures.
    pub max_retries: u32,
    /// Shortest wait between transparent retries.
    pub retry_backoff: Duration,
}

impl Default for UsgsConfig {
    fn default() -> Self {
        Self {
            base_url: USGS_URL.to_string(),
            query_path: EVENT_QUERY_PATH.to_string(),
            min_magnitude: 2.5,
            limit: 500,
            cache_ttl: Duration::from_secs(60),
            timeout: Duration::from_secs(15),
            max_retries: 2,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

fn required_f64(value: Option<&Value>, field: &'static str) -> Result<f64, DecodeError> {
    match value {
        None | Some(Value::Null) => Err(DecodeError::Missing(field)),
        Some(v) => v.as_f64().ok_or(DecodeError::WrongType(field)),
    }
}

/// Decodes one GeoJSON feature of the event feed.
///
/// Requires `id`, `properties.mag`, `properties.time` and a
/// `[lon, lat, depth]` coordinate triple. `place` defaults to empty.
pub fn parse_feature(feature: &Value) -> Result<EarthquakeEvent, DecodeError> {
    let feature = feature.as_object().ok_or(DecodeError::NotAnObject)?;

    let id = match feature.get("id") {
        Some(Value::String(id)) => id.clone(),
        None | Some(Value::Null) => return Err(DecodeError::Missing("id")),
        Some(_) => return Err(DecodeError::WrongType("id")),
    };

    let props = feature
        .get("properties")
        .and_then(Value::as_object)
        .ok_or(DecodeError::Missing("properties"))?;

    let coords = feature
        .get("geometry")
        .and_then(|g| g.get("coordinates"))
        .and_then(Value::as_array)
        .ok_or(DecodeError::MissingPosition)?;
    if coords.len() < 3 {
        return Err(DecodeError::TooShort { len: coords.len(), min: 3 });
    }

    let time_ms = match props.get("time") {
        None | Some(Value::Null) => return Err(DecodeError::Missing("time")),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or(DecodeError::WrongType("time"))?,
        Some(_) => return Err(DecodeError::WrongType("time")),
    };

    let place = match props.get("place") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(place)) => place.clone(),
        Some(_) => return Err(DecodeError::WrongType("place")),
    };

    Ok(EarthquakeEvent {
        id,
        magnitude: required_f64(props.get("mag"), "mag")?,
        place,
        longitude: required_f64(coords.first(), "longitude")?,
        latitude: required_f64(coords.get(1), "latitude")?,
        depth_km: required_f64(coords.get(2), "depth")?,
        time_ms,
    })
}

/// # USGS Fetcher
///
/// Recent earthquakes; serves stale data rather than nothing.
pub struct UsgsFetcher {
    client: ApiClient,
    query_path: String,
    query: Vec<(String, String)>,
    cache: SourceCache<EarthquakeEvent>,
}

impl UsgsFetcher {
    /// Builds the fetcher.
    pub fn new(config: UsgsConfig) -> Result<Self, RetrieveError> {
        let client = ApiClient::new(
            &config.base_url,
            ClientOptions {
                timeout: config.timeout,
                max_retries: config.max_retries,
                retry_backoff: config.retry_backoff,
                ..Default::default()
            },
        )?;
        let query = vec![
            ("format".to_string(), "geojson".to_string()),
            ("minmagnitude".to_string(), config.min_magnitude.to_string()),
            ("orderby".to_string(), "time".to_string()),
            ("limit".to_string(), config.limit.to_string()),
        ];

        Ok(Self {
            client,
            query_path: config.query_path,
            query,
            cache: SourceCache::new(config.cache_ttl, StalePolicy::ServeStale),
        })
    }

    /// The fetcher's cache, for seeding and resetting.
    pub fn cache(&self) -> &SourceCache<EarthquakeEvent> {
        &self.cache
    }

    async fn request_events(&self) -> Result<Vec<EarthquakeEvent>, FetchError> {
        let options = RequestOptions {
            query: self.query.clone(),
            ..Default::default()
        };
        let response = self
            .client
            .request::<Value>(Method::GET, &self.query_path, options)
            .await?;
        if !response.success {
            return Err(FetchError::Status {
                status: response.status,
                body: response.error_excerpt(ERROR_EXCERPT_CHARS),
            });
        }

        let body = response.data.unwrap_or(Value::Null);
        let features: &[Value] = match body.get("features") {
            Some(Value::Array(features)) => features.as_slice(),
            Some(Value::Null) | None => &[],
            Some(_) => return Err(FetchError::Malformed("`features` is not an array".to_string())),
        };

        let events = features
            .iter()
            .filter_map(|feature| match parse_feature(feature) {
                Ok(event) => Some(event),
                Err(e) => {
                    debug!(error = %e, "Skipping malformed earthquake feature");
                    None
                }
            })
            .collect();
        Ok(events)
    }
}

#[async_trait]
impl Fetcher for UsgsFetcher {
    type Record = EarthquakeEvent;

    fn name(&self) -> &'static str {
        "usgs"
    }

    async fn fetch(&self) -> Vec<EarthquakeEvent> {
        if let Some(cached) = self.cache.fresh() {
            return cached;
        }

        match self.request_events().await {
            Ok(events) => {
                info!("Fetched {} earthquake events from USGS", events.len());
                self.cache.store(events.clone());
                events
            }
            Err(e) => {
                log_fetch_failure(self.name(), &e);
                self.cache.fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_feature() -> Value {
        json!({
            "type": "Feature",
            "id": "us7000abcd",
            "properties": {"mag": 4.6, "place": "10 km S of Somewhere", "time": 1_700_000_000_000_i64},
            "geometry": {"type": "Point", "coordinates": [142.1, 38.3, 10.0]}
        })
    }

    #[test]
    fn test_parse_feature() {
        let event = parse_feature(&sample_feature()).unwrap();
        assert_eq!(event.id, "us7000abcd");
        assert_eq!(event.magnitude, 4.6);
        assert_eq!(event.place, "10 km S of Somewhere");
        assert_eq!((event.longitude, event.latitude, event.depth_km), (142.1, 38.3, 10.0));
        assert_eq!(event.time_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_null_place_becomes_empty() {
        let mut feature = sample_feature();
        feature["properties"]["place"] = Value::Null;
        assert_eq!(parse_feature(&feature).unwrap().place, "");
    }

    #[test]
    fn test_missing_magnitude_is_malformed() {
        let mut feature = sample_feature();
        feature["properties"]["mag"] = Value::Null;
        assert_eq!(parse_feature(&feature), Err(DecodeError::Missing("mag")));
    }

    #[test]
    fn test_short_coordinates_are_malformed() {
        let mut feature = sample_feature();
        feature["geometry"]["coordinates"] = json!([142.1, 38.3]);
        assert_eq!(parse_feature(&feature), Err(DecodeError::TooShort { len: 2, min: 3 }));
    }

    #[test]
    fn test_missing_id_is_malformed() {
        let mut feature = sample_feature();
        feature.as_object_mut().unwrap().remove("id");
        assert_eq!(parse_feature(&feature), Err(DecodeError::Missing("id")));
    }

    #[tokio::test]
    async fn test_fresh_cache_short_circuits_upstream() {
        let fetcher = UsgsFetcher::new(UsgsConfig {
            base_url: "http://127.0.0.1:9/".to_string(),
            ..Default::default()
        })
        .unwrap();
        let event = parse_feature(&sample_feature()).unwrap();
        fetcher.cache().seed(vec![event.clone()]);

        assert_eq!(fetcher.fetch().await, vec![event]);
    }
}
