//! # Military Aircraft
//!
//! With an ADS-B Exchange API key the military endpoint is queried directly.
//! Without one, the military subset is carved out of the live feed using a
//! table of ICAO 24-bit address prefixes allocated to air forces.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::cache::{SourceCache, StalePolicy};
use super::{log_fetch_failure, DecodeError, FetchError, Fetcher, MilitarySource, ERROR_EXCERPT_CHARS};
use crate::models::AircraftPosition;
use crate::retrieve::{ApiClient, ClientOptions, RequestOptions, RetrieveError};

/// ADS-B Exchange v2 REST root.
pub const ADSB_EXCHANGE_URL: &str = "https://api.adsbexchange.com/v2/";

const MILITARY_PATH: &str = "mil/";
const API_KEY_HEADER: &str = "api-auth";

const FEET_TO_METRES: f64 = 0.3048;
const KNOTS_TO_MPS: f64 = 0.514444;

/// ICAO 24-bit address prefixes of military operators.
pub const MILITARY_ICAO_PREFIXES: [&str; 7] = [
    "ae",  // United States
    "43",  // France
    "3a",  // Germany
    "43c", // France, additional block
    "7c1", // Australia
    "710", // China
    "154", // Russia
];

/// True when the address starts with a known military prefix, ignoring case.
pub fn is_military_icao(icao24: &str) -> bool {
    let icao24 = icao24.to_ascii_lowercase();
    MILITARY_ICAO_PREFIXES.iter().any(|prefix| icao24.starts_with(prefix))
}

/// Keeps the records whose address matches a military prefix.
pub fn filter_military(aircraft: &[AircraftPosition]) -> Vec<AircraftPosition> {
    aircraft
        .iter()
        .filter(|ac| is_military_icao(&ac.icao24))
        .cloned()
        .collect()
}

/// Settings for the military fetcher.
#[derive(Debug, Clone)]
pub struct AdsbExchangeConfig {
    /// REST root, joined with `mil/`.
    pub api_url: String,
    /// API key. Absent or blank means prefix filtering.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How long a direct fetch is reused. Zero disables reuse.
    pub cache_ttl: Duration,    /// Transparent retries on 5xx, 429 and connection failures.
    pub max_retries: u32,
    /// Shortest wait between transparent retries.
    pub retry_backoff: Duration,
}

impl Default for AdsbExchangeConfig {
    fn default() -> Self {
        Self {
            api_url: ADSB_EXCHANGE_URL.to_string(),
            api_key: None,
            timeout: Duration::from_secs(15),
            cache_ttl: Duration::ZERO,
            max_retries: 2,
            retry_backoff: Duration::from_secs(1),
        }
    }
}

/// # Military Fetcher
///
/// Implements `MilitarySource`. Holds the live feed fetcher so it can fetch
/// primary records itself when a cycle does not supply them.
pub struct MilitaryFetcher {
    client: ApiClient,
    api_key: Option<String>,
    primary: Arc<dyn Fetcher<Record = AircraftPosition>>,
    cache: SourceCache<AircraftPosition>,
}

impl MilitaryFetcher {
    /// Builds the fetcher on top of a primary aircraft source.
    pub fn new(
        config: AdsbExchangeConfig,
        primary: Arc<dyn Fetcher<Record = AircraftPosition>>,
    ) -> Result<Self, RetrieveError> {
        let client = ApiClient::new(
            &config.api_url,
            ClientOptions {
                timeout: config.timeout,
                max_retries: config.max_retries,
                retry_backoff: config.retry_backoff,
                ..Default::default()
            },
        )?;
        let api_key = config
            .api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        info!(
            mode = if api_key.is_some() { "adsb-exchange" } else { "prefix-filter" },
            "Military fetcher ready"
        );

        Ok(Self {
            client,
            api_key,
            primary,
            cache: SourceCache::new(config.cache_ttl, StalePolicy::ServeEmpty),
        })
    }

    /// True when the dedicated endpoint is used.
    pub fn uses_api(&self) -> bool {
        self.api_key.is_some()
    }

    /// The fetcher's cache, for seeding and resetting.
    pub fn cache(&self) -> &SourceCache<AircraftPosition> {
        &self.cache
    }

    async fn fetch_direct(&self, api_key: &str) -> Vec<AircraftPosition> {
        if let Some(cached) = self.cache.fresh() {
            return cached;
        }

        match self.request_military(api_key).await {
            Ok(aircraft) => {
                info!("Fetched {} military aircraft from ADS-B Exchange", aircraft.len());
                self.cache.store(aircraft.clone());
                aircraft
            }
            Err(e) => {
                log_fetch_failure(self.name(), &e);
                self.cache.fallback()
            }
        }
    }

    async fn request_military(&self, api_key: &str) -> Result<Vec<AircraftPosition>, FetchError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(api_key)
            .map_err(|_| FetchError::Auth("API key is not a valid header value".to_string()))?;
        headers.insert(API_KEY_HEADER, value);

        let options = RequestOptions {
            headers: Some(headers),
            ..Default::default()
        };
        let response = self.client.request::<Value>(Method::GET, MILITARY_PATH, options).await?;
        if !response.success {
            return Err(FetchError::Status {
                status: response.status,
                body: response.error_excerpt(ERROR_EXCERPT_CHARS),
            });
        }

        let body = response.data.unwrap_or(Value::Null);
        let records: &[Value] = match body.get("ac") {
            Some(Value::Array(records)) => records.as_slice(),
            Some(Value::Null) | None => &[],
            Some(_) => return Err(FetchError::Malformed("`ac` is not an array".to_string())),
        };

        let aircraft = records
            .iter()
            .filter_map(|record| match parse_adsb_aircraft(record) {
                Ok(ac) => Some(ac),
                Err(e) => {
                    debug!(error = %e, "Skipping ADS-B Exchange record");
                    None
                }
            })
            .collect();
        Ok(aircraft)
    }
}

#[async_trait]
impl MilitarySource for MilitaryFetcher {
    fn name(&self) -> &'static str {
        "adsb_exchange"
    }

    async fn fetch_military(&self, primary: Option<&[AircraftPosition]>) -> Vec<AircraftPosition> {
        if let Some(api_key) = self.api_key.as_deref() {
            return self.fetch_direct(api_key).await;
        }

        let military = match primary {
            Some(aircraft) => filter_military(aircraft),
            None => filter_military(&self.primary.fetch().await),
        };
        info!("Filtered {} military aircraft from the live feed", military.len());
        military
    }
}

fn number(record: &Map<String, Value>, field: &'static str) -> Result<Option<f64>, DecodeError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or(DecodeError::WrongType(field)),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| DecodeError::WrongType(field)),
        Some(_) => Err(DecodeError::WrongType(field)),
    }
}

fn text<'a>(record: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, DecodeError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(""),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(DecodeError::WrongType(field)),
    }
}

/// Decodes one ADS-B Exchange aircraft object.
///
/// Altitudes arrive in feet and speeds in knots; both are converted to SI.
/// `alt_baro: "ground"` marks an aircraft on the ground.
pub fn parse_adsb_aircraft(record: &Value) -> Result<AircraftPosition, DecodeError> {
    let record = record.as_object().ok_or(DecodeError::NotAnObject)?;

    let (longitude, latitude) = match (number(record, "lon")?, number(record, "lat")?) {
        (Some(lon), Some(lat)) => (lon, lat),
        _ => return Err(DecodeError::MissingPosition),
    };

    let (altitude, on_ground) = match record.get("alt_baro") {
        Some(Value::String(s)) if s.eq_ignore_ascii_case("ground") => (None, true),
        _ => (number(record, "alt_baro")?.map(|feet| feet * FEET_TO_METRES), false),
    };

    Ok(AircraftPosition {
        icao24: text(record, "hex")?.trim().to_ascii_lowercase(),
        callsign: text(record, "flight")?.trim().to_string(),
        origin_country: String::new(),
        longitude: Some(longitude),
        latitude: Some(latitude),
        altitude,
        velocity: number(record, "gs")?.map(|knots| knots * KNOTS_TO_MPS),
        heading: number(record, "track")?,
        vertical_rate: None,
        on_ground,
        last_contact: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct StaticAircraft(Vec<AircraftPosition>);

    #[async_trait]
    impl Fetcher for StaticAircraft {
        type Record = AircraftPosition;

        fn name(&self) -> &'static str {
            "static"
        }

        async fn fetch(&self) -> Vec<AircraftPosition> {
            self.0.clone()
        }
    }

    fn aircraft(icao24: &str) -> AircraftPosition {
        AircraftPosition {
            icao24: icao24.to_string(),
            longitude: Some(1.0),
            latitude: Some(2.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_prefix_table_is_case_insensitive() {
        assert!(is_military_icao("AE1234"));
        assert!(is_military_icao("43c0de"));
        assert!(is_military_icao("7C1abc"));
        assert!(is_military_icao("154fff"));
        assert!(!is_military_icao("a12345"));
        assert!(!is_military_icao(""));
    }

    #[test]
    fn test_parse_converts_units() {
        let ac = parse_adsb_aircraft(&json!({
            "hex": "AE01F2", "flight": "RCH123  ", "lat": 38.9, "lon": -77.0,
            "alt_baro": 10000, "gs": 100, "track": 270.5
        }))
        .unwrap();

        assert_eq!(ac.icao24, "ae01f2");
        assert_eq!(ac.callsign, "RCH123");
        assert_eq!(ac.position(), Some((-77.0, 38.9)));
        assert!((ac.altitude.unwrap() - 3048.0).abs() < 1e-9);
        assert!((ac.velocity.unwrap() - 51.4444).abs() < 1e-9);
        assert_eq!(ac.heading, Some(270.5));
        assert!(!ac.on_ground);
    }

    #[test]
    fn test_ground_altitude_sets_flag() {
        let ac = parse_adsb_aircraft(&json!({"hex": "ae0001", "lat": 1.0, "lon": 2.0, "alt_baro": "ground"})).unwrap();
        assert!(ac.on_ground);
        assert_eq!(ac.altitude, None);
    }

    #[test]
    fn test_records_without_position_are_rejected() {
        assert_eq!(
            parse_adsb_aircraft(&json!({"hex": "ae0001", "lat": 1.0})),
            Err(DecodeError::MissingPosition)
        );
        assert_eq!(parse_adsb_aircraft(&json!([1, 2])), Err(DecodeError::NotAnObject));
    }

    #[tokio::test]
    async fn test_filters_supplied_primary_records() {
        let primary = Arc::new(StaticAircraft(Vec::new()));
        let fetcher = MilitaryFetcher::new(AdsbExchangeConfig::default(), primary).unwrap();
        assert!(!fetcher.uses_api());

        let supplied = vec![aircraft("ae1234"), aircraft("a00001"), aircraft("3A0042")];
        let military = fetcher.fetch_military(Some(&supplied)).await;

        let ids: Vec<&str> = military.iter().map(|ac| ac.icao24.as_str()).collect();
        assert_eq!(ids, vec!["ae1234", "3A0042"]);
    }

    #[tokio::test]
    async fn test_fetches_primary_when_none_supplied() {
        let primary = Arc::new(StaticAircraft(vec![aircraft("710abc"), aircraft("c00001")]));
        let fetcher = MilitaryFetcher::new(AdsbExchangeConfig::default(), primary).unwrap();

        let military = fetcher.fetch_military(None).await;
        assert_eq!(military.len(), 1);
        assert_eq!(military[0].icao24, "710abc");
    }
}
