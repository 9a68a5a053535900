//! # OpenSky Live Feed
//!
//! Polls `states/all` for live aircraft state vectors, globally or inside a
//! bounding box. Credentials are picked in priority order: OAuth2
//! client-credentials (bearer token), then HTTP basic, then anonymous.
//!
//! Bearer tokens are cached in-process and refreshed shortly before they
//! expire. If the feed still answers `401` to a cached token, the token is
//! dropped and the request is retried once with a new one.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::cache::{SourceCache, StalePolicy};
use super::{log_fetch_failure, DecodeError, FetchError, Fetcher, ERROR_EXCERPT_CHARS};
use crate::models::{AircraftPosition, BoundingBox};
use crate::retrieve::{ApiClient, ApiResponse, Auth, ClientOptions, RequestBody, RequestOptions, RetrieveError};

/// Public REST root.
pub const OPENSKY_API_URL: &str = "https://opensky-network.org/api/";
/// OAuth2 token endpoint for client-credentials access.
pub const OPENSKY_TOKEN_URL: &str =
    "https://auth.opensky-network.org/auth/realms/opensky-network/protocol/openid-connect/token";

const STATES_PATH: &str = "states/all";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(30);

// State vector layout, see the OpenSky REST documentation.
const IDX_ICAO24: usize = 0;
const IDX_CALLSIGN: usize = 1;
const IDX_ORIGIN_COUNTRY: usize = 2;
const IDX_LAST_CONTACT: usize = 4;
const IDX_LONGITUDE: usize = 5;
const IDX_LATITUDE: usize = 6;
const IDX_BARO_ALTITUDE: usize = 7;
const IDX_ON_GROUND: usize = 8;
const IDX_VELOCITY: usize = 9;
const IDX_TRUE_TRACK: usize = 10;
const IDX_VERTICAL_RATE: usize = 11;
const MIN_STATE_FIELDS: usize = 12;

/// Account credentials as configured. Empty strings count as absent.
#[derive(Debug, Clone, Default)]
pub struct OpenSkyCredentials {
    /// OAuth2 client id.
    pub client_id: Option<String>,
    /// OAuth2 client secret.
    pub client_secret: Option<String>,
    /// Legacy account name.
    pub username: Option<String>,
    /// Legacy account password.
    pub password: Option<String>,
}

/// Settings for the live feed fetcher.
#[derive(Debug, Clone)]
pub struct OpenSkyConfig {
    /// REST root, joined with `states/all`.
    pub api_url: String,
    /// OAuth2 token endpoint.
    pub token_url: String,
    /// Credentials to choose from.
    pub credentials: OpenSkyCredentials,
    /// Optional query rectangle. `None` polls the whole globe.
    pub bbox: Option<BoundingBox>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How long a successful fetch is reused. Zero disables reuse.
    pub cache_ttl: Duration,
}

impl Default for OpenSkyConfig {
    fn default() -> Self {
        Self {
            api_url: OPENSKY_API_URL.to_string(),
            token_url: OPENSKY_TOKEN_URL.to_string(),
            credentials: OpenSkyCredentials::default(),
            bbox: None,
            timeout: Duration::from_secs(15),
            cache_ttl: Duration::ZERO,
        }
    }
}

/// The credential scheme in use, strongest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    /// OAuth2 client-credentials grant, sent as a bearer token.
    ClientCredentials {
        /// OAuth2 client id.
        client_id: String,
        /// OAuth2 client secret.
        client_secret: String,
    },
    /// HTTP basic auth.
    Basic {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
    /// No credentials; lowest rate limits.
    Anonymous,
}

impl AuthScheme {
    /// Picks the strongest scheme the credentials fully describe.
    pub fn select(credentials: &OpenSkyCredentials) -> Self {
        fn present(value: &Option<String>) -> Option<String> {
            value.as_deref().map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
        }

        if let (Some(client_id), Some(client_secret)) =
            (present(&credentials.client_id), present(&credentials.client_secret))
        {
            return AuthScheme::ClientCredentials { client_id, client_secret };
        }
        if let (Some(username), Some(password)) = (present(&credentials.username), present(&credentials.password)) {
            return AuthScheme::Basic { username, password };
        }
        AuthScheme::Anonymous
    }

    /// Label for logs; never includes secrets.
    pub fn label(&self) -> &'static str {
        match self {
            AuthScheme::ClientCredentials { .. } => "oauth2",
            AuthScheme::Basic { .. } => "basic",
            AuthScheme::Anonymous => "anonymous",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    1800
}

/// When a token issued at `now` should be replaced. A lifetime too large to
/// represent falls back to the default one.
fn refresh_deadline(now: Instant, expires_in: u64) -> Instant {
    let refresh_in = |secs: u64| Duration::from_secs(secs).saturating_sub(TOKEN_REFRESH_MARGIN);
    now.checked_add(refresh_in(expires_in))
        .unwrap_or_else(|| now + refresh_in(default_expires_in()))
}

struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// # Token Cache
///
/// Holds one OAuth2 access token and fetches a new one when the current one
/// is within 30 seconds of expiring. Concurrent callers wait on the same
/// refresh.
pub struct TokenCache {
    client: ApiClient,
    client_id: String,
    client_secret: String,
    current: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    /// Creates an empty cache for the given client.
    pub fn new(
        token_url: &str,
        client_id: String,
        client_secret: String,
        options: ClientOptions,
    ) -> Result<Self, RetrieveError> {
        Ok(Self {
            client: ApiClient::new(token_url, options)?,
            client_id,
            client_secret,
            current: Mutex::new(None),
        })
    }

    /// A valid access token, from cache or freshly issued.
    pub async fn bearer(&self) -> Result<String, FetchError> {
        let mut current = self.current.lock().await;

        if let Some(token) = current.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.access_token.clone());
            }
        }

        let issued = self.request_token().await?;
        let access_token = issued.access_token.clone();
        *current = Some(issued);
        Ok(access_token)
    }

    /// Forgets the cached token so the next call requests a new one.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }

    async fn request_token(&self) -> Result<CachedToken, FetchError> {
        let options = RequestOptions {
            body: Some(RequestBody::Form(vec![
                ("grant_type".to_string(), "client_credentials".to_string()),
                ("client_id".to_string(), self.client_id.clone()),
                ("client_secret".to_string(), self.client_secret.clone()),
            ])),
            ..Default::default()
        };

        let response: ApiResponse<TokenResponse> = self.client.request(Method::POST, "", options).await?;
        if !response.success {
            return Err(FetchError::Auth(format!(
                "token endpoint returned HTTP {}: {}",
                response.status,
                response.error_excerpt(ERROR_EXCERPT_CHARS)
            )));
        }

        let token = response
            .data
            .ok_or_else(|| FetchError::Auth("token endpoint returned no body".to_string()))?;
        debug!(expires_in = token.expires_in, "Obtained OpenSky access token");

        Ok(CachedToken {
            access_token: token.access_token,
            refresh_at: refresh_deadline(Instant::now(), token.expires_in),
        })
    }
}

enum Access {
    Token(TokenCache),
    Basic { username: String, password: String },
    Anonymous,
}

/// # OpenSky Fetcher
///
/// Live aircraft positions. Failures degrade to an empty list by default.
pub struct OpenSkyFetcher {
    client: ApiClient,
    access: Access,
    scheme: &'static str,
    bbox: Option<BoundingBox>,
    cache: SourceCache<AircraftPosition>,
}

impl OpenSkyFetcher {
    /// Builds the fetcher and selects its credential scheme.
    pub fn new(config: OpenSkyConfig) -> Result<Self, RetrieveError> {
        let options = ClientOptions {
            timeout: config.timeout,
            ..Default::default()
        };
        let client = ApiClient::new(&config.api_url, options.clone())?;

        let scheme = AuthScheme::select(&config.credentials);
        let label = scheme.label();
        let access = match scheme {
            AuthScheme::ClientCredentials { client_id, client_secret } => {
                Access::Token(TokenCache::new(&config.token_url, client_id, client_secret, options)?)
            }
            AuthScheme::Basic { username, password } => Access::Basic { username, password },
            AuthScheme::Anonymous => Access::Anonymous,
        };

        info!(auth = label, bbox = config.bbox.is_some(), "OpenSky fetcher ready");

        Ok(Self {
            client,
            access,
            scheme: label,
            bbox: config.bbox,
            cache: SourceCache::new(config.cache_ttl, StalePolicy::ServeEmpty),
        })
    }

    /// Label of the selected credential scheme.
    pub fn auth_label(&self) -> &'static str {
        self.scheme
    }

    /// The fetcher's cache, for seeding and resetting.
    pub fn cache(&self) -> &SourceCache<AircraftPosition> {
        &self.cache
    }

    async fn resolve_auth(&self) -> Result<Auth, FetchError> {
        match &self.access {
            Access::Token(tokens) => Ok(Auth::Bearer(tokens.bearer().await?)),
            Access::Basic { username, password } => Ok(Auth::Basic {
                username: username.clone(),
                password: password.clone(),
            }),
            Access::Anonymous => Ok(Auth::Anonymous),
        }
    }

    async fn request_states(&self, auth: Auth) -> Result<ApiResponse<Value>, FetchError> {
        let options = RequestOptions {
            query: self.bbox.map(|b| b.query_pairs()).unwrap_or_default(),
            auth,
            ..Default::default()
        };
        Ok(self.client.request(Method::GET, STATES_PATH, options).await?)
    }

    async fn fetch_states(&self) -> Result<Vec<AircraftPosition>, FetchError> {
        let auth = self.resolve_auth().await?;
        let used_bearer = matches!(auth, Auth::Bearer(_));
        let mut response = self.request_states(auth).await?;

        if response.status == 401 && used_bearer {
            if let Access::Token(tokens) = &self.access {
                warn!("OpenSky rejected the cached token, requesting a new one");
                tokens.invalidate().await;
                let auth = self.resolve_auth().await?;
                response = self.request_states(auth).await?;
            }
        }

        if !response.success {
            return Err(FetchError::Status {
                status: response.status,
                body: response.error_excerpt(ERROR_EXCERPT_CHARS),
            });
        }

        let body = response.data.unwrap_or(Value::Null);
        let states: &[Value] = match body.get("states") {
            Some(Value::Array(states)) => states.as_slice(),
            Some(Value::Null) | None => &[],
            Some(_) => return Err(FetchError::Malformed("`states` is not an array".to_string())),
        };

        let mut aircraft = Vec::with_capacity(states.len());
        let mut skipped = 0usize;
        for state in states {
            match parse_state_vector(state) {
                Ok(position) => aircraft.push(position),
                Err(DecodeError::MissingPosition) => {}
                Err(e) => {
                    skipped += 1;
                    debug!(error = %e, "Skipping malformed state vector");
                }
            }
        }
        if skipped > 0 {
            warn!(skipped, "Skipped malformed OpenSky state vectors");
        }

        Ok(aircraft)
    }
}

#[async_trait]
impl Fetcher for OpenSkyFetcher {
    type Record = AircraftPosition;

    fn name(&self) -> &'static str {
        "opensky"
    }

    async fn fetch(&self) -> Vec<AircraftPosition> {
        if let Some(cached) = self.cache.fresh() {
            return cached;
        }

        match self.fetch_states().await {
            Ok(aircraft) => {
                info!("Fetched {} aircraft from OpenSky", aircraft.len());
                self.cache.store(aircraft.clone());
                aircraft
            }
            Err(e) => {
                log_fetch_failure(self.name(), &e);
                self.cache.fallback()
            }
        }
    }
}

fn opt_str<'a>(state: &'a [Value], idx: usize, field: &'static str) -> Result<Option<&'a str>, DecodeError> {
    match &state[idx] {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.as_str())),
        _ => Err(DecodeError::WrongType(field)),
    }
}

fn opt_f64(state: &[Value], idx: usize, field: &'static str) -> Result<Option<f64>, DecodeError> {
    match &state[idx] {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_f64().map(Some).ok_or(DecodeError::WrongType(field)),
        _ => Err(DecodeError::WrongType(field)),
    }
}

fn opt_i64(state: &[Value], idx: usize, field: &'static str) -> Result<Option<i64>, DecodeError> {
    match &state[idx] {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .map(Some)
            .ok_or(DecodeError::WrongType(field)),
        _ => Err(DecodeError::WrongType(field)),
    }
}

fn flag(state: &[Value], idx: usize, field: &'static str) -> Result<bool, DecodeError> {
    match &state[idx] {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(*b),
        _ => Err(DecodeError::WrongType(field)),
    }
}

/// Decodes one positional state vector.
///
/// Returns `DecodeError::MissingPosition` for aircraft without a fix, which
/// callers drop silently; every other error marks a malformed record.
pub fn parse_state_vector(state: &Value) -> Result<AircraftPosition, DecodeError> {
    let state = state.as_array().ok_or(DecodeError::NotAnArray)?;
    if state.len() < MIN_STATE_FIELDS {
        return Err(DecodeError::TooShort {
            len: state.len(),
            min: MIN_STATE_FIELDS,
        });
    }

    let longitude = opt_f64(state, IDX_LONGITUDE, "longitude")?;
    let latitude = opt_f64(state, IDX_LATITUDE, "latitude")?;
    if longitude.is_none() || latitude.is_none() {
        return Err(DecodeError::MissingPosition);
    }

    Ok(AircraftPosition {
        icao24: opt_str(state, IDX_ICAO24, "icao24")?.unwrap_or_default().to_string(),
        callsign: opt_str(state, IDX_CALLSIGN, "callsign")?.unwrap_or_default().trim().to_string(),
        origin_country: opt_str(state, IDX_ORIGIN_COUNTRY, "origin_country")?
            .unwrap_or_default()
            .to_string(),
        longitude,
        latitude,
        altitude: opt_f64(state, IDX_BARO_ALTITUDE, "baro_altitude")?,
        velocity: opt_f64(state, IDX_VELOCITY, "velocity")?,
        heading: opt_f64(state, IDX_TRUE_TRACK, "true_track")?,
        vertical_rate: opt_f64(state, IDX_VERTICAL_RATE, "vertical_rate")?,
        on_ground: flag(state, IDX_ON_GROUND, "on_ground")?,
        last_contact: opt_i64(state, IDX_LAST_CONTACT, "last_contact")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_state() -> Value {
        json!([
            "abc123", "UAL123  ", "United States", 1_700_000_000, 1_700_000_001,
            -73.9, 40.7, 10000.0, false, 250.0, 90.0, 0.0,
            null, 10050.0, "1234", false, 0
        ])
    }

    #[test]
    fn test_refresh_deadline_keeps_margin() {
        let now = Instant::now();
        assert_eq!(refresh_deadline(now, 1800), now + Duration::from_secs(1770));
        assert_eq!(refresh_deadline(now, 10), now);
    }

    #[test]
    fn test_refresh_deadline_survives_huge_lifetime() {
        let now = Instant::now();
        assert_eq!(refresh_deadline(now, u64::MAX), now + Duration::from_secs(1770));
    }

    #[test]
    fn test_parse_full_state_vector() {
        let ac = parse_state_vector(&sample_state()).unwrap();
        assert_eq!(ac.icao24, "abc123");
        assert_eq!(ac.callsign, "UAL123");
        assert_eq!(ac.origin_country, "United States");
        assert_eq!(ac.position(), Some((-73.9, 40.7)));
        assert_eq!(ac.altitude, Some(10000.0));
        assert_eq!(ac.velocity, Some(250.0));
        assert_eq!(ac.heading, Some(90.0));
        assert_eq!(ac.vertical_rate, Some(0.0));
        assert!(!ac.on_ground);
        assert_eq!(ac.last_contact, Some(1_700_000_001));
    }

    #[test]
    fn test_missing_coordinate_is_dropped() {
        let mut state = sample_state();
        state[IDX_LONGITUDE] = Value::Null;
        assert_eq!(parse_state_vector(&state), Err(DecodeError::MissingPosition));

        let mut state = sample_state();
        state[IDX_LATITUDE] = Value::Null;
        assert_eq!(parse_state_vector(&state), Err(DecodeError::MissingPosition));
    }

    #[test]
    fn test_short_vector_is_malformed() {
        let state = json!(["abc123", "UAL123", "US"]);
        assert_eq!(
            parse_state_vector(&state),
            Err(DecodeError::TooShort { len: 3, min: MIN_STATE_FIELDS })
        );
    }

    #[test]
    fn test_non_array_is_malformed() {
        assert_eq!(parse_state_vector(&json!({"icao24": "abc"})), Err(DecodeError::NotAnArray));
    }

    #[test]
    fn test_wrong_field_type_is_malformed() {
        let mut state = sample_state();
        state[IDX_VELOCITY] = json!("fast");
        assert_eq!(parse_state_vector(&state), Err(DecodeError::WrongType("velocity")));
    }

    #[test]
    fn test_null_optionals_are_tolerated() {
        let state = json!([
            null, null, null, null, null, 2.35, 48.85, null, null, null, null, null
        ]);
        let ac = parse_state_vector(&state).unwrap();
        assert_eq!(ac.icao24, "");
        assert_eq!(ac.callsign, "");
        assert_eq!(ac.altitude, None);
        assert!(!ac.on_ground);
        assert_eq!(ac.last_contact, None);
    }

    #[test]
    fn test_auth_scheme_priority() {
        let mut creds = OpenSkyCredentials {
            client_id: Some("id".into()),
            client_secret: Some("secret".into()),
            username: Some("user".into()),
            password: Some("pass".into()),
        };
        assert_eq!(
            AuthScheme::select(&creds),
            AuthScheme::ClientCredentials {
                client_id: "id".into(),
                client_secret: "secret".into()
            }
        );

        creds.client_secret = Some("  ".into());
        assert_eq!(
            AuthScheme::select(&creds),
            AuthScheme::Basic {
                username: "user".into(),
                password: "pass".into()
            }
        );

        creds.password = None;
        assert_eq!(AuthScheme::select(&creds), AuthScheme::Anonymous);
    }
}
