//! # Fetcher Integration Tests
//!
//! Drives every fetcher in `lib_common::ingestors` against an in-process mock
//! upstream built with `axum` and bound to `127.0.0.1:0`. The mocks check
//! what the fetchers send (auth headers, query strings, user agent) and
//! answer with good, malformed or failing responses.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use lib_common::ingestors::celestrak::CELESTRAK_USER_AGENT;
use lib_common::ingestors::{
    AdsbExchangeConfig, CelestrakConfig, CelestrakFetcher, Fetcher, MilitaryFetcher, MilitarySource,
    OpenSkyConfig, OpenSkyCredentials, OpenSkyFetcher, UsgsConfig, UsgsFetcher,
};
use lib_common::models::{AircraftPosition, BoundingBox, EarthquakeEvent};

const ISS_1: &str = "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9005";
const ISS_2: &str = "2 25544  51.6400 208.9163 0006317  69.9862  25.2906 15.49560532  1234";
const HST_1: &str = "1 20580U 90037B   24001.50000000  .00000800  00000-0  40000-4 0  9991";
const HST_2: &str = "2 20580  28.4700 100.0000 0002500 100.0000 260.0000 15.09000000  5555";
const NOAA_1: &str = "1 33591U 09005A   24001.50000000  .00000100  00000-0  80000-4 0  9992";
const NOAA_2: &str = "2 33591  99.1900  50.0000 0013000 200.0000 160.0000 14.12000000  7777";

/// Serves `app` on an ephemeral port and returns its root URL.
async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn states_body() -> Value {
    json!({
        "time": 1_700_000_000,
        "states": [
            ["abc123", "UAL1    ", "United States", 1_700_000_000, 1_700_000_000, -73.9, 40.7, 10000.0, false, 250.0, 90.0, 0.0, null, 10050.0, "1234", false, 0],
            ["ae1234", "RCH1", "United States", 1_700_000_000, 1_700_000_000, -77.0, 38.9, 9000.0, false, 200.0, 180.0, 1.5, null, null, null, false, 0],
            ["def456", "", "Germany", 1_700_000_000, 1_700_000_000, null, null, null, true, 0.0, 0.0, null, null, null, null, false, 0],
            ["short", "X"]
        ]
    })
}

fn opensky_config(base: &str) -> OpenSkyConfig {
    OpenSkyConfig {
        api_url: format!("{base}api/"),
        token_url: format!("{base}token"),
        ..Default::default()
    }
}

fn token_route(calls: Arc<AtomicUsize>) -> axum::routing::MethodRouter {
    post(move |body: String| {
        let calls = calls.clone();
        async move {
            assert!(body.contains("grant_type=client_credentials"));
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Json(json!({"access_token": format!("t{n}"), "expires_in": 1800}))
        }
    })
}

struct CountingAircraft(Arc<AtomicUsize>);

#[async_trait]
impl Fetcher for CountingAircraft {
    type Record = AircraftPosition;

    fn name(&self) -> &'static str {
        "counting"
    }

    async fn fetch(&self) -> Vec<AircraftPosition> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Vec::new()
    }
}

// --- OpenSky ---

#[tokio::test]
async fn test_opensky_anonymous_fetch_skips_bad_records() {
    let seen_auth = Arc::new(Mutex::new(Some("unset".to_string())));
    let seen = seen_auth.clone();
    let app = Router::new().route(
        "/api/states/all",
        get(move |headers: HeaderMap| {
            let seen = seen.clone();
            async move {
                *seen.lock().unwrap() = header(&headers, "authorization");
                Json(states_body())
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = OpenSkyFetcher::new(opensky_config(&base)).unwrap();
    assert_eq!(fetcher.auth_label(), "anonymous");

    let aircraft = fetcher.fetch().await;
    let ids: Vec<&str> = aircraft.iter().map(|a| a.icao24.as_str()).collect();
    assert_eq!(ids, vec!["abc123", "ae1234"]);
    assert_eq!(aircraft[0].callsign, "UAL1");
    assert_eq!(*seen_auth.lock().unwrap(), None);
}

#[tokio::test]
async fn test_opensky_sends_bounding_box() {
    let seen_query = Arc::new(Mutex::new(HashMap::new()));
    let seen = seen_query.clone();
    let app = Router::new().route(
        "/api/states/all",
        get(move |Query(query): Query<HashMap<String, String>>| {
            let seen = seen.clone();
            async move {
                *seen.lock().unwrap() = query;
                Json(json!({"time": 0, "states": null}))
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = OpenSkyFetcher::new(OpenSkyConfig {
        bbox: Some(BoundingBox { lamin: 45.8, lomin: 5.9, lamax: 47.8, lomax: 10.5 }),
        ..opensky_config(&base)
    })
    .unwrap();

    assert!(fetcher.fetch().await.is_empty());
    let query = seen_query.lock().unwrap().clone();
    assert_eq!(query.get("lamin").map(String::as_str), Some("45.8"));
    assert_eq!(query.get("lomax").map(String::as_str), Some("10.5"));
}

#[tokio::test]
async fn test_opensky_bearer_token_is_cached() {
    let token_calls = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route("/token", token_route(token_calls.clone())).route(
        "/api/states/all",
        get(|headers: HeaderMap| async move {
            if header(&headers, "authorization").as_deref() == Some("Bearer t1") {
                Json(states_body()).into_response()
            } else {
                StatusCode::UNAUTHORIZED.into_response()
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = OpenSkyFetcher::new(OpenSkyConfig {
        credentials: OpenSkyCredentials {
            client_id: Some("client".into()),
            client_secret: Some("secret".into()),
            username: Some("ignored".into()),
            password: Some("ignored".into()),
        },
        ..opensky_config(&base)
    })
    .unwrap();
    assert_eq!(fetcher.auth_label(), "oauth2");

    assert_eq!(fetcher.fetch().await.len(), 2);
    assert_eq!(fetcher.fetch().await.len(), 2);
    assert_eq!(token_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_opensky_rejected_token_is_refreshed_once() {
    let token_calls = Arc::new(AtomicUsize::new(0));
    let states_calls = Arc::new(AtomicUsize::new(0));
    let states_seen = states_calls.clone();
    let app = Router::new().route("/token", token_route(token_calls.clone())).route(
        "/api/states/all",
        get(move |headers: HeaderMap| {
            let states_seen = states_seen.clone();
            async move {
                states_seen.fetch_add(1, Ordering::SeqCst);
                if header(&headers, "authorization").as_deref() == Some("Bearer t2") {
                    Json(states_body()).into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = OpenSkyFetcher::new(OpenSkyConfig {
        credentials: OpenSkyCredentials {
            client_id: Some("client".into()),
            client_secret: Some("secret".into()),
            ..Default::default()
        },
        ..opensky_config(&base)
    })
    .unwrap();

    assert_eq!(fetcher.fetch().await.len(), 2);
    assert_eq!(token_calls.load(Ordering::SeqCst), 2);
    assert_eq!(states_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_opensky_basic_auth() {
    let app = Router::new().route(
        "/api/states/all",
        get(|headers: HeaderMap| async move {
            match header(&headers, "authorization") {
                Some(value) if value.starts_with("Basic ") => Json(states_body()).into_response(),
                _ => StatusCode::UNAUTHORIZED.into_response(),
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = OpenSkyFetcher::new(OpenSkyConfig {
        credentials: OpenSkyCredentials {
            username: Some("user".into()),
            password: Some("pass".into()),
            ..Default::default()
        },
        ..opensky_config(&base)
    })
    .unwrap();
    assert_eq!(fetcher.auth_label(), "basic");
    assert_eq!(fetcher.fetch().await.len(), 2);
}

#[tokio::test]
async fn test_opensky_failures_degrade_to_empty() {
    let app = Router::new()
        .route(
            "/limited/states/all",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "Too many requests") }),
        )
        .route("/garbage/states/all", get(|| async { "<html>not json</html>" }))
        .route("/shape/states/all", get(|| async { Json(json!({"states": "oops"})) }));
    let base = serve(app).await;

    for prefix in ["limited", "garbage", "shape"] {
        let fetcher = OpenSkyFetcher::new(OpenSkyConfig {
            api_url: format!("{base}{prefix}/"),
            ..Default::default()
        })
        .unwrap();
        assert!(fetcher.fetch().await.is_empty(), "{prefix} should yield no aircraft");
    }
}

// --- ADS-B Exchange ---

#[tokio::test]
async fn test_adsb_exchange_direct_fetch() {
    let app = Router::new().route(
        "/v2/mil/",
        get(|headers: HeaderMap| async move {
            if header(&headers, "api-auth").as_deref() != Some("secret") {
                return StatusCode::FORBIDDEN.into_response();
            }
            Json(json!({"ac": [
                {"hex": "ae01f2", "flight": "RCH123  ", "lat": 38.9, "lon": -77.0, "alt_baro": 10000, "gs": 100, "track": 90.0},
                {"hex": "ae0002", "alt_baro": "ground"},
                {"hex": "43c001", "lat": 51.0, "lon": -1.0, "alt_baro": "ground"}
            ]}))
            .into_response()
        }),
    );
    let base = serve(app).await;

    let primary_calls = Arc::new(AtomicUsize::new(0));
    let primary = Arc::new(CountingAircraft(primary_calls.clone()));
    let fetcher = MilitaryFetcher::new(
        AdsbExchangeConfig {
            api_url: format!("{base}v2/"),
            api_key: Some("secret".into()),
            ..Default::default()
        },
        primary.clone(),
    )
    .unwrap();
    assert!(fetcher.uses_api());

    let military = fetcher.fetch_military(None).await;
    assert_eq!(military.len(), 2);
    assert_eq!(military[0].callsign, "RCH123");
    assert!((military[0].altitude.unwrap() - 3048.0).abs() < 1e-6);
    assert!(military[1].on_ground);
    assert_eq!(primary_calls.load(Ordering::SeqCst), 0);

    let rejected = MilitaryFetcher::new(
        AdsbExchangeConfig {
            api_url: format!("{base}v2/"),
            api_key: Some("wrong".into()),
            ..Default::default()
        },
        primary,
    )
    .unwrap();
    assert!(rejected.fetch_military(None).await.is_empty());
}

// --- CelesTrak ---

#[tokio::test]
async fn test_celestrak_caps_and_caches_catalog() {
    let calls = Arc::new(AtomicUsize::new(0));
    let agent = Arc::new(Mutex::new(None));
    let (calls_seen, agent_seen) = (calls.clone(), agent.clone());
    let app = Router::new().route(
        "/pub/TLE/active.txt",
        get(move |headers: HeaderMap| {
            let (calls_seen, agent_seen) = (calls_seen.clone(), agent_seen.clone());
            async move {
                calls_seen.fetch_add(1, Ordering::SeqCst);
                *agent_seen.lock().unwrap() = header(&headers, "user-agent");
                format!("ISS (ZARYA)\n{ISS_1}\n{ISS_2}\nHST\n{HST_1}\n{HST_2}\nNOAA 19\n{NOAA_1}\n{NOAA_2}\n")
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = CelestrakFetcher::new(CelestrakConfig {
        base_url: base,
        max_satellites: 2,
        ..Default::default()
    })
    .unwrap();

    let first = fetcher.fetch().await;
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].norad_id, "25544");
    assert_eq!(fetcher.cache().last_good().map(|c| c.len()), Some(3));

    let second = fetcher.fetch().await;
    assert_eq!(second, first);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(agent.lock().unwrap().as_deref(), Some(CELESTRAK_USER_AGENT));
}

#[tokio::test]
async fn test_celestrak_retries_timeouts() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_seen = calls.clone();
    let app = Router::new().route(
        "/pub/TLE/active.txt",
        get(move || {
            let calls_seen = calls_seen.clone();
            async move {
                if calls_seen.fetch_add(1, Ordering::SeqCst) < 2 {
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
                format!("ISS\n{ISS_1}\n{ISS_2}\n")
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = CelestrakFetcher::new(CelestrakConfig {
        base_url: base,
        timeout: Duration::from_millis(300),
        retry_backoff: Duration::from_millis(10),
        ..Default::default()
    })
    .unwrap();

    assert_eq!(fetcher.fetch().await.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_celestrak_http_error_serves_stale_without_retry() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_seen = calls.clone();
    let app = Router::new().route(
        "/pub/TLE/active.txt",
        get(move || {
            let calls_seen = calls_seen.clone();
            async move {
                calls_seen.fetch_add(1, Ordering::SeqCst);
                (StatusCode::INTERNAL_SERVER_ERROR, "down")
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = CelestrakFetcher::new(CelestrakConfig {
        base_url: base,
        retry_backoff: Duration::from_millis(10),
        ..Default::default()
    })
    .unwrap();
    assert!(fetcher.fetch().await.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    fetcher
        .cache()
        .seed(lib_common::ingestors::celestrak::parse_tle_catalog(&format!("HST\n{HST_1}\n{HST_2}")));
    fetcher.cache().expire();

    let stale = fetcher.fetch().await;
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].name, "HST");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// --- USGS ---

fn quake_feature(id: &str, mag: Value) -> Value {
    json!({
        "type": "Feature",
        "id": id,
        "properties": {"mag": mag, "place": "Somewhere", "time": 1_700_000_000_000_i64},
        "geometry": {"type": "Point", "coordinates": [142.1, 38.3, 10.0]}
    })
}

#[tokio::test]
async fn test_usgs_query_and_stale_fallback() {
    let failing = Arc::new(AtomicBool::new(false));
    let seen_query = Arc::new(Mutex::new(HashMap::new()));
    let (failing_seen, query_seen) = (failing.clone(), seen_query.clone());
    let app = Router::new().route(
        "/fdsnws/event/1/query",
        get(move |Query(query): Query<HashMap<String, String>>| {
            let (failing_seen, query_seen) = (failing_seen.clone(), query_seen.clone());
            async move {
                *query_seen.lock().unwrap() = query;
                if failing_seen.load(Ordering::SeqCst) {
                    return StatusCode::SERVICE_UNAVAILABLE.into_response();
                }
                Json(json!({
                    "type": "FeatureCollection",
                    "features": [
                        quake_feature("q1", json!(4.6)),
                        quake_feature("q2", json!(2.7)),
                        quake_feature("bad", Value::Null)
                    ]
                }))
                .into_response()
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = UsgsFetcher::new(UsgsConfig {
        base_url: base,
        retry_backoff: Duration::from_millis(10),
        ..Default::default()
    })
    .unwrap();

    let events = fetcher.fetch().await;
    let ids: Vec<&str> = events.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["q1", "q2"]);

    let query = seen_query.lock().unwrap().clone();
    assert_eq!(query.get("format").map(String::as_str), Some("geojson"));
    assert_eq!(query.get("minmagnitude").map(String::as_str), Some("2.5"));
    assert_eq!(query.get("orderby").map(String::as_str), Some("time"));
    assert_eq!(query.get("limit").map(String::as_str), Some("500"));

    failing.store(true, Ordering::SeqCst);
    fetcher.cache().expire();
    assert_eq!(fetcher.fetch().await, events);
}

#[tokio::test]
async fn test_usgs_retries_server_error_transparently() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_seen = calls.clone();
    let app = Router::new().route(
        "/fdsnws/event/1/query",
        get(move || {
            let calls_seen = calls_seen.clone();
            async move {
                if calls_seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    return StatusCode::SERVICE_UNAVAILABLE.into_response();
                }
                Json(json!({"features": [quake_feature("q1", json!(3.1))]})).into_response()
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = UsgsFetcher::new(UsgsConfig {
        base_url: base,
        retry_backoff: Duration::from_millis(10),
        ..Default::default()
    })
    .unwrap();

    assert_eq!(fetcher.fetch().await.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

fn cached_quake() -> EarthquakeEvent {
    EarthquakeEvent {
        id: "cached".to_string(),
        magnitude: 5.0,
        place: "Elsewhere".to_string(),
        longitude: 10.0,
        latitude: 20.0,
        depth_km: 5.0,
        time_ms: 1_600_000_000_000,
    }
}

#[tokio::test]
async fn test_usgs_malformed_bodies_yield_empty_or_stale() {
    let app = Router::new()
        .route("/shape/fdsnws/event/1/query", get(|| async { Json(json!({"features": "oops"})) }))
        .route("/garbage/fdsnws/event/1/query", get(|| async { "<html>maintenance</html>" }));
    let base = serve(app).await;

    for prefix in ["shape", "garbage"] {
        let fetcher = UsgsFetcher::new(UsgsConfig {
            base_url: format!("{base}{prefix}/"),
            max_retries: 0,
            ..Default::default()
        })
        .unwrap();
        assert!(fetcher.fetch().await.is_empty(), "{prefix} without cache");

        fetcher.cache().seed(vec![cached_quake()]);
        fetcher.cache().expire();
        assert_eq!(fetcher.fetch().await, vec![cached_quake()], "{prefix} with stale cache");
    }
}

// --- ADS-B Exchange, failure paths ---

#[tokio::test]
async fn test_adsb_exchange_retries_rate_limit_transparently() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_seen = calls.clone();
    let app = Router::new().route(
        "/v2/mil/",
        get(move || {
            let calls_seen = calls_seen.clone();
            async move {
                if calls_seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    return StatusCode::TOO_MANY_REQUESTS.into_response();
                }
                Json(json!({"ac": [{"hex": "ae01f2", "lat": 38.9, "lon": -77.0, "alt_baro": 1000}]})).into_response()
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = MilitaryFetcher::new(
        AdsbExchangeConfig {
            api_url: format!("{base}v2/"),
            api_key: Some("secret".into()),
            retry_backoff: Duration::from_millis(10),
            ..Default::default()
        },
        Arc::new(CountingAircraft(Arc::new(AtomicUsize::new(0)))),
    )
    .unwrap();

    assert_eq!(fetcher.fetch_military(None).await.len(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_adsb_exchange_malformed_bodies_yield_empty() {
    let app = Router::new()
        .route("/shape/mil/", get(|| async { Json(json!({"ac": "oops"})) }))
        .route("/garbage/mil/", get(|| async { "not json at all" }));
    let base = serve(app).await;

    for prefix in ["shape", "garbage"] {
        let fetcher = MilitaryFetcher::new(
            AdsbExchangeConfig {
                api_url: format!("{base}{prefix}/"),
                api_key: Some("secret".into()),
                max_retries: 0,
                ..Default::default()
            },
            Arc::new(CountingAircraft(Arc::new(AtomicUsize::new(0)))),
        )
        .unwrap();
        assert!(fetcher.fetch_military(None).await.is_empty(), "{prefix} without cache");

        // Direct fetches never serve stale positions
        fetcher.cache().seed(vec![AircraftPosition {
            icao24: "ae0001".to_string(),
            longitude: Some(1.0),
            latitude: Some(2.0),
            ..Default::default()
        }]);
        fetcher.cache().expire();
        assert!(fetcher.fetch_military(None).await.is_empty(), "{prefix} with expired cache");
    }
}

// --- CelesTrak, failure paths ---

#[tokio::test]
async fn test_celestrak_catalog_without_element_sets_keeps_cache() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_seen = calls.clone();
    let app = Router::new().route(
        "/pub/TLE/active.txt",
        get(move || {
            let calls_seen = calls_seen.clone();
            async move {
                calls_seen.fetch_add(1, Ordering::SeqCst);
                "<html>\nService temporarily unavailable\n</html>\n"
            }
        }),
    );
    let base = serve(app).await;

    let fetcher = CelestrakFetcher::new(CelestrakConfig {
        base_url: base,
        retry_backoff: Duration::from_millis(10),
        ..Default::default()
    })
    .unwrap();
    assert!(fetcher.fetch().await.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    fetcher
        .cache()
        .seed(lib_common::ingestors::celestrak::parse_tle_catalog(&format!("ISS\n{ISS_1}\n{ISS_2}")));
    fetcher.cache().expire();

    let stale = fetcher.fetch().await;
    assert_eq!(stale.len(), 1);
    assert_eq!(stale[0].norad_id, "25544");
    assert_eq!(fetcher.cache().last_good().map(|c| c.len()), Some(1));
}

// --- OpenSky token lifetime ---

#[tokio::test]
async fn test_opensky_token_with_unbounded_lifetime_is_cached() {
    let token_calls = Arc::new(AtomicUsize::new(0));
    let calls_seen = token_calls.clone();
    let app = Router::new()
        .route(
            "/token",
            post(move || {
                let calls_seen = calls_seen.clone();
                async move {
                    calls_seen.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"access_token": "t1", "expires_in": u64::MAX}))
                }
            }),
        )
        .route(
            "/api/states/all",
            get(|headers: HeaderMap| async move {
                if header(&headers, "authorization").as_deref() == Some("Bearer t1") {
                    Json(states_body()).into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            }),
        );
    let base = serve(app).await;

    let fetcher = OpenSkyFetcher::new(OpenSkyConfig {
        credentials: OpenSkyCredentials {
            client_id: Some("client".into()),
            client_secret: Some("secret".into()),
            ..Default::default()
        },
        ..opensky_config(&base)
    })
    .unwrap();

    assert_eq!(fetcher.fetch().await.len(), 2);
    assert_eq!(fetcher.fetch().await.len(), 2);
    assert_eq!(token_calls.load(Ordering::SeqCst), 1);
}

// --- Cache policies ---

#[tokio::test]
async fn test_default_cache_policies() {
    use lib_common::ingestors::StalePolicy;

    let opensky = OpenSkyFetcher::new(OpenSkyConfig::default()).unwrap();
    assert_eq!(opensky.cache().policy(), StalePolicy::ServeEmpty);
    assert_eq!(opensky.cache().ttl(), Duration::ZERO);

    let military = MilitaryFetcher::new(
        AdsbExchangeConfig::default(),
        Arc::new(CountingAircraft(Arc::new(AtomicUsize::new(0)))),
    )
    .unwrap();
    assert_eq!(military.cache().policy(), StalePolicy::ServeEmpty);

    let celestrak = CelestrakFetcher::new(CelestrakConfig::default()).unwrap();
    assert_eq!(celestrak.cache().policy(), StalePolicy::ServeStale);
    assert_eq!(celestrak.cache().ttl(), Duration::from_secs(30 * 60));

    let usgs = UsgsFetcher::new(UsgsConfig::default()).unwrap();
    assert_eq!(usgs.cache().policy(), StalePolicy::ServeStale);
    assert_eq!(usgs.cache().ttl(), Duration::from_secs(60));
}
