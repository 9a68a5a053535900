//! # Broadcast Cycle Integration Tests
//!
//! Runs the broadcast loop against stub sources and real subscribers from
//! the registry, checking the frames that come out the other end.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use lib_common::core::{BroadcastLoop, CycleReport, Sources, SubscriberRegistry};
use lib_common::ingestors::{AdsbExchangeConfig, Fetcher, MilitaryFetcher};
use lib_common::models::{AircraftPosition, EarthquakeEvent, TleRecord};

/// Returns the same records on every call after an optional delay.
struct StubFetcher<T> {
    records: Vec<T>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl<T> StubFetcher<T> {
    fn new(records: Vec<T>) -> Self {
        Self {
            records,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Fetcher for StubFetcher<T> {
    type Record = T;

    fn name(&self) -> &'static str {
        "stub"
    }

    async fn fetch(&self) -> Vec<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.records.clone()
    }
}

fn aircraft(icao24: &str, longitude: f64, latitude: f64) -> AircraftPosition {
    AircraftPosition {
        icao24: icao24.to_string(),
        callsign: format!("CS{icao24}"),
        origin_country: "United States".to_string(),
        longitude: Some(longitude),
        latitude: Some(latitude),
        altitude: Some(10_000.0),
        ..Default::default()
    }
}

fn sources(aircraft: Arc<dyn Fetcher<Record = AircraftPosition>>) -> Sources {
    Sources {
        military: Arc::new(MilitaryFetcher::new(AdsbExchangeConfig::default(), Arc::clone(&aircraft)).unwrap()),
        aircraft,
        satellites: Arc::new(StubFetcher::<TleRecord>::new(Vec::new())),
        earthquakes: Arc::new(StubFetcher::<EarthquakeEvent>::new(Vec::new())),
    }
}

#[tokio::test]
async fn test_cycle_delivers_payload_with_military_subset() {
    let fleet = StubFetcher::new(vec![
        aircraft("abc123", -73.9, 40.7),
        aircraft("ae1234", -77.0, 38.9),
        aircraft("3c6444", 8.5, 50.0),
    ]);
    let registry = Arc::new(SubscriberRegistry::default());
    let mut subscription = registry.register();
    let broadcast_loop = BroadcastLoop::new(sources(Arc::new(fleet)), Arc::clone(&registry), Duration::from_secs(10));

    let report = broadcast_loop.run_cycle(&CancellationToken::new()).await;
    let CycleReport::Broadcast { counts, recipients, .. } = report else {
        panic!("expected a broadcast, got {report:?}");
    };
    assert_eq!((counts.aircraft, counts.military, counts.satellites, counts.earthquakes), (3, 1, 0, 0));
    assert_eq!(recipients, 1);

    let frame = subscription.receiver.try_recv().unwrap();
    let payload: Value = serde_json::from_slice(&frame).unwrap();
    assert_eq!(payload["counts"]["aircraft"], 3);
    assert_eq!(payload["aircraft"]["type"], "FeatureCollection");
    assert_eq!(payload["aircraft"]["features"].as_array().unwrap().len(), 3);
    assert_eq!(payload["military"]["features"][0]["properties"]["icao24"], "ae1234");
    assert_eq!(payload["tles"], serde_json::json!([]));
    assert_eq!(payload["earthquakes"]["features"].as_array().unwrap().len(), 0);
    assert!(payload["timestamp"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn test_cycle_with_three_aircraft_and_empty_sources() {
    let fleet = StubFetcher::new(vec![
        aircraft("abc123", 1.0, 2.0),
        aircraft("a1b2c3", 3.0, 4.0),
        aircraft("3c6444", 5.0, 6.0),
    ]);
    let registry = Arc::new(SubscriberRegistry::default());
    let mut subscription = registry.register();
    let broadcast_loop = BroadcastLoop::new(sources(Arc::new(fleet)), Arc::clone(&registry), Duration::from_secs(10));

    broadcast_loop.run_cycle(&CancellationToken::new()).await;
    let frame = subscription.receiver.try_recv().unwrap();
    assert!(subscription.receiver.try_recv().is_err(), "exactly one frame per cycle");

    let payload: Value = serde_json::from_slice(&frame).unwrap();
    assert_eq!(
        payload["counts"],
        serde_json::json!({"aircraft": 3, "military": 0, "satellites": 0, "earthquakes": 0})
    );
    assert_eq!(payload["aircraft"]["features"].as_array().unwrap().len(), 3);
    assert_eq!(payload["military"]["features"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_cycle_without_subscribers_fetches_nothing() {
    let fleet = StubFetcher::new(vec![aircraft("abc123", 1.0, 2.0)]);
    let calls = Arc::clone(&fleet.calls);
    let registry = Arc::new(SubscriberRegistry::default());
    let broadcast_loop = BroadcastLoop::new(sources(Arc::new(fleet)), Arc::clone(&registry), Duration::from_secs(10));

    assert_eq!(broadcast_loop.run_cycle(&CancellationToken::new()).await, CycleReport::Skipped);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let _subscription = registry.register();
    assert!(matches!(
        broadcast_loop.run_cycle(&CancellationToken::new()).await,
        CycleReport::Broadcast { .. }
    ));
    // Aircraft once for the live feed; the military source reuses that result.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_cycle_starts_next_one_immediately() {
    let mut fleet = StubFetcher::new(vec![aircraft("abc123", 1.0, 2.0)]);
    fleet.delay = Duration::from_secs(15);
    let registry = Arc::new(SubscriberRegistry::default());
    let mut subscription = registry.register();
    let broadcast_loop = BroadcastLoop::new(sources(Arc::new(fleet)), Arc::clone(&registry), Duration::from_secs(10));

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move { broadcast_loop.run(token).await });

    let start = Instant::now();
    subscription.receiver.recv().await.unwrap();
    let first = start.elapsed();
    subscription.receiver.recv().await.unwrap();
    let gap = start.elapsed() - first;

    assert!(first >= Duration::from_secs(15) && first < Duration::from_secs(16), "first frame after {first:?}");
    assert!(gap >= Duration::from_secs(15) && gap < Duration::from_secs(16), "gap was {gap:?}");

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_fast_cycles_are_paced_by_interval() {
    let mut fleet = StubFetcher::new(vec![aircraft("abc123", 1.0, 2.0)]);
    fleet.delay = Duration::from_secs(2);
    let registry = Arc::new(SubscriberRegistry::default());
    let mut subscription = registry.register();
    let broadcast_loop = BroadcastLoop::new(sources(Arc::new(fleet)), Arc::clone(&registry), Duration::from_secs(10));

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move { broadcast_loop.run(token).await });

    subscription.receiver.recv().await.unwrap();
    let first = Instant::now();
    subscription.receiver.recv().await.unwrap();
    let gap = first.elapsed();

    assert!(gap >= Duration::from_secs(10) && gap < Duration::from_secs(11), "gap was {gap:?}");

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_cancelled_loop_stops_during_sleep() {
    let registry = Arc::new(SubscriberRegistry::default());
    let broadcast_loop = BroadcastLoop::new(
        sources(Arc::new(StubFetcher::new(Vec::new()))),
        registry,
        Duration::from_secs(3600),
    );

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    let handle = tokio::spawn(async move { broadcast_loop.run(token).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}
