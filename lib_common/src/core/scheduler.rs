//! # Broadcast Loop
//!
//! A self-pacing scheduler that drives the whole pipeline. Each cycle walks
//! Idle -> Fetching -> Building -> Broadcasting -> Sleeping and starts over
//! until its `CancellationToken` fires.
//!
//! ## Cycle rules:
//! - With no subscribers the cycle is skipped and the loop goes straight to
//!   sleep.
//! - Live aircraft, satellites and earthquakes are fetched in parallel tasks.
//!   The military fetch starts once live aircraft are in and reuses them.
//! - A fetch task that fails, panics included, counts as an empty result for
//!   its source. The cycle always completes.
//! - The payload is serialized once and the same frame goes to everyone.
//! - The sleep is whatever is left of the interval, floored at zero.
//! - Cancellation is observed at the top of the loop, right before the
//!   broadcast and during the sleep. A cancelled cycle never broadcasts.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinError;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::builder::build_payload;
use super::registry::{Frame, SubscriberRegistry};
use crate::ingestors::{Fetcher, MilitarySource};
use crate::models::{AircraftPosition, EarthquakeEvent, SourceCounts, TleRecord};

/// Remaining sleep after a cycle that took `elapsed`. Never negative.
pub fn sleep_budget(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

/// The four upstream sources polled every cycle.
#[derive(Clone)]
pub struct Sources {
    /// Live aircraft positions.
    pub aircraft: Arc<dyn Fetcher<Record = AircraftPosition>>,
    /// Military subset, derived from or alongside live aircraft.
    pub military: Arc<dyn MilitarySource>,
    /// Satellite element sets.
    pub satellites: Arc<dyn Fetcher<Record = TleRecord>>,
    /// Recent earthquakes.
    pub earthquakes: Arc<dyn Fetcher<Record = EarthquakeEvent>>,
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleReport {
    /// Nobody was listening; nothing was fetched.
    Skipped,
    /// The token fired before the broadcast.
    Cancelled,
    /// The payload could not be serialized; nothing was sent.
    Failed,
    /// A payload went out.
    Broadcast {
        /// Records per source.
        counts: SourceCounts,
        /// Subscribers that received the frame.
        recipients: usize,
        /// Time spent fetching, building and sending.
        elapsed: Duration,
    },
}

/// # Broadcast Loop
///
/// Owns the sources and shares the registry with the connection handlers.
pub struct BroadcastLoop {
    sources: Sources,
    registry: Arc<SubscriberRegistry>,
    interval: Duration,
}

impl BroadcastLoop {
    /// Creates a loop that starts a cycle every `interval`.
    pub fn new(sources: Sources, registry: Arc<SubscriberRegistry>, interval: Duration) -> Self {
        Self {
            sources,
            registry,
            interval,
        }
    }

    /// Configured cycle interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// # Main Execution Loop
    ///
    /// Runs cycles back to back until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(interval_secs = self.interval.as_secs_f64(), "Broadcast loop started");

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let started = Instant::now();
            if self.run_cycle(&shutdown).await == CycleReport::Cancelled {
                break;
            }

            let budget = sleep_budget(self.interval, started.elapsed());
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(budget) => {}
            }
        }

        info!("Broadcast loop stopped");
    }

    /// Runs a single Fetching -> Building -> Broadcasting pass.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> CycleReport {
        if self.registry.count() == 0 {
            debug!("No subscribers, skipping cycle");
            return CycleReport::Skipped;
        }
        let started = Instant::now();

        // --- Phase 1: Fetch ---
        let aircraft_source = Arc::clone(&self.sources.aircraft);
        let satellite_source = Arc::clone(&self.sources.satellites);
        let quake_source = Arc::clone(&self.sources.earthquakes);

        let aircraft_task = tokio::spawn(async move { aircraft_source.fetch().await });
        let satellite_task = tokio::spawn(async move { satellite_source.fetch().await });
        let quake_task = tokio::spawn(async move { quake_source.fetch().await });

        let aircraft = settle(self.sources.aircraft.name(), aircraft_task.await).map(Arc::new);

        let military_source = Arc::clone(&self.sources.military);
        let primary = aircraft.clone();
        let military_task =
            tokio::spawn(async move { military_source.fetch_military(primary.as_deref().map(Vec::as_slice)).await });

        let military = settle(self.sources.military.name(), military_task.await).unwrap_or_default();
        let satellites = settle(self.sources.satellites.name(), satellite_task.await).unwrap_or_default();
        let earthquakes = settle(self.sources.earthquakes.name(), quake_task.await).unwrap_or_default();
        let aircraft: &[AircraftPosition] = aircraft.as_deref().map(Vec::as_slice).unwrap_or_default();

        // --- Phase 2: Build ---
        let payload = build_payload(aircraft, &military, &satellites, &earthquakes);
        let frame: Frame = match payload.to_json() {
            Ok(json) => Frame::from(json),
            Err(e) => {
                error!(error = %e, "Failed to serialize payload");
                return CycleReport::Failed;
            }
        };

        // --- Phase 3: Broadcast ---
        if shutdown.is_cancelled() {
            debug!("Shutdown requested, dropping built payload");
            return CycleReport::Cancelled;
        }
        let report = self.registry.broadcast(frame);

        let counts = payload.counts;
        info!(
            "Broadcast: {} aircraft, {} military, {} satellites, {} earthquakes to {} clients",
            counts.aircraft, counts.military, counts.satellites, counts.earthquakes, report.delivered
        );

        CycleReport::Broadcast {
            counts,
            recipients: report.delivered,
            elapsed: started.elapsed(),
        }
    }
}

/// Unwraps a finished fetch task, logging tasks that failed.
fn settle<T>(source: &'static str, joined: Result<Vec<T>, JoinError>) -> Option<Vec<T>> {
    match joined {
        Ok(records) => Some(records),
        Err(e) => {
            error!(source, error = %e, "Fetch task failed, treating as empty");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct StaticFetcher<T>(Vec<T>);

    #[async_trait]
    impl<T: Clone + Send + Sync + 'static> Fetcher for StaticFetcher<T> {
        type Record = T;

        fn name(&self) -> &'static str {
            "static"
        }

        async fn fetch(&self) -> Vec<T> {
            self.0.clone()
        }
    }

    struct PanickingFetcher;

    #[async_trait]
    impl Fetcher for PanickingFetcher {
        type Record = EarthquakeEvent;

        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn fetch(&self) -> Vec<EarthquakeEvent> {
            panic!("upstream exploded")
        }
    }

    struct EchoMilitary;

    #[async_trait]
    impl MilitarySource for EchoMilitary {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn fetch_military(&self, primary: Option<&[AircraftPosition]>) -> Vec<AircraftPosition> {
            primary.unwrap_or_default().iter().take(1).cloned().collect()
        }
    }

    fn aircraft(n: usize) -> Vec<AircraftPosition> {
        (0..n)
            .map(|i| AircraftPosition {
                icao24: format!("ae{i:04}"),
                longitude: Some(i as f64),
                latitude: Some(1.0),
                ..Default::default()
            })
            .collect()
    }

    fn sources(quakes: Arc<dyn Fetcher<Record = EarthquakeEvent>>) -> Sources {
        Sources {
            aircraft: Arc::new(StaticFetcher(aircraft(3))),
            military: Arc::new(EchoMilitary),
            satellites: Arc::new(StaticFetcher(Vec::<TleRecord>::new())),
            earthquakes: quakes,
        }
    }

    #[test]
    fn test_sleep_budget_floors_at_zero() {
        let interval = Duration::from_secs(10);
        assert_eq!(sleep_budget(interval, Duration::from_secs(3)), Duration::from_secs(7));
        assert_eq!(sleep_budget(interval, Duration::from_secs(10)), Duration::ZERO);
        assert_eq!(sleep_budget(interval, Duration::from_secs(25)), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_cycle_skipped_without_subscribers() {
        let registry = Arc::new(SubscriberRegistry::default());
        let looper = BroadcastLoop::new(
            sources(Arc::new(StaticFetcher(Vec::new()))),
            registry,
            Duration::from_secs(10),
        );
        assert_eq!(looper.run_cycle(&CancellationToken::new()).await, CycleReport::Skipped);
    }

    #[tokio::test]
    async fn test_military_reuses_primary_records() {
        let registry = Arc::new(SubscriberRegistry::default());
        let mut sub = registry.register();
        let looper = BroadcastLoop::new(
            sources(Arc::new(StaticFetcher(Vec::new()))),
            Arc::clone(&registry),
            Duration::from_secs(10),
        );

        let report = looper.run_cycle(&CancellationToken::new()).await;
        match report {
            CycleReport::Broadcast { counts, recipients, .. } => {
                assert_eq!(counts.aircraft, 3);
                assert_eq!(counts.military, 1);
                assert_eq!(recipients, 1);
            }
            other => panic!("unexpected report {other:?}"),
        }
        assert!(sub.receiver.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_panicking_fetcher_counts_as_empty() {
        let registry = Arc::new(SubscriberRegistry::default());
        let _sub = registry.register();
        let looper = BroadcastLoop::new(sources(Arc::new(PanickingFetcher)), registry, Duration::from_secs(10));

        match looper.run_cycle(&CancellationToken::new()).await {
            CycleReport::Broadcast { counts, .. } => {
                assert_eq!(counts.earthquakes, 0);
                assert_eq!(counts.aircraft, 3);
            }
            other => panic!("unexpected report {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_cycle_does_not_broadcast() {
        let registry = Arc::new(SubscriberRegistry::default());
        let mut sub = registry.register();
        let looper = BroadcastLoop::new(
            sources(Arc::new(StaticFetcher(Vec::new()))),
            Arc::clone(&registry),
            Duration::from_secs(10),
        );

        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(looper.run_cycle(&token).await, CycleReport::Cancelled);
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_exits_when_cancelled() {
        let registry = Arc::new(SubscriberRegistry::default());
        let looper = BroadcastLoop::new(
            sources(Arc::new(StaticFetcher(Vec::new()))),
            registry,
            Duration::from_secs(3600),
        );

        let token = CancellationToken::new();
        let child = token.clone();
        let handle = tokio::spawn(async move { looper.run(child).await });

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
    }
}
