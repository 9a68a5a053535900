//! # Core Engine Module
//!
//! This module forms the heart of the OrbitalView broadcaster. It turns the
//! records returned by the ingestors into one snapshot per cycle and fans that
//! snapshot out to every connected subscriber.
//!
//! ## Core Components:
//!
//! - **`builder`**: Pure conversion of fetched records into GeoJSON feature
//!   collections and the combined `WorldPayload`. No I/O.
//!
//! - **`registry`**: The set of live subscribers. Each subscriber owns a
//!   bounded queue; a broadcast pushes one shared frame into every queue and
//!   prunes subscribers whose queue has closed.
//!
//! - **`scheduler`**: The self-pacing `BroadcastLoop`. Each cycle fetches
//!   every source concurrently, builds and serializes the payload once,
//!   broadcasts it and sleeps for whatever is left of the interval.

/// Record to GeoJSON conversion and payload assembly.
pub mod builder;
/// Mutex-guarded subscriber set with zero-copy fan-out.
pub mod registry;
/// Fetch, build, broadcast and sleep, until cancelled.
pub mod scheduler;

// --- Public API Re-exports ---
pub use builder::{build_aircraft_geojson, build_earthquake_geojson, build_payload};
pub use registry::{BroadcastReport, Frame, SubscriberRegistry, Subscription};
pub use scheduler::{sleep_budget, BroadcastLoop, CycleReport, Sources};
