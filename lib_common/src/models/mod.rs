//! # Data Models
//!
//! Strongly typed representations of everything that flows through the
//! pipeline, from decoded upstream records to the JSON payload pushed to
//! subscribers.
//!
//! ## Contained Modules:
//! - **`records`**: per-source records (`AircraftPosition`, `EarthquakeEvent`,
//!   `TleRecord`) and the `BoundingBox` used to scope the live feed.
//! - **`geojson`**: `Point`, `Feature` and `FeatureCollection` plus the
//!   `ToFeature` conversion trait.
//! - **`payload`**: the per-cycle `WorldPayload` snapshot.

/// Per-source upstream records.
pub mod records;
/// GeoJSON point features and collections.
pub mod geojson;
/// The combined snapshot broadcast once per cycle.
pub mod payload;

pub use geojson::{Feature, FeatureCollection, Point, ToFeature};
pub use payload::{SourceCounts, WorldPayload};
pub use records::{AircraftPosition, BoundingBox, EarthquakeEvent, TleRecord};
