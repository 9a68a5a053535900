//! # lib_common
//!
//! Shared library for the OrbitalView backend. It polls public geospatial feeds
//! (live aircraft, military aircraft, satellite element sets, earthquakes),
//! normalizes them into GeoJSON and fans a combined snapshot out to every live
//! subscriber.
//!
//! Each folder is gated behind a cargo feature of the same name so binaries only
//! pull in what they use. Enable `full` to get everything.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Typed records, GeoJSON structures and the broadcast payload.
#[cfg(feature = "models")]
pub mod models;

/// HTTP retrieval client with timeouts, auth schemes and retry middleware.
#[cfg(feature = "retrieve")]
pub mod retrieve;

/// One fetcher per upstream feed, each owning its own cache.
#[cfg(feature = "ingestors")]
pub mod ingestors;

/// Subscriber registry, payload builder and the broadcast loop.
#[cfg(feature = "core")]
pub mod core;

/// Console and file logging bootstrap on top of `tracing`.
#[cfg(feature = "loggers")]
pub mod loggers;
