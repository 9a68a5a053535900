//! # Data Ingestors Module
//!
//! This module serves as the central hub for all upstream fetchers. Each
//! submodule is a client for one public geospatial feed, handling the unique
//! logic required to authenticate against it, decode its record shape and
//! degrade gracefully when it misbehaves.
//!
//! ## Purpose:
//! The scheduler treats every source the same way: it calls `fetch()` and gets
//! a list of typed records back. Failures never cross this boundary. A fetcher
//! logs what went wrong and answers with its last good cache entry or an
//! empty list, depending on its `StalePolicy`.
//!
//! ## Contained Modules:
//! - **`cache`**: the per-source `SourceCache` with TTL and stale policy.
//! - **`opensky`**: live aircraft state vectors, with OAuth2 client-credentials,
//!   basic or anonymous access.
//! - **`adsb_exchange`**: military aircraft, either from the dedicated ADS-B
//!   Exchange endpoint or filtered out of the live feed by ICAO prefix.
//! - **`celestrak`**: the active satellite catalog as two-line element sets.
//! - **`usgs`**: recent earthquakes from the USGS event service.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::AircraftPosition;
use crate::retrieve::RetrieveError;

/// Per-source record cache with TTL and stale policy.
pub mod cache;
/// Live aircraft positions from OpenSky.
pub mod opensky;
/// Military aircraft from ADS-B Exchange or the live feed.
pub mod adsb_exchange;
/// Two-line element sets from CelesTrak.
pub mod celestrak;
/// Earthquake events from USGS.
pub mod usgs;

// --- Public API Re-exports ---
pub use adsb_exchange::{AdsbExchangeConfig, MilitaryFetcher};
pub use cache::{SourceCache, StalePolicy};
pub use celestrak::{CelestrakConfig, CelestrakFetcher};
pub use opensky::{OpenSkyConfig, OpenSkyCredentials, OpenSkyFetcher};
pub use usgs::{UsgsConfig, UsgsFetcher};

/// # Fetcher
///
/// A source of one record type. `fetch` is idempotent and infallible from the
/// caller's point of view.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Record type produced by this source.
    type Record: Send + 'static;

    /// Short source name used in logs.
    fn name(&self) -> &'static str;

    /// Returns the current snapshot for this source.
    async fn fetch(&self) -> Vec<Self::Record>;
}

/// Military aircraft source.
///
/// Takes the primary aircraft records of the same cycle, when available, so
/// the subset can be derived without another upstream call.
#[async_trait]
pub trait MilitarySource: Send + Sync {
    /// Short source name used in logs.
    fn name(&self) -> &'static str;

    /// Returns the military subset for this cycle.
    async fn fetch_military(&self, primary: Option<&[AircraftPosition]>) -> Vec<AircraftPosition>;
}

/// Why a single upstream record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The record was expected to be a JSON array.
    #[error("record is not an array")]
    NotAnArray,

    /// The record was expected to be a JSON object.
    #[error("record is not an object")]
    NotAnObject,

    /// The positional record has fewer fields than required.
    #[error("record has {len} fields, expected at least {min}")]
    TooShort {
        /// Fields present.
        len: usize,
        /// Fields required.
        min: usize,
    },

    /// A required field is absent or null.
    #[error("missing field `{0}`")]
    Missing(&'static str),

    /// A field holds a value of the wrong JSON type.
    #[error("field `{0}` has the wrong type")]
    WrongType(&'static str),

    /// The record has no usable longitude/latitude pair.
    #[error("record has no position")]
    MissingPosition,
}

/// Why a whole fetch failed. Logged by the fetcher, never returned to callers.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network, timeout or body decoding failure.
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),

    /// The upstream answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Start of the response body.
        body: String,
    },

    /// Credentials were rejected or a token could not be obtained.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The response parsed but had an unusable shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// True when retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Retrieve(e) if e.is_transient())
    }

    /// True when the request timed out.
    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Retrieve(e) if e.is_timeout())
    }
}

/// Logs a failed fetch at the level its kind deserves.
pub(crate) fn log_fetch_failure(source: &'static str, err: &FetchError) {
    match err {
        e if e.is_timeout() => tracing::error!(source, "{} request timed out", source),
        FetchError::Status { status, body } => {
            tracing::error!(source, status = *status, "{} HTTP {}: {}", source, status, body)
        }
        FetchError::Auth(msg) => tracing::error!(source, "{} authentication failed: {}", source, msg),
        other => tracing::error!(source, error = %other, "{} fetch failed", source),
    }
}

/// Number of characters of an error body kept for logs.
pub(crate) const ERROR_EXCERPT_CHARS: usize = 200;
