//! # Data Retrieval Module
//!
//! HTTP plumbing shared by every fetcher in `ingestors`.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: `ApiClient`, a thin wrapper over `reqwest` and
//!   `reqwest-middleware`. A client is bound to one upstream base URL and
//!   carries its own timeouts and user agent. Requests take per-call query
//!   parameters, headers, credentials (bearer or basic) and an optional form
//!   body, and come back as an `ApiResponse` that keeps the status and the
//!   error body around for logging. Retries with exponential backoff are
//!   opt-in per client.

/// Per-upstream HTTP client with timeouts, credentials and optional retries.
pub mod ky_http;

pub use ky_http::{ApiClient, ApiResponse, Auth, ClientOptions, RequestBody, RequestOptions, RetrieveError};
