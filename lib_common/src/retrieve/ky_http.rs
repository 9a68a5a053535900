//! # HTTP Retrieval Utilities
//!
//! This module provides a robust, asynchronous API client wrapper around `reqwest`.
//! It adds per-client timeouts, optional exponential backoff retries, the auth
//! schemes the upstream feeds need, and standardized response handling.

use std::time::Duration;

use reqwest::{
    header::{HeaderMap, CONTENT_TYPE},
    Method, Url,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors raised while talking to an upstream.
///
/// Non-2xx statuses are not errors: they come back as an `ApiResponse` with
/// `success == false`.
#[derive(Debug, Error)]
pub enum RetrieveError {
    /// The base URL or a joined path could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The underlying `reqwest::Client` could not be constructed.
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    /// Connecting, sending or the retry middleware failed.
    #[error("request failed: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    /// The response body was not the JSON shape we asked for.
    #[error("failed to decode response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RetrieveError {
    /// True for timeouts and connection failures, the errors worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            RetrieveError::Transport(reqwest_middleware::Error::Reqwest(e)) | RetrieveError::Body(e) => {
                e.is_timeout() || e.is_connect()
            }
            _ => false,
        }
    }

    /// True when the failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            RetrieveError::Transport(reqwest_middleware::Error::Reqwest(e)) | RetrieveError::Body(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// A standardized container for API responses.
///
/// This struct wraps the deserialized data along with metadata about the
/// HTTP transaction, such as status codes and headers.
#[derive(Debug)]
pub struct ApiResponse<T> {
    /// The successfully deserialized response body, if any.
    pub data: Option<T>,
    /// The raw error body returned by the server if the request failed.
    pub error_body: Option<String>,
    /// The numeric HTTP status code.
    pub status: u16,
    /// Indicates if the status code was in the 2xx range.
    pub success: bool,
    /// The headers returned by the server.
    pub headers: HeaderMap,
}

impl<T> ApiResponse<T> {
    /// First `max` characters of the error body, for log lines.
    pub fn error_excerpt(&self, max: usize) -> String {
        self.error_body
            .as_deref()
            .map(|body| body.chars().take(max).collect())
            .unwrap_or_default()
    }
}

/// Credentials attached to a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Auth {
    /// No `Authorization` header.
    #[default]
    Anonymous,
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// HTTP basic auth.
    Basic {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
}

/// Request body encodings used by the upstreams.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// `application/x-www-form-urlencoded`.
    Form(Vec<(String, String)>),
}

/// Per-request options. `Default` is a bare anonymous request.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Query string pairs appended to the URL.
    pub query: Vec<(String, String)>,
    /// Extra headers for this request only.
    pub headers: Option<HeaderMap>,
    /// Credentials for this request.
    pub auth: Auth,
    /// Optional request body.
    pub body: Option<RequestBody>,
}

/// Construction options for an `ApiClient`.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Total time allowed for one attempt, connect included.
    pub timeout: Duration,
    /// Time allowed to establish the TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Transparent retries for transient failures. `0` disables the middleware.
    pub max_retries: u32,
    /// Shortest wait before a transparent retry; the longest is eight times this.
    pub retry_backoff: Duration,
    /// `User-Agent` sent with every request.
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            connect_timeout: Duration::from_secs(10),
            max_retries: 0,
            retry_backoff: Duration::from_secs(1),
            user_agent: "OrbitalView/2.0".to_string(),
        }
    }
}

/// A flexible asynchronous HTTP client.
///
/// Built on top of `reqwest_middleware`, it handles base URLs, timeouts,
/// authentication and automatic retries.
#[derive(Clone)]
pub struct ApiClient {
    /// The underlying middleware-enabled client.
    inner: ClientWithMiddleware,
    /// The base URL to which all relative paths are joined.
    base_url: Url,
}

impl ApiClient {
    /// Creates a new `ApiClient`.
    ///
    /// # Arguments
    /// * `base_url` - The absolute base URL for the API (e.g., "https://api.example.com/v1/").
    /// * `options` - Timeouts, retry budget and user agent.
    ///
    /// # Errors
    /// Fails if `base_url` is not absolute or the TLS backend cannot initialize.
    pub fn new(base_url: &str, options: ClientOptions) -> Result<Self, RetrieveError> {
        let url = Url::parse(base_url)?;

        let client = reqwest::Client::builder()
            .timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .user_agent(options.user_agent)
            .build()
            .map_err(RetrieveError::Client)?;

        let mut builder = ClientBuilder::new(client);
        if options.max_retries > 0 {
            let retry_policy = ExponentialBackoff::builder()
                .retry_bounds(options.retry_backoff, options.retry_backoff * 8)
                .build_with_max_retries(options.max_retries);
            builder = builder.with(RetryTransientMiddleware::new_with_policy(retry_policy));
        }

        Ok(Self {
            inner: builder.build(),
            base_url: url,
        })
    }

    /// The base URL all paths are joined against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Performs a request and decodes a successful body as JSON.
    ///
    /// # Errors
    /// Returns a `RetrieveError` if URL joining, network execution or decoding
    /// fails. Non-2xx statuses are reported through `ApiResponse::success`.
    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<T>, RetrieveError>
    where
        T: DeserializeOwned,
    {
        let raw = self.request_text(method, path, options).await?;
        let data = match raw.data {
            Some(text) => Some(serde_json::from_str::<T>(&text)?),
            None => None,
        };

        Ok(ApiResponse {
            data,
            error_body: raw.error_body,
            status: raw.status,
            success: raw.success,
            headers: raw.headers,
        })
    }

    /// Performs a request and returns a successful body as text.
    pub async fn request_text(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<ApiResponse<String>, RetrieveError> {
        // 1. Construct the full absolute URL
        let full_url = self.base_url.join(path)?;
        let mut req = self.inner.request(method, full_url);

        if !options.query.is_empty() {
            req = req.query(&options.query);
        }

        if let Some(h) = options.headers {
            req = req.headers(h);
        }

        // 2. Inject credentials
        req = match options.auth {
            Auth::Anonymous => req,
            Auth::Bearer(token) => req.bearer_auth(token),
            Auth::Basic { username, password } => req.basic_auth(username, Some(password)),
        };

        // 3. Attach the body if present
        match options.body {
            Some(RequestBody::Form(pairs)) => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs)
                    .finish();
                req = req
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(encoded);
            }
            None => {}
        }

        // 4. Execute and capture response metadata
        let response: reqwest::Response = req.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let success = status.is_success();
        let text = response.text().await.map_err(RetrieveError::Body)?;

        tracing::trace!(status = status.as_u16(), bytes = text.len(), "upstream response");

        if success {
            Ok(ApiResponse {
                data: Some(text),
                error_body: None,
                status: status.as_u16(),
                success: true,
                headers,
            })
        } else {
            Ok(ApiResponse {
                data: None,
                error_body: Some(text),
                status: status.as_u16(),
                success: false,
                headers,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_relative_base_url() {
        let result = ApiClient::new("api/states", ClientOptions::default());
        assert!(matches!(result, Err(RetrieveError::InvalidUrl(_))));
    }

    #[test]
    fn test_paths_join_against_base() {
        let client = ApiClient::new("https://opensky-network.org/api/", ClientOptions::default()).unwrap();
        let joined = client.base_url().join("states/all").unwrap();
        assert_eq!(joined.as_str(), "https://opensky-network.org/api/states/all");
    }

    #[test]
    fn test_error_excerpt_truncates() {
        let response: ApiResponse<()> = ApiResponse {
            data: None,
            error_body: Some("Too Many Requests".to_string()),
            status: 429,
            success: false,
            headers: HeaderMap::new(),
        };
        assert_eq!(response.error_excerpt(3), "Too");
    }

    #[test]
    fn test_decode_errors_are_not_transient() {
        let err = RetrieveError::from(serde_json::from_str::<u8>("nope").unwrap_err());
        assert!(!err.is_transient());
        assert!(!err.is_timeout());
    }
}
