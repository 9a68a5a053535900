//! # CelesTrak Active Catalog
//!
//! Downloads the bulk two-line element file for all active satellites. The
//! whole catalog is cached for 30 minutes and a capped slice of it is served
//! every cycle. Timeouts and connection failures are retried with a linear
//! backoff; HTTP errors are not.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use tokio::time::sleep;
use tracing::{info, warn};

use super::cache::{SourceCache, StalePolicy};
use super::{log_fetch_failure, FetchError, Fetcher, ERROR_EXCERPT_CHARS};
use crate::models::TleRecord;
use crate::retrieve::{ApiClient, ClientOptions, RequestOptions, RetrieveError};

/// CelesTrak site root.
pub const CELESTRAK_URL: &str = "https://celestrak.org/";
/// Path of the active catalog in TLE format.
pub const ACTIVE_CATALOG_PATH: &str = "pub/TLE/active.txt";
/// CelesTrak asks automated clients to identify themselves.
pub const CELESTRAK_USER_AGENT: &str = "WorldView-Tracker/2.0 (geospatial research)";

/// Settings for the satellite catalog fetcher.
#[derive(Debug, Clone)]
pub struct CelestrakConfig {
    /// Site root.
    pub base_url: String,
    /// Catalog path joined to the root.
    pub catalog_path: String,
    /// Maximum number of element sets served per cycle.
    pub max_satellites: usize,
    /// How long the parsed catalog is reused.
    pub cache_ttl: Duration,
    /// Total attempts per refresh, first one included.
    pub max_attempts: u32,
    /// Backoff unit; attempt `n` waits `n * retry_backoff`.
    pub retry_backoff: Duration,
    /// Time allowed to connect.
    pub connect_timeout: Duration,
    /// Time allowed for the whole download.
    pub timeout: Duration,
}

impl Default for CelestrakConfig {
    fn default() -> Self {
        Self {
            base_url: CELESTRAK_URL.to_string(),
            catalog_path: ACTIVE_CATALOG_PATH.to_string(),
            max_satellites: 500,
            cache_ttl: Duration::from_secs(30 * 60),
            max_attempts: 3,
            retry_backoff: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(45),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Parses bulk TLE text into element sets.
///
/// Blank lines and surrounding whitespace are ignored. Each set is a name
/// line followed by lines starting with `1 ` and `2 `. On a mismatch one line
/// is skipped and grouping resumes from the next.
pub fn parse_tle_catalog(text: &str) -> Vec<TleRecord> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|line| !line.is_empty()).collect();

    let mut records = Vec::new();
    let mut i = 0;
    while i + 2 < lines.len() {
        let (name, line1, line2) = (lines[i], lines[i + 1], lines[i + 2]);
        if line1.starts_with("1 ") && line2.starts_with("2 ") {
            records.push(TleRecord {
                norad_id: norad_id(line1),
                name: name.to_string(),
                line1: line1.to_string(),
                line2: line2.to_string(),
            });
            i += 3;
        } else {
            i += 1;
        }
    }
    records
}

/// Catalog number from columns 3-7 of line 1.
fn norad_id(line1: &str) -> String {
    line1.get(2..7).or_else(|| line1.get(2..)).unwrap_or_default().trim().to_string()
}

/// # CelesTrak Fetcher
///
/// Serves at most `max_satellites` element sets from a cached catalog.
pub struct CelestrakFetcher {
    client: ApiClient,
    catalog_path: String,
    max_satellites: usize,
    max_attempts: u32,
    retry_backoff: Duration,
    cache: SourceCache<TleRecord>,
}

impl CelestrakFetcher {
    /// Builds the fetcher.
    pub fn new(config: CelestrakConfig) -> Result<Self, RetrieveError> {
        let client = ApiClient::new(
            &config.base_url,
            ClientOptions {
                timeout: config.timeout,
                connect_timeout: config.connect_timeout,
                user_agent: CELESTRAK_USER_AGENT.to_string(),
                ..Default::default()
            },
        )?;

        Ok(Self {
            client,
            catalog_path: config.catalog_path,
            max_satellites: config.max_satellites,
            max_attempts: config.max_attempts.max(1),
            retry_backoff: config.retry_backoff,
            cache: SourceCache::new(config.cache_ttl, StalePolicy::ServeStale),
        })
    }

    /// The catalog cache, for seeding and resetting.
    pub fn cache(&self) -> &SourceCache<TleRecord> {
        &self.cache
    }

    fn capped(&self, mut records: Vec<TleRecord>) -> Vec<TleRecord> {
        records.truncate(self.max_satellites);
        records
    }

    async fn download(&self) -> Result<Vec<TleRecord>, FetchError> {
        let response = self
            .client
            .request_text(Method::GET, &self.catalog_path, RequestOptions::default())
            .await?;
        if !response.success {
            return Err(FetchError::Status {
                status: response.status,
                body: response.error_excerpt(ERROR_EXCERPT_CHARS),
            });
        }

        let catalog = parse_tle_catalog(response.data.as_deref().unwrap_or_default());
        if catalog.is_empty() {
            return Err(FetchError::Malformed("no element sets in catalog".to_string()));
        }
        Ok(catalog)
    }

    async fn refresh(&self) -> Result<Vec<TleRecord>, FetchError> {
        let mut attempt = 1;
        loop {
            match self.download().await {
                Ok(catalog) => return Ok(catalog),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.retry_backoff * attempt;
                    warn!(
                        "CelesTrak timeout (attempt {}/{}), retrying in {:?}: {}",
                        attempt, self.max_attempts, delay, e
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Fetcher for CelestrakFetcher {
    type Record = TleRecord;

    fn name(&self) -> &'static str {
        "celestrak"
    }

    async fn fetch(&self) -> Vec<TleRecord> {
        if let Some(catalog) = self.cache.fresh() {
            return self.capped(catalog);
        }

        let catalog = match self.refresh().await {
            Ok(catalog) => {
                info!("Refreshed TLE cache: {} entries", catalog.len());
                self.cache.store(catalog.clone());
                catalog
            }
            Err(e) => {
                log_fetch_failure(self.name(), &e);
                self.cache.fallback()
            }
        };
        self.capped(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISS_1: &str = "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9005";
    const ISS_2: &str = "2 25544  51.6400 208.9163 0006317  69.9862  25.2906 15.49560532  1234";
    const HST_1: &str = "1 20580U 90037B   24001.50000000  .00000800  00000-0  40000-4 0  9991";
    const HST_2: &str = "2 20580  28.4700 100.0000 0002500 100.0000 260.0000 15.09000000  5555";

    #[test]
    fn test_parses_triples() {
        let text = format!("ISS (ZARYA)\n{ISS_1}\n{ISS_2}\nHST\n{HST_1}\n{HST_2}\n");
        let records = parse_tle_catalog(&text);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, "ISS (ZARYA)");
        assert_eq!(records[0].norad_id, "25544");
        assert_eq!(records[1].norad_id, "20580");
        assert_eq!(records[1].line2, HST_2);
    }

    #[test]
    fn test_resynchronizes_after_garbage() {
        let text = format!("SATA\n{ISS_1}\n{ISS_2}\nGARBAGE\nSATB\n{HST_1}\n{HST_2}");
        let records = parse_tle_catalog(&text);

        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["SATA", "SATB"]);
    }

    #[test]
    fn test_ignores_blank_lines_and_whitespace() {
        let text = format!("\r\n  ISS  \r\n\r\n  {ISS_1}  \r\n{ISS_2}\r\n\r\n");
        let records = parse_tle_catalog(&text);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ISS");
        assert_eq!(records[0].line1, ISS_1);
    }

    #[test]
    fn test_incomplete_trailing_set_is_dropped() {
        let text = format!("ISS\n{ISS_1}\n{ISS_2}\nHST\n{HST_1}");
        assert_eq!(parse_tle_catalog(&text).len(), 1);
        assert!(parse_tle_catalog("").is_empty());
    }

    #[test]
    fn test_norad_id_of_short_line() {
        assert_eq!(norad_id("1 123"), "123");
        assert_eq!(norad_id("1 "), "");
    }

    #[tokio::test]
    async fn test_serves_capped_slice_of_fresh_cache() {
        let fetcher = CelestrakFetcher::new(CelestrakConfig {
            max_satellites: 1,
            ..Default::default()
        })
        .unwrap();
        fetcher.cache().seed(parse_tle_catalog(&format!("ISS\n{ISS_1}\n{ISS_2}\nHST\n{HST_1}\n{HST_2}")));

        let records = fetcher.fetch().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ISS");
    }
}
