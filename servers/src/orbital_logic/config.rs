use clap::Parser;
use lib_common::ingestors::{
    AdsbExchangeConfig, CelestrakConfig, OpenSkyConfig, OpenSkyCredentials, UsgsConfig,
};
use lib_common::models::BoundingBox;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "server_orbital.conf";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("polling interval must be at least 1 second")]
    ZeroInterval,
    #[error("bounding box needs all of lamin, lomin, lamax and lomax, or none of them")]
    PartialBoundingBox,
    #[error("bounding box {0:?} is out of range or empty")]
    InvalidBoundingBox(BoundingBox),
    #[error("max satellites must be at least 1")]
    ZeroSatellites,
}

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "OrbitalView live geospatial broadcaster", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "ORBITAL_PORT", help = "Port to listen on for HTTP and WebSocket clients.")]
    pub port: Option<u16>,

    #[clap(long, env = "ORBITAL_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "ORBITAL_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "ORBITAL_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "POLLING_INTERVAL_SECONDS", help = "Seconds between broadcast cycles.")]
    pub polling_interval_seconds: Option<u64>,

    #[clap(long, env = "OPENSKY_CLIENT_ID", help = "OpenSky OAuth2 client id.")]
    pub opensky_client_id: Option<String>,

    #[clap(long, env = "OPENSKY_CLIENT_SECRET", hide_env_values = true, help = "OpenSky OAuth2 client secret.")]
    pub opensky_client_secret: Option<String>,

    #[clap(long, env = "OPENSKY_USERNAME", help = "OpenSky account name for basic auth.")]
    pub opensky_username: Option<String>,

    #[clap(long, env = "OPENSKY_PASSWORD", hide_env_values = true, help = "OpenSky account password for basic auth.")]
    pub opensky_password: Option<String>,

    #[clap(long, env = "ADSB_API_KEY", hide_env_values = true, help = "ADS-B Exchange API key for the military feed.")]
    pub adsb_api_key: Option<String>,

    #[clap(long, env = "BBOX_LAMIN", allow_negative_numbers = true, help = "Bounding box minimum latitude.")]
    pub bbox_lamin: Option<f64>,

    #[clap(long, env = "BBOX_LOMIN", allow_negative_numbers = true, help = "Bounding box minimum longitude.")]
    pub bbox_lomin: Option<f64>,

    #[clap(long, env = "BBOX_LAMAX", allow_negative_numbers = true, help = "Bounding box maximum latitude.")]
    pub bbox_lamax: Option<f64>,

    #[clap(long, env = "BBOX_LOMAX", allow_negative_numbers = true, help = "Bounding box maximum longitude.")]
    pub bbox_lomax: Option<f64>,

    #[clap(long, env = "ORBITAL_MAX_SATELLITES", help = "Maximum satellite element sets per payload.")]
    pub max_satellites: Option<usize>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            polling_interval_seconds: other.polling_interval_seconds.or(self.polling_interval_seconds),
            opensky_client_id: other.opensky_client_id.or(self.opensky_client_id),
            opensky_client_secret: other.opensky_client_secret.or(self.opensky_client_secret),
            opensky_username: other.opensky_username.or(self.opensky_username),
            opensky_password: other.opensky_password.or(self.opensky_password),
            adsb_api_key: other.adsb_api_key.or(self.adsb_api_key),
            bbox_lamin: other.bbox_lamin.or(self.bbox_lamin),
            bbox_lomin: other.bbox_lomin.or(self.bbox_lomin),
            bbox_lamax: other.bbox_lamax.or(self.bbox_lamax),
            bbox_lomax: other.bbox_lomax.or(self.bbox_lomax),
            max_satellites: other.max_satellites.or(self.max_satellites),
        }
    }

    fn defaults() -> Config {
        Config {
            port: Some(8000),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            polling_interval_seconds: Some(10),
            max_satellites: Some(500),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling_interval_seconds == Some(0) {
            return Err(ConfigError::ZeroInterval);
        }
        if self.max_satellites == Some(0) {
            return Err(ConfigError::ZeroSatellites);
        }
        self.bounding_box().map(|_| ())
    }

    /// All four corners or none; anything in between is a mistake.
    pub fn bounding_box(&self) -> Result<Option<BoundingBox>, ConfigError> {
        match (self.bbox_lamin, self.bbox_lomin, self.bbox_lamax, self.bbox_lomax) {
            (None, None, None, None) => Ok(None),
            (Some(lamin), Some(lomin), Some(lamax), Some(lomax)) => {
                let bbox = BoundingBox { lamin, lomin, lamax, lomax };
                if bbox.is_valid() {
                    Ok(Some(bbox))
                } else {
                    Err(ConfigError::InvalidBoundingBox(bbox))
                }
            }
            _ => Err(ConfigError::PartialBoundingBox),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(8000)
    }

    pub fn log_level(&self) -> String {
        self.log_level.clone().unwrap_or_else(|| "info".to_string())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_seconds.unwrap_or(10))
    }

    pub fn to_opensky_config(&self) -> Result<OpenSkyConfig, ConfigError> {
        Ok(OpenSkyConfig {
            credentials: OpenSkyCredentials {
                client_id: self.opensky_client_id.clone(),
                client_secret: self.opensky_client_secret.clone(),
                username: self.opensky_username.clone(),
                password: self.opensky_password.clone(),
            },
            bbox: self.bounding_box()?,
            ..Default::default()
        })
    }

    pub fn to_adsb_config(&self) -> AdsbExchangeConfig {
        AdsbExchangeConfig {
            api_key: self.adsb_api_key.clone(),
            ..Default::default()
        }
    }

    pub fn to_celestrak_config(&self) -> CelestrakConfig {
        CelestrakConfig {
            max_satellites: self.max_satellites.unwrap_or(500),
            ..Default::default()
        }
    }

    pub fn to_usgs_config(&self) -> UsgsConfig {
        UsgsConfig::default()
    }
}

/// Layers defaults, then the JSON file, then env/CLI values in `cli`.
pub fn load_config_from(cli: Config) -> Config {
    // 1. Load defaults
    let mut current_config = Config::defaults();

    // 2. Load from config file if present
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => eprintln!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            },
            Err(e) => eprintln!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                config_file_path.display(),
                e
            ),
        }
    }

    // 3. Override with environment variables and CLI arguments
    current_config.merge(cli)
}

pub fn load_config() -> Config {
    load_config_from(Config::parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{tempdir, NamedTempFile};

    fn bare() -> Config {
        Config {
            config_path: Some(PathBuf::from("/nonexistent/server_orbital.conf")),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_apply() {
        let config = load_config_from(bare());
        assert_eq!(config.port(), 8000);
        assert_eq!(config.polling_interval(), Duration::from_secs(10));
        assert_eq!(config.max_satellites, Some(500));
        assert!(config.validate().is_ok());
        assert_eq!(config.bounding_box(), Ok(None));
    }

    #[test]
    fn test_cli_overrides_file_overrides_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"port": 9100, "pollingIntervalSeconds": 30, "logLevel": "debug"}}"#).unwrap();

        let cli = Config {
            config_path: Some(file.path().to_path_buf()),
            port: Some(9200),
            ..Default::default()
        };
        let config = load_config_from(cli);

        assert_eq!(config.port(), 9200);
        assert_eq!(config.polling_interval(), Duration::from_secs(30));
        assert_eq!(config.log_level(), "debug");
    }

    #[test]
    fn test_unparsable_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server_orbital.conf");
        fs::write(&path, "port = 9100").unwrap();

        let config = load_config_from(Config {
            config_path: Some(path),
            ..Default::default()
        });
        assert_eq!(config.port(), 8000);
    }

    #[test]
    fn test_partial_bounding_box_is_rejected() {
        let config = Config {
            bbox_lamin: Some(45.0),
            bbox_lomin: Some(5.0),
            ..bare()
        };
        assert_eq!(config.validate(), Err(ConfigError::PartialBoundingBox));
    }

    #[test]
    fn test_full_bounding_box_reaches_opensky_config() {
        let config = Config {
            bbox_lamin: Some(45.8),
            bbox_lomin: Some(5.9),
            bbox_lamax: Some(47.8),
            bbox_lomax: Some(10.5),
            ..bare()
        };
        let opensky = config.to_opensky_config().unwrap();
        assert_eq!(opensky.bbox.map(|b| b.lamax), Some(47.8));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let config = Config {
            polling_interval_seconds: Some(0),
            ..bare()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroInterval));
    }
}
