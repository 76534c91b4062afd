//! Pipeline configuration.
//!
//! Settings come from an optional TOML file, then environment variables
//! (after loading `.env`) override individual fields. Every field has a
//! default so an empty file is valid.
//!
//! ```toml
//! staging_bucket = "weather-staging"
//! validated_bucket = "weather-validated"
//! notify_topic = "weather-pipeline"
//! forecast_url = "https://api.weather.gov/gridpoints/OKX/36,36/forecast/hourly"
//! source_prefix = "nyc"
//! store_root = "./data"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::ingest::nws::{DEFAULT_FORECAST_URL, DEFAULT_USER_AGENT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("environment variable {name} has invalid value {value:?}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Bucket receiving raw forecast JSON.
    pub staging_bucket: String,
    /// Bucket receiving partitioned CSV output.
    pub validated_bucket: String,
    /// Notification topic both stages publish to.
    pub notify_topic: String,
    /// Hourly forecast endpoint.
    pub forecast_url: String,
    /// Sent as the HTTP User-Agent.
    pub user_agent: String,
    /// Key prefix for staged objects.
    pub source_prefix: String,
    /// Root directory of the filesystem blob store.
    pub store_root: PathBuf,
    /// Optional webhook; notifications go to the log when unset.
    pub webhook_url: Option<String>,
    pub http_timeout_secs: u64,
    /// Interval between ingestion runs for the local scheduler.
    pub schedule_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            staging_bucket: "weather-staging".to_string(),
            validated_bucket: "weather-validated".to_string(),
            notify_topic: "weather-pipeline".to_string(),
            forecast_url: DEFAULT_FORECAST_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            source_prefix: "nyc".to_string(),
            store_root: PathBuf::from("./data"),
            webhook_url: None,
            http_timeout_secs: 30,
            schedule_interval_secs: 3600,
        }
    }
}

impl PipelineConfig {
    /// Loads the file if given, applies process environment overrides,
    /// and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overrides fields from environment-style lookups. The first name in
    /// each list that is set wins.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |names: &[&str]| names.iter().find_map(|n| lookup(*n));

        if let Some(v) = first(&["STAGING_BUCKET"]) {
            self.staging_bucket = v;
        }
        if let Some(v) = first(&["VALIDATED_BUCKET", "RAW_BUCKET"]) {
            self.validated_bucket = v;
        }
        if let Some(v) = first(&["NOTIFY_TOPIC", "SNS_TOPIC_ARN"]) {
            self.notify_topic = v;
        }
        if let Some(v) = first(&["FORECAST_URL"]) {
            self.forecast_url = v;
        }
        if let Some(v) = first(&["SOURCE_PREFIX"]) {
            self.source_prefix = v;
        }
        if let Some(v) = first(&["STORE_ROOT"]) {
            self.store_root = PathBuf::from(v);
        }
        if let Some(v) = first(&["WEBHOOK_URL"]) {
            self.webhook_url = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = first(&["HTTP_TIMEOUT_SECS"]) {
            self.http_timeout_secs = v.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "HTTP_TIMEOUT_SECS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = first(&["SCHEDULE_INTERVAL_SECS"]) {
            self.schedule_interval_secs = v.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "SCHEDULE_INTERVAL_SECS",
                value: v.clone(),
            })?;
        }
        Ok(())
    }

    /// Replaces the scheduler interval and re-validates.
    pub fn set_schedule_interval(&mut self, secs: u64) -> Result<(), ConfigError> {
        self.schedule_interval_secs = secs;
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("staging_bucket", &self.staging_bucket),
            ("validated_bucket", &self.validated_bucket),
            ("notify_topic", &self.notify_topic),
            ("forecast_url", &self.forecast_url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
            }
        }
        // Validated writes must not land in the triggering bucket.
        if self.staging_bucket == self.validated_bucket {
            return Err(ConfigError::Invalid(
                "staging_bucket and validated_bucket must differ".to_string(),
            ));
        }
        if self.http_timeout_secs == 0 {
            return Err(ConfigError::Invalid("http_timeout_secs must be positive".to_string()));
        }
        if self.schedule_interval_secs == 0 {
            return Err(ConfigError::Invalid("schedule_interval_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_interval_secs)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
