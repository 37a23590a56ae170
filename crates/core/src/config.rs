//! Environment-style configuration
//!
//! All recognized options are read once at startup by
//! [`LogshipConfig::from_env`]. Component crates derive their own config
//! structs from this one. Missing required values and unparsable values are
//! [`ConfigError`]s, fatal for the component that needs them.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Object-store connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Access key id (`AWS_ACCESS_KEY_ID`); default credential chain when absent
    pub access_key_id: Option<String>,
    /// Secret access key (`AWS_SECRET_ACCESS_KEY`)
    pub secret_access_key: Option<String>,
    /// Custom endpoint, e.g. a MinIO URL (`LOGSHIP_S3_ENDPOINT`)
    pub endpoint: Option<String>,
    /// Target bucket (`LOG_BUCKET_NAME`)
    pub bucket: Option<String>,
    /// Region (`AWS_REGION`, default `ap-southeast-1`)
    pub region: String,
    /// Object key prefix (`LOGSHIP_KEY_PREFIX`, default `logs`)
    pub key_prefix: String,
}

impl RemoteConfig {
    /// Bucket name, or `ConfigError::Missing` when unset.
    pub fn require_bucket(&self) -> Result<&str, ConfigError> {
        self.bucket
            .as_deref()
            .filter(|b| !b.is_empty())
            .ok_or(ConfigError::Missing("LOG_BUCKET_NAME"))
    }
}

/// Complete process configuration.
#[derive(Debug, Clone)]
pub struct LogshipConfig {
    /// Object-store settings
    pub remote: RemoteConfig,
    /// Root data directory; holds `logs/` and `state/`
    pub data_dir: PathBuf,
    /// Shipper scan cadence (`UPLOAD_INTERVAL_MINUTES`)
    pub upload_interval: Duration,
    /// Metrics sample interval (`LOGSHIP_METRICS_INTERVAL_SECS`)
    pub metrics_interval: Duration,
    /// Slow-request threshold (`LOGSHIP_SLOW_REQUEST_MS`)
    pub slow_request_threshold: Duration,
    /// Client buffer bound (`LOGSHIP_BUFFER_MAX_ITEMS`)
    pub buffer_max_items: usize,
    /// Client buffer age trigger (`LOGSHIP_BUFFER_MAX_AGE_SECS`)
    pub buffer_max_age: Duration,
    /// Shipper in-flight upload bound (`LOGSHIP_UPLOAD_CONCURRENCY`)
    pub upload_concurrency: usize,
    /// First retry delay (`LOGSHIP_BACKOFF_BASE_SECS`)
    pub backoff_base: Duration,
    /// Maximum retry delay (`LOGSHIP_BACKOFF_CAP_SECS`)
    pub backoff_cap: Duration,
    /// Rotation size (`LOGSHIP_MAX_FILE_MB`)
    pub max_file_bytes: u64,
    /// Rotation age (`LOGSHIP_MAX_FILE_AGE_SECS`)
    pub max_file_age: Duration,
    /// Local grace period after upload (`LOGSHIP_RETENTION_GRACE_HOURS`)
    pub retention_grace: Duration,
    /// Attempt ceiling that marks a file as stuck (`LOGSHIP_ALERT_AFTER_ATTEMPTS`)
    pub alert_after_attempts: u32,
    /// Ingestion listen address (`LOGSHIP_LISTEN_ADDR`)
    pub listen_addr: SocketAddr,
    /// Maximum events per batch (`LOGSHIP_MAX_BATCH_EVENTS`)
    pub max_batch_events: usize,
    /// Concurrent batch limit (`LOGSHIP_MAX_CONCURRENT_BATCHES`)
    pub max_concurrent_batches: usize,
    /// Batch rate limit (`LOGSHIP_MAX_BATCHES_PER_SEC`)
    pub max_batches_per_second: u32,
}

impl Default for LogshipConfig {
    fn default() -> Self {
        LogshipConfig {
            remote: RemoteConfig {
                access_key_id: None,
                secret_access_key: None,
                endpoint: None,
                bucket: None,
                region: "ap-southeast-1".to_string(),
                key_prefix: "logs".to_string(),
            },
            data_dir: PathBuf::from("./logship-data"),
            upload_interval: Duration::from_secs(120 * 60),
            metrics_interval: Duration::from_secs(60),
            slow_request_threshold: Duration::from_millis(1000),
            buffer_max_items: 100,
            buffer_max_age: Duration::from_secs(10),
            upload_concurrency: 4,
            backoff_base: Duration::from_secs(30),
            backoff_cap: Duration::from_secs(2 * 60 * 60),
            max_file_bytes: 10 * 1024 * 1024,
            max_file_age: Duration::from_secs(60 * 60),
            retention_grace: Duration::from_secs(24 * 60 * 60),
            alert_after_attempts: 10,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8088)),
            max_batch_events: 500,
            max_concurrent_batches: 32,
            max_batches_per_second: 200,
        }
    }
}

impl LogshipConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration from a map (tests, embedded use).
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Read configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(&lookup);
        let defaults = LogshipConfig::default();

        let config = LogshipConfig {
            remote: RemoteConfig {
                access_key_id: env.string("AWS_ACCESS_KEY_ID"),
                secret_access_key: env.string("AWS_SECRET_ACCESS_KEY"),
                endpoint: env.string("LOGSHIP_S3_ENDPOINT"),
                bucket: env.string("LOG_BUCKET_NAME"),
                region: env.string("AWS_REGION").unwrap_or(defaults.remote.region),
                key_prefix: env
                    .string("LOGSHIP_KEY_PREFIX")
                    .unwrap_or(defaults.remote.key_prefix),
            },
            data_dir: env
                .string("LOGSHIP_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            upload_interval: env
                .parse::<u64>("UPLOAD_INTERVAL_MINUTES")?
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(defaults.upload_interval),
            metrics_interval: env
                .parse::<u64>("LOGSHIP_METRICS_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.metrics_interval),
            slow_request_threshold: env
                .parse::<u64>("LOGSHIP_SLOW_REQUEST_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.slow_request_threshold),
            buffer_max_items: env
                .parse("LOGSHIP_BUFFER_MAX_ITEMS")?
                .unwrap_or(defaults.buffer_max_items),
            buffer_max_age: env
                .parse::<u64>("LOGSHIP_BUFFER_MAX_AGE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.buffer_max_age),
            upload_concurrency: env
                .parse("LOGSHIP_UPLOAD_CONCURRENCY")?
                .unwrap_or(defaults.upload_concurrency),
            backoff_base: env
                .parse::<u64>("LOGSHIP_BACKOFF_BASE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.backoff_base),
            backoff_cap: env
                .parse::<u64>("LOGSHIP_BACKOFF_CAP_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.backoff_cap),
            max_file_bytes: env
                .parse::<u64>("LOGSHIP_MAX_FILE_MB")?
                .map(|mb| mb * 1024 * 1024)
                .unwrap_or(defaults.max_file_bytes),
            max_file_age: env
                .parse::<u64>("LOGSHIP_MAX_FILE_AGE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_file_age),
            retention_grace: env
                .parse::<u64>("LOGSHIP_RETENTION_GRACE_HOURS")?
                .map(|h| Duration::from_secs(h * 60 * 60))
                .unwrap_or(defaults.retention_grace),
            alert_after_attempts: env
                .parse("LOGSHIP_ALERT_AFTER_ATTEMPTS")?
                .unwrap_or(defaults.alert_after_attempts),
            listen_addr: env
                .parse("LOGSHIP_LISTEN_ADDR")?
                .unwrap_or(defaults.listen_addr),
            max_batch_events: env
                .parse("LOGSHIP_MAX_BATCH_EVENTS")?
                .unwrap_or(defaults.max_batch_events),
            max_concurrent_batches: env
                .parse("LOGSHIP_MAX_CONCURRENT_BATCHES")?
                .unwrap_or(defaults.max_concurrent_batches),
            max_batches_per_second: env
                .parse("LOGSHIP_MAX_BATCHES_PER_SEC")?
                .unwrap_or(defaults.max_batches_per_second),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate ranges and cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, bool); 9] = [
            ("UPLOAD_INTERVAL_MINUTES", !self.upload_interval.is_zero()),
            ("LOGSHIP_METRICS_INTERVAL_SECS", !self.metrics_interval.is_zero()),
            ("LOGSHIP_BUFFER_MAX_ITEMS", self.buffer_max_items > 0),
            ("LOGSHIP_BUFFER_MAX_AGE_SECS", !self.buffer_max_age.is_zero()),
            ("LOGSHIP_UPLOAD_CONCURRENCY", self.upload_concurrency > 0),
            ("LOGSHIP_MAX_FILE_MB", self.max_file_bytes > 0),
            ("LOGSHIP_MAX_BATCH_EVENTS", self.max_batch_events > 0),
            ("LOGSHIP_MAX_CONCURRENT_BATCHES", self.max_concurrent_batches > 0),
            ("LOGSHIP_MAX_BATCHES_PER_SEC", self.max_batches_per_second > 0),
        ];
        for (var, ok) in positive {
            if !ok {
                return Err(ConfigError::Invalid {
                    var,
                    value: "0".to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.backoff_cap < self.backoff_base {
            return Err(ConfigError::Invalid {
                var: "LOGSHIP_BACKOFF_CAP_SECS",
                value: self.backoff_cap.as_secs().to_string(),
                reason: "must be >= LOGSHIP_BACKOFF_BASE_SECS".to_string(),
            });
        }
        Ok(())
    }

    /// Directory holding log segments.
    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    /// Directory holding upload-state records.
    pub fn state_dir(&self) -> PathBuf {
        self.data_dir.join("state")
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is not set
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    /// A variable is set but unusable
    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        /// Variable name
        var: &'static str,
        /// Offending value
        value: String,
        /// Why it was rejected
        reason: String,
    },
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, var: &str) -> Option<String> {
        (self.0)(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.string(var) {
            None => Ok(None),
            Some(raw) => raw.parse::<T>().map(Some).map_err(|e| ConfigError::Invalid {
                var,
                value: raw,
                reason: e.to_string(),
            }),
        }
    }
}
