//! Shipper configuration.

use crate::backoff::Backoff;
use logship_core::LogshipConfig;
use std::time::Duration;

/// Shipper configuration parameters.
#[derive(Debug, Clone)]
pub struct ShipperConfig {
    /// Time between upload cycles (default: 2 hours).
    pub scan_interval: Duration,

    /// Upper bound on uploads in flight (default: 4).
    pub max_concurrency: usize,

    /// Retry delay schedule (default: 30s doubling to 2h).
    pub backoff: Backoff,

    /// zstd level (default: 3).
    pub compression_level: i32,

    /// How long uploaded files stay on disk (default: 24h).
    pub retention_grace: Duration,

    /// Attempt count at which a file is reported as stuck (default: 10).
    pub alert_after_attempts: u32,

    /// Host segment of object keys.
    pub hostname: String,

    /// Object key prefix (default: `logs`).
    pub key_prefix: String,

    /// Run one last cycle when the daemon is cancelled (default: true).
    pub final_cycle_on_shutdown: bool,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        ShipperConfig {
            scan_interval: Duration::from_secs(2 * 3600),
            max_concurrency: 4,
            backoff: Backoff::default(),
            compression_level: 3,
            retention_grace: Duration::from_secs(24 * 3600),
            alert_after_attempts: 10,
            hostname: local_hostname(),
            key_prefix: "logs".to_string(),
            final_cycle_on_shutdown: true,
        }
    }
}

impl ShipperConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the cycle interval (builder pattern).
    pub fn with_scan_interval(mut self, interval: Duration) -> Self {
        self.scan_interval = interval;
        self
    }

    /// Set the concurrency bound (builder pattern).
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Set the retry schedule (builder pattern).
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the zstd level (builder pattern).
    pub fn with_compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Set the local retention window (builder pattern).
    pub fn with_retention_grace(mut self, grace: Duration) -> Self {
        self.retention_grace = grace;
        self
    }

    /// Set the stuck-file threshold (builder pattern).
    pub fn with_alert_after_attempts(mut self, attempts: u32) -> Self {
        self.alert_after_attempts = attempts;
        self
    }

    /// Set the hostname used in keys (builder pattern).
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    /// Set the key prefix (builder pattern).
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Enable or disable the shutdown cycle (builder pattern).
    pub fn with_final_cycle_on_shutdown(mut self, enabled: bool) -> Self {
        self.final_cycle_on_shutdown = enabled;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ShipperConfigError> {
        if self.scan_interval.is_zero() {
            return Err(ShipperConfigError::ZeroInterval);
        }
        if self.max_concurrency == 0 {
            return Err(ShipperConfigError::ZeroConcurrency);
        }
        if self.backoff.base.is_zero() || self.backoff.cap < self.backoff.base {
            return Err(ShipperConfigError::InvalidBackoff);
        }
        if !(1..=22).contains(&self.compression_level) {
            return Err(ShipperConfigError::InvalidCompressionLevel(
                self.compression_level,
            ));
        }
        Ok(())
    }

    /// Fast cycles, immediate retries and a fixed hostname.
    pub fn for_testing() -> Self {
        ShipperConfig {
            scan_interval: Duration::from_millis(50),
            max_concurrency: 2,
            backoff: Backoff::new(Duration::from_secs(30), Duration::from_secs(600)),
            compression_level: 3,
            retention_grace: Duration::from_secs(3600),
            alert_after_attempts: 3,
            hostname: "test-host".to_string(),
            key_prefix: "logs".to_string(),
            final_cycle_on_shutdown: true,
        }
    }
}

impl From<&LogshipConfig> for ShipperConfig {
    fn from(config: &LogshipConfig) -> Self {
        ShipperConfig::default()
            .with_scan_interval(config.upload_interval)
            .with_max_concurrency(config.upload_concurrency)
            .with_backoff(Backoff::new(config.backoff_base, config.backoff_cap))
            .with_retention_grace(config.retention_grace)
            .with_alert_after_attempts(config.alert_after_attempts)
            .with_key_prefix(config.remote.key_prefix.clone())
    }
}

fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Shipper configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShipperConfigError {
    /// Cycles would run back to back.
    #[error("Scan interval must be non-zero")]
    ZeroInterval,

    /// No upload could ever run.
    #[error("Upload concurrency must be non-zero")]
    ZeroConcurrency,

    /// Backoff base is zero or above the cap.
    #[error("Backoff base must be non-zero and not above the cap")]
    InvalidBackoff,

    /// Outside zstd's level range.
    #[error("Compression level {0} is outside 1..=22")]
    InvalidCompressionLevel(i32),
}
