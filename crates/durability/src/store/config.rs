//! Log store configuration.

use std::time::Duration;

/// Log store configuration parameters.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum segment size in bytes (default: 10MB).
    ///
    /// A record that would push a non-empty segment past this size is
    /// written to a new segment instead.
    pub max_file_bytes: u64,

    /// Maximum segment age (default: 1 hour).
    pub max_file_age: Duration,

    /// fsync after every append (default: false).
    pub fsync_every_append: bool,

    /// Interval between background fsyncs when not syncing every append
    /// (default: 1s).
    pub sync_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            max_file_bytes: 10 * 1024 * 1024, // 10MB
            max_file_age: Duration::from_secs(3600),
            fsync_every_append: false,
            sync_interval: Duration::from_secs(1),
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set maximum segment size (builder pattern).
    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    /// Set maximum segment age (builder pattern).
    pub fn with_max_file_age(mut self, age: Duration) -> Self {
        self.max_file_age = age;
        self
    }

    /// Set per-append fsync (builder pattern).
    pub fn with_fsync_every_append(mut self, enabled: bool) -> Self {
        self.fsync_every_append = enabled;
        self
    }

    /// Set background sync interval (builder pattern).
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), StoreConfigError> {
        if self.max_file_bytes < 1024 {
            return Err(StoreConfigError::FileSizeTooSmall);
        }
        if self.max_file_age.is_zero() {
            return Err(StoreConfigError::ZeroFileAge);
        }
        Ok(())
    }

    /// Create a configuration optimized for testing (small segments).
    pub fn for_testing() -> Self {
        StoreConfig {
            max_file_bytes: 64 * 1024, // 64KB for faster rotation in tests
            max_file_age: Duration::from_secs(3600),
            fsync_every_append: false,
            sync_interval: Duration::from_millis(10),
        }
    }
}

impl From<&logship_core::LogshipConfig> for StoreConfig {
    fn from(config: &logship_core::LogshipConfig) -> Self {
        StoreConfig::default()
            .with_max_file_bytes(config.max_file_bytes)
            .with_max_file_age(config.max_file_age)
    }
}

/// Log store configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreConfigError {
    /// Segment size is too small (minimum 1KB).
    #[error("Maximum file size must be at least 1KB")]
    FileSizeTooSmall,

    /// Age threshold of zero would rotate on every append.
    #[error("Maximum file age must be non-zero")]
    ZeroFileAge,
}
