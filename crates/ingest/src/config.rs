//! Ingestion endpoint configuration.

use logship_core::{Limits, LogshipConfig};
use std::net::SocketAddr;

/// Ingestion endpoint configuration parameters.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Listen address (default: 0.0.0.0:8088).
    pub listen_addr: SocketAddr,

    /// Maximum events in one batch (default: 500).
    ///
    /// Larger batches are refused as a whole.
    pub max_batch_events: usize,

    /// Batches processed at the same time (default: 32).
    pub max_concurrent_batches: usize,

    /// Batches admitted per second across all clients (default: 200).
    pub max_batches_per_second: u32,

    /// Maximum request body size (default: 16MB).
    pub max_body_bytes: usize,

    /// Message and payload limits applied to each event.
    pub limits: Limits,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8088)),
            max_batch_events: 500,
            max_concurrent_batches: 32,
            max_batches_per_second: 200,
            max_body_bytes: 16 * 1024 * 1024,
            limits: Limits::default(),
        }
    }
}

impl IngestConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the listen address (builder pattern).
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Set the batch size bound (builder pattern).
    pub fn with_max_batch_events(mut self, max: usize) -> Self {
        self.max_batch_events = max;
        self
    }

    /// Set the concurrency bound (builder pattern).
    pub fn with_max_concurrent_batches(mut self, max: usize) -> Self {
        self.max_concurrent_batches = max;
        self
    }

    /// Set the global rate (builder pattern).
    pub fn with_max_batches_per_second(mut self, rate: u32) -> Self {
        self.max_batches_per_second = rate;
        self
    }

    /// Set per-event limits (builder pattern).
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), IngestConfigError> {
        if self.max_batch_events == 0 {
            return Err(IngestConfigError::ZeroBatchSize);
        }
        if self.max_concurrent_batches == 0 {
            return Err(IngestConfigError::ZeroConcurrency);
        }
        if self.max_batches_per_second == 0 {
            return Err(IngestConfigError::ZeroRate);
        }
        Ok(())
    }

    /// Small bounds for tests; binds an ephemeral localhost port.
    pub fn for_testing() -> Self {
        IngestConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            max_batch_events: 10,
            max_concurrent_batches: 4,
            max_batches_per_second: 1000,
            max_body_bytes: 1024 * 1024,
            limits: Limits::default(),
        }
    }
}

impl From<&LogshipConfig> for IngestConfig {
    fn from(config: &LogshipConfig) -> Self {
        IngestConfig::default()
            .with_listen_addr(config.listen_addr)
            .with_max_batch_events(config.max_batch_events)
            .with_max_concurrent_batches(config.max_concurrent_batches)
            .with_max_batches_per_second(config.max_batches_per_second)
    }
}

/// Ingestion configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestConfigError {
    /// A batch bound of zero would refuse everything.
    #[error("Maximum batch size must be non-zero")]
    ZeroBatchSize,

    /// No batch could ever be admitted.
    #[error("Maximum concurrent batches must be non-zero")]
    ZeroConcurrency,

    /// No batch could ever be admitted.
    #[error("Maximum batches per second must be non-zero")]
    ZeroRate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_environment_defaults() {
        let from_env = IngestConfig::from(&LogshipConfig::default());
        let default = IngestConfig::default();
        assert_eq!(from_env.max_batch_events, default.max_batch_events);
        assert_eq!(from_env.max_concurrent_batches, 32);
        assert_eq!(from_env.max_batches_per_second, 200);
        assert!(default.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            IngestConfig::new().with_max_batch_events(0).validate(),
            Err(IngestConfigError::ZeroBatchSize)
        );
        assert_eq!(
            IngestConfig::new().with_max_concurrent_batches(0).validate(),
            Err(IngestConfigError::ZeroConcurrency)
        );
        assert_eq!(
            IngestConfig::new().with_max_batches_per_second(0).validate(),
            Err(IngestConfigError::ZeroRate)
        );
        assert!(IngestConfig::for_testing().validate().is_ok());
    }
}
