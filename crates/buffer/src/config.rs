//! Event buffer configuration.

use logship_core::LogshipConfig;
use std::time::Duration;

/// Event buffer configuration parameters.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    /// Maximum buffered events; reaching it triggers a flush and exceeding
    /// it drops the oldest (default: 100)
    pub max_items: usize,

    /// Maximum age of the oldest buffered event before a flush (default: 10s).
    ///
    /// Also the pause after a failed flush before automatic triggers fire
    /// again.
    pub max_age: Duration,

    /// Largest batch sent in one request; a flush of more events is split
    /// (default: 500, the endpoint's default `max_batch_events`)
    pub max_batch_events: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        BufferConfig {
            max_items: 100,
            max_age: Duration::from_secs(10),
            max_batch_events: 500,
        }
    }
}

impl BufferConfig {
    /// Set the item bound (builder pattern).
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }

    /// Set the age bound (builder pattern).
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the per-request batch bound (builder pattern).
    pub fn with_max_batch_events(mut self, max_batch_events: usize) -> Self {
        self.max_batch_events = max_batch_events.max(1);
        self
    }

    /// Small, fast bounds for tests.
    pub fn for_testing() -> Self {
        BufferConfig {
            max_items: 3,
            max_age: Duration::from_millis(100),
            max_batch_events: 500,
        }
    }

    /// Interval at which the run loop checks the age trigger.
    pub fn check_interval(&self) -> Duration {
        (self.max_age / 4).max(Duration::from_millis(10))
    }
}

impl From<&LogshipConfig> for BufferConfig {
    fn from(config: &LogshipConfig) -> Self {
        BufferConfig::default()
            .with_max_items(config.buffer_max_items)
            .with_max_age(config.buffer_max_age)
            .with_max_batch_events(config.max_batch_events)
    }
}
