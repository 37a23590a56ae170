//! Size limits for events
//!
//! Limits are enforced when an event is built. Payloads over the limit are
//! truncated with a marker rather than rejected; messages over the limit are
//! rejected because the message is the event's tag.

use crate::error::{Error, Result};

/// Size limits for events
#[derive(Debug, Clone)]
pub struct Limits {
    /// Maximum serialized payload size in bytes (default: 64KB)
    pub max_payload_bytes: usize,

    /// Maximum message (tag) length in bytes (default: 256)
    pub max_message_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_payload_bytes: 64 * 1024,
            max_message_bytes: 256,
        }
    }
}

impl Limits {
    /// Create limits with small values for testing
    ///
    /// Useful for unit tests that need to exercise truncation without
    /// building very large payloads.
    pub fn with_small_limits() -> Self {
        Limits {
            max_payload_bytes: 128,
            max_message_bytes: 32,
        }
    }

    /// Validate a message tag.
    ///
    /// Returns `Err(Error::Validation)` when the message is empty or longer
    /// than `max_message_bytes`.
    pub fn validate_message(&self, message: &str) -> Result<()> {
        if message.trim().is_empty() {
            return Err(Error::validation("message", "must not be empty"));
        }
        if message.len() > self.max_message_bytes {
            return Err(Error::validation(
                "message",
                format!(
                    "length {} exceeds maximum {}",
                    message.len(),
                    self.max_message_bytes
                ),
            ));
        }
        Ok(())
    }
}
