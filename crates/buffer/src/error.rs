//! Delivery errors

use std::time::Duration;

/// Why a batch was not delivered.
///
/// Retryable errors leave the batch buffered; a permanent rejection
/// discards it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    /// Transport failure: offline, DNS, connection reset, timeout
    #[error("network error: {0}")]
    Network(String),

    /// Endpoint is over capacity; retry later
    #[error("endpoint backpressure")]
    Backpressure {
        /// Server-suggested delay, if any
        retry_after: Option<Duration>,
    },

    /// Endpoint refused the batch
    #[error("batch rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },
}

impl DeliveryError {
    /// Whether the endpoint asked the client to slow down.
    pub fn is_backpressure(&self) -> bool {
        matches!(self, DeliveryError::Backpressure { .. })
    }

    /// Whether resending the same batch cannot succeed: a 4xx answer other
    /// than 408 and 429 means the payload itself was refused.
    pub fn is_permanent(&self) -> bool {
        match self {
            DeliveryError::Rejected { status, .. } => {
                (400..500).contains(status) && *status != 408 && *status != 429
            }
            _ => false,
        }
    }
}
