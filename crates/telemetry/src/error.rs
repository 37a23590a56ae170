//! Error types for telemetry producers

/// A metric category could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    /// The platform does not expose this category
    #[error("{category} metrics unavailable: {reason}")]
    Unavailable {
        /// Category name (`cpu`, `memory`, ...)
        category: &'static str,
        /// Why it could not be read
        reason: String,
    },
}

impl MetricsError {
    /// Shorthand for [`MetricsError::Unavailable`].
    pub fn unavailable(category: &'static str, reason: impl Into<String>) -> Self {
        MetricsError::Unavailable {
            category,
            reason: reason.into(),
        }
    }

    /// Category that failed.
    pub fn category(&self) -> &'static str {
        match self {
            MetricsError::Unavailable { category, .. } => category,
        }
    }
}
