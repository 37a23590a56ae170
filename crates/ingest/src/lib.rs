//! Ingestion endpoint for client-side telemetry batches
//!
//! - [`IngestService`]: validates a batch event by event, applies admission
//!   control and persists the accepted events to the Log Store
//! - [`router`]: axum routes (`POST /api/logs/batch`, `GET /healthz`)
//! - [`traced`]: wraps a router so every request is recorded by the
//!   Request Tracer
//!
//! Rejections are reported per event and never retried by clients;
//! backpressure and store failures are retryable.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod http;
pub mod service;
pub mod validate;

pub use config::{IngestConfig, IngestConfigError};
pub use error::IngestError;
pub use http::{router, traced};
pub use service::{BatchMeta, BatchRequest, IngestReport, IngestService, IngestStats};
pub use validate::{parse_event, EventRejection};
