//! Client-side event buffering for logship
//!
//! A producer that cannot write to the Log Store directly (a browser, a
//! remote service) accumulates events in an [`EventBuffer`] and flushes
//! batches to a [`DeliveryTarget`], normally the ingestion endpoint via
//! [`HttpTarget`].
//!
//! - `enqueue` never blocks: overflow drops the oldest event and counts it
//! - a flush triggers on size, on age of the oldest event, or on teardown
//! - a flush is split into batches the endpoint accepts
//! - a batch that failed retryably goes back to the front of the buffer,
//!   order preserved; a batch the endpoint refused as invalid is discarded

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod config;
pub mod error;
pub mod target;

pub use buffer::{BufferStats, EventBuffer, FlushOutcome};
pub use config::BufferConfig;
pub use error::DeliveryError;
pub use target::{DeliveryReceipt, DeliveryTarget, HttpTarget};
