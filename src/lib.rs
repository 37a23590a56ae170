//! logship - telemetry collection and durable log shipping
//!
//! Local producers (metrics sampler, request tracer, ingestion endpoint)
//! append structured events to a rotated, append-only Log Store. The
//! Durable Shipper compresses closed log files and uploads them to object
//! storage, tracking each file's progress on disk so uploads survive
//! restarts and never duplicate.
//!
//! # Quick Start
//!
//! ```ignore
//! use logship::{durability::{EventSink, LogStore, StoreConfig}, core::{EventSource, LogEvent}};
//!
//! let store = LogStore::open("./logship-data/logs", StoreConfig::default())?;
//! store.append(&LogEvent::builder(EventSource::ClientEvent, "checkout").build()?)?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! sampler ─┐
//! tracer  ─┼─► LogStore ──rotate──► closed files ──► Shipper ──► ObjectStore
//! ingest  ─┘        ▲                                   │
//!                   │                                   └─► StateStore (per-file state)
//! EventBuffer ──HTTP┘
//! ```

pub use logship_buffer as buffer;
pub use logship_core as core;
pub use logship_durability as durability;
pub use logship_ingest as ingest;
pub use logship_shipper as shipper;
pub use logship_telemetry as telemetry;
