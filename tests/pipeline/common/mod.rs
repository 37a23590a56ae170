//! Shared fixtures for the pipeline tests.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use logship::core::{Clock, EventSource, Level, LogEvent, ManualClock};
use logship::durability::{read_events, EventSink, LogStore, StateStore, StoreConfig};
use logship::shipper::{MemoryObjectStore, ObjectStore, Shipper, ShipperConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A data directory, a log store on a manual clock and an in-memory bucket.
pub struct Pipeline {
    pub tmp: TempDir,
    pub clock: Arc<ManualClock>,
    pub store: Arc<LogStore>,
    pub remote: Arc<MemoryObjectStore>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_store_config(StoreConfig::default())
    }

    pub fn with_store_config(config: StoreConfig) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap());
        let store = LogStore::open_with_clock(tmp.path().join("logs"), config, clock.clone())
            .unwrap();
        Pipeline {
            tmp,
            clock,
            store: Arc::new(store),
            remote: Arc::new(MemoryObjectStore::new()),
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.tmp.path().join("logs")
    }

    pub fn state_dir(&self) -> PathBuf {
        self.tmp.path().join("state")
    }

    /// A shipper with its own state store handle, as a fresh process would
    /// open it.
    pub fn shipper(&self, config: ShipperConfig) -> Shipper {
        Shipper::new(
            self.log_dir(),
            StateStore::open(self.state_dir()).unwrap(),
            self.remote.clone(),
            self.clock.clone(),
            config,
        )
        .unwrap()
    }

    pub fn event(&self, i: usize) -> LogEvent {
        LogEvent::builder(EventSource::ClientEvent, format!("event-{}", i))
            .timestamp(self.clock.now())
            .level(if i % 5 == 0 { Level::Warn } else { Level::Info })
            .field("index", i as u64)
            .build()
            .unwrap()
    }

    /// Append `n` events and return them.
    pub fn write(&self, n: usize) -> Vec<LogEvent> {
        let events: Vec<_> = (0..n).map(|i| self.event(i)).collect();
        self.store.append_batch(&events).unwrap();
        events
    }

    /// Decompressed body of a stored object.
    pub async fn fetch(&self, key: &str) -> Vec<u8> {
        let body = self.remote.get(key).await.unwrap();
        zstd::decode_all(&body[..]).unwrap()
    }
}

/// Decode a log file body.
pub fn events_from_bytes(bytes: &[u8]) -> Vec<LogEvent> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("log-0000000000000-000001.seg");
    std::fs::write(&path, bytes).unwrap();
    read_events(&path).unwrap()
}
