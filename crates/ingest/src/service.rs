//! Batch ingestion: admission control, validation, persistence.

use crate::config::{IngestConfig, IngestConfigError};
use crate::error::IngestError;
use crate::validate::{parse_event, EventRejection};
use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use logship_core::{LogEvent, SharedClock};
use logship_durability::{EventSink, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

type GlobalLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Wire form of a client batch.
///
/// Events stay raw JSON so each one is validated on its own.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchRequest {
    /// Raw events
    #[serde(alias = "logs")]
    pub events: Vec<Value>,
    /// Metadata shared by every event of the batch
    #[serde(flatten)]
    pub meta: BatchMeta,
}

/// Batch-level metadata, merged into every accepted event's payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchMeta {
    /// Client-assigned batch id
    #[serde(default, alias = "batchId")]
    pub batch_id: Option<String>,
    /// Client session
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
    /// Authenticated user, when known
    #[serde(default, alias = "userId")]
    pub user_id: Option<String>,
    /// When the client sent the batch
    #[serde(default, alias = "clientTimestamp")]
    pub client_timestamp: Option<Value>,
}

impl BatchMeta {
    fn to_payload_fields(&self, received_at: chrono::DateTime<chrono::Utc>) -> Map<String, Value> {
        let mut fields = Map::new();
        if let Some(id) = &self.batch_id {
            fields.insert("batch_id".into(), Value::from(id.as_str()));
        }
        if let Some(id) = &self.session_id {
            fields.insert("session_id".into(), Value::from(id.as_str()));
        }
        if let Some(id) = &self.user_id {
            fields.insert("user_id".into(), Value::from(id.as_str()));
        }
        if let Some(ts) = self.client_timestamp.as_ref().filter(|v| !v.is_null()) {
            fields.insert("client_sent_at".into(), ts.clone());
        }
        fields.insert(
            "server_received_at".into(),
            Value::from(received_at.to_rfc3339()),
        );
        fields
    }
}

/// Outcome of an admitted batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Events persisted
    pub accepted: usize,
    /// Events refused
    pub rejected: usize,
    /// One entry per refused event
    pub errors: Vec<EventRejection>,
}

/// Endpoint counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    /// Batches admitted
    pub batches: u64,
    /// Events persisted
    pub accepted: u64,
    /// Events refused
    pub rejected: u64,
    /// Batches turned away by admission control
    pub backpressured: u64,
    /// Batches lost to store failures (clients retry them)
    pub store_failures: u64,
}

#[derive(Default)]
struct Counters {
    batches: AtomicU64,
    accepted: AtomicU64,
    rejected: AtomicU64,
    backpressured: AtomicU64,
    store_failures: AtomicU64,
}

/// Validates and persists client batches.
pub struct IngestService {
    sink: Arc<dyn EventSink>,
    config: IngestConfig,
    permits: Arc<Semaphore>,
    limiter: GlobalLimiter,
    clock: SharedClock,
    counters: Counters,
}

impl IngestService {
    /// Create a service writing to `sink`.
    pub fn new(
        sink: Arc<dyn EventSink>,
        config: IngestConfig,
        clock: SharedClock,
    ) -> Result<Self, IngestConfigError> {
        config.validate()?;
        let rate =
            NonZeroU32::new(config.max_batches_per_second).ok_or(IngestConfigError::ZeroRate)?;
        Ok(IngestService {
            sink,
            permits: Arc::new(Semaphore::new(config.max_concurrent_batches)),
            limiter: RateLimiter::direct(Quota::per_second(rate)),
            config,
            clock,
            counters: Counters::default(),
        })
    }

    /// Configuration in use.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest one batch.
    ///
    /// Empty and oversized batches are refused whole. Past the concurrency or rate
    /// bound the batch is turned away with [`IngestError::Backpressure`]
    /// before any work is done. Otherwise every valid event is persisted in
    /// one contiguous append and invalid ones are reported individually.
    pub async fn ingest(&self, request: BatchRequest) -> Result<IngestReport, IngestError> {
        let count = request.events.len();
        if count == 0 {
            return Err(IngestError::Validation("batch contains no events".into()));
        }
        if count > self.config.max_batch_events {
            return Err(IngestError::TooLarge {
                count,
                max: self.config.max_batch_events,
            });
        }

        if self.limiter.check().is_err() {
            self.counters.backpressured.fetch_add(1, Ordering::Relaxed);
            return Err(IngestError::Backpressure);
        }
        let _permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.counters.backpressured.fetch_add(1, Ordering::Relaxed);
                return Err(IngestError::Backpressure);
            }
        };

        let metadata = request.meta.to_payload_fields(self.clock.now());
        let mut accepted: Vec<LogEvent> = Vec::with_capacity(count);
        let mut errors = Vec::new();
        for (index, raw) in request.events.iter().enumerate() {
            match parse_event(index, raw, &metadata, &self.config.limits) {
                Ok(event) => accepted.push(event),
                Err(rejection) => errors.push(rejection),
            }
        }

        let n = accepted.len();
        if n > 0 {
            self.persist(accepted).await.map_err(|e| {
                self.counters.store_failures.fetch_add(1, Ordering::Relaxed);
                tracing::error!(target: "logship::ingest", error = %e, events = n, "Failed to persist batch");
                IngestError::Store(e)
            })?;
        }

        self.counters.batches.fetch_add(1, Ordering::Relaxed);
        self.counters.accepted.fetch_add(n as u64, Ordering::Relaxed);
        self.counters
            .rejected
            .fetch_add(errors.len() as u64, Ordering::Relaxed);

        tracing::debug!(
            target: "logship::ingest",
            batch_id = request.meta.batch_id.as_deref().unwrap_or("unknown"),
            accepted = n,
            rejected = errors.len(),
            "Ingested batch"
        );
        if !errors.is_empty() {
            tracing::info!(target: "logship::ingest", rejected = errors.len(), first = %errors[0].reason, "Rejected events in batch");
        }

        Ok(IngestReport {
            accepted: n,
            rejected: errors.len(),
            errors,
        })
    }

    async fn persist(&self, events: Vec<LogEvent>) -> Result<(), StoreError> {
        let sink = Arc::clone(&self.sink);
        tokio::task::spawn_blocking(move || sink.append_batch(&events))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))?
    }

    /// Current counters.
    pub fn stats(&self) -> IngestStats {
        IngestStats {
            batches: self.counters.batches.load(Ordering::Relaxed),
            accepted: self.counters.accepted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            backpressured: self.counters.backpressured.load(Ordering::Relaxed),
            store_failures: self.counters.store_failures.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    pub(crate) fn permits(&self) -> &Arc<Semaphore> {
        &self.permits
    }
}
