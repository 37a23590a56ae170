//! Bounded, flush-triggered event buffer.
//!
//! ```text
//! enqueue ──► [ oldest ... newest ] ──flush──► DeliveryTarget
//!                  ▲                      │
//!                  └──── failed batch ────┘  (back to the front)
//! ```
//!
//! The queue lives behind a short `parking_lot` critical section so
//! `enqueue` never waits on delivery. At most one flush is in flight; events
//! enqueued meanwhile queue up behind the batch being delivered.

use crate::config::BufferConfig;
use crate::error::DeliveryError;
use crate::target::DeliveryTarget;
use chrono::{DateTime, Utc};
use logship_core::{LogEvent, SharedClock};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Result of one flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered
    Empty,
    /// Every batch was acknowledged
    Delivered(usize),
    /// The endpoint refused some batches as invalid; those were discarded
    /// and the rest acknowledged
    Discarded {
        /// Events acknowledged
        delivered: usize,
        /// Events discarded
        rejected: usize,
        /// The last permanent rejection
        error: DeliveryError,
    },
    /// A retryable error stopped the flush; the undelivered events went back
    /// into the buffer
    Failed {
        /// Events acknowledged before the failure
        delivered: usize,
        /// Events put back
        requeued: usize,
        /// Events dropped because the buffer overflowed on requeue
        dropped: usize,
        /// Why delivery failed
        error: DeliveryError,
    },
}

/// Buffer counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BufferStats {
    /// Events waiting
    pub buffered: usize,
    /// Events lost to overflow
    pub dropped: u64,
    /// Events acknowledged by the target
    pub delivered: u64,
    /// Events discarded after a permanent rejection
    pub rejected: u64,
    /// Flushes that failed
    pub failed_flushes: u64,
}

struct Entry {
    event: LogEvent,
    enqueued_at: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    queue: VecDeque<Entry>,
    dropped: u64,
    delivered: u64,
    rejected: u64,
    failed_flushes: u64,
    /// Automatic triggers stay quiet until then after a failed flush
    retry_not_before: Option<DateTime<Utc>>,
}

/// Client-side event buffer.
pub struct EventBuffer {
    inner: Mutex<Inner>,
    flush_lock: tokio::sync::Mutex<()>,
    wake: Notify,
    target: Arc<dyn DeliveryTarget>,
    clock: SharedClock,
    config: BufferConfig,
}

impl EventBuffer {
    /// Create a buffer delivering to `target`.
    pub fn new(config: BufferConfig, target: Arc<dyn DeliveryTarget>, clock: SharedClock) -> Self {
        EventBuffer {
            inner: Mutex::new(Inner::default()),
            flush_lock: tokio::sync::Mutex::new(()),
            wake: Notify::new(),
            target,
            clock,
            config,
        }
    }

    /// Append an event. Never blocks on delivery.
    ///
    /// Over `max_items` the oldest buffered event is dropped and counted.
    /// Reaching `max_items` wakes the flusher.
    pub fn enqueue(&self, event: LogEvent) {
        let full = {
            let mut inner = self.inner.lock();
            inner.queue.push_back(Entry {
                event,
                enqueued_at: self.clock.now(),
            });
            while inner.queue.len() > self.config.max_items {
                inner.queue.pop_front();
                inner.dropped += 1;
            }
            inner.queue.len() >= self.config.max_items
        };
        if full {
            self.wake.notify_one();
        }
    }

    /// Whether an automatic flush is due at `now`: the buffer is full or the
    /// oldest event is at least `max_age` old.
    ///
    /// After a failed flush this stays `false` for `max_age`.
    pub fn should_flush(&self, now: DateTime<Utc>) -> bool {
        let inner = self.inner.lock();
        if inner.retry_not_before.is_some_and(|at| now < at) {
            return false;
        }
        let Some(oldest) = inner.queue.front() else {
            return false;
        };
        if inner.queue.len() >= self.config.max_items {
            return true;
        }
        let age = now.signed_duration_since(oldest.enqueued_at);
        age.to_std().map_or(false, |age| age >= self.config.max_age)
    }

    /// Deliver everything currently buffered, in batches of at most
    /// `max_batch_events`, oldest first.
    ///
    /// Waits for a flush already in flight. A permanently rejected batch is
    /// discarded and counted. A retryable failure stops the flush: the
    /// undelivered events return to the front of the buffer ahead of newer
    /// events, and if that overflows `max_items` the oldest are dropped and
    /// counted.
    pub async fn flush(&self) -> FlushOutcome {
        let _in_flight = self.flush_lock.lock().await;

        let mut pending: VecDeque<Entry> = {
            let mut inner = self.inner.lock();
            inner.queue.drain(..).collect()
        };
        if pending.is_empty() {
            return FlushOutcome::Empty;
        }

        let mut delivered = 0;
        let mut rejected = 0;
        let mut last_rejection = None;
        while !pending.is_empty() {
            let take = pending.len().min(self.config.max_batch_events);
            let events: Vec<LogEvent> = pending
                .iter()
                .take(take)
                .map(|e| e.event.clone())
                .collect();

            match self.target.deliver(&events).await {
                Ok(receipt) => {
                    pending.drain(..take);
                    delivered += take;
                    self.inner.lock().delivered += take as u64;
                    tracing::debug!(
                        target: "logship::buffer",
                        events = take,
                        accepted = receipt.accepted,
                        rejected = receipt.rejected,
                        "Flushed batch"
                    );
                }
                Err(error) if error.is_permanent() => {
                    pending.drain(..take);
                    rejected += take;
                    self.inner.lock().rejected += take as u64;
                    tracing::warn!(
                        target: "logship::buffer",
                        error = %error,
                        events = take,
                        "Batch refused by the endpoint; discarded"
                    );
                    last_rejection = Some(error);
                }
                Err(error) => return self.requeue(pending, delivered, error),
            }
        }

        self.inner.lock().retry_not_before = None;
        match last_rejection {
            Some(error) => FlushOutcome::Discarded {
                delivered,
                rejected,
                error,
            },
            None => FlushOutcome::Delivered(delivered),
        }
    }

    fn requeue(
        &self,
        pending: VecDeque<Entry>,
        delivered: usize,
        error: DeliveryError,
    ) -> FlushOutcome {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let pending_len = pending.len();
        let overflow = (pending_len + inner.queue.len()).saturating_sub(self.config.max_items);
        let dropped = overflow.min(pending_len);

        for entry in pending.into_iter().skip(dropped).rev() {
            inner.queue.push_front(entry);
        }
        inner.dropped += dropped as u64;
        inner.failed_flushes += 1;
        inner.retry_not_before = chrono::Duration::from_std(self.config.max_age)
            .ok()
            .map(|d| now + d);
        drop(inner);

        let requeued = pending_len - dropped;
        tracing::warn!(
            target: "logship::buffer",
            error = %error,
            requeued,
            dropped,
            "Flush failed; batch kept for retry"
        );
        FlushOutcome::Failed {
            delivered,
            requeued,
            dropped,
            error,
        }
    }

    /// Explicit teardown signal: flush now, ignoring the retry pause.
    pub async fn teardown(&self) -> FlushOutcome {
        self.flush().await
    }

    /// Flush whenever a trigger fires, until cancelled; then tear down.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> FlushOutcome {
        let mut ticker = tokio::time::interval(self.config.check_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.wake.notified() => {}
                _ = ticker.tick() => {}
            }
            if self.should_flush(self.clock.now()) {
                self.flush().await;
            }
        }

        self.teardown().await
    }

    /// Current counters.
    pub fn stats(&self) -> BufferStats {
        let inner = self.inner.lock();
        BufferStats {
            buffered: inner.queue.len(),
            dropped: inner.dropped,
            delivered: inner.delivered,
            rejected: inner.rejected,
            failed_flushes: inner.failed_flushes,
        }
    }

    /// Copy of the buffered events, oldest first.
    pub fn snapshot(&self) -> Vec<LogEvent> {
        self.inner
            .lock()
            .queue
            .iter()
            .map(|e| e.event.clone())
            .collect()
    }
}
