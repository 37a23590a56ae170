//! Request Tracer: per-request performance telemetry.
//!
//! Wraps a unit of work, measures elapsed time and resource deltas, and
//! emits one `REQUEST_LOG` event. Work slower than the threshold is tagged
//! `slow` and additionally reported as a `SLOW_REQUEST` warning.
//!
//! The wrapped work's result always passes through untouched; a failure to
//! read counters or write the event only degrades the telemetry.

pub mod resources;

pub use resources::{ProcessSampler, ResourceSampler, ResourceSnapshot};

use chrono::Utc;
use logship_core::{EventSource, Level, LogEvent, LogshipConfig, SharedClock};
use logship_durability::EventSink;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Message tag of a request trace.
pub const REQUEST_LOG: &str = "REQUEST_LOG";

/// Message tag of the slow-request warning.
pub const SLOW_REQUEST: &str = "SLOW_REQUEST";

/// Tracer configuration.
#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// Requests longer than this are tagged slow (default: 1000ms)
    pub slow_threshold: Duration,
}

impl Default for TracerConfig {
    fn default() -> Self {
        TracerConfig {
            slow_threshold: Duration::from_millis(1000),
        }
    }
}

impl TracerConfig {
    /// Set the slow threshold (builder pattern).
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = threshold;
        self
    }
}

impl From<&LogshipConfig> for TracerConfig {
    fn from(config: &LogshipConfig) -> Self {
        TracerConfig::default().with_slow_threshold(config.slow_request_threshold)
    }
}

/// What is being traced.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Operation verb, e.g. `POST`
    pub method: String,
    /// Operation target, e.g. `/api/logs/batch`
    pub target: String,
    /// Correlation id; generated when absent
    pub request_id: Option<String>,
}

impl RequestInfo {
    /// Describe a request.
    pub fn new(method: impl Into<String>, target: impl Into<String>) -> Self {
        RequestInfo {
            method: method.into(),
            target: target.into(),
            request_id: None,
        }
    }

    /// Attach a correlation id (builder pattern).
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }
}

/// Outcome of a traced unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceStatus {
    /// Completed normally
    Success,
    /// Failed, with a short description
    Error(String),
    /// Completed with an HTTP status code
    Http(u16),
}

impl TraceStatus {
    fn level(&self) -> Level {
        match self {
            TraceStatus::Success => Level::Info,
            TraceStatus::Error(_) => Level::Error,
            TraceStatus::Http(code) if *code >= 500 => Level::Error,
            TraceStatus::Http(code) if *code >= 400 => Level::Warn,
            TraceStatus::Http(_) => Level::Info,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            TraceStatus::Success => Value::from("success"),
            TraceStatus::Error(_) => Value::from("error"),
            TraceStatus::Http(code) => Value::from(*code),
        }
    }
}

/// Maps a unit of work's return value to a [`TraceStatus`].
pub trait TraceOutcome {
    /// Status to record.
    fn trace_status(&self) -> TraceStatus;
}

impl<T, E: fmt::Display> TraceOutcome for Result<T, E> {
    fn trace_status(&self) -> TraceStatus {
        match self {
            Ok(_) => TraceStatus::Success,
            Err(e) => TraceStatus::Error(e.to_string()),
        }
    }
}

impl TraceOutcome for () {
    fn trace_status(&self) -> TraceStatus {
        TraceStatus::Success
    }
}

/// Emits one trace event per unit of work.
pub struct RequestTracer {
    sink: Arc<dyn EventSink>,
    sampler: Arc<dyn ResourceSampler>,
    clock: SharedClock,
    config: TracerConfig,
}

impl RequestTracer {
    /// Create a tracer.
    pub fn new(
        sink: Arc<dyn EventSink>,
        sampler: Arc<dyn ResourceSampler>,
        clock: SharedClock,
        config: TracerConfig,
    ) -> Self {
        RequestTracer {
            sink,
            sampler,
            clock,
            config,
        }
    }

    /// Begin a trace; finish it with [`ActiveTrace::finish`].
    pub fn start(&self, info: RequestInfo) -> ActiveTrace<'_> {
        let request_id = info
            .request_id
            .clone()
            .unwrap_or_else(|| Utc::now().format("%Y%m%d%H%M%S%6f").to_string());
        ActiveTrace {
            tracer: self,
            info,
            request_id,
            started: Instant::now(),
            before: self.sampler.snapshot(),
        }
    }

    /// Trace a synchronous unit of work.
    pub fn trace<T, F>(&self, info: RequestInfo, f: F) -> T
    where
        T: TraceOutcome,
        F: FnOnce() -> T,
    {
        let active = self.start(info);
        let result = f();
        active.finish(result.trace_status());
        result
    }

    /// Trace an asynchronous unit of work.
    pub async fn trace_async<T, Fut>(&self, info: RequestInfo, fut: Fut) -> T
    where
        T: TraceOutcome,
        Fut: Future<Output = T>,
    {
        let active = self.start(info);
        let result = fut.await;
        active.finish(result.trace_status());
        result
    }

    fn emit(&self, events: &[LogEvent]) {
        if let Err(e) = self.sink.append_batch(events) {
            tracing::warn!(target: "logship::tracer", error = %e, "Failed to write request trace");
        }
    }
}

/// A trace in progress.
pub struct ActiveTrace<'a> {
    tracer: &'a RequestTracer,
    info: RequestInfo,
    request_id: String,
    started: Instant,
    before: ResourceSnapshot,
}

impl ActiveTrace<'_> {
    /// Correlation id of this request.
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Close the trace and write its event(s).
    pub fn finish(self, status: TraceStatus) {
        let elapsed = self.started.elapsed();
        let after = self.tracer.sampler.snapshot();
        let events = self.build_events(elapsed, &status, &self.before, &after);
        self.tracer.emit(&events);
    }

    fn build_events(
        &self,
        elapsed: Duration,
        status: &TraceStatus,
        before: &ResourceSnapshot,
        after: &ResourceSnapshot,
    ) -> Vec<LogEvent> {
        let now = self.tracer.clock.now();
        let duration_ms = (elapsed.as_secs_f64() * 1000.0 * 100.0).round() / 100.0;
        let slow = elapsed > self.tracer.config.slow_threshold;

        let mut builder = LogEvent::builder(EventSource::RequestTrace, REQUEST_LOG)
            .timestamp(now)
            .level(status.level())
            .field("method", self.info.method.as_str())
            .field("target", self.info.target.as_str())
            .field("request_id", self.request_id.as_str())
            .field("duration_ms", duration_ms)
            .field("status", status.to_value());

        if let TraceStatus::Error(message) = status {
            builder = builder.field("error", message.as_str());
        }
        if let (Some(b), Some(a)) = (before.rss_bytes, after.rss_bytes) {
            builder = builder.field("memory_delta_bytes", a as i64 - b as i64);
        }
        if let (Some(b), Some(a)) = (before.cpu_user, after.cpu_user) {
            builder = builder.field("cpu_user_delta_ms", millis(a.saturating_sub(b)));
        }
        if let (Some(b), Some(a)) = (before.cpu_system, after.cpu_system) {
            builder = builder.field("cpu_system_delta_ms", millis(a.saturating_sub(b)));
        }
        if let (Some(b), Some(a)) = (before.cpu_total(), after.cpu_total()) {
            builder = builder.field("cpu_time_delta_ms", millis(a.saturating_sub(b)));
        }
        if slow {
            builder = builder.field("slow", true);
        }

        let mut events = Vec::with_capacity(2);
        match builder.build() {
            Ok(event) => events.push(event),
            Err(e) => tracing::warn!(target: "logship::tracer", error = %e, "Failed to build request trace"),
        }

        if slow {
            let threshold_ms = self.tracer.config.slow_threshold.as_millis() as u64;
            tracing::warn!(
                target: "logship::tracer",
                method = %self.info.method,
                target_path = %self.info.target,
                duration_ms,
                threshold_ms,
                "Slow request"
            );
            if let Ok(event) = LogEvent::builder(EventSource::RequestTrace, SLOW_REQUEST)
                .timestamp(now)
                .level(Level::Warn)
                .field("method", self.info.method.as_str())
                .field("target", self.info.target.as_str())
                .field("request_id", self.request_id.as_str())
                .field("duration_ms", duration_ms)
                .field("threshold_ms", threshold_ms)
                .build()
            {
                events.push(event);
            }
        }
        events
    }
}

fn millis(d: Duration) -> f64 {
    (d.as_secs_f64() * 1000.0 * 100.0).round() / 100.0
}
