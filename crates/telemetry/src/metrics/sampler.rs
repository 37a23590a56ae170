//! Periodic metrics sampler.

use super::MetricsSource;
use crate::error::MetricsError;
use logship_core::{EventSource, Level, LogEvent, LogshipConfig, SharedClock};
use logship_durability::EventSink;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Message tag of a metrics sample.
pub const SYSTEM_METRICS: &str = "SYSTEM_METRICS";

/// Message tag of the warning emitted when categories are missing.
pub const METRICS_PARTIAL: &str = "METRICS_PARTIAL";

/// Sampler configuration.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Time between samples (default: 60s)
    pub interval: Duration,
    /// Emit a `METRICS_PARTIAL` warning event when a category fails
    pub emit_warnings: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            interval: Duration::from_secs(60),
            emit_warnings: true,
        }
    }
}

impl SamplerConfig {
    /// Set the interval (builder pattern).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Enable or disable warning events (builder pattern).
    pub fn with_emit_warnings(mut self, enabled: bool) -> Self {
        self.emit_warnings = enabled;
        self
    }

    /// Short interval for tests.
    pub fn for_testing() -> Self {
        SamplerConfig {
            interval: Duration::from_millis(20),
            emit_warnings: true,
        }
    }
}

impl From<&LogshipConfig> for SamplerConfig {
    fn from(config: &LogshipConfig) -> Self {
        SamplerConfig::default().with_interval(config.metrics_interval)
    }
}

/// Owned sampler instance: a source, a sink and a clock.
pub struct MetricsSampler {
    source: Mutex<Box<dyn MetricsSource>>,
    sink: Arc<dyn EventSink>,
    clock: SharedClock,
    config: SamplerConfig,
}

impl MetricsSampler {
    /// Create a sampler.
    pub fn new(
        source: Box<dyn MetricsSource>,
        sink: Arc<dyn EventSink>,
        clock: SharedClock,
        config: SamplerConfig,
    ) -> Self {
        MetricsSampler {
            source: Mutex::new(source),
            sink,
            clock,
            config,
        }
    }

    /// Read every category and build the sample event(s).
    ///
    /// Failed categories are left out of the sample. When warnings are
    /// enabled a second, WARN-level event names them.
    pub fn sample(&self) -> Vec<LogEvent> {
        let mut source = self.source.lock();
        let now = self.clock.now();

        let mut payload = Map::new();
        payload.insert("hostname".to_string(), Value::String(source.hostname()));
        let mut failures: Vec<MetricsError> = Vec::new();

        collect(&mut payload, &mut failures, "cpu", source.cpu());
        collect(&mut payload, &mut failures, "memory", source.memory());
        collect(&mut payload, &mut failures, "disk", source.disk());
        collect(&mut payload, &mut failures, "network", source.network());
        collect(&mut payload, &mut failures, "processes", source.processes());
        drop(source);

        let mut events = Vec::with_capacity(2);
        match LogEvent::builder(EventSource::SystemMetric, SYSTEM_METRICS)
            .timestamp(now)
            .fields(payload)
            .build()
        {
            Ok(event) => events.push(event),
            Err(e) => {
                tracing::warn!(target: "logship::sampler", error = %e, "Failed to build metrics event");
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                tracing::warn!(target: "logship::sampler", category = failure.category(), error = %failure, "Metric category unavailable");
            }
            if self.config.emit_warnings {
                let missing: Vec<Value> = failures
                    .iter()
                    .map(|f| Value::String(f.category().to_string()))
                    .collect();
                let errors: Map<String, Value> = failures
                    .iter()
                    .map(|f| (f.category().to_string(), Value::String(f.to_string())))
                    .collect();
                if let Ok(event) = LogEvent::builder(EventSource::SystemMetric, METRICS_PARTIAL)
                    .timestamp(now)
                    .level(Level::Warn)
                    .field("missing", missing)
                    .field("errors", errors)
                    .build()
                {
                    events.push(event);
                }
            }
        }
        events
    }

    /// Take one sample and write it to the sink.
    ///
    /// Returns how many events were written. Sink failures are logged.
    pub fn sample_and_write(&self) -> usize {
        let events = self.sample();
        match self.sink.append_batch(&events) {
            Ok(()) => events.len(),
            Err(e) => {
                tracing::warn!(target: "logship::sampler", error = %e, "Failed to write metrics sample");
                0
            }
        }
    }

    /// Run on a fixed interval until cancelled.
    ///
    /// Sampling runs on the blocking pool; the first sample is taken
    /// immediately.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!(target: "logship::sampler", interval = ?self.config.interval, "Metrics sampler started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let sampler = Arc::clone(&self);
                        if let Err(e) = tokio::task::spawn_blocking(move || sampler.sample_and_write()).await {
                            tracing::error!(target: "logship::sampler", error = %e, "Metrics sample task failed");
                        }
                    }
                }
            }

            tracing::info!(target: "logship::sampler", "Metrics sampler stopped");
        })
    }
}

fn collect<T: Serialize>(
    payload: &mut Map<String, Value>,
    failures: &mut Vec<MetricsError>,
    category: &'static str,
    reading: Result<T, MetricsError>,
) {
    match reading.map(|metrics| serde_json::to_value(metrics)) {
        Ok(Ok(value)) => {
            payload.insert(category.to_string(), value);
        }
        Ok(Err(e)) => failures.push(MetricsError::unavailable(category, e.to_string())),
        Err(e) => failures.push(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{CpuMetrics, DiskMetrics, MemoryMetrics, NetworkMetrics, ProcessMetrics};
    use logship_core::ManualClock;
    use logship_durability::MemorySink;

    /// Scripted source; categories listed in `broken` fail.
    struct FakeSource {
        broken: Vec<&'static str>,
    }

    impl FakeSource {
        fn check(&self, category: &'static str) -> Result<(), MetricsError> {
            if self.broken.contains(&category) {
                Err(MetricsError::unavailable(category, "permission denied"))
            } else {
                Ok(())
            }
        }
    }

    impl MetricsSource for FakeSource {
        fn cpu(&mut self) -> Result<CpuMetrics, MetricsError> {
            self.check("cpu")?;
            Ok(CpuMetrics {
                cpu_percent: 12.5,
                cpu_count: 4,
                cpu_frequency_mhz: 2400,
                cpu_per_core: vec![10.0, 15.0, 12.0, 13.0],
            })
        }

        fn memory(&mut self) -> Result<MemoryMetrics, MetricsError> {
            self.check("memory")?;
            Ok(MemoryMetrics {
                total_mb: 8192.0,
                available_mb: 4096.0,
                used_mb: 4096.0,
                percent: 50.0,
                swap_total_mb: 0.0,
                swap_used_mb: 0.0,
                swap_percent: 0.0,
            })
        }

        fn disk(&mut self) -> Result<DiskMetrics, MetricsError> {
            self.check("disk")?;
            Ok(DiskMetrics {
                total_gb: 100.0,
                used_gb: 30.0,
                free_gb: 70.0,
                percent: 30.0,
            })
        }

        fn network(&mut self) -> Result<NetworkMetrics, MetricsError> {
            self.check("network")?;
            Ok(NetworkMetrics {
                bytes_sent: 1,
                bytes_recv: 2,
                packets_sent: 3,
                packets_recv: 4,
                errors_in: 0,
                errors_out: 0,
            })
        }

        fn processes(&mut self) -> Result<ProcessMetrics, MetricsError> {
            self.check("processes")?;
            Ok(ProcessMetrics {
                process_count: 120,
                pid: 42,
                memory_mb: 64.0,
                uptime_seconds: 10,
            })
        }

        fn hostname(&self) -> String {
            "test-host".to_string()
        }
    }

    fn sampler(broken: Vec<&'static str>, sink: Arc<MemorySink>) -> MetricsSampler {
        MetricsSampler::new(
            Box::new(FakeSource { broken }),
            sink,
            ManualClock::starting_now(),
            SamplerConfig::for_testing(),
        )
    }

    #[test]
    fn test_full_sample_has_numeric_fields() {
        let sink = Arc::new(MemorySink::new());
        let events = sampler(vec![], sink).sample();
        assert_eq!(events.len(), 1);

        let event = &events[0];
        assert_eq!(event.source(), EventSource::SystemMetric);
        assert_eq!(event.message(), SYSTEM_METRICS);
        let payload = event.payload();
        assert_eq!(payload.get("hostname").unwrap(), "test-host");
        assert_eq!(payload.get("cpu").unwrap()["cpu_percent"], 12.5);
        assert_eq!(payload.get("memory").unwrap()["percent"], 50.0);
        assert_eq!(payload.get("processes").unwrap()["process_count"], 120);
    }

    #[test]
    fn test_failed_category_is_omitted_with_warning() {
        let sink = Arc::new(MemorySink::new());
        let events = sampler(vec!["disk", "network"], sink).sample();
        assert_eq!(events.len(), 2);

        let sample = &events[0];
        assert!(sample.payload().get("disk").is_none());
        assert!(sample.payload().get("network").is_none());
        assert!(sample.payload().get("cpu").is_some());

        let warning = &events[1];
        assert_eq!(warning.message(), METRICS_PARTIAL);
        assert_eq!(warning.level(), Level::Warn);
        assert_eq!(
            warning.payload().get("missing").unwrap(),
            &serde_json::json!(["disk", "network"])
        );
    }

    #[test]
    fn test_warnings_can_be_disabled() {
        let sampler = MetricsSampler::new(
            Box::new(FakeSource { broken: vec!["cpu"] }),
            Arc::new(MemorySink::new()),
            ManualClock::starting_now(),
            SamplerConfig::for_testing().with_emit_warnings(false),
        );
        assert_eq!(sampler.sample().len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_samples_until_cancelled() {
        let sink = Arc::new(MemorySink::new());
        let sampler = Arc::new(sampler(vec![], Arc::clone(&sink)));
        let cancel = CancellationToken::new();

        let handle = sampler.spawn(cancel.clone());
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        handle.await.unwrap();

        let written = sink.events().len();
        assert!(written >= 2, "expected several samples, got {}", written);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(sink.events().len(), written);
    }
}
