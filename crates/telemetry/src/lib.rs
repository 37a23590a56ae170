//! Local telemetry producers for logship
//!
//! - Metrics Sampler: periodic host resource samples (`system-metric`)
//! - Request Tracer: per-request duration and resource deltas (`request-trace`)
//!
//! Both write straight into an [`EventSink`](logship_durability::EventSink).
//! Neither ever surfaces a telemetry failure to its caller.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod metrics;
pub mod tracer;

pub use error::MetricsError;
pub use metrics::{
    CpuMetrics, DiskMetrics, MemoryMetrics, MetricsSampler, MetricsSource, NetworkMetrics,
    ProcessMetrics, SamplerConfig, SysinfoSource,
};
pub use tracer::{
    ActiveTrace, ProcessSampler, RequestInfo, RequestTracer, ResourceSampler, ResourceSnapshot,
    TraceOutcome, TraceStatus, TracerConfig,
};
