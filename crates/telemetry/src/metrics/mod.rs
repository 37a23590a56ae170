//! Host metrics sampling.
//!
//! A [`MetricsSource`] reads one category at a time so a failing category
//! only removes itself from the sample. [`MetricsSampler`] turns a round of
//! reads into one `SYSTEM_METRICS` event.

pub mod sampler;
pub mod sysinfo_source;

pub use sampler::{MetricsSampler, SamplerConfig};
pub use sysinfo_source::SysinfoSource;

use crate::error::MetricsError;
use serde::Serialize;

/// CPU utilization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CpuMetrics {
    /// Global utilization, 0-100
    pub cpu_percent: f32,
    /// Logical core count
    pub cpu_count: usize,
    /// Current frequency of the first core
    pub cpu_frequency_mhz: u64,
    /// Per-core utilization, 0-100
    pub cpu_per_core: Vec<f32>,
}

/// Memory and swap usage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryMetrics {
    /// Installed memory
    pub total_mb: f64,
    /// Memory available for new allocations
    pub available_mb: f64,
    /// Memory in use
    pub used_mb: f64,
    /// `used / total`, 0-100
    pub percent: f64,
    /// Swap size
    pub swap_total_mb: f64,
    /// Swap in use
    pub swap_used_mb: f64,
    /// `swap_used / swap_total`, 0-100
    pub swap_percent: f64,
}

/// Disk usage summed over mounted disks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskMetrics {
    /// Capacity
    pub total_gb: f64,
    /// Space in use
    pub used_gb: f64,
    /// Space free
    pub free_gb: f64,
    /// `used / total`, 0-100
    pub percent: f64,
}

/// Network counters summed over interfaces, cumulative since boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkMetrics {
    /// Bytes transmitted
    pub bytes_sent: u64,
    /// Bytes received
    pub bytes_recv: u64,
    /// Packets transmitted
    pub packets_sent: u64,
    /// Packets received
    pub packets_recv: u64,
    /// Receive errors
    pub errors_in: u64,
    /// Transmit errors
    pub errors_out: u64,
}

/// Process counts and the current process's footprint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessMetrics {
    /// Processes on the host
    pub process_count: usize,
    /// Current process id
    pub pid: u32,
    /// Current process resident memory
    pub memory_mb: f64,
    /// Seconds since the current process started
    pub uptime_seconds: u64,
}

/// Source of host metrics, one category per call.
pub trait MetricsSource: Send {
    /// CPU utilization.
    fn cpu(&mut self) -> Result<CpuMetrics, MetricsError>;

    /// Memory and swap.
    fn memory(&mut self) -> Result<MemoryMetrics, MetricsError>;

    /// Disk usage.
    fn disk(&mut self) -> Result<DiskMetrics, MetricsError>;

    /// Network counters.
    fn network(&mut self) -> Result<NetworkMetrics, MetricsError>;

    /// Process counts.
    fn processes(&mut self) -> Result<ProcessMetrics, MetricsError>;

    /// Host name attached to every sample.
    fn hostname(&self) -> String {
        "unknown".to_string()
    }
}

pub(crate) fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        round2(part / whole * 100.0)
    } else {
        0.0
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        assert_eq!(percent(1.0, 4.0), 25.0);
        assert_eq!(percent(1.0, 3.0), 33.33);
        assert_eq!(percent(5.0, 0.0), 0.0);
    }
}
