//! [`MetricsSource`] backed by the `sysinfo` crate.

use super::{
    percent, round2, CpuMetrics, DiskMetrics, MemoryMetrics, MetricsSource, NetworkMetrics,
    ProcessMetrics,
};
use crate::error::MetricsError;
use sysinfo::{Disks, Networks, Pid, System};

const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Host metrics from `sysinfo`.
///
/// Keeps one `System`, `Disks` and `Networks` instance and refreshes only
/// the part a call needs. CPU utilization is measured between consecutive
/// refreshes, so the first sample after construction may read low.
pub struct SysinfoSource {
    system: System,
    disks: Disks,
    networks: Networks,
    pid: Option<Pid>,
    hostname: String,
}

impl SysinfoSource {
    /// Create a source and take the baseline CPU reading.
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        SysinfoSource {
            system,
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            pid: sysinfo::get_current_pid().ok(),
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for SysinfoSource {
    fn cpu(&mut self) -> Result<CpuMetrics, MetricsError> {
        self.system.refresh_cpu();
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            return Err(MetricsError::unavailable("cpu", "no CPUs reported"));
        }
        Ok(CpuMetrics {
            cpu_percent: self.system.global_cpu_info().cpu_usage(),
            cpu_count: cpus.len(),
            cpu_frequency_mhz: cpus[0].frequency(),
            cpu_per_core: cpus.iter().map(|c| c.cpu_usage()).collect(),
        })
    }

    fn memory(&mut self) -> Result<MemoryMetrics, MetricsError> {
        self.system.refresh_memory();
        let total = self.system.total_memory() as f64;
        if total == 0.0 {
            return Err(MetricsError::unavailable("memory", "total memory reported as zero"));
        }
        let used = self.system.used_memory() as f64;
        let swap_total = self.system.total_swap() as f64;
        let swap_used = self.system.used_swap() as f64;
        Ok(MemoryMetrics {
            total_mb: round2(total / MB),
            available_mb: round2(self.system.available_memory() as f64 / MB),
            used_mb: round2(used / MB),
            percent: percent(used, total),
            swap_total_mb: round2(swap_total / MB),
            swap_used_mb: round2(swap_used / MB),
            swap_percent: percent(swap_used, swap_total),
        })
    }

    fn disk(&mut self) -> Result<DiskMetrics, MetricsError> {
        self.disks.refresh();
        let (total, free) = self
            .disks
            .list()
            .iter()
            .fold((0u64, 0u64), |(t, f), d| (t + d.total_space(), f + d.available_space()));
        if total == 0 {
            return Err(MetricsError::unavailable("disk", "no disks reported"));
        }
        let used = total.saturating_sub(free);
        Ok(DiskMetrics {
            total_gb: round2(total as f64 / GB),
            used_gb: round2(used as f64 / GB),
            free_gb: round2(free as f64 / GB),
            percent: percent(used as f64, total as f64),
        })
    }

    fn network(&mut self) -> Result<NetworkMetrics, MetricsError> {
        self.networks.refresh();
        let mut metrics = NetworkMetrics {
            bytes_sent: 0,
            bytes_recv: 0,
            packets_sent: 0,
            packets_recv: 0,
            errors_in: 0,
            errors_out: 0,
        };
        for (_name, data) in self.networks.iter() {
            metrics.bytes_sent += data.total_transmitted();
            metrics.bytes_recv += data.total_received();
            metrics.packets_sent += data.total_packets_transmitted();
            metrics.packets_recv += data.total_packets_received();
            metrics.errors_in += data.total_errors_on_received();
            metrics.errors_out += data.total_errors_on_transmitted();
        }
        Ok(metrics)
    }

    fn processes(&mut self) -> Result<ProcessMetrics, MetricsError> {
        let pid = self
            .pid
            .ok_or_else(|| MetricsError::unavailable("processes", "current pid unknown"))?;
        self.system.refresh_processes();
        let process_count = self.system.processes().len();
        let process = self
            .system
            .process(pid)
            .ok_or_else(|| MetricsError::unavailable("processes", "current process not listed"))?;
        Ok(ProcessMetrics {
            process_count,
            pid: pid.as_u32(),
            memory_mb: round2(process.memory() as f64 / MB),
            uptime_seconds: process.run_time(),
        })
    }

    fn hostname(&self) -> String {
        self.hostname.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_memory_and_processes() {
        let mut source = SysinfoSource::new();
        let memory = source.memory().unwrap();
        assert!(memory.total_mb > 0.0);
        assert!(memory.percent <= 100.0);

        let processes = source.processes().unwrap();
        assert_eq!(processes.pid, std::process::id());
        assert!(processes.process_count >= 1);
    }

    #[test]
    fn test_network_never_fails() {
        let mut source = SysinfoSource::new();
        assert!(source.network().is_ok());
    }
}
