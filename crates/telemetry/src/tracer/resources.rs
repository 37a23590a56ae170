//! Process resource counters for request tracing.

use parking_lot::Mutex;
use std::time::Duration;
use sysinfo::{Pid, System};

/// Resource counters at one instant. `None` means the counter could not
/// be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceSnapshot {
    /// Resident set size
    pub rss_bytes: Option<u64>,
    /// Accumulated user-mode CPU time
    pub cpu_user: Option<Duration>,
    /// Accumulated kernel-mode CPU time
    pub cpu_system: Option<Duration>,
}

impl ResourceSnapshot {
    /// Total CPU time, when both parts are known.
    pub fn cpu_total(&self) -> Option<Duration> {
        Some(self.cpu_user? + self.cpu_system?)
    }
}

/// Reads resource counters around a unit of work.
pub trait ResourceSampler: Send + Sync {
    /// Take a snapshot. Must not fail; unreadable counters are `None`.
    fn snapshot(&self) -> ResourceSnapshot;
}

/// Sampler for the current process.
///
/// Memory comes from `sysinfo`; CPU time from `getrusage` on unix.
pub struct ProcessSampler {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl ProcessSampler {
    /// Create a sampler for this process.
    pub fn new() -> Self {
        ProcessSampler {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }

    fn rss_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock();
        if !system.refresh_process(pid) {
            return None;
        }
        system.process(pid).map(|p| p.memory())
    }
}

impl Default for ProcessSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceSampler for ProcessSampler {
    fn snapshot(&self) -> ResourceSnapshot {
        let (cpu_user, cpu_system) = cpu_times();
        ResourceSnapshot {
            rss_bytes: self.rss_bytes(),
            cpu_user,
            cpu_system,
        }
    }
}

#[cfg(unix)]
fn cpu_times() -> (Option<Duration>, Option<Duration>) {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::uninit();
    // SAFETY: getrusage fills the struct on success and we only read it then
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return (None, None);
    }
    // SAFETY: rc == 0 means the kernel initialised the struct
    let usage = unsafe { usage.assume_init() };
    (Some(timeval(usage.ru_utime)), Some(timeval(usage.ru_stime)))
}

#[cfg(unix)]
fn timeval(tv: libc::timeval) -> Duration {
    Duration::from_secs(tv.tv_sec.max(0) as u64) + Duration::from_micros(tv.tv_usec.max(0) as u64)
}

#[cfg(not(unix))]
fn cpu_times() -> (Option<Duration>, Option<Duration>) {
    (None, None)
}
