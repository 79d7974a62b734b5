// src/core/metrics/system.rs

//! A `MetricsProvider` backed by host-process introspection via `sysinfo`.
//!
//! The host process has no managed heap, so the "heap" region maps to resident
//! set size against the detected memory ceiling (cgroup limit when present,
//! total system memory otherwise), and collector/compilation statistics are
//! reported as absent.

use super::{
    GcRecord, MemoryRegion, MetricsProvider, MetricsSnapshot, RuntimeInfo, ThreadRecord,
    ThreadSummary,
};
use crate::core::ConsoleError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{info, warn};

// Platform-specific module for detecting cgroup memory limits on Linux.
#[cfg(target_os = "linux")]
mod linux_memory {
    use tracing::info;

    pub fn get_cgroup_memory_limit() -> Option<u64> {
        // Cgroup v2
        if let Ok(limit_str) = std::fs::read_to_string("/sys/fs/cgroup/memory.max") {
            if let Ok(limit) = limit_str.trim().parse::<u64>() {
                if limit < u64::MAX / 2 {
                    info!("Detected cgroup v2 memory limit: {} bytes", limit);
                    return Some(limit);
                }
            }
        }

        // Cgroup v1
        if let Ok(limit_str) =
            std::fs::read_to_string("/sys/fs/cgroup/memory/memory.limit_in_bytes")
        {
            if let Ok(limit) = limit_str.trim().parse::<u64>() {
                if limit < u64::MAX / 2 {
                    info!("Detected cgroup v1 memory limit: {} bytes", limit);
                    return Some(limit);
                }
            }
        }

        None
    }
}

// Stub module for non-Linux operating systems.
#[cfg(not(target_os = "linux"))]
mod other_os_memory {
    pub fn get_cgroup_memory_limit() -> Option<u64> {
        None
    }
}

// Thread enumeration is only available through procfs.
#[cfg(target_os = "linux")]
mod linux_threads {
    use super::ThreadRecord;

    pub fn thread_count() -> Option<u64> {
        let entries = std::fs::read_dir("/proc/self/task").ok()?;
        Some(entries.filter_map(|e| e.ok()).count() as u64)
    }

    pub fn list_threads() -> Vec<ThreadRecord> {
        let mut records = Vec::new();
        let Ok(entries) = std::fs::read_dir("/proc/self/task") else {
            return records;
        };
        for entry in entries.filter_map(|e| e.ok()) {
            let Some(tid) = entry
                .file_name()
                .to_str()
                .and_then(|s| s.parse::<u64>().ok())
            else {
                continue;
            };
            let base = entry.path();
            let name = std::fs::read_to_string(base.join("comm"))
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|_| "unknown".to_string());
            // Third field of /proc/<pid>/task/<tid>/stat is the state letter.
            let state = std::fs::read_to_string(base.join("stat"))
                .ok()
                .and_then(|s| {
                    let rest = s.rsplit(')').next()?;
                    rest.split_whitespace().next().map(describe_state)
                })
                .unwrap_or_else(|| "UNKNOWN".to_string());
            records.push(ThreadRecord {
                id: tid,
                name,
                state,
            });
        }
        records.sort_by_key(|r| r.id);
        records
    }

    fn describe_state(letter: &str) -> String {
        match letter {
            "R" => "RUNNING".to_string(),
            "S" => "SLEEPING".to_string(),
            "D" => "WAITING".to_string(),
            "T" | "t" => "STOPPED".to_string(),
            "Z" => "ZOMBIE".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod other_os_threads {
    use super::ThreadRecord;

    pub fn thread_count() -> Option<u64> {
        None
    }

    pub fn list_threads() -> Vec<ThreadRecord> {
        Vec::new()
    }
}

#[cfg(target_os = "linux")]
use linux_memory::get_cgroup_memory_limit;
#[cfg(target_os = "linux")]
use linux_threads::{list_threads, thread_count};
#[cfg(not(target_os = "linux"))]
use other_os_memory::get_cgroup_memory_limit;
#[cfg(not(target_os = "linux"))]
use other_os_threads::{list_threads, thread_count};

/// Host-process metrics provider.
pub struct SystemMetricsProvider {
    pid: u32,
    system: Mutex<System>,
    memory_ceiling: Option<u64>,
    peak_threads: AtomicU64,
}

impl SystemMetricsProvider {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();

        let memory_ceiling = match get_cgroup_memory_limit() {
            Some(limit) => Some(limit),
            None => {
                let total = system.total_memory();
                if total > 0 {
                    info!(
                        "No cgroup memory limit detected. Using total system memory ({} bytes) as the heap ceiling.",
                        total
                    );
                    Some(total)
                } else {
                    warn!("Could not determine a memory ceiling; heap ratio rules will degrade.");
                    None
                }
            }
        };

        Self {
            pid: std::process::id(),
            system: Mutex::new(system),
            memory_ceiling,
            peak_threads: AtomicU64::new(0),
        }
    }
}

impl Default for SystemMetricsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProvider for SystemMetricsProvider {
    fn snapshot(&self) -> Result<MetricsSnapshot, ConsoleError> {
        let mut system = self.system.lock();
        let pid = Pid::from_u32(self.pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = system.process(pid).ok_or_else(|| {
            ConsoleError::MetricsUnavailable(format!("process {} not visible to sysinfo", self.pid))
        })?;

        let used = process.memory();
        let committed = process.virtual_memory();

        let count = thread_count().unwrap_or(0);
        let peak = self
            .peak_threads
            .fetch_max(count, Ordering::Relaxed)
            .max(count);

        Ok(MetricsSnapshot {
            heap: MemoryRegion {
                init: None,
                used,
                committed,
                max: self.memory_ceiling,
            },
            non_heap: MemoryRegion::default(),
            // No collector instrumentation on a host process.
            gc: Vec::<GcRecord>::new(),
            threads: ThreadSummary {
                count,
                daemon_count: 0,
                peak_count: peak,
                total_started: 0,
                deadlocked: 0,
            },
            compilation_time_ms: None,
        })
    }

    fn runtime(&self) -> RuntimeInfo {
        let mut system = self.system.lock();
        let pid = Pid::from_u32(self.pid);
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = system.process(pid);

        RuntimeInfo {
            pid: self.pid,
            process_name: process
                .map(|p| p.name().to_string_lossy().into_owned())
                .unwrap_or_else(|| "unknown".to_string()),
            os: System::long_os_version().unwrap_or_else(|| "unknown".to_string()),
            kernel: System::kernel_version().unwrap_or_else(|| "unknown".to_string()),
            hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
            cpu_count: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            exe: process
                .and_then(|p| p.exe())
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            working_dir: process
                .and_then(|p| p.cwd())
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            args: process
                .map(|p| {
                    p.cmd()
                        .iter()
                        .map(|a| a.to_string_lossy().into_owned())
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn threads(&self) -> Vec<ThreadRecord> {
        list_threads()
    }

    fn properties(&self) -> Vec<(String, String)> {
        let runtime = self.runtime();
        let total_memory = {
            let mut system = self.system.lock();
            system.refresh_memory();
            system.total_memory()
        };

        let mut props = vec![
            ("host.name".to_string(), runtime.hostname),
            ("host.cpu.count".to_string(), runtime.cpu_count.to_string()),
            ("host.memory.total".to_string(), total_memory.to_string()),
            (
                "host.memory.ceiling".to_string(),
                self.memory_ceiling
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unlimited".to_string()),
            ),
            ("os.kernel".to_string(), runtime.kernel),
            ("os.version".to_string(), runtime.os),
            ("process.exe".to_string(), runtime.exe),
            ("process.name".to_string(), runtime.process_name),
            ("process.pid".to_string(), runtime.pid.to_string()),
            ("process.working_dir".to_string(), runtime.working_dir),
        ];
        props.sort_by(|a, b| a.0.cmp(&b.0));
        props
    }
}
