use serde::Serialize;

/// One process as read from the OS at a single point in time.
///
/// A sample is owned by the sampling cycle that fetched it and is never
/// mutated; identity and counters travel together so the tracked table can
/// detect PID reuse from the same read.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub parent_pid: u32,
    pub name: String,
    /// Executable path or file description, whichever the platform exposes.
    pub description: String,
    pub user: String,
    pub command: String,
    /// Platform-defined start timestamp. This is the identity anchor: a PID
    /// whose start time changes between cycles belongs to a new process.
    pub start_time: u64,
    pub thread_count: u32,
    pub handle_count: u32,
    pub base_priority: i32,
    pub memory_bytes: u64,
    /// Cumulative CPU time spent in kernel mode, milliseconds.
    pub kernel_time_ms: u64,
    /// Cumulative CPU time spent in user mode, milliseconds.
    pub user_time_ms: u64,
    /// Cumulative disk-operation counter; units are platform-defined but
    /// comparable across two readings of the same process.
    pub disk_ops: u64,
    /// Cumulative GPU time, milliseconds. Zero where no GPU accounting exists.
    pub gpu_time_ms: u64,
}

/// System-wide CPU tick counters, normalised to milliseconds.
///
/// Two readings bracket each sampling window; only their difference is
/// meaningful, the absolute values count from an arbitrary platform epoch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle_ms: u64,
    pub kernel_ms: u64,
    pub user_ms: u64,
}

/// Static machine facts, read once when the engine starts.
#[derive(Clone, Debug, Default, Serialize)]
pub struct MachineInfo {
    pub machine_name: String,
    pub os_version: String,
    pub cpu_name: String,
    pub cpu_cores: u32,
    pub cpu_frequency_mhz: u64,
    pub total_memory: u64,
    pub total_page_file: u64,
}

/// Live memory availability, re-read every cycle.
#[derive(Clone, Copy, Debug, Default)]
pub struct MemorySnapshot {
    pub available_memory: u64,
    pub available_page_file: u64,
}

/// Whole-system statistics for one published cycle. Pure data, no identity;
/// rebuilt from scratch every publish.
#[derive(Clone, Debug, Default, Serialize)]
pub struct SystemStatistics {
    pub machine_name: String,
    pub os_version: String,
    pub cpu_name: String,
    pub cpu_cores: u32,
    pub cpu_frequency_mhz: u64,
    pub total_memory: u64,
    pub available_memory: u64,
    pub total_page_file: u64,
    pub available_page_file: u64,
    pub percent_idle_time: f64,
    pub percent_kernel_time: f64,
    pub percent_user_time: f64,
    /// Sum of per-process disk-operation rates, operations per second.
    pub disk_usage_rate: f64,
    pub process_count: u32,
    pub thread_count: u32,
    pub network_received_total: u64,
    pub network_transmitted_total: u64,
    pub gpu_percent: f64,
}
