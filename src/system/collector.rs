use std::time::Instant;

use color_eyre::Result;
use sysinfo::{
    Networks, Pid, Process, ProcessRefreshKind, ProcessesToUpdate, System, UpdateKind,
};

use super::platform;
use super::provider::{ProcessProvider, ScanEntry, SystemTimesProvider};
use super::snapshot::{CpuTimes, MachineInfo, MemorySnapshot, ProcessSample};

/// Real collaborator backed by sysinfo plus the platform extensions.
///
/// Owns one `System` handle for the life of the engine; every trait method
/// refreshes only what it needs.
pub struct SystemCollector {
    sys: System,
    networks: Networks,
    // fallback state for platforms without system-wide tick counters
    synth: CpuTimes,
    last_probe: Instant,
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCollector {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_all();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );
        SystemCollector {
            sys,
            networks: Networks::new_with_refreshed_list(),
            synth: CpuTimes::default(),
            last_probe: Instant::now(),
        }
    }

    fn refresh_kind() -> ProcessRefreshKind {
        ProcessRefreshKind::nothing()
            .with_memory()
            .with_cpu()
            .with_disk_usage()
            .with_cmd(UpdateKind::OnlyIfNotSet)
            .with_exe(UpdateKind::OnlyIfNotSet)
            .with_user(UpdateKind::OnlyIfNotSet)
    }

    fn sample_from(pid: u32, process: &Process) -> ProcessSample {
        let (kernel_time_ms, user_time_ms) = match platform::process_times(pid) {
            Some(t) => (t.kernel_ms, t.user_ms),
            // no kernel/user split available: book everything as user time
            None => (0, process.accumulated_cpu_time()),
        };
        let disk_ops = platform::process_disk_ops(pid).unwrap_or_else(|| {
            let usage = process.disk_usage();
            usage.total_read_bytes.saturating_add(usage.total_written_bytes)
        });

        ProcessSample {
            pid,
            parent_pid: process.parent().map(|p| p.as_u32()).unwrap_or(0),
            name: process.name().to_string_lossy().to_string(),
            description: process
                .exe()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            user: process
                .user_id()
                .map(|uid| format!("{uid:?}"))
                .unwrap_or_default(),
            command: process
                .cmd()
                .iter()
                .map(|s| s.to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join(" "),
            start_time: process.start_time(),
            thread_count: platform::process_thread_count(pid).unwrap_or(0),
            handle_count: platform::process_handle_count(pid).unwrap_or(0),
            base_priority: platform::process_priority(pid).unwrap_or(0),
            memory_bytes: process.memory(),
            kernel_time_ms,
            user_time_ms,
            disk_ops,
            gpu_time_ms: 0,
        }
    }

    /// Derive consistent idle/user counters from sysinfo's global usage
    /// figure on platforms without raw tick counters.
    fn synthesise_cpu_times(&mut self) -> CpuTimes {
        self.sys.refresh_cpu_all();
        let elapsed_ms = self.last_probe.elapsed().as_millis() as u64;
        self.last_probe = Instant::now();
        let cores = self.sys.cpus().len().max(1) as u64;
        let total = elapsed_ms.saturating_mul(cores);
        let busy = (f64::from(self.sys.global_cpu_usage()) / 100.0 * total as f64) as u64;
        self.synth.user_ms += busy.min(total);
        self.synth.idle_ms += total - busy.min(total);
        self.synth
    }
}

impl ProcessProvider for SystemCollector {
    fn scan(&mut self) -> Result<Vec<ScanEntry>> {
        self.sys
            .refresh_processes_specifics(ProcessesToUpdate::All, true, Self::refresh_kind());
        Ok(self
            .sys
            .processes()
            .iter()
            .map(|(pid, process)| Ok(Self::sample_from(pid.as_u32(), process)))
            .collect())
    }

    fn sample(&mut self, pid: u32) -> Option<ProcessSample> {
        let sys_pid = Pid::from_u32(pid);
        let refreshed = self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            Self::refresh_kind(),
        );
        if refreshed == 0 {
            return None;
        }
        self.sys
            .process(sys_pid)
            .map(|process| Self::sample_from(pid, process))
    }
}

impl SystemTimesProvider for SystemCollector {
    fn cpu_times(&mut self) -> Result<CpuTimes> {
        if let Some(times) = platform::system_cpu_times() {
            return Ok(times);
        }
        Ok(self.synthesise_cpu_times())
    }

    fn machine_info(&mut self) -> MachineInfo {
        self.sys.refresh_cpu_all();
        let cpu = self.sys.cpus().first();
        MachineInfo {
            machine_name: System::host_name().unwrap_or_default(),
            os_version: System::long_os_version().unwrap_or_default(),
            cpu_name: cpu.map(|c| c.brand().trim().to_string()).unwrap_or_default(),
            cpu_cores: self.sys.cpus().len() as u32,
            cpu_frequency_mhz: cpu.map(|c| c.frequency()).unwrap_or(0),
            total_memory: self.sys.total_memory(),
            total_page_file: self.sys.total_swap(),
        }
    }

    fn memory(&mut self) -> MemorySnapshot {
        self.sys.refresh_memory();
        MemorySnapshot {
            available_memory: self.sys.available_memory(),
            available_page_file: self.sys.free_swap(),
        }
    }

    fn network_totals(&mut self) -> (u64, u64) {
        self.networks.refresh(true);
        let mut received = 0u64;
        let mut transmitted = 0u64;
        for (_, data) in self.networks.iter() {
            received = received.saturating_add(data.total_received());
            transmitted = transmitted.saturating_add(data.total_transmitted());
        }
        (received, transmitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_includes_current_process() {
        let mut collector = SystemCollector::new();
        let scan = collector.scan().unwrap();
        let me = std::process::id();
        assert!(
            scan.iter()
                .any(|entry| matches!(entry, Ok(s) if s.pid == me))
        );
    }

    #[test]
    fn sample_of_current_process_has_identity() {
        let mut collector = SystemCollector::new();
        let sample = collector.sample(std::process::id()).unwrap();
        assert_eq!(sample.pid, std::process::id());
        assert!(!sample.name.is_empty());
    }

    #[test]
    fn machine_info_reports_cores() {
        let mut collector = SystemCollector::new();
        let info = collector.machine_info();
        assert!(info.cpu_cores >= 1);
        assert!(info.total_memory > 0);
    }

    #[test]
    fn cpu_times_are_monotonic() {
        let mut collector = SystemCollector::new();
        let a = collector.cpu_times().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let b = collector.cpu_times().unwrap();
        let before = a.idle_ms + a.kernel_ms + a.user_ms;
        let after = b.idle_ms + b.kernel_ms + b.user_ms;
        assert!(after >= before);
    }
}
