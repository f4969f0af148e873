use super::{PlatformExtensions, ProcessTimes};
use crate::system::snapshot::CpuTimes;

pub struct Platform;

/// Kernel USER_HZ. Configurable in theory, 100 on every mainstream kernel;
/// one tick is 10ms.
const TICK_MS: u64 = 10;

/// Fields of /proc/<pid>/stat after the comm field, zero-indexed:
/// state(0) ppid(1) pgrp(2) session(3) tty_nr(4) tpgid(5) flags(6)
/// minflt(7) cminflt(8) majflt(9) cmajflt(10) utime(11) stime(12)
/// cutime(13) cstime(14) priority(15) nice(16) num_threads(17)
fn stat_fields(pid: u32) -> Option<Vec<u64>> {
    let contents = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // comm may contain spaces and parens; fields start after the closing ')'
    let after_comm = contents.rfind(')')? + 1;
    Some(
        contents[after_comm..]
            .split_whitespace()
            .map(|f| f.parse::<i64>().unwrap_or(0).unsigned_abs())
            .collect(),
    )
}

impl PlatformExtensions for Platform {
    fn process_times(pid: u32) -> Option<ProcessTimes> {
        let fields = stat_fields(pid)?;
        let utime = *fields.get(11)?;
        let stime = *fields.get(12)?;
        Some(ProcessTimes {
            kernel_ms: stime * TICK_MS,
            user_ms: utime * TICK_MS,
        })
    }

    fn process_priority(pid: u32) -> Option<i32> {
        let contents = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        let after_comm = contents.rfind(')')? + 1;
        let fields: Vec<&str> = contents[after_comm..].split_whitespace().collect();
        fields.get(15)?.parse().ok()
    }

    fn process_disk_ops(pid: u32) -> Option<u64> {
        // syscr + syscw from /proc/<pid>/io: completed read and write syscalls
        let contents = std::fs::read_to_string(format!("/proc/{pid}/io")).ok()?;
        let mut reads = None;
        let mut writes = None;
        for line in contents.lines() {
            if let Some(val) = line.strip_prefix("syscr: ") {
                reads = val.trim().parse::<u64>().ok();
            } else if let Some(val) = line.strip_prefix("syscw: ") {
                writes = val.trim().parse::<u64>().ok();
            }
        }
        Some(reads?.saturating_add(writes?))
    }

    fn process_thread_count(pid: u32) -> Option<u32> {
        let fields = stat_fields(pid)?;
        u32::try_from(*fields.get(17)?).ok()
    }

    fn process_handle_count(pid: u32) -> Option<u32> {
        let entries = std::fs::read_dir(format!("/proc/{pid}/fd")).ok()?;
        Some(entries.count() as u32)
    }

    fn system_cpu_times() -> Option<CpuTimes> {
        // Aggregate "cpu " line of /proc/stat:
        // user nice system idle iowait irq softirq steal ...
        let contents = std::fs::read_to_string("/proc/stat").ok()?;
        let line = contents.lines().find(|l| l.starts_with("cpu "))?;
        let ticks: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .filter_map(|f| f.parse().ok())
            .collect();
        if ticks.len() < 7 {
            return None;
        }
        let user = ticks[0] + ticks[1];
        let kernel = ticks[2] + ticks[5] + ticks[6] + ticks.get(7).copied().unwrap_or(0);
        let idle = ticks[3] + ticks[4];
        Some(CpuTimes {
            idle_ms: idle * TICK_MS,
            kernel_ms: kernel * TICK_MS,
            user_ms: user * TICK_MS,
        })
    }
}
