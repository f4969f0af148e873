use libproc::libproc::pid_rusage::{RUsageInfoV2, pidrusage};

use super::{PlatformExtensions, ProcessTimes};
use crate::system::snapshot::CpuTimes;

pub struct Platform;

const NS_PER_MS: u64 = 1_000_000;

impl PlatformExtensions for Platform {
    fn process_times(pid: u32) -> Option<ProcessTimes> {
        // rusage gives Mach time units; close enough to nanoseconds for
        // window-relative deltas.
        let usage = pidrusage::<RUsageInfoV2>(pid as i32).ok()?;
        Some(ProcessTimes {
            kernel_ms: usage.ri_system_time / NS_PER_MS,
            user_ms: usage.ri_user_time / NS_PER_MS,
        })
    }

    fn process_priority(pid: u32) -> Option<i32> {
        // getpriority returns -1 both on error and as a valid priority;
        // errno disambiguates.
        unsafe { *libc::__error() = 0 };
        let prio = unsafe { libc::getpriority(libc::PRIO_PROCESS, pid as libc::id_t) };
        let errno = unsafe { *libc::__error() };
        if prio == -1 && errno != 0 { None } else { Some(prio) }
    }

    fn process_disk_ops(pid: u32) -> Option<u64> {
        let usage = pidrusage::<RUsageInfoV2>(pid as i32).ok()?;
        Some(
            usage
                .ri_diskio_bytesread
                .saturating_add(usage.ri_diskio_byteswritten),
        )
    }

    fn process_thread_count(_pid: u32) -> Option<u32> {
        None
    }

    fn process_handle_count(_pid: u32) -> Option<u32> {
        // macOS has no cheap open-descriptor count
        None
    }

    fn system_cpu_times() -> Option<CpuTimes> {
        // No host-wide tick counters without Mach host_statistics; the
        // collector synthesises consistent counters instead.
        None
    }
}
