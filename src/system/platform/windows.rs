use super::{PlatformExtensions, ProcessTimes};
use crate::system::snapshot::CpuTimes;

pub struct Platform;

#[cfg(target_os = "windows")]
use windows_sys::Win32::{
    Foundation::{CloseHandle, FILETIME, HANDLE},
    System::Threading::{
        GetPriorityClass, GetProcessHandleCount, GetProcessIoCounters, GetProcessTimes,
        GetSystemTimes, IO_COUNTERS, OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    },
};

#[cfg(target_os = "windows")]
fn filetime_ms(ft: &FILETIME) -> u64 {
    // FILETIME counts 100ns intervals
    (((ft.dwHighDateTime as u64) << 32) | ft.dwLowDateTime as u64) / 10_000
}

#[cfg(target_os = "windows")]
fn with_process_handle<T>(pid: u32, f: impl FnOnce(HANDLE) -> Option<T>) -> Option<T> {
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            return None;
        }
        let result = f(handle);
        CloseHandle(handle);
        result
    }
}

impl PlatformExtensions for Platform {
    #[cfg(target_os = "windows")]
    fn process_times(pid: u32) -> Option<ProcessTimes> {
        with_process_handle(pid, |handle| unsafe {
            let mut creation = std::mem::zeroed::<FILETIME>();
            let mut exit = std::mem::zeroed::<FILETIME>();
            let mut kernel = std::mem::zeroed::<FILETIME>();
            let mut user = std::mem::zeroed::<FILETIME>();
            if GetProcessTimes(handle, &mut creation, &mut exit, &mut kernel, &mut user) == 0 {
                return None;
            }
            Some(ProcessTimes {
                kernel_ms: filetime_ms(&kernel),
                user_ms: filetime_ms(&user),
            })
        })
    }

    #[cfg(not(target_os = "windows"))]
    fn process_times(_pid: u32) -> Option<ProcessTimes> {
        None
    }

    #[cfg(target_os = "windows")]
    fn process_priority(pid: u32) -> Option<i32> {
        with_process_handle(pid, |handle| unsafe {
            let prio = GetPriorityClass(handle);
            if prio == 0 { None } else { Some(prio as i32) }
        })
    }

    #[cfg(not(target_os = "windows"))]
    fn process_priority(_pid: u32) -> Option<i32> {
        None
    }

    #[cfg(target_os = "windows")]
    fn process_disk_ops(pid: u32) -> Option<u64> {
        with_process_handle(pid, |handle| unsafe {
            let mut counters = std::mem::zeroed::<IO_COUNTERS>();
            if GetProcessIoCounters(handle, &mut counters) == 0 {
                return None;
            }
            Some(
                counters
                    .ReadOperationCount
                    .saturating_add(counters.WriteOperationCount),
            )
        })
    }

    #[cfg(not(target_os = "windows"))]
    fn process_disk_ops(_pid: u32) -> Option<u64> {
        None
    }

    fn process_thread_count(_pid: u32) -> Option<u32> {
        None
    }

    #[cfg(target_os = "windows")]
    fn process_handle_count(pid: u32) -> Option<u32> {
        with_process_handle(pid, |handle| unsafe {
            let mut count: u32 = 0;
            if GetProcessHandleCount(handle, &mut count) == 0 {
                None
            } else {
                Some(count)
            }
        })
    }

    #[cfg(not(target_os = "windows"))]
    fn process_handle_count(_pid: u32) -> Option<u32> {
        None
    }

    #[cfg(target_os = "windows")]
    fn system_cpu_times() -> Option<CpuTimes> {
        unsafe {
            let mut idle = std::mem::zeroed::<FILETIME>();
            let mut kernel = std::mem::zeroed::<FILETIME>();
            let mut user = std::mem::zeroed::<FILETIME>();
            if GetSystemTimes(&mut idle, &mut kernel, &mut user) == 0 {
                return None;
            }
            let idle_ms = filetime_ms(&idle);
            // The kernel counter includes idle time
            Some(CpuTimes {
                idle_ms,
                kernel_ms: filetime_ms(&kernel).saturating_sub(idle_ms),
                user_ms: filetime_ms(&user),
            })
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn system_cpu_times() -> Option<CpuTimes> {
        None
    }
}
