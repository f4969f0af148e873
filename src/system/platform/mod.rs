use crate::system::snapshot::CpuTimes;

/// Split CPU time for one process, milliseconds of kernel and user mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessTimes {
    pub kernel_ms: u64,
    pub user_ms: u64,
}

/// Per-OS counters the portable enumeration layer does not expose.
/// Every method is best-effort: `None` means the platform does not expose
/// the value (or denied it), and the collector falls back or reports zero.
pub trait PlatformExtensions {
    fn process_times(pid: u32) -> Option<ProcessTimes>;
    fn process_priority(pid: u32) -> Option<i32>;
    fn process_disk_ops(pid: u32) -> Option<u64>;
    fn process_thread_count(pid: u32) -> Option<u32>;
    fn process_handle_count(pid: u32) -> Option<u32>;
    /// System-wide idle/kernel/user counters in milliseconds.
    fn system_cpu_times() -> Option<CpuTimes>;
}

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "windows")]
mod windows;

#[cfg(target_os = "linux")]
use linux as platform_impl;
#[cfg(target_os = "macos")]
use macos as platform_impl;
#[cfg(target_os = "windows")]
use windows as platform_impl;

pub fn process_times(pid: u32) -> Option<ProcessTimes> {
    platform_impl::Platform::process_times(pid)
}

pub fn process_priority(pid: u32) -> Option<i32> {
    platform_impl::Platform::process_priority(pid)
}

pub fn process_disk_ops(pid: u32) -> Option<u64> {
    platform_impl::Platform::process_disk_ops(pid)
}

pub fn process_thread_count(pid: u32) -> Option<u32> {
    platform_impl::Platform::process_thread_count(pid)
}

pub fn process_handle_count(pid: u32) -> Option<u32> {
    platform_impl::Platform::process_handle_count(pid)
}

pub fn system_cpu_times() -> Option<CpuTimes> {
    platform_impl::Platform::system_cpu_times()
}
