use color_eyre::Result;

use super::snapshot::{CpuTimes, MachineInfo, MemorySnapshot, ProcessSample};

/// Why an enumerated process was left out of a sampling cycle.
///
/// None of these are errors: a skipped process is simply absent from this
/// cycle's results and gets another chance next cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// Platform pseudo-process, e.g. the PID 0 idle process.
    Reserved,
    /// The OS denied access to the process handle or its times.
    AccessDenied,
    /// The process exited between enumeration and the read.
    Vanished,
}

/// One entry from an enumeration pass: a full sample, or the PID plus the
/// reason it could not be read this cycle.
pub type ScanEntry = Result<ProcessSample, (u32, SkipReason)>;

/// Process enumeration contract.
///
/// Implementations must be safe to call every sampling cycle. Per-process
/// failures are expected and appear as `Err` entries in the scan; only a
/// failure of the enumeration itself makes `scan` return `Err`.
pub trait ProcessProvider: Send {
    fn scan(&mut self) -> Result<Vec<ScanEntry>>;

    /// Re-read a single process after the sampling window. `None` when the
    /// PID is gone or access is denied; the caller drops it for this cycle.
    fn sample(&mut self, pid: u32) -> Option<ProcessSample>;
}

/// System-times contract: whole-machine tick counters and totals.
pub trait SystemTimesProvider: Send {
    /// Current idle/kernel/user counters. Two calls bracket one sampling
    /// window; units must be consistent between them.
    fn cpu_times(&mut self) -> Result<CpuTimes>;

    fn machine_info(&mut self) -> MachineInfo;

    fn memory(&mut self) -> MemorySnapshot;

    /// Cumulative network byte counters since boot: (received, transmitted).
    fn network_totals(&mut self) -> (u64, u64);
}
