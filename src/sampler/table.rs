use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::metrics::{self, CpuMode};
use crate::system::provider::ScanEntry;
use crate::system::snapshot::ProcessSample;

/// The PID the handle-based platforms reserve for the idle pseudo-process.
const IDLE_PSEUDO_PID: u32 = 0;

/// One logical OS process tracked across sampling cycles.
///
/// The previous/current counter pairs carry the delta state; everything
/// else is refreshed from the latest sample. Counter history is serialised
/// out of published copies, only identity and derived metrics travel.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TrackedProcess {
    pub pid: u32,
    pub parent_pid: u32,
    pub name: String,
    pub description: String,
    pub user: String,
    pub command: String,
    pub start_time: u64,
    pub thread_count: u32,
    pub handle_count: u32,
    pub base_priority: i32,
    pub memory_bytes: u64,
    #[serde(skip)]
    pub prev_kernel_time_ms: u64,
    #[serde(skip)]
    pub prev_user_time_ms: u64,
    #[serde(skip)]
    pub curr_kernel_time_ms: u64,
    #[serde(skip)]
    pub curr_user_time_ms: u64,
    #[serde(skip)]
    pub prev_disk_ops: u64,
    #[serde(skip)]
    pub curr_disk_ops: u64,
    #[serde(skip)]
    pub prev_gpu_time_ms: u64,
    #[serde(skip)]
    pub curr_gpu_time_ms: u64,
    pub cpu_percent: f64,
    pub cpu_kernel_percent: f64,
    pub cpu_user_percent: f64,
    pub gpu_percent: f64,
    pub disk_ops_rate: f64,
}

impl TrackedProcess {
    fn new(sample: &ProcessSample) -> Self {
        let mut record = TrackedProcess {
            pid: sample.pid,
            ..TrackedProcess::default()
        };
        record.repopulate(sample);
        record
    }

    /// Copy identity and static fields from a fresh sample and stamp the
    /// previous counters so the next delta has a baseline.
    fn repopulate(&mut self, sample: &ProcessSample) {
        self.parent_pid = sample.parent_pid;
        self.name = sample.name.clone();
        self.description = sample.description.clone();
        self.user = sample.user.clone();
        self.command = sample.command.clone();
        self.start_time = sample.start_time;
        self.refresh_dynamic(sample);
        self.stamp_previous(sample);
    }

    /// PID reuse: the record keeps its slot in the table but all history
    /// and derived metrics restart from this sample.
    fn restart(&mut self, sample: &ProcessSample) {
        *self = TrackedProcess::new(sample);
    }

    /// Pre-sleep stamp: previous counters come from this cycle's scan so
    /// the post-sleep delta is well-defined.
    fn stamp_previous(&mut self, sample: &ProcessSample) {
        self.prev_kernel_time_ms = sample.kernel_time_ms;
        self.prev_user_time_ms = sample.user_time_ms;
        self.prev_disk_ops = sample.disk_ops;
        self.prev_gpu_time_ms = sample.gpu_time_ms;
    }

    fn refresh_dynamic(&mut self, sample: &ProcessSample) {
        self.thread_count = sample.thread_count;
        self.handle_count = sample.handle_count;
        self.base_priority = sample.base_priority;
        self.memory_bytes = sample.memory_bytes;
    }

    /// Post-sleep measurement: fold the second reading in and derive
    /// percentages. A degenerate denominator leaves the previous
    /// percentages in place.
    fn apply_measurement(&mut self, sample: &ProcessSample, denominator_ms: u64, window_ms: u64) {
        self.refresh_dynamic(sample);
        self.curr_kernel_time_ms = sample.kernel_time_ms;
        self.curr_user_time_ms = sample.user_time_ms;
        self.curr_disk_ops = sample.disk_ops;
        self.curr_gpu_time_ms = sample.gpu_time_ms;

        let delta_kernel = self.curr_kernel_time_ms.saturating_sub(self.prev_kernel_time_ms);
        let delta_user = self.curr_user_time_ms.saturating_sub(self.prev_user_time_ms);
        if let Some(total) = metrics::cpu_percent(delta_kernel + delta_user, denominator_ms) {
            self.cpu_percent = total;
            self.cpu_kernel_percent =
                metrics::cpu_percent(delta_kernel, denominator_ms).unwrap_or(0.0);
            self.cpu_user_percent =
                metrics::cpu_percent(delta_user, denominator_ms).unwrap_or(0.0);
        }
        let delta_gpu = self.curr_gpu_time_ms.saturating_sub(self.prev_gpu_time_ms);
        // GPU is always against a single-engine window, independent of mode
        if let Some(gpu) = metrics::cpu_percent(delta_gpu, window_ms) {
            self.gpu_percent = gpu;
        }
        self.disk_ops_rate = metrics::counter_rate(self.prev_disk_ops, self.curr_disk_ops, window_ms);
    }
}

/// Per-cycle bookkeeping from a reconciliation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// PIDs seen for the first time.
    pub created: usize,
    /// Records whose identity held and whose baseline was restamped.
    pub refreshed: usize,
    /// PID-reuse resets (start time changed under an existing PID).
    pub restarted: usize,
    /// Entries excluded this cycle: pseudo-processes and unreadable PIDs.
    pub skipped: usize,
    /// Records dropped because their PID left the enumeration.
    pub evicted: usize,
}

/// Outcome of the post-sleep measurement pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MeasureStats {
    pub measured: usize,
    /// Records dropped because the second read failed or the PID was
    /// recycled mid-window.
    pub vanished: usize,
}

/// The authoritative per-PID record set, owned exclusively by the sampler.
/// Consumers only ever see deep copies taken by [`TrackedTable::snapshot`].
#[derive(Debug, Default)]
pub struct TrackedTable {
    records: HashMap<u32, TrackedProcess>,
}

impl TrackedTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, pid: u32) -> Option<&TrackedProcess> {
        self.records.get(&pid)
    }

    /// Fold one enumeration pass into the table: create, restamp, restart
    /// on PID reuse, and evict what the scan no longer reports. Skipped
    /// entries never abort the pass.
    pub fn reconcile(&mut self, scan: &[ScanEntry]) -> ReconcileStats {
        let mut stats = ReconcileStats::default();
        let mut seen: HashSet<u32> = HashSet::with_capacity(scan.len());

        for entry in scan {
            let sample = match entry {
                Ok(sample) => sample,
                Err((_pid, _reason)) => {
                    stats.skipped += 1;
                    continue;
                }
            };
            if sample.pid == IDLE_PSEUDO_PID {
                stats.skipped += 1;
                continue;
            }
            match self.records.entry(sample.pid) {
                Entry::Occupied(mut slot) => {
                    let record = slot.get_mut();
                    if record.start_time == sample.start_time {
                        record.refresh_dynamic(sample);
                        record.stamp_previous(sample);
                        stats.refreshed += 1;
                    } else {
                        record.restart(sample);
                        stats.restarted += 1;
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(TrackedProcess::new(sample));
                    stats.created += 1;
                }
            }
            seen.insert(sample.pid);
        }

        let before = self.records.len();
        self.records.retain(|pid, _| seen.contains(pid));
        stats.evicted = before - self.records.len();
        stats
    }

    /// Second read of the cycle. `resample` fetches a fresh sample per PID;
    /// records it cannot produce (or whose start time changed under the
    /// window) drop out of this cycle entirely.
    pub fn measure<F>(
        &mut self,
        mut resample: F,
        mode: CpuMode,
        window_ms: u64,
        cores: u32,
    ) -> MeasureStats
    where
        F: FnMut(u32) -> Option<ProcessSample>,
    {
        let mut stats = MeasureStats::default();
        let denominator_ms = mode.denominator_ms(window_ms, cores);
        let pids: Vec<u32> = self.records.keys().copied().collect();

        for pid in pids {
            let keep = match resample(pid) {
                Some(sample) => {
                    let record = self
                        .records
                        .get_mut(&pid)
                        .filter(|r| r.start_time == sample.start_time);
                    match record {
                        Some(record) => {
                            record.apply_measurement(&sample, denominator_ms, window_ms);
                            true
                        }
                        None => false,
                    }
                }
                None => false,
            };
            if keep {
                stats.measured += 1;
            } else {
                self.records.remove(&pid);
                stats.vanished += 1;
            }
        }
        stats
    }

    /// Deep copy of every record for publication. The copies share no
    /// storage with the live table.
    pub fn snapshot(&self) -> Vec<TrackedProcess> {
        let mut processes: Vec<TrackedProcess> = self.records.values().cloned().collect();
        processes.sort_unstable_by_key(|p| p.pid);
        processes
    }

    pub fn thread_count_total(&self) -> u32 {
        self.records
            .values()
            .fold(0u32, |acc, r| acc.saturating_add(r.thread_count))
    }

    pub fn disk_rate_total(&self) -> f64 {
        self.records.values().map(|r| r.disk_ops_rate).sum()
    }

    pub fn gpu_percent_total(&self) -> f64 {
        self.records.values().map(|r| r.gpu_percent).sum()
    }
}
