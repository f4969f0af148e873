use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::eyre;

use taskmeter::sampler::engine::{Engine, EngineOptions, Update, UpdateFn};
use taskmeter::sampler::metrics::CpuMode;
use taskmeter::system::provider::{
    ProcessProvider, ScanEntry, SkipReason, SystemTimesProvider,
};
use taskmeter::system::snapshot::{
    CpuTimes, MachineInfo, MemorySnapshot, ProcessSample,
};

/// Everything the collector serves for one sampling cycle: the pre-sleep
/// scan, the post-sleep resamples, and the two bracketing tick readings.
#[derive(Clone, Default)]
struct CyclePlan {
    scan: Vec<ProcessSample>,
    skipped: Vec<(u32, SkipReason)>,
    resamples: HashMap<u32, ProcessSample>,
    before: CpuTimes,
    after: CpuTimes,
}

impl CyclePlan {
    fn with_ticks(mut self, before: CpuTimes, after: CpuTimes) -> Self {
        self.before = before;
        self.after = after;
        self
    }

    fn scanning(mut self, sample: ProcessSample) -> Self {
        self.scan.push(sample);
        self
    }

    fn skipping(mut self, pid: u32, reason: SkipReason) -> Self {
        self.skipped.push((pid, reason));
        self
    }

    fn resampling(mut self, sample: ProcessSample) -> Self {
        self.resamples.insert(sample.pid, sample);
        self
    }
}

struct ScriptedCollector {
    plans: VecDeque<CyclePlan>,
    active: CyclePlan,
    time_reads: usize,
    cores: u32,
    /// Replay the last plan forever instead of running dry.
    repeat_last: bool,
}

impl ScriptedCollector {
    fn new(plans: Vec<CyclePlan>, cores: u32) -> Self {
        ScriptedCollector {
            plans: plans.into(),
            active: CyclePlan::default(),
            time_reads: 0,
            cores,
            repeat_last: false,
        }
    }

    fn repeating(mut self) -> Self {
        self.repeat_last = true;
        self
    }
}

impl ProcessProvider for ScriptedCollector {
    fn scan(&mut self) -> Result<Vec<ScanEntry>> {
        if let Some(plan) = self.plans.pop_front() {
            if self.repeat_last && self.plans.is_empty() {
                self.plans.push_back(plan.clone());
            }
            self.active = plan;
        } else if !self.repeat_last {
            return Err(eyre!("scripted collector ran out of cycles"));
        }
        self.time_reads = 0;
        let mut entries: Vec<ScanEntry> =
            self.active.scan.iter().cloned().map(Ok).collect();
        entries.extend(self.active.skipped.iter().map(|&skip| Err(skip)));
        Ok(entries)
    }

    fn sample(&mut self, pid: u32) -> Option<ProcessSample> {
        self.active.resamples.get(&pid).cloned()
    }
}

impl SystemTimesProvider for ScriptedCollector {
    fn cpu_times(&mut self) -> Result<CpuTimes> {
        self.time_reads += 1;
        Ok(if self.time_reads <= 1 {
            self.active.before
        } else {
            self.active.after
        })
    }

    fn machine_info(&mut self) -> MachineInfo {
        MachineInfo {
            machine_name: "scripted".to_string(),
            cpu_cores: self.cores,
            total_memory: 1024,
            ..MachineInfo::default()
        }
    }

    fn memory(&mut self) -> MemorySnapshot {
        MemorySnapshot {
            available_memory: 512,
            available_page_file: 256,
        }
    }

    fn network_totals(&mut self) -> (u64, u64) {
        (0, 0)
    }
}

/// A collector whose enumeration panics outright, for the unwind path.
struct PanickingCollector;

impl ProcessProvider for PanickingCollector {
    fn scan(&mut self) -> Result<Vec<ScanEntry>> {
        panic!("enumeration backend fault");
    }

    fn sample(&mut self, _pid: u32) -> Option<ProcessSample> {
        None
    }
}

impl SystemTimesProvider for PanickingCollector {
    fn cpu_times(&mut self) -> Result<CpuTimes> {
        Ok(CpuTimes::default())
    }

    fn machine_info(&mut self) -> MachineInfo {
        MachineInfo {
            cpu_cores: 1,
            ..MachineInfo::default()
        }
    }

    fn memory(&mut self) -> MemorySnapshot {
        MemorySnapshot::default()
    }

    fn network_totals(&mut self) -> (u64, u64) {
        (0, 0)
    }
}

/// A collector whose enumeration always fails, for the give-up path.
struct BrokenCollector;

impl ProcessProvider for BrokenCollector {
    fn scan(&mut self) -> Result<Vec<ScanEntry>> {
        Err(eyre!("enumeration backend unavailable"))
    }

    fn sample(&mut self, _pid: u32) -> Option<ProcessSample> {
        None
    }
}

impl SystemTimesProvider for BrokenCollector {
    fn cpu_times(&mut self) -> Result<CpuTimes> {
        Ok(CpuTimes::default())
    }

    fn machine_info(&mut self) -> MachineInfo {
        MachineInfo {
            cpu_cores: 1,
            ..MachineInfo::default()
        }
    }

    fn memory(&mut self) -> MemorySnapshot {
        MemorySnapshot::default()
    }

    fn network_totals(&mut self) -> (u64, u64) {
        (0, 0)
    }
}

fn sample(pid: u32, start_time: u64, kernel_ms: u64, user_ms: u64) -> ProcessSample {
    ProcessSample {
        pid,
        parent_pid: 1,
        name: format!("proc_{pid}"),
        start_time,
        thread_count: 1,
        memory_bytes: 1024,
        kernel_time_ms: kernel_ms,
        user_time_ms: user_ms,
        ..ProcessSample::default()
    }
}

fn ticks(idle_ms: u64, kernel_ms: u64, user_ms: u64) -> CpuTimes {
    CpuTimes {
        idle_ms,
        kernel_ms,
        user_ms,
    }
}

type SeenUpdates = Arc<Mutex<Vec<Update>>>;

fn capture() -> (SeenUpdates, UpdateFn) {
    let seen: SeenUpdates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: UpdateFn = Box::new(move |update| sink.lock().unwrap().push(update));
    (seen, callback)
}

fn options(mode: CpuMode, iterations: u64) -> EngineOptions {
    EngineOptions {
        sampling_delay: Duration::from_millis(1000),
        publish_interval: Duration::from_millis(100),
        cpu_mode: mode,
        iteration_limit: iterations,
    }
}

#[tokio::test(start_paused = true)]
async fn irix_mode_full_window_reads_one_hundred_percent() {
    let plan = CyclePlan::default()
        .with_ticks(ticks(0, 0, 0), ticks(1000, 500, 500))
        .scanning(sample(10, 5, 0, 0))
        .resampling(sample(10, 5, 400, 600));
    let (seen, callback) = capture();

    let engine = Engine::start(
        ScriptedCollector::new(vec![plan], 4),
        options(CpuMode::Irix, 1),
        callback,
    );
    engine.join().await.unwrap();

    let updates = seen.lock().unwrap();
    let last = updates.last().unwrap();
    let process = last.processes.iter().find(|p| p.pid == 10).unwrap();
    assert!((process.cpu_percent - 100.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn solaris_mode_divides_by_core_count() {
    // one core fully busy on a four-core machine reads 25%
    let plan = CyclePlan::default()
        .with_ticks(ticks(0, 0, 0), ticks(3000, 500, 500))
        .scanning(sample(10, 5, 0, 0))
        .resampling(sample(10, 5, 400, 600));
    let (seen, callback) = capture();

    let engine = Engine::start(
        ScriptedCollector::new(vec![plan], 4),
        options(CpuMode::Solaris, 1),
        callback,
    );
    engine.join().await.unwrap();

    let updates = seen.lock().unwrap();
    let process = updates.last().unwrap().processes[0].clone();
    assert!((process.cpu_percent - 25.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn identity_holds_and_deltas_advance_across_cycles() {
    let first = CyclePlan::default()
        .with_ticks(ticks(0, 0, 0), ticks(1000, 0, 0))
        .scanning(sample(10, 5, 100, 200))
        .resampling(sample(10, 5, 150, 250));
    // second cycle re-baselines from its own scan, not the stale counters
    let second = CyclePlan::default()
        .with_ticks(ticks(1000, 0, 0), ticks(2000, 0, 0))
        .scanning(sample(10, 5, 150, 250))
        .resampling(sample(10, 5, 250, 350));
    let (seen, callback) = capture();

    let engine = Engine::start(
        ScriptedCollector::new(vec![first, second], 1),
        options(CpuMode::Irix, 2),
        callback,
    );
    engine.join().await.unwrap();

    let updates = seen.lock().unwrap();
    let last = updates.last().unwrap();
    let process = last.processes.iter().find(|p| p.pid == 10).unwrap();
    assert_eq!(process.name, "proc_10");
    assert_eq!(process.parent_pid, 1);
    // cycle two delta is (250-150)+(350-250) = 200ms over a 1000ms window
    assert!((process.cpu_percent - 20.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn pid_reuse_starts_from_a_fresh_baseline() {
    let first = CyclePlan::default()
        .with_ticks(ticks(0, 0, 0), ticks(1000, 0, 0))
        .scanning(sample(10, 5, 90_000, 90_000))
        .resampling(sample(10, 5, 90_500, 90_500));
    // same PID, new start time, tiny counters: a recycled PID must not
    // inherit the old incarnation's delta
    let second = CyclePlan::default()
        .with_ticks(ticks(1000, 0, 0), ticks(2000, 0, 0))
        .scanning(sample(10, 99, 0, 0))
        .resampling(sample(10, 99, 50, 50));
    let (seen, callback) = capture();

    let engine = Engine::start(
        ScriptedCollector::new(vec![first, second], 1),
        options(CpuMode::Irix, 2),
        callback,
    );
    engine.join().await.unwrap();

    let updates = seen.lock().unwrap();
    let process = updates.last().unwrap().processes[0].clone();
    assert!((process.cpu_percent - 10.0).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn published_counts_are_mutually_consistent() {
    let first = CyclePlan::default()
        .with_ticks(ticks(0, 0, 0), ticks(1000, 0, 0))
        .scanning(sample(10, 5, 0, 0))
        .scanning(sample(11, 6, 0, 0))
        .skipping(0, SkipReason::Reserved)
        .skipping(999, SkipReason::AccessDenied)
        .resampling(sample(10, 5, 10, 10))
        .resampling(sample(11, 6, 10, 10));
    let second = CyclePlan::default()
        .with_ticks(ticks(1000, 0, 0), ticks(2000, 0, 0))
        .scanning(sample(11, 6, 20, 20))
        .resampling(sample(11, 6, 30, 30));
    let (seen, callback) = capture();

    let engine = Engine::start(
        ScriptedCollector::new(vec![first, second], 1),
        options(CpuMode::Irix, 2),
        callback,
    );
    engine.join().await.unwrap();

    let updates = seen.lock().unwrap();
    assert!(!updates.is_empty());
    for update in updates.iter() {
        assert_eq!(
            update.stats.process_count as usize,
            update.processes.len(),
            "stats and process list must come from the same cycle"
        );
    }
    // skipped PIDs never surface in any published snapshot
    for update in updates.iter() {
        assert!(update.processes.iter().all(|p| p.pid != 0 && p.pid != 999));
    }
    let last = updates.last().unwrap();
    assert_eq!(last.processes.len(), 1);
    assert_eq!(last.processes[0].pid, 11);
}

#[tokio::test(start_paused = true)]
async fn vanished_process_is_absent_from_the_cycle() {
    let plan = CyclePlan::default()
        .with_ticks(ticks(0, 0, 0), ticks(1000, 0, 0))
        .scanning(sample(10, 5, 0, 0))
        .scanning(sample(11, 6, 0, 0))
        // pid 10 has no resample: it exited during the window
        .resampling(sample(11, 6, 10, 10));
    let (seen, callback) = capture();

    let engine = Engine::start(
        ScriptedCollector::new(vec![plan], 1),
        options(CpuMode::Irix, 1),
        callback,
    );
    engine.join().await.unwrap();

    let updates = seen.lock().unwrap();
    let last = updates.last().unwrap();
    assert_eq!(last.processes.len(), 1);
    assert_eq!(last.processes[0].pid, 11);
    assert_eq!(last.stats.process_count, 1);
}

#[tokio::test(start_paused = true)]
async fn system_shares_follow_tick_deltas() {
    let plan = CyclePlan::default()
        .with_ticks(ticks(0, 0, 0), ticks(500, 250, 250))
        .scanning(sample(10, 5, 0, 0))
        .resampling(sample(10, 5, 0, 0));
    let (seen, callback) = capture();

    let engine = Engine::start(
        ScriptedCollector::new(vec![plan], 1),
        options(CpuMode::Irix, 1),
        callback,
    );
    engine.join().await.unwrap();

    let updates = seen.lock().unwrap();
    let stats = &updates.last().unwrap().stats;
    assert!((stats.percent_idle_time - 50.0).abs() < 1e-9);
    assert!((stats.percent_kernel_time - 25.0).abs() < 1e-9);
    assert!((stats.percent_user_time - 25.0).abs() < 1e-9);
    assert_eq!(stats.machine_name, "scripted");
    assert_eq!(stats.available_memory, 512);
}

#[tokio::test(start_paused = true)]
async fn stop_converges_and_silences_updates() {
    let plan = CyclePlan::default()
        .with_ticks(ticks(0, 0, 0), ticks(1000, 0, 0))
        .scanning(sample(10, 5, 0, 0))
        .resampling(sample(10, 5, 10, 10));
    let (seen, callback) = capture();

    let engine = Engine::start(
        ScriptedCollector::new(vec![plan], 1).repeating(),
        options(CpuMode::Irix, 0),
        callback,
    );

    // let a few cycles complete, then stop mid-sleep
    tokio::time::sleep(Duration::from_millis(3500)).await;
    engine.stop().await.unwrap();

    let count_at_stop = seen.lock().unwrap().len();
    assert!(count_at_stop > 0);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(
        seen.lock().unwrap().len(),
        count_at_stop,
        "no callbacks may fire after stop() returns"
    );
}

#[tokio::test(start_paused = true)]
async fn repeated_cycle_failures_surface_at_shutdown() {
    let (seen, callback) = capture();

    let engine = Engine::start(BrokenCollector, options(CpuMode::Solaris, 0), callback);
    let err = engine.join().await.unwrap_err();

    assert!(err.to_string().contains("sampler"));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_cycles_back_off_a_full_window_before_retrying() {
    let (_, callback) = capture();
    let started = tokio::time::Instant::now();

    let engine = Engine::start(BrokenCollector, options(CpuMode::Solaris, 0), callback);
    engine.join().await.unwrap_err();

    // five failures with a window-length pause between retries
    assert!(started.elapsed() >= Duration::from_millis(4000));
}

#[tokio::test(start_paused = true)]
async fn sampler_panic_still_lets_join_return() {
    let (seen, callback) = capture();

    let engine = Engine::start(PanickingCollector, options(CpuMode::Irix, 0), callback);
    // the unwind skips the sampler's own cancel signal; join must still
    // converge rather than leaving the publisher parked forever
    let err = tokio::time::timeout(Duration::from_secs(3600), engine.join())
        .await
        .expect("join() must return after the sampler panics")
        .unwrap_err();

    assert!(err.to_string().contains("sampler"));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn nothing_is_published_before_the_first_cycle() {
    // sampling window much longer than the publish interval: the publisher
    // ticks many times with nothing to deliver
    let plan = CyclePlan::default()
        .with_ticks(ticks(0, 0, 0), ticks(1000, 0, 0))
        .scanning(sample(10, 5, 0, 0))
        .resampling(sample(10, 5, 10, 10));
    let (seen, callback) = capture();

    let engine = Engine::start(
        ScriptedCollector::new(vec![plan], 1),
        EngineOptions {
            sampling_delay: Duration::from_millis(1000),
            publish_interval: Duration::from_millis(10),
            cpu_mode: CpuMode::Irix,
            iteration_limit: 1,
        },
        callback,
    );
    engine.join().await.unwrap();

    let updates = seen.lock().unwrap();
    assert!(!updates.is_empty());
    for update in updates.iter() {
        assert!(
            !update.processes.is_empty(),
            "an empty default snapshot must never be published"
        );
    }
}
