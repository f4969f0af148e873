use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::eyre;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::metrics::{self, CpuMode, MIN_SAMPLING_DELAY_MS, SystemShares};
use super::table::TrackedTable;
use crate::system::provider::{ProcessProvider, SystemTimesProvider};
use crate::system::snapshot::{MachineInfo, SystemStatistics};
pub use super::table::TrackedProcess;

/// Consecutive failed cycles before the sampler gives up and surfaces the
/// error through `stop`/`join`.
const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Tuning knobs for one engine run.
#[derive(Clone, Copy, Debug)]
pub struct EngineOptions {
    /// Sampling window; clamped up to [`MIN_SAMPLING_DELAY_MS`].
    pub sampling_delay: Duration,
    /// Publisher cadence, independent of the sampling window.
    pub publish_interval: Duration,
    pub cpu_mode: CpuMode,
    /// Completed cycles before a clean exit; 0 runs until stopped.
    pub iteration_limit: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            sampling_delay: Duration::from_millis(1000),
            publish_interval: Duration::from_millis(1500),
            cpu_mode: CpuMode::default(),
            iteration_limit: 0,
        }
    }
}

impl EngineOptions {
    fn effective_delay(&self) -> Duration {
        self.sampling_delay
            .max(Duration::from_millis(MIN_SAMPLING_DELAY_MS))
    }
}

/// One published snapshot. Process copies and statistics always come from
/// the same sampling cycle.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Update {
    pub processes: Vec<TrackedProcess>,
    pub stats: SystemStatistics,
}

/// Subscriber callback. Runs on the publisher task, outside the buffer
/// lock; it must not block for long.
pub type UpdateFn = Box<dyn FnMut(Update) + Send>;

/// The double-buffered publication slot shared by the two loops. The lock
/// is only ever held for a copy-swap, never across a sleep.
#[derive(Debug, Default)]
struct Published {
    update: Update,
    /// Bumped once per completed cycle so the publisher can tell a fresh
    /// buffer from one it has already delivered.
    seq: u64,
    initialised: bool,
}

type SharedBuffer = Arc<Mutex<Published>>;

/// The sampling engine: one sampler task feeding the shared buffer, one
/// publisher task draining it to the subscriber.
pub struct Engine {
    cancel: watch::Sender<bool>,
    sampler: JoinHandle<Result<()>>,
    publisher: JoinHandle<Result<()>>,
}

impl Engine {
    /// Spawn both loops. `collector` serves as both collaborators and is
    /// owned by the sampler task.
    pub fn start<C>(collector: C, options: EngineOptions, on_update: UpdateFn) -> Engine
    where
        C: ProcessProvider + SystemTimesProvider + 'static,
    {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let buffer: SharedBuffer = Arc::new(Mutex::new(Published::default()));

        let sampler = tokio::spawn(sampler_loop(
            collector,
            options,
            Arc::clone(&buffer),
            cancel_rx.clone(),
            cancel_tx.clone(),
        ));
        let publisher = tokio::spawn(publisher_loop(
            options.publish_interval,
            buffer,
            cancel_rx,
            on_update,
        ));

        Engine {
            cancel: cancel_tx,
            sampler,
            publisher,
        }
    }

    /// Signal cancellation and wait for both loops to observe it. Loop
    /// failures are aggregated into the returned error, not swallowed.
    pub async fn stop(self) -> Result<()> {
        let _ = self.cancel.send(true);
        join_loops(self.cancel, self.sampler, self.publisher).await
    }

    /// Wait for the sampler to finish on its own (iteration limit) and the
    /// publisher to drain behind it.
    pub async fn join(self) -> Result<()> {
        join_loops(self.cancel, self.sampler, self.publisher).await
    }
}

async fn join_loops(
    cancel: watch::Sender<bool>,
    sampler: JoinHandle<Result<()>>,
    publisher: JoinHandle<Result<()>>,
) -> Result<()> {
    let mut failures: Vec<String> = Vec::new();
    // the sampler goes first: a panic unwinds past its own cancel send, so
    // the publisher is signalled again here before it is awaited
    match sampler.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => failures.push(format!("sampler: {err}")),
        Err(err) => failures.push(format!("sampler task: {err}")),
    }
    let _ = cancel.send(true);
    match publisher.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => failures.push(format!("publisher: {err}")),
        Err(err) => failures.push(format!("publisher task: {err}")),
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(eyre!("shutdown failures: {}", failures.join("; ")))
    }
}

enum CycleEnd {
    Completed,
    Cancelled,
}

async fn sampler_loop<C>(
    mut collector: C,
    options: EngineOptions,
    buffer: SharedBuffer,
    mut cancel: watch::Receiver<bool>,
    cancel_tx: watch::Sender<bool>,
) -> Result<()>
where
    C: ProcessProvider + SystemTimesProvider,
{
    let delay = options.effective_delay();
    let window_ms = delay.as_millis() as u64;
    let machine = collector.machine_info();
    let cores = machine.cpu_cores.max(1);
    debug!(
        window_ms,
        cores,
        mode = options.cpu_mode.label(),
        "sampler starting"
    );

    let mut table = TrackedTable::new();
    let mut shares = SystemShares::default();
    let mut iterations: u64 = 0;
    let mut consecutive_failures: u32 = 0;

    let exit = loop {
        if *cancel.borrow() {
            break Ok(());
        }
        let cycle = run_cycle(
            &mut collector,
            &mut table,
            &mut shares,
            &machine,
            &options,
            delay,
            window_ms,
            cores,
            &buffer,
            &mut cancel,
        )
        .await;
        match cycle {
            Ok(CycleEnd::Cancelled) => break Ok(()),
            Ok(CycleEnd::Completed) => {
                consecutive_failures = 0;
                iterations += 1;
                if options.iteration_limit > 0 && iterations >= options.iteration_limit {
                    debug!(iterations, "iteration limit reached");
                    break Ok(());
                }
            }
            Err(err) => {
                // one bad cycle degrades the output; a run of them is a
                // real failure that must reach the caller of stop()
                consecutive_failures += 1;
                warn!(error = %err, consecutive_failures, "sampling cycle failed");
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    break Err(eyre!(
                        "gave up after {consecutive_failures} consecutive failed cycles: {err}"
                    ));
                }
                // a cycle that dies before its sleep must not retry hot
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.changed() => {}
                }
            }
        }
    };

    // exits through the same path as cancellation so the publisher converges
    let _ = cancel_tx.send(true);
    exit
}

#[allow(clippy::too_many_arguments)]
async fn run_cycle<C>(
    collector: &mut C,
    table: &mut TrackedTable,
    shares: &mut SystemShares,
    machine: &MachineInfo,
    options: &EngineOptions,
    delay: Duration,
    window_ms: u64,
    cores: u32,
    buffer: &SharedBuffer,
    cancel: &mut watch::Receiver<bool>,
) -> Result<CycleEnd>
where
    C: ProcessProvider + SystemTimesProvider,
{
    // Enumerating + Reconciling
    let scan = collector.scan()?;
    let reconciled = table.reconcile(&scan);
    let before = collector.cpu_times()?;
    debug!(
        created = reconciled.created,
        refreshed = reconciled.refreshed,
        restarted = reconciled.restarted,
        skipped = reconciled.skipped,
        evicted = reconciled.evicted,
        "reconciled process table"
    );

    // Sleeping: cancellation lands here rather than mid-measurement
    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = cancel.changed() => {}
    }
    if *cancel.borrow() {
        return Ok(CycleEnd::Cancelled);
    }

    // Measuring
    let after = collector.cpu_times()?;
    let measured = table.measure(
        |pid| collector.sample(pid),
        options.cpu_mode,
        window_ms,
        cores,
    );
    debug!(
        measured = measured.measured,
        vanished = measured.vanished,
        "measured tracked processes"
    );
    if let Some(fresh) = metrics::system_shares(before, after) {
        *shares = fresh;
    }
    let stats = build_statistics(collector, machine, table, *shares);

    // Publishing: short-held lock, released before the next sleep
    {
        let mut slot = buffer.lock().await;
        slot.update = Update {
            processes: table.snapshot(),
            stats,
        };
        slot.seq += 1;
        slot.initialised = true;
    }
    Ok(CycleEnd::Completed)
}

fn build_statistics<C>(
    collector: &mut C,
    machine: &MachineInfo,
    table: &TrackedTable,
    shares: SystemShares,
) -> SystemStatistics
where
    C: SystemTimesProvider,
{
    let memory = collector.memory();
    let (received, transmitted) = collector.network_totals();
    SystemStatistics {
        machine_name: machine.machine_name.clone(),
        os_version: machine.os_version.clone(),
        cpu_name: machine.cpu_name.clone(),
        cpu_cores: machine.cpu_cores,
        cpu_frequency_mhz: machine.cpu_frequency_mhz,
        total_memory: machine.total_memory,
        available_memory: memory.available_memory,
        total_page_file: machine.total_page_file,
        available_page_file: memory.available_page_file,
        percent_idle_time: shares.idle,
        percent_kernel_time: shares.kernel,
        percent_user_time: shares.user,
        disk_usage_rate: table.disk_rate_total(),
        process_count: table.len() as u32,
        thread_count: table.thread_count_total(),
        network_received_total: received,
        network_transmitted_total: transmitted,
        gpu_percent: table.gpu_percent_total(),
    }
}

async fn publisher_loop(
    publish_interval: Duration,
    buffer: SharedBuffer,
    mut cancel: watch::Receiver<bool>,
    mut on_update: UpdateFn,
) -> Result<()> {
    let mut ticker = tokio::time::interval(publish_interval);
    let mut last_published_seq: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel.changed() => {}
        }
        if *cancel.borrow() {
            break;
        }
        // nothing to deliver until the first cycle lands
        let update = {
            let slot = buffer.lock().await;
            if !slot.initialised {
                continue;
            }
            last_published_seq = slot.seq;
            slot.update.clone()
        };
        // callback runs outside the lock
        on_update(update);
    }

    // drain: deliver the final completed cycle exactly once, so bounded
    // runs always surface their last buffer
    let pending = {
        let slot = buffer.lock().await;
        (slot.initialised && slot.seq != last_published_seq).then(|| slot.update.clone())
    };
    if let Some(update) = pending {
        on_update(update);
    }
    Ok(())
}
