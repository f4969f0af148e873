use std::fmt::Write;

use color_eyre::Result;

use crate::format::{format_bytes, format_percent, format_rate, truncate_unicode};
use crate::sampler::engine::Update;

const NAME_WIDTH: usize = 24;

/// Render one published update as a ranked table, top `top` rows by CPU.
/// Delivered data is read-only; rendering works on the copies alone.
pub fn render_table(update: &Update, top: usize) -> String {
    let stats = &update.stats;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} | cpu idle {} kernel {} user {} | mem {} / {} | procs {} threads {} | disk {}",
        stats.machine_name,
        format_percent(stats.percent_idle_time),
        format_percent(stats.percent_kernel_time),
        format_percent(stats.percent_user_time),
        format_bytes(stats.total_memory.saturating_sub(stats.available_memory)),
        format_bytes(stats.total_memory),
        stats.process_count,
        stats.thread_count,
        format_rate(stats.disk_usage_rate),
    );
    let _ = writeln!(
        out,
        "{:>7} {:<NAME_WIDTH$} {:>7} {:>7} {:>7} {:>10} {:>9}",
        "PID", "NAME", "CPU", "KERN", "USER", "MEM", "DISK"
    );

    let mut rows: Vec<_> = update.processes.iter().collect();
    rows.sort_by(|a, b| {
        b.cpu_percent
            .partial_cmp(&a.cpu_percent)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    for process in rows.into_iter().take(top) {
        let _ = writeln!(
            out,
            "{:>7} {:<NAME_WIDTH$} {:>7} {:>7} {:>7} {:>10} {:>9}",
            process.pid,
            truncate_unicode(&process.name, NAME_WIDTH),
            format_percent(process.cpu_percent),
            format_percent(process.cpu_kernel_percent),
            format_percent(process.cpu_user_percent),
            format_bytes(process.memory_bytes),
            format_rate(process.disk_ops_rate),
        );
    }
    out
}

/// Render one published update as a single JSON line.
pub fn render_json(update: &Update) -> Result<String> {
    Ok(serde_json::to_string(update)?)
}
