use crate::system::snapshot::CpuTimes;

/// Shortest allowed sampling window. Below this the tick counters are too
/// coarse for sane deltas.
pub const MIN_SAMPLING_DELAY_MS: u64 = 200;

/// What "100% CPU" means for one process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CpuMode {
    /// 100% is every core busy for the whole window.
    #[default]
    Solaris,
    /// 100% is one core busy for the whole window; a process can exceed 100%.
    Irix,
}

impl CpuMode {
    pub fn from_str_config(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "irix" => CpuMode::Irix,
            _ => CpuMode::Solaris,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CpuMode::Solaris => "solaris",
            CpuMode::Irix => "irix",
        }
    }

    /// Milliseconds of CPU time worth 100% for one sampling window.
    pub fn denominator_ms(self, window_ms: u64, cores: u32) -> u64 {
        match self {
            CpuMode::Solaris => window_ms.saturating_mul(u64::from(cores.max(1))),
            CpuMode::Irix => window_ms,
        }
    }
}

/// A CPU-time delta as a percentage of `denominator_ms`.
///
/// `None` on a degenerate denominator; callers keep the previous percentage
/// for the cycle instead of corrupting it.
pub fn cpu_percent(delta_ms: u64, denominator_ms: u64) -> Option<f64> {
    if denominator_ms == 0 {
        return None;
    }
    Some(delta_ms as f64 * 100.0 / denominator_ms as f64)
}

/// Per-second rate implied by two cumulative counter readings one window
/// apart. A wrapped or reset counter yields zero, never a negative rate.
pub fn counter_rate(prev: u64, curr: u64, window_ms: u64) -> f64 {
    if window_ms == 0 {
        return 0.0;
    }
    curr.saturating_sub(prev) as f64 * (1000.0 / window_ms as f64)
}

/// System-wide idle/kernel/user shares, each in percent.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SystemShares {
    pub idle: f64,
    pub kernel: f64,
    pub user: f64,
}

/// Shares of the elapsed system time between two tick readings.
///
/// `None` when no system time elapsed (clock resolution, or counters read
/// back-to-back); the caller retains the previous shares.
pub fn system_shares(before: CpuTimes, after: CpuTimes) -> Option<SystemShares> {
    let idle = after.idle_ms.saturating_sub(before.idle_ms);
    let kernel = after.kernel_ms.saturating_sub(before.kernel_ms);
    let user = after.user_ms.saturating_sub(before.user_ms);
    let total = idle + kernel + user;
    if total == 0 {
        return None;
    }
    let total = total as f64;
    Some(SystemShares {
        idle: idle as f64 * 100.0 / total,
        kernel: kernel as f64 * 100.0 / total,
        user: user as f64 * 100.0 / total,
    })
}
