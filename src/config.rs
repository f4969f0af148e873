use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::sampler::engine::EngineOptions;
use crate::sampler::metrics::CpuMode;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sampler: SamplerConfig,
    pub publish: PublishConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Sampling window in milliseconds; the engine enforces a minimum.
    pub delay_ms: u64,
    /// "solaris" (all cores are 100%) or "irix" (one core is 100%).
    pub cpu_mode: String,
    /// Completed cycles before exiting; 0 runs until interrupted.
    pub iteration_limit: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            delay_ms: 1000,
            cpu_mode: "solaris".to_string(),
            iteration_limit: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub interval_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        PublishConfig { interval_ms: 1500 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Rows per update in table output.
    pub top: usize,
    /// Emit JSON lines instead of tables.
    pub json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            top: 15,
            json: false,
        }
    }
}

impl Config {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            sampling_delay: Duration::from_millis(self.sampler.delay_ms),
            publish_interval: Duration::from_millis(self.publish.interval_ms),
            cpu_mode: CpuMode::from_str_config(&self.sampler.cpu_mode),
            iteration_limit: self.sampler.iteration_limit,
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("taskmeter").join("config.toml"))
}

pub fn load_config() -> Config {
    match config_path() {
        Some(path) if path.exists() => load_config_from_path(&path),
        _ => Config::default(),
    }
}

pub fn load_config_from_path(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => toml::from_str(&contents).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}
