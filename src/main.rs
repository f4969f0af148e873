use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use taskmeter::config::{Config, load_config, load_config_from_path};
use taskmeter::output;
use taskmeter::sampler::engine::{Engine, EngineOptions, UpdateFn};
use taskmeter::sampler::metrics::CpuMode;
use taskmeter::system::collector::SystemCollector;

#[derive(Parser)]
#[command(
    name = "taskmeter",
    about = "Process sampler: live CPU/memory/disk metrics in the terminal"
)]
struct Cli {
    /// Path to config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Sampling window in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Publish interval in milliseconds
    #[arg(long)]
    publish_ms: Option<u64>,

    /// CPU percentage mode: solaris (all cores = 100%) or irix (one core = 100%)
    #[arg(long)]
    cpu_mode: Option<String>,

    /// Stop after this many sampling cycles (0 = run until Ctrl+C)
    #[arg(long)]
    iterations: Option<u64>,

    /// Emit one JSON line per update instead of a table
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Rows to show per update in table output
    #[arg(long)]
    top: Option<usize>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config_for_cli(&cli);
    let options = engine_options_for_cli(&config, &cli);

    let json = cli.json || config.output.json;
    let top = cli.top.unwrap_or(config.output.top);
    let on_update: UpdateFn = Box::new(move |update| {
        if json {
            match output::render_json(&update) {
                Ok(line) => println!("{line}"),
                Err(err) => tracing::warn!(error = %err, "failed to encode update"),
            }
        } else {
            print!("{}", output::render_table(&update, top));
        }
    });

    let engine = Engine::start(SystemCollector::new(), options, on_update);

    if options.iteration_limit > 0 {
        engine.join().await
    } else {
        tokio::signal::ctrl_c().await?;
        engine.stop().await
    }
}

fn load_config_for_cli(cli: &Cli) -> Config {
    match &cli.config {
        Some(path) => load_config_from_path(path),
        None => load_config(),
    }
}

fn engine_options_for_cli(config: &Config, cli: &Cli) -> EngineOptions {
    let mut options = config.engine_options();
    if let Some(delay) = cli.delay_ms {
        options.sampling_delay = Duration::from_millis(delay);
    }
    if let Some(interval) = cli.publish_ms {
        options.publish_interval = Duration::from_millis(interval);
    }
    if let Some(mode) = &cli.cpu_mode {
        options.cpu_mode = CpuMode::from_str_config(mode);
    }
    if let Some(iterations) = cli.iterations {
        options.iteration_limit = iterations;
    }
    options
}
