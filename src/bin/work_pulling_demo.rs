//! # Work Pulling Demo
//!
//! Runs a range of integers through a pool of workers that each sleep a
//! random number of milliseconds and return `1`, summing the results. Progress
//! is logged every `progress_log_interval` items; the final summary is printed
//! as JSON.
//!
//! ```bash
//! work-pulling-demo --items 100000 --workers 512 --max-delay-ms 100
//! WORKPULL__PROGRESS_LOG_INTERVAL=5000 work-pulling-demo --failure-rate 0.01
//! ```

use anyhow::{ensure, Context};
use clap::Parser;
use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

use workpull_core::logging::{init_structured_logging, log_dispatch_operation, log_error};
use workpull_core::{
    Categorize, DispatchConfig, FailureCategory, LoggingProgressReporter, WorkContext,
    WorkDispatcher, WorkerId,
};

#[derive(Parser, Debug)]
#[command(name = "work-pulling-demo")]
#[command(about = "Distribute a range of integers across a pool of pulling workers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Number of work items to dispatch
    #[arg(long, default_value_t = 100_000)]
    items: u64,

    /// Worker pool size (default: worker_count from configuration)
    #[arg(long)]
    workers: Option<usize>,

    /// Upper bound of the simulated per-item processing delay
    #[arg(long, default_value_t = 100)]
    max_delay_ms: u64,

    /// Probability in [0, 1] that an item fails
    #[arg(long, default_value_t = 0.0)]
    failure_rate: f64,

    /// Configuration directory (default: ./config)
    #[arg(long, env = "WORKPULL_CONFIG_DIR")]
    config_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
#[error("simulated failure processing item {item}")]
struct SimulatedFailure {
    item: u64,
}

impl Categorize for SimulatedFailure {
    fn category(&self) -> FailureCategory {
        FailureCategory::new("simulated_failure")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_structured_logging();

    ensure!(
        (0.0..=1.0).contains(&cli.failure_rate),
        "--failure-rate must be between 0 and 1, got {}",
        cli.failure_rate
    );

    let mut config = DispatchConfig::load_from_directory(cli.config_dir.clone())
        .context("failed to load dispatch configuration")?;
    if let Some(workers) = cli.workers {
        config.worker_count = workers;
    }
    config.validate()?;

    let max_delay_ms = cli.max_delay_ms;
    let failure_rate = cli.failure_rate;
    let factory = move |_worker_id: WorkerId| {
        move |item: u64, _ctx: WorkContext| {
            // ThreadRng is not Send; draw before the future is built
            let (delay_ms, fail) = {
                let mut rng = rand::thread_rng();
                (rng.gen_range(0..=max_delay_ms), rng.gen_bool(failure_rate))
            };
            async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                if fail {
                    Err(SimulatedFailure { item })
                } else {
                    Ok(1_u64)
                }
            }
        }
    };

    let dispatcher = WorkDispatcher::new(
        0..cli.items,
        config.worker_count,
        factory,
        0_u64,
        |accumulated: &u64, result: u64| accumulated + result,
        LoggingProgressReporter::new(config.progress_log_interval),
        LoggingProgressReporter::completion(),
    )?
    .with_config(&config);

    let run_id = dispatcher.run_id();
    log_dispatch_operation(
        "dispatch",
        Some(run_id),
        Some(config.worker_count),
        None,
        "started",
        Some(&format!("{} items, max delay {}ms", cli.items, max_delay_ms)),
    );

    let summary = match dispatcher.start()?.join().await {
        Ok(summary) => summary,
        Err(error) => {
            log_error(
                "work-pulling-demo",
                "join",
                &error.to_string(),
                Some(&run_id.to_string()),
            );
            return Err(error.into());
        }
    };

    log_dispatch_operation(
        "dispatch",
        Some(run_id),
        Some(config.worker_count),
        Some(summary.items_processed),
        "completed",
        None,
    );
    info!(
        run_id = %run_id,
        successes = summary.successes(),
        total_failures = summary.total_failures(),
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "Demo finished"
    );

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
