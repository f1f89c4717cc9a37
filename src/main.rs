//! feedwatch: one batch pass over the configured feeds.
//!
//! Fetches every feed, finds entries newer than the stored watermark,
//! optionally summarizes them, pushes notifications and saves the updated
//! watermarks. Meant to be driven by cron or a systemd timer.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use feedwatch::app::{self, RunOptions, DEFAULT_STATE_PATH};
use feedwatch::config::feeds::DEFAULT_FEEDS_PATH;
use feedwatch::logging::init_tracing;
use feedwatch::runner::DEFAULT_CONCURRENCY;

#[derive(Debug, Parser)]
#[command(name = "feedwatch", version, about = "Watch RSS/Atom feeds and notify on new entries")]
struct Cli {
    /// Feeds file (TOML or JSON).
    #[arg(long, default_value = DEFAULT_FEEDS_PATH)]
    config: PathBuf,

    /// Watermark state file.
    #[arg(long, default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,

    /// Feeds processed at the same time.
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Write Prometheus text metrics here when the run ends.
    #[arg(long)]
    metrics_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Missing .env is fine; real environment variables win.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let opts = RunOptions {
        config: cli.config,
        state: cli.state,
        concurrency: cli.concurrency.max(1),
        metrics_file: cli.metrics_file,
    };

    let pipeline = match app::build_pipeline(opts.concurrency) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "startup failed");
            return ExitCode::FAILURE;
        }
    };

    match app::run(&opts, &pipeline).await {
        Ok(report) => {
            for r in report.feeds.iter().filter(|r| r.outcome.is_failure()) {
                tracing::warn!(feed = %r.id, outcome = %r.outcome, "feed did not complete");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "run failed");
            ExitCode::FAILURE
        }
    }
}
