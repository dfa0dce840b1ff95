//! # batchsync
//!
//! Command-line runner for job documents. Exits 0 when the job (or dry run)
//! succeeds and 1 on any failure.

use anyhow::{Context, Result};
use batchsync_core::engine::{Engine, RunOptions};
use batchsync_core::job::JobSummary;
use batchsync_core::logging::init_structured_logging;
use batchsync_core::transport::ShutdownSignal;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "batchsync")]
#[command(about = "Run a batch data-synchronization job")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Job document (JSON)
    job: PathBuf,

    /// Core settings file (JSON, TOML or YAML)
    #[arg(long)]
    core: Option<PathBuf>,

    /// Job parameter substituted for `${NAME}`, repeatable
    #[arg(short = 'p', long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Name used in the job report
    #[arg(long)]
    job_name: Option<String>,

    /// Init plugins and run their pre-checks without moving data
    #[arg(long)]
    dry_run: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn parse_param(raw: &str) -> std::result::Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("parameter name missing in '{raw}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_structured_logging(cli.log_level.as_deref(), cli.log_json);

    match run(cli).await {
        Ok(summary) => {
            info!(
                run_id = %summary.run_id,
                dry_run = summary.dry_run,
                tasks = summary.task_count,
                task_groups = summary.task_group_count,
                "🎉 Job completed"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "💥 Job failed");
            eprintln!("batchsync: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<JobSummary> {
    let cancellation = ShutdownSignal::new();
    let interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && interrupt.trigger() {
            warn!("Interrupt received, cancelling job");
        }
    });

    let options = RunOptions {
        core_file: cli.core,
        params: cli.params.into_iter().collect(),
        job_name: cli.job_name,
        dry_run: cli.dry_run,
        cancellation: Some(cancellation),
    };
    let job_file = cli.job;
    let description = job_file.display().to_string();

    tokio::task::spawn_blocking(move || Engine::new().run_file(&job_file, &options))
        .await
        .context("job thread panicked")?
        .with_context(|| format!("job {description} failed"))
}
