//! # Structured Logging Module
//!
//! Environment-aware structured logging for job runs. Reader and writer threads
//! are named `reader-{group}-{task}` / `writer-{group}-{task}`, so the console
//! layer prints thread names to keep interleaved task output readable.

use chrono::Utc;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging
///
/// `level` overrides the environment default; `RUST_LOG` overrides both.
/// `json` switches the console output to one JSON object per line.
pub fn init_structured_logging(level: Option<&str>, json: bool) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = level
            .map(str::to_string)
            .unwrap_or_else(|| get_log_level(&environment).to_string());

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

        let console = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .json()
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_names(true)
                .with_level(true)
                .with_ansi(true)
                .boxed()
        };

        // A subscriber may already be installed by an embedding application or a test harness
        if tracing_subscriber::registry()
            .with(console.with_filter(filter))
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            level = %log_level,
            json = json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("BATCHSYNC_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "test" | "development" => "debug",
        "production" => "info",
        _ => "info",
    }
}

/// Log structured data for task lifecycle events
pub fn log_task_operation(
    operation: &str,
    task_group_id: usize,
    task_id: usize,
    attempt: u32,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        task_group_id = task_group_id,
        task_id = task_id,
        attempt = attempt,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 TASK_OPERATION"
    );
}

/// Log structured data for job phase transitions
pub fn log_job_phase(run_id: &str, phase: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        run_id = %run_id,
        phase = %phase,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🚚 JOB_PHASE"
    );
}
