//! # Job Result Reporting
//!
//! At the end of a run the job container may POST a small JSON document to
//! `server.address`. Delivery is best effort: any failure is logged as a
//! warning and never changes the job outcome.

use super::statistics::JobStatistics;
use crate::config::{Configuration, ServerConfig};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

const DEFAULT_JOB_NAME: &str = "jobName";

/// Body of the end-of-job report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReportDocument {
    /// Epoch seconds
    pub start_time_stamp: i64,
    pub end_time_stamp: i64,
    pub total_costs: u64,
    pub byte_speed_per_second: u64,
    pub record_speed_per_second: u64,
    pub total_read_records: u64,
    pub total_error_records: u64,
    pub job_name: String,
    /// The job document as submitted, secrets masked
    pub job_content: String,
}

impl JobReportDocument {
    pub fn new(statistics: &JobStatistics, job_name: impl Into<String>, job: &Configuration) -> Self {
        Self {
            start_time_stamp: statistics.start_time.timestamp(),
            end_time_stamp: statistics.end_time.timestamp(),
            total_costs: statistics.total_costs_secs,
            byte_speed_per_second: statistics.byte_speed_per_second,
            record_speed_per_second: statistics.record_speed_per_second,
            total_read_records: statistics.total_read_records,
            total_error_records: statistics.total_error_records,
            job_name: job_name.into(),
            job_content: job.masked().to_string(),
        }
    }
}

/// Name the report is filed under
///
/// An explicit name wins; otherwise a writer `path` like
/// `/warehouse/sales/orders/...` yields `sales.orders`. A writer path too
/// short for that yields an empty name; no path at all yields `jobName`.
pub fn resolve_job_name(explicit: Option<&str>, writer_path: Option<&str>) -> String {
    if let Some(name) = explicit.filter(|name| !name.trim().is_empty()) {
        return name.to_string();
    }
    match writer_path.filter(|path| !path.trim().is_empty()) {
        Some(path) => {
            let segments: Vec<&str> = path.split('/').collect();
            if segments.len() >= 4 {
                format!("{}.{}", segments[2], segments[3])
            } else {
                String::new()
            }
        }
        None => DEFAULT_JOB_NAME.to_string(),
    }
}

/// Only a plain 200 counts as delivered
fn is_accepted(status: StatusCode) -> bool {
    status == StatusCode::OK
}

#[async_trait]
pub trait JobReporter: Send + Sync {
    async fn report(&self, document: &JobReportDocument) -> Result<()>;
}

/// Posts the report as JSON to the configured statistics server
#[derive(Debug, Clone)]
pub struct HttpJobReporter {
    client: Client,
    address: String,
}

impl HttpJobReporter {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("batchsync/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Report {
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            address: address.into(),
        })
    }

    /// Reporter for `server.address`, or `None` when reporting is off
    pub fn from_server_config(server: &ServerConfig) -> Result<Option<Self>> {
        match server.address.as_deref().filter(|address| !address.trim().is_empty()) {
            Some(address) => Self::new(address, Duration::from_secs(server.timeout_secs)).map(Some),
            None => Ok(None),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl JobReporter for HttpJobReporter {
    async fn report(&self, document: &JobReportDocument) -> Result<()> {
        debug!(address = %self.address, job_name = %document.job_name, "Posting job report");
        let response = self
            .client
            .post(&self.address)
            .json(document)
            .send()
            .await
            .map_err(|e| SyncError::Report {
                message: format!("request to {} failed: {e}", self.address),
            })?;

        let status = response.status();
        if is_accepted(status) {
            debug!(status = %status, "Job report accepted");
            Ok(())
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            Err(SyncError::Report {
                message: format!("server answered {status}: {body}"),
            })
        }
    }
}

/// Drive `reporter` to completion from a blocking thread, logging failures
///
/// Inside a multi-threaded tokio runtime the ambient runtime is reused;
/// anywhere else the call runs on a scoped helper thread with its own
/// current-thread runtime.
pub fn deliver_blocking(reporter: &dyn JobReporter, document: &JobReportDocument) {
    let outcome = match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(|| handle.block_on(reporter.report(document)))
        }
        _ => thread::scope(|scope| {
            scope
                .spawn(|| {
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .map_err(|e| SyncError::io("create report runtime", e))?;
                    runtime.block_on(reporter.report(document))
                })
                .join()
                .unwrap_or_else(|_| Err(SyncError::internal("job report thread panicked")))
        }),
    };
    if let Err(e) = outcome {
        warn!(error = %e, "⚠️ Failed to deliver job report");
    }
}
