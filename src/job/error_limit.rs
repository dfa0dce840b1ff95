//! End-of-job dirty record thresholds.

use crate::config::Configuration;
use crate::error::{Result, SyncError};
use crate::statistics::CommunicationSnapshot;
use tracing::debug;

/// Job-wide dirty record ceiling read from `job.setting.errorLimit`
///
/// An absolute `record` limit takes priority; `percentage` applies only when
/// no record limit is set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ErrorRecordChecker {
    Unlimited,
    Records(u64),
    Percentage(f64),
}

impl ErrorRecordChecker {
    pub fn from_job(job: &Configuration) -> Result<Self> {
        let limit = job
            .get_configuration("job.setting.errorLimit")
            .or_else(|| job.get_configuration("job.setting.error_limit"));
        let Some(limit) = limit else {
            return Ok(Self::Unlimited);
        };

        if limit.exists("record") {
            let record = limit.get_i64("record").ok_or_else(|| {
                SyncError::configuration("job.setting.errorLimit.record must be an integer")
            })?;
            return u64::try_from(record).map(Self::Records).map_err(|_| {
                SyncError::configuration(format!(
                    "job.setting.errorLimit.record must not be negative, got {record}"
                ))
            });
        }

        match limit.get_f64("percentage") {
            Some(percentage) if (0.0..=1.0).contains(&percentage) => Ok(Self::Percentage(percentage)),
            Some(percentage) => Err(SyncError::configuration(format!(
                "job.setting.errorLimit.percentage must be between 0.0 and 1.0, got {percentage}"
            ))),
            None => Ok(Self::Unlimited),
        }
    }

    pub fn check(&self, totals: &CommunicationSnapshot) -> Result<()> {
        let errors = totals.total_error_records();
        match *self {
            Self::Unlimited => Ok(()),
            Self::Records(limit) => {
                debug!(limit = limit, errors = errors, "Checking dirty record count");
                if errors > limit {
                    Err(SyncError::DirtyRecordLimitExceeded { limit, actual: errors })
                } else {
                    Ok(())
                }
            }
            Self::Percentage(limit) => {
                let total = totals.total_read_records();
                if total == 0 {
                    return Ok(());
                }
                let actual = errors as f64 / total as f64;
                debug!(limit = limit, actual = actual, "Checking dirty record percentage");
                if actual > limit {
                    Err(SyncError::DirtyPercentageExceeded { limit, actual })
                } else {
                    Ok(())
                }
            }
        }
    }
}
