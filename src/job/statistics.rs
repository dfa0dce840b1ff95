//! Final job statistics and the human-readable summary.

use crate::statistics::{human_bytes, CommunicationSnapshot, Counter};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::fmt;

/// Totals and throughput of a finished (or failed) run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatistics {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Wall-clock seconds from job start to end
    pub total_costs_secs: u64,
    /// Seconds spent scheduling task groups, at least 1
    pub transfer_costs_secs: u64,
    pub byte_speed_per_second: u64,
    pub record_speed_per_second: u64,
    pub total_read_records: u64,
    pub total_read_bytes: u64,
    pub total_error_records: u64,
    pub write_succeed_records: u64,
    pub transformer_succeed_records: u64,
    pub transformer_failed_records: u64,
    pub transformer_filter_records: u64,
}

impl JobStatistics {
    /// Speeds are read-succeeded counters over the transfer window
    pub fn compute(
        totals: &CommunicationSnapshot,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        transfer_start: DateTime<Utc>,
        transfer_end: DateTime<Utc>,
    ) -> Self {
        let total_costs_secs = whole_secs(start_time, end_time);
        let transfer_costs_secs = whole_secs(transfer_start, transfer_end).max(1);

        Self {
            start_time,
            end_time,
            total_costs_secs,
            transfer_costs_secs,
            byte_speed_per_second: totals.get(Counter::ReadSucceedBytes) / transfer_costs_secs,
            record_speed_per_second: totals.get(Counter::ReadSucceedRecords) / transfer_costs_secs,
            total_read_records: totals.total_read_records(),
            total_read_bytes: totals.total_read_bytes(),
            total_error_records: totals.total_error_records(),
            write_succeed_records: totals.write_succeed_records(),
            transformer_succeed_records: totals.get(Counter::TransformerSucceedRecords),
            transformer_failed_records: totals.get(Counter::TransformerFailedRecords),
            transformer_filter_records: totals.get(Counter::TransformerFilterRecords),
        }
    }

    pub fn has_transformer_activity(&self) -> bool {
        self.transformer_succeed_records + self.transformer_failed_records + self.transformer_filter_records > 0
    }
}

fn whole_secs(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_seconds()).unwrap_or(0)
}

impl fmt::Display for JobStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let format = "%Y-%m-%d %H:%M:%S";
        writeln!(f)?;
        writeln!(f, "{:<26}: {}", "Job start at", self.start_time.with_timezone(&Local).format(format))?;
        writeln!(f, "{:<26}: {}", "Job end at", self.end_time.with_timezone(&Local).format(format))?;
        writeln!(f, "{:<26}: {:>19}", "Job took secs", format!("{}s", self.total_costs_secs))?;
        writeln!(
            f,
            "{:<26}: {:>19}",
            "Average bps",
            format!("{}/s", human_bytes(self.byte_speed_per_second))
        )?;
        writeln!(
            f,
            "{:<26}: {:>19}",
            "Average rps",
            format!("{}rec/s", self.record_speed_per_second)
        )?;
        writeln!(f, "{:<26}: {:>19}", "Number of rec read", self.total_read_records)?;
        write!(f, "{:<26}: {:>19}", "Failed to read/write", self.total_error_records)?;
        if self.has_transformer_activity() {
            writeln!(f)?;
            writeln!(f, "{:<26}: {:>19}", "Transformer succeeded", self.transformer_succeed_records)?;
            writeln!(f, "{:<26}: {:>19}", "Transformer failed", self.transformer_failed_records)?;
            write!(f, "{:<26}: {:>19}", "Transformer filtered", self.transformer_filter_records)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::Communication;
    use chrono::Duration;

    #[test]
    fn test_transfer_time_floored_to_one_second() {
        let comm = Communication::new();
        comm.increase(Counter::ReadSucceedRecords, 500);
        comm.increase(Counter::ReadSucceedBytes, 4096);

        let start = Utc::now();
        let stats = JobStatistics::compute(&comm.snapshot(), start, start, start, start + Duration::milliseconds(200));
        assert_eq!(stats.transfer_costs_secs, 1);
        assert_eq!(stats.record_speed_per_second, 500);
        assert_eq!(stats.byte_speed_per_second, 4096);
        assert_eq!(stats.total_costs_secs, 0);
    }

    #[test]
    fn test_speeds_over_transfer_window() {
        let comm = Communication::new();
        comm.increase(Counter::ReadSucceedRecords, 1000);
        comm.increase(Counter::ReadFailedRecords, 3);

        let start = Utc::now();
        let stats = JobStatistics::compute(
            &comm.snapshot(),
            start,
            start + Duration::seconds(12),
            start + Duration::seconds(1),
            start + Duration::seconds(11),
        );
        assert_eq!(stats.total_costs_secs, 12);
        assert_eq!(stats.record_speed_per_second, 100);
        assert_eq!(stats.total_read_records, 1003);
        assert_eq!(stats.total_error_records, 3);
        assert!(stats.to_string().contains("Failed to read/write"));
        assert!(!stats.has_transformer_activity());
    }
}
