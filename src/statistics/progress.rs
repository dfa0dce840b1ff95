//! Periodic progress lines derived from two consecutive snapshots.

use super::communication::{CommunicationSnapshot, CommunicationState, Counter};
use serde::Serialize;
use std::fmt;

/// Throughput and totals between two reporting points
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub state: CommunicationState,
    pub total_read_records: u64,
    pub total_read_bytes: u64,
    pub total_error_records: u64,
    pub total_error_bytes: u64,
    pub write_succeed_records: u64,
    pub byte_speed: u64,
    pub record_speed: u64,
    pub percentage: f64,
    pub wait_writer_secs: f64,
    pub wait_reader_secs: f64,
    pub transformer_succeed_records: u64,
    pub transformer_failed_records: u64,
    pub transformer_filter_records: u64,
    pub transformer_used_secs: f64,
}

impl ProgressReport {
    /// Compare `now` with the previous report point
    ///
    /// Speeds are the read deltas divided by the elapsed whole seconds; an
    /// interval of a second or less counts as one second. `total_stage` is the
    /// number of tasks whose completion makes up 100%.
    pub fn compute(
        now: &CommunicationSnapshot,
        last: Option<&CommunicationSnapshot>,
        total_stage: usize,
    ) -> Self {
        let (byte_speed, record_speed) = match last {
            Some(last) => {
                let interval_ms = now.timestamp_ms().saturating_sub(last.timestamp_ms());
                let secs = if interval_ms <= 1000 { 1 } else { (interval_ms / 1000) as u64 };
                (
                    now.total_read_bytes().saturating_sub(last.total_read_bytes()) / secs,
                    now.total_read_records().saturating_sub(last.total_read_records()) / secs,
                )
            }
            None => (0, 0),
        };

        let percentage = if total_stage == 0 {
            0.0
        } else {
            (now.get(Counter::Stage) as f64 / total_stage as f64).min(1.0)
        };

        Self {
            state: now.state(),
            total_read_records: now.total_read_records(),
            total_read_bytes: now.total_read_bytes(),
            total_error_records: now.total_error_records(),
            total_error_bytes: now.total_error_bytes(),
            write_succeed_records: now.write_succeed_records(),
            byte_speed,
            record_speed,
            percentage,
            wait_writer_secs: nanos_to_secs(now.get(Counter::WaitWriterNanos)),
            wait_reader_secs: nanos_to_secs(now.get(Counter::WaitReaderNanos)),
            transformer_succeed_records: now.get(Counter::TransformerSucceedRecords),
            transformer_failed_records: now.get(Counter::TransformerFailedRecords),
            transformer_filter_records: now.get(Counter::TransformerFilterRecords),
            transformer_used_secs: nanos_to_secs(now.get(Counter::TransformerUsedNanos)),
        }
    }

    fn has_transformer_activity(&self) -> bool {
        self.transformer_succeed_records + self.transformer_failed_records + self.transformer_filter_records > 0
    }
}

impl fmt::Display for ProgressReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total {} records, {} bytes | Speed {}/s, {} records/s | Error {} records, {} bytes | \
             All Task WaitWriterTime {:.3}s | All Task WaitReaderTime {:.3}s | ",
            self.total_read_records,
            self.total_read_bytes,
            human_bytes(self.byte_speed),
            self.record_speed,
            self.total_error_records,
            self.total_error_bytes,
            self.wait_writer_secs,
            self.wait_reader_secs,
        )?;
        if self.has_transformer_activity() {
            write!(
                f,
                "Transformer Success {} records | Transformer Error {} records | \
                 Transformer Filter {} records | Transformer usedTime {:.3}s | ",
                self.transformer_succeed_records,
                self.transformer_failed_records,
                self.transformer_filter_records,
                self.transformer_used_secs,
            )?;
        }
        write!(f, "Percentage {:.2}%", self.percentage * 100.0)
    }
}

fn nanos_to_secs(nanos: u64) -> f64 {
    nanos as f64 / 1_000_000_000.0
}

/// Render a byte count with a binary unit, e.g. `1.50MB`
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes}B")
    } else {
        format!("{value:.2}{}", UNITS[unit])
    }
}
