//! Hang watchdog for running task attempts.

use crate::error::SyncError;
use crate::statistics::Communication;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy)]
struct Progress {
    attempt: u32,
    read_records: u64,
    last_progress: Instant,
}

/// Fails tasks whose read count stops moving for longer than `hang_timeout`
#[derive(Debug)]
pub struct TaskMonitor {
    hang_timeout: Duration,
    tasks: HashMap<usize, Progress>,
}

impl TaskMonitor {
    pub fn new(hang_timeout: Duration) -> Self {
        Self {
            hang_timeout,
            tasks: HashMap::new(),
        }
    }

    pub fn register(&mut self, task_id: usize, attempt: u32, communication: &Communication) {
        self.tasks.insert(
            task_id,
            Progress {
                attempt,
                read_records: communication.snapshot().total_read_records(),
                last_progress: Instant::now(),
            },
        );
    }

    pub fn remove(&mut self, task_id: usize) {
        self.tasks.remove(&task_id);
    }

    /// Record the latest read count; returns `true` if the task was just
    /// failed as hung
    pub fn report(&mut self, task_id: usize, communication: &Communication) -> bool {
        self.report_at(task_id, communication, Instant::now())
    }

    fn report_at(&mut self, task_id: usize, communication: &Communication, now: Instant) -> bool {
        let Some(progress) = self.tasks.get_mut(&task_id) else {
            return false;
        };
        if communication.is_finished() {
            return false;
        }

        let read_records = communication.snapshot().total_read_records();
        if read_records > progress.read_records {
            progress.read_records = read_records;
            progress.last_progress = now;
            return false;
        }

        let idle = now.saturating_duration_since(progress.last_progress);
        if idle <= self.hang_timeout {
            return false;
        }

        warn!(
            task_id = task_id,
            attempt = progress.attempt,
            idle_ms = idle.as_millis() as u64,
            read_records = read_records,
            "⏳ Task made no read progress, marking it hung"
        );
        communication.mark_failed(SyncError::TaskHung {
            task_id,
            idle_ms: idle.as_millis() as u64,
            read_records,
        });
        self.tasks.remove(&task_id);
        true
    }
}
