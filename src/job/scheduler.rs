//! # Standalone Scheduler
//!
//! Runs every task group of a job inside this process, one named thread per
//! group. Groups report completion over a crossbeam channel; while waiting the
//! scheduler logs aggregated progress from the job board.
//!
//! The first group to fail raises the job-wide cancellation flag so the other
//! groups stop at their next loop iteration, and its error becomes the job's.

use super::assign::TaskGroupAssignment;
use super::context::JobRunContext;
use crate::error::{Result, SyncError};
use crate::statistics::{CommunicationSnapshot, ProgressReport};
use crate::taskgroup::TaskGroupContainer;
use crossbeam::channel::{self, RecvTimeoutError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
pub struct StandaloneScheduler {
    context: JobRunContext,
}

impl StandaloneScheduler {
    pub fn new(context: JobRunContext) -> Self {
        Self { context }
    }

    /// Run all groups and wait for them; returns the first real failure
    pub fn schedule(&self, assignments: Vec<TaskGroupAssignment>) -> Result<()> {
        let total_tasks: usize = assignments.iter().map(|group| group.tasks.len()).sum();
        let group_count = assignments.len();
        info!(
            run_id = %self.context.run_id,
            task_groups = group_count,
            tasks = total_tasks,
            "🗂️ Scheduling task groups"
        );

        for assignment in &assignments {
            self.context.board.register_group(assignment.task_group_id);
        }

        let (sender, receiver) = channel::unbounded::<(usize, Result<()>)>();
        let mut handles = Vec::with_capacity(group_count);
        for assignment in assignments {
            let task_group_id = assignment.task_group_id;
            let group_sender = sender.clone();
            let context = self.context.clone();
            let spawned = thread::Builder::new()
                .name(format!("taskgroup-{task_group_id}"))
                .spawn(move || {
                    let mut container = TaskGroupContainer::new(context, assignment);
                    let result = catch_unwind(AssertUnwindSafe(|| container.start())).unwrap_or_else(|_| {
                        Err(SyncError::internal(format!("task group {task_group_id} panicked")))
                    });
                    // the scheduler may already have given up on us
                    let _ = group_sender.send((task_group_id, result));
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    self.context.cancellation.trigger();
                    drop(sender);
                    join_all(handles);
                    return Err(SyncError::io("spawn task group thread", e));
                }
            }
        }
        drop(sender);

        let job_settings = &self.context.core.container.job;
        let poll = Duration::from_millis(job_settings.sleep_interval_ms.max(1));
        let report_interval = Duration::from_millis(job_settings.report_interval_ms);

        let mut remaining = group_count;
        let mut failure: Option<SyncError> = None;
        let mut last_report = Instant::now();
        let mut last_snapshot: Option<CommunicationSnapshot> = None;

        while remaining > 0 {
            match receiver.recv_timeout(poll) {
                Ok((task_group_id, Ok(()))) => {
                    remaining -= 1;
                    info!(task_group_id = task_group_id, remaining = remaining, "✅ Task group finished");
                }
                Ok((task_group_id, Err(cause))) => {
                    remaining -= 1;
                    let cancelled = matches!(cause, SyncError::Cancelled { .. });
                    if !cancelled {
                        error!(task_group_id = task_group_id, error = %cause, "❌ Task group failed, cancelling job");
                        self.context.cancellation.trigger();
                    }
                    let replace = match &failure {
                        None => true,
                        Some(previous) => {
                            !cancelled && matches!(previous.root_cause(), SyncError::Cancelled { .. })
                        }
                    };
                    if replace {
                        failure = Some(SyncError::TaskGroupFailed {
                            task_group_id,
                            source: Box::new(cause),
                        });
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    if last_report.elapsed() >= report_interval {
                        let snapshot = self.context.board.collect();
                        info!(
                            run_id = %self.context.run_id,
                            "📊 {}",
                            ProgressReport::compute(&snapshot, last_snapshot.as_ref(), total_tasks)
                        );
                        last_snapshot = Some(snapshot);
                        last_report = Instant::now();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(remaining = remaining, "Task group threads exited without reporting");
                    if failure.is_none() {
                        failure = Some(SyncError::internal(format!(
                            "{remaining} task group(s) exited without reporting"
                        )));
                    }
                    break;
                }
            }
        }

        join_all(handles);

        match failure {
            None => Ok(()),
            Some(cause) => Err(cause),
        }
    }
}

fn join_all(handles: Vec<thread::JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            warn!("Task group thread panicked outside its container");
        }
    }
}
