//! # Task Group Container
//!
//! Runs the tasks of one [`TaskGroupAssignment`] with at most `channel` of
//! them in flight, retrying failed attempts when the writer allows it.
//!
//! Each iteration of the supervision loop:
//!
//! 1. scans running attempts for terminal states and queues retries
//! 2. dispatches pending tasks up to the concurrency limit
//! 3. feeds the hang watchdog
//! 4. returns once every task has succeeded
//! 5. publishes the group snapshot on the report interval
//! 6. sleeps
//!
//! A job-wide cancellation stops every attempt and ends the loop with
//! [`SyncError::Cancelled`].

use super::executor::TaskExecutor;
use super::monitor::TaskMonitor;
use crate::error::{Result, SyncError};
use crate::job::{JobRunContext, TaskConfig, TaskGroupAssignment};
use crate::logging::log_task_operation;
use crate::statistics::{CommunicationSnapshot, CommunicationState, ProgressReport, TaskGroupCommunicator};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// An attempt that failed and is waiting to be retried
#[derive(Debug)]
struct FailedAttempt {
    executor: TaskExecutor,
    failed_at: Instant,
}

#[derive(Debug)]
pub struct TaskGroupContainer {
    context: JobRunContext,
    task_group_id: usize,
    channel_number: usize,
    tasks: Vec<TaskConfig>,
    communicator: TaskGroupCommunicator,
    monitor: TaskMonitor,
}

impl TaskGroupContainer {
    pub fn new(context: JobRunContext, assignment: TaskGroupAssignment) -> Self {
        let communicator = TaskGroupCommunicator::new(assignment.task_group_id, Arc::clone(&context.board));
        let monitor = TaskMonitor::new(context.core.container.task_group.hang_timeout());
        Self {
            task_group_id: assignment.task_group_id,
            channel_number: assignment.channel.max(1),
            tasks: assignment.tasks,
            communicator,
            monitor,
            context,
        }
    }

    pub fn task_group_id(&self) -> usize {
        self.task_group_id
    }

    pub fn communicator(&self) -> &TaskGroupCommunicator {
        &self.communicator
    }

    /// Run every task of the group to completion
    ///
    /// On failure the group snapshot is published as FAILED with the cause
    /// before the error is returned.
    pub fn start(&mut self) -> Result<()> {
        info!(
            task_group_id = self.task_group_id,
            tasks = self.tasks.len(),
            channel = self.channel_number,
            "📦 Task group starting"
        );
        self.communicator
            .register_tasks(self.tasks.iter().map(|task| task.task_id));

        let mut running: Vec<TaskExecutor> = Vec::new();
        let result = self.supervise(&mut running);

        if let Err(cause) = &result {
            for executor in &running {
                executor.shutdown();
            }
            let state = match cause {
                SyncError::Cancelled { .. } => CommunicationState::Killed,
                _ => CommunicationState::Failed,
            };
            let snapshot = self.communicator.collect();
            let snapshot = match state {
                CommunicationState::Killed => snapshot.with_state(state),
                _ => snapshot.with_failure(cause.clone()),
            };
            self.communicator.report(snapshot);
            error!(
                task_group_id = self.task_group_id,
                state = %state,
                error = %cause,
                "❌ Task group stopped"
            );
        }
        result
    }

    fn supervise(&mut self, running: &mut Vec<TaskExecutor>) -> Result<()> {
        let group_settings = self.context.core.container.task_group.clone();
        let failover = self.context.core.container.task.clone();
        let retry_interval = Duration::from_millis(failover.retry_interval_ms);
        let max_wait = Duration::from_millis(failover.max_wait_ms);
        let total_tasks = self.tasks.len();

        let mut pending: VecDeque<TaskConfig> = self.tasks.iter().cloned().collect();
        let mut failed: HashMap<usize, FailedAttempt> = HashMap::new();
        let mut last_report = Instant::now();
        let mut last_snapshot: Option<CommunicationSnapshot> = None;

        loop {
            if self.context.cancellation.is_triggered() {
                return Err(SyncError::Cancelled {
                    reason: format!("task group {} stopped by job cancellation", self.task_group_id),
                });
            }

            // 1. completion scan
            let mut index = 0;
            while index < running.len() {
                let state = running[index].communication().state();
                match state {
                    CommunicationState::Running => index += 1,
                    CommunicationState::Succeeded => {
                        // final only once both threads have exited
                        let executor = &running[index];
                        if executor.is_shutdown() && executor.communication().state() == CommunicationState::Succeeded {
                            let executor = running.remove(index);
                            self.monitor.remove(executor.task_id());
                            log_task_operation(
                                "task_finished",
                                self.task_group_id,
                                executor.task_id(),
                                executor.attempt(),
                                "succeeded",
                                None,
                            );
                        } else {
                            index += 1;
                        }
                    }
                    CommunicationState::Killed => {
                        let executor = running.remove(index);
                        return Err(SyncError::TaskKilled {
                            task_id: executor.task_id(),
                        });
                    }
                    CommunicationState::Failed => {
                        let executor = running.remove(index);
                        self.monitor.remove(executor.task_id());
                        let cause = executor.communication().error().unwrap_or_else(|| {
                            SyncError::internal(format!("task {} failed without a cause", executor.task_id()))
                        });

                        if !(executor.supports_failover() && executor.attempt() < failover.max_retry_times) {
                            log_task_operation(
                                "task_failed",
                                self.task_group_id,
                                executor.task_id(),
                                executor.attempt(),
                                "failed",
                                Some(&cause.to_string()),
                            );
                            running.push(executor);
                            return Err(cause);
                        }

                        log_task_operation(
                            "task_retry_scheduled",
                            self.task_group_id,
                            executor.task_id(),
                            executor.attempt(),
                            "failed",
                            Some(&cause.to_string()),
                        );
                        executor.shutdown();
                        self.communicator.reset(executor.task_id());
                        if let Some(task) = self.task(executor.task_id()) {
                            pending.push_back(task);
                        }
                        failed.insert(
                            executor.task_id(),
                            FailedAttempt {
                                executor,
                                failed_at: Instant::now(),
                            },
                        );
                    }
                }
            }

            // 2. dispatch
            let mut deferred: Vec<TaskConfig> = Vec::new();
            while running.len() < self.channel_number {
                let Some(task) = pending.pop_front() else {
                    break;
                };

                let mut attempt = 1;
                if let Some(previous) = failed.get(&task.task_id) {
                    let waited = previous.failed_at.elapsed();
                    if waited < retry_interval {
                        deferred.push(task);
                        continue;
                    }
                    if !previous.executor.is_shutdown() {
                        if waited > max_wait {
                            return Err(SyncError::FailoverWaitExceeded {
                                task_id: task.task_id,
                                waited_ms: waited.as_millis() as u64,
                            });
                        }
                        previous.executor.shutdown();
                        deferred.push(task);
                        continue;
                    }
                    attempt = previous.executor.attempt() + 1;
                    failed.remove(&task.task_id);
                }

                // retries were given a fresh communication when they were queued
                let communication = self
                    .communicator
                    .get(task.task_id)
                    .unwrap_or_else(|| self.communicator.reset(task.task_id));
                let mut executor =
                    TaskExecutor::new(&self.context, self.task_group_id, &task, attempt, Arc::clone(&communication))?;
                let started = executor.start();
                self.monitor.register(task.task_id, attempt, &communication);
                running.push(executor);
                started?;
                log_task_operation("task_started", self.task_group_id, task.task_id, attempt, "running", None);
            }
            for task in deferred.into_iter().rev() {
                pending.push_front(task);
            }

            // 3. hang watchdog
            for executor in running.iter() {
                self.monitor.report(executor.task_id(), executor.communication());
            }

            // 4. success
            if pending.is_empty() && running.is_empty() {
                let state = self.communicator.collect_state();
                if state != CommunicationState::Succeeded {
                    return Err(SyncError::internal(format!(
                        "task group {} drained all tasks but ended {state}",
                        self.task_group_id
                    )));
                }
                let snapshot = self.communicator.collect();
                info!(
                    task_group_id = self.task_group_id,
                    "✅ Task group completed: {}",
                    ProgressReport::compute(&snapshot, last_snapshot.as_ref(), total_tasks)
                );
                self.communicator.report(snapshot);
                return Ok(());
            }

            // 5. periodic report
            if last_report.elapsed() >= group_settings.report_interval() {
                let snapshot = self.communicator.collect();
                info!(
                    task_group_id = self.task_group_id,
                    running = running.len(),
                    pending = pending.len(),
                    "📊 {}",
                    ProgressReport::compute(&snapshot, last_snapshot.as_ref(), total_tasks)
                );
                self.communicator.report(snapshot.clone());
                last_snapshot = Some(snapshot);
                last_report = Instant::now();
            }

            // 6. sleep
            thread::sleep(group_settings.sleep_interval());
        }
    }

    fn task(&self, task_id: usize) -> Option<TaskConfig> {
        let task = self.tasks.iter().find(|task| task.task_id == task_id).cloned();
        if task.is_none() {
            warn!(task_group_id = self.task_group_id, task_id = task_id, "Retry requested for unknown task");
        }
        task
    }
}
