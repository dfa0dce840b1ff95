//! # Communicators
//!
//! Rollup plumbing between the three levels of a run:
//!
//! - [`TaskGroupCommunicator`] owns the live [`Communication`] of every task in
//!   one group and sums them into a group snapshot.
//! - [`JobCommunicationBoard`] holds the latest snapshot reported by each task
//!   group and sums them into the job view.
//!
//! Both are created per job run and shared by `Arc`; there is no global
//! registry.

use super::communication::{Communication, CommunicationSnapshot, CommunicationState};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

/// Latest snapshot of every task group in a job run
#[derive(Debug, Default)]
pub struct JobCommunicationBoard {
    groups: DashMap<usize, CommunicationSnapshot>,
}

impl JobCommunicationBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group before it starts so the job view sees it as running
    pub fn register_group(&self, task_group_id: usize) {
        self.groups.insert(
            task_group_id,
            CommunicationSnapshot::empty(CommunicationState::Running),
        );
    }

    pub fn update(&self, task_group_id: usize, snapshot: CommunicationSnapshot) {
        self.groups.insert(task_group_id, snapshot);
    }

    pub fn group(&self, task_group_id: usize) -> Option<CommunicationSnapshot> {
        self.groups.get(&task_group_id).map(|entry| entry.value().clone())
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Sum of every group's latest snapshot
    pub fn collect(&self) -> CommunicationSnapshot {
        let snapshots: Vec<CommunicationSnapshot> =
            self.groups.iter().map(|entry| entry.value().clone()).collect();
        CommunicationSnapshot::sum(&snapshots)
    }
}

/// Task communications of one task group
#[derive(Debug)]
pub struct TaskGroupCommunicator {
    task_group_id: usize,
    tasks: DashMap<usize, Arc<Communication>>,
    board: Arc<JobCommunicationBoard>,
}

impl TaskGroupCommunicator {
    pub fn new(task_group_id: usize, board: Arc<JobCommunicationBoard>) -> Self {
        Self {
            task_group_id,
            tasks: DashMap::new(),
            board,
        }
    }

    pub fn task_group_id(&self) -> usize {
        self.task_group_id
    }

    pub fn register_tasks(&self, task_ids: impl IntoIterator<Item = usize>) {
        for task_id in task_ids {
            self.tasks.insert(task_id, Arc::new(Communication::new()));
        }
    }

    pub fn get(&self, task_id: usize) -> Option<Arc<Communication>> {
        self.tasks.get(&task_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Replace a task's communication with a fresh one for a new attempt
    ///
    /// The previous attempt keeps its own handle, so late writes from its
    /// threads cannot leak into the new attempt's statistics.
    pub fn reset(&self, task_id: usize) -> Arc<Communication> {
        debug!(
            task_group_id = self.task_group_id,
            task_id = task_id,
            "Resetting task communication for retry"
        );
        let fresh = Arc::new(Communication::new());
        self.tasks.insert(task_id, Arc::clone(&fresh));
        fresh
    }

    /// Sum of every task's current snapshot
    pub fn collect(&self) -> CommunicationSnapshot {
        let snapshots: Vec<CommunicationSnapshot> =
            self.tasks.iter().map(|entry| entry.value().snapshot()).collect();
        CommunicationSnapshot::sum(&snapshots)
    }

    pub fn collect_state(&self) -> CommunicationState {
        self.tasks
            .iter()
            .map(|entry| entry.value().state())
            .fold(CommunicationState::Succeeded, CommunicationState::merge)
    }

    /// Publish the group snapshot to the job board
    pub fn report(&self, snapshot: CommunicationSnapshot) {
        self.board.update(self.task_group_id, snapshot);
    }
}
