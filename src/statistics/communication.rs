//! # Task Communication
//!
//! The live statistics and lifecycle cell of one task attempt. Reader thread,
//! writer thread, channel and task group supervisor all write to it, so the
//! counters are atomics and the state sits behind a small mutex.
//!
//! Aggregation never locks more than one task at a time: a group or job view
//! is built by taking [`CommunicationSnapshot`]s and summing them with
//! [`CommunicationSnapshot::merge`].

use crate::error::SyncError;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifecycle state of a task, task group or job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationState {
    Running,
    Succeeded,
    Failed,
    Killed,
}

impl CommunicationState {
    /// Terminal states; a finished task never runs again
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Killed)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Aggregate two states: any failure or kill fails the whole, any running
    /// keeps it running, otherwise succeeded
    pub fn merge(self, other: Self) -> Self {
        match (self, other) {
            (Self::Failed | Self::Killed, _) | (_, Self::Failed | Self::Killed) => Self::Failed,
            (Self::Running, _) | (_, Self::Running) => Self::Running,
            _ => Self::Succeeded,
        }
    }
}

impl fmt::Display for CommunicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::Killed => write!(f, "killed"),
        }
    }
}

/// Named counters tracked for every task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Counter {
    ReadSucceedRecords,
    ReadSucceedBytes,
    ReadFailedRecords,
    ReadFailedBytes,
    WriteReceivedRecords,
    WriteReceivedBytes,
    WriteFailedRecords,
    WriteFailedBytes,
    TransformerSucceedRecords,
    TransformerFailedRecords,
    TransformerFilterRecords,
    TransformerUsedNanos,
    WaitReaderNanos,
    WaitWriterNanos,
    Stage,
}

impl Counter {
    pub const COUNT: usize = 15;

    pub const ALL: [Counter; Counter::COUNT] = [
        Counter::ReadSucceedRecords,
        Counter::ReadSucceedBytes,
        Counter::ReadFailedRecords,
        Counter::ReadFailedBytes,
        Counter::WriteReceivedRecords,
        Counter::WriteReceivedBytes,
        Counter::WriteFailedRecords,
        Counter::WriteFailedBytes,
        Counter::TransformerSucceedRecords,
        Counter::TransformerFailedRecords,
        Counter::TransformerFilterRecords,
        Counter::TransformerUsedNanos,
        Counter::WaitReaderNanos,
        Counter::WaitWriterNanos,
        Counter::Stage,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ReadSucceedRecords => "readSucceedRecords",
            Self::ReadSucceedBytes => "readSucceedBytes",
            Self::ReadFailedRecords => "readFailedRecords",
            Self::ReadFailedBytes => "readFailedBytes",
            Self::WriteReceivedRecords => "writeReceivedRecords",
            Self::WriteReceivedBytes => "writeReceivedBytes",
            Self::WriteFailedRecords => "writeFailedRecords",
            Self::WriteFailedBytes => "writeFailedBytes",
            Self::TransformerSucceedRecords => "totalTransformerSuccessRecords",
            Self::TransformerFailedRecords => "totalTransformerFailedRecords",
            Self::TransformerFilterRecords => "totalTransformerFilterRecords",
            Self::TransformerUsedNanos => "totalTransformerUsedTime",
            Self::WaitReaderNanos => "waitReaderTime",
            Self::WaitWriterNanos => "waitWriterTime",
            Self::Stage => "stage",
        }
    }
}

#[derive(Debug)]
struct Status {
    state: CommunicationState,
    error: Option<SyncError>,
    timestamp_ms: i64,
}

/// Live per-task statistics and state
#[derive(Debug)]
pub struct Communication {
    counters: [AtomicU64; Counter::COUNT],
    status: Mutex<Status>,
    messages: Mutex<HashMap<String, Vec<String>>>,
}

impl Default for Communication {
    fn default() -> Self {
        Self::new()
    }
}

impl Communication {
    pub fn new() -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
            status: Mutex::new(Status {
                state: CommunicationState::Running,
                error: None,
                timestamp_ms: now_ms(),
            }),
            messages: Mutex::new(HashMap::new()),
        }
    }

    pub fn increase(&self, counter: Counter, delta: u64) {
        self.counters[counter.index()].fetch_add(delta, Ordering::Relaxed);
    }

    /// Publish a running total; counters never move backwards
    pub fn raise_to(&self, counter: Counter, value: u64) {
        self.counters[counter.index()].fetch_max(value, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()].load(Ordering::Relaxed)
    }

    pub fn state(&self) -> CommunicationState {
        self.status.lock().state
    }

    /// Change state unless the task has already failed
    pub fn set_state(&self, state: CommunicationState) {
        let mut status = self.status.lock();
        if status.state == CommunicationState::Failed {
            return;
        }
        status.state = state;
    }

    /// Change state unconditionally
    pub fn force_state(&self, state: CommunicationState) {
        self.status.lock().state = state;
    }

    pub fn error(&self) -> Option<SyncError> {
        self.status.lock().error.clone()
    }

    /// Capture an error; only the first one is kept
    pub fn set_error(&self, error: SyncError) {
        let mut status = self.status.lock();
        if status.error.is_none() {
            status.error = Some(error);
        }
    }

    /// Fail the task with `error` as its cause
    pub fn mark_failed(&self, error: SyncError) {
        let mut status = self.status.lock();
        status.state = CommunicationState::Failed;
        status.timestamp_ms = now_ms();
        if status.error.is_none() {
            status.error = Some(error);
        }
    }

    /// Complete one stage and mark the task succeeded unless it already failed
    pub fn mark_succeeded(&self) {
        self.increase(Counter::Stage, 1);
        self.set_state(CommunicationState::Succeeded);
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.status.lock().timestamp_ms
    }

    pub fn touch(&self) {
        self.status.lock().timestamp_ms = now_ms();
    }

    pub fn add_message(&self, key: impl Into<String>, message: impl Into<String>) {
        self.messages
            .lock()
            .entry(key.into())
            .or_default()
            .push(message.into());
    }

    pub fn messages(&self, key: &str) -> Vec<String> {
        self.messages.lock().get(key).cloned().unwrap_or_default()
    }

    /// Consistent-enough copy for aggregation and reporting
    pub fn snapshot(&self) -> CommunicationSnapshot {
        let counters = std::array::from_fn(|i| self.counters[i].load(Ordering::Relaxed));
        let status = self.status.lock();
        CommunicationSnapshot {
            counters,
            state: status.state,
            error: status.error.clone(),
            timestamp_ms: now_ms(),
            messages: self.messages.lock().clone(),
        }
    }
}

/// Immutable copy of one or more communications
#[derive(Debug, Clone, PartialEq)]
pub struct CommunicationSnapshot {
    counters: [u64; Counter::COUNT],
    state: CommunicationState,
    error: Option<SyncError>,
    timestamp_ms: i64,
    messages: HashMap<String, Vec<String>>,
}

impl CommunicationSnapshot {
    /// Zero counters in the given state, the identity element for merging
    /// when `state` is `Succeeded`
    pub fn empty(state: CommunicationState) -> Self {
        Self {
            counters: [0; Counter::COUNT],
            state,
            error: None,
            timestamp_ms: now_ms(),
            messages: HashMap::new(),
        }
    }

    /// Sum a set of snapshots on top of a `Succeeded` base
    pub fn sum<'a>(snapshots: impl IntoIterator<Item = &'a CommunicationSnapshot>) -> Self {
        let mut total = Self::empty(CommunicationState::Succeeded);
        for snapshot in snapshots {
            total.merge(snapshot);
        }
        total
    }

    /// Add `other` into `self`: counters sum, states merge, first error wins
    pub fn merge(&mut self, other: &CommunicationSnapshot) {
        for (mine, theirs) in self.counters.iter_mut().zip(other.counters.iter()) {
            *mine += theirs;
        }
        self.state = self.state.merge(other.state);
        if self.error.is_none() {
            self.error = other.error.clone();
        }
        self.timestamp_ms = self.timestamp_ms.max(other.timestamp_ms);
        for (key, values) in &other.messages {
            self.messages
                .entry(key.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.index()]
    }

    pub fn state(&self) -> CommunicationState {
        self.state
    }

    pub fn error(&self) -> Option<&SyncError> {
        self.error.as_ref()
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }

    /// Override state and error, e.g. when a supervisor fails a whole group
    pub fn with_failure(mut self, error: SyncError) -> Self {
        self.state = CommunicationState::Failed;
        if self.error.is_none() {
            self.error = Some(error);
        }
        self
    }

    pub fn with_state(mut self, state: CommunicationState) -> Self {
        self.state = state;
        self
    }

    pub fn messages(&self, key: &str) -> &[String] {
        self.messages.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn total_read_records(&self) -> u64 {
        self.get(Counter::ReadSucceedRecords) + self.get(Counter::ReadFailedRecords)
    }

    pub fn total_read_bytes(&self) -> u64 {
        self.get(Counter::ReadSucceedBytes) + self.get(Counter::ReadFailedBytes)
    }

    pub fn total_error_records(&self) -> u64 {
        self.get(Counter::ReadFailedRecords) + self.get(Counter::WriteFailedRecords)
    }

    pub fn total_error_bytes(&self) -> u64 {
        self.get(Counter::ReadFailedBytes) + self.get(Counter::WriteFailedBytes)
    }

    pub fn write_succeed_records(&self) -> u64 {
        self.get(Counter::WriteReceivedRecords)
            .saturating_sub(self.get(Counter::WriteFailedRecords))
    }

    pub fn write_succeed_bytes(&self) -> u64 {
        self.get(Counter::WriteReceivedBytes)
            .saturating_sub(self.get(Counter::WriteFailedBytes))
    }

    /// Counter values keyed by their report names
    pub fn counters_by_name(&self) -> HashMap<&'static str, u64> {
        Counter::ALL.iter().map(|c| (c.name(), self.get(*c))).collect()
    }
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
