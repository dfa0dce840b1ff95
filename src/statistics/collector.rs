//! # Dirty Record Collector
//!
//! Handed to every task plugin. A record that cannot be read, transformed or
//! written is reported here instead of failing the task: it is counted against
//! the side it came from and the first few are logged in full.

use super::communication::{Communication, Counter};
use crate::element::Record;
use crate::error::PluginKind;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Message key under which collected dirty-record descriptions are stored
pub const DIRTY_RECORD_MESSAGE_KEY: &str = "dirtyRecords";

/// Per-task dirty record and message sink
#[derive(Debug, Clone)]
pub struct TaskPluginCollector {
    kind: PluginKind,
    task_id: usize,
    communication: Arc<Communication>,
    max_logged: u64,
    logged: Arc<AtomicU64>,
}

impl TaskPluginCollector {
    pub fn new(kind: PluginKind, task_id: usize, communication: Arc<Communication>, max_logged: u64) -> Self {
        Self {
            kind,
            task_id,
            communication,
            max_logged,
            logged: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Same sink, counted against the other plugin side
    pub fn for_kind(&self, kind: PluginKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    pub fn kind(&self) -> PluginKind {
        self.kind
    }

    /// Count a dirty record and log it while under the logging cap
    pub fn collect_dirty_record(&self, record: &Record, reason: impl fmt::Display) {
        let bytes = record.byte_size() as u64;
        match self.kind {
            PluginKind::Writer => {
                self.communication.increase(Counter::WriteFailedRecords, 1);
                self.communication.increase(Counter::WriteFailedBytes, bytes);
            }
            PluginKind::Reader | PluginKind::Handler => {
                self.communication.increase(Counter::ReadFailedRecords, 1);
                self.communication.increase(Counter::ReadFailedBytes, bytes);
            }
        }

        let seen = self.logged.fetch_add(1, Ordering::Relaxed);
        if seen < self.max_logged {
            let description = format!("{reason}: [{record}]");
            warn!(
                task_id = self.task_id,
                plugin_kind = %self.kind,
                record_bytes = bytes,
                "🗑️ Dirty record: {description}"
            );
            self.communication.add_message(DIRTY_RECORD_MESSAGE_KEY, description);
        }
    }

    /// Attach a free-form message to the task's communication
    pub fn collect_message(&self, key: impl Into<String>, message: impl Into<String>) {
        self.communication.add_message(key, message);
    }
}
