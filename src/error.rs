//! # Engine Error Types
//!
//! One closed error type for the whole engine. Every failure a job can hit is a
//! variant of [`SyncError`], and [`SyncError::kind`] folds the variants into the
//! coarse [`ErrorKind`] classes the propagation policy is written against:
//!
//! - configuration errors are fatal before any task starts
//! - plugin runtime errors fail the task and, unless retried, the job
//! - dirty-data errors stay record-scoped and only count toward the limits
//! - hung tasks and failover wait overruns fail the owning task group
//!
//! The type is `Clone` so that a captured cause can live inside a task's
//! communication and still be handed back to the job container intact.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Which side of the channel a plugin sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    Reader,
    Writer,
    Handler,
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reader => write!(f, "reader"),
            Self::Writer => write!(f, "writer"),
            Self::Handler => write!(f, "handler"),
        }
    }
}

/// Coarse classification used by the propagation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    PluginRuntime,
    DirtyData,
    HungTask,
    FailoverWaitExceeded,
    Cancelled,
    LimitExceeded,
    Internal,
}

/// All errors raised by the engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Plugin not found: {kind} '{name}' is not registered")]
    PluginNotFound { kind: PluginKind, name: String },

    #[error("Reader plugin '{plugin}' split into zero tasks")]
    EmptySplit { plugin: String },

    #[error("Split mismatch: reader produced {reader_count} slices but writer produced {writer_count}")]
    SplitMismatch {
        reader_count: usize,
        writer_count: usize,
    },

    #[error("Job {dimension} limit is set but no per-channel {dimension} limit is configured")]
    ChannelSpeedMissing { dimension: String },

    #[error("{kind} plugin '{plugin}' failed: {message}")]
    PluginRuntime {
        kind: PluginKind,
        plugin: String,
        message: String,
    },

    #[error("Dirty record: {message}")]
    DirtyRecord { message: String },

    #[error("Cannot convert column of type {from} to {to}: {value}")]
    ColumnConversion {
        from: String,
        to: String,
        value: String,
    },

    #[error("Transformer '{name}' has an illegal parameter: {message}")]
    TransformerIllegalParameter { name: String, message: String },

    #[error("Transformer '{name}' failed: {message}")]
    TransformerRuntime { name: String, message: String },

    #[error("Task {task_id} hung: no records read for {idle_ms}ms (read so far: {read_records})")]
    TaskHung {
        task_id: usize,
        idle_ms: u64,
        read_records: u64,
    },

    #[error("Task {task_id} failover wait exceeded: previous attempt still alive after {waited_ms}ms")]
    FailoverWaitExceeded { task_id: usize, waited_ms: u64 },

    #[error("Task {task_id} was killed")]
    TaskKilled { task_id: usize },

    #[error("Task group {task_group_id} failed: {source}")]
    TaskGroupFailed {
        task_group_id: usize,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Job cancelled: {reason}")]
    Cancelled { reason: String },

    #[error("Dirty record limit exceeded: limit {limit}, actual {actual}")]
    DirtyRecordLimitExceeded { limit: u64, actual: u64 },

    #[error("Dirty record percentage exceeded: limit {limit:.4}, actual {actual:.4}")]
    DirtyPercentageExceeded { limit: f64, actual: f64 },

    #[error("Operation on shut down {component}")]
    Shutdown { component: String },

    #[error("Statistics report failed: {message}")]
    Report { message: String },

    #[error("I/O error in {context}: {message}")]
    Io { context: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn plugin_runtime(kind: PluginKind, plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PluginRuntime {
            kind,
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    pub fn dirty(message: impl Into<String>) -> Self {
        Self::DirtyRecord {
            message: message.into(),
        }
    }

    pub fn shutdown(component: impl Into<String>) -> Self {
        Self::Shutdown {
            component: component.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, error: impl fmt::Display) -> Self {
        Self::Io {
            context: context.into(),
            message: error.to_string(),
        }
    }

    /// Classify the error for the propagation policy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. }
            | Self::PluginNotFound { .. }
            | Self::EmptySplit { .. }
            | Self::SplitMismatch { .. }
            | Self::ChannelSpeedMissing { .. }
            | Self::TransformerIllegalParameter { .. } => ErrorKind::Configuration,
            Self::PluginRuntime { .. } | Self::Io { .. } => ErrorKind::PluginRuntime,
            Self::DirtyRecord { .. }
            | Self::ColumnConversion { .. }
            | Self::TransformerRuntime { .. } => ErrorKind::DirtyData,
            Self::TaskHung { .. } => ErrorKind::HungTask,
            Self::FailoverWaitExceeded { .. } => ErrorKind::FailoverWaitExceeded,
            Self::TaskKilled { .. } | Self::Cancelled { .. } | Self::Shutdown { .. } => {
                ErrorKind::Cancelled
            }
            Self::DirtyRecordLimitExceeded { .. } | Self::DirtyPercentageExceeded { .. } => {
                ErrorKind::LimitExceeded
            }
            Self::TaskGroupFailed { source, .. } => source.kind(),
            Self::Report { .. } | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Strip task-group wrappers and return the originating error
    pub fn root_cause(&self) -> &SyncError {
        match self {
            Self::TaskGroupFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Record-scoped errors never fail a task by themselves
    pub fn is_record_scoped(&self) -> bool {
        self.kind() == ErrorKind::DirtyData
    }
}

impl From<crate::config::ConfigurationError> for SyncError {
    fn from(error: crate::config::ConfigurationError) -> Self {
        Self::Configuration {
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(error: serde_json::Error) -> Self {
        Self::Configuration {
            message: format!("invalid JSON: {error}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
