//! # Plugin Contract
//!
//! Connectors are split in two levels, each with its own lifecycle:
//!
//! - **Job level** ([`ReaderJob`] / [`WriterJob`]): runs once per job on the
//!   job container's thread. `init → prepare → split → post → destroy`, with
//!   an optional `pre_check` for dry runs.
//! - **Task level** ([`ReaderTask`] / [`WriterTask`]): one instance per split
//!   slice, each on its own thread. `init → prepare → start_read/start_write
//!   → post → destroy`.
//!
//! A [`ReaderPlugin`] / [`WriterPlugin`] is the factory for both levels and is
//! registered by name in a [`PluginRegistry`]. [`HandlerPlugin`]s run before
//! and after the whole job.

pub mod registry;
pub mod stream;

use crate::config::Configuration;
use crate::error::Result;
use crate::statistics::TaskPluginCollector;
use crate::transport::{RecordReceiver, RecordSender};

pub use registry::PluginRegistry;
pub use stream::{StreamReaderPlugin, StreamWriterPlugin};

/// What a job-level plugin sees at init
#[derive(Debug, Clone)]
pub struct JobPluginContext {
    /// This plugin's `parameter` object
    pub parameter: Configuration,
    /// Name of the plugin on the other side of the channel
    pub peer_plugin_name: String,
    /// The other plugin's `parameter` object
    pub peer_parameter: Configuration,
    pub dry_run: bool,
}

/// What a task-level plugin sees at init
#[derive(Debug, Clone)]
pub struct TaskPluginContext {
    pub task_group_id: usize,
    pub task_id: usize,
    /// This task's slice of the plugin parameters
    pub parameter: Configuration,
    pub peer_plugin_name: String,
    pub peer_parameter: Configuration,
    /// Sink for records this task cannot handle
    pub collector: TaskPluginCollector,
}

pub trait ReaderJob: Send {
    fn init(&mut self, context: &JobPluginContext) -> Result<()>;

    /// Connectivity and permission checks for dry runs
    fn pre_check(&mut self) -> Result<()> {
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Split into independently readable slices, ideally `advice_number` of them
    fn split(&mut self, advice_number: usize) -> Result<Vec<Configuration>>;

    fn post(&mut self) -> Result<()> {
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        Ok(())
    }
}

pub trait WriterJob: Send {
    fn init(&mut self, context: &JobPluginContext) -> Result<()>;

    fn pre_check(&mut self) -> Result<()> {
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Split into exactly `mandatory_number` slices, one per reader slice
    fn split(&mut self, mandatory_number: usize) -> Result<Vec<Configuration>>;

    fn post(&mut self) -> Result<()> {
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        Ok(())
    }
}

pub trait ReaderTask: Send {
    fn init(&mut self, context: &TaskPluginContext) -> Result<()>;

    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Read the slice and hand every record to `sender`
    fn start_read(&mut self, sender: &mut dyn RecordSender) -> Result<()>;

    fn post(&mut self) -> Result<()> {
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        Ok(())
    }
}

pub trait WriterTask: Send {
    fn init(&mut self, context: &TaskPluginContext) -> Result<()>;

    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }

    /// Drain `receiver` until it returns `None`
    fn start_write(&mut self, receiver: &mut dyn RecordReceiver) -> Result<()>;

    fn post(&mut self) -> Result<()> {
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether a failed attempt of this task may be retried from scratch
    fn supports_failover(&self) -> bool {
        false
    }
}

/// Factory for a named reader connector
pub trait ReaderPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn create_job(&self) -> Box<dyn ReaderJob>;
    fn create_task(&self) -> Box<dyn ReaderTask>;
}

/// Factory for a named writer connector
pub trait WriterPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn create_job(&self) -> Box<dyn WriterJob>;
    fn create_task(&self) -> Box<dyn WriterTask>;
}

/// Hook that runs around the whole job
pub trait HandlerPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Runs before reader/writer init and may rewrite the job document
    fn pre_handle(&self, _job: &mut Configuration) -> Result<()> {
        Ok(())
    }

    /// Runs after both job-level `post` hooks
    fn post_handle(&self, _job: &Configuration) -> Result<()> {
        Ok(())
    }
}
