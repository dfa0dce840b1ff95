//! Thread bodies for the two halves of a task.
//!
//! Each runner drives its plugin through the task lifecycle and records the
//! outcome in the task communication. A plugin error or panic never escapes
//! the thread; it becomes the task's FAILED state and captured cause.

use crate::error::{PluginKind, SyncError};
use crate::plugin::{ReaderTask, TaskPluginContext, WriterTask};
use crate::statistics::Communication;
use crate::transport::{RecordReceiver, RecordSender};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub(crate) struct ReaderRunner {
    pub plugin_name: String,
    pub task: Box<dyn ReaderTask>,
    pub sender: Box<dyn RecordSender>,
    pub context: TaskPluginContext,
    pub communication: Arc<Communication>,
}

impl ReaderRunner {
    pub fn run(mut self) {
        let outcome = catch_unwind(AssertUnwindSafe(|| -> crate::error::Result<()> {
            self.task.init(&self.context)?;
            self.task.prepare()?;
            self.task.start_read(self.sender.as_mut())?;
            self.sender.terminate()?;
            self.task.post()
        }));
        record_outcome(
            outcome,
            PluginKind::Reader,
            &self.plugin_name,
            self.context.task_id,
            &self.communication,
        );

        let destroyed = catch_unwind(AssertUnwindSafe(|| self.task.destroy()));
        log_destroy(destroyed, PluginKind::Reader, &self.plugin_name, self.context.task_id);
    }
}

pub(crate) struct WriterRunner {
    pub plugin_name: String,
    pub task: Box<dyn WriterTask>,
    pub receiver: Box<dyn RecordReceiver>,
    pub context: TaskPluginContext,
    pub communication: Arc<Communication>,
}

impl WriterRunner {
    pub fn run(mut self) {
        let outcome = catch_unwind(AssertUnwindSafe(|| -> crate::error::Result<()> {
            self.task.init(&self.context)?;
            self.task.prepare()?;
            self.task.start_write(self.receiver.as_mut())?;
            self.task.post()
        }));
        let succeeded = matches!(outcome, Ok(Ok(())));
        record_outcome(
            outcome,
            PluginKind::Writer,
            &self.plugin_name,
            self.context.task_id,
            &self.communication,
        );
        if succeeded {
            self.communication.mark_succeeded();
        }

        // a writer that stopped consuming must not leave the reader blocked
        self.receiver.shutdown();

        let destroyed = catch_unwind(AssertUnwindSafe(|| self.task.destroy()));
        log_destroy(destroyed, PluginKind::Writer, &self.plugin_name, self.context.task_id);
    }
}

fn record_outcome(
    outcome: std::thread::Result<crate::error::Result<()>>,
    kind: PluginKind,
    plugin: &str,
    task_id: usize,
    communication: &Communication,
) {
    match outcome {
        Ok(Ok(())) => debug!(task_id = task_id, plugin = plugin, "{kind} task finished"),
        Ok(Err(cause)) => {
            error!(task_id = task_id, plugin = plugin, error = %cause, "❌ {kind} task failed");
            communication.mark_failed(cause);
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(task_id = task_id, plugin = plugin, panic = %message, "💥 {kind} task panicked");
            communication.mark_failed(SyncError::plugin_runtime(kind, plugin, format!("panicked: {message}")));
        }
    }
}

fn log_destroy(
    destroyed: std::thread::Result<crate::error::Result<()>>,
    kind: PluginKind,
    plugin: &str,
    task_id: usize,
) {
    match destroyed {
        Ok(Ok(())) => {}
        Ok(Err(cause)) => warn!(task_id = task_id, plugin = plugin, error = %cause, "{kind} task destroy failed"),
        Err(panic) => warn!(
            task_id = task_id,
            plugin = plugin,
            panic = %panic_message(panic.as_ref()),
            "{kind} task destroy panicked"
        ),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
