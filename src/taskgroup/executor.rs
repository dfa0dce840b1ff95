//! # Task Executor
//!
//! One attempt of one task: a reader thread and a writer thread joined by a
//! bounded [`Channel`]. The writer is started first so the channel always has
//! a consumer before the reader produces.

use super::runner::{ReaderRunner, WriterRunner};
use crate::error::{PluginKind, Result, SyncError};
use crate::job::{JobRunContext, TaskConfig};
use crate::plugin::TaskPluginContext;
use crate::statistics::{Communication, TaskPluginCollector};
use crate::transport::{
    BufferedRecordExchanger, Channel, RecordSender, ShutdownSignal, TransformerExchanger,
};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

pub struct TaskExecutor {
    task_group_id: usize,
    task_id: usize,
    attempt: u32,
    communication: Arc<Communication>,
    channel: Arc<Channel>,
    supports_failover: bool,
    runners: Option<(ReaderRunner, WriterRunner)>,
    reader_handle: Option<JoinHandle<()>>,
    writer_handle: Option<JoinHandle<()>>,
}

impl TaskExecutor {
    /// Resolve both plugins and wire the channel for one attempt
    ///
    /// `communication` must be fresh for this attempt.
    pub fn new(
        context: &JobRunContext,
        task_group_id: usize,
        task: &TaskConfig,
        attempt: u32,
        communication: Arc<Communication>,
    ) -> Result<Self> {
        let reader_plugin = context.plugins.reader(&task.reader.name)?;
        let writer_plugin = context.plugins.writer(&task.writer.name)?;
        let core = &context.core;

        let channel = Arc::new(Channel::new(
            &core.transport.channel,
            Arc::clone(&communication),
            ShutdownSignal::new(),
        ));
        let reader_collector = TaskPluginCollector::new(
            PluginKind::Reader,
            task.task_id,
            Arc::clone(&communication),
            core.statistics.collector.max_dirty_number,
        );
        let writer_collector = reader_collector.for_kind(PluginKind::Writer);
        let buffer_size = core.transport.exchanger.buffer_size;

        let reader_exchanger =
            BufferedRecordExchanger::new(Arc::clone(&channel), reader_collector.clone(), buffer_size);
        let sender: Box<dyn RecordSender> = if task.transformer.is_empty() {
            Box::new(reader_exchanger)
        } else {
            let executions = context.transformers.build_executions(&task.transformer)?;
            Box::new(TransformerExchanger::new(
                reader_exchanger,
                executions,
                Arc::clone(&communication),
            ))
        };
        let receiver = Box::new(BufferedRecordExchanger::new(
            Arc::clone(&channel),
            writer_collector.clone(),
            buffer_size,
        ));

        let writer_task = writer_plugin.create_task();
        let supports_failover = writer_task.supports_failover();

        let reader = ReaderRunner {
            plugin_name: task.reader.name.clone(),
            task: reader_plugin.create_task(),
            sender,
            context: TaskPluginContext {
                task_group_id,
                task_id: task.task_id,
                parameter: task.reader.parameter(),
                peer_plugin_name: task.writer.name.clone(),
                peer_parameter: task.writer.parameter(),
                collector: reader_collector,
            },
            communication: Arc::clone(&communication),
        };
        let writer = WriterRunner {
            plugin_name: task.writer.name.clone(),
            task: writer_task,
            receiver,
            context: TaskPluginContext {
                task_group_id,
                task_id: task.task_id,
                parameter: task.writer.parameter(),
                peer_plugin_name: task.reader.name.clone(),
                peer_parameter: task.reader.parameter(),
                collector: writer_collector,
            },
            communication: Arc::clone(&communication),
        };

        Ok(Self {
            task_group_id,
            task_id: task.task_id,
            attempt,
            communication,
            channel,
            supports_failover,
            runners: Some((reader, writer)),
            reader_handle: None,
            writer_handle: None,
        })
    }

    /// Spawn the writer, then the reader
    ///
    /// Fails only if the writer died before the reader was launched. A failure
    /// recorded after the reader is running is left for the task group scan,
    /// which decides whether the attempt is retried.
    pub fn start(&mut self) -> Result<()> {
        let (reader, writer) = self.runners.take().ok_or_else(|| {
            SyncError::internal(format!("task {} attempt {} already started", self.task_id, self.attempt))
        })?;

        let writer_handle = thread::Builder::new()
            .name(format!("writer-{}-{}", self.task_group_id, self.task_id))
            .spawn(move || writer.run())
            .map_err(|e| SyncError::io("spawn writer thread", e))?;
        let writer_exited = writer_handle.is_finished();
        self.writer_handle = Some(writer_handle);
        if writer_exited || self.communication.state().is_failed() {
            self.shutdown();
            return Err(self.start_failure());
        }

        let reader_handle = thread::Builder::new()
            .name(format!("reader-{}-{}", self.task_group_id, self.task_id))
            .spawn(move || reader.run())
            .map_err(|e| SyncError::io("spawn reader thread", e))?;
        self.reader_handle = Some(reader_handle);

        info!(
            task_group_id = self.task_group_id,
            task_id = self.task_id,
            attempt = self.attempt,
            "🚀 Task started"
        );
        Ok(())
    }

    fn start_failure(&self) -> SyncError {
        self.communication.error().unwrap_or_else(|| {
            SyncError::internal(format!(
                "task {} writer thread exited before the reader started",
                self.task_id
            ))
        })
    }

    /// Ask both threads to stop; they exit at their next channel operation
    pub fn shutdown(&self) {
        debug!(task_group_id = self.task_group_id, task_id = self.task_id, "Shutting down task");
        self.channel.shutdown();
    }

    /// True once neither thread is alive
    pub fn is_shutdown(&self) -> bool {
        let exited = |handle: &Option<JoinHandle<()>>| handle.as_ref().map_or(true, JoinHandle::is_finished);
        exited(&self.reader_handle) && exited(&self.writer_handle)
    }

    /// Both threads exited and the task reached a terminal state
    pub fn is_finished(&self) -> bool {
        self.is_shutdown() && self.communication.is_finished()
    }

    pub fn task_id(&self) -> usize {
        self.task_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn supports_failover(&self) -> bool {
        self.supports_failover
    }

    pub fn communication(&self) -> &Arc<Communication> {
        &self.communication
    }
}

impl std::fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("task_group_id", &self.task_group_id)
            .field("task_id", &self.task_id)
            .field("attempt", &self.attempt)
            .field("state", &self.communication.state())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Configuration, CoreConfig};
    use crate::error::ErrorKind;
    use crate::job::PluginSlice;
    use crate::plugin::{JobPluginContext, PluginRegistry, WriterJob, WriterPlugin, WriterTask};
    use crate::statistics::CommunicationState;
    use crate::transport::{RecordReceiver, TransformerRegistry};
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn context() -> JobRunContext {
        JobRunContext::new(
            Arc::new(CoreConfig::default()),
            Arc::new(PluginRegistry::with_builtins()),
            Arc::new(TransformerRegistry::with_builtins()),
        )
    }

    fn stream_task(records: u64) -> TaskConfig {
        TaskConfig {
            task_id: 3,
            reader: PluginSlice::new(
                "streamreader",
                Configuration::from_value(json!({
                    "sliceRecordCount": records,
                    "column": [{ "type": "long", "value": "1" }]
                })),
            ),
            writer: PluginSlice::new("streamwriter", Configuration::new()),
            transformer: vec![],
        }
    }

    fn wait_finished(executor: &TaskExecutor) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !executor.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_executor_runs_task_to_success() {
        let comm = Arc::new(Communication::new());
        let mut executor = TaskExecutor::new(&context(), 0, &stream_task(250), 1, comm.clone()).unwrap();
        assert!(executor.supports_failover());
        executor.start().unwrap();
        wait_finished(&executor);

        assert!(executor.is_finished());
        assert_eq!(comm.state(), CommunicationState::Succeeded);
        let snapshot = comm.snapshot();
        assert_eq!(snapshot.total_read_records(), 250);
        assert_eq!(snapshot.write_succeed_records(), 250);
    }

    #[test]
    fn test_executor_rejects_unknown_plugin() {
        let mut task = stream_task(1);
        task.writer.name = "nowhere".to_string();
        let error = TaskExecutor::new(&context(), 0, &task, 1, Arc::new(Communication::new())).unwrap_err();
        assert!(matches!(error, SyncError::PluginNotFound { kind: PluginKind::Writer, .. }));
    }

    #[test]
    fn test_executor_cannot_start_twice() {
        let comm = Arc::new(Communication::new());
        let mut executor = TaskExecutor::new(&context(), 0, &stream_task(1), 1, comm).unwrap();
        executor.start().unwrap();
        assert!(executor.start().is_err());
        wait_finished(&executor);
    }

    #[test]
    fn test_reader_init_failure_marks_task_failed() {
        let mut task = stream_task(1);
        task.reader.parameter = json!({ "column": [] });
        let comm = Arc::new(Communication::new());
        let mut executor = TaskExecutor::new(&context(), 0, &task, 1, comm.clone()).unwrap();
        // the reader may fail before or after start returns
        let _ = executor.start();
        wait_finished(&executor);

        assert_eq!(comm.state(), CommunicationState::Failed);
        assert_eq!(comm.error().unwrap().kind(), crate::error::ErrorKind::Configuration);
    }

    const REJECTING_WRITER: &str = "rejectingwriter";

    /// Fails on the very first record it receives
    struct RejectingWriter;

    impl WriterPlugin for RejectingWriter {
        fn name(&self) -> &str {
            REJECTING_WRITER
        }

        fn create_job(&self) -> Box<dyn WriterJob> {
            Box::new(RejectingWriterJob)
        }

        fn create_task(&self) -> Box<dyn WriterTask> {
            Box::new(RejectingWriterTask)
        }
    }

    struct RejectingWriterJob;

    impl WriterJob for RejectingWriterJob {
        fn init(&mut self, _context: &JobPluginContext) -> Result<()> {
            Ok(())
        }

        fn split(&mut self, mandatory_number: usize) -> Result<Vec<Configuration>> {
            Ok(vec![Configuration::new(); mandatory_number])
        }
    }

    struct RejectingWriterTask;

    impl WriterTask for RejectingWriterTask {
        fn init(&mut self, _context: &TaskPluginContext) -> Result<()> {
            Ok(())
        }

        fn start_write(&mut self, receiver: &mut dyn RecordReceiver) -> Result<()> {
            receiver.get_from_reader()?;
            Err(SyncError::plugin_runtime(
                PluginKind::Writer,
                REJECTING_WRITER,
                "rejected the first record",
            ))
        }

        fn supports_failover(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_writer_failing_on_first_record_is_left_to_the_scan() {
        let mut plugins = PluginRegistry::with_builtins();
        plugins.register_writer(Arc::new(RejectingWriter));
        let context = JobRunContext::new(
            Arc::new(CoreConfig::default()),
            Arc::new(plugins),
            Arc::new(TransformerRegistry::with_builtins()),
        );
        let mut task = stream_task(10);
        task.writer.name = REJECTING_WRITER.to_string();

        for attempt in 1..=5 {
            let comm = Arc::new(Communication::new());
            let mut executor = TaskExecutor::new(&context, 0, &task, attempt, comm.clone()).unwrap();
            assert!(executor.supports_failover());
            executor.start().unwrap();
            wait_finished(&executor);

            assert_eq!(comm.state(), CommunicationState::Failed);
            assert_eq!(comm.error().unwrap().kind(), ErrorKind::PluginRuntime);
        }
    }
}
