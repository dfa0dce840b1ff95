//! In-memory connectors for driving jobs end to end without external systems.

#![allow(dead_code)]

use batchsync_core::config::Configuration;
use batchsync_core::element::{Column, Record};
use batchsync_core::error::{PluginKind, Result, SyncError};
use batchsync_core::plugin::{
    HandlerPlugin, JobPluginContext, ReaderJob, ReaderPlugin, ReaderTask, TaskPluginContext, WriterJob, WriterPlugin,
    WriterTask,
};
use batchsync_core::statistics::TaskPluginCollector;
use batchsync_core::transport::{RecordReceiver, RecordSender};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub const MEMORY_READER: &str = "memoryreader";
pub const DIRTY_READER: &str = "dirtyreader";
pub const HANGING_READER: &str = "hangingreader";
pub const DEAF_READER: &str = "deafreader";
pub const RECORDING_READER: &str = "recordingreader";
pub const RECORDING_WRITER: &str = "recordingwriter";
pub const RECORDING_HANDLER: &str = "recordinghandler";
pub const COLLECTING_WRITER: &str = "collectingwriter";
pub const FLAKY_WRITER: &str = "flakywriter";

/// Splits into `slices` slices (or the advice) of `rows` records each
///
/// Record `i` of slice `s` is `[Long(s * 1_000_000 + i), String("row-i")]`.
#[derive(Debug, Default)]
pub struct MemoryReaderPlugin;

impl ReaderPlugin for MemoryReaderPlugin {
    fn name(&self) -> &str {
        MEMORY_READER
    }

    fn create_job(&self) -> Box<dyn ReaderJob> {
        Box::new(SlicingReaderJob::default())
    }

    fn create_task(&self) -> Box<dyn ReaderTask> {
        Box::new(MemoryReaderTask::default())
    }
}

#[derive(Debug, Default)]
struct SlicingReaderJob {
    parameter: Configuration,
}

impl ReaderJob for SlicingReaderJob {
    fn init(&mut self, context: &JobPluginContext) -> Result<()> {
        self.parameter = context.parameter.clone();
        Ok(())
    }

    fn split(&mut self, advice_number: usize) -> Result<Vec<Configuration>> {
        let slices = self
            .parameter
            .get_u64("slices")
            .map_or(advice_number, |slices| slices as usize);
        (0..slices)
            .map(|slice| {
                let mut parameter = self.parameter.clone();
                parameter.set("slice", json!(slice))?;
                Ok(parameter)
            })
            .collect()
    }
}

fn slice_row(slice: u64, index: u64) -> Record {
    Record::from_columns([
        Column::Long((slice * 1_000_000 + index) as i64),
        Column::String(format!("row-{index}")),
    ])
}

#[derive(Debug, Default)]
struct MemoryReaderTask {
    slice: u64,
    rows: u64,
}

impl ReaderTask for MemoryReaderTask {
    fn init(&mut self, context: &TaskPluginContext) -> Result<()> {
        self.slice = context.parameter.get_u64("slice").unwrap_or_default();
        self.rows = context
            .parameter
            .get_u64("rows")
            .ok_or_else(|| SyncError::configuration("memoryreader requires 'rows'"))?;
        Ok(())
    }

    fn start_read(&mut self, sender: &mut dyn RecordSender) -> Result<()> {
        for index in 0..self.rows {
            sender.send_to_writer(slice_row(self.slice, index))?;
        }
        sender.flush()
    }
}

/// Like [`MemoryReaderPlugin`] but also reports `dirty` malformed records per
/// slice to the dirty-record collector
#[derive(Debug, Default)]
pub struct DirtyReaderPlugin;

impl ReaderPlugin for DirtyReaderPlugin {
    fn name(&self) -> &str {
        DIRTY_READER
    }

    fn create_job(&self) -> Box<dyn ReaderJob> {
        Box::new(SlicingReaderJob::default())
    }

    fn create_task(&self) -> Box<dyn ReaderTask> {
        Box::new(DirtyReaderTask::default())
    }
}

#[derive(Debug, Default)]
struct DirtyReaderTask {
    rows: u64,
    dirty: u64,
    collector: Option<TaskPluginCollector>,
}

impl ReaderTask for DirtyReaderTask {
    fn init(&mut self, context: &TaskPluginContext) -> Result<()> {
        self.rows = context.parameter.get_u64("rows").unwrap_or_default();
        self.dirty = context.parameter.get_u64("dirty").unwrap_or_default();
        self.collector = Some(context.collector.clone());
        Ok(())
    }

    fn start_read(&mut self, sender: &mut dyn RecordSender) -> Result<()> {
        let collector = self
            .collector
            .as_ref()
            .ok_or_else(|| SyncError::internal("dirtyreader used before init"))?;
        for index in 0..self.rows {
            sender.send_to_writer(slice_row(0, index))?;
        }
        for index in 0..self.dirty {
            let record = Record::from_columns([Column::String(format!("garbage-{index}"))]);
            collector.collect_dirty_record(&record, "unparseable line");
        }
        sender.flush()
    }
}

/// Never produces a record; spins until its channel is shut down
#[derive(Debug, Default)]
pub struct HangingReaderPlugin;

impl ReaderPlugin for HangingReaderPlugin {
    fn name(&self) -> &str {
        HANGING_READER
    }

    fn create_job(&self) -> Box<dyn ReaderJob> {
        Box::new(SlicingReaderJob::default())
    }

    fn create_task(&self) -> Box<dyn ReaderTask> {
        Box::new(HangingReaderTask)
    }
}

#[derive(Debug)]
struct HangingReaderTask;

impl ReaderTask for HangingReaderTask {
    fn init(&mut self, _context: &TaskPluginContext) -> Result<()> {
        Ok(())
    }

    fn start_read(&mut self, sender: &mut dyn RecordSender) -> Result<()> {
        let deadline = Instant::now() + Duration::from_secs(30);
        while Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
            sender.flush()?;
        }
        Err(SyncError::plugin_runtime(
            PluginKind::Reader,
            HANGING_READER,
            "was never stopped",
        ))
    }
}

/// Sends one record, then sleeps without touching its channel again, so a
/// shutdown request goes unnoticed for `deaf_ms` (default 1000)
#[derive(Debug, Default)]
pub struct DeafReaderPlugin;

impl ReaderPlugin for DeafReaderPlugin {
    fn name(&self) -> &str {
        DEAF_READER
    }

    fn create_job(&self) -> Box<dyn ReaderJob> {
        Box::new(SlicingReaderJob::default())
    }

    fn create_task(&self) -> Box<dyn ReaderTask> {
        Box::new(DeafReaderTask { deaf_for: Duration::ZERO })
    }
}

#[derive(Debug)]
struct DeafReaderTask {
    deaf_for: Duration,
}

impl ReaderTask for DeafReaderTask {
    fn init(&mut self, context: &TaskPluginContext) -> Result<()> {
        self.deaf_for = Duration::from_millis(context.parameter.get_u64("deaf_ms").unwrap_or(1000));
        Ok(())
    }

    fn start_read(&mut self, sender: &mut dyn RecordSender) -> Result<()> {
        sender.send_to_writer(slice_row(0, 0))?;
        sender.flush()?;
        thread::sleep(self.deaf_for);
        Ok(())
    }
}

/// Everything writers received, keyed by task id
#[derive(Debug, Default)]
pub struct Collected {
    records: Mutex<HashMap<usize, Vec<Record>>>,
}

impl Collected {
    pub fn total(&self) -> usize {
        self.records.lock().values().map(Vec::len).sum()
    }

    pub fn task_ids(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.records.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn for_task(&self, task_id: usize) -> Vec<Record> {
        self.records.lock().get(&task_id).cloned().unwrap_or_default()
    }
}

/// Splitting writer job shared by the writer plugins
#[derive(Debug, Default)]
struct CopyingWriterJob {
    parameter: Configuration,
}

impl WriterJob for CopyingWriterJob {
    fn init(&mut self, context: &JobPluginContext) -> Result<()> {
        self.parameter = context.parameter.clone();
        Ok(())
    }

    fn split(&mut self, mandatory_number: usize) -> Result<Vec<Configuration>> {
        Ok(vec![self.parameter.clone(); mandatory_number])
    }
}

/// Stores every record it receives; no failover
#[derive(Debug, Default)]
pub struct CollectingWriterPlugin {
    collected: Arc<Collected>,
}

impl CollectingWriterPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collected(&self) -> Arc<Collected> {
        Arc::clone(&self.collected)
    }
}

impl WriterPlugin for CollectingWriterPlugin {
    fn name(&self) -> &str {
        COLLECTING_WRITER
    }

    fn create_job(&self) -> Box<dyn WriterJob> {
        Box::new(CopyingWriterJob::default())
    }

    fn create_task(&self) -> Box<dyn WriterTask> {
        Box::new(CollectingWriterTask {
            collected: Arc::clone(&self.collected),
            task_id: 0,
            buffer: Vec::new(),
        })
    }
}

struct CollectingWriterTask {
    collected: Arc<Collected>,
    task_id: usize,
    buffer: Vec<Record>,
}

impl WriterTask for CollectingWriterTask {
    fn init(&mut self, context: &TaskPluginContext) -> Result<()> {
        self.task_id = context.task_id;
        Ok(())
    }

    fn start_write(&mut self, receiver: &mut dyn RecordReceiver) -> Result<()> {
        while let Some(record) = receiver.get_from_reader()? {
            self.buffer.push(record);
        }
        Ok(())
    }

    fn post(&mut self) -> Result<()> {
        let records = std::mem::take(&mut self.buffer);
        self.collected.records.lock().entry(self.task_id).or_default().extend(records);
        Ok(())
    }
}

/// Writer whose first `failing_attempts` attempts per task fail after
/// consuming `fail_after` records
#[derive(Debug)]
pub struct FlakyWriterPlugin {
    failing_attempts: u32,
    fail_after: u64,
    failover: bool,
    attempts: Arc<Mutex<HashMap<usize, u32>>>,
    collected: Arc<Collected>,
}

impl FlakyWriterPlugin {
    pub fn new(failing_attempts: u32, fail_after: u64, failover: bool) -> Self {
        Self {
            failing_attempts,
            fail_after,
            failover,
            attempts: Arc::default(),
            collected: Arc::default(),
        }
    }

    /// Attempts started for `task_id` so far
    pub fn attempts(&self, task_id: usize) -> u32 {
        self.attempts.lock().get(&task_id).copied().unwrap_or_default()
    }

    pub fn attempt_counter(&self) -> Arc<Mutex<HashMap<usize, u32>>> {
        Arc::clone(&self.attempts)
    }

    pub fn collected(&self) -> Arc<Collected> {
        Arc::clone(&self.collected)
    }
}

impl WriterPlugin for FlakyWriterPlugin {
    fn name(&self) -> &str {
        FLAKY_WRITER
    }

    fn create_job(&self) -> Box<dyn WriterJob> {
        Box::new(CopyingWriterJob::default())
    }

    fn create_task(&self) -> Box<dyn WriterTask> {
        Box::new(FlakyWriterTask {
            failing_attempts: self.failing_attempts,
            fail_after: self.fail_after,
            failover: self.failover,
            attempts: Arc::clone(&self.attempts),
            collected: Arc::clone(&self.collected),
            task_id: 0,
            attempt: 0,
            buffer: Vec::new(),
        })
    }
}

struct FlakyWriterTask {
    failing_attempts: u32,
    fail_after: u64,
    failover: bool,
    attempts: Arc<Mutex<HashMap<usize, u32>>>,
    collected: Arc<Collected>,
    task_id: usize,
    attempt: u32,
    buffer: Vec<Record>,
}

impl WriterTask for FlakyWriterTask {
    fn init(&mut self, context: &TaskPluginContext) -> Result<()> {
        self.task_id = context.task_id;
        let mut attempts = self.attempts.lock();
        let attempt = attempts.entry(context.task_id).or_default();
        *attempt += 1;
        self.attempt = *attempt;
        Ok(())
    }

    fn start_write(&mut self, receiver: &mut dyn RecordReceiver) -> Result<()> {
        let failing = self.attempt <= self.failing_attempts;
        let mut written = 0u64;
        while let Some(record) = receiver.get_from_reader()? {
            if failing && written >= self.fail_after {
                return Err(SyncError::plugin_runtime(
                    PluginKind::Writer,
                    FLAKY_WRITER,
                    format!("sink rejected batch on attempt {}", self.attempt),
                ));
            }
            self.buffer.push(record);
            written += 1;
        }
        if failing {
            return Err(SyncError::plugin_runtime(
                PluginKind::Writer,
                FLAKY_WRITER,
                format!("sink rejected commit on attempt {}", self.attempt),
            ));
        }
        Ok(())
    }

    fn post(&mut self) -> Result<()> {
        let records = std::mem::take(&mut self.buffer);
        self.collected.records.lock().entry(self.task_id).or_default().extend(records);
        Ok(())
    }

    fn supports_failover(&self) -> bool {
        self.failover
    }
}

/// Ordered log of lifecycle calls shared by the recording plugins
#[derive(Debug, Clone, Default)]
pub struct LifecycleLog {
    entries: Arc<Mutex<Vec<String>>>,
}

impl LifecycleLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }
}

/// Memory reader whose job-level hooks are written to a [`LifecycleLog`]
#[derive(Debug, Default)]
pub struct RecordingReaderPlugin {
    log: LifecycleLog,
}

impl RecordingReaderPlugin {
    pub fn new(log: LifecycleLog) -> Self {
        Self { log }
    }
}

impl ReaderPlugin for RecordingReaderPlugin {
    fn name(&self) -> &str {
        RECORDING_READER
    }

    fn create_job(&self) -> Box<dyn ReaderJob> {
        Box::new(RecordingReaderJob {
            log: self.log.clone(),
            inner: SlicingReaderJob::default(),
        })
    }

    fn create_task(&self) -> Box<dyn ReaderTask> {
        Box::new(MemoryReaderTask::default())
    }
}

struct RecordingReaderJob {
    log: LifecycleLog,
    inner: SlicingReaderJob,
}

impl ReaderJob for RecordingReaderJob {
    fn init(&mut self, context: &JobPluginContext) -> Result<()> {
        self.log.push("reader.init");
        self.inner.init(context)
    }

    fn pre_check(&mut self) -> Result<()> {
        self.log.push("reader.pre_check");
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        self.log.push("reader.prepare");
        Ok(())
    }

    fn split(&mut self, advice_number: usize) -> Result<Vec<Configuration>> {
        self.log.push("reader.split");
        self.inner.split(advice_number)
    }

    fn post(&mut self) -> Result<()> {
        self.log.push("reader.post");
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.log.push("reader.destroy");
        Ok(())
    }
}

/// Writer that logs its job-level hooks and, per task, how many records it saw
#[derive(Debug, Default)]
pub struct RecordingWriterPlugin {
    log: LifecycleLog,
}

impl RecordingWriterPlugin {
    pub fn new(log: LifecycleLog) -> Self {
        Self { log }
    }
}

impl WriterPlugin for RecordingWriterPlugin {
    fn name(&self) -> &str {
        RECORDING_WRITER
    }

    fn create_job(&self) -> Box<dyn WriterJob> {
        Box::new(RecordingWriterJob {
            log: self.log.clone(),
            inner: CopyingWriterJob::default(),
        })
    }

    fn create_task(&self) -> Box<dyn WriterTask> {
        Box::new(RecordingWriterTask {
            log: self.log.clone(),
            received: 0,
        })
    }
}

struct RecordingWriterJob {
    log: LifecycleLog,
    inner: CopyingWriterJob,
}

impl WriterJob for RecordingWriterJob {
    fn init(&mut self, context: &JobPluginContext) -> Result<()> {
        self.log.push("writer.init");
        self.inner.init(context)
    }

    fn pre_check(&mut self) -> Result<()> {
        self.log.push("writer.pre_check");
        Ok(())
    }

    fn prepare(&mut self) -> Result<()> {
        self.log.push("writer.prepare");
        Ok(())
    }

    fn split(&mut self, mandatory_number: usize) -> Result<Vec<Configuration>> {
        self.log.push("writer.split");
        self.inner.split(mandatory_number)
    }

    fn post(&mut self) -> Result<()> {
        self.log.push("writer.post");
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.log.push("writer.destroy");
        Ok(())
    }
}

struct RecordingWriterTask {
    log: LifecycleLog,
    received: usize,
}

impl WriterTask for RecordingWriterTask {
    fn init(&mut self, _context: &TaskPluginContext) -> Result<()> {
        Ok(())
    }

    fn start_write(&mut self, receiver: &mut dyn RecordReceiver) -> Result<()> {
        while receiver.get_from_reader()?.is_some() {
            self.received += 1;
        }
        Ok(())
    }

    fn post(&mut self) -> Result<()> {
        self.log.push(format!("writer.task({})", self.received));
        Ok(())
    }
}

/// Pre-handler that caps the reader at `rows` records; both hooks are logged
#[derive(Debug, Default)]
pub struct RecordingHandlerPlugin {
    log: LifecycleLog,
    rows: u64,
}

impl RecordingHandlerPlugin {
    pub fn new(log: LifecycleLog, rows: u64) -> Self {
        Self { log, rows }
    }
}

impl HandlerPlugin for RecordingHandlerPlugin {
    fn name(&self) -> &str {
        RECORDING_HANDLER
    }

    fn pre_handle(&self, job: &mut Configuration) -> Result<()> {
        self.log.push("pre_handle");
        job.set("job.content[0].reader.parameter.rows", json!(self.rows))?;
        Ok(())
    }

    fn post_handle(&self, _job: &Configuration) -> Result<()> {
        self.log.push("post_handle");
        Ok(())
    }
}
