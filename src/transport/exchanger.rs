//! # Record Exchangers
//!
//! The API reader and writer plugins actually see. A reader task pushes
//! records through a [`RecordSender`]; a writer task pulls them from a
//! [`RecordReceiver`]. Both sides batch against the [`Channel`] so plugins
//! can work one record at a time without paying a lock per record.

use super::channel::Channel;
use super::transformer::{TransformOutcome, TransformerError, TransformerExecution};
use crate::element::Record;
use crate::error::{Result, SyncError};
use crate::statistics::{Communication, Counter, TaskPluginCollector};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Producer-side API handed to reader tasks
pub trait RecordSender: Send {
    fn create_record(&self) -> Record {
        Record::new()
    }

    fn send_to_writer(&mut self, record: Record) -> Result<()>;

    /// Push any buffered records into the channel
    fn flush(&mut self) -> Result<()>;

    /// Flush and signal end of stream
    fn terminate(&mut self) -> Result<()>;

    fn shutdown(&mut self);
}

/// Consumer-side API handed to writer tasks
pub trait RecordReceiver: Send {
    /// Next record, or `None` once the reader has terminated and everything
    /// has been delivered
    fn get_from_reader(&mut self) -> Result<Option<Record>>;

    fn shutdown(&mut self);
}

/// Batching exchanger over one channel
#[derive(Debug)]
pub struct BufferedRecordExchanger {
    channel: Arc<Channel>,
    collector: TaskPluginCollector,
    buffer_size: usize,
    outbox: Vec<Record>,
    outbox_memory: usize,
    inbox: VecDeque<Record>,
    scratch: Vec<Record>,
}

impl BufferedRecordExchanger {
    pub fn new(channel: Arc<Channel>, collector: TaskPluginCollector, buffer_size: usize) -> Self {
        let buffer_size = buffer_size.clamp(1, channel.capacity());
        Self {
            channel,
            collector,
            buffer_size,
            outbox: Vec::with_capacity(buffer_size),
            outbox_memory: 0,
            inbox: VecDeque::with_capacity(buffer_size),
            scratch: Vec::with_capacity(buffer_size),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.channel.is_shutdown() {
            return Err(SyncError::shutdown("record exchanger"));
        }
        Ok(())
    }

    pub fn collector(&self) -> &TaskPluginCollector {
        &self.collector
    }
}

impl RecordSender for BufferedRecordExchanger {
    fn send_to_writer(&mut self, record: Record) -> Result<()> {
        self.ensure_open()?;

        let memory = record.memory_size();
        if memory > self.channel.byte_capacity() {
            self.collector.collect_dirty_record(
                &record,
                format!(
                    "record of {memory} bytes exceeds channel byte capacity of {} bytes",
                    self.channel.byte_capacity()
                ),
            );
            return Ok(());
        }

        let full = self.outbox.len() >= self.buffer_size
            || self.outbox_memory + memory > self.channel.byte_capacity();
        if full {
            self.flush()?;
        }

        self.outbox_memory += memory;
        self.outbox.push(record);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.outbox.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.outbox, Vec::with_capacity(self.buffer_size));
        self.outbox_memory = 0;
        self.channel.push_all(batch)
    }

    fn terminate(&mut self) -> Result<()> {
        self.flush()?;
        self.channel.terminate()
    }

    fn shutdown(&mut self) {
        self.channel.shutdown();
        self.outbox.clear();
        self.outbox_memory = 0;
        self.inbox.clear();
    }
}

impl RecordReceiver for BufferedRecordExchanger {
    fn get_from_reader(&mut self) -> Result<Option<Record>> {
        self.ensure_open()?;
        if self.inbox.is_empty() {
            if !self.channel.pull_all(&mut self.scratch, self.buffer_size)? {
                return Ok(None);
            }
            self.inbox.extend(self.scratch.drain(..));
        }
        Ok(self.inbox.pop_front())
    }

    fn shutdown(&mut self) {
        RecordSender::shutdown(self);
    }
}

/// Sender that runs a transformer chain before buffering
///
/// Filtered records are dropped and counted. Records a transformer fails on
/// are handed to the dirty collector once and dropped. An illegal parameter
/// aborts the task.
#[derive(Debug)]
pub struct TransformerExchanger {
    inner: BufferedRecordExchanger,
    executions: Vec<TransformerExecution>,
    communication: Arc<Communication>,
    succeeded: u64,
    failed: u64,
    filtered: u64,
    used: Duration,
}

impl TransformerExchanger {
    pub fn new(
        inner: BufferedRecordExchanger,
        executions: Vec<TransformerExecution>,
        communication: Arc<Communication>,
    ) -> Self {
        Self {
            inner,
            executions,
            communication,
            succeeded: 0,
            failed: 0,
            filtered: 0,
            used: Duration::ZERO,
        }
    }

    fn transform(&mut self, mut record: Record) -> Result<Option<Record>> {
        if self.executions.is_empty() {
            return Ok(Some(record));
        }

        let started = Instant::now();
        let mut outcome = Ok(Some(()));
        for execution in &mut self.executions {
            match execution.execute(&mut record) {
                Ok(TransformOutcome::Kept) => continue,
                Ok(TransformOutcome::Filtered) => {
                    self.filtered += 1;
                    outcome = Ok(None);
                    break;
                }
                Err(TransformerError::Runtime(message)) => {
                    self.failed += 1;
                    self.inner.collector.collect_dirty_record(
                        &record,
                        format!("transformer {} failed: {message}", execution.name()),
                    );
                    outcome = Ok(None);
                    break;
                }
                Err(TransformerError::IllegalParameter(message)) => {
                    outcome = Err(SyncError::TransformerIllegalParameter {
                        name: execution.name().to_string(),
                        message,
                    });
                    break;
                }
            }
        }
        self.used += started.elapsed();

        match outcome {
            Ok(Some(())) => {
                self.succeeded += 1;
                Ok(Some(record))
            }
            Ok(None) => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Publish transformer totals to the task communication
    fn publish_stats(&self) {
        self.communication
            .raise_to(Counter::TransformerSucceedRecords, self.succeeded);
        self.communication
            .raise_to(Counter::TransformerFailedRecords, self.failed);
        self.communication
            .raise_to(Counter::TransformerFilterRecords, self.filtered);
        self.communication
            .raise_to(Counter::TransformerUsedNanos, self.used.as_nanos() as u64);
    }
}

impl RecordSender for TransformerExchanger {
    fn create_record(&self) -> Record {
        self.inner.create_record()
    }

    fn send_to_writer(&mut self, record: Record) -> Result<()> {
        self.inner.ensure_open()?;
        match self.transform(record)? {
            Some(record) => self.inner.send_to_writer(record),
            None => Ok(()),
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.publish_stats();
        self.inner.flush()
    }

    fn terminate(&mut self) -> Result<()> {
        self.publish_stats();
        debug!(
            succeeded = self.succeeded,
            failed = self.failed,
            filtered = self.filtered,
            "Transformer chain finished"
        );
        self.inner.terminate()
    }

    fn shutdown(&mut self) {
        RecordSender::shutdown(&mut self.inner);
    }
}
