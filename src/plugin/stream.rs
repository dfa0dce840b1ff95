//! Bundled in-process connectors.
//!
//! `streamreader` emits `sliceRecordCount` copies of a constant row per slice:
//!
//! ```json
//! { "name": "streamreader",
//!   "parameter": {
//!     "sliceRecordCount": 1000,
//!     "column": [ { "type": "long", "value": "1" }, { "type": "string", "value": "hello" } ] } }
//! ```
//!
//! `streamwriter` drains its channel and, with `"print": true`, writes each
//! record to stdout as a tab-separated line.

use super::{
    JobPluginContext, ReaderJob, ReaderPlugin, ReaderTask, TaskPluginContext, WriterJob, WriterPlugin, WriterTask,
};
use crate::config::Configuration;
use crate::element::{Column, ColumnType};
use crate::error::{Result, SyncError};
use crate::transport::{RecordReceiver, RecordSender};
use std::io::Write;
use tracing::{debug, info};

const READER_NAME: &str = "streamreader";
const WRITER_NAME: &str = "streamwriter";

/// Parse the `column` list into a row template
fn parse_columns(parameter: &Configuration) -> Result<Vec<Column>> {
    let columns = parameter
        .get_list_configuration("column")
        .into_iter()
        .enumerate()
        .map(|(index, column)| {
            let column_type: ColumnType = column
                .get_string("type")
                .unwrap_or_else(|| "string".to_string())
                .parse()
                .map_err(|e: String| SyncError::configuration(format!("{READER_NAME} column {index}: {e}")))?;
            let value = column.get_string("value");
            Column::parse(column_type, value.as_deref())
                .map_err(|e| SyncError::configuration(format!("{READER_NAME} column {index}: {e}")))
        })
        .collect::<Result<Vec<Column>>>()?;

    if columns.is_empty() {
        return Err(SyncError::configuration(format!(
            "{READER_NAME} requires a non-empty 'column' list"
        )));
    }
    Ok(columns)
}

fn slice_record_count(parameter: &Configuration) -> Result<u64> {
    parameter.get_u64("sliceRecordCount").ok_or_else(|| {
        SyncError::configuration(format!(
            "{READER_NAME} requires a non-negative 'sliceRecordCount'"
        ))
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StreamReaderPlugin;

impl ReaderPlugin for StreamReaderPlugin {
    fn name(&self) -> &str {
        READER_NAME
    }

    fn create_job(&self) -> Box<dyn ReaderJob> {
        Box::new(StreamReaderJob::default())
    }

    fn create_task(&self) -> Box<dyn ReaderTask> {
        Box::new(StreamReaderTask::default())
    }
}

#[derive(Debug, Default)]
struct StreamReaderJob {
    parameter: Configuration,
}

impl ReaderJob for StreamReaderJob {
    fn init(&mut self, context: &JobPluginContext) -> Result<()> {
        parse_columns(&context.parameter)?;
        slice_record_count(&context.parameter)?;
        self.parameter = context.parameter.clone();
        Ok(())
    }

    fn split(&mut self, advice_number: usize) -> Result<Vec<Configuration>> {
        Ok(vec![self.parameter.clone(); advice_number.max(1)])
    }
}

#[derive(Debug, Default)]
struct StreamReaderTask {
    template: Vec<Column>,
    record_count: u64,
}

impl ReaderTask for StreamReaderTask {
    fn init(&mut self, context: &TaskPluginContext) -> Result<()> {
        self.template = parse_columns(&context.parameter)?;
        self.record_count = slice_record_count(&context.parameter)?;
        Ok(())
    }

    fn start_read(&mut self, sender: &mut dyn RecordSender) -> Result<()> {
        debug!(records = self.record_count, "streamreader emitting slice");
        for _ in 0..self.record_count {
            let mut record = sender.create_record();
            for column in &self.template {
                record.add_column(column.clone());
            }
            sender.send_to_writer(record)?;
        }
        sender.flush()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StreamWriterPlugin;

impl WriterPlugin for StreamWriterPlugin {
    fn name(&self) -> &str {
        WRITER_NAME
    }

    fn create_job(&self) -> Box<dyn WriterJob> {
        Box::new(StreamWriterJob::default())
    }

    fn create_task(&self) -> Box<dyn WriterTask> {
        Box::new(StreamWriterTask::default())
    }
}

#[derive(Debug, Default)]
struct StreamWriterJob {
    parameter: Configuration,
}

impl WriterJob for StreamWriterJob {
    fn init(&mut self, context: &JobPluginContext) -> Result<()> {
        self.parameter = context.parameter.clone();
        Ok(())
    }

    fn split(&mut self, mandatory_number: usize) -> Result<Vec<Configuration>> {
        Ok(vec![self.parameter.clone(); mandatory_number])
    }
}

#[derive(Debug, Default)]
struct StreamWriterTask {
    print: bool,
    task_id: usize,
    written: u64,
}

impl WriterTask for StreamWriterTask {
    fn init(&mut self, context: &TaskPluginContext) -> Result<()> {
        self.print = context.parameter.get_bool("print").unwrap_or(false);
        self.task_id = context.task_id;
        Ok(())
    }

    fn start_write(&mut self, receiver: &mut dyn RecordReceiver) -> Result<()> {
        let stdout = std::io::stdout();
        while let Some(record) = receiver.get_from_reader()? {
            if self.print {
                let mut out = stdout.lock();
                writeln!(out, "{record}").map_err(|e| SyncError::io(WRITER_NAME, e))?;
            }
            self.written += 1;
        }
        Ok(())
    }

    fn post(&mut self) -> Result<()> {
        info!(task_id = self.task_id, records = self.written, "streamwriter finished");
        Ok(())
    }

    fn supports_failover(&self) -> bool {
        true
    }
}
