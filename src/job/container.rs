//! # Job Container
//!
//! Drives one job document through its phases:
//!
//! ```text
//! pre_handle → init → prepare → split → schedule → post → post_handle → report
//! ```
//!
//! Job-level `destroy` hooks always run, writer first. A dry run only inits
//! the plugins and calls their `pre_check` hooks.
//!
//! ## Job document keys
//!
//! | key | meaning |
//! |-----|---------|
//! | `job.content[0].reader` / `.writer` | `{ name, parameter }` of each side |
//! | `job.content[0].transformer` | ordered transformer specs |
//! | `job.setting.speed.{channel,byte,record}` | parallelism and global ceilings |
//! | `job.setting.errorLimit.{record,percentage}` | end-of-job dirty thresholds |
//! | `job.setting.dry_run`, `job.setting.job_name` | run mode and report name |
//! | `job.{pre,post}_handler.plugin_name` | handler hooks |

use super::assign::{assign_fairly, TaskGroupAssignment};
use super::context::JobRunContext;
use super::error_limit::ErrorRecordChecker;
use super::report::{deliver_blocking, resolve_job_name, JobReportDocument, JobReporter};
use super::scheduler::StandaloneScheduler;
use super::statistics::JobStatistics;
use super::task::{PluginSlice, TaskConfig};
use crate::config::{Configuration, CoreConfig};
use crate::error::{Result, SyncError};
use crate::logging::log_job_phase;
use crate::plugin::{JobPluginContext, PluginRegistry, ReaderJob, WriterJob};
use crate::statistics::CommunicationSnapshot;
use crate::transport::{ShutdownSignal, TransformerRegistry, TransformerSpec};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, info_span, warn};
use uuid::Uuid;

const READER_PATH: &str = "job.content[0].reader";
const WRITER_PATH: &str = "job.content[0].writer";
const TRANSFORMER_PATH: &str = "job.content[0].transformer";

/// What a finished run hands back to the caller
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub run_id: Uuid,
    pub dry_run: bool,
    pub channel_number: usize,
    pub task_count: usize,
    pub task_group_count: usize,
    pub totals: CommunicationSnapshot,
    /// Absent for dry runs
    pub statistics: Option<JobStatistics>,
}

pub struct JobContainer {
    /// The document as submitted, used for the report
    submitted: Configuration,
    job: Configuration,
    context: JobRunContext,
    reporter: Option<Box<dyn JobReporter>>,
    job_name: Option<String>,
    dry_run: bool,

    reader_name: String,
    writer_name: String,
    reader_job: Option<Box<dyn ReaderJob>>,
    writer_job: Option<Box<dyn WriterJob>>,
    channel_number: usize,
    task_count: usize,
    task_group_count: usize,

    start_time: DateTime<Utc>,
    transfer_start: Option<DateTime<Utc>>,
    transfer_end: Option<DateTime<Utc>>,
}

impl JobContainer {
    pub fn new(
        job: Configuration,
        core: Arc<CoreConfig>,
        plugins: Arc<PluginRegistry>,
        transformers: Arc<TransformerRegistry>,
    ) -> Self {
        let dry_run = job.get_bool("job.setting.dry_run").unwrap_or(false);
        Self {
            submitted: job.clone(),
            job,
            context: JobRunContext::new(core, plugins, transformers),
            reporter: None,
            job_name: None,
            dry_run,
            reader_name: String::new(),
            writer_name: String::new(),
            reader_job: None,
            writer_job: None,
            channel_number: 1,
            task_count: 0,
            task_group_count: 0,
            start_time: Utc::now(),
            transfer_start: None,
            transfer_end: None,
        }
    }

    pub fn with_reporter(mut self, reporter: Box<dyn JobReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Overrides `job.setting.job_name` in the report
    pub fn with_job_name(mut self, job_name: impl Into<String>) -> Self {
        self.job_name = Some(job_name.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = self.dry_run || dry_run;
        self
    }

    /// Share an externally owned stop flag, e.g. one raised on Ctrl-C
    pub fn with_cancellation(mut self, cancellation: ShutdownSignal) -> Self {
        self.context.cancellation = cancellation;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.context.run_id
    }

    /// Context shared with the task groups; its cancellation flag stops the run
    pub fn context(&self) -> &JobRunContext {
        &self.context
    }

    /// The job document, including the split task list once split has run
    pub fn job(&self) -> &Configuration {
        &self.job
    }

    /// Run every phase and always run the plugin `destroy` hooks
    pub fn start(&mut self) -> Result<JobSummary> {
        let run_id = self.context.run_id.to_string();
        let span = info_span!("job", run_id = %run_id);
        let _guard = span.enter();

        self.start_time = Utc::now();
        log_job_phase(&run_id, "start", "running", Some(if self.dry_run { "dry run" } else { "transfer" }));

        let outcome = if self.dry_run { self.run_dry() } else { self.run() };
        self.destroy();

        match outcome {
            Ok(summary) => {
                log_job_phase(&run_id, "finish", "succeeded", None);
                Ok(summary)
            }
            Err(cause) => {
                if !self.dry_run && self.transfer_start.is_some() {
                    // partial statistics are still worth publishing
                    self.publish_statistics();
                }
                log_job_phase(&run_id, "finish", "failed", Some(&cause.to_string()));
                Err(cause)
            }
        }
    }

    fn run_dry(&mut self) -> Result<JobSummary> {
        self.init()?;
        self.pre_check()?;
        info!("✅ Dry run passed pre-checks");
        Ok(self.summary(None))
    }

    fn run(&mut self) -> Result<JobSummary> {
        self.pre_handle()?;
        self.init()?;
        self.prepare()?;
        self.channel_number = self.adjust_channel_number()?;
        let tasks = self.split()?;
        self.schedule(tasks)?;
        self.post()?;
        self.post_handle()?;
        let statistics = self.publish_statistics();
        Ok(self.summary(Some(statistics)))
    }

    fn summary(&self, statistics: Option<JobStatistics>) -> JobSummary {
        JobSummary {
            run_id: self.context.run_id,
            dry_run: self.dry_run,
            channel_number: self.channel_number,
            task_count: self.task_count,
            task_group_count: self.task_group_count,
            totals: self.context.board.collect(),
            statistics,
        }
    }

    fn pre_handle(&mut self) -> Result<()> {
        let Some(name) = self.job.get_string("job.pre_handler.plugin_name") else {
            return Ok(());
        };
        info!(handler = %name, "Running pre-handler");
        self.context.plugins.handler(&name)?.pre_handle(&mut self.job)
    }

    fn post_handle(&mut self) -> Result<()> {
        let Some(name) = self.job.get_string("job.post_handler.plugin_name") else {
            return Ok(());
        };
        info!(handler = %name, "Running post-handler");
        self.context.plugins.handler(&name)?.post_handle(&self.job)
    }

    fn init(&mut self) -> Result<()> {
        let entries = self.job.get_list("job.content").map_or(0, Vec::len);
        if entries != 1 {
            return Err(SyncError::configuration(format!(
                "job.content must hold exactly one reader/writer pair, found {entries}"
            )));
        }

        self.reader_name = self.required_string(&format!("{READER_PATH}.name"))?;
        self.writer_name = self.required_string(&format!("{WRITER_PATH}.name"))?;
        let reader_parameter = self.parameter(READER_PATH);
        let writer_parameter = self.parameter(WRITER_PATH);

        let mut reader_job = self.context.plugins.reader(&self.reader_name)?.create_job();
        let mut writer_job = self.context.plugins.writer(&self.writer_name)?.create_job();

        info!(reader = %self.reader_name, "Initializing reader job");
        reader_job.init(&JobPluginContext {
            parameter: reader_parameter.clone(),
            peer_plugin_name: self.writer_name.clone(),
            peer_parameter: writer_parameter.clone(),
            dry_run: self.dry_run,
        })?;
        self.reader_job = Some(reader_job);

        info!(writer = %self.writer_name, "Initializing writer job");
        writer_job.init(&JobPluginContext {
            parameter: writer_parameter,
            peer_plugin_name: self.reader_name.clone(),
            peer_parameter: reader_parameter,
            dry_run: self.dry_run,
        })?;
        self.writer_job = Some(writer_job);
        Ok(())
    }

    fn pre_check(&mut self) -> Result<()> {
        self.reader()?.pre_check()?;
        self.writer()?.pre_check()
    }

    fn prepare(&mut self) -> Result<()> {
        self.reader()?.prepare()?;
        self.writer()?.prepare()
    }

    /// Concurrency from the job's speed settings
    ///
    /// A global byte or record ceiling divided by the per-channel ceiling gives
    /// a channel count (at least 1); with both set the smaller wins. Without
    /// ceilings `job.setting.speed.channel` applies, defaulting to 1.
    pub fn adjust_channel_number(&self) -> Result<usize> {
        let channel_speed = self.context.core.transport.channel.speed;
        let by_byte = channels_for_limit(
            "byte",
            self.job.get_u64("job.setting.speed.byte"),
            channel_speed.byte,
        )?;
        let by_record = channels_for_limit(
            "record",
            self.job.get_u64("job.setting.speed.record"),
            channel_speed.record,
        )?;

        let channels = match (by_byte, by_record) {
            (Some(bytes), Some(records)) => bytes.min(records),
            (Some(channels), None) | (None, Some(channels)) => channels,
            (None, None) => self
                .job
                .get_u64("job.setting.speed.channel")
                .map_or(1, |channel| channel.max(1) as usize),
        };
        info!(channels = channels, by_byte = ?by_byte, by_record = ?by_record, "Derived channel number");
        Ok(channels)
    }

    /// Split both sides and pair slice `i` of the reader with slice `i` of
    /// the writer
    fn split(&mut self) -> Result<Vec<TaskConfig>> {
        let advice = self.channel_number;
        let reader_slices = self.reader()?.split(advice)?;
        if reader_slices.is_empty() {
            return Err(SyncError::EmptySplit {
                plugin: self.reader_name.clone(),
            });
        }
        let writer_slices = self.writer()?.split(reader_slices.len())?;
        if writer_slices.len() != reader_slices.len() {
            return Err(SyncError::SplitMismatch {
                reader_count: reader_slices.len(),
                writer_count: writer_slices.len(),
            });
        }

        let transformer = self.transformer_specs()?;
        // resolve now so unknown transformers fail before any task starts
        self.context.transformers.build_executions(&transformer)?;

        let tasks: Vec<TaskConfig> = reader_slices
            .into_iter()
            .zip(writer_slices)
            .enumerate()
            .map(|(task_id, (reader, writer))| TaskConfig {
                task_id,
                reader: PluginSlice::new(self.reader_name.clone(), reader),
                writer: PluginSlice::new(self.writer_name.clone(), writer),
                transformer: transformer.clone(),
            })
            .collect();

        self.job.set("job.content", serde_json::to_value(&tasks)?)?;
        self.task_count = tasks.len();
        info!(
            advice = advice,
            tasks = tasks.len(),
            transformers = transformer.len(),
            "✂️ Job split into tasks"
        );
        Ok(tasks)
    }

    fn transformer_specs(&self) -> Result<Vec<TransformerSpec>> {
        match self.job.get(TRANSFORMER_PATH) {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|e| SyncError::configuration(format!("invalid {TRANSFORMER_PATH}: {e}"))),
        }
    }

    /// Assign tasks to groups, run them and apply the dirty-record limit
    fn schedule(&mut self, tasks: Vec<TaskConfig>) -> Result<()> {
        let checker = ErrorRecordChecker::from_job(&self.job)?;
        let channel_number = self.channel_number.min(tasks.len());
        let channels_per_group = self.context.core.container.task_group.channel;
        let assignments: Vec<TaskGroupAssignment> = assign_fairly(tasks, channel_number, channels_per_group)?;
        self.channel_number = channel_number;
        self.task_group_count = assignments.len();

        self.transfer_start = Some(Utc::now());
        let scheduled = StandaloneScheduler::new(self.context.clone()).schedule(assignments);
        self.transfer_end = Some(Utc::now());
        scheduled?;

        checker.check(&self.context.board.collect())
    }

    fn post(&mut self) -> Result<()> {
        self.writer()?.post()?;
        self.reader()?.post()
    }

    fn destroy(&mut self) {
        if let Some(mut writer) = self.writer_job.take() {
            if let Err(e) = writer.destroy() {
                warn!(writer = %self.writer_name, error = %e, "Writer job destroy failed");
            }
        }
        if let Some(mut reader) = self.reader_job.take() {
            if let Err(e) = reader.destroy() {
                warn!(reader = %self.reader_name, error = %e, "Reader job destroy failed");
            }
        }
    }

    /// Log the final statistics and deliver the report if one is configured
    fn publish_statistics(&self) -> JobStatistics {
        let end_time = Utc::now();
        let transfer_start = self.transfer_start.unwrap_or(self.start_time);
        let transfer_end = self.transfer_end.unwrap_or(end_time);
        let statistics = JobStatistics::compute(
            &self.context.board.collect(),
            self.start_time,
            end_time,
            transfer_start,
            transfer_end,
        );
        info!("{statistics}");

        if let Some(reporter) = &self.reporter {
            let explicit = self
                .job_name
                .clone()
                .or_else(|| self.submitted.get_string("job.setting.job_name"));
            let writer_path = self.submitted.get_string(&format!("{WRITER_PATH}.parameter.path"));
            let job_name = resolve_job_name(explicit.as_deref(), writer_path.as_deref());
            deliver_blocking(reporter.as_ref(), &JobReportDocument::new(&statistics, job_name, &self.submitted));
        }
        statistics
    }

    fn required_string(&self, path: &str) -> Result<String> {
        self.job
            .get_string(path)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| SyncError::configuration(format!("missing required '{path}'")))
    }

    fn parameter(&self, side: &str) -> Configuration {
        self.job
            .get_configuration(&format!("{side}.parameter"))
            .unwrap_or_default()
    }

    fn reader(&mut self) -> Result<&mut Box<dyn ReaderJob>> {
        self.reader_job
            .as_mut()
            .ok_or_else(|| SyncError::internal("reader job used before init"))
    }

    fn writer(&mut self) -> Result<&mut Box<dyn WriterJob>> {
        self.writer_job
            .as_mut()
            .ok_or_else(|| SyncError::internal("writer job used before init"))
    }
}

impl std::fmt::Debug for JobContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContainer")
            .field("run_id", &self.context.run_id)
            .field("reader", &self.reader_name)
            .field("writer", &self.writer_name)
            .field("dry_run", &self.dry_run)
            .field("channel_number", &self.channel_number)
            .finish()
    }
}

/// Channels needed to honor a global ceiling given the per-channel one
fn channels_for_limit(dimension: &str, global: Option<u64>, per_channel: Option<u64>) -> Result<Option<usize>> {
    let Some(global) = global.filter(|limit| *limit > 0) else {
        return Ok(None);
    };
    let per_channel = per_channel
        .filter(|limit| *limit > 0)
        .ok_or_else(|| SyncError::ChannelSpeedMissing {
            dimension: dimension.to_string(),
        })?;
    Ok(Some(((global / per_channel) as usize).max(1)))
}
