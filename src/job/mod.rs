//! # Job Orchestration
//!
//! Everything above a single task group: turning a job document into tasks,
//! placing them on groups, running the groups and judging the outcome.
//!
//! - [`JobContainer`]: phase driver for one job document
//! - [`assign_fairly`]: resource-aware task placement
//! - [`StandaloneScheduler`]: in-process task group threads
//! - [`ErrorRecordChecker`]: end-of-job dirty thresholds
//! - [`JobStatistics`] and [`JobReporter`]: final numbers and their delivery

pub mod assign;
pub mod container;
pub mod context;
pub mod error_limit;
pub mod report;
pub mod scheduler;
pub mod statistics;
pub mod task;

pub use assign::{assign_fairly, TaskGroupAssignment};
pub use container::{JobContainer, JobSummary};
pub use context::JobRunContext;
pub use error_limit::ErrorRecordChecker;
pub use report::{deliver_blocking, resolve_job_name, HttpJobReporter, JobReportDocument, JobReporter};
pub use scheduler::StandaloneScheduler;
pub use statistics::JobStatistics;
pub use task::{PluginSlice, TaskConfig, LOAD_BALANCE_RESOURCE_MARK};
