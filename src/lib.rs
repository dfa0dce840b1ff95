#![allow(clippy::doc_markdown)] // Allow technical terms like JSON, ETL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # BatchSync Core
//!
//! Batch data-synchronization job engine: moves records from one source to one
//! sink through pluggable reader and writer connectors.
//!
//! ## Overview
//!
//! A declarative job document names a reader, a writer, optional record
//! transformers and parallelism settings. The engine splits the job into
//! independently runnable tasks, places them fairly on task groups, runs each
//! task as a reader thread and a writer thread joined by a flow-controlled
//! channel, retries failed attempts where the writer allows it and folds all
//! per-task counters into one job outcome.
//!
//! ## Architecture
//!
//! ```text
//! JobContainer ── split ──► TaskConfig[] ── assign_fairly ──► TaskGroupAssignment[]
//!      │                                                         │
//!      └── StandaloneScheduler ── one thread per group ──► TaskGroupContainer
//!                                                                │
//!                               TaskExecutor: reader ─► Channel ─► writer
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Core settings and the job document
//! - [`element`] - Records and typed columns
//! - [`transport`] - Channel, exchangers and transformers
//! - [`plugin`] - Connector contract and registry
//! - [`statistics`] - Per-task counters, snapshots and progress
//! - [`taskgroup`] - Task attempts and their supervision
//! - [`job`] - Splitting, scheduling, limits and reporting
//! - [`engine`] - File-to-outcome entry point
//! - [`error`] - Structured error handling
//! - [`logging`] - Tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batchsync_core::{Engine, RunOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! batchsync_core::logging::init_structured_logging(Some("info"), false);
//!
//! let summary = Engine::new().run_file("job.json", &RunOptions::default())?;
//! println!("read {} records", summary.totals.total_read_records());
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit, scenario and property tests
//! ```

pub mod config;
pub mod element;
pub mod engine;
pub mod error;
pub mod job;
pub mod logging;
pub mod plugin;
pub mod statistics;
pub mod taskgroup;
pub mod transport;

pub use config::{ConfigManager, Configuration, CoreConfig};
pub use element::{Column, ColumnType, Record};
pub use engine::{Engine, RunOptions};
pub use error::{ErrorKind, PluginKind, Result, SyncError};
pub use job::{JobContainer, JobSummary, TaskConfig};
pub use plugin::{
    HandlerPlugin, PluginRegistry, ReaderJob, ReaderPlugin, ReaderTask, WriterJob, WriterPlugin,
    WriterTask,
};
pub use statistics::{Communication, CommunicationSnapshot, CommunicationState, Counter};
pub use transport::{RecordReceiver, RecordSender, ShutdownSignal, Transformer, TransformerRegistry};
