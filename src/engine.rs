//! # Engine
//!
//! Entry point that turns a job file into a finished run: parse the job
//! document (with `${name}` parameters), load the core settings with the job's
//! `core` overrides on top, wire the reporter and hand everything to a
//! [`JobContainer`].

use crate::config::{ConfigManager, Configuration};
use crate::error::Result;
use crate::job::{HttpJobReporter, JobContainer, JobSummary};
use crate::plugin::PluginRegistry;
use crate::transport::{ShutdownSignal, TransformerRegistry};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-run knobs that are not part of the job document
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Core settings file layered under the job's `core` object
    pub core_file: Option<PathBuf>,
    /// `${name}` substitutions for the job file
    pub params: HashMap<String, String>,
    /// Report name override
    pub job_name: Option<String>,
    pub dry_run: bool,
    /// Stop flag the caller can raise to cancel the run
    pub cancellation: Option<ShutdownSignal>,
}

#[derive(Debug, Clone)]
pub struct Engine {
    plugins: Arc<PluginRegistry>,
    transformers: Arc<TransformerRegistry>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Engine with the bundled connectors and transformers
    pub fn new() -> Self {
        Self::with_registries(PluginRegistry::with_builtins(), TransformerRegistry::with_builtins())
    }

    pub fn with_registries(plugins: PluginRegistry, transformers: TransformerRegistry) -> Self {
        Self {
            plugins: Arc::new(plugins),
            transformers: Arc::new(transformers),
        }
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn transformers(&self) -> &TransformerRegistry {
        &self.transformers
    }

    /// Load `job_file` and run it
    pub fn run_file(&self, job_file: impl AsRef<Path>, options: &RunOptions) -> Result<JobSummary> {
        let job_file = job_file.as_ref();
        info!(job_file = %job_file.display(), "📄 Loading job");
        let job = Configuration::from_file(job_file, &options.params)?;
        self.run(job, options)
    }

    /// Run an already parsed job document
    pub fn run(&self, job: Configuration, options: &RunOptions) -> Result<JobSummary> {
        let overrides = job.get_configuration("core");
        let manager = ConfigManager::load(options.core_file.as_deref(), overrides.as_ref())?;
        let core = Arc::new(manager.config().clone());
        debug!(job = %job, "Job document");

        let mut container = JobContainer::new(
            job,
            Arc::clone(&core),
            Arc::clone(&self.plugins),
            Arc::clone(&self.transformers),
        )
        .with_dry_run(options.dry_run);
        if let Some(cancellation) = &options.cancellation {
            container = container.with_cancellation(cancellation.clone());
        }
        if let Some(job_name) = &options.job_name {
            container = container.with_job_name(job_name.clone());
        }
        if let Some(reporter) = HttpJobReporter::from_server_config(&core.server)? {
            debug!(address = reporter.address(), "Job report enabled");
            container = container.with_reporter(Box::new(reporter));
        }

        container.start()
    }
}
