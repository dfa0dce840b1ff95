use crate::config::CoreConfig;
use crate::plugin::PluginRegistry;
use crate::statistics::JobCommunicationBoard;
use crate::transport::{ShutdownSignal, TransformerRegistry};
use std::sync::Arc;
use uuid::Uuid;

/// Everything a job run shares with its task groups
///
/// Created once per run by the job container and cloned into every task
/// group thread. Nothing in here is global; two runs in one process do not
/// see each other.
#[derive(Debug, Clone)]
pub struct JobRunContext {
    pub run_id: Uuid,
    pub core: Arc<CoreConfig>,
    pub plugins: Arc<PluginRegistry>,
    pub transformers: Arc<TransformerRegistry>,
    pub board: Arc<JobCommunicationBoard>,
    /// Raised when any task group fails so the others stop early
    pub cancellation: ShutdownSignal,
}

impl JobRunContext {
    pub fn new(core: Arc<CoreConfig>, plugins: Arc<PluginRegistry>, transformers: Arc<TransformerRegistry>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            core,
            plugins,
            transformers,
            board: Arc::new(JobCommunicationBoard::new()),
            cancellation: ShutdownSignal::new(),
        }
    }
}
