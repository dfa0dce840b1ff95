//! # Record Transport
//!
//! Everything between a reader plugin and a writer plugin: the bounded
//! [`Channel`], the batching [`exchanger`]s plugins talk to, and the record
//! [`transformer`] chain applied on the way through.

pub mod channel;
pub mod exchanger;
pub mod transformer;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use channel::Channel;
pub use exchanger::{BufferedRecordExchanger, RecordReceiver, RecordSender, TransformerExchanger};
pub use transformer::{
    TransformOutcome, Transformer, TransformerError, TransformerExecution, TransformerRegistry, TransformerSpec,
};

/// Cooperative stop flag shared by a task's channel, exchangers and supervisor
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag; returns `true` only for the call that raised it
    pub fn trigger(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
