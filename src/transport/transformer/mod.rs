//! # Record Transformers
//!
//! A transformer rewrites one column of a record in flight, or drops the
//! record. Job documents attach an ordered chain of them to a task:
//!
//! ```json
//! "transformer": [
//!   { "name": "dx_substr", "parameter": { "columnIndex": 1, "paras": ["0", "3"] } },
//!   { "name": "dx_map", "parameter": { "columnIndex": 2, "paras": ["*", "1.5"] } },
//!   { "name": "dx_filter", "parameter": { "columnIndex": 0, "paras": [">", "100"] } }
//! ]
//! ```
//!
//! Errors come in two flavors. [`TransformerError::IllegalParameter`] means
//! the chain is misconfigured and fails the task. [`TransformerError::Runtime`]
//! means this one record could not be transformed; it is counted as dirty and
//! the task carries on.

pub mod builtins;

use crate::element::Record;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub use builtins::{FilterTransformer, MapTransformer, PadTransformer, ReplaceTransformer, SubstrTransformer};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformerError {
    #[error("illegal parameter: {0}")]
    IllegalParameter(String),

    #[error("{0}")]
    Runtime(String),
}

/// What happened to a record after a transformer ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformOutcome {
    /// Keep the (possibly rewritten) record
    Kept,
    /// Drop the record; it is counted as filtered, not as dirty
    Filtered,
}

/// A record-level transformation function
pub trait Transformer: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Called once per execution with its paras, before any record
    ///
    /// A transformer with expensive per-paras setup returns a copy of itself
    /// with that setup done; `None` keeps the shared instance.
    fn specialize(&self, _params: &[String]) -> std::result::Result<Option<Arc<dyn Transformer>>, TransformerError> {
        Ok(None)
    }

    /// Rewrite `record` in place or decide to filter it out
    fn evaluate(
        &self,
        record: &mut Record,
        column_index: usize,
        params: &[String],
    ) -> std::result::Result<TransformOutcome, TransformerError>;
}

/// One transformer entry of a job document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerSpec {
    pub name: String,
    #[serde(default)]
    pub parameter: TransformerParameter,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformerParameter {
    pub column_index: Option<usize>,
    #[serde(default, deserialize_with = "deserialize_paras")]
    pub paras: Vec<String>,
}

fn deserialize_paras<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    let values: Vec<Value> = Deserialize::deserialize(deserializer)?;
    Ok(values
        .into_iter()
        .map(|value| match value {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}

/// A configured transformer bound to its column and parameters
#[derive(Debug, Clone)]
pub struct TransformerExecution {
    transformer: Arc<dyn Transformer>,
    column_index: usize,
    params: Vec<String>,
    column_checked: bool,
}

impl TransformerExecution {
    pub fn new(transformer: Arc<dyn Transformer>, column_index: usize, params: Vec<String>) -> Self {
        Self {
            transformer,
            column_index,
            params,
            column_checked: false,
        }
    }

    pub fn name(&self) -> &str {
        self.transformer.name()
    }

    /// Run the transformer, validating the column index on the first record
    pub fn execute(&mut self, record: &mut Record) -> std::result::Result<TransformOutcome, TransformerError> {
        if !self.column_checked {
            if self.column_index >= record.column_number() {
                return Err(TransformerError::IllegalParameter(format!(
                    "columnIndex {} is out of range for a record with {} columns",
                    self.column_index,
                    record.column_number()
                )));
            }
            self.column_checked = true;
        }
        self.transformer.evaluate(record, self.column_index, &self.params)
    }
}

/// Transformers available to a job run, keyed by name
#[derive(Debug, Clone, Default)]
pub struct TransformerRegistry {
    transformers: HashMap<String, Arc<dyn Transformer>>,
}

impl TransformerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `dx_substr`, `dx_pad`, `dx_replace`, `dx_map`
    /// and `dx_filter`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SubstrTransformer));
        registry.register(Arc::new(PadTransformer));
        registry.register(Arc::new(ReplaceTransformer));
        registry.register(Arc::new(MapTransformer));
        registry.register(Arc::new(FilterTransformer::default()));
        registry
    }

    pub fn register(&mut self, transformer: Arc<dyn Transformer>) {
        self.transformers
            .insert(transformer.name().to_string(), transformer);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transformer>> {
        self.transformers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.transformers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve a task's transformer chain
    pub fn build_executions(&self, specs: &[TransformerSpec]) -> Result<Vec<TransformerExecution>> {
        specs
            .iter()
            .map(|spec| {
                let transformer = self.get(&spec.name).ok_or_else(|| {
                    SyncError::configuration(format!("unknown transformer '{}'", spec.name))
                })?;
                let column_index = spec.parameter.column_index.ok_or_else(|| {
                    SyncError::TransformerIllegalParameter {
                        name: spec.name.clone(),
                        message: "columnIndex is required".to_string(),
                    }
                })?;
                let transformer = transformer
                    .specialize(&spec.parameter.paras)
                    .map_err(|e| SyncError::TransformerIllegalParameter {
                        name: spec.name.clone(),
                        message: match e {
                            TransformerError::IllegalParameter(message) | TransformerError::Runtime(message) => message,
                        },
                    })?
                    .unwrap_or(transformer);
                Ok(TransformerExecution::new(
                    transformer,
                    column_index,
                    spec.parameter.paras.clone(),
                ))
            })
            .collect()
    }
}
