//! Task configurations produced by the split phase.

use crate::config::Configuration;
use crate::transport::TransformerSpec;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Parameter key a connector slice may set to spread load across task groups
pub const LOAD_BALANCE_RESOURCE_MARK: &str = "loadBalanceResourceMark";

/// One side of a task: the connector name and its slice of parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSlice {
    pub name: String,
    #[serde(default)]
    pub parameter: Value,
}

impl PluginSlice {
    pub fn new(name: impl Into<String>, parameter: Configuration) -> Self {
        Self {
            name: name.into(),
            parameter: parameter.into_value(),
        }
    }

    pub fn parameter(&self) -> Configuration {
        Configuration::from_value(self.parameter.clone())
    }

    /// Resource this slice touches, if the connector declared one
    pub fn resource_mark(&self) -> Option<String> {
        match self.parameter.get(LOAD_BALANCE_RESOURCE_MARK)? {
            Value::String(mark) if !mark.is_empty() => Some(mark.clone()),
            Value::Number(mark) => Some(mark.to_string()),
            _ => None,
        }
    }
}

/// A runnable unit: one reader slice paired with one writer slice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskConfig {
    pub task_id: usize,
    pub reader: PluginSlice,
    pub writer: PluginSlice,
    #[serde(default)]
    pub transformer: Vec<TransformerSpec>,
}
