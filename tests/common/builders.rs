//! Job document builders and a one-call runner for scenario tests.

#![allow(dead_code)]

use batchsync_core::config::Configuration;
use super::plugins::{DeafReaderPlugin, DirtyReaderPlugin, HangingReaderPlugin, MemoryReaderPlugin};
use batchsync_core::plugin::{PluginRegistry, WriterPlugin};
use batchsync_core::transport::TransformerRegistry;
use batchsync_core::{Engine, JobSummary, Result, RunOptions};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Core settings tuned so supervision loops and retries happen in
/// milliseconds instead of seconds
pub fn fast_core() -> Value {
    json!({
        "container": {
            "job": { "sleep_interval_ms": 10, "report_interval_ms": 50 },
            "task_group": { "sleep_interval_ms": 10, "report_interval_ms": 50 },
            "task": { "max_retry_times": 2, "retry_interval_ms": 20, "max_wait_ms": 5000 }
        }
    })
}

/// Builder for a single reader/writer job document
#[derive(Debug, Clone)]
pub struct JobBuilder {
    reader: (String, Value),
    writer: (String, Value),
    setting: Map<String, Value>,
    transformer: Option<Value>,
    core: Value,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            reader: ("streamreader".to_string(), json!({})),
            writer: ("streamwriter".to_string(), json!({})),
            setting: Map::new(),
            transformer: None,
            core: fast_core(),
        }
    }

    pub fn reader(mut self, name: &str, parameter: Value) -> Self {
        self.reader = (name.to_string(), parameter);
        self
    }

    pub fn writer(mut self, name: &str, parameter: Value) -> Self {
        self.writer = (name.to_string(), parameter);
        self
    }

    pub fn channel(mut self, channel: u64) -> Self {
        self.speed_entry("channel", json!(channel));
        self
    }

    pub fn byte_speed(mut self, bytes: u64) -> Self {
        self.speed_entry("byte", json!(bytes));
        self
    }

    pub fn error_limit(mut self, limit: Value) -> Self {
        self.setting.insert("errorLimit".to_string(), limit);
        self
    }

    pub fn transformer(mut self, chain: Value) -> Self {
        self.transformer = Some(chain);
        self
    }

    /// Set one core key, e.g. `core_entry(&["container", "task_group", "channel"], json!(2))`
    pub fn core_entry(mut self, path: &[&str], value: Value) -> Self {
        let mut node = &mut self.core;
        for key in &path[..path.len() - 1] {
            node = node
                .as_object_mut()
                .map(|object| object.entry(key.to_string()).or_insert_with(|| json!({})))
                .expect("core path runs through objects");
        }
        if let Some(object) = node.as_object_mut() {
            object.insert(path[path.len() - 1].to_string(), value);
        }
        self
    }

    pub fn build_value(&self) -> Value {
        let mut entry = json!({
            "reader": { "name": self.reader.0, "parameter": self.reader.1 },
            "writer": { "name": self.writer.0, "parameter": self.writer.1 },
        });
        if let Some(chain) = &self.transformer {
            entry["transformer"] = chain.clone();
        }
        json!({
            "core": self.core,
            "job": {
                "setting": Value::Object(self.setting.clone()),
                "content": [entry],
            }
        })
    }

    pub fn build(&self) -> Configuration {
        Configuration::from_value(self.build_value())
    }

    fn speed_entry(&mut self, key: &str, value: Value) {
        let speed = self.setting.entry("speed".to_string()).or_insert_with(|| json!({}));
        if let Some(speed) = speed.as_object_mut() {
            speed.insert(key.to_string(), value);
        }
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry with the bundled connectors plus every in-memory test reader
pub fn test_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::with_builtins();
    registry.register_reader(Arc::new(MemoryReaderPlugin));
    registry.register_reader(Arc::new(DirtyReaderPlugin));
    registry.register_reader(Arc::new(HangingReaderPlugin));
    registry.register_reader(Arc::new(DeafReaderPlugin));
    registry
}

/// [`test_registry`] plus one writer the test keeps a handle to
pub fn registry_with_writer(writer: Arc<dyn WriterPlugin>) -> PluginRegistry {
    let mut registry = test_registry();
    registry.register_writer(writer);
    registry
}

pub fn run_job(registry: PluginRegistry, job: Configuration) -> Result<JobSummary> {
    Engine::with_registries(registry, TransformerRegistry::with_builtins()).run(job, &RunOptions::default())
}
