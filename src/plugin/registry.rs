//! # Plugin Registry
//!
//! Name-keyed lookup of connector factories for one engine instance. Built
//! once, then shared read-only by `Arc` with every task group of a run.
//!
//! ```rust
//! use batchsync_core::plugin::PluginRegistry;
//!
//! let registry = PluginRegistry::with_builtins();
//! assert!(registry.reader("streamreader").is_ok());
//! assert!(registry.writer("mysqlwriter").is_err());
//! ```

use super::{HandlerPlugin, ReaderPlugin, StreamReaderPlugin, StreamWriterPlugin, WriterPlugin};
use crate::error::{PluginKind, Result, SyncError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone, Default)]
pub struct PluginRegistry {
    readers: HashMap<String, Arc<dyn ReaderPlugin>>,
    writers: HashMap<String, Arc<dyn WriterPlugin>>,
    handlers: HashMap<String, Arc<dyn HandlerPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled `streamreader` and `streamwriter`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_reader(Arc::new(StreamReaderPlugin));
        registry.register_writer(Arc::new(StreamWriterPlugin));
        registry
    }

    pub fn register_reader(&mut self, plugin: Arc<dyn ReaderPlugin>) {
        debug!(plugin = plugin.name(), "Registering reader plugin");
        self.readers.insert(plugin.name().to_string(), plugin);
    }

    pub fn register_writer(&mut self, plugin: Arc<dyn WriterPlugin>) {
        debug!(plugin = plugin.name(), "Registering writer plugin");
        self.writers.insert(plugin.name().to_string(), plugin);
    }

    pub fn register_handler(&mut self, plugin: Arc<dyn HandlerPlugin>) {
        debug!(plugin = plugin.name(), "Registering handler plugin");
        self.handlers.insert(plugin.name().to_string(), plugin);
    }

    pub fn reader(&self, name: &str) -> Result<Arc<dyn ReaderPlugin>> {
        self.readers
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(PluginKind::Reader, name))
    }

    pub fn writer(&self, name: &str) -> Result<Arc<dyn WriterPlugin>> {
        self.writers
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(PluginKind::Writer, name))
    }

    pub fn handler(&self, name: &str) -> Result<Arc<dyn HandlerPlugin>> {
        self.handlers
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(PluginKind::Handler, name))
    }

    pub fn reader_names(&self) -> Vec<String> {
        sorted_keys(&self.readers)
    }

    pub fn writer_names(&self) -> Vec<String> {
        sorted_keys(&self.writers)
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("readers", &self.reader_names())
            .field("writers", &self.writer_names())
            .field("handlers", &sorted_keys(&self.handlers))
            .finish()
    }
}

fn not_found(kind: PluginKind, name: &str) -> SyncError {
    SyncError::PluginNotFound {
        kind,
        name: name.to_string(),
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;

    struct AuditHandler;

    impl HandlerPlugin for AuditHandler {
        fn name(&self) -> &str {
            "audit"
        }

        fn pre_handle(&self, job: &mut Configuration) -> Result<()> {
            job.set("job.setting.audited", true)?;
            Ok(())
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = PluginRegistry::with_builtins();
        assert_eq!(registry.reader_names(), vec!["streamreader".to_string()]);
        assert_eq!(registry.writer_names(), vec!["streamwriter".to_string()]);
    }

    #[test]
    fn test_missing_plugin_is_configuration_error() {
        let registry = PluginRegistry::new();
        let error = registry.writer("nowhere").err().unwrap();
        assert_eq!(error.kind(), crate::error::ErrorKind::Configuration);
        assert!(error.to_string().contains("nowhere"));
    }

    #[test]
    fn test_handler_lookup() {
        let mut registry = PluginRegistry::new();
        registry.register_handler(Arc::new(AuditHandler));

        let mut job = Configuration::new();
        registry.handler("audit").unwrap().pre_handle(&mut job).unwrap();
        assert_eq!(job.get_bool("job.setting.audited"), Some(true));
    }
}
