//! # Job Document
//!
//! [`Configuration`] wraps a JSON tree and addresses it with path expressions:
//! dot-separated keys with optional `[index]` suffixes, e.g.
//! `job.content[0].reader.parameter`. The empty path addresses the root.
//!
//! Reads never fail; a missing node or a type mismatch yields `None`. Writes
//! create intermediate objects and arrays as needed.

use super::error::{ConfigResult, ConfigurationError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

const MASKED: &str = "*****";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> ConfigResult<Vec<Segment>> {
    let mut segments = Vec::new();
    if path.is_empty() {
        return Ok(segments);
    }

    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if key.is_empty() && rest.is_empty() {
            return Err(ConfigurationError::invalid_path(path, "empty path segment"));
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        }
        while !rest.is_empty() {
            let close = rest
                .find(']')
                .ok_or_else(|| ConfigurationError::invalid_path(path, "unclosed '['"))?;
            if !rest.starts_with('[') {
                return Err(ConfigurationError::invalid_path(path, "unexpected text after ']'"));
            }
            let index = rest[1..close]
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigurationError::invalid_path(path, "index must be a non-negative integer"))?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
        }
    }

    Ok(segments)
}

/// Hierarchical job document addressed by path expressions
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    root: Value,
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl Configuration {
    /// An empty object tree
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
        }
    }

    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    pub fn from_json(text: &str) -> ConfigResult<Self> {
        let root = serde_json::from_str(text)
            .map_err(|e| ConfigurationError::parse_error("job document", e))?;
        Ok(Self { root })
    }

    /// Parse a job document after replacing `${name}` placeholders
    pub fn from_json_with_params(text: &str, params: &HashMap<String, String>) -> ConfigResult<Self> {
        Self::from_json(&substitute_placeholders(text, params)?)
    }

    pub fn from_file(path: impl AsRef<Path>, params: &HashMap<String, String>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;
        Self::from_json_with_params(&text, params)
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    pub fn into_value(self) -> Value {
        self.root
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments = parse_path(path).ok()?;
        let mut current = &self.root;
        for segment in &segments {
            current = match segment {
                Segment::Key(key) => current.as_object()?.get(key)?,
                Segment::Index(index) => current.as_array()?.get(*index)?,
            };
        }
        Some(current)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.get(path).is_some_and(|value| !value.is_null())
    }

    /// String value; numbers and booleans are rendered as text
    pub fn get_string(&self, path: &str) -> Option<String> {
        match self.get(path)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Integer value; numeric strings are accepted
    pub fn get_i64(&self, path: &str) -> Option<i64> {
        match self.get(path)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get_i64(path).and_then(|v| u64::try_from(v).ok())
    }

    pub fn get_f64(&self, path: &str) -> Option<f64> {
        match self.get(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        match self.get(path)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn get_list(&self, path: &str) -> Option<&Vec<Value>> {
        self.get(path)?.as_array()
    }

    /// Clone the sub-tree at `path`
    pub fn get_configuration(&self, path: &str) -> Option<Configuration> {
        self.get(path).map(|value| Self::from_value(value.clone()))
    }

    /// Clone each element of the list at `path`
    pub fn get_list_configuration(&self, path: &str) -> Vec<Configuration> {
        self.get_list(path)
            .map(|items| items.iter().cloned().map(Self::from_value).collect())
            .unwrap_or_default()
    }

    /// Set the node at `path`, creating intermediate containers
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> ConfigResult<()> {
        let segments = parse_path(path)?;
        let mut current = &mut self.root;
        for segment in &segments {
            current = match segment {
                Segment::Key(key) => {
                    if !current.is_object() {
                        *current = Value::Object(Map::new());
                    }
                    current
                        .as_object_mut()
                        .ok_or_else(|| ConfigurationError::invalid_path(path, "expected an object"))?
                        .entry(key.clone())
                        .or_insert(Value::Null)
                }
                Segment::Index(index) => {
                    if !current.is_array() {
                        *current = Value::Array(Vec::new());
                    }
                    let items = current
                        .as_array_mut()
                        .ok_or_else(|| ConfigurationError::invalid_path(path, "expected an array"))?;
                    if items.len() <= *index {
                        items.resize(*index + 1, Value::Null);
                    }
                    &mut items[*index]
                }
            };
        }
        *current = value.into();
        Ok(())
    }

    /// Remove and return the node at `path`
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let mut segments = parse_path(path).ok()?;
        let last = segments.pop()?;
        let mut current = &mut self.root;
        for segment in &segments {
            current = match segment {
                Segment::Key(key) => current.as_object_mut()?.get_mut(key)?,
                Segment::Index(index) => current.as_array_mut()?.get_mut(*index)?,
            };
        }
        match last {
            Segment::Key(key) => current.as_object_mut()?.remove(&key),
            Segment::Index(index) => {
                let items = current.as_array_mut()?;
                (index < items.len()).then(|| items.remove(index))
            }
        }
    }

    /// Top-level keys of the object at `path`
    pub fn keys(&self, path: &str) -> Vec<String> {
        self.get(path)
            .and_then(Value::as_object)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of the tree with every `*password*` value masked
    pub fn masked(&self) -> Value {
        let mut copy = self.root.clone();
        mask_secrets(&mut copy);
        copy
    }

    pub fn to_json(&self) -> String {
        self.root.to_string()
    }

    /// Pretty JSON with secrets masked, safe for logs
    pub fn to_masked_json(&self) -> String {
        serde_json::to_string_pretty(&self.masked()).unwrap_or_else(|_| "[serialization error]".to_string())
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_masked_json())
    }
}

impl From<Value> for Configuration {
    fn from(root: Value) -> Self {
        Self::from_value(root)
    }
}

fn mask_secrets(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key.to_ascii_lowercase().contains("password") {
                    *child = Value::String(MASKED.to_string());
                } else {
                    mask_secrets(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(mask_secrets),
        _ => {}
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Replace `${name}` with `params[name]`, falling back to the environment
fn substitute_placeholders(text: &str, params: &HashMap<String, String>) -> ConfigResult<String> {
    let mut output = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if is_placeholder_name(&after[..end]) => {
                let name = &after[..end];
                let value = params
                    .get(name)
                    .cloned()
                    .or_else(|| std::env::var(name).ok())
                    .ok_or_else(|| ConfigurationError::UnresolvedPlaceholder {
                        name: name.to_string(),
                    })?;
                output.push_str(&value);
                rest = &after[end + 1..];
            }
            _ => {
                output.push_str("${");
                rest = after;
            }
        }
    }
    output.push_str(rest);

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Configuration {
        Configuration::from_value(json!({
            "job": {
                "content": [{
                    "reader": { "name": "streamreader", "parameter": { "sliceRecordCount": "10" } },
                    "writer": { "name": "streamwriter", "parameter": { "password": "secret" } }
                }],
                "setting": { "speed": { "channel": 3 } }
            }
        }))
    }

    #[test]
    fn test_get_with_index_paths() {
        let config = sample();
        assert_eq!(
            config.get_string("job.content[0].reader.name").as_deref(),
            Some("streamreader")
        );
        assert_eq!(config.get_u64("job.content[0].reader.parameter.sliceRecordCount"), Some(10));
        assert_eq!(config.get_i64("job.setting.speed.channel"), Some(3));
        assert!(config.get("job.content[1]").is_none());
        assert!(config.get("job.content[x]").is_none());
    }

    #[test]
    fn test_set_creates_intermediate_nodes() {
        let mut config = Configuration::new();
        config.set("job.content[1].reader.name", "r").unwrap();

        assert!(config.get("job.content[0]").unwrap().is_null());
        assert_eq!(config.get_string("job.content[1].reader.name").as_deref(), Some("r"));
        assert!(config.set("job..x", 1).is_err());
    }

    #[test]
    fn test_remove_returns_node() {
        let mut config = sample();
        let removed = config.remove("job.setting.speed");
        assert_eq!(removed, Some(json!({ "channel": 3 })));
        assert!(!config.exists("job.setting.speed"));
    }

    #[test]
    fn test_masked_hides_passwords() {
        let rendered = sample().to_masked_json();
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains(MASKED));
    }

    #[test]
    fn test_placeholder_substitution() {
        let mut params = HashMap::new();
        params.insert("count".to_string(), "42".to_string());

        let config =
            Configuration::from_json_with_params(r#"{"n": ${count}, "s": "$not"}"#, &params).unwrap();
        assert_eq!(config.get_i64("n"), Some(42));
        assert_eq!(config.get_string("s").as_deref(), Some("$not"));

        let missing = Configuration::from_json_with_params(r#"{"n": ${batchsync_missing_param}}"#, &params);
        assert!(matches!(
            missing,
            Err(ConfigurationError::UnresolvedPlaceholder { .. })
        ));
    }
}
