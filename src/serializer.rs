//! Context encodings used to talk to hook scripts.
//!
//! A hook receives the context on stdin and may print an updated one on stdout,
//! both in the encoding selected by the `_hook_serializer` context key.

use anyhow::Context as _;
use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{Error, Result};

/// Tag used when the context does not select a serializer.
pub const DEFAULT_SERIALIZER: &str = "json";

pub trait Serializer: Send + Sync {
    fn serialize(&self, value: &Value) -> anyhow::Result<String>;
    fn deserialize(&self, text: &str) -> anyhow::Result<Value>;
}

#[derive(Debug, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn serialize(&self, value: &Value) -> anyhow::Result<String> {
        serde_json::to_string(value).context("failed to encode context as JSON")
    }

    fn deserialize(&self, text: &str) -> anyhow::Result<Value> {
        serde_json::from_str(text).context("failed to decode JSON")
    }
}

#[derive(Debug, Default)]
pub struct YamlSerializer;

impl Serializer for YamlSerializer {
    fn serialize(&self, value: &Value) -> anyhow::Result<String> {
        serde_yaml::to_string(value).context("failed to encode context as YAML")
    }

    fn deserialize(&self, text: &str) -> anyhow::Result<Value> {
        serde_yaml::from_str(text).context("failed to decode YAML")
    }
}

/// Serializers keyed by tag.
///
/// Tags are lowercase ASCII identifiers (letters, digits, `_` and `-`, starting
/// with a letter) and unique within a registry.
pub struct SerializerRegistry {
    serializers: IndexMap<String, Box<dyn Serializer>>,
}

impl SerializerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { serializers: IndexMap::new() }
    }

    /// A registry holding the `json` and `yaml` serializers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.serializers.insert("json".to_string(), Box::new(JsonSerializer));
        registry.serializers.insert("yaml".to_string(), Box::new(YamlSerializer));
        registry
    }

    /// # Errors
    /// * `Error::Serializer` for malformed or duplicate tags.
    pub fn register(&mut self, tag: &str, serializer: Box<dyn Serializer>) -> Result<()> {
        validate_tag(tag)?;
        if self.serializers.contains_key(tag) {
            return Err(Error::Serializer(format!("tag '{tag}' is already registered")));
        }
        self.serializers.insert(tag.to_string(), serializer);
        Ok(())
    }

    pub fn get(&self, tag: &str) -> Result<&dyn Serializer> {
        self.serializers
            .get(tag)
            .map(|s| s.as_ref())
            .ok_or_else(|| Error::Serializer(format!("no serializer registered for tag '{tag}'")))
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.serializers.keys().map(String::as_str)
    }
}

impl Default for SerializerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn validate_tag(tag: &str) -> Result<()> {
    let mut chars = tag.chars();
    let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::Serializer(format!("invalid tag '{tag}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtins() {
        let registry = SerializerRegistry::with_builtins();
        assert_eq!(registry.tags().collect::<Vec<_>>(), vec!["json", "yaml"]);

        let yaml = registry.get("yaml").unwrap();
        let text = yaml.serialize(&json!({"name": "demo", "count": 2})).unwrap();
        assert_eq!(yaml.deserialize(&text).unwrap(), json!({"name": "demo", "count": 2}));
        assert!(registry.get("toml").is_err());
    }

    #[test]
    fn test_register_rejects_bad_tags() {
        let mut registry = SerializerRegistry::with_builtins();
        assert!(registry.register("", Box::new(JsonSerializer)).is_err());
        assert!(registry.register("JSON5", Box::new(JsonSerializer)).is_err());
        assert!(registry.register("json", Box::new(JsonSerializer)).is_err());
        assert!(registry.register("json-compact", Box::new(JsonSerializer)).is_ok());
    }
}
