// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Capability modules
//!
//! This module defines the contract every pipeline module satisfies
//! (declared consumed/produced keys plus a single `execute` operation)
//! and a handful of reference implementations registered by
//! [`register_builtins`].

mod constant;
mod extract;
mod file;
mod shell;
mod stats;
mod summarize;

pub use constant::ConstantModule;
pub use extract::RegexExtractor;
pub use file::FileReader;
pub use shell::ShellModule;
pub use stats::TextStats;
pub use summarize::Summarizer;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::CapflowResult;
use crate::registry::ModuleRegistry;

/// Free-form settings object handed verbatim to a module factory
pub type Settings = Value;

/// A key a module consumes, and whether it must be present
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputDecl {
    /// Result store key
    pub key: String,
    /// Missing required keys fail the build; missing optional ones arrive as `None`
    pub required: bool,
}

impl InputDecl {
    /// Declare a required input
    pub fn required(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            required: true,
        }
    }

    /// Declare an optional input
    pub fn optional(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            required: false,
        }
    }
}

/// Values for the keys a module declared as consumed
///
/// An optional key with no producer is present in the bundle as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inputs {
    values: BTreeMap<String, Option<Value>>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Option<Value>) {
        self.values.insert(key.into(), value);
    }

    /// Value for `key`, or `None` if absent or not declared
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key).and_then(Option::as_ref)
    }

    /// Whether `key` was declared by the module, regardless of presence
    pub fn is_declared(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Whether `key` carries a value
    pub fn is_present(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Value for `key`, failing if it is absent
    pub fn require(&self, key: &str) -> anyhow::Result<&Value> {
        self.get(key)
            .ok_or_else(|| anyhow::anyhow!("missing input '{}'", key))
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// String value for `key`, failing if it is absent or not a string
    pub fn require_str(&self, key: &str) -> anyhow::Result<&str> {
        self.require(key)?
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("input '{}' is not a string", key))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Option<Value>)> for Inputs {
    fn from_iter<I: IntoIterator<Item = (String, Option<Value>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Keyed bundle returned by a module
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outputs {
    values: BTreeMap<String, Value>,
}

impl Outputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundle holding a single key
    pub fn single(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().with(key, value)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IntoIterator for Outputs {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// The contract every pipeline module satisfies
#[async_trait]
pub trait Module: Send + Sync {
    /// Keys read from the result store
    fn consumes(&self) -> &[InputDecl];

    /// Keys written to the result store; at least one
    fn produces(&self) -> &[String];

    /// Run the module
    ///
    /// # Arguments
    /// * `inputs` - One entry per declared consumed key
    ///
    /// The returned bundle must hold exactly the declared produced keys.
    async fn execute(&self, inputs: Inputs) -> anyhow::Result<Outputs>;
}

/// Deserialize typed settings, treating a missing (null) object as the default
pub fn parse_settings<T>(settings: &Settings) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    if settings.is_null() {
        return Ok(T::default());
    }

    serde_json::from_value(settings.clone()).map_err(|e| anyhow::anyhow!("invalid settings: {}", e))
}

/// Register every reference capability
pub fn register_builtins(registry: &mut ModuleRegistry) -> CapflowResult<()> {
    registry.register(ConstantModule::ID, |s: &Settings| {
        Ok(Arc::new(ConstantModule::from_settings(s)?) as Arc<dyn Module>)
    })?;
    registry.register(FileReader::ID, |s: &Settings| {
        Ok(Arc::new(FileReader::from_settings(s)?) as Arc<dyn Module>)
    })?;
    registry.register(ShellModule::ID, |s: &Settings| {
        Ok(Arc::new(ShellModule::from_settings(s)?) as Arc<dyn Module>)
    })?;
    registry.register(RegexExtractor::ID, |s: &Settings| {
        Ok(Arc::new(RegexExtractor::from_settings(s)?) as Arc<dyn Module>)
    })?;
    registry.register(Summarizer::ID, |s: &Settings| {
        Ok(Arc::new(Summarizer::from_settings(s)?) as Arc<dyn Module>)
    })?;
    registry.register(TextStats::ID, |s: &Settings| {
        Ok(Arc::new(TextStats::from_settings(s)?) as Arc<dyn Module>)
    })?;

    Ok(())
}

/// Registry holding every reference capability, sealed
pub fn builtin_registry() -> CapflowResult<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    register_builtins(&mut registry)?;
    registry.seal();
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Sample {
        count: usize,
        label: Option<String>,
    }

    #[test]
    fn test_parse_settings_null_is_default() {
        let parsed: Sample = parse_settings(&Value::Null).unwrap();
        assert_eq!(parsed.count, 0);
        assert!(parsed.label.is_none());
    }

    #[test]
    fn test_parse_settings_rejects_wrong_types() {
        let err = parse_settings::<Sample>(&json!({ "count": "many" })).unwrap_err();
        assert!(err.to_string().contains("invalid settings"));
    }

    #[test]
    fn test_inputs_distinguish_absent_from_undeclared() {
        let mut inputs = Inputs::new();
        inputs.insert("raw_text", Some(json!("hello")));
        inputs.insert("title", None);

        assert_eq!(inputs.get_str("raw_text"), Some("hello"));
        assert!(inputs.is_declared("title"));
        assert!(!inputs.is_present("title"));
        assert!(!inputs.is_declared("other"));
        assert!(inputs.require("title").is_err());
    }

    #[test]
    fn test_builtin_registry_is_sealed_and_complete() {
        let registry = builtin_registry().unwrap();
        assert!(registry.is_sealed());
        assert_eq!(
            registry.identifiers(),
            vec![
                "constant",
                "file_reader",
                "regex_extractor",
                "shell",
                "summarizer",
                "text_stats"
            ]
        );
    }
}
