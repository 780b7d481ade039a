// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Pipeline definition structures
//!
//! Defines the schema for .capflow.yaml files (JSON and TOML encodings
//! of the same schema are accepted).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::capabilities::Settings;
use crate::errors::{CapflowError, CapflowResult};

/// Pipeline specification loaded from a configuration document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    /// Pipeline version (for future compatibility)
    #[serde(default = "default_version")]
    pub version: String,

    /// Pipeline name
    #[serde(default = "default_name")]
    pub name: String,

    /// Pipeline description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Modules to activate, in declared order
    pub modules: Vec<ModuleEntry>,

    /// How execution order is derived; inferred when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering: Option<Ordering>,

    /// What happens when a module fails
    #[serde(default)]
    pub error_policy: ErrorPolicy,

    /// Maximum duration of any single module, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_timeout_ms: Option<u64>,

    /// Scheduling model
    #[serde(default)]
    pub concurrency: Concurrency,

    /// Upper bound on modules running at once in parallel mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parallel: Option<usize>,
}

fn default_version() -> String {
    "1".to_string()
}

fn default_name() -> String {
    "pipeline".to_string()
}

impl PipelineSpec {
    /// Create a pipeline with default policies
    pub fn new(name: impl Into<String>, modules: Vec<ModuleEntry>) -> Self {
        Self {
            version: default_version(),
            name: name.into(),
            description: None,
            modules,
            ordering: None,
            error_policy: ErrorPolicy::default(),
            module_timeout_ms: None,
            concurrency: Concurrency::default(),
            max_parallel: None,
        }
    }

    /// Load a pipeline, choosing the parser from the file extension
    pub fn from_file(path: &Path) -> CapflowResult<Self> {
        if !path.exists() {
            return Err(CapflowError::PipelineNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CapflowError::FileReadError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml(&content),
            Some("json") => Self::from_json(&content),
            Some("toml") => Self::from_toml(&content),
            _ => Err(CapflowError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Parse pipeline from YAML string
    pub fn from_yaml(yaml: &str) -> CapflowResult<Self> {
        serde_yaml::from_str(yaml).map_err(Into::into)
    }

    /// Parse pipeline from JSON string
    pub fn from_json(json: &str) -> CapflowResult<Self> {
        serde_json::from_str(json).map_err(Into::into)
    }

    /// Parse pipeline from TOML string
    pub fn from_toml(toml: &str) -> CapflowResult<Self> {
        toml::from_str(toml).map_err(Into::into)
    }

    /// Serialize pipeline to YAML
    pub fn to_yaml(&self) -> CapflowResult<String> {
        serde_yaml::to_string(self).map_err(Into::into)
    }

    /// Get a module entry by instance name
    pub fn get_module(&self, name: &str) -> Option<&ModuleEntry> {
        self.modules.iter().find(|m| m.name() == name)
    }

    /// Get all instance names
    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Ordering in effect: explicit if set, dependency-derived if any
    /// entry declares `depends_on`, declared order otherwise
    pub fn resolved_ordering(&self) -> Ordering {
        match self.ordering {
            Some(ordering) => ordering,
            None if self.modules.iter().any(|m| !m.depends_on.is_empty()) => {
                Ordering::Dependencies
            }
            None => Ordering::Declared,
        }
    }

    /// Pipeline-wide module time limit
    pub fn module_timeout(&self) -> Option<Duration> {
        self.module_timeout_ms.map(Duration::from_millis)
    }
}

/// A module to activate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleEntry {
    /// Registry identifier
    pub id: String,

    /// Instance name (defaults to the identifier; must be unique)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Settings passed verbatim to the module factory
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub settings: Settings,

    /// Instances that must run before this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Time limit overriding the pipeline-wide one, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl ModuleEntry {
    /// Entry for `id` with no settings
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            settings: Settings::Null,
            depends_on: vec![],
            timeout_ms: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Instance name, falling back to the identifier
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// How the builder derives execution order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Ordering {
    /// Run in the order modules are listed
    Declared,
    /// Topologically sort on depends_on and consumed/produced keys
    Dependencies,
}

impl std::fmt::Display for Ordering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Declared => write!(f, "declared"),
            Self::Dependencies => write!(f, "dependencies"),
        }
    }
}

/// Behaviour when a module fails during a run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    /// Stop the run at the first failure
    #[default]
    Abort,
    /// Record the failure and keep going with modules that can still run
    #[serde(alias = "skip")]
    SkipAndContinue,
}

impl std::fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::SkipAndContinue => write!(f, "skip-and-continue"),
        }
    }
}

impl std::str::FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" | "skip-and-continue" => Ok(Self::SkipAndContinue),
            _ => Err(format!("Unknown error policy: {}", s)),
        }
    }
}

/// Scheduling model
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Concurrency {
    /// One module at a time, in execution order
    #[default]
    Sequential,
    /// Independent modules run concurrently
    Parallel,
}
