// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Error types for building and running pipelines
//!
//! Errors fall into two groups. Configuration-time errors abort a build
//! before any module runs. Execution-time errors are subject to the
//! pipeline's error policy and are always recorded in the run log.

mod recovery;

pub use recovery::{closest_match, RecoverySuggestion};

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for capflow operations
pub type CapflowResult<T> = Result<T, CapflowError>;

/// When an unsatisfied dependency was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyPhase {
    /// Static check while building the pipeline
    Build,
    /// A producer failed under `skip-and-continue`, leaving the key unset
    Execution,
}

impl std::fmt::Display for DependencyPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Build => write!(f, "build time"),
            Self::Execution => write!(f, "execution time"),
        }
    }
}

/// Main error type for capflow
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum CapflowError {
    // ─────────────────────────────────────────────────────────────────────────
    // Registry Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Unknown module '{id}'")]
    #[diagnostic(code(capflow::unknown_module))]
    UnknownModule {
        id: String,
        #[help]
        help: Option<String>,
    },

    #[error("Cannot register module '{id}': registry is sealed")]
    #[diagnostic(
        code(capflow::registry_sealed),
        help("Register every module before sealing the registry")
    )]
    RegistrySealed { id: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Build Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Module '{id}' failed to initialize: {cause}")]
    #[diagnostic(
        code(capflow::module_init),
        help("Check the settings given to '{id}' in your pipeline file")
    )]
    ModuleInit { id: String, cause: String },

    #[error("Cyclic dependency detected: {}", .modules.join(" → "))]
    #[diagnostic(
        code(capflow::cyclic_dependency),
        help("Review depends_on entries and consumed/produced keys to remove the cycle")
    )]
    CyclicDependency { modules: Vec<String> },

    #[error("Module '{module}' requires key '{key}' which is not available at {phase}")]
    #[diagnostic(
        code(capflow::unsatisfied_dependency),
        help("Add a module producing '{key}' before '{module}', or mark the input optional")
    )]
    UnsatisfiedDependency {
        module: String,
        key: String,
        phase: DependencyPhase,
    },

    #[error("Invalid pipeline configuration: {reason}")]
    #[diagnostic(code(capflow::invalid_pipeline))]
    InvalidPipeline {
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Module '{module}' failed: {cause}")]
    #[diagnostic(code(capflow::module_execution))]
    ModuleExecution { module: String, cause: String },

    #[error("Module '{module}' violated its contract: {reason}")]
    #[diagnostic(
        code(capflow::contract_violation),
        help("A module must return exactly the keys it declares as produced")
    )]
    ContractViolation { module: String, reason: String },

    #[error("Module '{module}' exceeded its time limit of {timeout_ms}ms")]
    #[diagnostic(code(capflow::module_timeout))]
    ModuleTimeout { module: String, timeout_ms: u64 },

    #[error("Run cancelled")]
    #[diagnostic(code(capflow::cancelled))]
    Cancelled,

    // ─────────────────────────────────────────────────────────────────────────
    // File Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Pipeline file not found: {path}")]
    #[diagnostic(
        code(capflow::pipeline_not_found),
        help("Create .capflow.yaml or pass the pipeline path explicitly")
    )]
    PipelineNotFound { path: PathBuf },

    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(capflow::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Unsupported pipeline format: {path}")]
    #[diagnostic(
        code(capflow::unsupported_format),
        help("Supported extensions: .yaml, .yml, .json, .toml")
    )]
    UnsupportedFormat { path: PathBuf },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("IO error: {message}")]
    #[diagnostic(code(capflow::io_error))]
    Io { message: String },

    #[error("YAML parsing error: {message}")]
    #[diagnostic(code(capflow::yaml_error))]
    Yaml { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(capflow::json_error))]
    Json { message: String },

    #[error("TOML parsing error: {message}")]
    #[diagnostic(code(capflow::toml_error))]
    Toml { message: String },
}

impl From<std::io::Error> for CapflowError {
    fn from(e: std::io::Error) -> Self {
        Self::Io { message: e.to_string() }
    }
}

impl From<serde_yaml::Error> for CapflowError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Yaml { message: e.to_string() }
    }
}

impl From<serde_json::Error> for CapflowError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json { message: e.to_string() }
    }
}

impl From<toml::de::Error> for CapflowError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml { message: e.to_string() }
    }
}

impl CapflowError {
    /// Create an unknown module error, suggesting the closest registered identifier
    pub fn unknown_module<'a>(id: &str, known: impl IntoIterator<Item = &'a str>) -> Self {
        let help = match closest_match(id, known) {
            Some(candidate) => Some(format!("Did you mean '{}'?", candidate)),
            None => Some("Run 'capflow modules' to list registered modules".to_string()),
        };

        Self::UnknownModule {
            id: id.to_string(),
            help,
        }
    }

    /// Wrap a module-defined error raised while constructing a module
    pub fn module_init(id: &str, cause: &anyhow::Error) -> Self {
        Self::ModuleInit {
            id: id.to_string(),
            cause: format!("{:#}", cause),
        }
    }

    /// Wrap a module-defined error raised by `execute`
    pub fn module_execution(module: &str, cause: &anyhow::Error) -> Self {
        Self::ModuleExecution {
            module: module.to_string(),
            cause: format!("{:#}", cause),
        }
    }

    /// Whether this error can only occur while building a pipeline
    pub fn is_build_error(&self) -> bool {
        match self {
            Self::UnknownModule { .. }
            | Self::ModuleInit { .. }
            | Self::CyclicDependency { .. }
            | Self::InvalidPipeline { .. } => true,
            Self::UnsatisfiedDependency { phase, .. } => *phase == DependencyPhase::Build,
            _ => false,
        }
    }

    /// The module instance this error refers to, if any
    pub fn module_name(&self) -> Option<&str> {
        match self {
            Self::UnknownModule { id, .. } | Self::ModuleInit { id, .. } => Some(id),
            Self::UnsatisfiedDependency { module, .. }
            | Self::ModuleExecution { module, .. }
            | Self::ContractViolation { module, .. }
            | Self::ModuleTimeout { module, .. } => Some(module),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_module_suggests_closest() {
        let err = CapflowError::unknown_module("pdf_parserr", ["pdf_parser", "web_scraper"]);
        match err {
            CapflowError::UnknownModule { id, help } => {
                assert_eq!(id, "pdf_parserr");
                assert_eq!(help.as_deref(), Some("Did you mean 'pdf_parser'?"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_build_error_classification() {
        let build = CapflowError::UnsatisfiedDependency {
            module: "summarizer".into(),
            key: "raw_text".into(),
            phase: DependencyPhase::Build,
        };
        let runtime = CapflowError::UnsatisfiedDependency {
            module: "summarizer".into(),
            key: "raw_text".into(),
            phase: DependencyPhase::Execution,
        };

        assert!(build.is_build_error());
        assert!(!runtime.is_build_error());
        assert!(!CapflowError::Cancelled.is_build_error());
        assert_eq!(runtime.module_name(), Some("summarizer"));
    }

    #[test]
    fn test_module_execution_keeps_context_chain() {
        let cause = anyhow::anyhow!("connection refused").context("fetching page");
        let err = CapflowError::module_execution("scraper", &cause);
        assert_eq!(
            err.to_string(),
            "Module 'scraper' failed: fetching page: connection refused"
        );
    }
}
