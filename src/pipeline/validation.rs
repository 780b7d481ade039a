// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Pipeline validation
//!
//! Structural checks that need no module instances. The builder runs
//! [`PipelineValidator::validate`] before resolving anything.

use std::collections::HashSet;

use crate::errors::closest_match;
use crate::pipeline::{Concurrency, ModuleEntry, Ordering, PipelineSpec};
use crate::registry::ModuleRegistry;

/// Pipeline validator
pub struct PipelineValidator;

impl PipelineValidator {
    /// Validate a pipeline configuration
    pub fn validate(pipeline: &PipelineSpec) -> ValidationResult {
        let mut result = ValidationResult::new();

        if pipeline.modules.is_empty() {
            result.add_error("Pipeline has no modules defined");
        }

        let mut seen_names = HashSet::new();
        for entry in &pipeline.modules {
            if !seen_names.insert(entry.name()) {
                result.add_error(&format!(
                    "Duplicate module name: '{}' (set 'name' to tell instances apart)",
                    entry.name()
                ));
            }
        }

        for entry in &pipeline.modules {
            Self::validate_entry(entry, pipeline, &mut result);
        }

        if pipeline.module_timeout_ms == Some(0) {
            result.add_error("module_timeout_ms must be greater than zero");
        }

        match (pipeline.concurrency, pipeline.max_parallel) {
            (_, Some(0)) => result.add_error("max_parallel must be greater than zero"),
            (Concurrency::Sequential, Some(_)) => {
                result.add_warning("max_parallel has no effect with sequential concurrency")
            }
            _ => {}
        }

        result
    }

    /// Validate a single module entry
    fn validate_entry(entry: &ModuleEntry, pipeline: &PipelineSpec, result: &mut ValidationResult) {
        if entry.id.trim().is_empty() {
            result.add_error("Module entry has an empty 'id'");
        }

        if entry.timeout_ms == Some(0) {
            result.add_error(&format!("Module '{}': timeout_ms must be greater than zero", entry.name()));
        }

        for dep in &entry.depends_on {
            if dep == entry.name() {
                result.add_error(&format!("Module '{}' depends on itself", dep));
            } else if pipeline.get_module(dep).is_none() {
                result.add_error(&format!(
                    "Module '{}' depends on unknown module '{}'",
                    entry.name(),
                    dep
                ));
            }
        }

        if !entry.depends_on.is_empty() && pipeline.resolved_ordering() == Ordering::Declared {
            result.add_warning(&format!(
                "Module '{}': depends_on is only checked, not used for ordering, with ordering: declared",
                entry.name()
            ));
        }
    }

    /// Check that every identifier is registered
    pub fn validate_modules(pipeline: &PipelineSpec, registry: &ModuleRegistry) -> Vec<String> {
        pipeline
            .modules
            .iter()
            .filter(|entry| !registry.contains(&entry.id))
            .map(|entry| match closest_match(&entry.id, registry.identifiers()) {
                Some(candidate) => format!(
                    "Module '{}': unknown identifier '{}' (did you mean '{}'?)",
                    entry.name(),
                    entry.id,
                    candidate
                ),
                None => format!("Module '{}': unknown identifier '{}'", entry.name(), entry.id),
            })
            .collect()
    }
}

/// Result of pipeline validation
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, message: &str) {
        self.errors.push(message.to_string());
    }

    pub fn add_warning(&mut self, message: &str) {
        self.warnings.push(message.to_string());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::builtin_registry;

    #[test]
    fn test_validate_empty_pipeline() {
        let pipeline = PipelineSpec::new("empty", vec![]);

        let result = PipelineValidator::validate(&pipeline);
        assert!(!result.is_valid());
        assert!(result.errors[0].contains("no modules"));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let pipeline = PipelineSpec::new(
            "test",
            vec![ModuleEntry::new("summarizer"), ModuleEntry::new("summarizer")],
        );

        let result = PipelineValidator::validate(&pipeline);
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.contains("Duplicate")));

        let renamed = PipelineSpec::new(
            "test",
            vec![
                ModuleEntry::new("summarizer"),
                ModuleEntry::new("summarizer").with_name("short_summary"),
            ],
        );
        assert!(PipelineValidator::validate(&renamed).is_valid());
    }

    #[test]
    fn test_validate_dependencies() {
        let pipeline = PipelineSpec::new(
            "test",
            vec![
                ModuleEntry::new("a").depends_on(["a"]),
                ModuleEntry::new("b").depends_on(["ghost"]),
            ],
        );

        let result = PipelineValidator::validate(&pipeline);
        assert_eq!(result.errors.len(), 2);
        assert!(result.errors[0].contains("depends on itself"));
        assert!(result.errors[1].contains("unknown module 'ghost'"));
    }

    #[test]
    fn test_declared_ordering_warns_about_depends_on() {
        let mut pipeline = PipelineSpec::new(
            "test",
            vec![ModuleEntry::new("a"), ModuleEntry::new("b").depends_on(["a"])],
        );
        pipeline.ordering = Some(Ordering::Declared);

        let result = PipelineValidator::validate(&pipeline);
        assert!(result.is_valid());
        assert!(result.has_warnings());
    }

    #[test]
    fn test_zero_limits_rejected() {
        let mut pipeline = PipelineSpec::new("test", vec![ModuleEntry::new("a").with_timeout_ms(0)]);
        pipeline.max_parallel = Some(0);

        let result = PipelineValidator::validate(&pipeline);
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn test_validate_modules_against_registry() {
        let registry = builtin_registry().unwrap();
        let pipeline = PipelineSpec::new(
            "test",
            vec![ModuleEntry::new("summarizer"), ModuleEntry::new("sumarizer").with_name("typo")],
        );

        let problems = PipelineValidator::validate_modules(&pipeline, &registry);
        assert_eq!(
            problems,
            vec!["Module 'typo': unknown identifier 'sumarizer' (did you mean 'summarizer'?)"]
        );
    }
}
