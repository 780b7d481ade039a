// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Validate command - check a pipeline without running it

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::{load_pipeline, report};
use crate::capabilities::builtin_registry;
use crate::pipeline::{PipelineBuilder, PipelineValidator};

/// Run the validate command
pub async fn run(pipeline_path: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating pipeline...".bold());
    println!();

    let spec = match load_pipeline(&pipeline_path) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("  {} Failed to parse pipeline", "✗".red());
            return Err(report(e));
        }
    };

    println!("  {} Pipeline file parsed", "✓".green());

    let registry = builtin_registry().map_err(report)?;
    let validation = PipelineValidator::validate(&spec);
    let unknown = PipelineValidator::validate_modules(&spec, &registry);

    let mut has_errors = false;

    if !validation.errors.is_empty() {
        has_errors = true;
        println!();
        println!("{}:", "Errors".red().bold());
        for error in &validation.errors {
            println!("  {} {}", "✗".red(), error);
        }
    }

    if !unknown.is_empty() {
        has_errors = true;
        println!();
        println!("{}:", "Unknown modules".red().bold());
        for message in &unknown {
            println!("  {} {}", "✗".red(), message);
        }
    }

    if !validation.warnings.is_empty() {
        println!();
        println!("{}:", "Warnings".yellow().bold());
        for warning in &validation.warnings {
            println!("  {} {}", "⚠".yellow(), warning);
        }
    }

    if has_errors {
        println!();
        return Err(miette::miette!("Pipeline validation failed"));
    }

    // Structure is sound; building checks settings, cycles and key availability
    let pipeline = PipelineBuilder::new(&registry).build(&spec).map_err(|e| {
        eprintln!("  {} Pipeline does not build", "✗".red());
        report(e)
    })?;

    println!("  {} All {} module(s) resolved and wired", "✓".green(), pipeline.len());

    if verbose {
        println!();
        println!("{}:", "Pipeline summary".bold());
        println!("  Name: {}", pipeline.name);
        println!("  Ordering: {}", pipeline.ordering());
        println!("  Error policy: {}", pipeline.error_policy);
        for module in pipeline.modules() {
            let consumes = module.consumed_keys().join(", ");
            println!(
                "    - {} ({}) {}",
                module.name,
                module.id,
                format!("[{}] → [{}]", consumes, module.produces.join(", ")).dimmed()
            );
        }
    }

    println!();

    if validation.has_warnings() {
        println!("{}", "Pipeline is valid but has warnings.".yellow().bold());
    } else {
        println!("{}", "Pipeline is valid!".green().bold());
    }

    Ok(())
}
