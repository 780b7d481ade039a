// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Run command - build and execute the pipeline

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use super::{load_pipeline, report, OutputFormat, RunFlags};
use crate::capabilities::builtin_registry;
use crate::pipeline::{
    CancellationToken, ModuleOutcome, ModuleStatus, PipelineBuilder, PipelineExecutor, PipelineValidator,
    RunResult,
};
use crate::utils;

/// Run the pipeline
pub async fn run(
    pipeline_path: PathBuf,
    flags: RunFlags,
    dry_run: bool,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let spec = load_pipeline(&pipeline_path).map_err(report)?;

    let validation = PipelineValidator::validate(&spec);
    if validation.has_warnings() && verbose {
        eprintln!("{}", "Pipeline warnings:".yellow().bold());
        for warning in &validation.warnings {
            eprintln!("  {} {}", "⚠".yellow(), warning);
        }
        eprintln!();
    }

    let registry = builtin_registry().map_err(report)?;
    let pipeline = PipelineBuilder::new(&registry).build(&spec).map_err(report)?;

    if dry_run {
        println!("{}", utils::bold(&format!("Execution plan for '{}':", pipeline.name)));
        print!("{}", pipeline.plan());
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", "Cancelling after the current module...".yellow());
                cancel.cancel();
            }
        })
    };

    let spinner = utils::create_spinner(
        &format!("Running '{}' ({} modules)", pipeline.name, pipeline.len()),
        format == OutputFormat::Text,
    );

    let executor = PipelineExecutor::with_options(flags.execution_options(Some(cancel)));
    let result = executor.run(&pipeline).await;

    spinner.finish_and_clear();
    ctrl_c.abort();

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&result.report())
                .map_err(|e| miette::miette!("Failed to serialize run report: {}", e))?;
            println!("{}", json);
        }
        OutputFormat::Text => print_result(&result, verbose),
    }

    result.into_result().map(|_| ()).map_err(report)
}

/// Print the module log, the store and a summary line
pub(crate) fn print_result(result: &RunResult, verbose: bool) {
    for outcome in &result.log {
        print_outcome(outcome, verbose);
    }

    if !result.store.is_empty() {
        utils::print_section("Results");
        for (key, value) in result.store.iter() {
            let rendered = match value.as_str() {
                Some(text) => text.to_string(),
                None => value.to_string(),
            };
            let rendered = if verbose {
                rendered
            } else {
                utils::truncate(&rendered, 72)
            };
            println!("  {} = {}", utils::code(key), rendered);
        }
    }

    println!();
    let failures = result.failures().count();
    let elapsed = result.duration.as_secs_f64();

    if !result.is_success() {
        println!("{} ({:.2}s)", utils::error("Pipeline aborted"), elapsed);
    } else if failures > 0 {
        println!(
            "{} ({:.2}s)",
            utils::warning(&format!("Pipeline completed with {} failed module(s)", failures)),
            elapsed
        );
    } else {
        println!("{} ({:.2}s)", utils::success("Pipeline completed successfully"), elapsed);
    }

    if verbose {
        println!("  digest: {}", utils::dimmed(&result.store.digest()));
    }
}

fn print_outcome(outcome: &ModuleOutcome, verbose: bool) {
    let label = format!("{} ({})", outcome.name, outcome.id);
    let timing = format!("{}ms", outcome.duration.as_millis());

    match outcome.status {
        ModuleStatus::Succeeded => {
            let keys = outcome.produced.join(", ");
            utils::print_success(&format!("{} → {} {}", label, keys, utils::dimmed(&timing)));
        }
        ModuleStatus::Failed => {
            let error = outcome
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default();
            utils::print_error(&format!("{} - {}", label, utils::dimmed(&error)));
        }
        ModuleStatus::Discarded => {
            println!("  {} {} (discarded)", "○".dimmed(), label.dimmed());
        }
    }

    if verbose && !outcome.consumed.is_empty() {
        println!("      consumed: {}", outcome.consumed.join(", "));
    }
}
