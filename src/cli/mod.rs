// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for capflow.

pub mod graph;
pub mod modules;
pub mod run;
pub mod validate;
pub mod watch;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capabilities::builtin_registry;
use crate::errors::{CapflowError, CapflowResult, RecoverySuggestion};
use crate::pipeline::{
    BuiltPipeline, CancellationToken, Concurrency, ErrorPolicy, ExecutionOptions, PipelineBuilder,
    PipelineSpec,
};
use crate::utils;

/// Default pipeline file name
pub const DEFAULT_PIPELINE: &str = ".capflow.yaml";

/// Declarative pipelines of capability modules
///
/// Activate modules from a configuration file and let capflow route their
/// results to each other.
#[derive(Parser, Debug)]
#[clap(
    name = "capflow",
    version,
    about = "Declarative composition engine for capability-module pipelines",
    long_about = None,
    after_help = "Examples:\n\
        capflow run                       Execute .capflow.yaml\n\
        capflow run digest.yaml --policy skip\n\
        capflow graph --format mermaid    Render the dependency graph\n\
        capflow modules                   List registered modules\n\n\
        See 'capflow <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build and execute a pipeline
    Run {
        /// Pipeline file (.yaml, .yml, .json or .toml)
        #[clap(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,

        #[clap(flatten)]
        flags: RunFlags,

        /// Build only and show the execution plan
        #[clap(long)]
        dry_run: bool,

        /// Output format
        #[clap(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Validate a pipeline without executing it
    Validate {
        /// Pipeline file to validate
        #[clap(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,
    },

    /// Show the pipeline dependency graph
    Graph {
        /// Pipeline file
        #[clap(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,

        /// Output format
        #[clap(short, long, value_enum, default_value = "text")]
        format: GraphFormat,
    },

    /// List registered module identifiers
    Modules {
        /// Output format
        #[clap(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Watch mode - re-run the pipeline on file changes
    Watch {
        /// Pipeline file
        #[clap(default_value = DEFAULT_PIPELINE)]
        pipeline: PathBuf,

        #[clap(flatten)]
        flags: RunFlags,

        /// Debounce delay in milliseconds
        #[clap(long, default_value = "500")]
        debounce: u64,
    },
}

/// Overrides for the settings a pipeline file declares
#[derive(Args, Debug, Clone, Default)]
pub struct RunFlags {
    /// Error policy (abort or skip)
    #[clap(long, env = "CAPFLOW_POLICY")]
    pub policy: Option<ErrorPolicy>,

    /// Timeout for modules without one of their own
    #[clap(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Run independent modules concurrently
    #[clap(long)]
    pub parallel: bool,

    /// Maximum modules running at once with --parallel
    #[clap(long, value_name = "N")]
    pub max_parallel: Option<usize>,
}

impl RunFlags {
    pub fn execution_options(&self, cancel: Option<CancellationToken>) -> ExecutionOptions {
        ExecutionOptions {
            error_policy: self.policy,
            module_timeout: self.timeout_ms.map(Duration::from_millis),
            concurrency: self.parallel.then_some(Concurrency::Parallel),
            max_parallel: self.max_parallel,
            cancel,
        }
    }
}

/// Output format for run and modules
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

/// Load a pipeline file
pub fn load_pipeline(path: &Path) -> CapflowResult<PipelineSpec> {
    tracing::debug!(path = %path.display(), "loading pipeline");
    PipelineSpec::from_file(path)
}

/// Load a pipeline file and build it against the built-in registry
pub fn load_and_build(path: &Path) -> CapflowResult<BuiltPipeline> {
    let spec = load_pipeline(path)?;
    let registry = builtin_registry()?;
    PipelineBuilder::new(&registry).build(&spec)
}

/// Print a recovery suggestion for `error` and convert it into a report
pub(crate) fn report(error: CapflowError) -> miette::Report {
    if let Some(suggestion) = RecoverySuggestion::for_error(&error) {
        eprintln!();
        eprintln!("{}", utils::bold("How to fix:"));
        eprint!("{}", suggestion);
        eprintln!();
    }
    miette::Report::new(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::parse_from([
            "capflow",
            "run",
            "digest.yaml",
            "--policy",
            "skip",
            "--timeout-ms",
            "250",
            "--parallel",
        ]);

        match cli.command {
            Commands::Run { pipeline, flags, dry_run, format } => {
                assert_eq!(pipeline, PathBuf::from("digest.yaml"));
                assert_eq!(flags.policy, Some(ErrorPolicy::SkipAndContinue));
                assert!(flags.parallel);
                assert!(!dry_run);
                assert_eq!(format, OutputFormat::Text);

                let options = flags.execution_options(None);
                assert_eq!(options.module_timeout, Some(Duration::from_millis(250)));
                assert_eq!(options.concurrency, Some(Concurrency::Parallel));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_default_pipeline_path() {
        let cli = Cli::parse_from(["capflow", "graph", "--format", "mermaid"]);

        match cli.command {
            Commands::Graph { pipeline, format } => {
                assert_eq!(pipeline, PathBuf::from(DEFAULT_PIPELINE));
                assert_eq!(format, GraphFormat::Mermaid);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
