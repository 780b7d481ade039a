// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Watch command - re-run the pipeline on file changes

use colored::Colorize;
use miette::Result;
use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use std::path::{Component, Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;

use super::{load_and_build, run::print_result, RunFlags};
use crate::errors::RecoverySuggestion;
use crate::pipeline::PipelineExecutor;

/// Directories whose changes never trigger a re-run
const IGNORED_DIRS: &[&str] = &[".git", "target", "node_modules"];

/// Run the watch command
pub async fn run(pipeline_path: PathBuf, flags: RunFlags, debounce_ms: u64, verbose: bool) -> Result<()> {
    if !pipeline_path.exists() {
        return Err(super::report(crate::errors::CapflowError::PipelineNotFound {
            path: pipeline_path,
        }));
    }

    println!("{}", "Starting watch mode...".bold());
    println!("Watching for changes (debounce: {}ms)", debounce_ms);
    println!("Press {} to exit.", "Ctrl+C".cyan());
    println!();

    let (tx, rx) = channel();

    let mut debouncer = new_debouncer(Duration::from_millis(debounce_ms), tx)
        .map_err(|e| miette::miette!("Failed to create file watcher: {}", e))?;

    debouncer
        .watcher()
        .watch(Path::new("."), RecursiveMode::Recursive)
        .map_err(|e| miette::miette!("Failed to start watching: {}", e))?;

    run_pipeline(&pipeline_path, &flags, verbose).await;

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let relevant: Vec<_> = events
                    .iter()
                    .filter(|e| !is_ignored(&e.path))
                    .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                    .collect();

                if !relevant.is_empty() {
                    println!();
                    println!("{}", "─".repeat(50).dimmed());
                    println!("{}: {} file(s) changed", "Change detected".yellow(), relevant.len());

                    if verbose {
                        for event in &relevant {
                            println!("  {}", event.path.display());
                        }
                    }

                    println!();
                    run_pipeline(&pipeline_path, &flags, verbose).await;
                }
            }
            Ok(Err(e)) => {
                eprintln!("{}: {:?}", "Watch error".red(), e);
            }
            Err(e) => {
                eprintln!("{}: {}", "Channel error".red(), e);
                break;
            }
        }
    }

    Ok(())
}

fn is_ignored(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(name) => IGNORED_DIRS.iter().any(|dir| name == *dir),
        _ => false,
    })
}

/// Reload, rebuild and run; errors are printed, never fatal
async fn run_pipeline(pipeline_path: &Path, flags: &RunFlags, verbose: bool) {
    let pipeline = match load_and_build(pipeline_path) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{}: {}", "Failed to build pipeline".red(), e);
            if let Some(suggestion) = RecoverySuggestion::for_error(&e) {
                eprint!("{}", suggestion);
            }
            return;
        }
    };

    let executor = PipelineExecutor::with_options(flags.execution_options(None));
    let result = executor.run(&pipeline).await;

    print_result(&result, verbose);

    if let Some(error) = &result.error {
        eprintln!("{}: {}", "Error".red(), error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignored_paths() {
        assert!(is_ignored(Path::new("./target/debug/build.log")));
        assert!(is_ignored(Path::new("/work/repo/.git/index")));
        assert!(!is_ignored(Path::new("./docs/notes.txt")));
        assert!(!is_ignored(Path::new("./targets.txt")));
    }
}
