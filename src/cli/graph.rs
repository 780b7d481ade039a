// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Graph command - visualize the pipeline dependency graph

use miette::Result;
use std::path::PathBuf;

use super::{load_and_build, report, GraphFormat};

/// Run the graph command
pub async fn run(pipeline_path: PathBuf, format: GraphFormat, _verbose: bool) -> Result<()> {
    let pipeline = load_and_build(&pipeline_path).map_err(report)?;
    let graph = pipeline.graph();

    let output = match format {
        GraphFormat::Text => pipeline.plan(),
        GraphFormat::Dot => graph.to_dot(),
        GraphFormat::Mermaid => graph.to_mermaid(),
    };

    print!("{}", output);

    Ok(())
}
