// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Pipeline specification, building and execution
//!
//! A [`PipelineSpec`] is turned into a [`BuiltPipeline`] by the
//! [`PipelineBuilder`], which is then run any number of times by the
//! [`PipelineExecutor`].

mod builder;
mod cancel;
mod context;
mod dag;
mod definition;
mod executor;
mod store;
mod validation;

pub use builder::{BoundModule, BuiltPipeline, PipelineBuilder};
pub use cancel::CancellationToken;
pub use context::{ModuleOutcome, ModuleStatus, OutcomeReport, RunContext, RunReport, RunResult, RunState};
pub use dag::{DependencyEdge, DependencyGraph, GraphNode};
pub use definition::*;
pub use executor::{ExecutionOptions, PipelineExecutor};
pub use store::ResultStore;
pub use validation::{PipelineValidator, ValidationResult};
