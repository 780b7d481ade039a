// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! # capflow - Capability Module Pipelines
//!
//! `capflow` composes independent processing modules into pipelines driven
//! by a declarative configuration document. Modules declare the keys they
//! consume and produce; the engine wires them together through a shared
//! result store.
//!
//! ## Features
//!
//! - **Scoped registry** - Identifiers map to module factories, sealable after setup
//! - **Build-time checks** - Unknown modules, cycles and missing inputs fail before anything runs
//! - **Error policies** - Abort on first failure or skip and continue
//! - **Parallel waves** - Independent modules run concurrently with sequential results
//!
//! ## Quick Start
//!
//! ```no_run
//! use capflow::{builtin_registry, PipelineBuilder, PipelineExecutor, PipelineSpec};
//!
//! # async fn demo() -> capflow::CapflowResult<()> {
//! let spec = PipelineSpec::from_yaml(r#"
//! name: digest
//! modules:
//!   - id: file_reader
//!     settings: { path: "docs/*.txt" }
//!   - id: summarizer
//! "#)?;
//!
//! let registry = builtin_registry()?;
//! let pipeline = PipelineBuilder::new(&registry).build(&spec)?;
//! let result = PipelineExecutor::new().run(&pipeline).await.into_result()?;
//! println!("{:?}", result.store.get("summary"));
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod cli;
pub mod errors;
pub mod pipeline;
pub mod registry;
pub mod utils;

// Re-export commonly used types
pub use capabilities::{builtin_registry, register_builtins, InputDecl, Inputs, Module, Outputs, Settings};
pub use errors::{CapflowError, CapflowResult};
pub use pipeline::{
    BuiltPipeline, CancellationToken, ErrorPolicy, ExecutionOptions, ModuleEntry, PipelineBuilder,
    PipelineExecutor, PipelineSpec, ResultStore, RunResult, RunState,
};
pub use registry::ModuleRegistry;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
