// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Pipeline executor
//!
//! Runs a [`BuiltPipeline`] against a fresh result store, applying the
//! error policy, per-module timeouts and cooperative cancellation. The
//! executor never prints; everything observable goes through `tracing`
//! and the returned [`RunResult`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;

use crate::capabilities::{Inputs, Module, Outputs};
use crate::errors::{CapflowError, CapflowResult, DependencyPhase};
use crate::pipeline::builder::{BoundModule, BuiltPipeline};
use crate::pipeline::context::{ModuleOutcome, ModuleStatus, RunContext, RunResult};
use crate::pipeline::store::ResultStore;
use crate::pipeline::{CancellationToken, Concurrency, ErrorPolicy};

/// Run-time overrides for a pipeline's own settings
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Replaces the pipeline's error policy
    pub error_policy: Option<ErrorPolicy>,
    /// Timeout for modules that have none configured
    pub module_timeout: Option<Duration>,
    /// Replaces the pipeline's scheduling model
    pub concurrency: Option<Concurrency>,
    /// Upper bound on modules running at once in parallel mode
    pub max_parallel: Option<usize>,
    /// Checked between module invocations
    pub cancel: Option<CancellationToken>,
}

/// Pipeline executor
#[derive(Debug, Default)]
pub struct PipelineExecutor {
    options: ExecutionOptions,
}

/// Outcome of one invocation before it is committed
struct Invocation {
    result: CapflowResult<Outputs>,
    duration: Duration,
}

impl PipelineExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ExecutionOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    fn error_policy(&self, pipeline: &BuiltPipeline) -> ErrorPolicy {
        self.options.error_policy.unwrap_or(pipeline.error_policy)
    }

    fn concurrency(&self, pipeline: &BuiltPipeline) -> Concurrency {
        self.options.concurrency.unwrap_or(pipeline.concurrency)
    }

    fn timeout_for(&self, module: &BoundModule) -> Option<Duration> {
        module.timeout.or(self.options.module_timeout)
    }

    fn is_cancelled(&self) -> bool {
        self.options
            .cancel
            .as_ref()
            .map(CancellationToken::is_cancelled)
            .unwrap_or(false)
    }

    /// Execute a pipeline
    ///
    /// Every call owns a fresh store, so running the same pipeline twice
    /// with deterministic modules yields identical stores.
    pub async fn run(&self, pipeline: &BuiltPipeline) -> RunResult {
        let policy = self.error_policy(pipeline);
        let concurrency = self.concurrency(pipeline);

        let mut ctx = RunContext::new();
        ctx.start();

        tracing::info!(
            pipeline = %pipeline.name,
            modules = pipeline.len(),
            policy = %policy,
            concurrency = ?concurrency,
            "pipeline.start"
        );

        let error = match concurrency {
            Concurrency::Sequential => self.run_sequential(pipeline, policy, &mut ctx).await,
            Concurrency::Parallel => self.run_parallel(pipeline, policy, &mut ctx).await,
        };

        let result = ctx.finish(error);

        tracing::info!(
            pipeline = %pipeline.name,
            state = %result.state,
            failures = result.failures().count(),
            duration_ms = result.duration.as_millis() as u64,
            "pipeline.end"
        );

        result
    }

    /// Returns the error that aborted the run, if any
    async fn run_sequential(
        &self,
        pipeline: &BuiltPipeline,
        policy: ErrorPolicy,
        ctx: &mut RunContext,
    ) -> Option<CapflowError> {
        for bound in pipeline.modules() {
            if self.is_cancelled() {
                tracing::warn!(pipeline = %pipeline.name, before = %bound.name, "pipeline.cancelled");
                return Some(CapflowError::Cancelled);
            }

            let started = Instant::now();
            let result = match gather_inputs(bound, &ctx.store) {
                Ok(inputs) => {
                    invoke(
                        Arc::clone(&bound.module),
                        bound.name.clone(),
                        inputs,
                        self.timeout_for(bound),
                    )
                    .await
                }
                Err(e) => Err(e),
            };

            let invocation = Invocation {
                result,
                duration: started.elapsed(),
            };

            if let Some(error) = commit(bound, invocation, ctx) {
                if policy == ErrorPolicy::Abort {
                    return Some(error);
                }
            }
        }

        None
    }

    /// Wave scheduler
    ///
    /// Every module whose upstream set is committed runs concurrently. A
    /// result is committed only once every module before it in execution
    /// order is committed, so the store and log match a sequential run and
    /// an abort drops every result positioned after the failure.
    async fn run_parallel(
        &self,
        pipeline: &BuiltPipeline,
        policy: ErrorPolicy,
        ctx: &mut RunContext,
    ) -> Option<CapflowError> {
        let modules = pipeline.modules();
        let limit = self
            .options
            .max_parallel
            .or(pipeline.max_parallel)
            .unwrap_or(usize::MAX)
            .max(1);

        let mut started = vec![false; modules.len()];
        let mut pending: BTreeMap<usize, Invocation> = BTreeMap::new();
        // Modules before this index are committed
        let mut committed = 0usize;
        let mut wave_number = 0usize;

        while committed < modules.len() {
            if self.is_cancelled() {
                tracing::warn!(pipeline = %pipeline.name, wave = wave_number, "pipeline.cancelled");
                discard_pending(modules, pending, ctx);
                return Some(CapflowError::Cancelled);
            }

            // The first module not yet started always has its upstream committed
            let wave: Vec<usize> = (committed..modules.len())
                .filter(|i| !started[*i])
                .filter(|i| modules[*i].upstream.iter().all(|u| *u < committed))
                .take(limit)
                .collect();

            wave_number += 1;
            tracing::debug!(
                wave = wave_number,
                modules = ?wave.iter().map(|i| modules[*i].name.as_str()).collect::<Vec<_>>(),
                "pipeline.wave"
            );

            let mut tasks = JoinSet::new();

            for &index in &wave {
                started[index] = true;
                let bound = &modules[index];
                match gather_inputs(bound, &ctx.store) {
                    Ok(inputs) => {
                        let module = Arc::clone(&bound.module);
                        let name = bound.name.clone();
                        let timeout = self.timeout_for(bound);
                        tasks.spawn(async move {
                            let started = Instant::now();
                            let result = invoke(module, name, inputs, timeout).await;
                            (index, result, started.elapsed())
                        });
                    }
                    Err(e) => {
                        pending.insert(
                            index,
                            Invocation {
                                result: Err(e),
                                duration: Duration::ZERO,
                            },
                        );
                    }
                }
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, result, duration)) => {
                        pending.insert(index, Invocation { result, duration });
                    }
                    Err(e) => tracing::error!(error = %e, "module task failed to complete"),
                }
            }

            // Tasks that never reported back panicked
            for &index in &wave {
                pending.entry(index).or_insert_with(|| Invocation {
                    result: Err(CapflowError::ModuleExecution {
                        module: modules[index].name.clone(),
                        cause: "module task panicked".to_string(),
                    }),
                    duration: Duration::ZERO,
                });
            }

            while let Some(invocation) = pending.remove(&committed) {
                let bound = &modules[committed];
                committed += 1;

                if let Some(error) = commit(bound, invocation, ctx) {
                    if policy == ErrorPolicy::Abort {
                        discard_pending(modules, pending, ctx);
                        return Some(error);
                    }
                }
            }
        }

        None
    }
}

/// Log results that ran ahead of a module that aborted the run
fn discard_pending(modules: &[BoundModule], pending: BTreeMap<usize, Invocation>, ctx: &mut RunContext) {
    for (index, invocation) in pending {
        discard(&modules[index], invocation, ctx);
    }
}

/// Build the input bundle from the store; absent optional keys map to `None`
fn gather_inputs(bound: &BoundModule, store: &ResultStore) -> CapflowResult<Inputs> {
    let mut inputs = Inputs::new();

    for decl in &bound.consumes {
        match store.get(&decl.key) {
            Some(value) => inputs.insert(decl.key.clone(), Some(value.clone())),
            None if decl.required => {
                return Err(CapflowError::UnsatisfiedDependency {
                    module: bound.name.clone(),
                    key: decl.key.clone(),
                    phase: DependencyPhase::Execution,
                })
            }
            None => inputs.insert(decl.key.clone(), None),
        }
    }

    Ok(inputs)
}

async fn invoke(
    module: Arc<dyn Module>,
    name: String,
    inputs: Inputs,
    timeout: Option<Duration>,
) -> CapflowResult<Outputs> {
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, module.execute(inputs)).await {
            Ok(result) => result,
            Err(_) => {
                return Err(CapflowError::ModuleTimeout {
                    module: name,
                    timeout_ms: limit.as_millis() as u64,
                })
            }
        },
        None => module.execute(inputs).await,
    };

    result.map_err(|e| CapflowError::module_execution(&name, &e))
}

/// The returned bundle must hold exactly the declared produced keys
fn check_contract(bound: &BoundModule, outputs: &Outputs) -> CapflowResult<()> {
    if let Some(missing) = bound.produces.iter().find(|key| !outputs.contains(key)) {
        return Err(CapflowError::ContractViolation {
            module: bound.name.clone(),
            reason: format!("declared key '{}' missing from outputs", missing),
        });
    }

    if let Some(extra) = outputs.keys().find(|key| !bound.produces.iter().any(|p| p == key)) {
        return Err(CapflowError::ContractViolation {
            module: bound.name.clone(),
            reason: format!("undeclared key '{}' returned", extra),
        });
    }

    Ok(())
}

/// Write outputs and log the outcome; returns the error on failure
fn commit(bound: &BoundModule, invocation: Invocation, ctx: &mut RunContext) -> Option<CapflowError> {
    let checked = invocation
        .result
        .and_then(|outputs| check_contract(bound, &outputs).map(|_| outputs));

    match checked {
        Ok(outputs) => {
            let mut produced = Vec::with_capacity(outputs.len());
            for (key, value) in outputs {
                produced.push(key.clone());
                ctx.store.set(key, value);
            }

            tracing::info!(
                module = %bound.name,
                id = %bound.id,
                produced = ?produced,
                duration_ms = invocation.duration.as_millis() as u64,
                "module.done"
            );

            ctx.record(ModuleOutcome {
                name: bound.name.clone(),
                id: bound.id.clone(),
                status: ModuleStatus::Succeeded,
                consumed: bound.consumed_keys(),
                produced,
                duration: invocation.duration,
                error: None,
            });
            None
        }
        Err(error) => {
            tracing::warn!(
                module = %bound.name,
                id = %bound.id,
                consumed = ?bound.consumed_keys(),
                produces = ?bound.produces,
                error = %error,
                "module.failed"
            );

            ctx.record(ModuleOutcome {
                name: bound.name.clone(),
                id: bound.id.clone(),
                status: ModuleStatus::Failed,
                consumed: bound.consumed_keys(),
                produced: Vec::new(),
                duration: invocation.duration,
                error: Some(error.clone()),
            });
            Some(error)
        }
    }
}

/// Log a wave member whose results are dropped because the run aborted
fn discard(bound: &BoundModule, invocation: Invocation, ctx: &mut RunContext) {
    tracing::debug!(module = %bound.name, "module.discarded");

    ctx.record(ModuleOutcome {
        name: bound.name.clone(),
        id: bound.id.clone(),
        status: ModuleStatus::Discarded,
        consumed: bound.consumed_keys(),
        produced: Vec::new(),
        duration: invocation.duration,
        error: invocation.result.err(),
    });
}
