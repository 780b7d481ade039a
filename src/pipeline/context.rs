// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Run context and results
//!
//! A [`RunContext`] is created fresh for every run and owns the result
//! store plus the per-module outcome log. It is consumed into a
//! [`RunResult`] once the run reaches a terminal state.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::store::ResultStore;
use crate::errors::{CapflowError, CapflowResult};

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Built,
    Running,
    Completed,
    Aborted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Built => write!(f, "built"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// What happened to one module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleStatus {
    /// Ran and its outputs were written
    Succeeded,
    /// Failed; its keys were left unset
    Failed,
    /// Ran concurrently with a module that aborted the run; outputs dropped
    Discarded,
}

/// Log entry for one module invocation
#[derive(Debug, Clone)]
pub struct ModuleOutcome {
    /// Instance name
    pub name: String,
    /// Registry identifier
    pub id: String,
    pub status: ModuleStatus,
    /// Declared consumed keys
    pub consumed: Vec<String>,
    /// Keys written to the store
    pub produced: Vec<String>,
    pub duration: Duration,
    pub error: Option<CapflowError>,
}

impl ModuleOutcome {
    pub fn is_success(&self) -> bool {
        self.status == ModuleStatus::Succeeded
    }
}

/// Mutable state owned by one executor invocation
#[derive(Debug)]
pub struct RunContext {
    state: RunState,
    pub store: ResultStore,
    log: Vec<ModuleOutcome>,
    started: Instant,
}

impl RunContext {
    pub(crate) fn new() -> Self {
        Self {
            state: RunState::Built,
            store: ResultStore::new(),
            log: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn log(&self) -> &[ModuleOutcome] {
        &self.log
    }

    pub(crate) fn start(&mut self) {
        self.transition(RunState::Running);
        self.started = Instant::now();
    }

    fn transition(&mut self, next: RunState) {
        tracing::debug!(from = %self.state, to = %next, "run.transition");
        self.state = next;
    }

    pub(crate) fn record(&mut self, outcome: ModuleOutcome) {
        self.log.push(outcome);
    }

    /// Move to a terminal state; an error means the run was aborted
    pub(crate) fn finish(mut self, error: Option<CapflowError>) -> RunResult {
        let state = if error.is_some() {
            RunState::Aborted
        } else {
            RunState::Completed
        };
        self.transition(state);

        RunResult {
            state,
            store: self.store,
            log: self.log,
            error,
            duration: self.started.elapsed(),
        }
    }
}

/// Outcome of executing a pipeline
#[derive(Debug, Clone)]
pub struct RunResult {
    /// `Completed` or `Aborted`
    pub state: RunState,
    /// Final store contents
    pub store: ResultStore,
    /// Per-module outcomes in the order they were committed
    pub log: Vec<ModuleOutcome>,
    /// The error that aborted the run
    pub error: Option<CapflowError>,
    pub duration: Duration,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Completed
    }

    /// Outcome for an instance name
    pub fn outcome(&self, name: &str) -> Option<&ModuleOutcome> {
        self.log.iter().find(|o| o.name == name)
    }

    /// Failed modules, including those skipped under `skip-and-continue`
    pub fn failures(&self) -> impl Iterator<Item = &ModuleOutcome> {
        self.log.iter().filter(|o| o.status == ModuleStatus::Failed)
    }

    /// Turn an aborted run into its terminating error
    pub fn into_result(self) -> CapflowResult<Self> {
        match self.state {
            RunState::Aborted => Err(self.error.unwrap_or(CapflowError::Cancelled)),
            _ => Ok(self),
        }
    }

    /// Serializable view of this result
    pub fn report(&self) -> RunReport {
        RunReport::from(self)
    }
}

/// Serializable run result
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub state: RunState,
    pub duration_ms: u64,
    pub digest: String,
    pub store: BTreeMap<String, Value>,
    pub modules: Vec<OutcomeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Serializable module outcome
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeReport {
    pub name: String,
    pub id: String,
    pub status: ModuleStatus,
    pub consumed: Vec<String>,
    pub produced: Vec<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ModuleOutcome> for OutcomeReport {
    fn from(outcome: &ModuleOutcome) -> Self {
        Self {
            name: outcome.name.clone(),
            id: outcome.id.clone(),
            status: outcome.status,
            consumed: outcome.consumed.clone(),
            produced: outcome.produced.clone(),
            duration_ms: outcome.duration.as_millis() as u64,
            error: outcome.error.as_ref().map(ToString::to_string),
        }
    }
}

impl From<&RunResult> for RunReport {
    fn from(result: &RunResult) -> Self {
        Self {
            state: result.state,
            duration_ms: result.duration.as_millis() as u64,
            digest: result.store.digest(),
            store: result.store.snapshot(),
            modules: result.log.iter().map(OutcomeReport::from).collect(),
            error: result.error.as_ref().map(ToString::to_string),
        }
    }
}
