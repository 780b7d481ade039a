// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Constant source module
//!
//! Emits a value taken verbatim from its settings.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_settings, InputDecl, Inputs, Module, Outputs, Settings};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConstantSettings {
    value: Value,
    output: Option<String>,
}

/// Produces a fixed value under a single key
#[derive(Debug, Clone)]
pub struct ConstantModule {
    value: Value,
    produces: Vec<String>,
}

impl ConstantModule {
    pub const ID: &'static str = "constant";

    pub fn new(output: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            produces: vec![output.into()],
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let settings: ConstantSettings = parse_settings(settings)?;
        if settings.value.is_null() {
            anyhow::bail!("'value' setting is required");
        }

        Ok(Self::new(
            settings.output.unwrap_or_else(|| "value".to_string()),
            settings.value,
        ))
    }
}

#[async_trait]
impl Module for ConstantModule {
    fn consumes(&self) -> &[InputDecl] {
        &[]
    }

    fn produces(&self) -> &[String] {
        &self.produces
    }

    async fn execute(&self, _inputs: Inputs) -> anyhow::Result<Outputs> {
        Ok(Outputs::single(self.produces[0].clone(), self.value.clone()))
    }
}
