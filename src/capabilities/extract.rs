// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Regex field extractor
//!
//! Applies named regular expressions to a text input and emits an object
//! mapping each name to the first capture, or to every match when
//! `all_matches` is set. A pattern with a capture group yields group 1,
//! otherwise the whole match.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::{parse_settings, InputDecl, Inputs, Module, Outputs, Settings};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractorSettings {
    patterns: BTreeMap<String, String>,
    all_matches: bool,
    input: Option<String>,
    output: Option<String>,
}

/// Extracts named fields from text
#[derive(Debug, Clone)]
pub struct RegexExtractor {
    patterns: Vec<(String, Regex)>,
    all_matches: bool,
    consumes: Vec<InputDecl>,
    produces: Vec<String>,
}

impl RegexExtractor {
    pub const ID: &'static str = "regex_extractor";

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let settings: ExtractorSettings = parse_settings(settings)?;

        if settings.patterns.is_empty() {
            anyhow::bail!("'patterns' must define at least one field");
        }

        let patterns = settings
            .patterns
            .into_iter()
            .map(|(name, pattern)| {
                Regex::new(&pattern)
                    .map(|re| (name.clone(), re))
                    .map_err(|e| anyhow::anyhow!("pattern for '{}' is invalid: {}", name, e))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            patterns,
            all_matches: settings.all_matches,
            consumes: vec![InputDecl::required(
                settings.input.unwrap_or_else(|| "raw_text".to_string()),
            )],
            produces: vec![settings.output.unwrap_or_else(|| "fields".to_string())],
        })
    }

    fn extract(&self, re: &Regex, text: &str) -> Value {
        let pick = |caps: regex::Captures| -> Value {
            caps.get(1)
                .or_else(|| caps.get(0))
                .map(|m| Value::String(m.as_str().to_string()))
                .unwrap_or(Value::Null)
        };

        if self.all_matches {
            Value::Array(re.captures_iter(text).map(pick).collect())
        } else {
            re.captures(text).map(pick).unwrap_or(Value::Null)
        }
    }
}

#[async_trait]
impl Module for RegexExtractor {
    fn consumes(&self) -> &[InputDecl] {
        &self.consumes
    }

    fn produces(&self) -> &[String] {
        &self.produces
    }

    async fn execute(&self, inputs: Inputs) -> anyhow::Result<Outputs> {
        let text = inputs.require_str(&self.consumes[0].key)?;

        let fields: Map<String, Value> = self
            .patterns
            .iter()
            .map(|(name, re)| (name.clone(), self.extract(re, text)))
            .collect();

        Ok(Outputs::single(self.produces[0].clone(), Value::Object(fields)))
    }
}
