// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Text statistics analyzer

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::summarize::split_sentences;
use super::{parse_settings, InputDecl, Inputs, Module, Outputs, Settings};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatsSettings {
    input: Option<String>,
    output: Option<String>,
}

/// Counts words, sentences, lines and characters
#[derive(Debug, Clone)]
pub struct TextStats {
    consumes: Vec<InputDecl>,
    produces: Vec<String>,
}

impl TextStats {
    pub const ID: &'static str = "text_stats";

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let settings: StatsSettings = parse_settings(settings)?;

        Ok(Self {
            consumes: vec![InputDecl::required(
                settings.input.unwrap_or_else(|| "raw_text".to_string()),
            )],
            produces: vec![settings.output.unwrap_or_else(|| "stats".to_string())],
        })
    }
}

#[async_trait]
impl Module for TextStats {
    fn consumes(&self) -> &[InputDecl] {
        &self.consumes
    }

    fn produces(&self) -> &[String] {
        &self.produces
    }

    async fn execute(&self, inputs: Inputs) -> anyhow::Result<Outputs> {
        let text = inputs.require_str(&self.consumes[0].key)?;

        let stats = json!({
            "characters": text.chars().count(),
            "words": text.split_whitespace().count(),
            "sentences": split_sentences(text).len(),
            "lines": text.lines().count(),
        });

        Ok(Outputs::single(self.produces[0].clone(), stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_counts() {
        let module = TextStats::from_settings(&serde_json::Value::Null).unwrap();

        let mut inputs = Inputs::new();
        inputs.insert("raw_text", Some(json!("Hello there. General Kenobi!\nBold one.")));

        let outputs = module.execute(inputs).await.unwrap();
        assert_eq!(
            outputs.get("stats"),
            Some(&json!({ "characters": 38, "words": 6, "sentences": 3, "lines": 2 }))
        );
    }

    #[tokio::test]
    async fn test_non_string_input_fails() {
        let module = TextStats::from_settings(&serde_json::Value::Null).unwrap();

        let mut inputs = Inputs::new();
        inputs.insert("raw_text", Some(json!(42)));

        assert!(module.execute(inputs).await.is_err());
    }
}
