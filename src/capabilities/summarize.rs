// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Lead-sentence summarizer

use async_trait::async_trait;
use serde::Deserialize;

use super::{parse_settings, InputDecl, Inputs, Module, Outputs, Settings};

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SummarizerSettings {
    sentences: usize,
    max_chars: Option<usize>,
    title: Option<String>,
    input: Option<String>,
    output: Option<String>,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            sentences: 3,
            max_chars: None,
            title: None,
            input: None,
            output: None,
        }
    }
}

/// Keeps the first N sentences of a text
///
/// When a `title` key is configured it is consumed as an optional input
/// and, if present, prefixed to the summary.
#[derive(Debug, Clone)]
pub struct Summarizer {
    sentences: usize,
    max_chars: Option<usize>,
    consumes: Vec<InputDecl>,
    produces: Vec<String>,
}

impl Summarizer {
    pub const ID: &'static str = "summarizer";

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let settings: SummarizerSettings = parse_settings(settings)?;

        if settings.sentences == 0 {
            anyhow::bail!("'sentences' must be at least 1");
        }

        let mut consumes = vec![InputDecl::required(
            settings.input.unwrap_or_else(|| "raw_text".to_string()),
        )];
        if let Some(title) = settings.title {
            consumes.push(InputDecl::optional(title));
        }

        Ok(Self {
            sentences: settings.sentences,
            max_chars: settings.max_chars,
            consumes,
            produces: vec![settings.output.unwrap_or_else(|| "summary".to_string())],
        })
    }

    /// Summarize `text` without any title
    pub fn summarize(&self, text: &str) -> String {
        let summary = split_sentences(text)
            .into_iter()
            .take(self.sentences)
            .collect::<Vec<_>>()
            .join(" ");

        match self.max_chars {
            Some(limit) if summary.chars().count() > limit => {
                let mut cut: String = summary.chars().take(limit).collect();
                cut.push('…');
                cut
            }
            _ => summary,
        }
    }
}

#[async_trait]
impl Module for Summarizer {
    fn consumes(&self) -> &[InputDecl] {
        &self.consumes
    }

    fn produces(&self) -> &[String] {
        &self.produces
    }

    async fn execute(&self, inputs: Inputs) -> anyhow::Result<Outputs> {
        let text = inputs.require_str(&self.consumes[0].key)?;
        let mut summary = self.summarize(text);

        let title = self
            .consumes
            .get(1)
            .and_then(|decl| inputs.get_str(&decl.key));
        if let Some(title) = title {
            summary = format!("{}: {}", title, summary);
        }

        Ok(Outputs::single(self.produces[0].clone(), summary))
    }
}

/// Split text into trimmed sentences ending in `.`, `!` or `?`
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = chars.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                let end = idx + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }

    sentences
}
