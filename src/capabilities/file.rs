// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! File reader module
//!
//! Reads every file matching a set of glob patterns and concatenates
//! their contents into one text value.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::{parse_settings, InputDecl, Inputs, Module, Outputs, Settings};

/// One pattern or a list of patterns
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Patterns {
    Single(String),
    Multiple(Vec<String>),
}

impl Default for Patterns {
    fn default() -> Self {
        Self::Multiple(vec![])
    }
}

impl Patterns {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s],
            Self::Multiple(v) => v,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileReaderSettings {
    path: Patterns,
    base_dir: Option<PathBuf>,
    separator: Option<String>,
    output: Option<String>,
}

/// Reads files into the result store
#[derive(Debug, Clone)]
pub struct FileReader {
    patterns: Vec<String>,
    base_dir: PathBuf,
    separator: String,
    produces: Vec<String>,
}

impl FileReader {
    pub const ID: &'static str = "file_reader";

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let settings: FileReaderSettings = parse_settings(settings)?;
        let patterns = settings.path.into_vec();

        if patterns.is_empty() || patterns.iter().any(|p| p.is_empty()) {
            anyhow::bail!("'path' must name at least one non-empty glob pattern");
        }

        Ok(Self {
            patterns,
            base_dir: settings.base_dir.unwrap_or_else(|| PathBuf::from(".")),
            separator: settings.separator.unwrap_or_else(|| "\n\n".to_string()),
            produces: vec![settings.output.unwrap_or_else(|| "raw_text".to_string())],
        })
    }

    /// Files matched by the configured patterns, sorted per pattern
    pub fn matched_files(&self) -> anyhow::Result<Vec<PathBuf>> {
        resolve_globs(&self.patterns, &self.base_dir)
    }
}

#[async_trait]
impl Module for FileReader {
    fn consumes(&self) -> &[InputDecl] {
        &[]
    }

    fn produces(&self) -> &[String] {
        &self.produces
    }

    async fn execute(&self, _inputs: Inputs) -> anyhow::Result<Outputs> {
        let files = self.matched_files()?;

        let mut contents = Vec::with_capacity(files.len());
        for file in &files {
            let text = tokio::fs::read_to_string(file)
                .await
                .map_err(|e| anyhow::anyhow!("failed to read '{}': {}", file.display(), e))?;
            contents.push(text);
        }

        tracing::debug!(files = files.len(), "file_reader read inputs");
        Ok(Outputs::single(self.produces[0].clone(), contents.join(&self.separator)))
    }
}

/// Resolve glob patterns to file paths
fn resolve_globs(patterns: &[String], base_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for pattern in patterns {
        let full_pattern = if Path::new(pattern).is_absolute() {
            pattern.clone()
        } else {
            base_dir.join(pattern).to_string_lossy().to_string()
        };

        let mut matches: Vec<PathBuf> = glob::glob(&full_pattern)
            .map_err(|e| anyhow::anyhow!("invalid glob pattern '{}': {}", pattern, e))?
            .filter_map(Result::ok)
            .filter(|p| p.is_file())
            .collect();

        if matches.is_empty() {
            anyhow::bail!("no files matched pattern '{}'", pattern);
        }

        matches.sort();
        files.extend(matches);
    }

    Ok(files)
}
