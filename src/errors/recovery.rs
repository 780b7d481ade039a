// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Error recovery suggestions
//!
//! Provides actionable suggestions for recovering from errors.

use super::CapflowError;

/// A recovery suggestion with concrete steps
#[derive(Debug, Clone)]
pub struct RecoverySuggestion {
    /// Brief description of what to do
    pub action: String,
    /// Detailed steps
    pub steps: Vec<String>,
    /// Commands to run
    pub commands: Vec<String>,
}

impl RecoverySuggestion {
    /// Pick a suggestion matching an error, if one applies
    pub fn for_error(error: &CapflowError) -> Option<Self> {
        match error {
            CapflowError::UnknownModule { id, help } => {
                Some(Self::register_module(id, help.as_deref()))
            }
            CapflowError::CyclicDependency { modules } => Some(Self::fix_cycle(modules)),
            CapflowError::UnsatisfiedDependency { module, key, .. } => {
                Some(Self::provide_key(module, key))
            }
            CapflowError::PipelineNotFound { .. } => Some(Self::create_pipeline()),
            CapflowError::Yaml { .. } => Some(Self::fix_config_syntax()),
            _ => None,
        }
    }

    /// Suggest registering (or correcting) a module identifier
    pub fn register_module(id: &str, hint: Option<&str>) -> Self {
        let mut steps = vec![format!("No module is registered under '{}'", id)];
        if let Some(hint) = hint {
            steps.push(hint.to_string());
        }
        steps.push("Fix the identifier or register the module before building".into());

        Self {
            action: format!("Resolve module '{}'", id),
            steps,
            commands: vec![
                "# List registered modules:".into(),
                "capflow modules".into(),
            ],
        }
    }

    /// Suggest fixing a dependency cycle
    pub fn fix_cycle(modules: &[String]) -> Self {
        Self {
            action: "Remove dependency cycle".into(),
            steps: vec![
                format!("Detected cycle: {}", modules.join(" → ")),
                "A module cannot consume a key produced by one of its own dependents".into(),
                "Drop a depends_on entry or rename one of the keys".into(),
            ],
            commands: vec![
                "# Visualize your pipeline:".into(),
                "capflow graph --format mermaid".into(),
            ],
        }
    }

    /// Suggest adding a producer for a missing key
    pub fn provide_key(module: &str, key: &str) -> Self {
        Self {
            action: format!("Provide key '{}'", key),
            steps: vec![
                format!("Module '{}' consumes '{}' but nothing earlier produces it", module, key),
                "Add a producing module ahead of it, or use ordering: dependencies".into(),
                "If the input is not essential, declare it optional in the module".into(),
            ],
            commands: vec![],
        }
    }

    /// Suggest creating a pipeline file
    pub fn create_pipeline() -> Self {
        Self {
            action: "Create a pipeline configuration".into(),
            steps: vec![
                "No .capflow.yaml found in current directory".into(),
                "Create one listing the modules to activate".into(),
            ],
            commands: vec![
                "# Minimal pipeline:".into(),
                "printf 'name: demo\\nmodules:\\n  - id: constant\\n    settings: { value: hi }\\n' > .capflow.yaml"
                    .into(),
            ],
        }
    }

    /// Suggest fixing invalid configuration syntax
    pub fn fix_config_syntax() -> Self {
        Self {
            action: "Fix pipeline syntax".into(),
            steps: vec![
                "Check for common YAML issues:".into(),
                "  • Incorrect indentation (use spaces, not tabs)".into(),
                "  • Missing 'modules:' list".into(),
                "  • Entries without an 'id' field".into(),
            ],
            commands: vec![
                "# Validate without running:".into(),
                "capflow validate".into(),
            ],
        }
    }
}

impl std::fmt::Display for RecoverySuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "→ {}", self.action)?;

        for step in &self.steps {
            writeln!(f, "  {}", step)?;
        }

        if !self.commands.is_empty() {
            writeln!(f)?;
            for cmd in &self.commands {
                writeln!(f, "  {}", cmd)?;
            }
        }

        Ok(())
    }
}

/// Find the candidate closest to `target` by edit distance, if close enough
pub fn closest_match<'a>(
    target: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Option<String> {
    let limit = (target.chars().count() / 3).max(1);

    candidates
        .into_iter()
        .map(|c| (levenshtein(target, c), c))
        .filter(|(d, _)| *d <= limit)
        .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
        .map(|(_, c)| c.to_string())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut row = Vec::with_capacity(b.len() + 1);
        row.push(i + 1);
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca == *cb { 0 } else { 1 };
            row.push((prev[j] + cost).min(prev[j + 1] + 1).min(row[j] + 1));
        }
        prev = row;
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("same", "same"), 0);
    }

    #[test]
    fn test_closest_match_rejects_distant_names() {
        assert_eq!(
            closest_match("summarizr", ["summarizer", "scraper"]),
            Some("summarizer".to_string())
        );
        assert_eq!(closest_match("zzz", ["summarizer", "scraper"]), None);
    }

    #[test]
    fn test_cycle_suggestion_display() {
        let suggestion = RecoverySuggestion::fix_cycle(&["a".into(), "b".into(), "a".into()]);
        let text = suggestion.to_string();
        assert!(text.starts_with("→ Remove dependency cycle"));
        assert!(text.contains("a → b → a"));
        assert!(text.contains("capflow graph"));
    }
}
