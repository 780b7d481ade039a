// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Modules command - list registered module identifiers

use colored::Colorize;
use miette::Result;
use serde::Serialize;
use serde_json::Value;

use super::{report, OutputFormat};
use crate::capabilities::builtin_registry;
use crate::registry::ModuleRegistry;

/// Registered module and the keys it uses with default settings
#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub id: String,
    /// `None` when the module cannot be built without settings
    pub consumes: Option<Vec<String>>,
    pub produces: Option<Vec<String>>,
}

/// Describe every module in `registry`, sorted by identifier
pub fn describe(registry: &ModuleRegistry) -> Vec<ModuleInfo> {
    registry
        .identifiers()
        .into_iter()
        .map(|id| {
            let module = registry
                .resolve(id)
                .ok()
                .and_then(|factory| factory(&Value::Null).ok());

            ModuleInfo {
                id: id.to_string(),
                consumes: module.as_ref().map(|m| {
                    m.consumes()
                        .iter()
                        .map(|d| if d.required { d.key.clone() } else { format!("{}?", d.key) })
                        .collect()
                }),
                produces: module.as_ref().map(|m| m.produces().to_vec()),
            }
        })
        .collect()
}

/// Run the modules command
pub async fn run(format: OutputFormat, _verbose: bool) -> Result<()> {
    let registry = builtin_registry().map_err(report)?;
    let modules = describe(&registry);

    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&modules)
                .map_err(|e| miette::miette!("Failed to serialize module list: {}", e))?;
            println!("{}", json);
        }
        OutputFormat::Text => {
            println!("{}", "Registered modules:".bold());
            for info in &modules {
                match (&info.consumes, &info.produces) {
                    (Some(consumes), Some(produces)) => println!(
                        "  {} {}",
                        info.id.cyan(),
                        format!("[{}] → [{}]", consumes.join(", "), produces.join(", ")).dimmed()
                    ),
                    _ => println!("  {} {}", info.id.cyan(), "(requires settings)".dimmed()),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_builtins() {
        let registry = builtin_registry().unwrap();
        let modules = describe(&registry);

        let ids: Vec<&str> = modules.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(
            ids,
            vec!["constant", "file_reader", "regex_extractor", "shell", "summarizer", "text_stats"]
        );

        let summarizer = &modules[4];
        assert_eq!(summarizer.consumes, Some(vec!["raw_text".to_string()]));
        assert_eq!(summarizer.produces, Some(vec!["summary".to_string()]));

        // constant needs a value
        assert!(modules[0].produces.is_none());
    }
}
