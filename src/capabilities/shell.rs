// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Shell module
//!
//! Runs a shell command, optionally feeding an input value on stdin,
//! and stores its standard output.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{parse_settings, InputDecl, Inputs, Module, Outputs, Settings};

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ShellSettings {
    command: String,
    shell: String,
    input: Option<String>,
    output: Option<String>,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    trim: bool,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            command: String::new(),
            shell: "bash".to_string(),
            input: None,
            output: None,
            env: HashMap::new(),
            working_dir: None,
            trim: true,
        }
    }
}

/// Shell command module
#[derive(Debug, Clone)]
pub struct ShellModule {
    command: String,
    shell: PathBuf,
    env: HashMap<String, String>,
    working_dir: Option<PathBuf>,
    trim: bool,
    consumes: Vec<InputDecl>,
    produces: Vec<String>,
}

impl ShellModule {
    pub const ID: &'static str = "shell";

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let settings: ShellSettings = parse_settings(settings)?;

        if settings.command.trim().is_empty() {
            anyhow::bail!("shell command is empty");
        }

        let shell = which::which(&settings.shell)
            .map_err(|_| anyhow::anyhow!("shell '{}' not found in PATH", settings.shell))?;

        Ok(Self {
            command: settings.command,
            shell,
            env: settings.env,
            working_dir: settings.working_dir,
            trim: settings.trim,
            consumes: settings.input.into_iter().map(InputDecl::optional).collect(),
            produces: vec![settings.output.unwrap_or_else(|| "stdout".to_string())],
        })
    }

    /// Text to write on stdin, if the input key carries a value
    fn stdin_payload(&self, inputs: &Inputs) -> Option<String> {
        let key = &self.consumes.first()?.key;
        inputs.get(key).map(|value| match value.as_str() {
            Some(s) => s.to_string(),
            None => value.to_string(),
        })
    }
}

#[async_trait]
impl Module for ShellModule {
    fn consumes(&self) -> &[InputDecl] {
        &self.consumes
    }

    fn produces(&self) -> &[String] {
        &self.produces
    }

    async fn execute(&self, inputs: Inputs) -> anyhow::Result<Outputs> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&self.command);
        cmd.envs(&self.env);
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to start '{}': {}", self.shell.display(), e))?;

        // Feed stdin concurrently with draining stdout; dropping the handle closes it
        let writer = match (child.stdin.take(), self.stdin_payload(&inputs)) {
            (Some(mut stdin), Some(payload)) => Some(tokio::spawn(async move {
                stdin.write_all(payload.as_bytes()).await
            })),
            _ => None,
        };

        let output = child.wait_with_output().await?;

        if let Some(writer) = writer {
            match writer.await? {
                // The command exited without reading all of its input
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                other => other?,
            }
        }
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "command exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            );
        }

        let stdout = if self.trim {
            stdout.trim_end().to_string()
        } else {
            stdout
        };

        Ok(Outputs::single(self.produces[0].clone(), stdout))
    }
}
