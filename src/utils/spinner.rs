// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! Progress spinner utilities

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use super::colors::stderr_is_term;

/// Create a spinner for indeterminate progress
///
/// The spinner draws on stderr and stays hidden when `visible` is false or
/// stderr is not a terminal, so piped output is never interleaved with it.
pub fn create_spinner(message: &str, visible: bool) -> ProgressBar {
    if !visible || !stderr_is_term() {
        return ProgressBar::hidden();
    }

    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner:.blue} {msg} {elapsed:.dim}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());

    let pb = ProgressBar::new_spinner();
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}
