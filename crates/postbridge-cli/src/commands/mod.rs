//! Subcommand implementations. Each prints a human-readable report on stdout
//! and returns an error for a non-zero exit.

pub mod cleanup;
pub mod migrate;
pub mod phase;
pub mod seed;
pub mod status;
pub mod verify;

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

pub(crate) const RULE_WIDTH: usize = 60;

pub(crate) fn banner(title: &str) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    format!("{rule}\n{title}\n{rule}")
}

pub(crate) fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub(crate) fn count_cell(count: Option<u64>) -> String {
    count.map_or_else(|| "-".to_string(), |n| n.to_string())
}
