//! Progress indicators for nocodeploy.
//!
//! Adapters from the library callback traits to `indicatif` bars and
//! spinners. Quiet and JSON runs get hidden bars.

use colored::Colorize;
use declarative::{ApplyResult, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};
use menus::{Phase, PhaseCallback};
use std::time::Duration;

/// Create a progress bar
pub fn bar(len: u64, msg: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_message(msg.to_string());
    pb
}

/// Create a spinner
pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Clear the bar from the terminal
pub fn finish_clear(pb: &ProgressBar) {
    pb.finish_and_clear();
}

// ============================================================================
// Deploy
// ============================================================================

/// Per-plugin bar for the deploy loop
pub struct DeployProgress {
    enabled: bool,
    bar: Option<ProgressBar>,
}

impl DeployProgress {
    pub fn new(enabled: bool) -> Self {
        Self { enabled, bar: None }
    }

    fn println(&self, line: String) {
        match &self.bar {
            Some(pb) => pb.println(line),
            None if self.enabled => println!("{line}"),
            None => {}
        }
    }
}

impl ProgressCallback for DeployProgress {
    fn on_batch_start(&mut self, count: usize) {
        if self.enabled {
            self.bar = Some(bar(count as u64, "Deploying"));
        }
    }

    fn on_resource_start(&mut self, id: &str, _description: &str) {
        if let Some(pb) = &self.bar {
            pb.set_message(id.to_string());
        }
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        let symbol = match result {
            ApplyResult::NoChange => result.symbol().dimmed(),
            ApplyResult::Failed { .. } => result.symbol().red(),
            ApplyResult::Skipped { .. } => result.symbol().yellow(),
            _ => result.symbol().green(),
        };
        let detail = match result {
            ApplyResult::NoChange => "unchanged".to_string(),
            ApplyResult::Created => "created".to_string(),
            ApplyResult::Modified => "updated".to_string(),
            ApplyResult::Removed => "removed".to_string(),
            ApplyResult::Failed { error } => error.clone(),
            ApplyResult::Skipped { reason } => reason.clone(),
        };
        self.println(format!("  {symbol} {id:<30} {}", detail.dimmed()));
        if let Some(pb) = &self.bar {
            pb.inc(1);
        }
    }

    fn on_post_action(&mut self, description: &str) {
        self.println(format!("  {} {description}", "→".cyan()));
    }

    fn on_batch_complete(&mut self) {
        if let Some(pb) = self.bar.take() {
            finish_clear(&pb);
        }
    }
}

// ============================================================================
// Menus
// ============================================================================

/// Prints one line per completed reconciliation phase
pub struct PhaseProgress {
    enabled: bool,
}

impl PhaseProgress {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl PhaseCallback for PhaseProgress {
    fn on_phase(&self, phase: Phase, detail: &str) {
        if self.enabled {
            println!(
                "  {} {:<14} {}",
                "✓".green(),
                phase.to_string(),
                detail.dimmed()
            );
        }
    }
}
