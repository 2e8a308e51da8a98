// src/cli/ui.rs
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Create a task-counting spinner; totals are unknown up front because
/// optimisers produce locations lazily.
pub fn create_task_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {pos} task(s) finished {msg}")
            .unwrap(),
    );
    pb
}
