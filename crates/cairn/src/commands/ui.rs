//! Console output helpers for consistent CLI formatting.

use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Print a success message with green checkmark.
pub fn success(msg: impl std::fmt::Display) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Print an info/action message with blue arrow.
pub fn info(msg: impl std::fmt::Display) {
    println!("{} {}", style("→").blue().bold(), msg);
}

/// Print a warning message with yellow exclamation.
pub fn warn(msg: impl std::fmt::Display) {
    println!("{} {}", style("!").yellow().bold(), msg);
}

/// Print a failure message with red cross.
pub fn error(msg: impl std::fmt::Display) {
    println!("{} {}", style("✗").red().bold(), msg);
}

/// Print a dim hint message.
pub fn hint(msg: impl std::fmt::Display) {
    println!("{} {}", style("→").dim(), msg);
}

/// Style text as a package name (cyan).
pub fn pkg(name: impl std::fmt::Display) -> StyledObject<String> {
    style(name.to_string()).cyan()
}

/// Style text as dimmed/secondary.
pub fn dim(text: impl std::fmt::Display) -> StyledObject<String> {
    style(text.to_string()).dim()
}

/// Print a section header.
pub fn header(title: impl std::fmt::Display) {
    println!("{}", style(title.to_string()).bold().underlined());
    println!();
}

/// A spinner with a steady tick; hidden when `quiet`.
pub fn spinner(msg: impl Into<String>, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(msg.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// A job progress bar; hidden when `quiet`.
pub fn progress(len: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.blue} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .map(|s| s.progress_chars("=> "))
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar
}
