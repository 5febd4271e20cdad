//! Command handlers for the cairn CLI.

pub mod ui;

mod args;
mod context;
mod install;
mod plan;
mod uninstall;

pub use args::{InstallArgs, UninstallArgs, UninstallUnusedArgs};
pub use context::Context;
pub use install::install;
pub use uninstall::{uninstall, uninstall_unused};
