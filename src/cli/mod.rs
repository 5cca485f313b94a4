//! Command line interface for the release pipeline.
//!
//! `run` executes the pipeline, `plan` previews it and `verify` re-checks a
//! staged release directory.

mod args;
pub mod commands;
mod observer;
mod output;

pub use args::{Args, Command, OverrideArgs, RuntimeConfig, TriggerArgs};
pub use commands::execute_command;
pub use observer::ConsoleObserver;
pub use output::OutputManager;

use crate::error::Result;

/// Main CLI entry point
pub async fn run() -> Result<i32> {
    let args = Args::parse_args();
    execute_command(args).await
}
