//! Command execution.
//!
//! Every command returns an exit code; failures are printed here together
//! with their recovery suggestions.

mod plan;
mod run;
mod verify;

use crate::cli::{Args, Command, RuntimeConfig};
use crate::error::{ReleaseError, Result};

use plan::execute_plan;
use run::execute_run;
use verify::execute_verify;

/// Execute the command selected by `args`
pub async fn execute_command(args: Args) -> Result<i32> {
    let config = RuntimeConfig::from(&args);

    let result = match &args.command {
        Command::Run { trigger, overrides } => execute_run(&args, trigger, overrides, &config).await,
        Command::Plan {
            trigger,
            overrides,
            json,
        } => execute_plan(&args, trigger, overrides, *json, &config),
        Command::Verify { dir } => execute_verify(dir, &config).await,
    };

    match result {
        Ok(exit_code) => Ok(exit_code),
        Err(e) => {
            config.error_println(&format!("Command '{}' failed: {}", args.command.name(), e));
            print_recovery_suggestions(&config, &e);
            Ok(1)
        }
    }
}

/// Print the operator hints attached to an error
pub(super) fn print_recovery_suggestions(config: &RuntimeConfig, error: &ReleaseError) {
    let suggestions = error.recovery_suggestions();
    if !suggestions.is_empty() {
        config.println("\n💡 Recovery suggestions:");
        for suggestion in suggestions {
            config.println(&format!("  • {}", suggestion));
        }
    }
}
