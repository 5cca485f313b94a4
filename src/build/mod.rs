//! Platform builds: targets, naming, signing, builders and the coordinator.

mod builder;
mod coordinator;
mod naming;
mod signing;
mod target;
mod template;

pub use builder::{BuildRequest, CommandBuilder, PlatformBuilder, ToolchainCommands};
pub use coordinator::{BuildCoordinator, BuildJob, BuildReport, JobStatus};
pub use naming::{NamingRule, NamingTable};
pub use signing::{CredentialState, PlatformCredentials, SigningCredentials};
pub use target::{Arch, BuildStep, BuildTarget, Platform};
pub use template::{check as check_template, COMMAND_KEYS, NAME_KEYS};
