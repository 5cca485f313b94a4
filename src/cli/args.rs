//! Command line argument parsing and validation.

use crate::config::{DEFAULT_CONFIG_FILE, PipelineConfig};
use crate::error::VersionError;
use crate::version::{ReleaseChannel, TriggerContext, TriggerKind};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Release-build orchestrator
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_release_pipeline",
    version,
    about = "Build, verify and publish signed installers for every platform",
    long_about = "Build signed installers for Windows, macOS and Linux, verify their checksums,
then publish them as a nightly mirror or a draft stable release.

Usage:
  kodegen_release_pipeline plan --trigger schedule
  kodegen_release_pipeline run --trigger push --ref refs/heads/stable
  kodegen_release_pipeline verify target/release-pipeline/staging

The trigger is read from GITHUB_EVENT_NAME, GITHUB_REF and RELEASE_CHANNEL
when the flags are omitted."
)]
pub struct Args {
    /// Command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Pipeline configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Show debug-level progress
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve the trigger, build every platform, verify and publish
    Run {
        /// Trigger that started this run
        #[command(flatten)]
        trigger: TriggerArgs,

        /// Settings overriding release.toml
        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Show what a run would build and where it would publish, without side effects
    Plan {
        /// Trigger to plan for
        #[command(flatten)]
        trigger: TriggerArgs,

        /// Settings overriding release.toml
        #[command(flatten)]
        overrides: OverrideArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Re-verify a directory against its SHA256SUMS.txt
    Verify {
        /// Directory holding the artifacts and SHA256SUMS.txt
        #[arg(value_name = "DIR")]
        dir: PathBuf,
    },
}

impl Command {
    /// Command name for messages
    pub fn name(&self) -> &'static str {
        match self {
            Command::Run { .. } => "run",
            Command::Plan { .. } => "plan",
            Command::Verify { .. } => "verify",
        }
    }
}

/// Trigger description, with CI environment fallback.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct TriggerArgs {
    /// Trigger kind: push, manual (workflow_dispatch) or scheduled (schedule)
    #[arg(long, env = "GITHUB_EVENT_NAME", value_name = "KIND")]
    pub trigger: Option<String>,

    /// Pushed branch or ref (`stable` or `refs/heads/stable`)
    #[arg(long = "ref", env = "GITHUB_REF", value_name = "REF")]
    pub git_ref: Option<String>,

    /// Requested channel: stable or nightly
    #[arg(long, env = "RELEASE_CHANNEL", value_name = "CHANNEL")]
    pub channel: Option<String>,
}

impl TriggerArgs {
    /// Build the trigger context.
    ///
    /// An unknown kind yields a context without a kind, which the resolver
    /// rejects as unrecognized. An unknown channel hint is rejected here.
    pub fn to_context(&self) -> Result<TriggerContext, VersionError> {
        let kind = match self.trigger.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => match raw.parse::<TriggerKind>() {
                Ok(kind) => Some(kind),
                Err(reason) => {
                    log::warn!("Ignoring trigger: {}", reason);
                    None
                }
            },
            None => None,
        };

        let channel_hint = self
            .channel
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|raw| raw.parse::<ReleaseChannel>())
            .transpose()
            .map_err(|reason| VersionError::UnrecognizedTrigger { reason })?;

        Ok(TriggerContext {
            kind,
            git_ref: self
                .git_ref
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            channel_hint,
        })
    }
}

/// Per-invocation overrides of `release.toml`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Declared version to release instead of the configured one
    #[arg(long, value_name = "SEMVER")]
    pub declared_version: Option<String>,

    /// Working directory for build outputs and staging
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Wall-clock ceiling per platform build, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,
}

impl OverrideArgs {
    /// Apply the overrides and re-validate.
    pub fn apply(&self, config: &mut PipelineConfig) -> crate::error::Result<()> {
        if let Some(version) = &self.declared_version {
            config.version = version.clone();
        }
        if let Some(dir) = &self.work_dir {
            config.work_dir = dir.clone();
        }
        if let Some(secs) = self.timeout_secs {
            config.build_timeout_secs = secs;
        }
        config.validate()?;
        Ok(())
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Configuration derived from command line arguments
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
}

impl RuntimeConfig {
    /// Create runtime configuration
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            output: super::OutputManager::new(verbose, quiet),
        }
    }

    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    /// Print message
    pub fn println(&self, message: &str) {
        let _ = self.output.println(message);
    }

    /// Print message only in verbose mode
    pub fn verbose_println(&self, message: &str) {
        let _ = self.output.verbose(message);
    }

    /// Print error message (always shown)
    pub fn error_println(&self, message: &str) {
        self.output.error(message);
    }

    /// Print warning message
    pub fn warning_println(&self, message: &str) {
        let _ = self.output.warn(message);
    }

    /// Print success message
    pub fn success_println(&self, message: &str) {
        let _ = self.output.success(message);
    }

    /// Print indented text
    pub fn indent(&self, message: &str) {
        let _ = self.output.indent(message);
    }
}

impl From<&Args> for RuntimeConfig {
    fn from(args: &Args) -> Self {
        Self::new(args.verbose, args.quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_parses_trigger_and_overrides() {
        let args = Args::try_parse_from([
            "kodegen_release_pipeline",
            "run",
            "--trigger",
            "push",
            "--ref",
            "refs/heads/stable",
            "--declared-version",
            "2.3.0",
            "--timeout-secs",
            "60",
        ])
        .unwrap();

        match args.command {
            Command::Run { trigger, overrides } => {
                assert_eq!(trigger.trigger.as_deref(), Some("push"));
                assert_eq!(trigger.git_ref.as_deref(), Some("refs/heads/stable"));
                assert_eq!(overrides.declared_version.as_deref(), Some("2.3.0"));
                assert_eq!(overrides.timeout_secs, Some(60));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(args.config, PathBuf::from("release.toml"));
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        let result = Args::try_parse_from(["kodegen_release_pipeline", "-v", "-q", "verify", "dist"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_trigger_context_accepts_ci_event_names() {
        let args = TriggerArgs {
            trigger: Some("workflow_dispatch".to_string()),
            git_ref: Some(" ".to_string()),
            channel: Some("nightly".to_string()),
        };
        let ctx = args.to_context().unwrap();
        assert_eq!(ctx.kind, Some(TriggerKind::Manual));
        assert_eq!(ctx.git_ref, None);
        assert_eq!(ctx.channel_hint, Some(ReleaseChannel::Nightly));
    }

    #[test]
    fn test_unknown_trigger_kind_leaves_context_unrecognized() {
        let args = TriggerArgs {
            trigger: Some("pull_request".to_string()),
            ..Default::default()
        };
        assert_eq!(args.to_context().unwrap().kind, None);
    }

    #[test]
    fn test_unknown_channel_hint_is_rejected() {
        let args = TriggerArgs {
            trigger: Some("manual".to_string()),
            channel: Some("beta".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            args.to_context(),
            Err(VersionError::UnrecognizedTrigger { .. })
        ));
    }
}
