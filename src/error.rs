//! Error types for release pipeline operations.
//!
//! Every stage of the pipeline reports failures through one of the enums in
//! this module. They are unified under [`ReleaseError`], which also carries
//! actionable recovery suggestions for the operator.

use crate::build::{Arch, BuildStep, Platform};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for release pipeline operations
pub type Result<T> = std::result::Result<T, ReleaseError>;

/// Main error type for all release pipeline operations
#[derive(Error, Debug)]
pub enum ReleaseError {
    /// Pipeline configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Trigger classification and version errors
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    /// One or more platform builds failed
    #[error("Build coordination error: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// Artifact aggregation errors
    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    /// Checksum computation or verification errors
    #[error("Checksum error: {0}")]
    Checksum(#[from] ChecksumError),

    /// Publishing errors
    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file does not exist
    #[error("Configuration file not found at {path}")]
    NotFound {
        /// Path that was searched
        path: PathBuf,
    },

    /// Configuration file could not be parsed
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// Path of the file
        path: PathBuf,
        /// TOML parse error
        #[source]
        source: toml::de::Error,
    },

    /// Configuration is syntactically valid but semantically wrong
    #[error("Invalid configuration: {reason}")]
    Invalid {
        /// Reason for the error
        reason: String,
    },

    /// A required secret is not present in the environment
    #[error("Required secret '{name}' is not set in the environment")]
    MissingSecret {
        /// Environment variable name
        name: String,
    },
}

/// Trigger classification and version errors
#[derive(Error, Debug)]
pub enum VersionError {
    /// Declared version is not valid semver
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion {
        /// Version string
        version: String,
        /// Reason for the error
        reason: String,
    },

    /// Trigger context does not describe a release
    #[error("Unrecognized trigger context: {reason}")]
    UnrecognizedTrigger {
        /// Reason for the error
        reason: String,
    },

    /// Channel hint contradicts the trigger kind
    #[error("Trigger '{kind}' cannot produce a '{hint}' release")]
    ChannelHintConflict {
        /// Trigger kind
        kind: String,
        /// Requested channel
        hint: String,
    },
}

/// Failure of a single platform build
#[derive(Error, Debug, Clone)]
pub enum BuildError {
    /// Packaging or signing toolchain exited unsuccessfully or could not start
    #[error("{platform} {arch}: {step} step failed: {reason}")]
    Toolchain {
        /// Target platform
        platform: Platform,
        /// Architecture being built
        arch: Arch,
        /// Step that failed
        step: BuildStep,
        /// Reason for the error
        reason: String,
    },

    /// Signing credentials are present but incomplete or empty
    #[error("{platform} {arch}: invalid signing credentials: {reason}")]
    InvalidCredentials {
        /// Target platform
        platform: Platform,
        /// Architecture being built
        arch: Arch,
        /// Reason for the error
        reason: String,
    },

    /// Toolchain reported success but the expected file is absent
    #[error("{platform} {arch}: {step} step produced no file at {}", .path.display())]
    ArtifactMissing {
        /// Target platform
        platform: Platform,
        /// Architecture being built
        arch: Arch,
        /// Step after which the file was expected
        step: BuildStep,
        /// Expected path
        path: PathBuf,
    },

    /// Builder exceeded the wall-clock ceiling
    #[error("{platform}: build exceeded the {timeout_secs}s time limit")]
    Timeout {
        /// Target platform
        platform: Platform,
        /// Configured ceiling in seconds
        timeout_secs: u64,
    },

    /// Builder task panicked or was torn down
    #[error("{platform}: builder task aborted: {reason}")]
    Aborted {
        /// Target platform
        platform: Platform,
        /// Reason for the error
        reason: String,
    },
}

impl BuildError {
    /// Platform whose build produced this error
    pub fn platform(&self) -> Platform {
        match self {
            BuildError::Toolchain { platform, .. }
            | BuildError::InvalidCredentials { platform, .. }
            | BuildError::ArtifactMissing { platform, .. }
            | BuildError::Timeout { platform, .. }
            | BuildError::Aborted { platform, .. } => *platform,
        }
    }

    /// Architecture being built when the error occurred, if known
    pub fn arch(&self) -> Option<Arch> {
        match self {
            BuildError::Toolchain { arch, .. }
            | BuildError::InvalidCredentials { arch, .. }
            | BuildError::ArtifactMissing { arch, .. } => Some(*arch),
            BuildError::Timeout { .. } | BuildError::Aborted { .. } => None,
        }
    }
}

/// Aggregate of every build failure from one coordinator run
#[derive(Debug)]
pub struct CoordinatorError {
    /// Individual failures, ordered by platform
    pub failures: Vec<BuildError>,
    /// Number of targets that were launched
    pub total: usize,
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} build target(s) failed",
            self.failures.len(),
            self.total
        )?;
        for failure in &self.failures {
            write!(f, "\n  - {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for CoordinatorError {}

/// Artifact aggregation errors
#[derive(Error, Debug)]
pub enum AggregateError {
    /// Two artifacts resolve to the same canonical file name
    #[error(
        "Artifact name collision on '{file_name}': {} and {}",
        .first.display(),
        .second.display()
    )]
    NameCollision {
        /// Colliding file name
        file_name: String,
        /// First artifact claiming the name
        first: PathBuf,
        /// Second artifact claiming the name
        second: PathBuf,
    },

    /// Staging directory already contains a file with this name
    #[error("Refusing to overwrite existing staged file {}", .path.display())]
    AlreadyStaged {
        /// Path of the existing file
        path: PathBuf,
    },

    /// Built artifact disappeared before it could be staged
    #[error("Artifact source {} does not exist", .path.display())]
    SourceMissing {
        /// Missing path
        path: PathBuf,
    },

    /// Filesystem operation failed
    #[error("{context} {}: {source}", .path.display())]
    Fs {
        /// Operation being performed
        context: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Checksum computation or verification errors
#[derive(Error, Debug)]
pub enum ChecksumError {
    /// Recomputed digest does not match the recorded one
    #[error("Checksum mismatch for '{file_name}': recorded {expected}, recomputed {actual}")]
    Mismatch {
        /// Artifact file name
        file_name: String,
        /// Digest recorded in the manifest
        expected: String,
        /// Digest recomputed from disk
        actual: String,
    },

    /// Manifest entry has no corresponding file
    #[error("Checksum manifest lists '{file_name}' but the file is missing")]
    Missing {
        /// Artifact file name
        file_name: String,
    },

    /// Artifact has no manifest entry
    #[error("Artifact '{file_name}' has no entry in the checksum manifest")]
    Unlisted {
        /// Artifact file name
        file_name: String,
    },

    /// Manifest file contains an unparseable line
    #[error("Malformed checksum manifest line {line}: '{content}'")]
    Malformed {
        /// 1-based line number
        line: usize,
        /// Offending content
        content: String,
    },

    /// Reading or writing a file failed
    #[error("{context} {}: {source}", .path.display())]
    Io {
        /// Operation being performed
        context: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Publishing errors
#[derive(Error, Debug)]
pub enum PublishError {
    /// Manifest is not in a publishable state
    #[error("Refusing to publish: {reason}")]
    PreconditionFailed {
        /// Reason for the error
        reason: String,
    },

    /// Staging an auxiliary file failed
    #[error("Failed to stage auxiliary file {}: {source}", .path.display())]
    AuxiliaryFile {
        /// Auxiliary source path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Mirror transfer failed
    #[error("Transfer to {destination} failed: {reason}")]
    Transfer {
        /// Remote or local destination
        destination: String,
        /// Reason for the error
        reason: String,
    },

    /// Release host rejected the credentials
    #[error("Release host authentication failed: {reason}")]
    Authentication {
        /// Reason for the error
        reason: String,
    },

    /// Draft release could not be created
    #[error("Failed to create draft release {tag}: {reason}")]
    ReleaseCreation {
        /// Release tag
        tag: String,
        /// Reason for the error
        reason: String,
    },

    /// An asset upload failed
    #[error("Failed to upload '{file_name}': {reason}")]
    AssetUpload {
        /// Asset file name
        file_name: String,
        /// Reason for the error
        reason: String,
    },

    /// Release record could not be deleted
    #[error("Failed to delete release {id}: {reason}")]
    ReleaseDeletion {
        /// Host-side release identifier
        id: u64,
        /// Reason for the error
        reason: String,
    },

    /// Release notes are required by policy but none were supplied
    #[error("Release notes are required for stable releases but none were provided")]
    MissingReleaseNotes,
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Command execution failed
    #[error("Command execution failed: {command} - {reason}")]
    ExecutionFailed {
        /// Command that failed
        command: String,
        /// Reason for the error
        reason: String,
    },
}

impl ReleaseError {
    /// Get actionable recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ReleaseError::Config(ConfigError::NotFound { path }) => vec![
                format!("Create {} or pass --config <path>", path.display()),
            ],
            ReleaseError::Config(ConfigError::MissingSecret { name }) => vec![
                format!("Export {} in the pipeline environment", name),
                "Secrets are read from the environment only, never from release.toml".to_string(),
            ],
            ReleaseError::Version(VersionError::UnrecognizedTrigger { .. }) => vec![
                "Pass --trigger push|manual|scheduled (or set GITHUB_EVENT_NAME)".to_string(),
                "Stable releases require a push to the configured stable branch".to_string(),
            ],
            ReleaseError::Version(VersionError::ChannelHintConflict { .. }) => vec![
                "Stable releases are cut by pushing to the stable branch".to_string(),
            ],
            ReleaseError::Coordinator(err) => {
                let mut suggestions = Vec::new();
                for failure in &err.failures {
                    match failure {
                        BuildError::Timeout { platform, .. } => suggestions.push(format!(
                            "Raise build_timeout_secs or inspect the {} toolchain",
                            platform
                        )),
                        BuildError::InvalidCredentials { platform, .. } => {
                            suggestions.push(format!(
                                "Check every signing variable configured for {}",
                                platform
                            ));
                            suggestions.push(format!(
                                "Unset all of them to produce unsigned {} builds",
                                platform
                            ));
                        }
                        _ => {}
                    }
                }
                suggestions.dedup();
                suggestions.push("Fix the failing targets and start a fresh run".to_string());
                suggestions
            }
            ReleaseError::Publish(PublishError::ReleaseDeletion { id, .. }) => vec![
                format!("Delete draft release {} from the repository by hand", id),
            ],
            ReleaseError::Aggregate(AggregateError::NameCollision { .. }) => vec![
                "Review the [[naming]] rules: every (platform, arch) needs a distinct name".to_string(),
            ],
            ReleaseError::Checksum(ChecksumError::Mismatch { .. }) => vec![
                "Staged artifacts changed after hashing; check disk health and concurrent writers".to_string(),
                "Start a fresh run; nothing was published".to_string(),
            ],
            ReleaseError::Publish(PublishError::Authentication { .. }) => vec![
                "Ensure GH_TOKEN or GITHUB_TOKEN is set with contents:write scope".to_string(),
            ],
            ReleaseError::Publish(PublishError::MissingReleaseNotes) => vec![
                "Write release notes and set github.notes_file".to_string(),
                "Or set github.notes_policy = \"placeholder\"".to_string(),
            ],
            ReleaseError::Publish(PublishError::Transfer { .. }) => vec![
                "Verify host, user and private key of the [nightly] section".to_string(),
                "Check that rsync is installed on both ends".to_string(),
            ],
            _ => vec!["Check the error message above for specific details".to_string()],
        }
    }
}
