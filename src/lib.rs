//! # Kodegen Release Pipeline
//!
//! Release-build orchestration for installers on Windows, macOS and Linux.
//!
//! One run classifies its trigger, builds every platform concurrently, stages
//! the artifacts in one flat directory, records and re-verifies their SHA-256
//! digests, and only then publishes:
//!
//! - **Nightly** runs (manual dispatch or schedule) mirror the release set to
//!   the nightly host, deleting files a previous nightly left behind.
//! - **Stable** runs (push to the stable branch) create a draft release tagged
//!   `v<version>` with every installer and `SHA256SUMS.txt` attached.
//!
//! Publication is all-or-nothing: a single failed build or checksum stops the
//! run before any publisher is invoked.
//!
//! ## Usage
//!
//! ```bash
//! kodegen_release_pipeline plan --trigger schedule
//! kodegen_release_pipeline run --trigger push --ref refs/heads/stable
//! kodegen_release_pipeline verify target/release-pipeline/staging
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Core modules
pub mod artifact;
pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod github;
pub mod pipeline;
pub mod publish;
pub mod version;

// Re-export main types for public API
pub use artifact::{ArtifactAggregator, ArtifactRef, ChecksumEntry, ChecksumVerifier, ReleaseManifest};
pub use build::{BuildCoordinator, BuildJob, BuildTarget, CommandBuilder, PlatformBuilder};
pub use cli::Args;
pub use config::{EnvConfig, PipelineConfig};
pub use error::{ReleaseError, Result};
pub use pipeline::{PipelineFailure, PipelineStage, ReleaseOrchestrator, StageObserver};
pub use publish::{ChannelPublishers, NightlyPublisher, PublishReceipt, Publisher, ReleasePublisher};
pub use version::{ReleaseChannel, ResolvedRelease, TriggerContext, VersionResolver};
