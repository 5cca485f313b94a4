//! Drives one release from trigger to publication.
//!
//! The stages run strictly in order and the first failure is terminal:
//! nothing downstream of a failed stage executes, and in particular no
//! publisher is invoked unless every build succeeded and every checksum
//! verified.

use super::stage::{PipelineFailure, PipelineStage, StageObserver};
use crate::artifact::{ArtifactAggregator, ChecksumVerifier, ReleaseManifest};
use crate::build::{BuildCoordinator, BuildRequest, BuildTarget, PlatformBuilder, SigningCredentials};
use crate::error::{AggregateError, PublishError, ReleaseError};
use crate::publish::{ChannelPublishers, PublishReceipt, Publisher};
use crate::version::{ResolvedRelease, TriggerContext, VersionResolver};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Subdirectory of the work dir builders write into
const BUILD_DIR: &str = "build";
/// Subdirectory of the work dir holding the flat release set
const STAGING_DIR: &str = "staging";

/// Static inputs of a pipeline run.
#[derive(Clone, Debug)]
pub struct PipelineSettings {
    /// Product name used in artifact names
    pub product: String,
    /// Version declared by the project
    pub declared_version: String,
    /// Scratch directory for build outputs and staging
    pub work_dir: PathBuf,
    /// Wall-clock ceiling per platform builder
    pub build_timeout: Duration,
    /// Platforms to build, with their architectures
    pub targets: Vec<BuildTarget>,
}

/// Everything a successful run produced.
#[derive(Debug)]
pub struct ReleaseReport {
    /// Outcome of trigger classification
    pub release: ResolvedRelease,
    /// Verified release set
    pub manifest: ReleaseManifest,
    /// What the publisher did
    pub receipt: PublishReceipt,
    /// Stages that completed, in order
    pub stages: Vec<PipelineStage>,
}

/// Release pipeline over a platform builder and the channel publishers.
pub struct ReleaseOrchestrator<B, N, R> {
    settings: PipelineSettings,
    resolver: VersionResolver,
    coordinator: BuildCoordinator<B>,
    credentials: Arc<SigningCredentials>,
    aggregator: ArtifactAggregator,
    publishers: ChannelPublishers<N, R>,
}

impl<B, N, R> ReleaseOrchestrator<B, N, R>
where
    B: PlatformBuilder,
    N: Publisher,
    R: Publisher,
{
    /// Create an orchestrator
    pub fn new(
        settings: PipelineSettings,
        resolver: VersionResolver,
        builder: B,
        credentials: SigningCredentials,
        publishers: ChannelPublishers<N, R>,
    ) -> Self {
        let coordinator = BuildCoordinator::new(builder, settings.build_timeout);
        Self {
            settings,
            resolver,
            coordinator,
            credentials: Arc::new(credentials),
            aggregator: ArtifactAggregator::new(),
            publishers,
        }
    }

    /// Directory builders write into
    pub fn build_dir(&self) -> PathBuf {
        self.settings.work_dir.join(BUILD_DIR)
    }

    /// Directory holding the flat release set
    pub fn staging_dir(&self) -> PathBuf {
        self.settings.work_dir.join(STAGING_DIR)
    }

    /// Run the pipeline for one trigger.
    ///
    /// `now` fixes the nightly timestamp. The publisher of the resolved
    /// channel is invoked at most once, and only after every artifact
    /// verified against `SHA256SUMS.txt`.
    pub async fn run(
        &self,
        trigger: &TriggerContext,
        now: DateTime<Utc>,
        observer: &dyn StageObserver,
    ) -> Result<ReleaseReport, PipelineFailure> {
        let mut completed = Vec::with_capacity(5);

        // ===== RESOLVING =====
        let mut stage = PipelineStage::Resolving;
        observer.stage_started(stage);
        let release = self
            .resolver
            .resolve(trigger, &self.settings.declared_version, now)
            .map_err(|e| self.fail(stage, e, observer))?;
        if !self.publishers.supports(release.channel) {
            return Err(self.fail(
                stage,
                PublishError::PreconditionFailed {
                    reason: format!("no publisher configured for the {} channel", release.channel),
                },
                observer,
            ));
        }
        log::info!(
            "Resolved {} release {} from {}",
            release.channel,
            release.version,
            release.source_ref
        );
        observer.release_resolved(&release);
        stage = self.advance(stage, &mut completed, observer);

        // ===== BUILDING =====
        let build_dir = self.build_dir();
        reset_dir(&build_dir)
            .await
            .map_err(|e| self.fail(stage, ReleaseError::Io(e), observer))?;

        let request = BuildRequest {
            product: self.settings.product.clone(),
            version: release.version.clone(),
            channel: release.channel,
            source_ref: release.source_ref.clone(),
            output_dir: build_dir,
            credentials: Arc::clone(&self.credentials),
        };
        let report = self
            .coordinator
            .run(&self.settings.targets, &request)
            .await
            .map_err(|e| self.fail(stage, e, observer))?;
        observer.builds_finished(&report);
        stage = self.advance(stage, &mut completed, observer);

        // ===== AGGREGATING =====
        let staging = self.staging_dir();
        reset_dir(&staging).await.map_err(|e| {
            self.fail(
                stage,
                AggregateError::Fs {
                    context: "reset staging directory",
                    path: staging.clone(),
                    source: e,
                },
                observer,
            )
        })?;
        let staged = self
            .aggregator
            .collect(&report.artifacts_by_platform(), &staging)
            .await
            .map_err(|e| self.fail(stage, e, observer))?;
        stage = self.advance(stage, &mut completed, observer);

        // ===== VERIFYING =====
        let verifier = ChecksumVerifier::new(&staging);
        verifier
            .compute(&staged)
            .await
            .map_err(|e| self.fail(stage, e, observer))?;
        observer.checksums_recorded(&verifier.manifest_path());
        let checksums = verifier
            .verify(&staged)
            .await
            .map_err(|e| self.fail(stage, e, observer))?;

        let manifest = ReleaseManifest::new(
            release.version.clone(),
            release.channel,
            release.source_ref.clone(),
            staged,
            checksums,
            verifier.manifest_path(),
        );
        manifest
            .ensure_publishable()
            .map_err(|e| self.fail(stage, e, observer))?;
        stage = self.advance(stage, &mut completed, observer);

        // ===== PUBLISHING =====
        let receipt = self
            .publishers
            .publish(&manifest, &staging)
            .await
            .map_err(|e| self.fail(stage, e, observer))?;
        observer.published(&receipt);
        self.advance(stage, &mut completed, observer);

        Ok(ReleaseReport {
            release,
            manifest,
            receipt,
            stages: completed,
        })
    }

    fn advance(
        &self,
        stage: PipelineStage,
        completed: &mut Vec<PipelineStage>,
        observer: &dyn StageObserver,
    ) -> PipelineStage {
        observer.stage_completed(stage);
        completed.push(stage);
        let next = stage.next().unwrap_or(PipelineStage::Done);
        observer.stage_started(next);
        next
    }

    fn fail(
        &self,
        stage: PipelineStage,
        cause: impl Into<ReleaseError>,
        observer: &dyn StageObserver,
    ) -> PipelineFailure {
        let failure = PipelineFailure::new(stage, cause);
        log::error!("{}", failure);
        observer.stage_failed(&failure);
        failure
    }
}

/// Remove `dir` if present and recreate it empty.
async fn reset_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(dir).await
}
