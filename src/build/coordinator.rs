//! Concurrent execution of the platform builders.
//!
//! Every target gets its own task. The coordinator waits for all of them,
//! even after a failure, so no packaging or notarization process is left
//! orphaned, and then reports every failure at once.

use super::builder::{BuildRequest, PlatformBuilder};
use super::target::{BuildTarget, Platform};
use crate::artifact::ArtifactRef;
use crate::error::{BuildError, CoordinatorError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a build job
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum JobStatus {
    /// Created, not started
    Pending,
    /// Builder running
    Running,
    /// All architectures built
    Succeeded,
    /// Builder failed or timed out
    Failed,
}

/// One build job per target
#[derive(Clone, Debug)]
pub struct BuildJob {
    target: BuildTarget,
    status: JobStatus,
    produced_artifacts: Vec<ArtifactRef>,
    error: Option<BuildError>,
}

impl BuildJob {
    /// New pending job
    pub fn new(target: BuildTarget) -> Self {
        Self {
            target,
            status: JobStatus::Pending,
            produced_artifacts: Vec::new(),
            error: None,
        }
    }

    fn start(&mut self) {
        debug_assert_eq!(self.status, JobStatus::Pending);
        self.status = JobStatus::Running;
    }

    fn succeed(&mut self, artifacts: Vec<ArtifactRef>) {
        debug_assert_eq!(self.status, JobStatus::Running);
        self.status = JobStatus::Succeeded;
        self.produced_artifacts = artifacts;
    }

    fn fail(&mut self, error: BuildError) {
        debug_assert!(!self.is_terminal());
        self.status = JobStatus::Failed;
        self.error = Some(error);
    }

    /// Target built by this job
    pub fn target(&self) -> &BuildTarget {
        &self.target
    }

    /// Current status
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Artifacts, in architecture order; empty unless succeeded
    pub fn produced_artifacts(&self) -> &[ArtifactRef] {
        &self.produced_artifacts
    }

    /// Failure cause, if failed
    pub fn error(&self) -> Option<&BuildError> {
        self.error.as_ref()
    }

    /// Whether the job can no longer change
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Jobs of a fully successful build stage
#[derive(Clone, Debug)]
pub struct BuildReport {
    jobs: Vec<BuildJob>,
}

impl BuildReport {
    /// Jobs ordered by platform
    pub fn jobs(&self) -> &[BuildJob] {
        &self.jobs
    }

    /// Artifacts keyed by the platform that produced them.
    ///
    /// Jobs sharing a platform contribute to the same entry, in job order.
    pub fn artifacts_by_platform(&self) -> BTreeMap<Platform, Vec<ArtifactRef>> {
        let mut by_platform: BTreeMap<Platform, Vec<ArtifactRef>> = BTreeMap::new();
        for job in &self.jobs {
            by_platform
                .entry(job.target.platform())
                .or_default()
                .extend(job.produced_artifacts.iter().cloned());
        }
        by_platform
    }

    /// Total number of artifacts
    pub fn artifact_count(&self) -> usize {
        self.jobs.iter().map(|j| j.produced_artifacts.len()).sum()
    }
}

/// Runs every platform builder concurrently behind a full barrier.
pub struct BuildCoordinator<B> {
    builder: Arc<B>,
    timeout: Duration,
}

impl<B: PlatformBuilder> BuildCoordinator<B> {
    /// Create a coordinator with a wall-clock ceiling per builder.
    pub fn new(builder: B, timeout: Duration) -> Self {
        Self {
            builder: Arc::new(builder),
            timeout,
        }
    }

    /// Per-builder wall-clock ceiling
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build every target; succeeds only if every job succeeds.
    pub async fn run(
        &self,
        targets: &[BuildTarget],
        request: &BuildRequest,
    ) -> Result<BuildReport, CoordinatorError> {
        let mut handles = Vec::with_capacity(targets.len());

        for target in targets {
            let builder = Arc::clone(&self.builder);
            let request = request.clone();
            let timeout = self.timeout;
            let task_target = target.clone();
            let platform = target.platform();

            log::info!("Launching {} build", target);
            let handle = tokio::spawn(async move {
                let mut job = BuildJob::new(task_target.clone());
                job.start();
                match tokio::time::timeout(timeout, builder.build(task_target, request)).await {
                    Ok(Ok(artifacts)) => job.succeed(artifacts),
                    Ok(Err(err)) => job.fail(err),
                    Err(_elapsed) => job.fail(BuildError::Timeout {
                        platform,
                        timeout_secs: timeout.as_secs(),
                    }),
                }
                job
            });
            handles.push((target.clone(), handle));
        }

        // Barrier: every handle is awaited regardless of earlier failures
        let mut jobs = Vec::with_capacity(handles.len());
        for (target, handle) in handles {
            let job = match handle.await {
                Ok(job) => job,
                Err(join_err) => {
                    let mut job = BuildJob::new(target.clone());
                    job.fail(BuildError::Aborted {
                        platform: target.platform(),
                        reason: join_err.to_string(),
                    });
                    job
                }
            };
            match job.status {
                JobStatus::Succeeded => log::info!(
                    "{} build succeeded ({} artifact(s))",
                    job.target.platform(),
                    job.produced_artifacts.len()
                ),
                _ => log::error!(
                    "{} build failed: {}",
                    job.target.platform(),
                    job.error.as_ref().map(ToString::to_string).unwrap_or_default()
                ),
            }
            jobs.push(job);
        }

        jobs.sort_by_key(|j| j.target.platform());

        let failures: Vec<BuildError> = jobs.iter().filter_map(|j| j.error.clone()).collect();
        if !failures.is_empty() {
            return Err(CoordinatorError {
                failures,
                total: jobs.len(),
            });
        }

        Ok(BuildReport { jobs })
    }
}
