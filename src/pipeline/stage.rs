//! Pipeline states, failures and progress callbacks.

use crate::build::BuildReport;
use crate::error::ReleaseError;
use crate::publish::PublishReceipt;
use crate::version::ResolvedRelease;
use std::fmt;
use std::path::Path;

/// Linear pipeline states. No state is entered twice.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum PipelineStage {
    /// Classify the trigger
    Resolving,
    /// Run every platform builder
    Building,
    /// Stage all artifacts in one directory
    Aggregating,
    /// Compute and re-verify checksums
    Verifying,
    /// Hand the manifest to the channel's publisher
    Publishing,
    /// Everything succeeded
    Done,
}

impl PipelineStage {
    /// Stage following this one; `Done` is terminal.
    pub fn next(self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Resolving => Some(PipelineStage::Building),
            PipelineStage::Building => Some(PipelineStage::Aggregating),
            PipelineStage::Aggregating => Some(PipelineStage::Verifying),
            PipelineStage::Verifying => Some(PipelineStage::Publishing),
            PipelineStage::Publishing => Some(PipelineStage::Done),
            PipelineStage::Done => None,
        }
    }

    /// Display name
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Resolving => "Resolving",
            PipelineStage::Building => "Building",
            PipelineStage::Aggregating => "Aggregating",
            PipelineStage::Verifying => "Verifying",
            PipelineStage::Publishing => "Publishing",
            PipelineStage::Done => "Done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure: the stage that failed and why.
#[derive(Debug)]
pub struct PipelineFailure {
    /// Stage during which the failure happened
    pub stage: PipelineStage,
    /// Underlying error
    pub cause: ReleaseError,
}

impl PipelineFailure {
    /// Create a failure
    pub fn new(stage: PipelineStage, cause: impl Into<ReleaseError>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {}", self.stage, self.cause)
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

/// Progress callbacks; library code never prints.
///
/// Every method has an empty default.
pub trait StageObserver: Send + Sync {
    /// A stage was entered
    fn stage_started(&self, _stage: PipelineStage) {}

    /// A stage finished successfully
    fn stage_completed(&self, _stage: PipelineStage) {}

    /// The trigger was classified
    fn release_resolved(&self, _release: &ResolvedRelease) {}

    /// Every builder succeeded
    fn builds_finished(&self, _report: &BuildReport) {}

    /// `SHA256SUMS.txt` was written; runs between the two checksum passes
    fn checksums_recorded(&self, _manifest_path: &Path) {}

    /// Publication finished
    fn published(&self, _receipt: &PublishReceipt) {}

    /// The pipeline reached its failed state
    fn stage_failed(&self, _failure: &PipelineFailure) {}
}

/// Observer that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl StageObserver for NoopObserver {}
