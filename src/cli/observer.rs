//! Terminal rendering of pipeline progress.

use super::RuntimeConfig;
use crate::build::{BuildReport, JobStatus};
use crate::pipeline::{PipelineFailure, PipelineStage, StageObserver};
use crate::publish::PublishReceipt;
use crate::version::{ReleaseChannel, ResolvedRelease};
use std::path::Path;

/// Prints each stage through the runtime's output manager.
pub struct ConsoleObserver<'a> {
    config: &'a RuntimeConfig,
}

impl<'a> ConsoleObserver<'a> {
    /// Observer writing to `config`
    pub fn new(config: &'a RuntimeConfig) -> Self {
        Self { config }
    }
}

impl StageObserver for ConsoleObserver<'_> {
    fn stage_started(&self, stage: PipelineStage) {
        if stage != PipelineStage::Done {
            let _ = self.config.output().section(stage.as_str());
        }
    }

    fn release_resolved(&self, release: &ResolvedRelease) {
        let output = self.config.output();
        let _ = output.field("Channel", release.channel.as_str());
        let _ = output.field("Version", &release.version);
        let _ = output.field("Source ref", &release.source_ref);
        if release.channel == ReleaseChannel::Stable {
            let _ = output.field("Tag", &release.tag());
        }
    }

    fn builds_finished(&self, report: &BuildReport) {
        for job in report.jobs() {
            if job.status() == JobStatus::Succeeded {
                self.config.success_println(&format!(
                    "{}: {} artifact(s)",
                    job.target(),
                    job.produced_artifacts().len()
                ));
                for artifact in job.produced_artifacts() {
                    self.config.verbose_println(&format!(
                        "{} ({} bytes)",
                        artifact.file_name(),
                        artifact.size_bytes()
                    ));
                }
            }
        }
    }

    fn checksums_recorded(&self, manifest_path: &Path) {
        self.config
            .verbose_println(&format!("Wrote {}", manifest_path.display()));
    }

    fn stage_completed(&self, stage: PipelineStage) {
        match stage {
            PipelineStage::Aggregating => self.config.success_println("Artifacts staged"),
            PipelineStage::Verifying => self.config.success_println("All checksums verified"),
            _ => {}
        }
    }

    fn published(&self, receipt: &PublishReceipt) {
        self.config.success_println(&format!(
            "Published {} file(s) to {} via {}",
            receipt.files.len(),
            receipt.destination,
            receipt.publisher
        ));
        for file in &receipt.files {
            self.config.indent(file);
        }
        if let Some(url) = &receipt.release_url {
            let _ = self.config.output().field("Draft", url);
        }
    }

    fn stage_failed(&self, failure: &PipelineFailure) {
        self.config
            .error_println(&format!("{} stage failed", failure.stage));
    }
}
