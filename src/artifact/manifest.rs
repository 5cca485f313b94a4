//! The release manifest handed to publishers.

use super::ArtifactRef;
use super::checksum::ChecksumEntry;
use crate::error::PublishError;
use crate::version::ReleaseChannel;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Ordered record of one run's artifacts and their verified checksums.
///
/// Assembled once every build succeeded and every checksum was re-verified.
#[derive(Clone, Debug, Serialize)]
pub struct ReleaseManifest {
    version: String,
    channel: ReleaseChannel,
    source_ref: String,
    artifacts: Vec<ArtifactRef>,
    checksums: Vec<ChecksumEntry>,
    checksum_file: PathBuf,
}

impl ReleaseManifest {
    /// Assemble a manifest
    pub fn new(
        version: impl Into<String>,
        channel: ReleaseChannel,
        source_ref: impl Into<String>,
        artifacts: Vec<ArtifactRef>,
        checksums: Vec<ChecksumEntry>,
        checksum_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            version: version.into(),
            channel,
            source_ref: source_ref.into(),
            artifacts,
            checksums,
            checksum_file: checksum_file.into(),
        }
    }

    /// Resolved release version
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Release channel
    pub fn channel(&self) -> ReleaseChannel {
        self.channel
    }

    /// Source revision that was built
    pub fn source_ref(&self) -> &str {
        &self.source_ref
    }

    /// Staged artifacts, ordered by file name
    pub fn artifacts(&self) -> &[ArtifactRef] {
        &self.artifacts
    }

    /// Checksum entries, ordered by file name
    pub fn checksums(&self) -> &[ChecksumEntry] {
        &self.checksums
    }

    /// Path of `SHA256SUMS.txt`
    pub fn checksum_file(&self) -> &Path {
        &self.checksum_file
    }

    /// Check the publication precondition.
    ///
    /// Every artifact has exactly one checksum entry, every entry belongs to
    /// an artifact, and every entry was verified.
    pub fn ensure_publishable(&self) -> Result<(), PublishError> {
        if self.artifacts.is_empty() {
            return Err(PublishError::PreconditionFailed {
                reason: "manifest contains no artifacts".to_string(),
            });
        }

        if let Some(entry) = self.checksums.iter().find(|e| !e.verified()) {
            return Err(PublishError::PreconditionFailed {
                reason: format!("checksum of '{}' was not verified", entry.file_name()),
            });
        }

        let artifact_names: BTreeSet<&str> = self.artifacts.iter().map(ArtifactRef::file_name).collect();
        let checksum_names: BTreeSet<&str> = self.checksums.iter().map(ChecksumEntry::file_name).collect();
        if artifact_names.len() != self.artifacts.len()
            || checksum_names.len() != self.checksums.len()
            || artifact_names != checksum_names
        {
            return Err(PublishError::PreconditionFailed {
                reason: "checksum entries do not match the artifact set one-to-one".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ChecksumEntry {
        ChecksumEntry::new(name, "00")
    }

    fn manifest(checksums: Vec<ChecksumEntry>) -> ReleaseManifest {
        ReleaseManifest::new(
            "2.3.0",
            ReleaseChannel::Stable,
            "stable",
            vec![
                ArtifactRef::new("a.exe", "/s/a.exe", 1),
                ArtifactRef::new("b.dmg", "/s/b.dmg", 1),
            ],
            checksums,
            "/s/SHA256SUMS.txt",
        )
    }

    #[test]
    fn test_unverified_entry_blocks_publication() {
        let err = manifest(vec![entry("a.exe"), entry("b.dmg")])
            .ensure_publishable()
            .unwrap_err();
        assert!(err.to_string().contains("not verified"));
    }

    #[test]
    fn test_name_sets_must_match() {
        let m = manifest(vec![entry("a.exe").into_verified()]);
        assert!(m.ensure_publishable().is_err());

        let m = manifest(vec![
            entry("a.exe").into_verified(),
            entry("c.AppImage").into_verified(),
        ]);
        assert!(m.ensure_publishable().is_err());
    }

    #[test]
    fn test_fully_verified_manifest_is_publishable() {
        let m = manifest(vec![entry("b.dmg").into_verified(), entry("a.exe").into_verified()]);
        assert!(m.ensure_publishable().is_ok());
        assert_eq!(m.checksum_file(), Path::new("/s/SHA256SUMS.txt"));
    }
}
