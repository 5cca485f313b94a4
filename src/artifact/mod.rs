//! Release artifacts: references, aggregation, checksums and the manifest.

mod aggregate;
pub mod checksum;
mod manifest;

pub use aggregate::ArtifactAggregator;
pub use checksum::{CHECKSUM_FILE_NAME, ChecksumEntry, ChecksumVerifier};
pub use manifest::ReleaseManifest;

use serde::Serialize;
use std::path::{Path, PathBuf};

/// A file produced by a build job.
///
/// Immutable once created; aggregation produces new references pointing at
/// the staged copies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ArtifactRef {
    file_name: String,
    source_path: PathBuf,
    size_bytes: u64,
}

impl ArtifactRef {
    /// Create a reference
    pub fn new(file_name: impl Into<String>, source_path: impl Into<PathBuf>, size_bytes: u64) -> Self {
        Self {
            file_name: file_name.into(),
            source_path: source_path.into(),
            size_bytes,
        }
    }

    /// Create a reference to an existing file, reading its size from disk.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = tokio::fs::metadata(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("{} has no file name", path.display()),
                )
            })?;
        Ok(Self::new(file_name, path, metadata.len()))
    }

    /// Canonical file name (`<product>-<version>-<arch>.<ext>`)
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Where the file currently lives
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// File size in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}
