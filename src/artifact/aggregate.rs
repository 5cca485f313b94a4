//! Flat staging of every builder's artifacts.

use super::ArtifactRef;
use crate::build::Platform;
use crate::error::AggregateError;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Copies the artifacts of all builders into one flat directory.
#[derive(Clone, Debug, Default)]
pub struct ArtifactAggregator;

impl ArtifactAggregator {
    /// Create an aggregator
    pub fn new() -> Self {
        Self
    }

    /// Stage every artifact under `destination`, keeping its canonical name.
    ///
    /// Name collisions are detected before anything is copied. Existing files
    /// in `destination` are never overwritten. The returned references point
    /// at the staged copies and are ordered by file name.
    pub async fn collect(
        &self,
        by_platform: &BTreeMap<Platform, Vec<ArtifactRef>>,
        destination: &Path,
    ) -> Result<Vec<ArtifactRef>, AggregateError> {
        let mut claimed: HashMap<&str, &Path> = HashMap::new();
        let mut pending: Vec<&ArtifactRef> = Vec::new();

        for artifacts in by_platform.values() {
            for artifact in artifacts {
                if let Some(first) = claimed.insert(artifact.file_name(), artifact.source_path()) {
                    return Err(AggregateError::NameCollision {
                        file_name: artifact.file_name().to_string(),
                        first: first.to_path_buf(),
                        second: artifact.source_path().to_path_buf(),
                    });
                }
                pending.push(artifact);
            }
        }
        pending.sort_by(|a, b| a.file_name().cmp(b.file_name()));

        tokio::fs::create_dir_all(destination)
            .await
            .map_err(|source| AggregateError::Fs {
                context: "creating staging directory",
                path: destination.to_path_buf(),
                source,
            })?;

        let mut staged = Vec::with_capacity(pending.len());
        for artifact in pending {
            staged.push(stage_one(artifact, destination).await?);
        }

        log::info!("Staged {} artifact(s) in {}", staged.len(), destination.display());
        Ok(staged)
    }
}

async fn stage_one(artifact: &ArtifactRef, destination: &Path) -> Result<ArtifactRef, AggregateError> {
    let source = artifact.source_path();
    let target: PathBuf = destination.join(artifact.file_name());

    if !tokio::fs::try_exists(source).await.unwrap_or(false) {
        return Err(AggregateError::SourceMissing {
            path: source.to_path_buf(),
        });
    }

    // Already in place (builder wrote straight into the staging directory)
    if same_file(source, &target).await {
        return ArtifactRef::from_path(&target)
            .await
            .map_err(|source| AggregateError::Fs {
                context: "reading staged artifact",
                path: target.clone(),
                source,
            });
    }

    if tokio::fs::try_exists(&target).await.unwrap_or(false) {
        return Err(AggregateError::AlreadyStaged { path: target });
    }

    let size = tokio::fs::copy(source, &target)
        .await
        .map_err(|e| AggregateError::Fs {
            context: "copying artifact to",
            path: target.clone(),
            source: e,
        })?;
    log::debug!("Staged {} ({} bytes)", artifact.file_name(), size);

    Ok(ArtifactRef::new(artifact.file_name(), target, size))
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
