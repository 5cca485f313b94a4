//! Nightly publication: mirror the staging directory to the nightly host.

use super::transport::MirrorTransport;
use super::{PublishReceipt, Publisher};
use crate::artifact::{CHECKSUM_FILE_NAME, ReleaseManifest};
use crate::error::PublishError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Fixed files shipped with every nightly.
#[derive(Clone, Debug)]
pub struct AuxiliaryFiles {
    /// Landing page document
    pub landing_page: PathBuf,
    /// Preview image
    pub preview_image: PathBuf,
    /// Logo asset
    pub logo: PathBuf,
}

impl AuxiliaryFiles {
    /// All auxiliary sources
    pub fn paths(&self) -> [&Path; 3] {
        [self.landing_page.as_path(), self.preview_image.as_path(), self.logo.as_path()]
    }
}

/// Mirrors artifacts, `SHA256SUMS.txt` and the auxiliary files.
///
/// The mirror deletes every remote file absent from the staging directory,
/// so the staging directory is checked to hold exactly the expected set
/// before anything is transferred.
pub struct NightlyPublisher<T> {
    transport: T,
    auxiliary: AuxiliaryFiles,
}

impl<T: MirrorTransport> NightlyPublisher<T> {
    /// Create a publisher
    pub fn new(transport: T, auxiliary: AuxiliaryFiles) -> Self {
        Self {
            transport,
            auxiliary,
        }
    }

    async fn stage_auxiliary(
        &self,
        manifest: &ReleaseManifest,
        staging: &Path,
    ) -> Result<Vec<String>, PublishError> {
        let reserved: BTreeSet<&str> = manifest
            .artifacts()
            .iter()
            .map(|a| a.file_name())
            .chain([CHECKSUM_FILE_NAME])
            .collect();

        let mut names = Vec::with_capacity(3);
        for source in self.auxiliary.paths() {
            let name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| PublishError::PreconditionFailed {
                    reason: format!("auxiliary path {} has no file name", source.display()),
                })?;
            if reserved.contains(name.as_str()) || names.contains(&name) {
                return Err(PublishError::PreconditionFailed {
                    reason: format!("auxiliary file '{}' clashes with another staged file", name),
                });
            }

            tokio::fs::copy(source, staging.join(&name))
                .await
                .map_err(|e| PublishError::AuxiliaryFile {
                    path: source.to_path_buf(),
                    source: e,
                })?;
            log::debug!("Staged auxiliary file {}", name);
            names.push(name);
        }
        Ok(names)
    }
}

impl<T: MirrorTransport> Publisher for NightlyPublisher<T> {
    fn name(&self) -> &'static str {
        "nightly mirror"
    }

    async fn publish(
        &self,
        manifest: &ReleaseManifest,
        staging: &Path,
    ) -> Result<PublishReceipt, PublishError> {
        manifest.ensure_publishable()?;

        let auxiliary = self.stage_auxiliary(manifest, staging).await?;

        let expected: BTreeSet<String> = manifest
            .artifacts()
            .iter()
            .map(|a| a.file_name().to_string())
            .chain([CHECKSUM_FILE_NAME.to_string()])
            .chain(auxiliary)
            .collect();

        let mut present = BTreeSet::new();
        let mut entries = tokio::fs::read_dir(staging)
            .await
            .map_err(|e| PublishError::PreconditionFailed {
                reason: format!("cannot read {}: {}", staging.display(), e),
            })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PublishError::PreconditionFailed {
                reason: format!("cannot read {}: {}", staging.display(), e),
            })?
        {
            present.insert(entry.file_name().to_string_lossy().into_owned());
        }

        if present != expected {
            let stray: Vec<&String> = present.difference(&expected).collect();
            let absent: Vec<&String> = expected.difference(&present).collect();
            return Err(PublishError::PreconditionFailed {
                reason: format!(
                    "staging directory does not match the release set (unexpected: {:?}, missing: {:?})",
                    stray, absent
                ),
            });
        }

        log::info!(
            "Mirroring {} file(s) to {}",
            expected.len(),
            self.transport.destination()
        );
        self.transport.mirror(staging).await?;

        Ok(PublishReceipt {
            publisher: self.name(),
            destination: self.transport.destination(),
            files: expected.into_iter().collect(),
            release_url: None,
        })
    }
}
