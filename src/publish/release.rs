//! Stable publication: a draft release with every artifact attached.

use super::{PublishReceipt, Publisher};
use crate::artifact::{CHECKSUM_FILE_NAME, ReleaseManifest};
use crate::error::PublishError;
use serde::Deserialize;
use std::future::Future;
use std::path::{Path, PathBuf};

/// What to do when a stable release has no notes.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotesPolicy {
    /// Use a placeholder body; a maintainer edits the draft before publishing
    #[default]
    Placeholder,
    /// Refuse to create the draft
    Require,
}

/// Release notes source for a stable release.
#[derive(Clone, Debug, Default)]
pub struct ReleaseNotes {
    body: Option<String>,
    policy: NotesPolicy,
}

impl ReleaseNotes {
    /// Notes with an optional body
    pub fn new(body: Option<String>, policy: NotesPolicy) -> Self {
        Self { body, policy }
    }

    /// Read the body from a file.
    pub fn from_file(path: &Path, policy: NotesPolicy) -> std::io::Result<Self> {
        Ok(Self::new(Some(std::fs::read_to_string(path)?), policy))
    }

    /// Release body for `version`, applying the policy to an empty body.
    pub fn body_for(&self, version: &str) -> Result<String, PublishError> {
        match self.body.as_deref().map(str::trim) {
            Some(body) if !body.is_empty() => Ok(body.to_string()),
            _ => match self.policy {
                NotesPolicy::Placeholder => {
                    log::warn!("No release notes for {}; using a placeholder body", version);
                    Ok(format!("Release {}", version))
                }
                NotesPolicy::Require => Err(PublishError::MissingReleaseNotes),
            },
        }
    }
}

/// Request to create a release record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DraftRelease {
    /// Tag name (`v<version>`)
    pub tag: String,
    /// Release title
    pub name: String,
    /// Body
    pub body: String,
    /// Revision the tag points at
    pub target_commitish: String,
    /// Always true for releases created by the pipeline
    pub draft: bool,
    /// Pre-1.0 and pre-release versions are flagged as prereleases
    pub prerelease: bool,
}

/// Release record returned by the host.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreatedRelease {
    /// Host-side identifier
    pub id: u64,
    /// Page of the release
    pub html_url: String,
    /// Draft flag as reported by the host
    pub draft: bool,
}

/// A file to attach to a release.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReleaseAsset {
    /// Asset name
    pub file_name: String,
    /// Local file
    pub path: PathBuf,
    /// MIME type
    pub content_type: &'static str,
    /// Human readable label
    pub label: String,
}

impl ReleaseAsset {
    /// Asset for a local file, with content type and label derived from its name
    pub fn for_file(file_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let file_name = file_name.into();
        Self {
            content_type: asset_content_type(&file_name),
            label: asset_label(&file_name),
            path: path.into(),
            file_name,
        }
    }
}

/// An attached asset.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UploadedAsset {
    /// Asset name
    pub file_name: String,
    /// Size reported by the host
    pub size: u64,
    /// Download URL
    pub download_url: String,
}

/// Repository hosting release records.
pub trait ReleaseHost: Send + Sync {
    /// Check the credentials before anything is created.
    fn verify_access(&self) -> impl Future<Output = Result<(), PublishError>> + Send;

    /// Create a release record.
    fn create_draft_release(
        &self,
        draft: &DraftRelease,
    ) -> impl Future<Output = Result<CreatedRelease, PublishError>> + Send;

    /// Attach a file to a release.
    fn upload_asset(
        &self,
        release: &CreatedRelease,
        asset: &ReleaseAsset,
    ) -> impl Future<Output = Result<UploadedAsset, PublishError>> + Send;

    /// Remove a release record and its assets.
    fn delete_release(
        &self,
        release: &CreatedRelease,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

/// Creates a draft release tagged `v<version>` and attaches every artifact
/// plus `SHA256SUMS.txt`. The draft is never published automatically, and
/// is deleted again if any upload fails.
pub struct ReleasePublisher<H> {
    host: H,
    notes: ReleaseNotes,
}

impl<H: ReleaseHost> ReleasePublisher<H> {
    /// Create a publisher
    pub fn new(host: H, notes: ReleaseNotes) -> Self {
        Self { host, notes }
    }

    /// Delete a draft whose asset set is incomplete.
    async fn discard_draft(&self, tag: &str, release: &CreatedRelease) {
        log::warn!("Deleting incomplete draft release {}", tag);
        if let Err(e) = self.host.delete_release(release).await {
            log::error!(
                "Could not delete draft release {} ({}): {}; remove it by hand",
                tag,
                release.html_url,
                e
            );
        }
    }
}

impl<H: ReleaseHost> Publisher for ReleasePublisher<H> {
    fn name(&self) -> &'static str {
        "draft release"
    }

    async fn publish(
        &self,
        manifest: &ReleaseManifest,
        staging: &Path,
    ) -> Result<PublishReceipt, PublishError> {
        manifest.ensure_publishable()?;
        let body = self.notes.body_for(manifest.version())?;

        let prerelease = semver::Version::parse(manifest.version())
            .map(|v| v.major == 0 || !v.pre.is_empty())
            .unwrap_or(false);

        let draft = DraftRelease {
            tag: format!("v{}", manifest.version()),
            name: format!("Release {}", manifest.version()),
            body,
            target_commitish: manifest.source_ref().to_string(),
            draft: true,
            prerelease,
        };

        self.host.verify_access().await?;
        let release = self.host.create_draft_release(&draft).await?;
        if !release.draft {
            log::warn!("Release {} was not created as a draft", draft.tag);
        }
        log::info!("Created draft release {} ({})", draft.tag, release.html_url);

        let mut assets: Vec<ReleaseAsset> = manifest
            .artifacts()
            .iter()
            .map(|a| ReleaseAsset::for_file(a.file_name(), a.source_path()))
            .collect();
        assets.push(ReleaseAsset::for_file(
            CHECKSUM_FILE_NAME,
            staging.join(CHECKSUM_FILE_NAME),
        ));

        let mut files = Vec::with_capacity(assets.len());
        for asset in &assets {
            match self.host.upload_asset(&release, asset).await {
                Ok(uploaded) => {
                    log::info!("✓ Uploaded {} ({} bytes)", uploaded.file_name, uploaded.size);
                    files.push(uploaded.file_name);
                }
                Err(e) => {
                    self.discard_draft(&draft.tag, &release).await;
                    return Err(e);
                }
            }
        }
        files.sort();

        Ok(PublishReceipt {
            publisher: self.name(),
            destination: draft.tag,
            files,
            release_url: Some(release.html_url),
        })
    }
}

/// MIME type of a release asset
pub fn asset_content_type(file_name: &str) -> &'static str {
    match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some("exe") => "application/x-msdownload",
        Some("dmg") => "application/x-apple-diskimage",
        Some("AppImage") => "application/x-executable",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Descriptive label of a release asset
pub fn asset_label(file_name: &str) -> String {
    if file_name == CHECKSUM_FILE_NAME {
        return "SHA-256 checksums".to_string();
    }

    let arch = if file_name.contains("-arm64.") {
        "ARM64"
    } else if file_name.contains("-x64.") {
        "x64"
    } else {
        "multi-arch"
    };

    let platform = match Path::new(file_name).extension().and_then(|e| e.to_str()) {
        Some("exe") => "Windows installer",
        Some("dmg") => "macOS disk image",
        Some("AppImage") => "Linux AppImage",
        _ => "Binary",
    };

    format!("{} - {}", platform, arch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notes_policy() {
        let placeholder = ReleaseNotes::new(Some("  \n".to_string()), NotesPolicy::Placeholder);
        assert_eq!(placeholder.body_for("2.3.0").unwrap(), "Release 2.3.0");

        let require = ReleaseNotes::new(None, NotesPolicy::Require);
        assert!(matches!(require.body_for("2.3.0"), Err(PublishError::MissingReleaseNotes)));

        let written = ReleaseNotes::new(Some("Fixes\n".to_string()), NotesPolicy::Require);
        assert_eq!(written.body_for("2.3.0").unwrap(), "Fixes");
    }

    #[test]
    fn test_asset_labels_and_types() {
        assert_eq!(asset_label("kodegen-2.3.0-arm64.dmg"), "macOS disk image - ARM64");
        assert_eq!(asset_label("kodegen-2.3.0-x64.exe"), "Windows installer - x64");
        assert_eq!(asset_label(CHECKSUM_FILE_NAME), "SHA-256 checksums");
        assert_eq!(asset_content_type("a-x64.AppImage"), "application/x-executable");
        assert_eq!(asset_content_type("SHA256SUMS.txt"), "text/plain");
    }
}
