//! Publication of a verified release.
//!
//! Two publishers exist, one per channel: [`NightlyPublisher`] mirrors the
//! staging directory to the nightly host, [`ReleasePublisher`] creates a
//! draft release and attaches every artifact. Exactly one runs per pipeline
//! execution, chosen by [`ChannelPublishers`].

mod nightly;
mod release;
mod transport;

pub use nightly::{AuxiliaryFiles, NightlyPublisher};
pub use release::{
    CreatedRelease, DraftRelease, NotesPolicy, ReleaseAsset, ReleaseHost, ReleaseNotes,
    ReleasePublisher, UploadedAsset, asset_content_type, asset_label,
};
pub use transport::{LocalMirror, MirrorDestination, MirrorTransport, RsyncTransport};

use crate::artifact::ReleaseManifest;
use crate::error::PublishError;
use crate::version::ReleaseChannel;
use serde::Serialize;
use std::future::Future;
use std::path::Path;

/// Outcome of a successful publication.
#[derive(Clone, Debug, Serialize)]
pub struct PublishReceipt {
    /// Publisher that ran
    pub publisher: &'static str,
    /// Where the files went
    pub destination: String,
    /// File names published, sorted
    pub files: Vec<String>,
    /// Release page, for draft releases
    pub release_url: Option<String>,
}

/// Publishes a verified manifest.
///
/// Implementations must check [`ReleaseManifest::ensure_publishable`] before
/// any side effect.
pub trait Publisher: Send + Sync {
    /// Short name for logs and reports
    fn name(&self) -> &'static str;

    /// Publish the manifest's artifacts from `staging`.
    fn publish(
        &self,
        manifest: &ReleaseManifest,
        staging: &Path,
    ) -> impl Future<Output = Result<PublishReceipt, PublishError>> + Send;
}

/// The publishers available to a run, keyed by channel.
pub struct ChannelPublishers<N, R> {
    nightly: Option<N>,
    release: Option<R>,
}

impl<N: Publisher, R: Publisher> ChannelPublishers<N, R> {
    /// Create from optional publishers
    pub fn new(nightly: Option<N>, release: Option<R>) -> Self {
        Self { nightly, release }
    }

    /// Only a nightly publisher
    pub fn nightly_only(nightly: N) -> Self {
        Self::new(Some(nightly), None)
    }

    /// Only a release publisher
    pub fn release_only(release: R) -> Self {
        Self::new(None, Some(release))
    }

    /// Name of the publisher that serves `channel`, if configured
    pub fn name_for(&self, channel: ReleaseChannel) -> Option<&'static str> {
        match channel {
            ReleaseChannel::Nightly => self.nightly.as_ref().map(Publisher::name),
            ReleaseChannel::Stable => self.release.as_ref().map(Publisher::name),
        }
    }

    /// Whether `channel` can be published
    pub fn supports(&self, channel: ReleaseChannel) -> bool {
        self.name_for(channel).is_some()
    }

    /// Route the manifest to the publisher of its channel.
    pub async fn publish(
        &self,
        manifest: &ReleaseManifest,
        staging: &Path,
    ) -> Result<PublishReceipt, PublishError> {
        manifest.ensure_publishable()?;

        let channel = manifest.channel();
        let missing = || PublishError::PreconditionFailed {
            reason: format!("no publisher configured for the {} channel", channel),
        };

        match channel {
            ReleaseChannel::Nightly => {
                let publisher = self.nightly.as_ref().ok_or_else(missing)?;
                log::info!("Publishing {} via {}", manifest.version(), publisher.name());
                publisher.publish(manifest, staging).await
            }
            ReleaseChannel::Stable => {
                let publisher = self.release.as_ref().ok_or_else(missing)?;
                log::info!("Publishing {} via {}", manifest.version(), publisher.name());
                publisher.publish(manifest, staging).await
            }
        }
    }
}
