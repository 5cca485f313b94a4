//! Trigger classification.

use super::{ReleaseChannel, TriggerContext, TriggerKind};
use crate::error::VersionError;
use chrono::{DateTime, Utc};
use semver::Version;

/// Outcome of trigger classification, passed by value to every stage.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ResolvedRelease {
    /// Version stamped into artifact names
    pub version: String,
    /// Channel of this run
    pub channel: ReleaseChannel,
    /// Source revision to build
    pub source_ref: String,
}

impl ResolvedRelease {
    /// Release tag (`v<version>`)
    pub fn tag(&self) -> String {
        format!("v{}", self.version)
    }
}

/// Maps a trigger to a version, a channel and a source revision.
#[derive(Clone, Debug)]
pub struct VersionResolver {
    stable_branch: String,
    nightly_ref: String,
}

impl VersionResolver {
    /// Create a resolver
    pub fn new(stable_branch: impl Into<String>, nightly_ref: impl Into<String>) -> Self {
        Self {
            stable_branch: stable_branch.into(),
            nightly_ref: nightly_ref.into(),
        }
    }

    /// Resolve a trigger.
    ///
    /// * push to the stable branch: Stable, declared version unchanged
    /// * manual dispatch or schedule: Nightly, version
    ///   `<major>.<minor>.<patch>-nightly-<YYYYMMDD>-<HHMM>` (UTC of `now`)
    ///
    /// Anything else is rejected.
    pub fn resolve(
        &self,
        trigger: &TriggerContext,
        declared: &str,
        now: DateTime<Utc>,
    ) -> Result<ResolvedRelease, VersionError> {
        let declared_version = Version::parse(declared.trim()).map_err(|e| VersionError::InvalidVersion {
            version: declared.to_string(),
            reason: e.to_string(),
        })?;

        let kind = trigger.kind.ok_or_else(|| VersionError::UnrecognizedTrigger {
            reason: "no trigger kind supplied".to_string(),
        })?;

        match kind {
            TriggerKind::Push => {
                let branch = trigger.branch().ok_or_else(|| VersionError::UnrecognizedTrigger {
                    reason: "push trigger without a branch".to_string(),
                })?;
                if branch != self.stable_branch {
                    return Err(VersionError::UnrecognizedTrigger {
                        reason: format!(
                            "push to '{}' is not a push to the stable branch '{}'",
                            branch, self.stable_branch
                        ),
                    });
                }
                reject_hint(kind, trigger.channel_hint, ReleaseChannel::Stable)?;

                Ok(ResolvedRelease {
                    version: declared_version.to_string(),
                    channel: ReleaseChannel::Stable,
                    source_ref: branch.to_string(),
                })
            }
            TriggerKind::Manual | TriggerKind::Scheduled => {
                reject_hint(kind, trigger.channel_hint, ReleaseChannel::Nightly)?;

                let source_ref: &str = match kind {
                    TriggerKind::Manual => trigger.branch().unwrap_or(self.nightly_ref.as_str()),
                    _ => self.nightly_ref.as_str(),
                };

                Ok(ResolvedRelease {
                    version: nightly_version(&declared_version, now)?,
                    channel: ReleaseChannel::Nightly,
                    source_ref: source_ref.to_string(),
                })
            }
        }
    }
}

fn reject_hint(
    kind: TriggerKind,
    hint: Option<ReleaseChannel>,
    allowed: ReleaseChannel,
) -> Result<(), VersionError> {
    match hint {
        Some(hint) if hint != allowed => Err(VersionError::ChannelHintConflict {
            kind: kind.to_string(),
            hint: hint.to_string(),
        }),
        _ => Ok(()),
    }
}

fn nightly_version(declared: &Version, now: DateTime<Utc>) -> Result<String, VersionError> {
    let candidate = format!(
        "{}.{}.{}-nightly-{}",
        declared.major,
        declared.minor,
        declared.patch,
        now.format("%Y%m%d-%H%M")
    );
    Version::parse(&candidate)
        .map(|v| v.to_string())
        .map_err(|e| VersionError::InvalidVersion {
            version: candidate,
            reason: e.to_string(),
        })
}
