//! Release channel and version resolution.
//!
//! The trigger that started a run is classified exactly once, by
//! [`VersionResolver`]. Its output, a [`ResolvedRelease`], is passed by value
//! to every later stage; nothing downstream looks at the trigger again.

mod resolver;

pub use resolver::{ResolvedRelease, VersionResolver};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which release line a run targets.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    /// Tagged release published as a draft
    Stable,
    /// Dated build mirrored to the nightly host
    Nightly,
}

impl ReleaseChannel {
    /// Lowercase identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseChannel::Stable => "stable",
            ReleaseChannel::Nightly => "nightly",
        }
    }
}

impl fmt::Display for ReleaseChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" | "release" => Ok(ReleaseChannel::Stable),
            "nightly" => Ok(ReleaseChannel::Nightly),
            other => Err(format!("unknown release channel '{}'", other)),
        }
    }
}

/// What started the run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TriggerKind {
    /// Push to a branch
    Push,
    /// Manual dispatch
    Manual,
    /// Scheduled timer
    Scheduled,
}

impl TriggerKind {
    /// Lowercase identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Push => "push",
            TriggerKind::Manual => "manual",
            TriggerKind::Scheduled => "scheduled",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = String;

    /// Accepts the generic names and the CI event names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "push" => Ok(TriggerKind::Push),
            "manual" | "workflow_dispatch" => Ok(TriggerKind::Manual),
            "scheduled" | "schedule" => Ok(TriggerKind::Scheduled),
            other => Err(format!("unknown trigger kind '{}'", other)),
        }
    }
}

/// Trigger descriptor consumed by the resolver.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TriggerContext {
    /// Trigger kind; `None` when the environment supplied nothing usable
    pub kind: Option<TriggerKind>,
    /// Branch or ref (`stable` or `refs/heads/stable`)
    pub git_ref: Option<String>,
    /// Optional channel requested by the operator
    pub channel_hint: Option<ReleaseChannel>,
}

impl TriggerContext {
    /// Context for a trigger kind with no ref or hint
    pub fn new(kind: TriggerKind) -> Self {
        Self {
            kind: Some(kind),
            git_ref: None,
            channel_hint: None,
        }
    }

    /// Set the branch or ref
    pub fn with_ref(mut self, git_ref: impl Into<String>) -> Self {
        self.git_ref = Some(git_ref.into());
        self
    }

    /// Set the channel hint
    pub fn with_hint(mut self, channel: ReleaseChannel) -> Self {
        self.channel_hint = Some(channel);
        self
    }

    /// Branch name with any `refs/heads/` prefix removed.
    pub fn branch(&self) -> Option<&str> {
        self.git_ref
            .as_deref()
            .map(|r| r.strip_prefix("refs/heads/").unwrap_or(r))
            .filter(|r| !r.is_empty())
    }
}
