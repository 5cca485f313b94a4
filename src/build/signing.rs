//! Signing credentials keyed by platform.
//!
//! Credentials are opaque to the pipeline: a platform's credentials are the
//! set of environment variables its signing toolchain expects (certificate,
//! password, notarization API key, ...). They are injected into the sign
//! command's environment only.

use super::target::Platform;
use crate::config::EnvConfig;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Secret environment variables for one platform's signing toolchain.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PlatformCredentials {
    vars: BTreeMap<String, String>,
}

impl PlatformCredentials {
    /// Create from name/value pairs
    pub fn new(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            vars: vars.into_iter().collect(),
        }
    }

    /// Variables to inject into the sign command
    pub fn env_vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for PlatformCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.vars.keys().map(|k| (k, "<redacted>")))
            .finish()
    }
}

/// Availability of a platform's credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialState {
    /// Nothing configured or nothing set: build unsigned
    Absent,
    /// Every required variable is set and non-empty
    Complete(PlatformCredentials),
    /// Some variables are set, others missing or empty
    Incomplete {
        /// Missing or empty variable names
        missing: Vec<String>,
    },
}

/// Signing credentials for every platform of a run.
#[derive(Clone, Debug, Default)]
pub struct SigningCredentials {
    by_platform: HashMap<Platform, CredentialState>,
}

impl SigningCredentials {
    /// No credentials at all; every build is unsigned.
    pub fn none() -> Self {
        Self::default()
    }

    /// Collect credentials from the environment.
    ///
    /// `required` lists, per platform, the variable names forming its credentials.
    pub fn from_env(env: &EnvConfig, required: &BTreeMap<Platform, Vec<String>>) -> Self {
        let mut by_platform = HashMap::new();

        for (platform, names) in required {
            let mut present = Vec::new();
            let mut missing = Vec::new();
            for name in names {
                match env.get(name) {
                    Some(value) if !value.trim().is_empty() => present.push((name.clone(), value)),
                    _ => missing.push(name.clone()),
                }
            }

            let state = if present.is_empty() {
                CredentialState::Absent
            } else if missing.is_empty() {
                CredentialState::Complete(PlatformCredentials::new(present))
            } else {
                CredentialState::Incomplete { missing }
            };
            by_platform.insert(*platform, state);
        }

        Self { by_platform }
    }

    /// Set the credentials of one platform.
    pub fn insert(&mut self, platform: Platform, state: CredentialState) {
        self.by_platform.insert(platform, state);
    }

    /// Credentials for one platform; absent when never configured.
    pub fn for_platform(&self, platform: Platform) -> &CredentialState {
        static ABSENT: CredentialState = CredentialState::Absent;
        self.by_platform.get(&platform).unwrap_or(&ABSENT)
    }
}
