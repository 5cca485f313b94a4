//! Pipeline configuration.
//!
//! Static settings live in `release.toml`. Secrets never do: signing
//! credentials, the mirror's private key and the release token are read from
//! the environment through an [`EnvConfig`] snapshot taken once per run.

use crate::build::{
    check_template, Arch, BuildTarget, NamingRule, NamingTable, Platform, ToolchainCommands, COMMAND_KEYS,
    NAME_KEYS,
};
use crate::error::{ConfigError, Result};
use crate::publish::NotesPolicy;
use crate::version::VersionResolver;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "release.toml";

/// Snapshot of the process environment.
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    vars: HashMap<String, String>,
}

impl EnvConfig {
    /// Capture the current process environment; non-UTF-8 entries are skipped.
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
                .collect(),
        }
    }

    /// Build from explicit pairs (tests, embedding).
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Value of a variable, if set.
    pub fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    /// First non-empty value among `names`.
    pub fn first_of(&self, names: &[&str]) -> Option<String> {
        names
            .iter()
            .filter_map(|n| self.get(n))
            .find(|v| !v.trim().is_empty())
    }

    /// Non-empty value of a required secret.
    pub fn require(&self, name: &str) -> std::result::Result<String, ConfigError> {
        self.first_of(&[name]).ok_or_else(|| ConfigError::MissingSecret {
            name: name.to_string(),
        })
    }
}

fn default_stable_branch() -> String {
    "stable".to_string()
}

fn default_nightly_ref() -> String {
    "main".to_string()
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("target/release-pipeline")
}

fn default_build_timeout_secs() -> u64 {
    2 * 60 * 60
}

fn default_architectures() -> Vec<Arch> {
    vec![Arch::X64, Arch::Arm64]
}

fn default_ssh_port() -> u16 {
    22
}

fn default_private_key_env() -> String {
    "NIGHTLY_SSH_KEY".to_string()
}

fn default_token_env() -> String {
    "GH_TOKEN".to_string()
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_upload_url() -> String {
    "https://uploads.github.com".to_string()
}

/// Toolchain settings of one platform.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    /// Architectures, built in this order
    #[serde(default = "default_architectures")]
    pub architectures: Vec<Arch>,
    /// Packaging command template
    pub package: Vec<String>,
    /// Signing / notarization command template
    #[serde(default)]
    pub sign: Option<Vec<String>>,
    /// Environment variables forming this platform's signing credentials
    #[serde(default)]
    pub signing_env: Vec<String>,
}

/// The three platform sections.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetsConfig {
    /// `[targets.windows]`
    pub windows: Option<TargetConfig>,
    /// `[targets.macos]`
    pub macos: Option<TargetConfig>,
    /// `[targets.linux]`
    pub linux: Option<TargetConfig>,
}

impl TargetsConfig {
    /// Section for one platform
    pub fn get(&self, platform: Platform) -> Option<&TargetConfig> {
        match platform {
            Platform::Windows => self.windows.as_ref(),
            Platform::MacOs => self.macos.as_ref(),
            Platform::Linux => self.linux.as_ref(),
        }
    }

    /// Configured sections in platform order
    pub fn iter(&self) -> impl Iterator<Item = (Platform, &TargetConfig)> {
        Platform::ALL
            .into_iter()
            .filter_map(move |p| self.get(p).map(|t| (p, t)))
    }
}

/// `[[naming]]` override of one rule.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamingOverride {
    /// Platform of the rule
    pub platform: Platform,
    /// Architecture of the rule
    pub arch: Arch,
    /// Emitted file name template
    pub emitted: String,
    /// Canonical extension
    pub extension: String,
}

/// `[nightly]` mirror destination.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NightlyConfig {
    /// SSH host
    #[serde(default)]
    pub host: Option<String>,
    /// SSH user
    #[serde(default)]
    pub user: Option<String>,
    /// Remote directory mirrored to
    #[serde(default)]
    pub path: Option<String>,
    /// SSH port
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Environment variable holding the private key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
    /// Local directory mirrored to instead of an SSH host
    #[serde(default)]
    pub local_mirror: Option<PathBuf>,
    /// Landing page document shipped with every nightly
    pub landing_page: PathBuf,
    /// Preview image
    pub preview_image: PathBuf,
    /// Logo asset
    pub logo: PathBuf,
}

/// `[github]` release repository.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitHubConfig {
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Environment variable holding the token (falls back to `GITHUB_TOKEN`)
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Release notes file
    #[serde(default)]
    pub notes_file: Option<PathBuf>,
    /// Behavior when no release notes are supplied
    #[serde(default)]
    pub notes_policy: NotesPolicy,
    /// REST API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Asset upload base URL
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
}

/// Contents of `release.toml`.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Product name used in artifact names
    pub product: String,
    /// Declared semver version
    pub version: String,
    /// Branch whose pushes produce stable releases
    #[serde(default = "default_stable_branch")]
    pub stable_branch: String,
    /// Revision built for nightlies
    #[serde(default = "default_nightly_ref")]
    pub nightly_ref: String,
    /// Working directory for builds and staging
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    /// Wall-clock ceiling per platform builder
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,
    /// Per-platform toolchains
    #[serde(default)]
    pub targets: TargetsConfig,
    /// Naming rule overrides
    #[serde(default)]
    pub naming: Vec<NamingOverride>,
    /// Nightly mirror settings
    #[serde(default)]
    pub nightly: Option<NightlyConfig>,
    /// Stable release settings
    #[serde(default)]
    pub github: Option<GitHubConfig>,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    base_dir: PathBuf,
}

impl PipelineConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path)?;
        let mut config: PipelineConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.validate()?;

        log::debug!("Loaded pipeline configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text; relative paths resolve against `base_dir`.
    pub fn from_toml_str(content: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut config: PipelineConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.base_dir = base_dir.into();
        config.validate()?;
        Ok(config)
    }

    /// Check semantic constraints.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid { reason };

        if self.product.trim().is_empty() || self.product.contains(['/', '\\', ' ']) {
            return Err(invalid(format!("product '{}' is not a valid file name component", self.product)));
        }
        semver::Version::parse(self.version.trim())
            .map_err(|e| invalid(format!("version '{}' is not semver: {}", self.version, e)))?;
        if self.build_timeout_secs == 0 {
            return Err(invalid("build_timeout_secs must be greater than zero".to_string()));
        }

        for platform in Platform::ALL {
            let target = self
                .targets
                .get(platform)
                .ok_or_else(|| invalid(format!("[targets.{}] is missing", platform)))?;
            if target.package.is_empty() {
                return Err(invalid(format!("[targets.{}] package command is empty", platform)));
            }
            if target.architectures.is_empty() {
                return Err(invalid(format!("[targets.{}] lists no architectures", platform)));
            }
            if matches!(&target.sign, Some(cmd) if cmd.is_empty()) {
                return Err(invalid(format!("[targets.{}] sign command is empty", platform)));
            }
            for arg in target.package.iter().chain(target.sign.iter().flatten()) {
                check_template(arg, COMMAND_KEYS).map_err(|e| {
                    invalid(format!("[targets.{}] command argument '{}': {}", platform, arg, e))
                })?;
            }
        }

        for o in &self.naming {
            check_template(&o.emitted, NAME_KEYS).map_err(|e| {
                invalid(format!("[[naming]] {} {} emitted '{}': {}", o.platform, o.arch, o.emitted, e))
            })?;
        }

        let naming = self.naming_table();
        if let Some((first, second)) = naming.colliding_pairs().first() {
            return Err(invalid(format!(
                "naming rules for {} {} and {} {} produce the same canonical name",
                first.0, first.1, second.0, second.1
            )));
        }
        for (platform, target) in self.targets.iter() {
            for &arch in &target.architectures {
                if naming.rule(platform, arch).is_none() {
                    return Err(invalid(format!("no naming rule for {} {}", platform, arch)));
                }
            }
        }

        if let Some(nightly) = &self.nightly {
            let remote_complete = [&nightly.host, &nightly.user, &nightly.path]
                .iter()
                .all(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()));
            if nightly.local_mirror.is_none() && !remote_complete {
                return Err(invalid(
                    "[nightly] needs host, user and path, or local_mirror".to_string(),
                ));
            }
        }

        if let Some(github) = &self.github
            && (github.owner.trim().is_empty() || github.repo.trim().is_empty())
        {
            return Err(invalid("[github] owner and repo must be set".to_string()));
        }

        Ok(())
    }

    /// Resolve a configured path against the configuration file's directory.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Resolved working directory
    pub fn work_dir(&self) -> PathBuf {
        self.resolve_path(&self.work_dir)
    }

    /// Wall-clock ceiling per builder
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    /// Resolver for this repository's branches
    pub fn resolver(&self) -> VersionResolver {
        VersionResolver::new(&self.stable_branch, &self.nightly_ref)
    }

    /// Stock naming table with the `[[naming]]` overrides applied
    pub fn naming_table(&self) -> NamingTable {
        let mut table = NamingTable::standard();
        for o in &self.naming {
            table.set_rule(o.platform, o.arch, NamingRule::new(&o.emitted, &o.extension));
        }
        table
    }

    /// One build target per configured platform
    pub fn build_targets(&self) -> Vec<BuildTarget> {
        self.targets
            .iter()
            .map(|(platform, t)| BuildTarget::new(platform, t.architectures.iter().copied()))
            .collect()
    }

    /// Package and sign commands per platform
    pub fn toolchain_commands(&self) -> HashMap<Platform, ToolchainCommands> {
        self.targets
            .iter()
            .map(|(platform, t)| {
                (
                    platform,
                    ToolchainCommands {
                        package: t.package.clone(),
                        sign: t.sign.clone(),
                    },
                )
            })
            .collect()
    }

    /// Credential variable names per platform
    pub fn signing_requirements(&self) -> BTreeMap<Platform, Vec<String>> {
        self.targets
            .iter()
            .filter(|(_, t)| !t.signing_env.is_empty())
            .map(|(platform, t)| (platform, t.signing_env.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::SigningCredentials;

    const MINIMAL: &str = r#"
product = "kodegen"
version = "2.3.0"

[targets.windows]
package = ["pwsh", "package.ps1", "{{arch}}"]
sign = ["pwsh", "sign.ps1", "{{file}}"]
signing_env = ["WIN_CERT", "WIN_CERT_PASSWORD"]

[targets.macos]
package = ["./package-dmg.sh", "{{arch}}"]

[targets.linux]
architectures = ["x64"]
package = ["./package-appimage.sh", "{{arch}}"]

[nightly]
local_mirror = "mirror"
landing_page = "site/index.html"
preview_image = "site/preview.png"
logo = "site/logo.svg"

[github]
owner = "cyrup-ai"
repo = "kodegen"
"#;

    #[test]
    fn test_minimal_config_with_defaults() {
        let config = PipelineConfig::from_toml_str(MINIMAL, "/repo").unwrap();

        assert_eq!(config.stable_branch, "stable");
        assert_eq!(config.nightly_ref, "main");
        assert_eq!(config.build_timeout(), Duration::from_secs(7200));
        assert_eq!(config.work_dir(), PathBuf::from("/repo/target/release-pipeline"));

        let targets = config.build_targets();
        assert_eq!(targets.len(), 3);
        assert_eq!(targets[2].architectures(), &[Arch::X64]);

        let github = config.github.as_ref().unwrap();
        assert_eq!(github.token_env, "GH_TOKEN");
        assert_eq!(github.notes_policy, NotesPolicy::Placeholder);

        let nightly = config.nightly.as_ref().unwrap();
        assert_eq!(nightly.port, 22);
        assert_eq!(
            config.resolve_path(nightly.local_mirror.as_ref().unwrap()),
            PathBuf::from("/repo/mirror")
        );
    }

    #[test]
    fn test_signing_requirements_feed_credentials() {
        let config = PipelineConfig::from_toml_str(MINIMAL, "/repo").unwrap();
        let required = config.signing_requirements();
        assert_eq!(required.len(), 1);

        let env = EnvConfig::from_pairs([("WIN_CERT", "c"), ("WIN_CERT_PASSWORD", "p")]);
        let creds = SigningCredentials::from_env(&env, &required);
        assert!(matches!(
            creds.for_platform(Platform::Windows),
            crate::build::CredentialState::Complete(_)
        ));
    }

    #[test]
    fn test_missing_platform_is_invalid() {
        let text = MINIMAL.replace(
            "[targets.linux]\narchitectures = [\"x64\"]\npackage = [\"./package-appimage.sh\", \"{{arch}}\"]\n",
            "",
        );
        let err = PipelineConfig::from_toml_str(&text, "/repo").unwrap_err();
        assert!(err.to_string().contains("[targets.linux] is missing"));

        let text = MINIMAL.replace("[targets.linux]", "[targets.beos]");
        assert!(PipelineConfig::from_toml_str(&text, "/repo").is_err());
    }

    #[test]
    fn test_colliding_naming_override_is_invalid() {
        let text = format!(
            "{}\n[[naming]]\nplatform = \"linux\"\narch = \"x64\"\nemitted = \"x.dmg\"\nextension = \"dmg\"\n",
            MINIMAL
        );
        let err = PipelineConfig::from_toml_str(&text, "/repo").unwrap_err();
        assert!(err.to_string().contains("same canonical name"));
    }

    #[test]
    fn test_unknown_template_placeholders_are_invalid() {
        let text = MINIMAL.replace("\"sign.ps1\", \"{{file}}\"", "\"sign.ps1\", \"{{installer}}\"");
        let err = PipelineConfig::from_toml_str(&text, "/repo").unwrap_err();
        assert!(err.to_string().contains("[targets.windows] command argument '{{installer}}'"));

        let text = format!(
            "{}\n[[naming]]\nplatform = \"linux\"\narch = \"x64\"\nemitted = \"{{{{product}}}}-{{{{out_dir}}}}.AppImage\"\nextension = \"AppImage\"\n",
            MINIMAL
        );
        let err = PipelineConfig::from_toml_str(&text, "/repo").unwrap_err();
        assert!(err.to_string().contains("[[naming]] linux x64"));
    }

    #[test]
    fn test_zero_timeout_and_bad_version_are_invalid() {
        let text = MINIMAL.replace("version = \"2.3.0\"", "version = \"2.3.0\"\nbuild_timeout_secs = 0");
        assert!(PipelineConfig::from_toml_str(&text, "/repo").is_err());

        let text = MINIMAL.replace("2.3.0", "two");
        let err = PipelineConfig::from_toml_str(&text, "/repo").unwrap_err();
        assert!(err.to_string().contains("not semver"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = PipelineConfig::load(Path::new("/nonexistent/release.toml")).unwrap_err();
        assert!(matches!(
            err,
            crate::error::ReleaseError::Config(ConfigError::NotFound { .. })
        ));
    }

    #[test]
    fn test_env_require_rejects_blank() {
        let env = EnvConfig::from_pairs([("GH_TOKEN", " "), ("GITHUB_TOKEN", "t")]);
        assert!(env.require("GH_TOKEN").is_err());
        assert_eq!(env.first_of(&["GH_TOKEN", "GITHUB_TOKEN"]), Some("t".to_string()));
    }
}
