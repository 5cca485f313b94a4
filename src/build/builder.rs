//! Platform builders.
//!
//! A [`PlatformBuilder`] turns one [`BuildTarget`] into signed, canonically
//! named installer files. The toolchains themselves are opaque; the stock
//! implementation, [`CommandBuilder`], runs configured command templates.

use super::naming::NamingTable;
use super::signing::{CredentialState, SigningCredentials};
use super::target::{Arch, BuildStep, BuildTarget, Platform};
use super::template::{render_args, TemplateVars};
use crate::artifact::ArtifactRef;
use crate::error::BuildError;
use handlebars::RenderError;
use crate::version::ReleaseChannel;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

/// Number of stderr lines kept in toolchain failure messages
const STDERR_TAIL_LINES: usize = 20;

/// Everything a builder needs besides its target, passed by value to each builder.
#[derive(Clone, Debug)]
pub struct BuildRequest {
    /// Product name used in file names
    pub product: String,
    /// Resolved release version
    pub version: String,
    /// Release channel of this run
    pub channel: ReleaseChannel,
    /// Source revision being packaged
    pub source_ref: String,
    /// Root output directory; each platform writes below `<output_dir>/<platform>/`
    pub output_dir: PathBuf,
    /// Signing credentials for every platform
    pub credentials: Arc<SigningCredentials>,
}

impl BuildRequest {
    /// Directory a platform's toolchain writes into.
    pub fn platform_dir(&self, platform: Platform) -> PathBuf {
        self.output_dir.join(platform.short_name())
    }
}

/// Produces the installers of one target.
///
/// Architectures are built sequentially. Errors are not retried.
pub trait PlatformBuilder: Send + Sync + 'static {
    /// Package, sign and normalize every architecture of `target`.
    fn build(
        &self,
        target: BuildTarget,
        request: BuildRequest,
    ) -> impl Future<Output = Result<Vec<ArtifactRef>, BuildError>> + Send;
}

/// Command templates for one platform's toolchain.
#[derive(Clone, Debug, Default)]
pub struct ToolchainCommands {
    /// Packaging command; must write the emitted file into `{{out_dir}}`
    pub package: Vec<String>,
    /// Signing / notarization command operating on `{{file}}` in place
    pub sign: Option<Vec<String>>,
}

/// Builder running external packaging and signing commands.
#[derive(Clone, Debug)]
pub struct CommandBuilder {
    commands: HashMap<Platform, ToolchainCommands>,
    naming: NamingTable,
}

impl CommandBuilder {
    /// Create a builder from per-platform commands and a naming table.
    pub fn new(commands: HashMap<Platform, ToolchainCommands>, naming: NamingTable) -> Self {
        Self { commands, naming }
    }

    async fn build_arch(
        &self,
        platform: Platform,
        arch: Arch,
        commands: &ToolchainCommands,
        request: &BuildRequest,
    ) -> Result<ArtifactRef, BuildError> {
        let out_dir = request.platform_dir(platform);
        tokio::fs::create_dir_all(&out_dir)
            .await
            .map_err(|e| toolchain_error(platform, arch, BuildStep::Package, format!(
                "cannot create {}: {}",
                out_dir.display(),
                e
            )))?;

        let emitted_name = self
            .naming
            .emitted_name(platform, arch, &request.product, &request.version)
            .map_err(|e| template_error(platform, arch, BuildStep::Normalize, e))?
            .ok_or_else(|| missing_rule(platform, arch))?;
        let canonical_name = self
            .naming
            .canonical_name(platform, arch, &request.product, &request.version)
            .ok_or_else(|| missing_rule(platform, arch))?;
        let emitted = out_dir.join(&emitted_name);
        let out_dir_str = out_dir.to_string_lossy().into_owned();
        let emitted_str = emitted.to_string_lossy().into_owned();

        let vars = TemplateVars::from([
            ("product", request.product.as_str()),
            ("version", request.version.as_str()),
            ("arch", arch.as_str()),
            ("platform", platform.short_name()),
            ("channel", request.channel.as_str()),
            ("out_dir", out_dir_str.as_str()),
            ("source_ref", request.source_ref.as_str()),
            ("file", emitted_str.as_str()),
        ]);

        // (a) package
        let argv = render_args(&commands.package, &vars)
            .map_err(|e| template_error(platform, arch, BuildStep::Package, e))?;
        run_step(
            platform,
            arch,
            BuildStep::Package,
            &argv,
            std::iter::empty::<(&str, &str)>(),
            &out_dir,
        )
        .await?;
        ensure_exists(platform, arch, BuildStep::Package, &emitted).await?;

        // (b) sign / notarize
        match request.credentials.for_platform(platform) {
            CredentialState::Complete(credentials) => {
                let sign = commands.sign.as_ref().ok_or_else(|| BuildError::InvalidCredentials {
                    platform,
                    arch,
                    reason: "credentials are set but no sign command is configured".to_string(),
                })?;
                let argv = render_args(sign, &vars)
                    .map_err(|e| template_error(platform, arch, BuildStep::Sign, e))?;
                run_step(platform, arch, BuildStep::Sign, &argv, credentials.env_vars(), &out_dir)
                    .await?;
                ensure_exists(platform, arch, BuildStep::Sign, &emitted).await?;
            }
            CredentialState::Incomplete { missing } => {
                return Err(BuildError::InvalidCredentials {
                    platform,
                    arch,
                    reason: format!("missing or empty: {}", missing.join(", ")),
                });
            }
            CredentialState::Absent => {
                log::warn!("No signing credentials for {}; {} stays unsigned", platform, emitted_name);
            }
        }

        // (c) normalize
        let canonical = out_dir.join(&canonical_name);
        if canonical != emitted {
            log::debug!("Renaming {} -> {}", emitted_name, canonical_name);
            tokio::fs::rename(&emitted, &canonical).await.map_err(|e| {
                toolchain_error(platform, arch, BuildStep::Normalize, format!(
                    "rename {} -> {} failed: {}",
                    emitted_name, canonical_name, e
                ))
            })?;
        }

        let metadata = tokio::fs::metadata(&canonical).await.map_err(|_| BuildError::ArtifactMissing {
            platform,
            arch,
            step: BuildStep::Normalize,
            path: canonical.clone(),
        })?;

        Ok(ArtifactRef::new(canonical_name, canonical, metadata.len()))
    }
}

impl PlatformBuilder for CommandBuilder {
    async fn build(
        &self,
        target: BuildTarget,
        request: BuildRequest,
    ) -> Result<Vec<ArtifactRef>, BuildError> {
        let platform = target.platform();
        let mut artifacts = Vec::with_capacity(target.architectures().len());

        for &arch in target.architectures() {
            let commands = self.commands.get(&platform).ok_or_else(|| {
                toolchain_error(platform, arch, BuildStep::Package, "no package command configured".to_string())
            })?;

            log::info!("Building {} {} ({})", platform, arch, request.version);
            let artifact = self.build_arch(platform, arch, commands, &request).await?;
            log::info!("✓ {} ({} bytes)", artifact.file_name(), artifact.size_bytes());
            artifacts.push(artifact);
        }

        Ok(artifacts)
    }
}

fn toolchain_error(platform: Platform, arch: Arch, step: BuildStep, reason: String) -> BuildError {
    BuildError::Toolchain {
        platform,
        arch,
        step,
        reason,
    }
}

fn template_error(platform: Platform, arch: Arch, step: BuildStep, err: RenderError) -> BuildError {
    toolchain_error(platform, arch, step, format!("cannot render command template: {}", err))
}

fn missing_rule(platform: Platform, arch: Arch) -> BuildError {
    toolchain_error(
        platform,
        arch,
        BuildStep::Normalize,
        "no naming rule for this platform/architecture".to_string(),
    )
}

async fn ensure_exists(
    platform: Platform,
    arch: Arch,
    step: BuildStep,
    path: &Path,
) -> Result<(), BuildError> {
    match tokio::fs::metadata(path).await {
        Ok(m) if m.is_file() => Ok(()),
        _ => Err(BuildError::ArtifactMissing {
            platform,
            arch,
            step,
            path: path.to_path_buf(),
        }),
    }
}

/// Run one toolchain command to completion.
///
/// The child is killed if this future is dropped, which is how the
/// coordinator's wall-clock limit reaches external processes.
async fn run_step<'a>(
    platform: Platform,
    arch: Arch,
    step: BuildStep,
    argv: &[String],
    env: impl Iterator<Item = (&'a str, &'a str)>,
    working_dir: &Path,
) -> Result<(), BuildError> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| toolchain_error(platform, arch, step, "empty command".to_string()))?;

    log::debug!("[{} {}] {} {}", platform, arch, program, args.join(" "));

    let output = tokio::process::Command::new(program)
        .args(args)
        .envs(env)
        .current_dir(working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| toolchain_error(platform, arch, step, format!("failed to run {}: {}", program, e)))?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.trim().is_empty() {
        log::debug!("[{} {}] {} stdout:\n{}", platform, arch, step, stdout.trim_end());
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        return Err(toolchain_error(
            platform,
            arch,
            step,
            format!("{} exited with {:?}\n{}", program, output.status.code(), tail),
        ));
    }

    Ok(())
}
