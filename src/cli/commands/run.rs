//! `run`: the full release pipeline.

use super::print_recovery_suggestions;
use crate::build::{CommandBuilder, SigningCredentials};
use crate::cli::args::{OverrideArgs, TriggerArgs};
use crate::cli::observer::ConsoleObserver;
use crate::cli::{Args, RuntimeConfig};
use crate::config::{EnvConfig, PipelineConfig};
use crate::error::{ConfigError, Result};
use crate::github::GitHubReleaseManager;
use crate::pipeline::{PipelineFailure, PipelineSettings, PipelineStage, ReleaseOrchestrator};
use crate::publish::{
    AuxiliaryFiles, ChannelPublishers, LocalMirror, MirrorDestination, NightlyPublisher,
    ReleaseNotes, ReleasePublisher, RsyncTransport,
};
use crate::version::ReleaseChannel;
use chrono::Utc;

/// Fallback token variable provided by CI runners
const CI_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Execute the pipeline; 0 on success, 1 when any stage fails.
pub(super) async fn execute_run(
    args: &Args,
    trigger: &TriggerArgs,
    overrides: &OverrideArgs,
    config: &RuntimeConfig,
) -> Result<i32> {
    let mut pipeline = PipelineConfig::load(&args.config)?;
    overrides.apply(&mut pipeline)?;
    let env = EnvConfig::from_process();
    let context = trigger.to_context()?;
    let now = Utc::now();

    // The channel decides which publisher, and therefore which secrets, are needed
    let channel = match pipeline.resolver().resolve(&context, &pipeline.version, now) {
        Ok(release) => release.channel,
        Err(e) => return Ok(report_failure(config, PipelineFailure::new(PipelineStage::Resolving, e))),
    };

    let publishers = match channel {
        ReleaseChannel::Nightly => ChannelPublishers::nightly_only(nightly_publisher(&pipeline, &env)?),
        ReleaseChannel::Stable => ChannelPublishers::release_only(release_publisher(&pipeline, &env)?),
    };

    let credentials = SigningCredentials::from_env(&env, &pipeline.signing_requirements());
    let builder = CommandBuilder::new(pipeline.toolchain_commands(), pipeline.naming_table());
    let settings = PipelineSettings {
        product: pipeline.product.clone(),
        declared_version: pipeline.version.clone(),
        work_dir: pipeline.work_dir(),
        build_timeout: pipeline.build_timeout(),
        targets: pipeline.build_targets(),
    };
    config.verbose_println(&format!(
        "Work directory {}, {}s per build",
        settings.work_dir.display(),
        settings.build_timeout.as_secs()
    ));

    let orchestrator =
        ReleaseOrchestrator::new(settings, pipeline.resolver(), builder, credentials, publishers);
    let observer = ConsoleObserver::new(config);

    match orchestrator.run(&context, now, &observer).await {
        Ok(report) => {
            config.success_println(&format!(
                "Release {} ({}) complete",
                report.release.version, report.release.channel
            ));
            Ok(0)
        }
        Err(failure) => Ok(report_failure(config, failure)),
    }
}

fn report_failure(config: &RuntimeConfig, failure: PipelineFailure) -> i32 {
    config.error_println(&format!("Release failed: {}", failure));
    print_recovery_suggestions(config, &failure.cause);
    1
}

fn nightly_publisher(
    pipeline: &PipelineConfig,
    env: &EnvConfig,
) -> Result<NightlyPublisher<MirrorDestination>> {
    let nightly = pipeline.nightly.as_ref().ok_or_else(|| ConfigError::Invalid {
        reason: "a [nightly] section is required for nightly releases".to_string(),
    })?;

    let transport = match &nightly.local_mirror {
        Some(dir) => MirrorDestination::Local(LocalMirror::new(pipeline.resolve_path(dir))),
        None => {
            let remote = |value: &Option<String>, field: &str| {
                value.clone().ok_or_else(|| ConfigError::Invalid {
                    reason: format!("[nightly] {} is required without local_mirror", field),
                })
            };
            MirrorDestination::Rsync(RsyncTransport::new(
                remote(&nightly.host, "host")?,
                remote(&nightly.user, "user")?,
                nightly.port,
                remote(&nightly.path, "path")?,
                env.require(&nightly.private_key_env)?,
            ))
        }
    };

    let auxiliary = AuxiliaryFiles {
        landing_page: pipeline.resolve_path(&nightly.landing_page),
        preview_image: pipeline.resolve_path(&nightly.preview_image),
        logo: pipeline.resolve_path(&nightly.logo),
    };

    Ok(NightlyPublisher::new(transport, auxiliary))
}

fn release_publisher(
    pipeline: &PipelineConfig,
    env: &EnvConfig,
) -> Result<ReleasePublisher<GitHubReleaseManager>> {
    let github = pipeline.github.as_ref().ok_or_else(|| ConfigError::Invalid {
        reason: "a [github] section is required for stable releases".to_string(),
    })?;

    let token = env
        .first_of(&[github.token_env.as_str(), CI_TOKEN_ENV])
        .ok_or_else(|| ConfigError::MissingSecret {
            name: github.token_env.clone(),
        })?;

    let notes = match &github.notes_file {
        Some(path) => ReleaseNotes::from_file(&pipeline.resolve_path(path), github.notes_policy)?,
        None => ReleaseNotes::new(None, github.notes_policy),
    };

    let host = GitHubReleaseManager::new(github, &token)?;
    Ok(ReleasePublisher::new(host, notes))
}
