//! `plan`: resolve the trigger and show what a run would produce.

use crate::cli::args::{OverrideArgs, TriggerArgs};
use crate::cli::{Args, RuntimeConfig};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::version::ReleaseChannel;
use chrono::Utc;
use serde::Serialize;

/// What a run would build and where it would go.
#[derive(Debug, Serialize)]
struct ReleasePlan {
    channel: ReleaseChannel,
    version: String,
    source_ref: String,
    tag: Option<String>,
    publisher: &'static str,
    destination: Option<String>,
    targets: Vec<PlannedTarget>,
}

#[derive(Debug, Serialize)]
struct PlannedTarget {
    platform: String,
    artifacts: Vec<String>,
}

pub(super) fn execute_plan(
    args: &Args,
    trigger: &TriggerArgs,
    overrides: &OverrideArgs,
    json: bool,
    config: &RuntimeConfig,
) -> Result<i32> {
    let mut pipeline = PipelineConfig::load(&args.config)?;
    overrides.apply(&mut pipeline)?;

    let context = trigger.to_context()?;
    let release = pipeline.resolver().resolve(&context, &pipeline.version, Utc::now())?;
    let naming = pipeline.naming_table();

    let targets = pipeline
        .build_targets()
        .iter()
        .map(|target| PlannedTarget {
            platform: target.platform().display_name().to_string(),
            artifacts: target
                .architectures()
                .iter()
                .filter_map(|&arch| {
                    naming.canonical_name(target.platform(), arch, &pipeline.product, &release.version)
                })
                .collect(),
        })
        .collect();

    let (publisher, destination) = match release.channel {
        ReleaseChannel::Nightly => (
            "nightly mirror",
            pipeline.nightly.as_ref().map(|n| match &n.local_mirror {
                Some(dir) => pipeline.resolve_path(dir).display().to_string(),
                None => format!(
                    "{}@{}:{}",
                    n.user.as_deref().unwrap_or_default(),
                    n.host.as_deref().unwrap_or_default(),
                    n.path.as_deref().unwrap_or_default()
                ),
            }),
        ),
        ReleaseChannel::Stable => (
            "draft release",
            pipeline
                .github
                .as_ref()
                .map(|g| format!("github.com/{}/{}", g.owner, g.repo)),
        ),
    };

    let plan = ReleasePlan {
        channel: release.channel,
        tag: (release.channel == ReleaseChannel::Stable).then(|| release.tag()),
        version: release.version,
        source_ref: release.source_ref,
        publisher,
        destination,
        targets,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(0);
    }

    let output = config.output();
    let _ = output.section("Release plan");
    let _ = output.field("Channel", plan.channel.as_str());
    let _ = output.field("Version", &plan.version);
    let _ = output.field("Source ref", &plan.source_ref);
    if let Some(tag) = &plan.tag {
        let _ = output.field("Tag", tag);
    }
    let _ = output.field("Publisher", plan.publisher);
    match &plan.destination {
        Some(destination) => {
            let _ = output.field("Destination", destination);
        }
        None => config.warning_println(&format!(
            "No destination configured for the {} channel; a run would fail",
            plan.channel
        )),
    }

    for target in &plan.targets {
        let _ = output.section(&target.platform);
        for artifact in &target.artifacts {
            config.indent(artifact);
        }
    }

    Ok(0)
}
