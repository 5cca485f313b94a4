//! The release pipeline: resolve, build, aggregate, verify, publish.

mod orchestrator;
mod stage;

pub use orchestrator::{PipelineSettings, ReleaseOrchestrator, ReleaseReport};
pub use stage::{NoopObserver, PipelineFailure, PipelineStage, StageObserver};
