//! GitHub integration for stable releases

mod release_manager;

pub use release_manager::GitHubReleaseManager;
