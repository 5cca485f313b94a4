//! GitHub Release management over the REST API

use crate::config::GitHubConfig;
use crate::error::{CliError, PublishError, ReleaseError, Result};
use crate::publish::{CreatedRelease, DraftRelease, ReleaseAsset, ReleaseHost, UploadedAsset};
use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

const API_VERSION: &str = "2022-11-28";

/// Request body of `POST /repos/{owner}/{repo}/releases`
#[derive(Debug, Serialize)]
struct CreateReleaseRequest<'a> {
    tag_name: &'a str,
    target_commitish: &'a str,
    name: &'a str,
    body: &'a str,
    draft: bool,
    prerelease: bool,
}

#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    id: u64,
    html_url: String,
    #[serde(default)]
    draft: bool,
}

#[derive(Debug, Deserialize)]
struct AssetResponse {
    name: String,
    size: u64,
    browser_download_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// GitHub release manager
pub struct GitHubReleaseManager {
    /// HTTP client carrying the auth headers
    client: reqwest::Client,
    owner: String,
    repo: String,
    api_url: String,
    upload_url: String,
}

impl GitHubReleaseManager {
    /// Create new GitHub release manager
    pub fn new(config: &GitHubConfig, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim())).map_err(|_| {
            ReleaseError::Cli(CliError::InvalidArguments {
                reason: "GitHub token contains characters not allowed in a header".to_string(),
            })
        })?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert("x-github-api-version", HeaderValue::from_static(API_VERSION));

        let client = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .map_err(|e| {
                ReleaseError::Cli(CliError::ExecutionFailed {
                    command: "github_client_init".to_string(),
                    reason: e.to_string(),
                })
            })?;

        Ok(Self {
            client,
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            upload_url: config.upload_url.trim_end_matches('/').to_string(),
        })
    }

    fn repo_url(&self) -> String {
        format!("{}/repos/{}/{}", self.api_url, self.owner, self.repo)
    }

    fn release_url(&self, release_id: u64) -> String {
        format!("{}/releases/{}", self.repo_url(), release_id)
    }

    /// Test GitHub API connection and authentication
    ///
    /// Reads the repository with the configured token. Called before any
    /// release is created so a bad token fails fast.
    ///
    /// # Returns
    /// - `Ok(true)` - repository readable with this token
    /// - `Ok(false)` - token rejected
    /// - `Err(_)` - network failure or unexpected status
    pub async fn test_connection(&self) -> std::result::Result<bool, PublishError> {
        let response = self
            .client
            .get(self.repo_url())
            .send()
            .await
            .map_err(|e| PublishError::Authentication {
                reason: format!("cannot reach {}: {}", self.api_url, e),
            })?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(false),
            other => Err(PublishError::Authentication {
                reason: format!("unexpected status {} from {}", other, self.repo_url()),
            }),
        }
    }
}

impl ReleaseHost for GitHubReleaseManager {
    async fn verify_access(&self) -> std::result::Result<(), PublishError> {
        if self.test_connection().await? {
            Ok(())
        } else {
            Err(PublishError::Authentication {
                reason: format!("token cannot access {}/{}", self.owner, self.repo),
            })
        }
    }

    async fn create_draft_release(
        &self,
        draft: &DraftRelease,
    ) -> std::result::Result<CreatedRelease, PublishError> {
        let creation_error = |reason: String| PublishError::ReleaseCreation {
            tag: draft.tag.clone(),
            reason,
        };

        let request = CreateReleaseRequest {
            tag_name: &draft.tag,
            target_commitish: &draft.target_commitish,
            name: &draft.name,
            body: &draft.body,
            draft: draft.draft,
            prerelease: draft.prerelease,
        };

        let response = self
            .client
            .post(format!("{}/releases", self.repo_url()))
            .json(&request)
            .send()
            .await
            .map_err(|e| creation_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PublishError::Authentication { reason: message },
                _ => creation_error(format!("{}: {}", status, message)),
            });
        }

        let release: ReleaseResponse = response
            .json()
            .await
            .map_err(|e| creation_error(format!("unreadable response: {}", e)))?;

        Ok(CreatedRelease {
            id: release.id,
            html_url: release.html_url,
            draft: release.draft,
        })
    }

    async fn upload_asset(
        &self,
        release: &CreatedRelease,
        asset: &ReleaseAsset,
    ) -> std::result::Result<UploadedAsset, PublishError> {
        let upload_error = |reason: String| PublishError::AssetUpload {
            file_name: asset.file_name.clone(),
            reason,
        };

        let content = tokio::fs::read(&asset.path)
            .await
            .map_err(|e| upload_error(format!("cannot read {}: {}", asset.path.display(), e)))?;

        let response = self
            .client
            .post(format!(
                "{}/repos/{}/{}/releases/{}/assets",
                self.upload_url, self.owner, self.repo, release.id
            ))
            .query(&[("name", asset.file_name.as_str()), ("label", asset.label.as_str())])
            .header(CONTENT_TYPE, asset.content_type)
            .body(Bytes::from(content))
            .send()
            .await
            .map_err(|e| upload_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PublishError::Authentication { reason: message },
                _ => upload_error(format!("{}: {}", status, message)),
            });
        }

        let uploaded: AssetResponse = response
            .json()
            .await
            .map_err(|e| upload_error(format!("unreadable response: {}", e)))?;

        Ok(UploadedAsset {
            file_name: uploaded.name,
            size: uploaded.size,
            download_url: uploaded.browser_download_url,
        })
    }

    /// Delete a release (used to discard a partially uploaded draft)
    async fn delete_release(&self, release: &CreatedRelease) -> std::result::Result<(), PublishError> {
        let deletion_error = |reason: String| PublishError::ReleaseDeletion {
            id: release.id,
            reason,
        };

        let response = self
            .client
            .delete(self.release_url(release.id))
            .send()
            .await
            .map_err(|e| deletion_error(e.to_string()))?;

        let status = response.status();
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                log::debug!("Release {} is already gone", release.id);
                Ok(())
            }
            _ => {
                let message = error_message(response).await;
                Err(deletion_error(format!("{}: {}", status, message)))
            }
        }
    }
}

/// GitHub's `message` field, or the raw body when it is not JSON
async fn error_message(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorResponse>(&text)
        .map(|e| e.message)
        .unwrap_or(text)
}
