//! GitHub API interaction module
//!
//! The lifecycle engine only sees the [`ReleaseProvider`] capability;
//! [`GitHubProvider`] implements it over the GitHub REST API.

use crate::config::{Settings, DEFAULT_API_URL};
use crate::download::download_file;
use crate::error::{Error, Result};
use crate::package_id::PackageIdentity;
use crate::types::{AssetCandidate, ReleaseRef};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Source of releases for a package. `Ok(None)` means "not found" and is
/// distinct from a transport failure.
#[async_trait]
pub trait ReleaseProvider: Send + Sync {
    async fn latest_release(&self, id: &PackageIdentity) -> Result<Option<ReleaseRef>>;

    async fn release_by_tag(&self, id: &PackageIdentity, tag: &str)
        -> Result<Option<ReleaseRef>>;

    /// Newest first, drafts excluded.
    async fn list_releases(&self, id: &PackageIdentity) -> Result<Vec<ReleaseRef>>;

    async fn latest_prerelease(&self, id: &PackageIdentity) -> Result<Option<ReleaseRef>> {
        Ok(self
            .list_releases(id)
            .await?
            .into_iter()
            .find(|release| release.prerelease))
    }

    /// Fetch `asset` into `dest`.
    async fn download_asset(
        &self,
        asset: &AssetCandidate,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

#[derive(Debug, Clone, Deserialize)]
struct GitHubAsset {
    name: String,
    browser_download_url: String,
    url: String,
    #[serde(default)]
    digest: Option<String>,
}

impl From<GitHubRelease> for ReleaseRef {
    fn from(release: GitHubRelease) -> Self {
        ReleaseRef {
            tag_name: release.tag_name,
            prerelease: release.prerelease,
            assets: release
                .assets
                .into_iter()
                .map(|a| AssetCandidate {
                    name: a.name,
                    browser_download_url: a.browser_download_url,
                    api_url: a.url,
                    digest: a.digest.filter(|d| !d.is_empty()),
                })
                .collect(),
        }
    }
}

pub struct GitHubProvider {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
}

impl GitHubProvider {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout())
            .build()?;
        let api_url = settings.api_url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            api_url,
            token: settings.github_token.clone(),
        })
    }

    fn get(&self, url: &str, accept: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, accept)
            .header(USER_AGENT, concat!("ghpkg/", env!("CARGO_PKG_VERSION")));

        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        request
    }

    /// GET a JSON document; 404 maps to `None`.
    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<Option<T>> {
        tracing::debug!("Fetching GitHub release info from: {}", url);

        let response = self
            .get(url, "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(Error::Transport(format!(
                "GitHub API request failed: {} - {}",
                status, error_text
            )));
        }

        Ok(Some(response.json().await?))
    }
}

pub fn build_release_url(api_url: &str, id: &PackageIdentity, tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("{}/repos/{}/releases/tags/{}", api_url, id, tag),
        None => format!("{}/repos/{}/releases/latest", api_url, id),
    }
}

#[async_trait]
impl ReleaseProvider for GitHubProvider {
    async fn latest_release(&self, id: &PackageIdentity) -> Result<Option<ReleaseRef>> {
        let url = build_release_url(&self.api_url, id, None);
        Ok(self.get_json::<GitHubRelease>(&url).await?.map(Into::into))
    }

    async fn release_by_tag(
        &self,
        id: &PackageIdentity,
        tag: &str,
    ) -> Result<Option<ReleaseRef>> {
        let url = build_release_url(&self.api_url, id, Some(tag));
        Ok(self.get_json::<GitHubRelease>(&url).await?.map(Into::into))
    }

    async fn list_releases(&self, id: &PackageIdentity) -> Result<Vec<ReleaseRef>> {
        let url = format!("{}/repos/{}/releases?per_page=100", self.api_url, id);
        let releases: Vec<GitHubRelease> = self.get_json(&url).await?.unwrap_or_default();
        Ok(releases
            .into_iter()
            .filter(|r| !r.draft)
            .map(Into::into)
            .collect())
    }

    async fn download_asset(
        &self,
        asset: &AssetCandidate,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // Browser URLs ignore auth headers, so private assets go through the API.
        let request = if self.token.is_some() {
            tracing::debug!("Downloading {} via API URL", asset.name);
            self.get(&asset.api_url, "application/octet-stream")
        } else {
            self.get(&asset.browser_download_url, "application/octet-stream")
        };
        download_file(request, dest, cancel).await
    }
}
