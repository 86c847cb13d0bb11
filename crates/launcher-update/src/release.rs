use async_trait::async_trait;
use log::{debug, trace};
use serde::Deserialize;
use thiserror::Error;

const GITHUB_API_BASE: &str = "https://api.github.com";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Error)]
pub enum ReleaseHostError {
    #[error("failed to query release host: {0}")]
    Request(#[source] reqwest::Error),
    #[error("release host responded with HTTP {status}{body_snippet}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body_snippet: String,
    },
    #[error("failed to parse release host response: {0}")]
    Parse(#[source] reqwest::Error),
}

/// Query surface of a remote release host.
#[async_trait]
pub trait ReleaseHost: Send + Sync {
    /// Up to `per_page` of the most recent releases, newest first.
    async fn list_releases(
        &self,
        owner: &str,
        repo: &str,
        per_page: usize,
    ) -> Result<Vec<Release>, ReleaseHostError>;

    /// The release published under `tag`, or `None` if there is none.
    async fn release_by_tag(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<Option<Release>, ReleaseHostError>;
}

/// GitHub REST API release host.
#[derive(Debug, Clone)]
pub struct GitHubReleaseHost {
    client: reqwest::Client,
    token: Option<String>,
    api_base: String,
}

impl GitHubReleaseHost {
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        debug!("Initialized GitHub release host (no token)");
        Self {
            client,
            token: None,
            api_base: GITHUB_API_BASE.to_string(),
        }
    }

    #[must_use]
    pub fn with_token(client: reqwest::Client, token: impl Into<String>) -> Self {
        debug!("Initialized GitHub release host (with token)");
        Self {
            client,
            token: Some(token.into()),
            api_base: GITHUB_API_BASE.to_string(),
        }
    }

    /// Point the host at a different API root, for GitHub Enterprise installs.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        trace!("Updating release host token");
        self.token = Some(token.into());
    }

    fn releases_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{owner}/{repo}/releases", self.api_base)
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "iw4x-launcher");
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ReleaseHost for GitHubReleaseHost {
    async fn list_releases(
        &self,
        owner: &str,
        repo: &str,
        per_page: usize,
    ) -> Result<Vec<Release>, ReleaseHostError> {
        let url = format!("{}?per_page={per_page}", self.releases_url(owner, repo));
        let response = self
            .get(&url)
            .send()
            .await
            .map_err(ReleaseHostError::Request)?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        response.json().await.map_err(ReleaseHostError::Parse)
    }

    async fn release_by_tag(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<Option<Release>, ReleaseHostError> {
        let url = format!("{}/tags/{tag}", self.releases_url(owner, repo));
        let response = self
            .get(&url)
            .send()
            .await
            .map_err(ReleaseHostError::Request)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        response
            .json()
            .await
            .map(Some)
            .map_err(ReleaseHostError::Parse)
    }
}

async fn status_error(response: reqwest::Response) -> ReleaseHostError {
    let status = response.status();
    let body_snippet = response
        .text()
        .await
        .ok()
        .map(|body| response_snippet(&body, 160))
        .unwrap_or_default();
    ReleaseHostError::HttpStatus {
        status,
        body_snippet,
    }
}

fn response_snippet(body: &str, max_chars: usize) -> String {
    let snippet: String = body.chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}
