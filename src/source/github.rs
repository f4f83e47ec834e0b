//! GitHub as the source repository.
//!
//! Snapshots come from the zipball endpoint
//! (`/repos/{owner}/{repo}/zipball/{ref}`), which answers with a redirect
//! to the archive host; the [`ContentFetcher`] follows it with the token
//! attached.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

use super::{DownloadLocator, RepoSlug, SourceIdentity, SourceRepository};
use crate::constants::{CREDENTIAL_CHECK_TIMEOUT, user_agent};
use crate::core::RppError;
use crate::fetch::{ContentFetcher, body_snippet};

/// Public GitHub REST API.
pub const GITHUB_API_BASE: &str = "https://api.github.com";

const API_VERSION_HEADER: &str = "x-github-api-version";
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

/// GitHub-backed [`SourceRepository`].
#[derive(Debug, Clone)]
pub struct GitHubSource {
    token: Option<String>,
    api_base: String,
    client: Client,
    fetcher: ContentFetcher,
    check_timeout: Duration,
}

impl GitHubSource {
    /// Create a source using `token` (blank tokens count as missing).
    pub fn new(token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            token: token.filter(|t| !t.trim().is_empty()),
            api_base: GITHUB_API_BASE.to_string(),
            client,
            fetcher: ContentFetcher::new()?,
            check_timeout: CREDENTIAL_CHECK_TIMEOUT,
        })
    }

    /// Point the source at a different API host.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the deadline of [`validate_credential`](SourceRepository::validate_credential).
    #[must_use]
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    /// `{api}/repos/{owner}/{repo}/zipball/{ref}` with every ref segment percent-encoded.
    fn zipball_url(&self, slug: &RepoSlug, branch: &str) -> Result<String> {
        let mut url = Url::parse(&self.api_base).map_err(|e| RppError::ConfigError {
            message: format!("Invalid GitHub API base {}: {e}", self.api_base),
        })?;
        url.path_segments_mut()
            .map_err(|()| RppError::ConfigError {
                message: format!("GitHub API base {} cannot carry a path", self.api_base),
            })?
            .pop_if_empty()
            .extend(["repos", slug.owner.as_str(), slug.name.as_str(), "zipball"])
            .extend(branch.split('/'));
        Ok(url.into())
    }

    fn headers(&self) -> Result<HeaderMap> {
        let token = self.token.as_deref().ok_or_else(|| RppError::PreconditionMissing {
            what: "GitHub token".to_string(),
            hint: "rpp github <token>".to_string(),
        })?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", token.trim()))
            .context("GitHub token contains invalid characters")?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github+json"));
        headers.insert(API_VERSION_HEADER, HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }

    async fn fetch_user(&self) -> Result<SourceIdentity> {
        let response = self
            .client
            .get(format!("{}/user", self.api_base))
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| RppError::TransferFailure {
                operation: "GitHub credential check".to_string(),
                status: None,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(RppError::AuthFailure {
                service: "GitHub".to_string(),
                reason: format!("HTTP {}: {}", status.as_u16(), body_snippet(response).await),
            }
            .into());
        }
        if !status.is_success() {
            return Err(RppError::TransferFailure {
                operation: "GitHub credential check".to_string(),
                status: Some(status.as_u16()),
                reason: body_snippet(response).await,
            }
            .into());
        }

        let user: UserResponse =
            response.json().await.context("Unexpected response from GitHub /user")?;
        Ok(SourceIdentity {
            login: user.login,
        })
    }
}

#[async_trait]
impl SourceRepository for GitHubSource {
    fn provider(&self) -> &str {
        "GitHub"
    }

    fn has_credential(&self) -> bool {
        self.token.is_some()
    }

    async fn validate_credential(&self) -> Result<SourceIdentity> {
        let identity = tokio::time::timeout(self.check_timeout, self.fetch_user())
            .await
            .map_err(|_| RppError::TimedOut {
                operation: "GitHub credential check".to_string(),
                seconds: self.check_timeout.as_secs(),
            })??;
        info!("GitHub token belongs to {}", identity.login);
        Ok(identity)
    }

    fn resolve_download_locator(&self, repository: &str, branch: &str) -> Result<DownloadLocator> {
        let slug = RepoSlug::parse(repository)?;
        let branch = branch.trim();
        if branch.is_empty() {
            return Err(RppError::ParseFailure {
                input: format!("{repository} (empty branch)"),
            }
            .into());
        }
        let url = self.zipball_url(&slug, branch)?;
        debug!("Resolved {} @ {} to {}", slug, branch, url);
        Ok(DownloadLocator {
            slug,
            branch: branch.to_string(),
            url,
        })
    }

    async fn download(&self, locator: &DownloadLocator, destination: &Path) -> Result<u64> {
        let headers = self.headers()?;
        self.fetcher.fetch(&locator.url, &headers, destination).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(server: &MockServer, token: Option<&str>) -> GitHubSource {
        GitHubSource::new(token.map(str::to_string)).unwrap().with_api_base(server.uri())
    }

    #[tokio::test]
    async fn test_blank_token_is_missing() {
        let source = GitHubSource::new(Some("  ".to_string())).unwrap();
        assert!(!source.has_credential());
        assert!(GitHubSource::new(Some("ghp_x".to_string())).unwrap().has_credential());
    }

    #[tokio::test]
    async fn test_validate_credential_returns_login() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer ghp_ok"))
            .and(header("x-github-api-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "login": "octocat",
                "id": 1
            })))
            .mount(&server)
            .await;

        let identity = source(&server, Some("ghp_ok")).validate_credential().await.unwrap();
        assert_eq!(identity.login, "octocat");
    }

    #[tokio::test]
    async fn test_rejected_token_is_auth_failure() {
        let server = MockServer::start().await;
        Mock::given(path("/user"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Bad credentials"))
            .mount(&server)
            .await;

        let err = source(&server, Some("ghp_bad")).validate_credential().await.unwrap_err();
        assert!(matches!(err.downcast_ref::<RppError>(), Some(RppError::AuthFailure { .. })));
    }

    #[tokio::test]
    async fn test_slow_check_times_out() {
        let server = MockServer::start().await;
        Mock::given(path("/user"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"login": "slow"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = source(&server, Some("ghp_ok"))
            .with_check_timeout(Duration::from_millis(100))
            .validate_credential()
            .await
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<RppError>(), Some(RppError::TimedOut { .. })));
    }

    #[test]
    fn test_resolve_download_locator() {
        let source = GitHubSource::new(Some("t".to_string())).unwrap();
        let locator =
            source.resolve_download_locator("https://github.com/acme/pack.git", "main").unwrap();
        assert_eq!(locator.url, "https://api.github.com/repos/acme/pack/zipball/main");
        assert_eq!(locator.slug.to_string(), "acme/pack");

        let err = source.resolve_download_locator("nonsense", "main").unwrap_err();
        assert!(matches!(err.downcast_ref::<RppError>(), Some(RppError::ParseFailure { .. })));
        assert!(source.resolve_download_locator("acme/pack", " ").is_err());
    }

    #[test]
    fn test_branch_is_encoded_into_the_path() {
        let source = GitHubSource::new(Some("t".to_string())).unwrap();
        let locator = source.resolve_download_locator("acme/pack", "feat#1").unwrap();
        assert_eq!(locator.url, "https://api.github.com/repos/acme/pack/zipball/feat%231");
        assert_eq!(locator.branch, "feat#1");

        let locator = source.resolve_download_locator("acme/pack", "release/1.2?x").unwrap();
        assert_eq!(locator.url, "https://api.github.com/repos/acme/pack/zipball/release/1.2%3Fx");

        let source = source.with_api_base("http://127.0.0.1:8080/");
        let locator = source.resolve_download_locator("acme/pack", "main").unwrap();
        assert_eq!(locator.url, "http://127.0.0.1:8080/repos/acme/pack/zipball/main");
    }

    #[tokio::test]
    async fn test_download_follows_redirect_to_archive_host() {
        let server = MockServer::start().await;
        Mock::given(path("/repos/acme/pack/zipball/main"))
            .respond_with(ResponseTemplate::new(302).insert_header(
                "Location",
                format!("{}/codeload/acme-pack-abc.zip", server.uri()).as_str(),
            ))
            .mount(&server)
            .await;
        Mock::given(path("/codeload/acme-pack-abc.zip"))
            .and(header("authorization", "Bearer ghp_ok"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK\x03\x04".to_vec()))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("download.zip");
        let source = source(&server, Some("ghp_ok"));
        let locator = source.resolve_download_locator("acme/pack", "main").unwrap();
        assert_eq!(source.download(&locator, &dest).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_download_without_token_is_precondition_missing() {
        let temp = TempDir::new().unwrap();
        let source = GitHubSource::new(None).unwrap();
        let locator = source.resolve_download_locator("acme/pack", "main").unwrap();
        let err = source.download(&locator, &temp.path().join("d.zip")).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RppError>(),
            Some(RppError::PreconditionMissing { .. })
        ));
    }
}
