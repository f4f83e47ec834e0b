//! Dropbox HTTP API backend.
//!
//! Authentication uses the offline OAuth flow: the user authorizes the app
//! once, the authorization code is exchanged for a long-lived refresh token,
//! and short-lived access tokens are minted from it on demand.
//!
//! RPC endpoints live on `api.dropboxapi.com`, uploads on
//! `content.dropboxapi.com`. Endpoint errors come back as `409` with an
//! `error_summary` such as `path/not_found/..` or
//! `shared_link_already_exists/..`, which are mapped to
//! [`RppError::RemoteNotFound`] and [`RppError::PublishConflict`].

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::debug;

use super::{FolderPage, RemoteEntry, StorageBackend};
use crate::config::DropboxCredentials;
use crate::constants::user_agent;
use crate::core::RppError;
use crate::fetch::body_snippet;

pub const DROPBOX_API_BASE: &str = "https://api.dropboxapi.com";
pub const DROPBOX_CONTENT_BASE: &str = "https://content.dropboxapi.com";
pub const DROPBOX_AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";

const API_ARG_HEADER: &str = "Dropbox-API-Arg";

/// URL the user opens to authorize the app and receive a code.
pub fn authorize_url(app_key: &str) -> String {
    format!(
        "{DROPBOX_AUTHORIZE_URL}?client_id={}&response_type=code&token_access_type=offline",
        app_key.trim()
    )
}

/// Exchange an authorization code for a refresh token.
pub async fn exchange_code(
    api_base: &str,
    app_key: &str,
    app_secret: &str,
    code: &str,
) -> Result<String> {
    #[derive(Deserialize)]
    struct CodeResponse {
        refresh_token: Option<String>,
    }

    let client = http_client()?;
    let response = client
        .post(format!("{}/oauth2/token", api_base.trim_end_matches('/')))
        .basic_auth(app_key.trim(), Some(app_secret.trim()))
        .form(&[("code", code.trim()), ("grant_type", "authorization_code")])
        .send()
        .await
        .map_err(|e| transport_error("authorization code exchange", e))?;

    let response = check_auth_response(response).await?;
    let body: CodeResponse =
        response.json().await.context("Unexpected response from Dropbox /oauth2/token")?;
    body.refresh_token.ok_or_else(|| {
        RppError::AuthFailure {
            service: "Dropbox".to_string(),
            reason: "no refresh token returned; was the app authorized for offline access?"
                .to_string(),
        }
        .into()
    })
}

fn http_client() -> Result<Client> {
    Client::builder().user_agent(user_agent()).build().context("Failed to build HTTP client")
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ListFolderResponse {
    entries: Vec<MetadataEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
struct MetadataEntry {
    #[serde(default)]
    path_lower: Option<String>,
    #[serde(default)]
    path_display: Option<String>,
    name: String,
}

#[derive(Debug, Deserialize)]
struct SharedLinkResponse {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ListLinksResponse {
    links: Vec<SharedLinkResponse>,
}

#[derive(Debug, Deserialize)]
struct AccountResponse {
    name: AccountName,
}

#[derive(Debug, Deserialize)]
struct AccountName {
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    error_summary: String,
}

/// [`StorageBackend`] over the Dropbox v2 HTTP API.
#[derive(Debug)]
pub struct DropboxBackend {
    credentials: DropboxCredentials,
    api_base: String,
    content_base: String,
    client: Client,
    access_token: Mutex<Option<String>>,
}

impl DropboxBackend {
    pub fn new(credentials: DropboxCredentials) -> Result<Self> {
        Ok(Self {
            credentials,
            api_base: DROPBOX_API_BASE.to_string(),
            content_base: DROPBOX_CONTENT_BASE.to_string(),
            client: http_client()?,
            access_token: Mutex::new(None),
        })
    }

    /// Point the RPC and content endpoints at other hosts.
    #[must_use]
    pub fn with_base_urls(mut self, api_base: &str, content_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.content_base = content_base.trim_end_matches('/').to_string();
        self
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.access_token.lock().await;
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let (Some(key), Some(secret), Some(refresh)) = (
            self.credentials.app_key.as_deref(),
            self.credentials.app_secret.as_deref(),
            self.credentials.refresh_token.as_deref(),
        ) else {
            return Err(RppError::PreconditionMissing {
                what: "Dropbox credentials".to_string(),
                hint: "rpp dropbox <appKey> <appSecret>".to_string(),
            }
            .into());
        };

        let response = self
            .client
            .post(format!("{}/oauth2/token", self.api_base))
            .basic_auth(key.trim(), Some(secret.trim()))
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh.trim())])
            .send()
            .await
            .map_err(|e| transport_error("access token refresh", e))?;

        let response = check_auth_response(response).await?;
        let body: TokenResponse =
            response.json().await.context("Unexpected response from Dropbox /oauth2/token")?;
        debug!("Minted Dropbox access token");
        *cached = Some(body.access_token.clone());
        Ok(body.access_token)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        Ok(request.bearer_auth(self.access_token().await?))
    }

    async fn rpc<T: DeserializeOwned>(&self, endpoint: &str, arg: Value, path: &str) -> Result<T> {
        let request = self
            .authorized(self.client.post(format!("{}/2/{}", self.api_base, endpoint)))
            .await?
            .json(&arg);
        let response = request.send().await.map_err(|e| transport_error(endpoint, e))?;
        let response = check_api_response(response, endpoint, path).await?;
        response
            .json()
            .await
            .with_context(|| format!("Unexpected response from Dropbox {endpoint}"))
    }
}

#[async_trait]
impl StorageBackend for DropboxBackend {
    fn provider(&self) -> &str {
        "Dropbox"
    }

    fn has_credential(&self) -> bool {
        self.credentials.is_complete()
    }

    async fn account_name(&self) -> Result<String> {
        let request = self
            .authorized(self.client.post(format!("{}/2/users/get_current_account", self.api_base)))
            .await?
            .header(CONTENT_TYPE, "application/json")
            .body("null");
        let response =
            request.send().await.map_err(|e| transport_error("users/get_current_account", e))?;
        let response = check_api_response(response, "users/get_current_account", "").await?;
        let account: AccountResponse =
            response.json().await.context("Unexpected account response")?;
        Ok(account.name.display_name)
    }

    async fn list_folder(&self, path: &str) -> Result<FolderPage> {
        let body: ListFolderResponse = self
            .rpc("files/list_folder", json!({ "path": path, "recursive": false }), path)
            .await?;
        Ok(folder_page(body))
    }

    async fn list_folder_continue(&self, cursor: &str) -> Result<FolderPage> {
        let body: ListFolderResponse =
            self.rpc("files/list_folder/continue", json!({ "cursor": cursor }), "").await?;
        Ok(folder_page(body))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let _: Value = self.rpc("files/delete_v2", json!({ "path": path }), path).await?;
        Ok(())
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        let file = tokio::fs::File::open(local)
            .await
            .with_context(|| format!("Failed to open {}", local.display()))?;
        let len = file.metadata().await?.len();

        let arg = json!({
            "path": remote,
            "mode": "overwrite",
            "autorename": false,
            "mute": true,
        });
        let arg = HeaderValue::from_str(&header_safe_json(&arg))
            .context("Upload path cannot be sent as a header")?;

        let request = self
            .authorized(self.client.post(format!("{}/2/files/upload", self.content_base)))
            .await?
            .header(API_ARG_HEADER, arg)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(reqwest::header::CONTENT_LENGTH, len)
            .body(reqwest::Body::from(file));

        let response = request.send().await.map_err(|e| transport_error("files/upload", e))?;
        check_api_response(response, "files/upload", remote).await?;
        debug!("Uploaded {} bytes to Dropbox {}", len, remote);
        Ok(())
    }

    async fn create_shared_link(&self, remote: &str) -> Result<String> {
        let body: SharedLinkResponse = self
            .rpc(
                "sharing/create_shared_link_with_settings",
                json!({ "path": remote, "settings": {} }),
                remote,
            )
            .await?;
        Ok(body.url)
    }

    async fn list_direct_links(&self, remote: &str) -> Result<Vec<String>> {
        let body: ListLinksResponse = self
            .rpc(
                "sharing/list_shared_links",
                json!({ "path": remote, "direct_only": true }),
                remote,
            )
            .await?;
        Ok(body.links.into_iter().map(|l| l.url).collect())
    }
}

fn folder_page(body: ListFolderResponse) -> FolderPage {
    FolderPage {
        entries: body
            .entries
            .into_iter()
            .map(|e| RemoteEntry {
                path: e.path_lower.or(e.path_display).unwrap_or(e.name),
            })
            .collect(),
        cursor: body.cursor,
        has_more: body.has_more,
    }
}

/// JSON for the `Dropbox-API-Arg` header: non-ASCII escaped as `\uXXXX`.
fn header_safe_json(value: &Value) -> String {
    let raw = value.to_string();
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{unit:04x}"));
            }
        }
    }
    out
}

fn transport_error(operation: &str, error: reqwest::Error) -> anyhow::Error {
    RppError::TransferFailure {
        operation: format!("Dropbox {operation}"),
        status: None,
        reason: error.to_string(),
    }
    .into()
}

async fn check_auth_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = body_snippet(response).await;
    if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
        return Err(RppError::AuthFailure {
            service: "Dropbox".to_string(),
            reason: body,
        }
        .into());
    }
    Err(RppError::TransferFailure {
        operation: "Dropbox OAuth".to_string(),
        status: Some(status.as_u16()),
        reason: body,
    }
    .into())
}

async fn check_api_response(response: Response, endpoint: &str, path: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = body_snippet(response).await;

    let error = match status {
        StatusCode::UNAUTHORIZED => RppError::AuthFailure {
            service: "Dropbox".to_string(),
            reason: body,
        },
        StatusCode::CONFLICT => {
            let summary = serde_json::from_str::<ApiError>(&body)
                .map(|e| e.error_summary)
                .unwrap_or_else(|_| body.clone());
            if summary.contains("not_found") {
                RppError::RemoteNotFound {
                    path: path.to_string(),
                }
            } else if summary.starts_with("shared_link_already_exists") {
                RppError::PublishConflict {
                    path: path.to_string(),
                }
            } else {
                RppError::TransferFailure {
                    operation: format!("Dropbox {endpoint}"),
                    status: Some(status.as_u16()),
                    reason: summary,
                }
            }
        }
        _ => RppError::TransferFailure {
            operation: format!("Dropbox {endpoint}"),
            status: Some(status.as_u16()),
            reason: body,
        },
    };
    Err(error.into())
}
