//! Authenticated, redirect-following streamed downloads.
//!
//! Redirects are followed by hand rather than by the HTTP client so the
//! authentication headers travel with every hop (code hosts answer archive
//! requests with a redirect to a separate download host). The body is
//! streamed straight to disk.

use std::path::Path;

use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Client, Response, StatusCode, Url, redirect};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::constants::{ERROR_BODY_SNIPPET_LEN, MAX_REDIRECTS, user_agent};
use crate::core::RppError;

/// Streams a remote resource into a local file.
#[derive(Debug, Clone)]
pub struct ContentFetcher {
    client: Client,
    max_redirects: usize,
}

impl ContentFetcher {
    /// Create a fetcher with the default redirect cap.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent())
            .redirect(redirect::Policy::none())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            max_redirects: MAX_REDIRECTS,
        })
    }

    /// Override the number of redirects followed before giving up.
    #[must_use]
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    /// GET `url` with `headers` on every hop and write the body to `destination`.
    ///
    /// Returns the number of bytes written. A partially written file is
    /// removed when the transfer fails.
    pub async fn fetch(&self, url: &str, headers: &HeaderMap, destination: &Path) -> Result<u64> {
        let mut current = Url::parse(url).map_err(|e| RppError::TransferFailure {
            operation: "download".to_string(),
            status: None,
            reason: format!("invalid URL '{url}': {e}"),
        })?;

        for hop in 0..=self.max_redirects {
            let response = self
                .client
                .get(current.clone())
                .headers(headers.clone())
                .send()
                .await
                .map_err(|e| transfer_error(None, e.to_string()))?;

            let status = response.status();
            if !status.is_redirection() {
                let response = check_status(response).await?;
                return stream_to_file(response, destination).await;
            }

            if hop == self.max_redirects {
                break;
            }

            let location = response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    let reason = format!("redirect from {current} without Location");
                    transfer_error(Some(status), reason)
                })?;
            let next = current.join(location).map_err(|e| {
                transfer_error(Some(status), format!("bad redirect target '{location}': {e}"))
            })?;
            debug!("Following redirect {} ({}) -> {}", hop + 1, status.as_u16(), next);
            current = next;
        }

        Err(RppError::RedirectLoop {
            url: url.to_string(),
            hops: self.max_redirects,
        }
        .into())
    }
}

/// Map a terminal non-2xx response to its typed error.
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = response.url().to_string();
    let body = body_snippet(response).await;
    let error = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RppError::Unauthorized {
            url,
            status: status.as_u16(),
            body,
        },
        StatusCode::NOT_FOUND => RppError::NotFound { url, body },
        _ => transfer_error(Some(status), format!("HTTP {status} from {url}: {body}")),
    };
    Err(error.into())
}

/// Read at most [`ERROR_BODY_SNIPPET_LEN`] bytes of the body for diagnostics.
///
/// The rest of the body is never downloaded.
pub(crate) async fn body_snippet(response: Response) -> String {
    let mut collected = Vec::with_capacity(ERROR_BODY_SNIPPET_LEN);
    let mut stream = response.bytes_stream();
    while collected.len() < ERROR_BODY_SNIPPET_LEN {
        let Some(Ok(chunk)) = stream.next().await else {
            break;
        };
        let wanted = (ERROR_BODY_SNIPPET_LEN - collected.len()).min(chunk.len());
        collected.extend_from_slice(&chunk[..wanted]);
    }
    let text = String::from_utf8_lossy(&collected);
    truncate_at_char_boundary(text.trim(), ERROR_BODY_SNIPPET_LEN).to_string()
}

fn truncate_at_char_boundary(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn transfer_error(status: Option<StatusCode>, reason: String) -> RppError {
    RppError::TransferFailure {
        operation: "download".to_string(),
        status: status.map(|s| s.as_u16()),
        reason,
    }
}

async fn stream_to_file(response: Response, destination: &Path) -> Result<u64> {
    let result = write_body(response, destination).await;
    if result.is_err()
        && let Err(e) = tokio::fs::remove_file(destination).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!("Failed to remove partial download {}: {}", destination.display(), e);
    }
    result
}

async fn write_body(response: Response, destination: &Path) -> Result<u64> {
    let mut file = File::create(destination)
        .await
        .with_context(|| format!("Failed to create {}", destination.display()))?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| transfer_error(None, format!("body stream: {e}")))?;
        file.write_all(&chunk)
            .await
            .with_context(|| format!("Failed to write {}", destination.display()))?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    debug!("Downloaded {} bytes to {}", written, destination.display());
    Ok(written)
}
