//! Shared HTTP plumbing for the two upstream collaborators.

use cityweather_core::{ReqwestErrorExt, UpstreamConfig, UpstreamError};
use reqwest::{Client, Response};
use url::Url;

/// Build the client both collaborators share.
pub fn build_client(config: &UpstreamConfig) -> Result<Client, UpstreamError> {
    Client::builder()
        .timeout(config.request_timeout())
        .user_agent(config.user_agent.as_str())
        .build()
        .map_err(|e| UpstreamError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Parse a base URL, making sure relative joins append rather than replace
/// the last path segment.
pub fn parse_base_url(raw: &str) -> Result<Url, UpstreamError> {
    let mut url = Url::parse(raw)
        .map_err(|e| UpstreamError::Internal(format!("Invalid upstream URL {}: {}", raw, e)))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Turn a non-success status into an error, keeping the body for context.
pub async fn check_response(response: Response) -> Result<Response, UpstreamError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::debug!("Upstream returned status {}: {}", status, body);
    Err(UpstreamError::from_status(status.as_u16(), body))
}

pub(crate) fn send_error(e: reqwest::Error) -> UpstreamError {
    e.into_upstream_error()
}
