//! HTTP submission helpers shared by the executors.

use cibench_core::{Error, Result};
use reqwest::header::HeaderName;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Build a client whose requests all carry `timeout`.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Internal(format!("failed to build HTTP client: {}", e)))
}

/// Send a request, mapping transport failures onto the executor error taxonomy.
pub async fn send(request: RequestBuilder, endpoint: &str) -> Result<Response> {
    request.send().await.map_err(|e| {
        if e.is_timeout() {
            Error::Timeout(endpoint.to_string())
        } else {
            Error::Network(format!("{}: {}", endpoint, e))
        }
    })
}

/// Fail unless the response status is one of `accepted`.
pub fn ensure_status(response: &Response, endpoint: &str, accepted: &[StatusCode]) -> Result<()> {
    let status = response.status();
    if accepted.contains(&status) {
        return Ok(());
    }
    debug!(endpoint, status = status.as_u16(), "Backend returned unexpected status");
    Err(Error::UnexpectedStatus {
        status: status.as_u16(),
        endpoint: endpoint.to_string(),
    })
}

/// Decode a JSON body.
pub async fn read_json<T: DeserializeOwned>(response: Response, endpoint: &str) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("{}: {}", endpoint, e)))
}

/// Read a header that must be present and non-empty.
pub fn required_header(response: &Response, name: &HeaderName) -> Result<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::MissingHeader(name.to_string()))
}

/// Unwrap a response field that must be present and non-empty.
pub fn required_field(value: Option<String>, name: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::MissingField(name.to_string()))
}
