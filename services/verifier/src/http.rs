//! Shared HTTP plumbing for back-end clients.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Serialize};
use tracing::error;

use crate::error::VerifyError;

/// Build a JSON client with a per-request timeout.
pub fn build_client(backend: &'static str, timeout: Duration) -> Result<reqwest::Client, VerifyError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(VerifyError::transport(backend))
}

/// POST a JSON body and decode a JSON response.
pub async fn post_json<B, T>(
    client: &reqwest::Client,
    backend: &'static str,
    url: &str,
    body: &B,
) -> Result<T, VerifyError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(VerifyError::transport(backend))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        error!(backend, status = %status, body = %body, "Back-end request failed");
        return Err(VerifyError::Backend {
            backend,
            status: status.as_u16(),
            body,
        });
    }

    response.json().await.map_err(|e| VerifyError::Decode {
        backend,
        detail: e.to_string(),
    })
}

/// Join a base URL and a path without doubling slashes.
pub fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
