//! HTTP plumbing shared by the provider implementations.

use std::time::Duration;

use anyhow::Context;

use sheetsmith_core::error::ProviderError;
use sheetsmith_core::model::DataUri;

/// Build a reqwest client with a whole-request timeout.
pub(crate) fn build_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

/// Classify a transport-level failure.
pub(crate) fn send_error(e: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}

/// Turn non-success HTTP statuses into `ProviderError`s.
///
/// `error_message` pulls a human-readable message out of the provider's
/// error body; the raw body is used when it returns `None`.
pub(crate) async fn check_status(
    response: reqwest::Response,
    model: &str,
    error_message: fn(&str) -> Option<String>,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }

    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5)
            * 1000;
        return Err(ProviderError::RateLimited {
            retry_after_ms: retry_after,
        });
    }

    let body = response.text().await.unwrap_or_default();
    let message = error_message(&body).unwrap_or(body);
    match status {
        401 | 403 => Err(ProviderError::AuthenticationFailed(message)),
        404 => Err(ProviderError::ModelNotFound(model.to_string())),
        _ => Err(ProviderError::ApiError { status, message }),
    }
}

/// Split an attached image into MIME type and base64 payload.
pub(crate) fn image_parts(uri: &str) -> Result<DataUri<'_>, ProviderError> {
    DataUri::parse(uri).map_err(ProviderError::InvalidRequest)
}

/// Parse a successful response body, reporting unexpected shapes as API errors.
pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    response.json().await.map_err(|e| ProviderError::ApiError {
        status: 0,
        message: format!("failed to parse response: {e}"),
    })
}
