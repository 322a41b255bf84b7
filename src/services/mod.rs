//! Clients for the external APIs the assistant depends on.
//!
//! Each client is optional: when its key is missing the caller falls back
//! (rule-based analysis, log-only messaging) or tells the user the feature
//! is unavailable.

pub mod analyzer;
pub mod line;
pub mod ocr;
pub mod speech;

use std::time::Duration;

use crate::config::OUTBOUND_REQUEST_TIMEOUT_SECS;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Unexpected response from {service}: {message}")]
    Response {
        service: &'static str,
        message: String,
    },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),
}

/// Shared outbound HTTP client with a request timeout
pub(crate) fn http_client() -> Result<reqwest::Client, ServiceError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(OUTBOUND_REQUEST_TIMEOUT_SECS))
        .build()?)
}

/// Turn a non-2xx response into `ServiceError::Status`, keeping a bit of the body.
pub(crate) async fn check_status(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        service,
        status: status.as_u16(),
        body: body.chars().take(200).collect(),
    })
}
