//! HTTP plumbing shared by the provider adapters.
//!
//! Status classification:
//! - 401/403 → `ProviderAuth`
//! - 429 → `ProviderRateLimited`, with `Retry-After` seconds when present
//! - 5xx, connect and timeout errors → `ProviderUnavailable`
//! - other 4xx → `InvalidInput`
//! - undecodable bodies → `ProviderUnavailable`

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::domain::errors::{GatewayError, GatewayResult};
use crate::domain::models::first_non_finite;

/// Longest response body excerpt carried in an error message.
const MAX_ERROR_BODY: usize = 512;

pub(crate) fn build_client(timeout_ms: u64) -> GatewayResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| GatewayError::InvalidInput(format!("failed to build HTTP client: {e}")))
}

/// Send `request` and decode a JSON body, classifying every failure.
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: &str,
    request: RequestBuilder,
) -> GatewayResult<T> {
    let response = request
        .send()
        .await
        .map_err(|e| classify_transport_error(provider, &e))?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(response.headers());
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unable to read response body".to_string());
        return Err(classify_status(provider, status, retry_after, &body));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| classify_transport_error(provider, &e))?;
    serde_json::from_slice(&bytes).map_err(|e| {
        GatewayError::unavailable(provider, format!("undecodable response body: {e}"))
    })
}

pub(crate) fn classify_status(
    provider: &str,
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> GatewayError {
    let excerpt: String = body.chars().take(MAX_ERROR_BODY).collect();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::ProviderAuth {
            provider: provider.to_string(),
            message: format!("{status}: {excerpt}"),
        },
        StatusCode::TOO_MANY_REQUESTS => GatewayError::ProviderRateLimited {
            provider: provider.to_string(),
            retry_after,
        },
        s if s.is_server_error() => GatewayError::unavailable(provider, format!("{status}: {excerpt}")),
        s if s.is_client_error() => {
            GatewayError::InvalidInput(format!("{provider} rejected request with {status}: {excerpt}"))
        }
        _ => GatewayError::unavailable(provider, format!("unexpected status {status}")),
    }
}

pub(crate) fn classify_transport_error(provider: &str, err: &reqwest::Error) -> GatewayError {
    let message = if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("request failed: {err}")
    };
    GatewayError::unavailable(provider, message)
}

/// `Retry-After` in delta-seconds form.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Reject empty vectors, non-finite components and unexpected lengths.
pub(crate) fn check_vector(
    provider: &str,
    expected: Option<usize>,
    vector: &[f32],
) -> GatewayResult<()> {
    if vector.is_empty() {
        return Err(GatewayError::unavailable(provider, "empty embedding in response"));
    }
    if let Some(position) = first_non_finite(vector) {
        return Err(GatewayError::unavailable(
            provider,
            format!("embedding component {position} is not a finite number"),
        ));
    }
    match expected {
        Some(expected) if expected != vector.len() => Err(GatewayError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        _ => Ok(()),
    }
}
