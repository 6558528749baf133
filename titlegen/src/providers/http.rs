//! Shared request plumbing: cancellable send, status checks, error text.

use super::ProviderError;
use super::sanitize;
use crate::types::ProviderId;
use reqwest::{RequestBuilder, StatusCode};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Status + full body text of a finished exchange.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

fn transport(provider: ProviderId, err: reqwest::Error) -> ProviderError {
    if err.is_builder() {
        return ProviderError::Config(format!(
            "Invalid request for provider {}: {}",
            provider,
            err.without_url()
        ));
    }
    // URLs may carry the key as a query parameter (Gemini).
    ProviderError::Transport {
        provider,
        source: err.without_url(),
    }
}

/// Send `req` and read the body, aborting as soon as `cancel` fires.
/// Dropping the in-flight future closes the connection.
pub async fn send(
    provider: ProviderId,
    req: RequestBuilder,
    cancel: &CancellationToken,
) -> Result<RawResponse, ProviderError> {
    let exchange = async {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        Ok::<_, reqwest::Error>(RawResponse { status, body })
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ProviderError::Cancelled),
        res = exchange => res.map_err(|e| transport(provider, e)),
    }
}

/// Send without a caller-supplied cancellation signal.
pub async fn send_uncancellable(
    provider: ProviderId,
    req: RequestBuilder,
) -> Result<RawResponse, ProviderError> {
    send(provider, req, &CancellationToken::new()).await
}

/// Pull `error.message` (or a bare `error` / `message` string) out of a JSON body.
pub fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.pointer("/error/message"),
        value.get("error"),
        value.get("message"),
    ];
    candidates
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

/// Map a non-success status to [`ProviderError::Http`].
pub fn check_status(provider: ProviderId, raw: &RawResponse) -> Result<(), ProviderError> {
    if raw.status.is_success() {
        return Ok(());
    }
    let message = error_message(&raw.body).unwrap_or_else(|| {
        raw.status
            .canonical_reason()
            .map(String::from)
            .unwrap_or_else(|| format!("HTTP {}", raw.status.as_u16()))
    });
    tracing::debug!(
        "{} responded {}: {}",
        provider,
        raw.status.as_u16(),
        sanitize::sanitize_api_error(&raw.body)
    );
    Err(ProviderError::Http {
        provider,
        status: raw.status.as_u16(),
        message: sanitize::sanitize_api_error(&message),
    })
}

/// Retryable error for a 2xx response with no usable completion.
pub fn empty_response(provider: ProviderId, body: &str) -> ProviderError {
    let raw = sanitize::sanitize_raw_body(body);
    tracing::debug!("{} returned an empty or invalid completion: {}", provider, raw);
    ProviderError::EmptyResponse {
        provider,
        message: format!("Empty response payload. Raw response: {}", raw),
        retryable: true,
    }
}

pub fn apply_headers(mut req: RequestBuilder, headers: &BTreeMap<String, String>) -> RequestBuilder {
    for (k, v) in headers {
        req = req.header(k.as_str(), v.as_str());
    }
    req
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(status: u16, body: &str) -> RawResponse {
        RawResponse {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.to_string(),
        }
    }

    #[test]
    fn error_message_prefers_nested_message() {
        assert_eq!(
            error_message(r#"{"error":{"message":"bad key","type":"auth"}}"#),
            Some("bad key".into())
        );
        assert_eq!(error_message(r#"{"error":"quota"}"#), Some("quota".into()));
        assert_eq!(error_message(r#"{"message":"nope"}"#), Some("nope".into()));
        assert_eq!(error_message("<html>502</html>"), None);
    }

    #[test]
    fn check_status_uses_status_text_without_json() {
        let err = check_status(ProviderId::DeepSeek, &raw(503, "gateway down")).unwrap_err();
        assert_eq!(err.to_string(), "Service Unavailable");
        assert_eq!(err.status(), Some(503));
        assert!(err.is_retryable());
    }

    #[test]
    fn check_status_passes_success() {
        assert!(check_status(ProviderId::OpenAi, &raw(200, "{}")).is_ok());
    }

    #[test]
    fn empty_response_embeds_body() {
        let err = empty_response(ProviderId::Gemini, r#"{"candidates":[]}"#);
        assert!(err.is_retryable());
        assert!(err.to_string().contains(r#"{"candidates":[]}"#));
    }
}
