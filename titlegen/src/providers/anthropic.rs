use super::{Provider, ProviderError, clean_title, ensure_api_key, http};
use crate::config::ResolvedCredential;
use crate::types::{GenerateRequest, ProviderId};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    client: Client,
}

impl AnthropicProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn messages_request(&self, credential: &ResolvedCredential) -> RequestBuilder {
        let url = format!("{}/v1/messages", credential.base_url);
        let req = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-api-key", credential.api_key.as_str())
            .header("anthropic-version", ANTHROPIC_VERSION);
        http::apply_headers(req, &credential.extra_headers)
    }
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: [AnthropicMessage<'a>; 1],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct MessagesResponse {
    /// Normally an array of content blocks; some gateways return a plain string.
    content: Option<Value>,
}

/// Fallback order: `content[]` text blocks joined by a space (thinking and
/// tool blocks carry no `text` and are skipped) → string `content`.
pub fn parse_response(body: &str) -> Result<String, ProviderError> {
    let extracted = serde_json::from_str::<MessagesResponse>(body)
        .ok()
        .and_then(|resp| match resp.content? {
            Value::Array(blocks) => Some(
                blocks
                    .iter()
                    .filter_map(|b| b.get("text").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            Value::String(s) => Some(s),
            _ => None,
        });
    extracted
        .as_deref()
        .and_then(clean_title)
        .ok_or_else(|| http::empty_response(ProviderId::Anthropic, body))
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Anthropic
    }

    async fn generate_title(
        &self,
        request: &GenerateRequest,
        credential: &ResolvedCredential,
    ) -> Result<String, ProviderError> {
        ensure_api_key(credential)?;
        let body = MessagesRequest {
            model: &credential.model,
            system: Some(request.system_prompt.as_str()).filter(|s| !s.is_empty()),
            messages: [AnthropicMessage {
                role: "user",
                content: &request.prompt,
            }],
            max_tokens: request.max_tokens,
            temperature: Some(request.temperature),
            top_p: Some(request.top_p),
        };
        let req = self.messages_request(credential).json(&body);
        let raw = http::send(ProviderId::Anthropic, req, &request.cancel).await?;
        http::check_status(ProviderId::Anthropic, &raw)?;
        parse_response(&raw.body)
    }

    async fn test_connection(&self, credential: &ResolvedCredential) -> Result<(), ProviderError> {
        ensure_api_key(credential)?;
        // No models endpoint on the classic API key path; a one-token message is the cheapest probe.
        let body = MessagesRequest {
            model: &credential.model,
            system: None,
            messages: [AnthropicMessage {
                role: "user",
                content: "test",
            }],
            max_tokens: 1,
            temperature: None,
            top_p: None,
        };
        let req = self.messages_request(credential).json(&body);
        let raw = http::send_uncancellable(ProviderId::Anthropic, req).await?;
        http::check_status(ProviderId::Anthropic, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_text_blocks() {
        let body = r#"{"id":"msg_1","type":"message","role":"assistant","content":[{"type":"thinking","thinking":"hmm"},{"type":"text","text":"Typed Errors"},{"type":"text","text":"in Rust"}],"stop_reason":"end_turn"}"#;
        assert_eq!(parse_response(body).unwrap(), "Typed Errors in Rust");
    }

    #[test]
    fn accepts_string_content() {
        assert_eq!(parse_response(r#"{"content":" Plain "}"#).unwrap(), "Plain");
    }

    #[test]
    fn empty_blocks_are_retryable() {
        let err = parse_response(r#"{"content":[]}"#).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(err.provider(), Some(ProviderId::Anthropic));
        assert!(parse_response(r#"{"content":42}"#).is_err());
    }
}
