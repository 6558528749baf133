use super::compatible::{self, ChatExtras, ChatResponse};
use super::{Provider, ProviderError, clean_title, ensure_api_key, http};
use crate::config::{self, ResolvedCredential};
use crate::types::{GenerateRequest, ProviderId};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

/// Zhipu GLM via its OpenAI-compatible `paas/v4` endpoint.
pub struct ZhipuProvider {
    client: Client,
}

impl ZhipuProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for ZhipuProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// GLM models that think before answering.
pub fn is_reasoning_model(model: &str) -> bool {
    let m = model.to_ascii_lowercase();
    m.starts_with("glm-z1") || m.contains("thinking")
}

fn effective_model(credential: &ResolvedCredential) -> Option<String> {
    if credential.prefer_non_reasoning_model && is_reasoning_model(&credential.model) {
        let fallback = config::metadata(ProviderId::Zhipu).default_model;
        tracing::debug!("zhipu: using {} instead of reasoning model {}", fallback, credential.model);
        return Some(fallback.to_string());
    }
    None
}

/// Fallback order: `message.content` → last line of `message.reasoning_content`
/// → `choices[0].text` → `delta.content`. A reasoning answer cut off by the
/// token budget fails without retry, since the same budget truncates again.
pub fn parse_response(body: &str) -> Result<String, ProviderError> {
    let resp = ChatResponse::parse(body);
    let choice = resp.as_ref().and_then(|r| r.first_choice());

    let extracted = choice.and_then(|choice| {
        compatible::message_text(choice.message.as_ref())
            .or_else(|| {
                let reasoning = choice.message.as_ref()?.reasoning_content.as_deref()?;
                tracing::debug!("zhipu: answer taken from reasoning_content");
                compatible::last_reasoning_line(reasoning)
            })
            .or_else(|| choice.text.clone().filter(|t| !t.trim().is_empty()))
            .or_else(|| compatible::message_text(choice.delta.as_ref()))
    });
    if let Some(title) = extracted.as_deref().and_then(clean_title) {
        return Ok(title);
    }

    let truncated_reasoning = choice.is_some_and(|c| {
        c.finish_reason.as_deref() == Some("length")
            && c.message
                .as_ref()
                .and_then(|m| m.reasoning_content.as_deref())
                .is_some_and(|r| !r.trim().is_empty())
    });
    if truncated_reasoning {
        return Err(ProviderError::EmptyResponse {
            provider: ProviderId::Zhipu,
            message: "Model reasoning was truncated before an answer was produced; raise maxTokens (128 or more) or use a non-reasoning model".into(),
            retryable: false,
        });
    }

    Err(http::empty_response(ProviderId::Zhipu, body))
}

#[async_trait]
impl Provider for ZhipuProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Zhipu
    }

    async fn generate_title(
        &self,
        request: &GenerateRequest,
        credential: &ResolvedCredential,
    ) -> Result<String, ProviderError> {
        ensure_api_key(credential)?;
        let extras = ChatExtras {
            model: effective_model(credential),
            thinking: request
                .disable_thinking
                .then(|| json!({"type": "disabled"})),
            ..ChatExtras::default()
        };
        let body = compatible::build_chat_body(request, credential, &extras);
        let raw =
            compatible::post_chat(&self.client, credential, |req| req, &body, &request.cancel).await?;
        parse_response(&raw.body)
    }

    async fn test_connection(&self, credential: &ResolvedCredential) -> Result<(), ProviderError> {
        ensure_api_key(credential)?;
        compatible::probe_connection(&self.client, credential, |req| req, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve_credential;
    use crate::types::ProviderCredential;

    #[test]
    fn parses_standard_content() {
        let body = r#"{"choices":[{"index":0,"finish_reason":"stop","message":{"role":"assistant","content":"检索增强生成实践"}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "检索增强生成实践");
    }

    #[test]
    fn extracts_answer_from_reasoning_content() {
        let body = r#"{"choices":[{"finish_reason":"stop","message":{"content":"","reasoning_content":"用户需要一个标题。\n\n# 1. 多模型容错调用指南"}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "多模型容错调用指南");
    }

    #[test]
    fn truncated_reasoning_is_not_retryable() {
        let body = r#"{"choices":[{"finish_reason":"length","message":{"content":"","reasoning_content":"Let me consider the options:\n- "}}]}"#;
        let err = parse_response(body).unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("maxTokens"));
    }

    #[test]
    fn blank_payload_is_retryable() {
        let body = r#"{"choices":[{"finish_reason":"stop","message":{"content":"  "}}]}"#;
        let err = parse_response(body).unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Raw response"));
    }

    #[test]
    fn prefers_non_reasoning_model_when_asked() {
        let cred = resolve_credential(
            ProviderId::Zhipu,
            Some(&ProviderCredential {
                model: Some("glm-z1-air".into()),
                prefer_non_reasoning_model: Some(true),
                ..ProviderCredential::default()
            }),
        );
        assert_eq!(effective_model(&cred).as_deref(), Some("glm-4-flash"));

        let plain = resolve_credential(ProviderId::Zhipu, None);
        assert_eq!(effective_model(&plain), None);
        assert!(!is_reasoning_model("glm-4-plus"));
    }
}
