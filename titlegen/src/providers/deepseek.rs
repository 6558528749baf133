use super::compatible::{self, ChatExtras, ChatResponse};
use super::{Provider, ProviderError, clean_title, ensure_api_key, http};
use crate::config::ResolvedCredential;
use crate::types::{GenerateRequest, ProviderId};
use async_trait::async_trait;
use reqwest::Client;

const REASONER_MODEL: &str = "deepseek-reasoner";
const CHAT_MODEL: &str = "deepseek-chat";

pub struct DeepSeekProvider {
    client: Client,
}

impl DeepSeekProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for DeepSeekProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// The reasoner has no thinking switch; asking it not to think means using the chat model.
fn effective_model(request: &GenerateRequest, credential: &ResolvedCredential) -> Option<String> {
    (request.disable_thinking && credential.model == REASONER_MODEL).then(|| CHAT_MODEL.to_string())
}

/// Fallback order: `message.content` → last line of `message.reasoning_content`
/// → `choices[0].text` → `delta.content`.
pub fn parse_response(body: &str) -> Result<String, ProviderError> {
    let extracted = ChatResponse::parse(body).and_then(|resp| {
        let choice = resp.first_choice()?;
        compatible::message_text(choice.message.as_ref())
            .or_else(|| {
                choice
                    .message
                    .as_ref()
                    .and_then(|m| m.reasoning_content.as_deref())
                    .and_then(compatible::last_reasoning_line)
            })
            .or_else(|| choice.text.clone().filter(|t| !t.trim().is_empty()))
            .or_else(|| compatible::message_text(choice.delta.as_ref()))
    });
    extracted
        .as_deref()
        .and_then(clean_title)
        .ok_or_else(|| http::empty_response(ProviderId::DeepSeek, body))
}

#[async_trait]
impl Provider for DeepSeekProvider {
    fn id(&self) -> ProviderId {
        ProviderId::DeepSeek
    }

    async fn generate_title(
        &self,
        request: &GenerateRequest,
        credential: &ResolvedCredential,
    ) -> Result<String, ProviderError> {
        ensure_api_key(credential)?;
        let extras = ChatExtras {
            model: effective_model(request, credential),
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
