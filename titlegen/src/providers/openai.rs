use super::compatible::{self, ChatExtras, ChatResponse};
use super::{Provider, ProviderError, clean_title, ensure_api_key, http};
use crate::config::ResolvedCredential;
use crate::types::{GenerateRequest, ProviderId};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};

/// OpenAI Chat Completions, also serving the `custom` compatible endpoint.
pub struct OpenAiProvider {
    id: ProviderId,
    client: Client,
}

impl OpenAiProvider {
    pub fn new() -> Self {
        Self::with_id(ProviderId::OpenAi)
    }

    /// A compatible endpoint registered under `custom`.
    pub fn custom() -> Self {
        Self::with_id(ProviderId::Custom)
    }

    fn with_id(id: ProviderId) -> Self {
        Self {
            id,
            client: Client::new(),
        }
    }
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn organization_header(credential: &ResolvedCredential) -> impl Fn(RequestBuilder) -> RequestBuilder + '_ {
    move |req| match &credential.organization {
        Some(org) => req.header("OpenAI-Organization", org.as_str()),
        None => req,
    }
}

/// Fallback order: `choices[0].message.content` (or `delta.content`), string or
/// part array → `choices[0].text`.
pub fn parse_response(provider: ProviderId, body: &str) -> Result<String, ProviderError> {
    let extracted = ChatResponse::parse(body).and_then(|resp| {
        let choice = resp.first_choice()?;
        let message = choice.message.as_ref().or(choice.delta.as_ref());
        compatible::message_text(message).or_else(|| choice.text.clone())
    });
    extracted
        .as_deref()
        .and_then(clean_title)
        .ok_or_else(|| http::empty_response(provider, body))
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn generate_title(
        &self,
        request: &GenerateRequest,
        credential: &ResolvedCredential,
    ) -> Result<String, ProviderError> {
        ensure_api_key(credential)?;
        let extras = ChatExtras {
            reasoning_effort: request.disable_thinking.then_some("low"),
            ..ChatExtras::default()
        };
        let body = compatible::build_chat_body(request, credential, &extras);
        let raw = compatible::post_chat(
            &self.client,
            credential,
            organization_header(credential),
            &body,
            &request.cancel,
        )
        .await?;
        parse_response(self.id, &raw.body)
    }

    async fn test_connection(&self, credential: &ResolvedCredential) -> Result<(), ProviderError> {
        ensure_api_key(credential)?;
        compatible::probe_connection(&self.client, credential, organization_header(credential), false)
            .await
    }
}
