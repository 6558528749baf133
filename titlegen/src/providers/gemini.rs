use super::{Provider, ProviderError, clean_title, ensure_api_key, http};
use crate::config::ResolvedCredential;
use crate::types::{GenerateRequest, ProviderId};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

pub struct GeminiProvider {
    client: Client,
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

// ---- Request/response types (generateContent wire format) ----
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent<'a>>,
    contents: [GeminiContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: [GeminiPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    thinking_budget: u32,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct CandidatePart {
    text: Option<String>,
    thought: bool,
}

/// `{base}/models/{model}:{method}?key=<key>`. The key is percent-encoded.
fn endpoint(credential: &ResolvedCredential, path: &str) -> Result<Url, ProviderError> {
    let raw = format!("{}/{}", credential.base_url, path);
    let mut url = Url::parse(&raw).map_err(|e| {
        ProviderError::Config(format!("Invalid Gemini base URL {}: {}", credential.base_url, e))
    })?;
    url.query_pairs_mut().append_pair("key", &credential.api_key);
    Ok(url)
}

/// Fallback order: `candidates[0].content.parts[0].text` → first part that is
/// not a thought summary.
pub fn parse_response(body: &str) -> Result<String, ProviderError> {
    let extracted = serde_json::from_str::<GenerateContentResponse>(body)
        .ok()
        .and_then(|resp| {
            let parts = resp.candidates.into_iter().next()?.content?.parts;
            let first = parts
                .first()
                .and_then(|p| p.text.clone())
                .filter(|t| !t.trim().is_empty());
            first.or_else(|| {
                parts
                    .into_iter()
                    .filter(|p| !p.thought)
                    .find_map(|p| p.text.filter(|t| !t.trim().is_empty()))
            })
        });
    extracted
        .as_deref()
        .and_then(clean_title)
        .ok_or_else(|| http::empty_response(ProviderId::Gemini, body))
}

#[async_trait]
impl Provider for GeminiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    async fn generate_title(
        &self,
        request: &GenerateRequest,
        credential: &ResolvedCredential,
    ) -> Result<String, ProviderError> {
        ensure_api_key(credential)?;
        let url = endpoint(credential, &format!("models/{}:generateContent", credential.model))?;
        let body = GenerateContentRequest {
            system_instruction: Some(GeminiContent {
                role: None,
                parts: [GeminiPart {
                    text: &request.system_prompt,
                }],
            })
            .filter(|_| !request.system_prompt.is_empty()),
            contents: [GeminiContent {
                role: Some("user"),
                parts: [GeminiPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                top_p: request.top_p,
                max_output_tokens: request.max_tokens,
                thinking_config: request
                    .disable_thinking
                    .then_some(ThinkingConfig { thinking_budget: 0 }),
            },
        };
        let req = http::apply_headers(
            self.client
                .post(url)
                .header("Content-Type", "application/json")
                .json(&body),
            &credential.extra_headers,
        );
        let raw = http::send(ProviderId::Gemini, req, &request.cancel).await?;
        http::check_status(ProviderId::Gemini, &raw)?;
        parse_response(&raw.body)
    }

    async fn test_connection(&self, credential: &ResolvedCredential) -> Result<(), ProviderError> {
        ensure_api_key(credential)?;
        let url = endpoint(credential, "models")?;
        let req = http::apply_headers(self.client.get(url), &credential.extra_headers);
        let raw = http::send_uncancellable(ProviderId::Gemini, req).await?;
        http::check_status(ProviderId::Gemini, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve_credential;

    #[test]
    fn parses_first_part() {
        let body = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Gemini Says Hello\n"}]},"finishReason":"STOP"}],"usageMetadata":{"totalTokenCount":12}}"#;
        assert_eq!(parse_response(body).unwrap(), "Gemini Says Hello");
    }

    #[test]
    fn skips_thought_parts() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"","thought":true},{"text":"thinking aloud","thought":true},{"text":"Final Answer"}]}}]}"#;
        assert_eq!(parse_response(body).unwrap(), "Final Answer");
    }

    #[test]
    fn blocked_prompt_is_retryable_empty() {
        let body = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let err = parse_response(body).unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn endpoint_encodes_key_as_query() {
        let mut cred = resolve_credential(ProviderId::Gemini, None);
        cred.api_key = "a b&c".into();
        let url = endpoint(&cred, "models/gemini-1.5-pro-latest:generateContent").unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro-latest:generateContent?key=a+b%26c"
        );
    }

    #[test]
    fn bad_base_url_is_config_error() {
        let mut cred = resolve_credential(ProviderId::Gemini, None);
        cred.base_url = "not a url".into();
        let err = endpoint(&cred, "models").unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
        assert!(!err.is_retryable());
    }
}
