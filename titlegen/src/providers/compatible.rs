//! OpenAI-compatible `/chat/completions` plumbing shared by the openai, custom,
//! deepseek and zhipu adapters.

use super::http::{self, RawResponse};
use super::ProviderError;
use crate::config::ResolvedCredential;
use crate::types::GenerateRequest;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

// ---- Request/response types (OpenAI wire format) ----
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMsg<'a>; 2],
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMsg<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ChatResponse {
    pub choices: Option<Vec<ChatChoice>>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ChatChoice {
    pub message: Option<ChatMessageResp>,
    pub delta: Option<ChatMessageResp>,
    pub text: Option<String>,
    pub finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct ChatMessageResp {
    /// A string, or an array of `{text}` / `{value}` parts.
    pub content: Option<Value>,
    pub reasoning_content: Option<String>,
}

impl ChatResponse {
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    pub fn first_choice(&self) -> Option<&ChatChoice> {
        self.choices.as_ref()?.first()
    }
}

/// Flatten a chat `content` value. Array parts are joined by a space.
pub fn content_text(content: &Value) -> Option<String> {
    match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => {
            let joined = parts
                .iter()
                .map(|p| {
                    p.get("text")
                        .and_then(Value::as_str)
                        .or_else(|| p.get("value").and_then(Value::as_str))
                        .unwrap_or("")
                })
                .collect::<Vec<_>>()
                .join(" ");
            Some(joined)
        }
        _ => None,
    }
}

/// Non-blank text of a message's `content`.
pub fn message_text(message: Option<&ChatMessageResp>) -> Option<String> {
    message
        .and_then(|m| m.content.as_ref())
        .and_then(content_text)
        .filter(|s| !s.trim().is_empty())
}

/// The final answer buried in reasoning output: the last non-empty line with
/// leading markdown markers and list numbering stripped.
pub fn last_reasoning_line(reasoning: &str) -> Option<String> {
    let line = reasoning.lines().map(str::trim).filter(|l| !l.is_empty()).last()?;
    let stripped = line
        .trim_start_matches(|c: char| {
            matches!(c, '#' | '*' | '-' | '.') || c.is_ascii_digit() || c.is_whitespace()
        })
        .trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

pub fn chat_completions_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{}/chat/completions", base)
    }
}

pub fn models_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let base = base.strip_suffix("/chat/completions").unwrap_or(base);
    format!("{}/models", base)
}

/// Per-adapter additions to the shared chat body.
#[derive(Debug, Default, Clone)]
pub struct ChatExtras {
    pub model: Option<String>,
    pub reasoning_effort: Option<&'static str>,
    pub thinking: Option<Value>,
}

/// Chat-completions body for a title request. `customParams` are merged last
/// and override any generated field.
pub fn build_chat_body(
    request: &GenerateRequest,
    credential: &ResolvedCredential,
    extras: &ChatExtras,
) -> Value {
    let model = extras.model.as_deref().unwrap_or(&credential.model);
    let body = ChatRequest {
        model,
        messages: [
            ChatMsg {
                role: "system",
                content: &request.system_prompt,
            },
            ChatMsg {
                role: "user",
                content: &request.prompt,
            },
        ],
        temperature: request.temperature,
        top_p: request.top_p,
        max_tokens: request.max_tokens,
        stream: false,
    };
    let mut value = serde_json::to_value(&body).unwrap_or_else(|_| json!({}));
    if let Value::Object(map) = &mut value {
        if let Some(effort) = extras.reasoning_effort {
            map.insert("reasoning_effort".into(), json!(effort));
        }
        if let Some(thinking) = &extras.thinking {
            map.insert("thinking".into(), thinking.clone());
        }
        for (k, v) in &credential.custom_params {
            map.insert(k.clone(), v.clone());
        }
    }
    value
}

/// Bearer auth plus the user's extra headers.
pub fn authorized(req: RequestBuilder, credential: &ResolvedCredential) -> RequestBuilder {
    let req = req
        .header("Content-Type", "application/json")
        .header("Authorization", format!("Bearer {}", credential.api_key));
    http::apply_headers(req, &credential.extra_headers)
}

/// POST a chat body; returns the raw 2xx response.
pub async fn post_chat(
    client: &Client,
    credential: &ResolvedCredential,
    headers: impl FnOnce(RequestBuilder) -> RequestBuilder,
    body: &Value,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<RawResponse, ProviderError> {
    let url = chat_completions_url(&credential.base_url);
    let req = headers(authorized(client.post(&url), credential)).json(body);
    let raw = http::send(credential.provider, req, cancel).await?;
    http::check_status(credential.provider, &raw)?;
    Ok(raw)
}

/// GET `/models`; when `chat_fallback` is set and the gateway answers 404,
/// retry with a one-token chat completion instead.
pub async fn probe_connection(
    client: &Client,
    credential: &ResolvedCredential,
    headers: impl Fn(RequestBuilder) -> RequestBuilder,
    chat_fallback: bool,
) -> Result<(), ProviderError> {
    let req = headers(authorized(client.get(models_url(&credential.base_url)), credential));
    let raw = http::send_uncancellable(credential.provider, req).await?;

    if chat_fallback && raw.status == reqwest::StatusCode::NOT_FOUND {
        tracing::debug!(
            "{} has no models endpoint, probing with a chat completion",
            credential.provider
        );
        let body = json!({
            "model": credential.model,
            "messages": [{"role": "user", "content": "test"}],
            "max_tokens": 1
        });
        let req = headers(authorized(
            client.post(chat_completions_url(&credential.base_url)),
            credential,
        ))
        .json(&body);
        let raw = http::send_uncancellable(credential.provider, req).await?;
        return http::check_status(credential.provider, &raw);
    }

    http::check_status(credential.provider, &raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve_credential;
    use crate::types::{GenerationParams, ProviderId};
    use tokio_util::sync::CancellationToken;

    fn request() -> GenerateRequest {
        GenerateRequest::new(
            "body text",
            "be brief",
            GenerationParams {
                temperature: 0.3,
                top_p: 0.8,
                max_tokens: 48,
                disable_thinking: false,
            },
            CancellationToken::new(),
        )
    }

    #[test]
    fn url_helpers() {
        assert_eq!(chat_completions_url("https://x/v1/"), "https://x/v1/chat/completions");
        assert_eq!(
            chat_completions_url("https://x/v1/chat/completions"),
            "https://x/v1/chat/completions"
        );
        assert_eq!(models_url("https://x/v1/chat/completions"), "https://x/v1/models");
        assert_eq!(models_url("https://x/v1"), "https://x/v1/models");
    }

    #[test]
    fn body_applies_params_verbatim() {
        let cred = resolve_credential(ProviderId::OpenAi, None);
        let body = build_chat_body(&request(), &cred, &ChatExtras::default());
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "be brief");
        assert_eq!(body["messages"][1]["content"], "body text");
        assert_eq!(body["temperature"], 0.3);
        assert_eq!(body["top_p"], 0.8);
        assert_eq!(body["max_tokens"], 48);
        assert_eq!(body["stream"], false);
        assert!(body.get("reasoning_effort").is_none());
    }

    #[test]
    fn custom_params_override() {
        let mut cred = resolve_credential(ProviderId::Custom, None);
        cred.custom_params.insert("max_tokens".into(), json!(10));
        cred.custom_params.insert("seed".into(), json!(7));
        let body = build_chat_body(&request(), &cred, &ChatExtras::default());
        assert_eq!(body["max_tokens"], 10);
        assert_eq!(body["seed"], 7);
    }

    #[test]
    fn content_text_handles_parts() {
        assert_eq!(content_text(&json!("hi")), Some("hi".into()));
        assert_eq!(
            content_text(&json!([{"text": "A"}, {"value": "B"}, {"other": 1}])),
            Some("A B ".into())
        );
        assert_eq!(content_text(&json!(42)), None);
    }

    #[test]
    fn reasoning_line_strips_markers() {
        let reasoning = "Let me think.\n\n1. Options...\nFinal answer below\n**2.** Rust Retry Patterns\n";
        assert_eq!(last_reasoning_line(reasoning), Some("Rust Retry Patterns".into()));
        assert_eq!(last_reasoning_line("\n  \n"), None);
    }
}
