pub mod env;
pub mod persist;
pub mod store;

use crate::types::{ProviderCredential, ProviderId};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Provider metadata
// ---------------------------------------------------------------------------

/// Static description of a provider's defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub id: ProviderId,
    pub label: &'static str,
    pub description: &'static str,
    pub default_base_url: &'static str,
    pub default_model: &'static str,
    pub requires_api_key: bool,
    pub supports_custom_base_url: bool,
}

pub const PROVIDER_METADATA: &[ProviderMetadata] = &[
    ProviderMetadata {
        id: ProviderId::OpenAi,
        label: "OpenAI / Compatible",
        description: "Official OpenAI endpoint or any fully compatible gateway",
        default_base_url: "https://api.openai.com/v1",
        default_model: "gpt-4o-mini",
        requires_api_key: true,
        supports_custom_base_url: true,
    },
    ProviderMetadata {
        id: ProviderId::Anthropic,
        label: "Anthropic Claude",
        description: "Claude 3.5 Sonnet and related models",
        default_base_url: "https://api.anthropic.com",
        default_model: "claude-3-5-sonnet-20241022",
        requires_api_key: true,
        supports_custom_base_url: true,
    },
    ProviderMetadata {
        id: ProviderId::Gemini,
        label: "Google Gemini",
        description: "Gemini 1.5 Pro and Flash models",
        default_base_url: "https://generativelanguage.googleapis.com/v1beta",
        default_model: "gemini-1.5-pro-latest",
        requires_api_key: true,
        supports_custom_base_url: true,
    },
    ProviderMetadata {
        id: ProviderId::DeepSeek,
        label: "DeepSeek",
        description: "DeepSeek Chat and Coder models",
        default_base_url: "https://api.deepseek.com",
        default_model: "deepseek-chat",
        requires_api_key: true,
        supports_custom_base_url: true,
    },
    ProviderMetadata {
        id: ProviderId::Zhipu,
        label: "Zhipu GLM",
        description: "GLM-4 family; non-reasoning models such as glm-4-flash give the fastest titles",
        default_base_url: "https://open.bigmodel.cn/api/paas/v4",
        default_model: "glm-4-flash",
        requires_api_key: true,
        supports_custom_base_url: true,
    },
    ProviderMetadata {
        id: ProviderId::Custom,
        label: "Custom OpenAI-compatible",
        description: "Any OpenAI-compatible endpoint using the Chat Completions API",
        default_base_url: "https://api.openai.com/v1",
        default_model: "gpt-4o-mini",
        requires_api_key: true,
        supports_custom_base_url: true,
    },
];

/// Metadata for `id`. Total over the closed provider set.
pub fn metadata(id: ProviderId) -> &'static ProviderMetadata {
    let idx = match id {
        ProviderId::OpenAi => 0,
        ProviderId::Anthropic => 1,
        ProviderId::Gemini => 2,
        ProviderId::DeepSeek => 3,
        ProviderId::Zhipu => 4,
        ProviderId::Custom => 5,
    };
    &PROVIDER_METADATA[idx]
}

/// The credential entry a fresh config holds for `id`.
pub fn default_credential(id: ProviderId) -> ProviderCredential {
    let meta = metadata(id);
    ProviderCredential {
        base_url: Some(meta.default_base_url.to_string()),
        model: Some(meta.default_model.to_string()),
        ..ProviderCredential::default()
    }
}

// ---------------------------------------------------------------------------
// Credential resolution
// ---------------------------------------------------------------------------

/// A credential with every metadata default filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCredential {
    pub provider: ProviderId,
    pub api_key: String,
    /// Never ends with `/`.
    pub base_url: String,
    pub model: String,
    pub organization: Option<String>,
    pub extra_headers: BTreeMap<String, String>,
    pub custom_params: BTreeMap<String, serde_json::Value>,
    pub prefer_non_reasoning_model: bool,
}

impl ResolvedCredential {
    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Merge user overrides over metadata defaults. Pure and total: blank or
/// missing override fields fall back to the default.
pub fn resolve_credential(id: ProviderId, overrides: Option<&ProviderCredential>) -> ResolvedCredential {
    let meta = metadata(id);
    let empty = ProviderCredential::default();
    let cred = overrides.unwrap_or(&empty);

    let base_url = if meta.supports_custom_base_url {
        non_blank(cred.base_url.as_ref()).unwrap_or(meta.default_base_url)
    } else {
        meta.default_base_url
    };

    ResolvedCredential {
        provider: id,
        api_key: cred.api_key.trim().to_string(),
        base_url: base_url.trim_end_matches('/').to_string(),
        model: non_blank(cred.model.as_ref())
            .unwrap_or(meta.default_model)
            .to_string(),
        organization: non_blank(cred.organization.as_ref()).map(String::from),
        extra_headers: cred.extra_headers.clone(),
        custom_params: cred.custom_params.clone(),
        prefer_non_reasoning_model: cred.prefer_non_reasoning_model.unwrap_or(false),
    }
}
