use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Provider identifiers
// ---------------------------------------------------------------------------

/// The closed set of backends a title can be generated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    OpenAi,
    Anthropic,
    Gemini,
    DeepSeek,
    Zhipu,
    Custom,
}

impl ProviderId {
    pub const ALL: [ProviderId; 6] = [
        ProviderId::OpenAi,
        ProviderId::Anthropic,
        ProviderId::Gemini,
        ProviderId::DeepSeek,
        ProviderId::Zhipu,
        ProviderId::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Gemini => "gemini",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::Zhipu => "zhipu",
            ProviderId::Custom => "custom",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for ProviderId {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str() == lower)
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for ProviderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// User-supplied connection settings for one provider. Absent fields fall back
/// to the provider metadata defaults when resolved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderCredential {
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra_headers: BTreeMap<String, String>,
    /// Merged verbatim into chat-completion request bodies.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_params: BTreeMap<String, serde_json::Value>,
    /// Zhipu only: swap reasoning models for the default non-reasoning one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefer_non_reasoning_model: Option<bool>,
}

// ---------------------------------------------------------------------------
// Retry / preferences / usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub exponential: bool,
    /// Upper bound on any single backoff wait.
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            exponential: true,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderPreferences {
    #[serde(deserialize_with = "primary_or_default")]
    pub primary: ProviderId,
    #[serde(deserialize_with = "known_provider_list")]
    pub fallbacks: Vec<ProviderId>,
    pub auto_switch_on_success: bool,
}

impl Default for ProviderPreferences {
    fn default() -> Self {
        Self {
            primary: ProviderId::OpenAi,
            fallbacks: Vec::new(),
            auto_switch_on_success: false,
        }
    }
}

impl ProviderPreferences {
    /// `[primary, ...fallbacks]` with duplicates removed, first occurrence wins.
    pub fn try_order(&self) -> Vec<ProviderId> {
        let mut order = Vec::with_capacity(self.fallbacks.len() + 1);
        for id in std::iter::once(self.primary).chain(self.fallbacks.iter().copied()) {
            if !order.contains(&id) {
                order.push(id);
            }
        }
        order
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageStats {
    pub total_requests: u64,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "known_provider_opt"
    )]
    pub last_used_provider: Option<ProviderId>,
    /// Consecutive failures per provider; a success resets the entry to zero.
    #[serde(deserialize_with = "known_provider_map")]
    pub provider_failure_counts: BTreeMap<ProviderId, u32>,
}

impl UsageStats {
    pub fn failure_count(&self, id: ProviderId) -> u32 {
        self.provider_failure_counts.get(&id).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Prompting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TonePreset {
    #[default]
    Balanced,
    Catchy,
    Technical,
    Narrative,
}

impl TonePreset {
    pub fn instruction(&self) -> &'static str {
        match self {
            TonePreset::Balanced => "balanced and professional",
            TonePreset::Catchy => "attention-grabbing and energetic",
            TonePreset::Technical => "technical and precise",
            TonePreset::Narrative => "story-driven and warm",
        }
    }
}

/// Where the text source should take content from. Consumed by the text
/// source collaborator, carried here so it round-trips with the config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextStrategy {
    #[default]
    Auto,
    Selection,
    Block,
    Document,
}

pub const DEFAULT_PROMPT_TEMPLATE: &str = "Read the following content and craft the most compelling title.\n\
Keep the language as {{language}} with a {{tone}} tone.\n\
Return the title only without extra explanation.\n\
\n\
{{content}}";

pub const MIN_CONTEXT_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Top-level configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TitleConfig {
    pub provider_preferences: ProviderPreferences,
    #[serde(deserialize_with = "known_provider_map")]
    pub providers: BTreeMap<ProviderId, ProviderCredential>,
    pub retry_policy: RetryPolicy,
    pub usage: UsageStats,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub language: String,
    pub tone: TonePreset,
    pub context_strategy: ContextStrategy,
    pub context_max_chars: usize,
    pub prompt_template: String,
    pub disable_thinking: bool,

    /// LEGACY: single-provider fields from the first config format.
    /// Migrated into `providers.openai` by `normalize` and never written back.
    #[serde(rename = "apiKey", skip_serializing)]
    pub legacy_api_key: Option<String>,
    #[serde(rename = "baseUrl", skip_serializing)]
    pub legacy_base_url: Option<String>,
    #[serde(rename = "model", skip_serializing)]
    pub legacy_model: Option<String>,
}

impl Default for TitleConfig {
    fn default() -> Self {
        let mut cfg = Self {
            provider_preferences: ProviderPreferences::default(),
            providers: BTreeMap::new(),
            retry_policy: RetryPolicy::default(),
            usage: UsageStats::default(),
            temperature: 0.5,
            top_p: 0.9,
            max_tokens: 64,
            language: "Chinese (Simplified)".to_string(),
            tone: TonePreset::default(),
            context_strategy: ContextStrategy::default(),
            context_max_chars: 1200,
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            disable_thinking: false,
            legacy_api_key: None,
            legacy_base_url: None,
            legacy_model: None,
        };
        cfg.normalize();
        cfg
    }
}

impl TitleConfig {
    /// Bring a freshly deserialized (possibly partial or legacy) config into a
    /// fully valid shape. Idempotent.
    pub fn normalize(&mut self) {
        self.migrate_legacy();

        for id in ProviderId::ALL {
            self.providers
                .entry(id)
                .or_insert_with(|| crate::config::default_credential(id));
        }

        let mut seen = Vec::with_capacity(self.provider_preferences.fallbacks.len());
        self.provider_preferences.fallbacks.retain(|id| {
            if seen.contains(id) {
                false
            } else {
                seen.push(*id);
                true
            }
        });

        self.retry_policy.max_attempts = self.retry_policy.max_attempts.max(1);
        self.context_max_chars = self.context_max_chars.max(MIN_CONTEXT_CHARS);
        if self.prompt_template.trim().is_empty() {
            self.prompt_template = DEFAULT_PROMPT_TEMPLATE.to_string();
        }
        if self.language.trim().is_empty() {
            self.language = "Chinese (Simplified)".to_string();
        }
    }

    fn migrate_legacy(&mut self) {
        let key = self.legacy_api_key.take();
        let base_url = self.legacy_base_url.take();
        let model = self.legacy_model.take();
        if key.is_none() && base_url.is_none() && model.is_none() {
            return;
        }

        let entry = self
            .providers
            .entry(ProviderId::OpenAi)
            .or_insert_with(|| crate::config::default_credential(ProviderId::OpenAi));
        if !entry.api_key.is_empty() {
            return;
        }
        if let Some(k) = key {
            entry.api_key = k;
        }
        if let Some(u) = base_url.filter(|u| !u.trim().is_empty()) {
            entry.base_url = Some(u);
        }
        if let Some(m) = model.filter(|m| !m.trim().is_empty()) {
            entry.model = Some(m);
        }
    }

    /// The credential stored for `id`, populating a missing entry from defaults.
    pub fn credential_mut(&mut self, id: ProviderId) -> &mut ProviderCredential {
        self.providers
            .entry(id)
            .or_insert_with(|| crate::config::default_credential(id))
    }

    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            disable_thinking: self.disable_thinking,
        }
    }
}

// Unknown provider keys in stored JSON are dropped instead of failing the load.
fn known_provider_map<'de, D, V>(deserializer: D) -> Result<BTreeMap<ProviderId, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    let raw = BTreeMap::<String, V>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| k.parse::<ProviderId>().ok().map(|id| (id, v)))
        .collect())
}

fn known_provider_list<'de, D>(deserializer: D) -> Result<Vec<ProviderId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw.iter().filter_map(|s| s.parse().ok()).collect())
}

fn known_provider_opt<'de, D>(deserializer: D) -> Result<Option<ProviderId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

fn primary_or_default<'de, D>(deserializer: D) -> Result<ProviderId, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(raw.parse().unwrap_or_else(|_| {
        tracing::warn!("Unknown primary provider {:?}, using openai", raw);
        ProviderId::OpenAi
    }))
}

// ---------------------------------------------------------------------------
// Generation requests
// ---------------------------------------------------------------------------

/// Sampling parameters applied verbatim by every adapter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub disable_thinking: bool,
}

/// One user-initiated generation. Shared by every attempt against every provider.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
    pub disable_thinking: bool,
    pub cancel: CancellationToken,
}

impl GenerateRequest {
    pub fn new(
        prompt: impl Into<String>,
        system_prompt: impl Into<String>,
        params: GenerationParams,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: system_prompt.into(),
            temperature: params.temperature,
            top_p: params.top_p,
            max_tokens: params.max_tokens,
            disable_thinking: params.disable_thinking,
            cancel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_id_parses_case_insensitively() {
        assert_eq!("OpenAI".parse::<ProviderId>(), Ok(ProviderId::OpenAi));
        assert_eq!(" zhipu ".parse::<ProviderId>(), Ok(ProviderId::Zhipu));
        assert!("mistral".parse::<ProviderId>().is_err());
    }

    #[test]
    fn try_order_dedupes_preserving_first_seen() {
        let prefs = ProviderPreferences {
            primary: ProviderId::DeepSeek,
            fallbacks: vec![ProviderId::OpenAi, ProviderId::DeepSeek, ProviderId::Gemini],
            auto_switch_on_success: false,
        };
        assert_eq!(
            prefs.try_order(),
            vec![ProviderId::DeepSeek, ProviderId::OpenAi, ProviderId::Gemini]
        );
    }

    #[test]
    fn default_config_has_every_provider() {
        let cfg = TitleConfig::default();
        for id in ProviderId::ALL {
            assert!(cfg.providers.contains_key(&id), "missing {}", id);
        }
    }

    #[test]
    fn roundtrip_legacy_partial_config() {
        let raw = r#"{
            "apiKey": "sk-legacy",
            "model": "gpt-4o",
            "temperature": 0.2,
            "providerPreferences": {
                "primary": "zhipu",
                "fallbacks": ["openai", "gemini", "openai", "mistral", "gemini"]
            },
            "usage": { "providerFailureCounts": { "openai": 2, "bogus": 9 } }
        }"#;
        let mut cfg: TitleConfig = serde_json::from_str(raw).unwrap();
        cfg.normalize();

        assert_eq!(cfg.temperature, 0.2);
        assert_eq!(cfg.max_tokens, 64);
        assert_eq!(cfg.provider_preferences.primary, ProviderId::Zhipu);
        assert_eq!(
            cfg.provider_preferences.fallbacks,
            vec![ProviderId::OpenAi, ProviderId::Gemini]
        );
        assert_eq!(cfg.usage.failure_count(ProviderId::OpenAi), 2);
        assert_eq!(cfg.providers.len(), ProviderId::ALL.len());
        let openai = &cfg.providers[&ProviderId::OpenAi];
        assert_eq!(openai.api_key, "sk-legacy");
        assert_eq!(openai.model.as_deref(), Some("gpt-4o"));

        let json = serde_json::to_string(&cfg).unwrap();
        let mut back: TitleConfig = serde_json::from_str(&json).unwrap();
        back.normalize();
        assert_eq!(back, cfg);
    }

    #[test]
    fn unknown_or_mixed_case_ids_do_not_fail_the_load() {
        let cfg: TitleConfig = serde_json::from_str(
            r#"{
                "providerPreferences": { "primary": "ollama", "fallbacks": ["zhipu"] },
                "usage": { "totalRequests": 3, "lastUsedProvider": "ollama" }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.provider_preferences.primary, ProviderId::OpenAi);
        assert_eq!(cfg.provider_preferences.fallbacks, vec![ProviderId::Zhipu]);
        assert_eq!(cfg.usage.last_used_provider, None);
        assert_eq!(cfg.usage.total_requests, 3);

        let cfg: TitleConfig = serde_json::from_str(
            r#"{
                "providerPreferences": { "primary": "DeepSeek" },
                "usage": { "lastUsedProvider": "OpenAI" }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.provider_preferences.primary, ProviderId::DeepSeek);
        assert_eq!(cfg.usage.last_used_provider, Some(ProviderId::OpenAi));

        let cfg: TitleConfig =
            serde_json::from_str(r#"{"usage": {"lastUsedProvider": null}}"#).unwrap();
        assert_eq!(cfg.usage.last_used_provider, None);

        assert_eq!(serde_json::from_str::<ProviderId>(r#"" Gemini ""#).unwrap(), ProviderId::Gemini);
        assert!(serde_json::from_str::<ProviderId>(r#""ollama""#).is_err());
    }

    #[test]
    fn normalize_clamps_attempts_and_context() {
        let mut cfg: TitleConfig =
            serde_json::from_str(r#"{"retryPolicy": {"maxAttempts": 0}, "contextMaxChars": 10}"#)
                .unwrap();
        cfg.normalize();
        assert_eq!(cfg.retry_policy.max_attempts, 1);
        assert_eq!(cfg.context_max_chars, MIN_CONTEXT_CHARS);
        assert!(cfg.retry_policy.exponential);
    }

    #[test]
    fn legacy_fields_do_not_override_configured_key() {
        let raw = r#"{"apiKey": "old", "providers": {"openai": {"apiKey": "new"}}}"#;
        let mut cfg: TitleConfig = serde_json::from_str(raw).unwrap();
        cfg.normalize();
        assert_eq!(cfg.providers[&ProviderId::OpenAi].api_key, "new");
    }
}
