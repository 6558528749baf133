use crate::types::{ProviderId, TitleConfig};

// ---------------------------------------------------------------------------
// Environment variable sniffing
// ---------------------------------------------------------------------------

/// Environment variables consulted per provider, in priority order.
fn provider_env_candidates(id: ProviderId) -> &'static [&'static str] {
    match id {
        ProviderId::OpenAi => &["OPENAI_API_KEY"],
        ProviderId::Anthropic => &["ANTHROPIC_API_KEY"],
        ProviderId::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        ProviderId::DeepSeek => &["DEEPSEEK_API_KEY"],
        ProviderId::Zhipu => &["ZHIPUAI_API_KEY", "GLM_API_KEY"],
        ProviderId::Custom => &["TITLEGEN_CUSTOM_API_KEY"],
    }
}

/// First non-empty API key found in the environment for `id`.
pub fn env_api_key(id: ProviderId) -> Option<String> {
    env_api_key_with(id, |name| std::env::var(name).ok())
}

fn env_api_key_with(id: ProviderId, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    provider_env_candidates(id)
        .iter()
        .filter_map(|name| lookup(name))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Fill empty API keys from the environment. Stored keys always win.
/// Returns the providers whose key came from the environment.
pub fn apply_env_keys(config: &mut TitleConfig) -> Vec<ProviderId> {
    apply_env_keys_with(config, |name| std::env::var(name).ok())
}

fn apply_env_keys_with(
    config: &mut TitleConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<ProviderId> {
    let mut filled = Vec::new();
    for id in ProviderId::ALL {
        let cred = config.credential_mut(id);
        if !cred.api_key.trim().is_empty() {
            continue;
        }
        if let Some(key) = env_api_key_with(id, &lookup) {
            cred.api_key = key;
            filled.push(id);
        }
    }
    if !filled.is_empty() {
        tracing::debug!("API keys taken from environment for {:?}", filled);
    }
    filled
}
