use anyhow::Context;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use titlegen::config::env;
use titlegen::{
    ConfigStore, JsonConfigStore, PROVIDER_METADATA, ProviderCredential, ProviderId, TitleConfig,
    TitleService,
};

/// Stored config with environment keys filled in. Never saved back as-is.
fn load_with_env(store: &JsonConfigStore) -> anyhow::Result<(TitleConfig, Vec<ProviderId>)> {
    let mut config = store
        .load()
        .with_context(|| format!("Failed to load {}", store.path().display()))?;
    let from_env = env::apply_env_keys(&mut config);
    Ok((config, from_env))
}

fn read_input(file: Option<&Path>) -> anyhow::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

fn mask(key: &str) -> String {
    let key = key.trim();
    if key.is_empty() {
        return String::new();
    }
    if key.chars().count() <= 4 {
        return "****".to_string();
    }
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{}", tail)
}

/// Generate a title and print it to stdout. Ctrl-C cancels the request.
pub async fn run_generate(store: &JsonConfigStore, file: Option<&Path>) -> anyhow::Result<()> {
    let text = read_input(file)?;
    let (config, _) = load_with_env(store)?;
    let service = Arc::new(TitleService::builder().config(config).build());

    let watcher = tokio::spawn({
        let service = Arc::clone(&service);
        async move {
            if tokio::signal::ctrl_c().await.is_ok() && service.cancel() {
                tracing::info!("Cancelling title generation");
            }
        }
    });
    let result = service.generate_from_text(&text).await;
    watcher.abort();

    // Write back only what a run changes, so environment keys stay out of the file.
    let after = service.config();
    store.update(|stored| {
        stored.usage = after.usage.clone();
        stored.provider_preferences.primary = after.provider_preferences.primary;
    })?;

    match result? {
        Some(title) => println!("{}", title),
        None => anyhow::bail!("A title generation is already in progress"),
    }
    Ok(())
}

pub async fn run_test(store: &JsonConfigStore, provider: ProviderId) -> anyhow::Result<()> {
    let (config, _) = load_with_env(store)?;
    let credential = config.providers.get(&provider).cloned().unwrap_or_default();
    let label = titlegen::metadata(provider).label;
    let service = TitleService::builder().config(config).build();

    match service.test_connection(provider, &credential).await {
        Ok(()) => {
            println!("{}: connection OK", label);
            Ok(())
        }
        Err(e) => anyhow::bail!("{}: connection failed: {}", label, e),
    }
}

pub fn run_providers(store: &JsonConfigStore) -> anyhow::Result<()> {
    let (config, from_env) = load_with_env(store)?;

    println!("{:<10} {:<26} {:<8} {:<9} MODEL", "ID", "LABEL", "KEY", "FAILURES");
    for meta in PROVIDER_METADATA {
        let resolved = titlegen::resolve_credential(meta.id, config.providers.get(&meta.id));
        let key = if !resolved.has_api_key() {
            "missing"
        } else if from_env.contains(&meta.id) {
            "env"
        } else {
            "stored"
        };
        println!(
            "{:<10} {:<26} {:<8} {:<9} {}",
            meta.id.as_str(),
            meta.label,
            key,
            config.usage.failure_count(meta.id),
            resolved.model
        );
    }

    let prefs = &config.provider_preferences;
    let order: Vec<&str> = prefs.try_order().iter().map(|id| id.as_str()).collect();
    println!();
    println!("Try order:   {}", order.join(" -> "));
    println!("Auto-switch: {}", prefs.auto_switch_on_success);
    println!("Requests:    {}", config.usage.total_requests);
    if let Some(last) = config.usage.last_used_provider {
        println!("Last used:   {}", last);
    }
    Ok(())
}

pub fn run_show(store: &JsonConfigStore) -> anyhow::Result<()> {
    let mut config = store.load()?;
    for cred in config.providers.values_mut() {
        cred.api_key = mask(&cred.api_key);
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub fn run_set_credential(
    store: &JsonConfigStore,
    provider: ProviderId,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    if api_key.is_none() && base_url.is_none() && model.is_none() {
        anyhow::bail!("Nothing to set: pass --api-key, --base-url or --model");
    }
    let meta = titlegen::metadata(provider);
    if base_url.is_some() && !meta.supports_custom_base_url {
        anyhow::bail!("{} does not accept a custom base URL", meta.label);
    }

    store.update(|config| {
        let cred: &mut ProviderCredential = config.credential_mut(provider);
        if let Some(key) = api_key {
            cred.api_key = key.trim().to_string();
        }
        if let Some(url) = base_url {
            cred.base_url = Some(url.trim().trim_end_matches('/').to_string());
        }
        if let Some(model) = model {
            cred.model = Some(model.trim().to_string());
        }
    })?;
    println!("Updated {} credential in {}", meta.label, store.path().display());
    Ok(())
}

pub fn run_set_primary(
    store: &JsonConfigStore,
    provider: ProviderId,
    fallbacks: Option<Vec<ProviderId>>,
    auto_switch: Option<bool>,
) -> anyhow::Result<()> {
    let config = store.update(|config| {
        let prefs = &mut config.provider_preferences;
        prefs.primary = provider;
        if let Some(list) = fallbacks {
            prefs.fallbacks = list;
        }
        if let Some(flag) = auto_switch {
            prefs.auto_switch_on_success = flag;
        }
    })?;
    let order: Vec<&str> = config
        .provider_preferences
        .try_order()
        .iter()
        .map(|id| id.as_str())
        .collect();
    println!("Try order: {}", order.join(" -> "));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_last_four() {
        assert_eq!(mask("sk-abcdef123456"), "****3456");
        assert_eq!(mask("  "), "");
        assert_eq!(mask("abcde"), "****bcde");
    }

    #[test]
    fn mask_hides_short_keys_entirely() {
        assert_eq!(mask("ab"), "****");
        assert_eq!(mask(" abcd "), "****");
    }

    #[test]
    fn set_credential_and_primary_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConfigStore::new(dir.path().join("config.json"));

        run_set_credential(
            &store,
            ProviderId::Zhipu,
            Some(" zk-1 ".into()),
            Some("https://proxy.example/v4/".into()),
            None,
        )
        .unwrap();
        run_set_primary(
            &store,
            ProviderId::Zhipu,
            Some(vec![ProviderId::DeepSeek, ProviderId::DeepSeek]),
            Some(true),
        )
        .unwrap();

        let config = store.load().unwrap();
        let cred = &config.providers[&ProviderId::Zhipu];
        assert_eq!(cred.api_key, "zk-1");
        assert_eq!(cred.base_url.as_deref(), Some("https://proxy.example/v4"));
        assert_eq!(config.provider_preferences.primary, ProviderId::Zhipu);
        assert_eq!(config.provider_preferences.fallbacks, vec![ProviderId::DeepSeek]);
        assert!(config.provider_preferences.auto_switch_on_success);
    }

    #[test]
    fn set_credential_requires_a_field() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConfigStore::new(dir.path().join("config.json"));
        assert!(run_set_credential(&store, ProviderId::OpenAi, None, None, None).is_err());
    }
}
