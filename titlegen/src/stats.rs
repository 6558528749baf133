//! Folds orchestrator events into usage statistics and provider preferences.

use crate::providers::failover::ProviderEvent;
use crate::types::TitleConfig;

/// Apply one event. Returns `true` when the config changed.
pub fn apply_event(config: &mut TitleConfig, event: &ProviderEvent) -> bool {
    match event {
        ProviderEvent::Succeeded { provider } => {
            let usage = &mut config.usage;
            usage.provider_failure_counts.insert(*provider, 0);
            usage.total_requests = usage.total_requests.saturating_add(1);
            usage.last_used_provider = Some(*provider);

            let prefs = &mut config.provider_preferences;
            if prefs.auto_switch_on_success && prefs.primary != *provider {
                tracing::info!("Auto-switching primary provider {} -> {}", prefs.primary, provider);
                prefs.primary = *provider;
            }
            true
        }
        ProviderEvent::Failed { provider, .. } => {
            let count = config.usage.provider_failure_counts.entry(*provider).or_insert(0);
            *count = count.saturating_add(1);
            true
        }
    }
}

/// Apply events in order. Returns `true` when anything changed.
pub fn apply_events<'a>(config: &mut TitleConfig, events: impl IntoIterator<Item = &'a ProviderEvent>) -> bool {
    events
        .into_iter()
        .fold(false, |changed, event| apply_event(config, event) || changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderId;

    fn failed(provider: ProviderId) -> ProviderEvent {
        ProviderEvent::Failed {
            provider,
            message: "boom".into(),
        }
    }

    #[test]
    fn failures_accumulate_and_success_resets() {
        let mut config = TitleConfig::default();
        apply_events(&mut config, &[failed(ProviderId::Gemini), failed(ProviderId::Gemini)]);
        assert_eq!(config.usage.failure_count(ProviderId::Gemini), 2);
        assert_eq!(config.usage.total_requests, 0);

        apply_event(&mut config, &ProviderEvent::Succeeded { provider: ProviderId::Gemini });
        assert_eq!(config.usage.failure_count(ProviderId::Gemini), 0);
        assert_eq!(config.usage.total_requests, 1);
        assert_eq!(config.usage.last_used_provider, Some(ProviderId::Gemini));
    }

    #[test]
    fn fallback_success_promotes_when_auto_switch_enabled() {
        let mut config = TitleConfig::default();
        config.provider_preferences.primary = ProviderId::OpenAi;
        config.provider_preferences.fallbacks = vec![ProviderId::DeepSeek];
        config.provider_preferences.auto_switch_on_success = true;
        config.usage.provider_failure_counts.insert(ProviderId::DeepSeek, 4);

        let events = [
            failed(ProviderId::OpenAi),
            ProviderEvent::Succeeded { provider: ProviderId::DeepSeek },
        ];
        assert!(apply_events(&mut config, &events));

        assert_eq!(config.provider_preferences.primary, ProviderId::DeepSeek);
        assert_eq!(config.usage.failure_count(ProviderId::OpenAi), 1);
        assert_eq!(config.usage.failure_count(ProviderId::DeepSeek), 0);
        // The promoted provider stays in the fallback list.
        assert_eq!(config.provider_preferences.fallbacks, vec![ProviderId::DeepSeek]);
        assert_eq!(
            config.provider_preferences.try_order(),
            vec![ProviderId::DeepSeek]
        );
    }

    #[test]
    fn primary_kept_without_auto_switch() {
        let mut config = TitleConfig::default();
        config.provider_preferences.primary = ProviderId::OpenAi;
        apply_event(&mut config, &ProviderEvent::Succeeded { provider: ProviderId::Zhipu });
        assert_eq!(config.provider_preferences.primary, ProviderId::OpenAi);
        assert_eq!(config.usage.last_used_provider, Some(ProviderId::Zhipu));
    }

    #[test]
    fn no_events_no_change() {
        let mut config = TitleConfig::default();
        let before = config.clone();
        let events: [ProviderEvent; 0] = [];
        assert!(!apply_events(&mut config, &events));
        assert_eq!(config, before);
    }
}
