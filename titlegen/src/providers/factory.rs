//! Memoized provider registry: one adapter instance per provider id.

use super::anthropic::AnthropicProvider;
use super::deepseek::DeepSeekProvider;
use super::gemini::GeminiProvider;
use super::openai::OpenAiProvider;
use super::zhipu::ZhipuProvider;
use super::{Provider, ProviderError};
use crate::types::ProviderId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

type Constructor = dyn Fn(ProviderId) -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync;

pub struct ProviderFactory {
    registry: Mutex<HashMap<ProviderId, Arc<dyn Provider>>>,
    construct: Box<Constructor>,
}

/// The built-in adapter for `id`.
pub fn builtin(id: ProviderId) -> Result<Arc<dyn Provider>, ProviderError> {
    let provider: Arc<dyn Provider> = match id {
        ProviderId::OpenAi => Arc::new(OpenAiProvider::new()),
        ProviderId::Custom => Arc::new(OpenAiProvider::custom()),
        ProviderId::Anthropic => Arc::new(AnthropicProvider::new()),
        ProviderId::Gemini => Arc::new(GeminiProvider::new()),
        ProviderId::DeepSeek => Arc::new(DeepSeekProvider::new()),
        ProviderId::Zhipu => Arc::new(ZhipuProvider::new()),
    };
    Ok(provider)
}

impl ProviderFactory {
    pub fn new() -> Self {
        Self::with_constructor(builtin)
    }

    /// A factory that builds adapters with `construct` instead of the built-ins.
    pub fn with_constructor<F>(construct: F) -> Self
    where
        F: Fn(ProviderId) -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync + 'static,
    {
        Self {
            registry: Mutex::new(HashMap::new()),
            construct: Box::new(construct),
        }
    }

    /// Process-wide factory over the built-in adapters.
    pub fn global() -> Arc<ProviderFactory> {
        static GLOBAL: OnceLock<Arc<ProviderFactory>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(ProviderFactory::new())))
    }

    /// The adapter for `id`, constructed on first use and shared afterwards.
    pub fn get(&self, id: ProviderId) -> Result<Arc<dyn Provider>, ProviderError> {
        let mut registry = self
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(provider) = registry.get(&id) {
            return Ok(Arc::clone(provider));
        }
        let provider = (self.construct)(id)?;
        tracing::debug!("Constructed provider adapter {}", id);
        registry.insert(id, Arc::clone(&provider));
        Ok(provider)
    }

    /// Lookup by wire name; names outside the provider set are a config error.
    pub fn get_by_name(&self, name: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        let id = name
            .parse::<ProviderId>()
            .map_err(|e| ProviderError::Config(e.to_string()))?;
        self.get(id)
    }
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn constructs_each_adapter_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory = ProviderFactory::with_constructor(move |id| {
            counter.fetch_add(1, Ordering::SeqCst);
            builtin(id)
        });

        let a = factory.get(ProviderId::Gemini).unwrap();
        let b = factory.get(ProviderId::Gemini).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        factory.get(ProviderId::Zhipu).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn builtin_adapters_report_their_id() {
        let factory = ProviderFactory::new();
        for id in ProviderId::ALL {
            assert_eq!(factory.get(id).unwrap().id(), id);
        }
        assert_eq!(factory.get(ProviderId::Custom).unwrap().label(), "Custom OpenAI-compatible");
    }

    #[test]
    fn unknown_name_fails_fast() {
        let factory = ProviderFactory::new();
        let err = factory.get_by_name("cohere").err().unwrap();
        assert!(matches!(err, ProviderError::Config(_)));
        assert_eq!(err.to_string(), "Unsupported provider: cohere");
        assert!(!err.is_retryable());
        assert_eq!(factory.get_by_name("DeepSeek").unwrap().id(), ProviderId::DeepSeek);
    }

    #[test]
    fn construction_failure_is_not_memoized() {
        let factory = ProviderFactory::with_constructor(|id| {
            Err(ProviderError::Config(format!("Unsupported provider: {}", id)))
        });
        assert!(factory.get(ProviderId::OpenAi).is_err());
        assert!(factory.get(ProviderId::OpenAi).is_err());
    }

    #[test]
    fn global_is_shared() {
        let a = ProviderFactory::global().get(ProviderId::Anthropic).unwrap();
        let b = ProviderFactory::global().get(ProviderId::Anthropic).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
