//! Try the primary provider, then each fallback, until one produces a title.
//!
//! The orchestrator never touches configuration. It reports what happened as a
//! list of [`ProviderEvent`]s; `crate::stats` folds them into `UsageStats` and
//! the provider preferences.

use super::factory::ProviderFactory;
use super::retry::RetryHandler;
use super::{ProviderError, ensure_api_key};
use crate::config::{self, resolve_credential};
use crate::types::{GenerateRequest, ProviderId, TitleConfig};
use std::sync::Arc;

/// Outcome of one provider's turn in the try-list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Succeeded { provider: ProviderId },
    Failed { provider: ProviderId, message: String },
}

impl ProviderEvent {
    pub fn provider(&self) -> ProviderId {
        match self {
            ProviderEvent::Succeeded { provider } | ProviderEvent::Failed { provider, .. } => *provider,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedTitle {
    pub title: String,
    pub provider: ProviderId,
}

#[derive(Debug)]
pub struct FailoverReport {
    pub result: Result<GeneratedTitle, ProviderError>,
    /// One entry per provider that was actually tried, in try order.
    pub events: Vec<ProviderEvent>,
}

pub struct FailoverOrchestrator {
    factory: Arc<ProviderFactory>,
}

impl FailoverOrchestrator {
    pub fn new(factory: Arc<ProviderFactory>) -> Self {
        Self { factory }
    }

    pub fn factory(&self) -> &Arc<ProviderFactory> {
        &self.factory
    }

    /// Walk `[primary, ...fallbacks]` (deduplicated) against a snapshot of the
    /// configuration. Cancellation ends the walk without recording a failure.
    pub async fn run(&self, config: &TitleConfig, request: &GenerateRequest) -> FailoverReport {
        let order = config.provider_preferences.try_order();
        let mut events = Vec::with_capacity(order.len());
        let mut failures = Vec::new();

        for id in order {
            if request.cancel.is_cancelled() {
                return FailoverReport {
                    result: Err(ProviderError::Cancelled),
                    events,
                };
            }

            let label = config::metadata(id).label;
            let outcome = self.try_provider(id, config, request).await;
            match outcome {
                Ok(title) => {
                    tracing::info!("Title generated by {}", id);
                    events.push(ProviderEvent::Succeeded { provider: id });
                    return FailoverReport {
                        result: Ok(GeneratedTitle { title, provider: id }),
                        events,
                    };
                }
                Err(e) if e.is_cancelled() => {
                    tracing::debug!("Generation cancelled while trying {}", id);
                    return FailoverReport {
                        result: Err(e),
                        events,
                    };
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::warn!("{} failed: {}", label, message);
                    failures.push(format!("{}: {}", label, message));
                    events.push(ProviderEvent::Failed {
                        provider: id,
                        message,
                    });
                }
            }
        }

        FailoverReport {
            result: Err(ProviderError::AllProvidersFailed { failures }),
            events,
        }
    }

    async fn try_provider(
        &self,
        id: ProviderId,
        config: &TitleConfig,
        request: &GenerateRequest,
    ) -> Result<String, ProviderError> {
        let provider = self.factory.get(id)?;
        let credential = resolve_credential(id, config.providers.get(&id));
        // No network call for a provider that cannot authenticate.
        ensure_api_key(&credential)?;

        let handler = RetryHandler::new(config.retry_policy.clone());
        handler
            .execute(&request.cancel, |attempt| {
                tracing::debug!("{}: attempt {}", id, attempt);
                provider.generate_title(request, &credential)
            })
            .await
    }
}
