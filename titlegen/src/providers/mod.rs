pub mod anthropic;
pub mod compatible;
pub mod deepseek;
pub mod factory;
pub mod failover;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod retry;
pub mod sanitize;
pub mod zhipu;

use crate::config::{self, ResolvedCredential};
use crate::types::{GenerateRequest, ProviderId};
use async_trait::async_trait;

/// Errors from provider operations.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Missing API key for provider {provider}")]
    MissingCredential { provider: ProviderId },

    /// Non-success HTTP status. `message` is the API's error text, else the status text.
    #[error("{message}")]
    Http {
        provider: ProviderId,
        status: u16,
        message: String,
    },

    /// The call succeeded but no usable completion could be extracted.
    #[error("{message}")]
    EmptyResponse {
        provider: ProviderId,
        message: String,
        retryable: bool,
    },

    #[error("Network error: {source}")]
    Transport {
        provider: ProviderId,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request cancelled")]
    Cancelled,

    /// Misconfiguration that no retry can fix (unsupported provider, bad URL).
    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Other(String),

    /// Every provider in the try-list failed; one entry per provider, in order.
    #[error("{}", failures.join(" | "))]
    AllProvidersFailed { failures: Vec<String> },
}

impl ProviderError {
    /// Whether another attempt against the same provider could succeed.
    /// Unclassified failures (`Transport`, `Other`) are retryable by default.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Http { status, .. } => *status >= 500 || *status == 429,
            ProviderError::EmptyResponse { retryable, .. } => *retryable,
            ProviderError::Transport { .. } | ProviderError::Other(_) => true,
            ProviderError::MissingCredential { .. }
            | ProviderError::Cancelled
            | ProviderError::Config(_)
            | ProviderError::AllProvidersFailed { .. } => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            ProviderError::Transport { source, .. } => source.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn provider(&self) -> Option<ProviderId> {
        match self {
            ProviderError::MissingCredential { provider }
            | ProviderError::Http { provider, .. }
            | ProviderError::EmptyResponse { provider, .. }
            | ProviderError::Transport { provider, .. } => Some(*provider),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }
}

/// Uniform contract every backend adapter implements.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn label(&self) -> &'static str {
        config::metadata(self.id()).label
    }

    /// Generate a title. The returned string is trimmed and whitespace-collapsed.
    async fn generate_title(
        &self,
        request: &GenerateRequest,
        credential: &ResolvedCredential,
    ) -> Result<String, ProviderError>;

    /// Cheapest authenticated call the backend offers.
    async fn test_connection(&self, credential: &ResolvedCredential) -> Result<(), ProviderError>;
}

/// Fail before any network call if the provider needs a key and none is set.
pub fn ensure_api_key(credential: &ResolvedCredential) -> Result<(), ProviderError> {
    if config::metadata(credential.provider).requires_api_key && !credential.has_api_key() {
        return Err(ProviderError::MissingCredential {
            provider: credential.provider,
        });
    }
    Ok(())
}

/// Trim and collapse internal whitespace runs. `None` when nothing is left.
pub fn clean_title(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve_credential;

    fn http_err(status: u16) -> ProviderError {
        ProviderError::Http {
            provider: ProviderId::OpenAi,
            status,
            message: String::new(),
        }
    }

    #[test]
    fn http_retryable_on_5xx_and_429_only() {
        assert!(http_err(500).is_retryable());
        assert!(http_err(503).is_retryable());
        assert!(http_err(429).is_retryable());
        assert!(!http_err(400).is_retryable());
        assert!(!http_err(401).is_retryable());
        assert!(!http_err(404).is_retryable());
    }

    #[test]
    fn classification_of_other_variants() {
        assert!(!ProviderError::MissingCredential { provider: ProviderId::Gemini }.is_retryable());
        assert!(!ProviderError::Cancelled.is_retryable());
        assert!(!ProviderError::Config("bad".into()).is_retryable());
        assert!(ProviderError::Other("connection reset".into()).is_retryable());
        assert!(
            ProviderError::EmptyResponse {
                provider: ProviderId::Zhipu,
                message: "empty".into(),
                retryable: true,
            }
            .is_retryable()
        );
    }

    #[test]
    fn aggregate_joins_with_pipes() {
        let err = ProviderError::AllProvidersFailed {
            failures: vec!["A: x".into(), "B: y".into()],
        };
        assert_eq!(err.to_string(), "A: x | B: y");
    }

    #[test]
    fn ensure_api_key_checks_resolved_key() {
        let cred = resolve_credential(ProviderId::Anthropic, None);
        assert!(matches!(
            ensure_api_key(&cred),
            Err(ProviderError::MissingCredential { provider: ProviderId::Anthropic })
        ));
        let mut with_key = cred.clone();
        with_key.api_key = "k".into();
        assert!(ensure_api_key(&with_key).is_ok());
    }

    #[test]
    fn clean_title_collapses_whitespace() {
        assert_eq!(clean_title("  A \n  Title\t here "), Some("A Title here".into()));
        assert_eq!(clean_title(" \n\t "), None);
    }
}
