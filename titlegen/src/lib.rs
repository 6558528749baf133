pub mod client;
pub mod config;
pub mod prompt;
pub mod providers;
pub mod stats;
pub mod types;

// Re-exports for convenience
pub use client::{TitleService, TitleServiceBuilder};
pub use config::persist::DebouncedSaver;
pub use config::store::{ConfigStore, JsonConfigStore, MemoryConfigStore};
pub use config::{PROVIDER_METADATA, ProviderMetadata, ResolvedCredential, metadata, resolve_credential};
pub use providers::factory::ProviderFactory;
pub use providers::failover::{FailoverOrchestrator, FailoverReport, GeneratedTitle, ProviderEvent};
pub use providers::retry::RetryHandler;
pub use providers::{Provider, ProviderError};
pub use types::*;
