use crate::config::persist::{DEFAULT_SAVE_DELAY, DebouncedSaver};
use crate::config::resolve_credential;
use crate::config::store::ConfigStore;
use crate::prompt;
use crate::providers::ProviderError;
use crate::providers::factory::ProviderFactory;
use crate::providers::failover::{FailoverOrchestrator, GeneratedTitle};
use crate::stats;
use crate::types::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Top-level title controller: owns the configuration, allows one generation
/// at a time, and folds every run's provider events back into the config.
pub struct TitleService {
    orchestrator: FailoverOrchestrator,
    config: Mutex<TitleConfig>,
    saver: Option<DebouncedSaver>,
    busy: AtomicBool,
    current: Mutex<Option<CancellationToken>>,
}

/// Clears the busy flag and the current token when a generation ends.
struct BusyGuard<'a> {
    service: &'a TitleService,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.service.current) = None;
        self.service.busy.store(false, Ordering::Release);
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TitleService {
    pub fn builder() -> TitleServiceBuilder {
        TitleServiceBuilder::new()
    }

    /// Load the config from `store` and persist changes back to it, debounced.
    pub fn from_store(store: Arc<dyn ConfigStore>) -> anyhow::Result<Self> {
        let config = store.load()?;
        Ok(Self::builder()
            .config(config)
            .saver(DebouncedSaver::new(store, DEFAULT_SAVE_DELAY))
            .build())
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> TitleConfig {
        lock(&self.config).clone()
    }

    /// Mutate the configuration and schedule a save. Without a tokio runtime
    /// an attached saver writes immediately.
    pub fn update_config(&self, f: impl FnOnce(&mut TitleConfig)) -> TitleConfig {
        let snapshot = {
            let mut config = lock(&self.config);
            f(&mut config);
            config.normalize();
            config.clone()
        };
        self.persist(snapshot.clone());
        snapshot
    }

    fn persist(&self, snapshot: TitleConfig) {
        if let Some(saver) = &self.saver {
            saver.schedule(snapshot);
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<(BusyGuard<'_>, CancellationToken)> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let token = CancellationToken::new();
        *lock(&self.current) = Some(token.clone());
        Some((BusyGuard { service: self }, token))
    }

    /// Abort the in-flight generation. Returns `false` when nothing was running.
    pub fn cancel(&self) -> bool {
        match lock(&self.current).as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Generate a title for an already-rendered prompt.
    ///
    /// `Ok(None)` means another generation is in progress and this call did
    /// nothing. Total failure returns [`ProviderError::AllProvidersFailed`].
    pub async fn request_title(
        &self,
        prompt: &str,
        system_prompt: &str,
        params: GenerationParams,
    ) -> Result<Option<String>, ProviderError> {
        Ok(self
            .request_title_detailed(prompt, system_prompt, params)
            .await?
            .map(|generated| generated.title))
    }

    /// Like [`request_title`](Self::request_title), also reporting which provider answered.
    pub async fn request_title_detailed(
        &self,
        prompt: &str,
        system_prompt: &str,
        params: GenerationParams,
    ) -> Result<Option<GeneratedTitle>, ProviderError> {
        let Some((_guard, cancel)) = self.try_begin() else {
            tracing::debug!("Title generation already in progress; ignoring request");
            return Ok(None);
        };

        let request = GenerateRequest::new(prompt, system_prompt, params, cancel);
        let snapshot = self.config();
        let report = self.orchestrator.run(&snapshot, &request).await;

        if !report.events.is_empty() {
            let updated = {
                let mut config = lock(&self.config);
                stats::apply_events(&mut config, &report.events);
                config.clone()
            };
            self.persist(updated);
        }

        report.result.map(Some)
    }

    /// Clean up `text`, render the configured prompt, and generate with the
    /// configured sampling parameters.
    pub async fn generate_from_text(&self, text: &str) -> Result<Option<String>, ProviderError> {
        let config = self.config();
        let (prompt, system_prompt) = prompt::build_prompt(&config, text)
            .ok_or_else(|| ProviderError::Config("No content to generate a title from".into()))?;
        self.request_title(&prompt, &system_prompt, config.generation_params())
            .await
    }

    /// Check connectivity with `credential` (merged over the provider defaults),
    /// independent of the stored configuration.
    pub async fn test_connection(
        &self,
        id: ProviderId,
        credential: &ProviderCredential,
    ) -> Result<(), ProviderError> {
        let provider = self.orchestrator.factory().get(id)?;
        let resolved = resolve_credential(id, Some(credential));
        provider.test_connection(&resolved).await
    }

    /// Write any pending config snapshot immediately.
    pub fn flush(&self) -> anyhow::Result<()> {
        match &self.saver {
            Some(saver) => saver.flush(),
            None => Ok(()),
        }
    }
}

pub struct TitleServiceBuilder {
    config: TitleConfig,
    factory: Option<Arc<ProviderFactory>>,
    saver: Option<DebouncedSaver>,
}

impl TitleServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: TitleConfig::default(),
            factory: None,
            saver: None,
        }
    }

    pub fn config(mut self, config: TitleConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `factory` instead of the process-wide one.
    pub fn factory(mut self, factory: Arc<ProviderFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn saver(mut self, saver: DebouncedSaver) -> Self {
        self.saver = Some(saver);
        self
    }

    /// Persist through `store` with the given debounce delay.
    pub fn store(self, store: Arc<dyn ConfigStore>, delay: Duration) -> Self {
        self.saver(DebouncedSaver::new(store, delay))
    }

    pub fn build(self) -> TitleService {
        let mut config = self.config;
        config.normalize();
        TitleService {
            orchestrator: FailoverOrchestrator::new(self.factory.unwrap_or_else(ProviderFactory::global)),
            config: Mutex::new(config),
            saver: self.saver,
            busy: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }
}

impl Default for TitleServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
