//! Debounced persistence: bursts of config mutations collapse into one write.

use super::store::ConfigStore;
use crate::types::TitleConfig;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const DEFAULT_SAVE_DELAY: Duration = Duration::from_millis(500);

#[derive(Default)]
struct SaverState {
    pending: Option<TitleConfig>,
    scheduled: bool,
}

/// Coalesces `schedule` calls into a single `ConfigStore::save` of the latest
/// snapshot, `delay` after the first call of a burst.
#[derive(Clone)]
pub struct DebouncedSaver {
    store: Arc<dyn ConfigStore>,
    delay: Duration,
    state: Arc<Mutex<SaverState>>,
}

impl DebouncedSaver {
    pub fn new(store: Arc<dyn ConfigStore>, delay: Duration) -> Self {
        Self {
            store,
            delay,
            state: Arc::new(Mutex::new(SaverState::default())),
        }
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    fn lock(state: &Mutex<SaverState>) -> MutexGuard<'_, SaverState> {
        state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `config` as the latest snapshot and arm the timer if idle.
    /// Outside a tokio runtime the snapshot is written immediately.
    pub fn schedule(&self, config: TitleConfig) {
        let arm = {
            let mut st = Self::lock(&self.state);
            st.pending = Some(config);
            !std::mem::replace(&mut st.scheduled, true)
        };
        if !arm {
            return;
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            Self::write_pending(self.store.as_ref(), &self.state);
            return;
        };
        let store = Arc::clone(&self.store);
        let state = Arc::clone(&self.state);
        let delay = self.delay;
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            Self::write_pending(store.as_ref(), &state);
        });
    }

    fn write_pending(store: &dyn ConfigStore, state: &Mutex<SaverState>) {
        let snapshot = {
            let mut st = Self::lock(state);
            st.scheduled = false;
            st.pending.take()
        };
        if let Some(cfg) = snapshot {
            if let Err(e) = store.save(&cfg) {
                tracing::warn!("Failed to persist title config: {}", e);
            }
        }
    }

    pub fn has_pending(&self) -> bool {
        Self::lock(&self.state).pending.is_some()
    }

    /// Write the pending snapshot now, if any.
    pub fn flush(&self) -> anyhow::Result<()> {
        let snapshot = Self::lock(&self.state).pending.take();
        match snapshot {
            Some(cfg) => self.store.save(&cfg),
            None => Ok(()),
        }
    }
}
