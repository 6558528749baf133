use crate::types::TitleConfig;
use fs2::FileExt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Get/set access to the persisted [`TitleConfig`]. Last write wins.
pub trait ConfigStore: Send + Sync {
    /// Load the stored config, normalized. A missing document yields defaults.
    fn load(&self) -> anyhow::Result<TitleConfig>;

    fn save(&self, config: &TitleConfig) -> anyhow::Result<()>;
}

/// Reads/writes the config as a JSON file with atomic writes + file lock.
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    path: PathBuf,
}

impl JsonConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default path (~/.titlegen/config.json).
    pub fn default_path() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(home.join(".titlegen").join("config.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        // Sibling lock file, so the atomic rename never replaces a locked inode.
        self.path.with_extension("json.lock")
    }

    fn ensure_parent(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = fs::set_permissions(parent, fs::Permissions::from_mode(0o700));
                }
            }
        }
        Ok(())
    }

    fn with_exclusive_lock<T>(&self, f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
        self.ensure_parent()?;
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.lock_path())?;

        lock_file.lock_exclusive()?;
        let out = f();
        let _ = lock_file.unlock();
        out
    }

    fn load_unlocked(&self) -> anyhow::Result<TitleConfig> {
        if !self.path.exists() {
            return Ok(TitleConfig::default());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(TitleConfig::default());
        }
        let mut cfg: TitleConfig = serde_json::from_str(&content)?;
        cfg.normalize();
        Ok(cfg)
    }

    fn save_unlocked(&self, config: &TitleConfig) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(config)?;

        // Write to a temp file in the same directory, then rename for atomicity.
        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600));
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Load, mutate and save under a single lock.
    pub fn update(&self, f: impl FnOnce(&mut TitleConfig)) -> anyhow::Result<TitleConfig> {
        self.with_exclusive_lock(|| {
            let mut cfg = self.load_unlocked()?;
            f(&mut cfg);
            cfg.normalize();
            self.save_unlocked(&cfg)?;
            Ok(cfg)
        })
    }
}

impl ConfigStore for JsonConfigStore {
    fn load(&self) -> anyhow::Result<TitleConfig> {
        self.with_exclusive_lock(|| self.load_unlocked())
    }

    fn save(&self, config: &TitleConfig) -> anyhow::Result<()> {
        self.with_exclusive_lock(|| self.save_unlocked(config))
    }
}

/// In-process store, for embedding callers that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    inner: Mutex<Option<TitleConfig>>,
    saves: Mutex<u64>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TitleConfig) -> Self {
        Self {
            inner: Mutex::new(Some(config)),
            saves: Mutex::new(0),
        }
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> u64 {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> anyhow::Result<TitleConfig> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("config store lock poisoned"))?;
        let mut cfg = guard.clone().unwrap_or_default();
        cfg.normalize();
        Ok(cfg)
    }

    fn save(&self, config: &TitleConfig) -> anyhow::Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("config store lock poisoned"))?;
        *guard = Some(config.clone());
        if let Ok(mut n) = self.saves.lock() {
            *n += 1;
        }
        Ok(())
    }
}
