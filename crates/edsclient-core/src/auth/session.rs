use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Key of the EDS session token.
pub const SESSION_ID_KEY: &str = "sessionID";

/// Key of the profile the session was created against.
pub const PROFILE_ID_KEY: &str = "profileID";

/// Key of the search criteria (Info response) fetched for the session.
pub const INFO_KEY: &str = "info";

/// Key/value storage scoped to one caller session.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Drop `key`; removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<()>;
}

/// A [`SessionStore`] that lives as long as the value does.
#[derive(Default)]
pub struct MemorySessionStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))?
            .remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    pub values: BTreeMap<String, String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A [`SessionStore`] persisted to `session.json` in a cache directory, so
/// successive runs of a command-line tool share one EDS session.
pub struct FileSessionStore {
    cache_dir: PathBuf,
    data: Mutex<SessionData>,
}

impl FileSessionStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            data: Mutex::new(SessionData::default()),
        }
    }

    /// Open the store, loading any session saved earlier.
    pub fn open(cache_dir: PathBuf) -> Result<Self> {
        let store = Self::new(cache_dir);
        store.load()?;
        Ok(store)
    }

    /// Load session from disk. Returns whether a saved session was found.
    ///
    /// An unreadable session file counts as no session; the next `set`
    /// replaces it.
    pub fn load(&self) -> Result<bool> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(false);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let loaded: SessionData = match serde_json::from_str(&contents) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable session file");
                *self.lock()? = SessionData::default();
                return Ok(false);
            }
        };
        debug!(entries = loaded.values.len(), "Session loaded");
        *self.lock()? = loaded;
        Ok(true)
    }

    /// Save session to disk via a temp file, so readers never see a
    /// partial write.
    fn save(&self, data: &SessionData) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        let tmp = path.with_extension(format!("json.tmp-{}", std::process::id()));
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        std::fs::rename(&tmp, &path).context("Failed to replace session file")?;
        Ok(())
    }

    /// Clear session data
    pub fn clear(&self) -> Result<()> {
        *self.lock()? = SessionData::default();
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, SessionData>> {
        self.data
            .lock()
            .map_err(|_| anyhow!("session store lock poisoned"))
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut data = self.lock()?;
        data.values.insert(key.to_string(), value.to_string());
        data.updated_at = Some(Utc::now());
        self.save(&data)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut data = self.lock()?;
        if data.values.remove(key).is_none() {
            return Ok(());
        }
        data.updated_at = Some(Utc::now());
        self.save(&data)
    }
}
