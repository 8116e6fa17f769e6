use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Durable key/value storage shared by every user of the client.
///
/// Each `set` replaces the entry as a whole; concurrent writers to the same
/// key resolve as last-write-wins.
pub trait CredentialCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn delete(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes().max(0)
    }
}

/// Distinguishes temp files written concurrently by threads of one process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A [`CredentialCache`] keeping one JSON file per key under a directory.
///
/// Writes go to a temporary file that is renamed over the entry, so readers
/// in this or another process never observe a partially written entry.
pub struct FileCache {
    cache_dir: PathBuf,
}

impl FileCache {
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create cache directory {}", cache_dir.display()))?;
        Ok(Self { cache_dir })
    }

    fn cache_path(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.cache_dir.join(format!("{}.json", name))
    }
}

impl CredentialCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.cache_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache file: {}", key))?;

        match serde_json::from_str::<CachedData<String>>(&contents) {
            Ok(cached) => {
                debug!(cache = key, age_minutes = cached.age_minutes(), "Cache entry loaded");
                Ok(Some(cached.data))
            }
            Err(e) => {
                // A torn or foreign file is a miss; the next set overwrites it.
                debug!(cache = key, error = %e, "Ignoring unreadable cache entry");
                Ok(None)
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.cache_path(key);
        let contents = serde_json::to_string_pretty(&CachedData::new(value))?;

        let tmp = path.with_extension(format!(
            "json.tmp-{}-{}",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write cache file: {}", key))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace cache file: {}", key))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let path = self.cache_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete cache file: {}", key)),
        }
    }
}

/// An in-process [`CredentialCache`].
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("credential cache lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| anyhow!("credential cache lock poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| anyhow!("credential cache lock poisoned"))?
            .remove(key);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_cached_data_age_minutes() {
        let mut cached = CachedData::new("token".to_string());
        assert!(cached.age_minutes() <= 1);

        cached.cached_at = Utc::now() - Duration::minutes(61);
        assert!(cached.age_minutes() >= 60);

        // Clock skew never reports a negative age
        cached.cached_at = Utc::now() + Duration::minutes(10);
        assert_eq!(cached.age_minutes(), 0);
    }

    #[test]
    fn test_file_cache_round_trip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().join("tokens")).unwrap();

        assert_eq!(cache.get("edsAuthenticationToken").unwrap(), None);
        cache.set("edsAuthenticationToken", "{\"value\":\"abc\"}").unwrap();
        assert_eq!(
            cache.get("edsAuthenticationToken").unwrap().as_deref(),
            Some("{\"value\":\"abc\"}")
        );

        cache.set("edsAuthenticationToken", "second").unwrap();
        assert_eq!(cache.get("edsAuthenticationToken").unwrap().as_deref(), Some("second"));

        cache.delete("edsAuthenticationToken").unwrap();
        assert_eq!(cache.get("edsAuthenticationToken").unwrap(), None);
        // Deleting a missing entry is not an error
        cache.delete("edsAuthenticationToken").unwrap();
    }

    #[test]
    fn test_file_cache_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf()).unwrap();
        cache.set("key", "value").unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["key.json".to_string()]);
    }

    #[test]
    fn test_file_cache_sanitizes_keys() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf()).unwrap();
        cache.set("../escape/attempt", "v").unwrap();
        assert!(dir.path().join("___escape_attempt.json").exists());
        assert_eq!(cache.get("../escape/attempt").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_file_cache_treats_garbage_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path().to_path_buf()).unwrap();
        std::fs::write(dir.path().join("key.json"), "not json").unwrap();
        assert_eq!(cache.get("key").unwrap(), None);
    }

    #[test]
    fn test_memory_cache() {
        let cache = MemoryCache::new();
        cache.set("a", "1").unwrap();
        assert_eq!(cache.get("a").unwrap().as_deref(), Some("1"));
        cache.delete("a").unwrap();
        assert_eq!(cache.get("a").unwrap(), None);
    }
}
