//! Named cache generations.
//!
//! A generation is a named map from request identity (`Request::cache_key`)
//! to a stored response. The worker owns two current generations, one for
//! pre-cached static assets and one filled at runtime, and deletes any
//! other generation on activation.
//!
//! `FsCacheStorage` keeps each generation in its own directory, with one
//! `{sha256(key)}.json` metadata file and one `{sha256(key)}.body` file per
//! entry.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use super::request::Response;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse cache entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid cache name: {0}")]
    InvalidName(String),

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// A response as stored in a generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub key: String,
    pub response: Response,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn new(key: &str, response: Response) -> Self {
        Self {
            key: key.to_string(),
            response,
            cached_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// Storage for cache generations.
pub trait CacheStorage: Send + Sync {
    fn get(&self, generation: &str, key: &str) -> Result<Option<CachedResponse>, CacheError>;

    fn put(&self, generation: &str, key: &str, response: &Response) -> Result<(), CacheError>;

    /// Store every entry or none of them.
    fn put_all(&self, generation: &str, entries: &[(String, Response)]) -> Result<(), CacheError>;

    /// Names of all generations that currently exist.
    fn generations(&self) -> Result<Vec<String>, CacheError>;

    /// Returns false if the generation did not exist.
    fn delete_generation(&self, generation: &str) -> Result<bool, CacheError>;
}

// ============================================================================
// Filesystem
// ============================================================================

pub struct FsCacheStorage {
    root: PathBuf,
}

/// A file path and its bytes before a batch write.
type Snapshot = (PathBuf, Option<Vec<u8>>);

impl FsCacheStorage {
    pub fn new(root: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn generation_dir(&self, generation: &str) -> Result<PathBuf, CacheError> {
        let valid = !generation.is_empty()
            && !generation.starts_with('.')
            && generation
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(CacheError::InvalidName(generation.to_string()));
        }
        Ok(self.root.join(generation))
    }

    fn entry_stem(key: &str) -> String {
        hex::encode(Sha256::digest(key.as_bytes()))
    }

    fn meta_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{}.json", Self::entry_stem(key)))
    }

    fn body_path(dir: &Path, key: &str) -> PathBuf {
        dir.join(format!("{}.body", Self::entry_stem(key)))
    }

    fn write_entry(dir: &Path, key: &str, response: &Response) -> Result<(), CacheError> {
        let cached = CachedResponse::new(key, response.clone());

        // Body first: an entry is only visible once its metadata exists
        std::fs::write(Self::body_path(dir, key), &response.body)?;
        std::fs::write(Self::meta_path(dir, key), serde_json::to_string_pretty(&cached)?)?;
        Ok(())
    }

    /// Current contents of an entry's files, `None` where a file is absent.
    fn snapshot_entry(dir: &Path, key: &str) -> Result<Vec<Snapshot>, CacheError> {
        [Self::meta_path(dir, key), Self::body_path(dir, key)]
            .into_iter()
            .map(|path| match std::fs::read(&path) {
                Ok(bytes) => Ok((path, Some(bytes))),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok((path, None)),
                Err(e) => Err(e.into()),
            })
            .collect()
    }

    /// Put every snapshotted file back the way it was.
    fn restore(generation: &str, snapshots: &[Snapshot]) {
        // Newest first, so a key repeated in one batch ends at its oldest state
        for (path, previous) in snapshots.iter().rev() {
            let result = match previous {
                Some(bytes) => std::fs::write(path, bytes),
                None => match std::fs::remove_file(path) {
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                    other => other,
                },
            };
            if let Err(e) = result {
                warn!(cache = generation, path = %path.display(), error = %e, "Cache rollback failed");
            }
        }
    }
}

impl CacheStorage for FsCacheStorage {
    fn get(&self, generation: &str, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        let dir = self.generation_dir(generation)?;
        let meta_path = Self::meta_path(&dir, key);
        if !meta_path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&meta_path)?;
        let mut cached: CachedResponse = serde_json::from_str(&contents)?;
        if cached.key != key {
            warn!(cache = generation, key, stored = %cached.key, "Cache key collision");
            return Ok(None);
        }
        cached.response.body = std::fs::read(Self::body_path(&dir, key))?;
        Ok(Some(cached))
    }

    fn put(&self, generation: &str, key: &str, response: &Response) -> Result<(), CacheError> {
        let dir = self.generation_dir(generation)?;
        std::fs::create_dir_all(&dir)?;
        Self::write_entry(&dir, key, response)?;
        debug!(cache = generation, key, "Cached response");
        Ok(())
    }

    fn put_all(&self, generation: &str, entries: &[(String, Response)]) -> Result<(), CacheError> {
        let dir = self.generation_dir(generation)?;
        std::fs::create_dir_all(&dir)?;

        let mut snapshots = Vec::with_capacity(entries.len() * 2);
        for (key, response) in entries {
            let result = Self::snapshot_entry(&dir, key).and_then(|previous| {
                snapshots.extend(previous);
                Self::write_entry(&dir, key, response)
            });
            if let Err(e) = result {
                warn!(cache = generation, key = %key, error = %e, "Batch write failed, rolling back");
                Self::restore(generation, &snapshots);
                return Err(e);
            }
        }

        debug!(cache = generation, count = entries.len(), "Cached batch");
        Ok(())
    }

    fn generations(&self) -> Result<Vec<String>, CacheError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn delete_generation(&self, generation: &str) -> Result<bool, CacheError> {
        let dir = self.generation_dir(generation)?;
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)?;
        Ok(true)
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// Cache storage held in process memory. Counts writes.
#[derive(Default)]
pub struct MemoryCacheStorage {
    generations: Mutex<BTreeMap<String, HashMap<String, CachedResponse>>>,
    writes: AtomicUsize,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries written since creation.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn entry_count(&self, generation: &str) -> usize {
        self.generations
            .lock()
            .map(|g| g.get(generation).map_or(0, HashMap::len))
            .unwrap_or(0)
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, HashMap<String, CachedResponse>>>, CacheError>
    {
        self.generations.lock().map_err(|_| CacheError::LockPoisoned)
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn get(&self, generation: &str, key: &str) -> Result<Option<CachedResponse>, CacheError> {
        Ok(self
            .lock()?
            .get(generation)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn put(&self, generation: &str, key: &str, response: &Response) -> Result<(), CacheError> {
        self.lock()?
            .entry(generation.to_string())
            .or_default()
            .insert(key.to_string(), CachedResponse::new(key, response.clone()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn put_all(&self, generation: &str, entries: &[(String, Response)]) -> Result<(), CacheError> {
        let mut generations = self.lock()?;
        let target = generations.entry(generation.to_string()).or_default();
        for (key, response) in entries {
            target.insert(key.clone(), CachedResponse::new(key, response.clone()));
        }
        self.writes.fetch_add(entries.len(), Ordering::SeqCst);
        Ok(())
    }

    fn generations(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.lock()?.keys().cloned().collect())
    }

    fn delete_generation(&self, generation: &str) -> Result<bool, CacheError> {
        Ok(self.lock()?.remove(generation).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> Response {
        Response::new(200, body).with_header("content-type", "text/html")
    }

    #[test]
    fn test_fs_put_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsCacheStorage::new(dir.path().to_path_buf()).unwrap();

        storage
            .put("nishaan-dynamic-v1", "GET https://a.test/", &page("hello"))
            .unwrap();

        let hit = storage
            .get("nishaan-dynamic-v1", "GET https://a.test/")
            .unwrap()
            .unwrap();
        assert_eq!(hit.response.text(), "hello");
        assert_eq!(hit.response.header("content-type"), Some("text/html"));
        assert_eq!(hit.age_display(), "just now");

        assert!(storage
            .get("nishaan-dynamic-v1", "GET https://a.test/other")
            .unwrap()
            .is_none());
        assert!(storage
            .get("nishaan-static-v1", "GET https://a.test/")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_fs_generations_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsCacheStorage::new(dir.path().to_path_buf()).unwrap();

        storage.put("nishaan-static-v1", "GET https://a.test/", &page("a")).unwrap();
        storage
            .put_all(
                "nishaan-dynamic-v1",
                &[("GET https://a.test/b".to_string(), page("b"))],
            )
            .unwrap();

        assert_eq!(
            storage.generations().unwrap(),
            vec!["nishaan-dynamic-v1", "nishaan-static-v1"]
        );
        assert!(storage.delete_generation("nishaan-static-v1").unwrap());
        assert!(!storage.delete_generation("nishaan-static-v1").unwrap());
        assert_eq!(storage.generations().unwrap(), vec!["nishaan-dynamic-v1"]);
    }

    #[test]
    fn test_fs_put_all_failure_restores_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsCacheStorage::new(dir.path().to_path_buf()).unwrap();
        storage.put("nishaan-dynamic-v1", "GET /a", &page("old")).unwrap();

        // A directory squatting on an entry's body file makes that entry fail
        let generation_dir = dir.path().join("nishaan-dynamic-v1");
        std::fs::create_dir_all(FsCacheStorage::body_path(&generation_dir, "GET /c")).unwrap();

        let result = storage.put_all(
            "nishaan-dynamic-v1",
            &[
                ("GET /a".to_string(), page("new")),
                ("GET /b".to_string(), page("b")),
                ("GET /c".to_string(), page("c")),
            ],
        );

        assert!(result.is_err());
        let a = storage.get("nishaan-dynamic-v1", "GET /a").unwrap().unwrap();
        assert_eq!(a.response.text(), "old");
        assert!(storage.get("nishaan-dynamic-v1", "GET /b").unwrap().is_none());
        assert!(!FsCacheStorage::meta_path(&generation_dir, "GET /b").exists());
        assert!(!FsCacheStorage::body_path(&generation_dir, "GET /b").exists());
    }

    #[test]
    fn test_fs_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FsCacheStorage::new(dir.path().to_path_buf()).unwrap();
        assert!(matches!(
            storage.put("../escape", "GET https://a.test/", &page("x")),
            Err(CacheError::InvalidName(_))
        ));
    }

    #[test]
    fn test_memory_counts_writes() {
        let storage = MemoryCacheStorage::new();
        storage.put("g", "k1", &page("1")).unwrap();
        storage
            .put_all("g", &[("k2".into(), page("2")), ("k3".into(), page("3"))])
            .unwrap();
        assert_eq!(storage.writes(), 3);
        assert_eq!(storage.entry_count("g"), 3);
    }
}
