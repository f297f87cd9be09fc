// src/utils/cache.rs
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;

/// Thread-safe store of analysis results keyed by request hash.
///
/// With a directory attached, every entry is also written as
/// `<dir>/<key>.json` and misses fall back to reading that file.
pub struct ResultCache<V> {
    entries: Arc<RwLock<HashMap<String, V>>>,
    dir: Option<PathBuf>,
}

impl<V> Clone for ResultCache<V> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            dir: self.dir.clone(),
        }
    }
}

impl<V> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ResultCache<V> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            dir: None,
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop in-memory entries. Files on disk are kept.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn path_for(&self, key: &str) -> Option<PathBuf> {
        // keys are hex digests; anything else is not mapped to a file
        if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        self.dir.as_ref().map(|d| d.join(format!("{key}.json")))
    }
}

impl<V: Clone + Serialize + DeserializeOwned> ResultCache<V> {
    /// Cache persisted under `dir`, created if missing.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            dir: Some(dir),
        })
    }

    pub fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.entries.read().get(key) {
            return Some(value.clone());
        }

        let path = self.path_for(key)?;
        let text = fs::read_to_string(&path).ok()?;
        match serde_json::from_str::<V>(&text) {
            Ok(value) => {
                debug!(key, path = %path.display(), "cache hit on disk");
                self.entries.write().insert(key.to_string(), value.clone());
                Some(value)
            }
            Err(err) => {
                warn!(key, path = %path.display(), "ignoring unreadable cache entry: {err}");
                None
            }
        }
    }

    pub fn insert(&self, key: &str, value: V) -> Result<()> {
        if let Some(path) = self.path_for(key) {
            fs::write(&path, serde_json::to_vec_pretty(&value)?)?;
        }
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    /// Cached value for `key`, or compute, store and return it.
    pub fn get_or_try_insert_with<F>(&self, key: &str, compute: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = compute()?;
        self.insert(key, value.clone())?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_memory_cache() {
        let cache: ResultCache<u32> = ResultCache::new();
        assert!(cache.get("a").is_none());
        cache.insert("a", 7).unwrap();
        assert_eq!(cache.get("a"), Some(7));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_compute_once() {
        let cache: ResultCache<String> = ResultCache::new();
        let calls = Cell::new(0);
        for _ in 0..3 {
            let v = cache
                .get_or_try_insert_with("k", || {
                    calls.set(calls.get() + 1);
                    Ok("v".to_string())
                })
                .unwrap();
            assert_eq!(v, "v");
        }
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_persisted_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let first: ResultCache<Vec<f64>> = ResultCache::with_dir(dir.path()).unwrap();
        first.insert("abc123", vec![1.0, 2.5]).unwrap();
        assert!(dir.path().join("abc123.json").exists());

        let second: ResultCache<Vec<f64>> = ResultCache::with_dir(dir.path()).unwrap();
        assert_eq!(second.get("abc123"), Some(vec![1.0, 2.5]));
    }

    #[test]
    fn test_path_like_keys_stay_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let cache: ResultCache<u8> = ResultCache::with_dir(dir.path()).unwrap();
        cache.insert("../escape", 1).unwrap();
        assert_eq!(cache.get("../escape"), Some(1));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
