//! ResponseCache - persistent disk cache for LLM responses.
//!
//! Re-running the `script` stage with the same provider, model and prompt
//! reuses the stored response instead of paying for another completion.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::config::APP_NAME;

/// Disk cache of raw model responses keyed by request hash.
pub struct ResponseCache {
    cache_dir: PathBuf,
}

impl ResponseCache {
    /// Create a cache rooted at `cache_dir`. The directory is created on
    /// first store.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Default: ~/.cache/contents-autouploader/responses/
    pub fn with_default_dir() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join(APP_NAME)
            .join("responses");
        Self::new(cache_dir)
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Deterministic key for one request.
    /// Returns a 32-character hex string (first 16 bytes of SHA256).
    pub fn key(provider: &str, model: &str, system: &str, prompt: &str) -> String {
        let mut hasher = Sha256::new();
        for part in [provider, model, system, prompt] {
            hasher.update(part.as_bytes());
            // separator so ("ab", "c") and ("a", "bc") differ
            hasher.update([0u8]);
        }
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.txt", key))
    }

    /// Cached response text, if present.
    pub fn get(&self, key: &str) -> Option<String> {
        std::fs::read_to_string(self.entry_path(key)).ok()
    }

    /// Store a response and return the file it was written to.
    pub fn store(&self, key: &str, response: &str) -> Result<PathBuf, std::io::Error> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let path = self.entry_path(key);
        std::fs::write(&path, response)?;
        Ok(path)
    }

    /// Remove one entry. Returns true if a file was removed.
    pub fn remove(&self, key: &str) -> Result<bool, std::io::Error> {
        let path = self.entry_path(key);
        if path.exists() {
            std::fs::remove_file(path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Remove every cached response. Returns how many were removed.
    pub fn clear_all(&self) -> Result<usize, std::io::Error> {
        if !self.cache_dir.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("txt")
                && std::fs::remove_file(&path).is_ok()
            {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_key_is_deterministic() {
        let a = ResponseCache::key("claude", "m", "sys", "prompt");
        let b = ResponseCache::key("claude", "m", "sys", "prompt");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_key_depends_on_every_part() {
        let base = ResponseCache::key("claude", "m", "sys", "prompt");
        assert_ne!(base, ResponseCache::key("openai", "m", "sys", "prompt"));
        assert_ne!(base, ResponseCache::key("claude", "m2", "sys", "prompt"));
        assert_ne!(base, ResponseCache::key("claude", "m", "sys", "prompt2"));
        assert_ne!(
            ResponseCache::key("ab", "c", "", ""),
            ResponseCache::key("a", "bc", "", "")
        );
    }

    #[test]
    fn test_store_get_remove() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path().join("responses"));
        let key = ResponseCache::key("claude", "m", "", "p");

        assert!(cache.get(&key).is_none());
        cache.store(&key, "{\"title\":\"x\"}").unwrap();
        assert_eq!(cache.get(&key).as_deref(), Some("{\"title\":\"x\"}"));
        assert!(cache.remove(&key).unwrap());
        assert!(!cache.remove(&key).unwrap());
    }

    #[test]
    fn test_clear_all() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path().to_path_buf());
        cache.store("a", "1").unwrap();
        cache.store("b", "2").unwrap();
        assert_eq!(cache.clear_all().unwrap(), 2);
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_clear_missing_dir() {
        let cache = ResponseCache::new(PathBuf::from("/nonexistent/contents-cache"));
        assert_eq!(cache.clear_all().unwrap(), 0);
    }
}
