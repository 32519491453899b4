//! File-based blob cache with per-category TTL.
//!
//! Cache failures are reported as [`CacheError`] values; callers log them and
//! carry on, since nothing depends on the cache being present.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::{Duration, SystemTime};

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache key {0:?} is empty after sanitizing")]
    EmptyKey(String),
}

/// Cache categories with different TTLs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    Calendar,        // 6 hours
    Match,           // 24 hours
    ObfuscationCss,  // never expires
    ObfuscationFont, // never expires
}

impl CacheCategory {
    /// Get TTL duration, `None` for entries that never expire
    pub fn ttl(&self) -> Option<Duration> {
        match self {
            CacheCategory::Calendar => Some(Duration::from_secs(6 * 3600)),
            CacheCategory::Match => Some(Duration::from_secs(24 * 3600)),
            CacheCategory::ObfuscationCss | CacheCategory::ObfuscationFont => None,
        }
    }

    /// Get directory name for this category
    pub fn dir_name(&self) -> &str {
        match self {
            CacheCategory::Calendar => "calendar",
            CacheCategory::Match => "match_full",
            CacheCategory::ObfuscationCss | CacheCategory::ObfuscationFont => "obfcss",
        }
    }
}

/// Key → blob store
pub trait BlobStore: Send + Sync {
    /// `Ok(None)` is a miss (absent or expired)
    fn get(&self, category: CacheCategory, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    fn put(&self, category: CacheCategory, key: &str, data: &[u8]) -> Result<(), CacheError>;

    fn exists(&self, category: CacheCategory, key: &str) -> bool;
}

static UNSAFE_KEY_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_.\-]+").expect("valid regex"));

/// Make a key safe to use as a file name
pub fn sanitize_key(key: &str) -> String {
    UNSAFE_KEY_CHARS
        .replace_all(key, "_")
        .trim_matches('_')
        .to_string()
}

/// File-based cache
pub struct FileCache {
    base_dir: PathBuf,
}

impl FileCache {
    /// Create a new cache with the given base directory
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get cache directory for a category
    fn category_dir(&self, category: CacheCategory) -> PathBuf {
        self.base_dir.join(category.dir_name())
    }

    /// Get cache file path for a key
    fn cache_path(&self, category: CacheCategory, key: &str) -> Result<PathBuf, CacheError> {
        let safe = sanitize_key(key);
        if safe.is_empty() {
            return Err(CacheError::EmptyKey(key.to_string()));
        }
        Ok(self.category_dir(category).join(safe))
    }

    fn is_expired(category: CacheCategory, modified: SystemTime) -> bool {
        let Some(ttl) = category.ttl() else {
            return false;
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age > ttl)
            .unwrap_or(false)
    }
}

impl BlobStore for FileCache {
    fn get(&self, category: CacheCategory, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.cache_path(category, key)?;

        if !path.exists() {
            return Ok(None);
        }

        let modified = std::fs::metadata(&path)?.modified()?;
        if Self::is_expired(category, modified) {
            // Remove expired cache
            let _ = std::fs::remove_file(&path);
            return Ok(None);
        }

        Ok(Some(std::fs::read(&path)?))
    }

    fn put(&self, category: CacheCategory, key: &str, data: &[u8]) -> Result<(), CacheError> {
        let path = self.cache_path(category, key)?;
        std::fs::create_dir_all(self.category_dir(category))?;
        std::fs::write(&path, data)?;
        Ok(())
    }

    fn exists(&self, category: CacheCategory, key: &str) -> bool {
        matches!(self.get(category, key), Ok(Some(_)))
    }
}

/// Store used when caching is disabled: every read misses, writes vanish.
pub struct NoCache;

impl BlobStore for NoCache {
    fn get(&self, _category: CacheCategory, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Ok(None)
    }

    fn put(&self, _category: CacheCategory, _key: &str, _data: &[u8]) -> Result<(), CacheError> {
        Ok(())
    }

    fn exists(&self, _category: CacheCategory, _key: &str) -> bool {
        false
    }
}

/// Read a UTF-8 entry, treating errors and invalid text as a miss.
pub fn get_text(store: &dyn BlobStore, category: CacheCategory, key: &str) -> Option<String> {
    match store.get(category, key) {
        Ok(Some(data)) => String::from_utf8(data).ok(),
        Ok(None) => None,
        Err(e) => {
            tracing::debug!("cache read {}/{} failed: {}", category.dir_name(), key, e);
            None
        }
    }
}

/// Read a binary entry, treating errors as a miss.
pub fn get_bytes(store: &dyn BlobStore, category: CacheCategory, key: &str) -> Option<Vec<u8>> {
    store.get(category, key).unwrap_or_else(|e| {
        tracing::debug!("cache read {}/{} failed: {}", category.dir_name(), key, e);
        None
    })
}

/// Write an entry, logging and ignoring failures.
pub fn put_quietly(store: &dyn BlobStore, category: CacheCategory, key: &str, data: &[u8]) {
    if let Err(e) = store.put(category, key, data) {
        tracing::debug!("cache write {}/{} failed: {}", category.dir_name(), key, e);
    }
}
