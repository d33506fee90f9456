//! Named caches of response snapshots.
//!
//! A `CacheStorage` holds any number of caches, each identified by a name
//! that embeds a version suffix by convention (`weather-cache-v1`). Each
//! cache maps a `RequestKey` to the `Response` snapshot stored for it.
//! There is no expiry and no size accounting; `cached_at` is kept for
//! display only.
//!
//! Two backends are provided:
//! - `MemoryStorage`: process-local, used by tests and one-shot runs
//! - `FileStorage`: one directory per cache, survives restarts

pub mod file;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::{RequestKey, Response};

pub use file::FileStorage;
pub use memory::MemoryStorage;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Invalid cache name: {0:?}")]
    InvalidName(String),

    #[error("Cache not found: {0}")]
    NotFound(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache entry: {0}")]
    Corrupt(String),
}

/// Storage capability consumed by the interceptor.
///
/// Implementations must be safe for concurrent use from several in-flight
/// fetches. Writes to the same key are last-writer-wins and there is no
/// ordering between a `put` and a concurrent lookup of the same key.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open the named cache, creating it if absent
    async fn open(&self, name: &str) -> Result<(), CacheError>;

    async fn has(&self, name: &str) -> Result<bool, CacheError>;

    /// Cache names in creation order
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Delete the named cache. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// Look up `key` in one cache
    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, CacheError>;

    /// Store a snapshot under `key`, replacing any previous one.
    /// Fails with `CacheError::NotFound` if the cache has not been opened.
    async fn put(&self, name: &str, key: &RequestKey, response: Response)
        -> Result<(), CacheError>;

    /// Keys stored in one cache, with the time each was written
    async fn entries(&self, name: &str) -> Result<Vec<CachedData<RequestKey>>, CacheError>;

    /// Look up `key` across every cache in creation order; first hit wins.
    async fn match_request(&self, key: &RequestKey) -> Result<Option<Response>, CacheError> {
        for name in self.keys().await? {
            match self.get(&name, key).await {
                Ok(Some(response)) => return Ok(Some(response)),
                Ok(None) => {}
                // Deleted between keys() and get()
                Err(CacheError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

/// Reject names that cannot be used as a directory name.
pub fn validate_cache_name(name: &str) -> Result<(), CacheError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
    {
        return Err(CacheError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// A stored value together with the time it was written.
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
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CachedData<U> {
        CachedData {
            data: f(self.data),
            cached_at: self.cached_at,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
