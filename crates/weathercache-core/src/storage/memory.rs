use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{validate_cache_name, CacheError, CacheStorage, CachedData};
use crate::http::{RequestKey, Response};

struct NamedCache {
    name: String,
    entries: Vec<(RequestKey, CachedData<Response>)>,
}

/// Process-local cache storage.
#[derive(Default)]
pub struct MemoryStorage {
    caches: RwLock<Vec<NamedCache>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        validate_cache_name(name)?;
        let mut caches = self.caches.write().await;
        if !caches.iter().any(|c| c.name == name) {
            caches.push(NamedCache {
                name: name.to_string(),
                entries: Vec::new(),
            });
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.caches.read().await.iter().any(|c| c.name == name))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self
            .caches
            .read()
            .await
            .iter()
            .map(|c| c.name.clone())
            .collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|c| c.name != name);
        Ok(caches.len() != before)
    }

    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, CacheError> {
        let caches = self.caches.read().await;
        let cache = caches
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CacheError::NotFound(name.to_string()))?;
        Ok(cache
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, cached)| cached.data.clone()))
    }

    async fn put(
        &self,
        name: &str,
        key: &RequestKey,
        response: Response,
    ) -> Result<(), CacheError> {
        let mut caches = self.caches.write().await;
        let cache = caches
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| CacheError::NotFound(name.to_string()))?;
        let cached = CachedData::new(response);
        match cache.entries.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = cached,
            None => cache.entries.push((key.clone(), cached)),
        }
        Ok(())
    }

    async fn entries(&self, name: &str) -> Result<Vec<CachedData<RequestKey>>, CacheError> {
        let caches = self.caches.read().await;
        let cache = caches
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| CacheError::NotFound(name.to_string()))?;
        Ok(cache
            .entries
            .iter()
            .map(|(key, cached)| CachedData {
                data: key.clone(),
                cached_at: cached.cached_at,
            })
            .collect())
    }
}
