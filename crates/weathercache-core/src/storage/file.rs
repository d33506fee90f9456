//! On-disk cache storage.
//!
//! ```text
//! <root>/
//!   caches.json                 # cache names in creation order
//!   weather-cache-v1/
//!     <sha256 of key>.json      # CachedData<StoredResponse>
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{validate_cache_name, CacheError, CacheStorage, CachedData};
use crate::http::{redact_str, RequestKey, Response};

/// Manifest file name in the storage root
const MANIFEST_FILE: &str = "caches.json";

/// Keys and URLs are stored redacted; the entry file name is the digest of
/// the raw key, so matching does not need the credentials on disk.
#[derive(Debug, Serialize, Deserialize)]
struct StoredResponse {
    key: RequestKey,
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    /// Base64 of the raw body bytes
    body: String,
}

impl StoredResponse {
    fn from_response(key: &RequestKey, response: &Response) -> Self {
        Self {
            key: key.redacted(),
            url: redact_str(response.url()),
            status: response.status(),
            headers: response.headers().to_vec(),
            body: STANDARD.encode(response.clone().bytes()),
        }
    }

    fn into_response(self) -> Result<Response, CacheError> {
        let body = STANDARD
            .decode(self.body.as_bytes())
            .map_err(|e| CacheError::Corrupt(format!("{}: {}", self.key, e)))?;
        Ok(Response::new(self.url, self.status, body).with_headers(self.headers))
    }
}

pub struct FileStorage {
    root: PathBuf,
    /// Serializes manifest read-modify-write cycles
    manifest_lock: Mutex<()>,
    tmp_counter: AtomicU64,
}

impl FileStorage {
    pub fn new(root: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            manifest_lock: Mutex::new(()),
            tmp_counter: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn entry_path(&self, name: &str, key: &RequestKey) -> PathBuf {
        let digest = Sha256::digest(key.to_string().as_bytes());
        self.cache_dir(name).join(format!("{}.json", hex::encode(digest)))
    }

    async fn read_manifest(&self) -> Result<Vec<String>, CacheError> {
        match fs::read_to_string(self.manifest_path()).await {
            Ok(contents) => serde_json::from_str(&contents)
                .map_err(|e| CacheError::Corrupt(format!("{}: {}", MANIFEST_FILE, e))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_manifest(&self, names: &[String]) -> Result<(), CacheError> {
        let contents = serde_json::to_string_pretty(names)
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;
        self.write_atomic(&self.manifest_path(), contents.as_bytes())
            .await
    }

    /// Write through a temp file and rename so readers never see a partial
    /// file. Concurrent writers to the same path: last rename wins.
    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<(), CacheError> {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp-{}-{}", std::process::id(), n));
        fs::write(&tmp, contents).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn load_entry(path: &Path) -> Result<Option<CachedData<StoredResponse>>, CacheError> {
        let contents = match fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let cached = serde_json::from_str(&contents)
            .map_err(|e| CacheError::Corrupt(format!("{}: {}", path.display(), e)))?;
        Ok(Some(cached))
    }

    /// Read one entry without consulting the manifest. A missing cache
    /// directory reads as a miss.
    async fn read_entry(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, CacheError> {
        match Self::load_entry(&self.entry_path(name, key)).await? {
            // Guard against a digest collision
            Some(cached) if cached.data.key == key.redacted() => {
                Ok(Some(cached.data.into_response()?))
            }
            Some(_) => Ok(None),
            None => Ok(None),
        }
    }

    async fn ensure_exists(&self, name: &str) -> Result<(), CacheError> {
        if self.has(name).await? {
            Ok(())
        } else {
            Err(CacheError::NotFound(name.to_string()))
        }
    }
}

#[async_trait]
impl CacheStorage for FileStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        validate_cache_name(name)?;
        let _guard = self.manifest_lock.lock().await;
        fs::create_dir_all(self.cache_dir(name)).await?;
        let mut names = self.read_manifest().await?;
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
            self.write_manifest(&names).await?;
            debug!(cache = name, "Created cache");
        }
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.read_manifest().await?.iter().any(|n| n == name))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.read_manifest().await
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let _guard = self.manifest_lock.lock().await;
        let mut names = self.read_manifest().await?;
        let before = names.len();
        names.retain(|n| n != name);
        if names.len() == before {
            return Ok(false);
        }
        self.write_manifest(&names).await?;

        if validate_cache_name(name).is_ok() {
            match fs::remove_dir_all(self.cache_dir(name)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        debug!(cache = name, "Deleted cache");
        Ok(true)
    }

    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, CacheError> {
        validate_cache_name(name)?;
        self.ensure_exists(name).await?;
        self.read_entry(name, key).await
    }

    async fn put(
        &self,
        name: &str,
        key: &RequestKey,
        response: Response,
    ) -> Result<(), CacheError> {
        validate_cache_name(name)?;
        self.ensure_exists(name).await?;
        let cached = CachedData::new(StoredResponse::from_response(key, &response));
        let contents = serde_json::to_string_pretty(&cached)
            .map_err(|e| CacheError::Corrupt(e.to_string()))?;
        self.write_atomic(&self.entry_path(name, key), contents.as_bytes())
            .await
    }

    async fn entries(&self, name: &str) -> Result<Vec<CachedData<RequestKey>>, CacheError> {
        validate_cache_name(name)?;
        self.ensure_exists(name).await?;

        let mut entries = Vec::new();
        let mut dir = match fs::read_dir(self.cache_dir(name)).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match Self::load_entry(&path).await {
                Ok(Some(cached)) => entries.push(cached.map(|stored| stored.key)),
                Ok(None) => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry"),
            }
        }
        entries.sort_by(|a, b| a.cached_at.cmp(&b.cached_at));
        Ok(entries)
    }

    /// Reads the manifest once, then each cache's entry file directly.
    async fn match_request(&self, key: &RequestKey) -> Result<Option<Response>, CacheError> {
        for name in self.read_manifest().await? {
            if validate_cache_name(&name).is_err() {
                continue;
            }
            if let Some(response) = self.read_entry(&name, key).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}
