use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{join_all, try_join_all, BoxFuture};
use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::{ActivateError, InstallError, InterceptorConfig};
use crate::http::{Request, RequestKey, Response};
use crate::network::{FetchError, Network};
use crate::storage::{CacheError, CacheStorage};

/// Routing class of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    /// Weather data: network-first, cache as fallback
    RemoteApi,
    /// Application shell: cache-first, network as fallback
    StaticAsset,
}

/// The install, activate and fetch handlers for one cache version.
///
/// Clone is cheap; storage, network and the background store set are
/// shared handles. Background stores still pending when the last clone is
/// dropped are aborted, so hosts call `settle` before shutting down.
#[derive(Clone)]
pub struct Interceptor {
    config: Arc<InterceptorConfig>,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
    background: Arc<Mutex<JoinSet<()>>>,
}

impl Interceptor {
    pub fn new(
        config: InterceptorConfig,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            network,
            background: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    pub fn config(&self) -> &InterceptorConfig {
        &self.config
    }

    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    pub fn storage(&self) -> &Arc<dyn CacheStorage> {
        &self.storage
    }

    pub fn classify(&self, request: &Request) -> RequestClass {
        if request.url().as_str().contains(self.config.api_host.as_str()) {
            RequestClass::RemoteApi
        } else {
            RequestClass::StaticAsset
        }
    }

    // ===== Install =====

    /// Store a snapshot of every precache path in the current cache.
    ///
    /// All paths are fetched before anything is written, so a single failed
    /// fetch or non-2xx status leaves the cache without any new entries.
    pub async fn install(&self) -> Result<(), InstallError> {
        let cache_name = self.cache_name();
        let requests = self
            .config
            .precache_paths
            .iter()
            .map(|path| {
                Request::resolve(&self.config.origin, path).map_err(|source| {
                    InstallError::InvalidPath {
                        path: path.clone(),
                        source,
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.storage.open(cache_name).await?;

        let fetches = requests.iter().map(|request| async move {
            let url = request.display_url();
            let response = self
                .network
                .fetch(request)
                .await
                .map_err(|source| InstallError::Fetch {
                    url: url.clone(),
                    source,
                })?;
            if !response.ok() {
                return Err(InstallError::BadStatus {
                    url,
                    status: response.status(),
                });
            }
            Ok((request.key(), response))
        });
        let snapshots = try_join_all(fetches).await?;

        for (key, response) in snapshots {
            self.storage.put(cache_name, &key, response).await?;
        }

        info!(cache = cache_name, entries = requests.len(), "Installed");
        Ok(())
    }

    // ===== Activate =====

    /// Delete every cache except the current one.
    ///
    /// Deletions run concurrently and all of them settle before this
    /// returns; the first failure is reported.
    pub async fn activate(&self) -> Result<(), ActivateError> {
        let current = self.cache_name();
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != current)
            .collect();

        let deletions = stale.iter().map(|name| async move {
            (name, self.storage.delete(name).await)
        });

        let mut first_error = None;
        for (name, result) in join_all(deletions).await {
            match result {
                Ok(_) => info!(cache = %name, "Deleted old cache"),
                Err(source) => {
                    warn!(cache = %name, error = %source, "Failed to delete old cache");
                    if first_error.is_none() {
                        first_error = Some(ActivateError::Delete {
                            name: name.clone(),
                            source,
                        });
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(cache = current, "Activated");
                Ok(())
            }
        }
    }

    // ===== Fetch =====

    /// Take responsibility for `request` and return the future producing
    /// its response. Classification happens here, before any async work.
    pub fn fetch(&self, request: Request) -> BoxFuture<'static, Result<Response, FetchError>> {
        let class = self.classify(&request);
        debug!(url = %request.display_url(), class = ?class, "Intercepted request");
        match class {
            RequestClass::RemoteApi => self.clone().network_first(request).boxed(),
            RequestClass::StaticAsset => self.clone().cache_first(request).boxed(),
        }
    }

    async fn network_first(self, request: Request) -> Result<Response, FetchError> {
        match self.network.fetch(&request).await {
            Ok(response) => {
                self.store_in_background(request.key(), response.clone());
                Ok(response)
            }
            Err(e) => {
                warn!(
                    url = %request.display_url(),
                    error = %e,
                    "Network failed, falling back to cache"
                );
                match self.storage.match_request(&request.key()).await? {
                    Some(cached) => {
                        debug!(url = %request.display_url(), "Serving cached snapshot");
                        Ok(cached.into_cached())
                    }
                    None => Err(FetchError::NotCached {
                        url: request.display_url(),
                        source: Box::new(e),
                    }),
                }
            }
        }
    }

    async fn cache_first(self, request: Request) -> Result<Response, FetchError> {
        if let Some(cached) = self.storage.match_request(&request.key()).await? {
            debug!(url = %request.display_url(), "Cache hit");
            return Ok(cached.into_cached());
        }
        debug!(url = %request.display_url(), "Cache miss, fetching from network");
        // Not written back; only install populates static entries
        self.network.fetch(&request).await
    }

    /// Best-effort write the response does not wait for. The result is only
    /// logged; `settle` waits for it.
    fn store_in_background(&self, key: RequestKey, snapshot: Response) {
        let storage = Arc::clone(&self.storage);
        let cache_name = self.config.cache_name.clone();
        let mut tasks = self.lock_background();
        // Reap finished stores so the set stays small
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            if let Err(e) = store_snapshot(storage.as_ref(), &cache_name, &key, snapshot).await {
                debug!(cache = %cache_name, key = %key, error = %e, "Background cache write failed");
            }
        });
    }

    fn lock_background(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.background
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait until every background store has finished, including stores
    /// started while waiting.
    pub async fn settle(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.lock_background());
            if tasks.is_empty() {
                return;
            }
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    debug!(error = %e, "Background cache write task did not complete");
                }
            }
        }
    }
}

async fn store_snapshot(
    storage: &dyn CacheStorage,
    cache_name: &str,
    key: &RequestKey,
    snapshot: Response,
) -> Result<(), CacheError> {
    storage.open(cache_name).await?;
    storage.put(cache_name, key, snapshot).await
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStorage, MemoryStorage};
    use crate::testing::{wait_for_entry, FailingDeleteStorage, FakeNetwork};
    use tempfile::TempDir;

    const ORIGIN: &str = "http://127.0.0.1:5000";
    const API_URL: &str = "https://api.openweathermap.org/data?q=Tokyo";

    fn setup() -> (Interceptor, Arc<MemoryStorage>, Arc<FakeNetwork>) {
        let storage = Arc::new(MemoryStorage::new());
        let network = Arc::new(FakeNetwork::new());
        let interceptor = Interceptor::new(
            InterceptorConfig::default().with_origin(ORIGIN),
            storage.clone(),
            network.clone(),
        );
        (interceptor, storage, network)
    }

    fn serve_shell(network: &FakeNetwork) {
        network.respond("http://127.0.0.1:5000/", 200, "<html>shell</html>");
        network.respond("http://127.0.0.1:5000/static/manifest.json", 200, r#"{"name":"weather"}"#);
    }

    fn key(url: &str) -> RequestKey {
        Request::get(url).unwrap().key()
    }

    #[test]
    fn test_classify() {
        let (interceptor, _, _) = setup();
        let api = Request::get(API_URL).unwrap();
        let shell = Request::get("http://127.0.0.1:5000/").unwrap();
        let lookalike = Request::get("https://openweathermap.org/city/1850147").unwrap();
        assert_eq!(interceptor.classify(&api), RequestClass::RemoteApi);
        assert_eq!(interceptor.classify(&shell), RequestClass::StaticAsset);
        assert_eq!(interceptor.classify(&lookalike), RequestClass::StaticAsset);
    }

    // ===== Install =====

    #[tokio::test]
    async fn test_install_stores_application_shell() {
        let (interceptor, storage, network) = setup();
        serve_shell(&network);

        interceptor.install().await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["weather-cache-v1"]);
        let root = storage
            .get("weather-cache-v1", &key("http://127.0.0.1:5000/"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(root.text(), "<html>shell</html>");
        assert!(storage
            .get("weather-cache-v1", &key("http://127.0.0.1:5000/static/manifest.json"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_install_failure_stores_nothing() {
        let (interceptor, storage, network) = setup();
        network.respond("http://127.0.0.1:5000/", 200, "<html>shell</html>");
        network.fail("http://127.0.0.1:5000/static/manifest.json");

        let err = interceptor.install().await.unwrap_err();
        assert!(matches!(err, InstallError::Fetch { .. }));
        assert!(storage.entries("weather-cache-v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_rejects_error_status() {
        let (interceptor, storage, network) = setup();
        network.respond("http://127.0.0.1:5000/", 200, "<html>shell</html>");
        network.respond("http://127.0.0.1:5000/static/manifest.json", 404, "not found");

        let err = interceptor.install().await.unwrap_err();
        assert!(matches!(err, InstallError::BadStatus { status: 404, .. }));
        assert!(storage.entries("weather-cache-v1").await.unwrap().is_empty());
    }

    // ===== Activate =====

    #[tokio::test]
    async fn test_activate_deletes_old_versions() {
        let (interceptor, storage, _) = setup();
        storage.open("weather-cache-v0").await.unwrap();
        storage.open("weather-cache-v1").await.unwrap();
        storage.open("unrelated").await.unwrap();

        interceptor.activate().await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["weather-cache-v1"]);
    }

    #[tokio::test]
    async fn test_activate_with_no_caches() {
        let (interceptor, storage, _) = setup();
        interceptor.activate().await.unwrap();
        assert!(storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_activate_failure_settles_other_deletions() {
        let storage = Arc::new(FailingDeleteStorage::new("weather-cache-v0"));
        let network = Arc::new(FakeNetwork::new());
        let interceptor = Interceptor::new(InterceptorConfig::default(), storage.clone(), network);
        for name in ["weather-cache-v0", "weather-cache-beta", "weather-cache-v1", "scratch"] {
            storage.open(name).await.unwrap();
        }

        let err = interceptor.activate().await.unwrap_err();
        match err {
            ActivateError::Delete { name, .. } => assert_eq!(name, "weather-cache-v0"),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(
            storage.keys().await.unwrap(),
            vec!["weather-cache-v0", "weather-cache-v1"]
        );
    }

    // ===== Remote API: network-first =====

    #[tokio::test]
    async fn test_api_success_returns_live_response_and_stores_copy() {
        let (interceptor, storage, network) = setup();
        network.respond(API_URL, 200, r#"{"fresh":true}"#);

        let response = interceptor.fetch(Request::get(API_URL).unwrap()).await.unwrap();
        assert!(!response.is_from_cache());
        assert_eq!(response.text(), r#"{"fresh":true}"#);

        let stored = wait_for_entry(storage.as_ref(), "weather-cache-v1", &key(API_URL))
            .await
            .expect("snapshot should be stored in the background");
        assert_eq!(stored.text(), r#"{"fresh":true}"#);
    }

    #[tokio::test]
    async fn test_api_error_status_is_still_network_success() {
        let (interceptor, storage, network) = setup();
        network.respond(API_URL, 500, "upstream down");

        let response = interceptor.fetch(Request::get(API_URL).unwrap()).await.unwrap();
        assert_eq!(response.status(), 500);
        assert!(wait_for_entry(storage.as_ref(), "weather-cache-v1", &key(API_URL))
            .await
            .is_some());
    }

    #[tokio::test]
    async fn test_api_network_failure_serves_prior_snapshot() {
        let (interceptor, storage, network) = setup();
        storage.open("weather-cache-v1").await.unwrap();
        storage
            .put("weather-cache-v1", &key(API_URL), Response::new(API_URL, 200, "yesterday"))
            .await
            .unwrap();
        network.set_offline(true);

        let response = interceptor.fetch(Request::get(API_URL).unwrap()).await.unwrap();
        assert!(response.is_from_cache());
        assert_eq!(response.status(), 200);
        assert_eq!(response.text(), "yesterday");
        assert_eq!(network.calls_to(API_URL), 1);
    }

    #[tokio::test]
    async fn test_api_network_failure_without_snapshot_fails() {
        let (interceptor, _, network) = setup();
        network.set_offline(true);

        let err = interceptor.fetch(Request::get(API_URL).unwrap()).await.unwrap_err();
        assert!(matches!(err, FetchError::NotCached { .. }));
    }

    #[tokio::test]
    async fn test_offline_error_hides_api_key() {
        let (interceptor, _, network) = setup();
        network.set_offline(true);
        let url = "https://api.openweathermap.org/data/2.5/forecast?q=Tokyo&appid=SECRET123";

        let err = interceptor.fetch(Request::get(url).unwrap()).await.unwrap_err();
        assert!(matches!(err, FetchError::NotCached { .. }));
        assert!(!err.to_string().contains("SECRET123"));
        assert!(err.to_string().contains("appid=REDACTED"));
        let source = std::error::Error::source(&err).map(|s| s.to_string()).unwrap_or_default();
        assert!(!source.contains("SECRET123"));
    }

    #[test]
    fn test_settled_stores_survive_runtime_shutdown() {
        let dir = TempDir::new().unwrap();
        let network = Arc::new(FakeNetwork::new());
        let urls: Vec<String> = (0..20)
            .map(|i| format!("https://api.openweathermap.org/data?q=city{}", i))
            .collect();
        for url in &urls {
            network.respond(url, 200, url);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let storage = Arc::new(FileStorage::new(dir.path().to_path_buf()).unwrap());
            let interceptor =
                Interceptor::new(InterceptorConfig::default(), storage, network.clone());
            for url in &urls {
                let response = interceptor.fetch(Request::get(url).unwrap()).await.unwrap();
                assert!(!response.is_from_cache());
            }
            interceptor.settle().await;
        });
        drop(runtime);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let storage = FileStorage::new(dir.path().to_path_buf()).unwrap();
            for url in &urls {
                let stored = storage.get("weather-cache-v1", &key(url)).await.unwrap();
                assert_eq!(stored.map(|r| r.text()).as_deref(), Some(url.as_str()));
            }
        });
    }

    #[tokio::test]
    async fn test_settle_with_nothing_pending() {
        let (interceptor, _, _) = setup();
        interceptor.settle().await;
    }

    #[tokio::test]
    async fn test_api_fallback_uses_exact_request_key() {
        let (interceptor, storage, network) = setup();
        storage.open("weather-cache-v1").await.unwrap();
        let osaka = "https://api.openweathermap.org/data?q=Osaka";
        storage
            .put("weather-cache-v1", &key(osaka), Response::new(osaka, 200, "osaka"))
            .await
            .unwrap();
        network.set_offline(true);

        let err = interceptor.fetch(Request::get(API_URL).unwrap()).await.unwrap_err();
        assert!(matches!(err, FetchError::NotCached { .. }));
    }

    // ===== Static assets: cache-first =====

    #[tokio::test]
    async fn test_static_hit_skips_network() {
        let (interceptor, _, network) = setup();
        serve_shell(&network);
        interceptor.install().await.unwrap();
        let installs = network.calls();

        let response = interceptor
            .fetch(Request::get("http://127.0.0.1:5000/").unwrap())
            .await
            .unwrap();
        assert!(response.is_from_cache());
        assert_eq!(response.text(), "<html>shell</html>");
        assert_eq!(network.calls(), installs);
    }

    #[tokio::test]
    async fn test_static_miss_fetches_without_storing() {
        let (interceptor, storage, network) = setup();
        storage.open("weather-cache-v1").await.unwrap();
        let icon = "http://127.0.0.1:5000/static/icon.png";
        network.respond(icon, 200, "png");

        let response = interceptor.fetch(Request::get(icon).unwrap()).await.unwrap();
        assert!(!response.is_from_cache());
        assert_eq!(response.text(), "png");
        assert_eq!(network.calls_to(icon), 1);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(storage.entries("weather-cache-v1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_static_miss_offline_surfaces_error() {
        let (interceptor, _, network) = setup();
        network.set_offline(true);

        let err = interceptor
            .fetch(Request::get("http://127.0.0.1:5000/").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
    }

    #[tokio::test]
    async fn test_static_lookup_searches_all_caches() {
        let (interceptor, storage, network) = setup();
        storage.open("weather-cache-v0").await.unwrap();
        storage
            .put("weather-cache-v0", &key("http://127.0.0.1:5000/"), Response::new("u", 200, "old shell"))
            .await
            .unwrap();

        let response = interceptor
            .fetch(Request::get("http://127.0.0.1:5000/").unwrap())
            .await
            .unwrap();
        assert_eq!(response.text(), "old shell");
        assert_eq!(network.calls(), 0);
    }
}
