//! In-process fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::http::{Request, RequestKey, Response};
use crate::network::{FetchError, Network};
use crate::storage::{CacheError, CacheStorage, CachedData, MemoryStorage};

enum Route {
    Respond(u16, String),
    Fail,
}

/// Network double with canned routes that records every request it sees.
/// Unknown URLs fail like an unreachable host.
#[derive(Default)]
pub(crate) struct FakeNetwork {
    routes: Mutex<HashMap<String, Route>>,
    calls: Mutex<Vec<String>>,
    offline: AtomicBool,
}

impl FakeNetwork {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, url: &str, status: u16, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), Route::Respond(status, body.to_string()));
    }

    pub(crate) fn fail(&self, url: &str) {
        self.routes.lock().unwrap().insert(url.to_string(), Route::Fail);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = request.url().to_string();
        let display_url = request.display_url();
        self.calls.lock().unwrap().push(url.clone());
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::network(display_url, "offline"));
        }
        match self.routes.lock().unwrap().get(&url) {
            Some(Route::Respond(status, body)) => Ok(Response::new(url.clone(), *status, body.clone())),
            Some(Route::Fail) => Err(FetchError::network(display_url, "connection reset")),
            None => Err(FetchError::network(display_url, "host unreachable")),
        }
    }
}

/// In-memory storage whose `delete` fails for one cache name.
pub(crate) struct FailingDeleteStorage {
    inner: MemoryStorage,
    fail_on: String,
}

impl FailingDeleteStorage {
    pub(crate) fn new(fail_on: &str) -> Self {
        Self {
            inner: MemoryStorage::new(),
            fail_on: fail_on.to_string(),
        }
    }
}

#[async_trait]
impl CacheStorage for FailingDeleteStorage {
    async fn open(&self, name: &str) -> Result<(), CacheError> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        self.inner.has(name).await
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        self.inner.keys().await
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        if name == self.fail_on {
            return Err(CacheError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "cache is locked",
            )));
        }
        // Let the failing deletion settle first so ordering is not assumed
        tokio::task::yield_now().await;
        self.inner.delete(name).await
    }

    async fn get(&self, name: &str, key: &RequestKey) -> Result<Option<Response>, CacheError> {
        self.inner.get(name, key).await
    }

    async fn put(
        &self,
        name: &str,
        key: &RequestKey,
        response: Response,
    ) -> Result<(), CacheError> {
        self.inner.put(name, key, response).await
    }

    async fn entries(&self, name: &str) -> Result<Vec<CachedData<RequestKey>>, CacheError> {
        self.inner.entries(name).await
    }
}

/// Poll until a background store lands, or give up after a second.
pub(crate) async fn wait_for_entry(
    storage: &dyn CacheStorage,
    cache: &str,
    key: &RequestKey,
) -> Option<Response> {
    for _ in 0..100 {
        if let Ok(Some(response)) = storage.get(cache, key).await {
            return Some(response);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    None
}
