//! The request interceptor and the host that drives it.
//!
//! An `Interceptor` has three lifecycle hooks:
//! - `install`: populate the current cache with the application shell
//! - `activate`: delete every cache not named by the current version
//! - `fetch`: route a request to cache or network
//!
//! Requests whose URL contains the API host are network-first with a cache
//! fallback; everything else is cache-first with a network fallback.
//! `Registration` plays the host: it runs install then activate for a new
//! worker, supersedes the previous one and dispatches fetches.

pub mod handlers;
pub mod registration;

use thiserror::Error;

use crate::http::RequestError;
use crate::network::FetchError;
use crate::storage::CacheError;

pub use handlers::{Interceptor, RequestClass};
pub use registration::{Registration, Worker, WorkerState};

/// Cache name for the current release. Bump the suffix to supersede old caches.
pub const DEFAULT_CACHE_NAME: &str = "weather-cache-v1";

/// Application shell stored at install time
pub const DEFAULT_PRECACHE_PATHS: &[&str] = &["/", "/static/manifest.json"];

/// Substring identifying requests to the weather data provider
pub const DEFAULT_API_HOST: &str = "api.openweathermap.org";

/// Origin the precache paths resolve against
pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:5000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptorConfig {
    pub cache_name: String,
    pub precache_paths: Vec<String>,
    pub api_host: String,
    pub origin: String,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            cache_name: DEFAULT_CACHE_NAME.to_string(),
            precache_paths: DEFAULT_PRECACHE_PATHS.iter().map(|p| p.to_string()).collect(),
            api_host: DEFAULT_API_HOST.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
        }
    }
}

impl InterceptorConfig {
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn with_cache_name(mut self, cache_name: impl Into<String>) -> Self {
        self.cache_name = cache_name.into();
        self
    }

    pub fn with_precache_paths(mut self, paths: &[&str]) -> Self {
        self.precache_paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }
}

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Invalid precache path {path}: {source}")]
    InvalidPath {
        path: String,
        #[source]
        source: RequestError,
    },

    #[error("Failed to precache {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Failed to precache {url}: status {status}")]
    BadStatus { url: String, status: u16 },

    #[error("Cache storage error during install: {0}")]
    Storage(#[from] CacheError),
}

#[derive(Error, Debug)]
pub enum ActivateError {
    #[error("Failed to delete cache {name}: {source}")]
    Delete {
        name: String,
        #[source]
        source: CacheError,
    },

    #[error("Failed to enumerate caches: {0}")]
    Storage(#[from] CacheError),
}

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Install failed: {0}")]
    Install(#[from] InstallError),

    #[error("Activate failed: {0}")]
    Activate(#[from] ActivateError),

    #[error("Cache {0} has not been installed")]
    NotInstalled(String),

    #[error("Cache storage error: {0}")]
    Storage(#[from] CacheError),
}
