//! weathercache core library.
//!
//! A request interceptor that sits between a weather client and the network,
//! deciding per request whether to answer from a local cache or from the
//! network:
//!
//! - `interceptor`: the install/activate/fetch handlers and the
//!   `Registration` host that drives their lifecycle
//! - `storage`: named caches of response snapshots (in-memory and on-disk)
//! - `network`: the outbound fetch capability, backed by reqwest
//! - `api`: the OpenWeatherMap forecast client routed through the interceptor
//! - `auth`: API key storage in the OS keychain

pub mod api;
pub mod auth;
pub mod http;
pub mod interceptor;
pub mod network;
pub mod storage;

pub use api::{ApiError, Forecast, ForecastResult, WeatherClient};
pub use auth::ApiKeyStore;
pub use http::{Request, RequestError, RequestKey, Response, ResponseSource};
pub use interceptor::{
    ActivateError, InstallError, Interceptor, InterceptorConfig, LifecycleError, Registration,
    RequestClass, Worker, WorkerState,
};
pub use network::{FetchError, HttpNetwork, Network};
pub use storage::{CacheError, CacheStorage, CachedData, FileStorage, MemoryStorage};

#[cfg(test)]
pub(crate) mod testing;
