//! Outbound fetch capability.
//!
//! `Network` is the seam the interceptor uses to reach the network; the
//! production implementation is `HttpNetwork` over reqwest. A fetch fails
//! only on transport problems. HTTP error statuses are ordinary responses.

pub mod client;

use async_trait::async_trait;
use thiserror::Error;

use crate::http::{Request, Response};
use crate::storage::CacheError;

pub use client::HttpNetwork;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// Network failed and no cached snapshot exists for the request
    #[error("{url} is unavailable offline and not cached")]
    NotCached {
        url: String,
        #[source]
        source: Box<FetchError>,
    },

    #[error("Cache storage error: {0}")]
    Storage(#[from] CacheError),
}

impl FetchError {
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        FetchError::Network {
            url: url.into(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}
