use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{FetchError, Network};
use crate::http::{Request, Response};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// reqwest-backed network.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// `url` must already be redacted; reqwest's own copy is stripped.
    fn map_error(url: &str, e: reqwest::Error) -> FetchError {
        let e = e.without_url();
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
            }
        } else {
            FetchError::network(url, e.to_string())
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let display_url = request.display_url();
        let url = display_url.as_str();
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone());
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| Self::map_error(url, e))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let final_url = response.url().to_string();
        let body = response.bytes().await.map_err(|e| Self::map_error(url, e))?;

        debug!(url = url, status = status, bytes = body.len(), "Network response");
        Ok(Response::new(final_url, status, body).with_headers(headers))
    }
}
