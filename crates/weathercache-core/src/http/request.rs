use std::fmt;

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Query parameters whose values are credentials
const SECRET_QUERY_PARAMS: &[&str] = &["appid", "api_key", "apikey"];

const REDACTED: &str = "REDACTED";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Immutable descriptor of an outbound request.
///
/// Headers travel with the request to the network but do not take part in
/// cache matching.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method, url: &str) -> Result<Self, RequestError> {
        let url = Url::parse(url).map_err(|e| RequestError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            method,
            url,
            headers: Vec::new(),
        })
    }

    /// Shorthand for a GET request
    pub fn get(url: &str) -> Result<Self, RequestError> {
        Self::new(Method::GET, url)
    }

    /// Resolve `path` against `origin`, e.g. `/static/manifest.json`
    /// against `http://127.0.0.1:5000`.
    pub fn resolve(origin: &str, path: &str) -> Result<Self, RequestError> {
        let base = Url::parse(origin).map_err(|e| RequestError::InvalidUrl {
            url: origin.to_string(),
            reason: e.to_string(),
        })?;
        let url = base.join(path).map_err(|e| RequestError::InvalidUrl {
            url: path.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
        })
    }

    pub fn from_url(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            headers: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// URL safe to show in logs and errors
    pub fn display_url(&self) -> String {
        redact_url(&self.url)
    }

    /// Cache key for this request: method plus URL without its fragment.
    pub fn key(&self) -> RequestKey {
        let mut url = self.url.clone();
        url.set_fragment(None);
        RequestKey {
            method: self.method.as_str().to_string(),
            url: url.to_string(),
        }
    }
}

/// The part of a request that identifies a cache entry.
///
/// `url` is the raw URL used for matching. `Display` redacts credentials.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    /// Copy of this key with credential query values replaced
    pub fn redacted(&self) -> RequestKey {
        RequestKey {
            method: self.method.clone(),
            url: redact_str(&self.url),
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, redact_str(&self.url))
    }
}

fn is_secret(name: &str) -> bool {
    SECRET_QUERY_PARAMS
        .iter()
        .any(|p| p.eq_ignore_ascii_case(name))
}

/// Render `url` with credential query values replaced.
pub fn redact_url(url: &Url) -> String {
    if !url.query_pairs().any(|(name, _)| is_secret(&name)) {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            let value = if is_secret(&name) {
                REDACTED.to_string()
            } else {
                value.into_owned()
            };
            (name.into_owned(), value)
        })
        .collect();
    let mut redacted = url.clone();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

/// Like `redact_url` for a string; unparseable input is returned as is.
pub fn redact_str(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => redact_url(&parsed),
        Err(_) => url.to_string(),
    }
}
