use bytes::Bytes;
use serde::de::DeserializeOwned;

/// Where a response was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
}

/// A buffered HTTP response.
///
/// `Clone` duplicates the unread body byte for byte. The body accessors
/// take `self`, so a response can only be snapshotted before it is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    url: String,
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
    source: ResponseSource,
}

impl Response {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: Vec::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Mark this response as served from cache storage
    pub fn into_cached(mut self) -> Self {
        self.source = ResponseSource::Cache;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    /// True for 2xx statuses
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn source(&self) -> ResponseSource {
        self.source
    }

    pub fn is_from_cache(&self) -> bool {
        self.source == ResponseSource::Cache
    }

    /// Length of the unread body
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    pub fn bytes(self) -> Bytes {
        self.body
    }

    pub fn text(self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_is_independent_snapshot() {
        let original = Response::new("https://example.com/", 200, "hello");
        let snapshot = original.clone();
        assert_eq!(original.text(), "hello");
        assert_eq!(snapshot.bytes(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let response = Response::new("https://example.com/", 200, "")
            .with_headers(vec![("Content-Type".to_string(), "text/html".to_string())]);
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert_eq!(response.header("etag"), None);
    }

    #[test]
    fn test_ok_range() {
        assert!(Response::new("u", 204, "").ok());
        assert!(!Response::new("u", 304, "").ok());
        assert!(!Response::new("u", 500, "").ok());
    }

    #[test]
    fn test_into_cached_marks_source() {
        let response = Response::new("u", 200, "x");
        assert!(!response.is_from_cache());
        assert!(response.into_cached().is_from_cache());
    }
}
