//! Request descriptors and response snapshots.
//!
//! A `Request` identifies an outbound request and yields the `RequestKey`
//! caches are keyed by. A `Response` carries a fully buffered body; reading
//! the body consumes the response, so a snapshot has to be cloned while the
//! body is still unread.

pub mod request;
pub mod response;

pub use request::{redact_str, redact_url, Request, RequestError, RequestKey};
pub use response::{Response, ResponseSource};
