//! API key storage.
//!
//! `ApiKeyStore` keeps the OpenWeatherMap key in the OS keychain. The
//! `OWM_API_KEY` environment variable takes precedence when set.

pub mod credentials;

pub use credentials::ApiKeyStore;
