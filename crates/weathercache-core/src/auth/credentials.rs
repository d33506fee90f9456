use anyhow::{Context, Result};
use keyring::Entry;
use tracing::debug;

const SERVICE_NAME: &str = "weathercache";

/// Keychain account the API key is stored under
const ACCOUNT_NAME: &str = "openweathermap";

/// Environment variable that overrides the stored key
pub const API_KEY_ENV: &str = "OWM_API_KEY";

pub struct ApiKeyStore;

impl ApiKeyStore {
    /// Store the API key in the OS keychain
    pub fn store(api_key: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, ACCOUNT_NAME)
            .context("Failed to create keyring entry")?;
        entry
            .set_password(api_key.trim())
            .context("Failed to store API key in keychain")?;
        Ok(())
    }

    /// Retrieve the stored API key, if any
    pub fn get() -> Result<Option<String>> {
        let entry = Entry::new(SERVICE_NAME, ACCOUNT_NAME)
            .context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(key) => Ok(Some(key)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve API key from keychain"),
        }
    }

    /// Delete the stored API key
    pub fn delete() -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, ACCOUNT_NAME)
            .context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete API key from keychain")?;
        Ok(())
    }

    /// Resolve the key to use: a non-empty `OWM_API_KEY` wins over the
    /// keychain. Keychain errors are treated as "no key".
    pub fn resolve() -> Option<String> {
        Self::pick(std::env::var(API_KEY_ENV).ok(), || match Self::get() {
            Ok(key) => key,
            Err(e) => {
                debug!(error = %e, "Keychain lookup failed");
                None
            }
        })
    }

    fn pick(env: Option<String>, stored: impl FnOnce() -> Option<String>) -> Option<String> {
        env.map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .or_else(stored)
    }
}
