//! Application configuration management.
//!
//! Configuration is stored at `~/.config/weathercache/config.json`.
//! Environment variables (`WEATHERCACHE_ORIGIN`, `DEFAULT_CITY`) override
//! the file, and a `.env` file in the working directory is loaded first.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use weathercache_core::interceptor::DEFAULT_ORIGIN;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "weathercache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// City used when neither the command line nor the config names one
pub const DEFAULT_CITY: &str = "Tokyo,JP";

const ORIGIN_ENV: &str = "WEATHERCACHE_ORIGIN";
const CITY_ENV: &str = "DEFAULT_CITY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Origin the application shell is fetched from
    pub origin: Option<String>,
    pub default_city: Option<String>,
    pub last_city: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn origin(&self) -> String {
        self.origin_with(|name| std::env::var(name).ok())
    }

    pub fn default_city(&self) -> String {
        self.default_city_with(|name| std::env::var(name).ok())
    }

    fn origin_with(&self, env: impl Fn(&str) -> Option<String>) -> String {
        first_non_empty(env(ORIGIN_ENV), self.origin.clone())
            .unwrap_or_else(|| DEFAULT_ORIGIN.to_string())
    }

    fn default_city_with(&self, env: impl Fn(&str) -> Option<String>) -> String {
        first_non_empty(env(CITY_ENV), self.default_city.clone())
            .unwrap_or_else(|| DEFAULT_CITY.to_string())
    }
}

fn first_non_empty(a: Option<String>, b: Option<String>) -> Option<String> {
    a.into_iter()
        .chain(b)
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
}
