//! Application configuration management.
//!
//! This module handles loading and saving the offline configuration:
//! the app origin, cache generation names, the static asset manifest,
//! API host fragments, timeouts, and the backend location.
//!
//! Configuration is stored at `~/.config/nishaan/config.json`. A missing
//! file yields the built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "nishaan";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Queue database file name inside the data directory
const QUEUE_DB_FILE: &str = "queue.db";

/// Network timeout for API routes.
/// 3 seconds keeps the app responsive on flaky links before falling back to cache.
pub const DEFAULT_NETWORK_TIMEOUT_MS: u64 = 3000;

/// Maximum replay attempts before a queued operation is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Origin the app is served from (used for same-origin checks and relative URLs)
    pub origin: String,
    /// Prefix shared by every cache generation this app owns
    pub cache_prefix: String,
    /// Current cache version; bumping it supersedes older generations
    pub cache_version: String,
    /// Assets pre-cached into the static generation at install time
    pub static_assets: Vec<String>,
    /// Offline fallback page served when a navigation has no network and no cache
    pub offline_url: String,
    /// Host fragments that mark a request as an API call
    pub api_hosts: Vec<String>,
    pub network_timeout_ms: u64,
    pub max_retries: u32,
    /// Activate immediately after install instead of waiting for a signal
    pub skip_waiting_on_install: bool,
    pub supabase_url: Option<String>,
    /// Overrides the platform data directory for the queue database and caches
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".to_string(),
            cache_prefix: APP_NAME.to_string(),
            cache_version: "v1".to_string(),
            static_assets: vec![
                "/".to_string(),
                "/offline.html".to_string(),
                "/manifest.json".to_string(),
                "/icons/icon.svg".to_string(),
            ],
            offline_url: "/offline.html".to_string(),
            api_hosts: vec![
                "supabase.co".to_string(),
                "generativelanguage.googleapis.com".to_string(),
            ],
            network_timeout_ms: DEFAULT_NETWORK_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            skip_waiting_on_install: true,
            supabase_url: None,
            data_dir: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Default config file location.
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn queue_db_path(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join(QUEUE_DB_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        Ok(self.data_dir()?.join("caches"))
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    pub fn static_cache_name(&self) -> String {
        format!("{}-static-{}", self.cache_prefix, self.cache_version)
    }

    pub fn dynamic_cache_name(&self) -> String {
        format!("{}-dynamic-{}", self.cache_prefix, self.cache_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_names_follow_version() {
        let mut config = Config::default();
        assert_eq!(config.static_cache_name(), "nishaan-static-v1");
        assert_eq!(config.dynamic_cache_name(), "nishaan-dynamic-v1");

        config.cache_version = "v2".to_string();
        assert_eq!(config.static_cache_name(), "nishaan-static-v2");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"origin": "https://nishaan.app", "max_retries": 5}"#)
                .unwrap();
        assert_eq!(config.origin, "https://nishaan.app");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.network_timeout_ms, DEFAULT_NETWORK_TIMEOUT_MS);
        assert_eq!(config.offline_url, "/offline.html");
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.cache_prefix, "nishaan");
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = Config::default();
        config.supabase_url = Some("https://xyz.supabase.co".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.supabase_url.as_deref(), Some("https://xyz.supabase.co"));
        assert_eq!(loaded.static_assets, config.static_assets);
    }
}
