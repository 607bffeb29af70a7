//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (QBANK_SW_*)
//! 2. TOML config file (if QBANK_SW_CONFIG_FILE set)
//! 3. Built-in defaults
//!
//! The generation identifier is deliberately part of the configuration
//! rather than a compile-time constant: the build pipeline stamps it into
//! the environment, and everything else (store names, update messages)
//! derives from it.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Path of the navigation entry document within the app shell.
pub const ROOT_DOCUMENT: &str = "/index.html";

/// Path of the offline fallback document within the app shell.
pub const OFFLINE_DOCUMENT: &str = "/offline.html";

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (QBANK_SW_*)
/// 2. TOML config file (if QBANK_SW_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Opaque build identifier; constant for one deployed build and
    /// different for every new deployment.
    ///
    /// Set via QBANK_SW_GENERATION environment variable.
    #[serde(default = "default_generation")]
    pub generation: String,

    /// Path to the SQLite cache database.
    ///
    /// Set via QBANK_SW_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the application is served from; app-shell paths and
    /// same-origin checks resolve against it.
    ///
    /// Set via QBANK_SW_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Base URL of the hosted backend project.
    ///
    /// Set via QBANK_SW_SUPABASE_URL environment variable.
    #[serde(default = "default_supabase_url")]
    pub supabase_url: String,

    /// Documents pre-populated into the app-shell store at install time.
    /// Every path must exist as a static build output.
    #[serde(default = "default_app_shell")]
    pub app_shell: Vec<String>,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Freshness window for cached backend REST responses, in seconds.
    #[serde(default = "default_rest_max_age_secs")]
    pub rest_max_age_secs: u64,

    /// Entry cap for the backend REST store (oldest evicted first).
    #[serde(default = "default_rest_max_entries")]
    pub rest_max_entries: usize,

    /// Freshness window for cached storage objects, in seconds.
    /// Binary media changes rarely, so this is much longer than the
    /// REST window.
    #[serde(default = "default_storage_max_age_secs")]
    pub storage_max_age_secs: u64,

    /// Entry cap for the storage-object store (oldest evicted first).
    #[serde(default = "default_storage_max_entries")]
    pub storage_max_entries: usize,
}

fn default_generation() -> String {
    "dev".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./qbank-offline.sqlite")
}

fn default_origin() -> String {
    "http://localhost:5173".into()
}

fn default_supabase_url() -> String {
    "https://project.supabase.co".into()
}

fn default_app_shell() -> Vec<String> {
    vec![
        "/".into(),
        ROOT_DOCUMENT.into(),
        OFFLINE_DOCUMENT.into(),
        "/manifest.json".into(),
    ]
}

fn default_user_agent() -> String {
    "qbank-offline/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_rest_max_age_secs() -> u64 {
    300
}

fn default_rest_max_entries() -> usize {
    64
}

fn default_storage_max_age_secs() -> u64 {
    86_400
}

fn default_storage_max_entries() -> usize {
    32
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generation: default_generation(),
            db_path: default_db_path(),
            origin: default_origin(),
            supabase_url: default_supabase_url(),
            app_shell: default_app_shell(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            rest_max_age_secs: default_rest_max_age_secs(),
            rest_max_entries: default_rest_max_entries(),
            storage_max_age_secs: default_storage_max_age_secs(),
            storage_max_entries: default_storage_max_entries(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// URL prefix of the backend's REST endpoints.
    pub fn rest_prefix(&self) -> String {
        format!("{}/rest/v1/", self.supabase_url.trim_end_matches('/'))
    }

    /// URL prefix of the backend's public storage objects.
    pub fn storage_prefix(&self) -> String {
        format!("{}/storage/v1/object/public/", self.supabase_url.trim_end_matches('/'))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `QBANK_SW_`
    /// 2. TOML file from `QBANK_SW_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a source cannot be read or validation
    /// fails after loading.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("QBANK_SW_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("QBANK_SW_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.generation, "dev");
        assert_eq!(config.db_path, PathBuf::from("./qbank-offline.sqlite"));
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.rest_max_age_secs, 300);
        assert_eq!(config.storage_max_age_secs, 86_400);
        assert!(config.rest_max_entries > config.storage_max_entries);
        assert!(config.app_shell.contains(&ROOT_DOCUMENT.to_string()));
        assert!(config.app_shell.contains(&OFFLINE_DOCUMENT.to_string()));
    }

    #[test]
    fn test_backend_prefixes() {
        let config = AppConfig { supabase_url: "https://proj.supabase.co/".into(), ..Default::default() };
        assert_eq!(config.rest_prefix(), "https://proj.supabase.co/rest/v1/");
        assert_eq!(
            config.storage_prefix(),
            "https://proj.supabase.co/storage/v1/object/public/"
        );
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }
}
