//! Configuration loading and resolution
//!
//! All tunable behavior of the engine lives in an explicit [`EngineConfig`]
//! struct passed into each component's constructor. Nothing reads ambient
//! global state after startup.
//!
//! Resolution priority for each value: environment variable, then TOML config
//! file, then compiled default.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::warn;

/// Default inter-request spacing for the catalog API, in milliseconds.
pub const DEFAULT_RATE_LIMIT_MS: u64 = 250;
/// Default exponential backoff base, in milliseconds.
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1000;
/// Default exponential backoff cap, in milliseconds.
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 8000;
/// Default per-call HTTP timeout, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Default room cache lifetime: 7 days.
pub const DEFAULT_CACHE_TTL_SECS: i64 = 7 * 24 * 60 * 60;
/// Default criteria-keyed content cache lifetime: 24 hours.
pub const DEFAULT_CONTENT_CACHE_TTL_SECS: i64 = 24 * 60 * 60;
/// Default minimum trimmed overview length for the description filter.
pub const DEFAULT_MIN_OVERVIEW_LENGTH: usize = 10;
/// Default maximum catalog pages fetched per discovery pass.
pub const DEFAULT_MAX_DISCOVERY_PAGES: u32 = 5;
/// Default catalog API base URL.
pub const DEFAULT_CATALOG_BASE_URL: &str = "https://api.themoviedb.org/3";

/// Default language allow-list used as a content-quality gate.
///
/// Matching is case-insensitive and independent of genre logic.
pub const DEFAULT_ALLOWED_LANGUAGES: &[&str] = &[
    "en", "es", "fr", "de", "it", "pt", "nl", "sv", "no", "da", "fi",
];

/// Engine configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Allow-listed original-language codes (lowercase).
    pub allowed_languages: Vec<String>,
    /// Minimum trimmed overview length; shorter descriptions are rejected.
    pub min_overview_length: usize,
    /// Lifetime of a room's cached movie set and metadata, in seconds.
    pub cache_ttl_secs: i64,
    /// Lifetime of the cross-room criteria-keyed content cache, in seconds.
    pub content_cache_ttl_secs: i64,
    /// Minimum spacing between catalog API requests, in milliseconds.
    pub rate_limit_ms: u64,
    /// Backoff base for the single rate-limit retry, in milliseconds.
    pub backoff_base_ms: u64,
    /// Upper bound on any backoff sleep, in milliseconds.
    pub backoff_cap_ms: u64,
    /// Per-call HTTP timeout for the catalog API, in seconds.
    pub request_timeout_secs: u64,
    /// Maximum catalog pages fetched per discovery pass.
    pub max_discovery_pages: u32,
    /// Catalog API base URL.
    pub catalog_base_url: String,
    /// Catalog API key, if resolved.
    pub catalog_api_key: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            allowed_languages: DEFAULT_ALLOWED_LANGUAGES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            min_overview_length: DEFAULT_MIN_OVERVIEW_LENGTH,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            content_cache_ttl_secs: DEFAULT_CONTENT_CACHE_TTL_SECS,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_discovery_pages: DEFAULT_MAX_DISCOVERY_PAGES,
            catalog_base_url: DEFAULT_CATALOG_BASE_URL.to_string(),
            catalog_api_key: None,
        }
    }
}

/// TOML configuration file layer.
///
/// Every field is optional; missing fields fall back to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub allowed_languages: Option<Vec<String>>,
    pub min_overview_length: Option<usize>,
    pub cache_ttl_secs: Option<i64>,
    pub content_cache_ttl_secs: Option<i64>,
    pub rate_limit_ms: Option<u64>,
    pub backoff_base_ms: Option<u64>,
    pub backoff_cap_ms: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub max_discovery_pages: Option<u32>,
    pub catalog_base_url: Option<String>,
    pub catalog_api_key: Option<String>,
    pub database_path: Option<String>,
}

impl TomlConfig {
    /// Load the TOML layer from the platform config directory, if present.
    ///
    /// Looks for `matchroom/config.toml` under the user config directory,
    /// then `/etc/matchroom/config.toml` on Linux. A missing file is not an
    /// error; a malformed file is.
    pub fn load() -> Result<Self> {
        let Some(path) = find_config_file() else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Load from an explicit path. The file must exist and parse.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }
}

fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = dirs::config_dir() {
        let user_config = dir.join("matchroom").join("config.toml");
        if user_config.exists() {
            return Some(user_config);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/matchroom/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Resolve the catalog API key with ENV -> TOML priority.
///
/// Warns when the key is present in multiple sources, since a forgotten
/// environment override shadowing the config file is a common
/// misconfiguration.
pub fn resolve_catalog_api_key(toml_config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var("MATCHROOM_TMDB_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty());
    let toml_key = toml_config
        .catalog_api_key
        .clone()
        .filter(|k| !k.trim().is_empty());

    if env_key.is_some() && toml_key.is_some() {
        warn!("Catalog API key found in both environment and TOML; using environment");
    }

    env_key.or(toml_key)
}

/// Resolve the SQLite database path.
///
/// Priority: environment variable, TOML config, then an OS-dependent
/// default under the platform data directory.
pub fn resolve_database_path(toml_config: &TomlConfig) -> PathBuf {
    if let Ok(path) = std::env::var("MATCHROOM_DATABASE_PATH") {
        return PathBuf::from(path);
    }

    if let Some(path) = &toml_config.database_path {
        return PathBuf::from(path);
    }

    dirs::data_local_dir()
        .map(|d| d.join("matchroom"))
        .unwrap_or_else(|| PathBuf::from("./matchroom_data"))
        .join("matchroom.db")
}

impl EngineConfig {
    /// Build the effective configuration from the TOML layer plus defaults.
    pub fn from_toml(toml_config: &TomlConfig) -> Self {
        let defaults = Self::default();

        Self {
            allowed_languages: toml_config
                .allowed_languages
                .clone()
                .map(|langs| langs.into_iter().map(|l| l.to_lowercase()).collect())
                .unwrap_or(defaults.allowed_languages),
            min_overview_length: toml_config
                .min_overview_length
                .unwrap_or(defaults.min_overview_length),
            cache_ttl_secs: toml_config.cache_ttl_secs.unwrap_or(defaults.cache_ttl_secs),
            content_cache_ttl_secs: toml_config
                .content_cache_ttl_secs
                .unwrap_or(defaults.content_cache_ttl_secs),
            rate_limit_ms: toml_config.rate_limit_ms.unwrap_or(defaults.rate_limit_ms),
            backoff_base_ms: toml_config
                .backoff_base_ms
                .unwrap_or(defaults.backoff_base_ms),
            backoff_cap_ms: toml_config.backoff_cap_ms.unwrap_or(defaults.backoff_cap_ms),
            request_timeout_secs: toml_config
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
            max_discovery_pages: toml_config
                .max_discovery_pages
                .unwrap_or(defaults.max_discovery_pages),
            catalog_base_url: toml_config
                .catalog_base_url
                .clone()
                .unwrap_or(defaults.catalog_base_url),
            catalog_api_key: resolve_catalog_api_key(toml_config),
        }
    }

    /// True when `language` passes the allow-list gate.
    pub fn language_allowed(&self, language: &str) -> bool {
        let lowered = language.to_lowercase();
        self.allowed_languages.iter().any(|l| *l == lowered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.rate_limit_ms, 250);
        assert_eq!(config.min_overview_length, 10);
        assert!(config.allowed_languages.contains(&"en".to_string()));
        assert!(config.catalog_api_key.is_none());
    }

    #[test]
    fn language_gate_is_case_insensitive() {
        let config = EngineConfig::default();
        assert!(config.language_allowed("EN"));
        assert!(config.language_allowed("es"));
        assert!(!config.language_allowed("ja"));
    }

    #[test]
    fn toml_layer_overrides_defaults() {
        let toml_config = TomlConfig {
            rate_limit_ms: Some(100),
            allowed_languages: Some(vec!["EN".to_string()]),
            ..Default::default()
        };

        let config = EngineConfig::from_toml(&toml_config);
        assert_eq!(config.rate_limit_ms, 100);
        assert_eq!(config.allowed_languages, vec!["en".to_string()]);
        // Untouched fields keep defaults
        assert_eq!(config.backoff_cap_ms, DEFAULT_BACKOFF_CAP_MS);
    }
}
