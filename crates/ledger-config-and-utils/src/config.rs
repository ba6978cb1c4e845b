//! Configuration management for the sync engine.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default remote API base URL.
pub const DEFAULT_API_URL: &str = "http://localhost:3000";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default per-request timeout for pull/push calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default period between auto-sync ticks.
pub const DEFAULT_AUTO_SYNC_INTERVAL_MS: u64 = 20_000;

/// Default local schema version reported on pull.
pub const DEFAULT_SCHEMA_VERSION: i64 = 1;

/// Main sync engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base URL of the remote system of record.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Timeout applied to every pull and push request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Period between auto-sync ticks.
    #[serde(default = "default_auto_sync_interval_ms")]
    pub auto_sync_interval_ms: u64,
    /// Local schema version of the tenant databases.
    #[serde(default = "default_schema_version")]
    pub schema_version: i64,
    /// Bearer token for the sync endpoints.
    #[serde(default)]
    pub auth_token: Option<String>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_auto_sync_interval_ms() -> u64 {
    DEFAULT_AUTO_SYNC_INTERVAL_MS
}

fn default_schema_version() -> i64 {
    DEFAULT_SCHEMA_VERSION
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_url: default_api_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            auto_sync_interval_ms: DEFAULT_AUTO_SYNC_INTERVAL_MS,
            schema_version: DEFAULT_SCHEMA_VERSION,
            auth_token: None,
        }
    }
}

impl Config {
    /// Load configuration from `<base_dir>/config.json`, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to `<base_dir>/config.json`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from `LEDGER_*` variables resolved through `lookup`.
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).and_then(non_empty);

        if let Some(level) = lookup("LEDGER_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = lookup("LEDGER_API_URL") {
            self.api_url = url;
        }
        if let Some(secs) = lookup("LEDGER_REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.request_timeout_secs = secs;
        }
        if let Some(ms) = lookup("LEDGER_AUTO_SYNC_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.auto_sync_interval_ms = ms;
        }
        if let Some(token) = lookup("LEDGER_AUTH_TOKEN") {
            self.auth_token = Some(token);
        }
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        self.api_url()?;
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.auto_sync_interval_ms == 0 {
            return Err(CoreError::Config(
                "auto_sync_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the API base URL as a parsed URL.
    pub fn api_url(&self) -> CoreResult<Url> {
        Url::parse(&self.api_url).map_err(CoreError::from)
    }

    /// Per-request timeout as a Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Auto-sync period as a Duration.
    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_millis(self.auto_sync_interval_ms)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
