//! TOML-based configuration system for satchel.

use crate::error::{Result, SatchelError};
use crate::remote::RemoteConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable consulted for the remote token when the file has none.
pub const TOKEN_ENV_VAR: &str = "SATCHEL_TOKEN";

/// Top-level satchel configuration, deserialized from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatchelConfig {
    #[serde(default)]
    pub satchel: SatchelSection,
    pub remote: RemoteSettings,
    #[serde(default)]
    pub sync: SyncSettings,
}

/// Local instance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SatchelSection {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Default for SatchelSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database: DatabaseConfig::default(),
        }
    }
}

fn default_data_dir() -> String {
    "/var/lib/satchel".into()
}

/// Local entity store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file path.
    #[serde(default)]
    pub path: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: Some("/var/lib/satchel/satchel.db".into()),
        }
    }
}

/// Remote learning platform endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    pub base_url: String,
    /// Web service token. Falls back to `SATCHEL_TOKEN` when absent.
    #[serde(default)]
    pub token: Option<String>,
    /// Per-call HTTP timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Treat HTTP 200 responses carrying an exception payload as "capability absent".
    #[serde(default)]
    pub strict_capabilities: bool,
}

fn default_timeout_secs() -> u64 {
    30
}

/// Sync cycle behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Run the attendance pass when the remote supports it.
    #[serde(default = "default_true")]
    pub attendance: bool,
    #[serde(default = "default_days_back")]
    pub calendar_days_back: i64,
    #[serde(default = "default_days_ahead")]
    pub calendar_days_ahead: i64,
    #[serde(default)]
    pub dedup: DedupConfig,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            attendance: true,
            calendar_days_back: default_days_back(),
            calendar_days_ahead: default_days_ahead(),
            dedup: DedupConfig::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_days_back() -> i64 {
    14
}

fn default_days_ahead() -> i64 {
    60
}

/// How incoming records are matched against existing local entities.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DedupStrategy {
    /// Best-effort match on the kind's composite field key.
    #[default]
    Composite,
    /// Match on the remote numeric id when the record carries one, then fall
    /// back to the composite key so rows created before the upgrade still match.
    RemoteId,
}

/// Per-kind dedup strategy. Attendance sessions always match on their remote id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DedupConfig {
    #[serde(default)]
    pub courses: DedupStrategy,
    #[serde(default)]
    pub tasks: DedupStrategy,
    #[serde(default)]
    pub grades: DedupStrategy,
}

impl SatchelConfig {
    /// Load configuration from a TOML file at the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)
            .map_err(|e| SatchelError::Config(format!("failed to parse config: {e}")))?;
        if config.remote.token.is_none() {
            config.remote.token = std::env::var(TOKEN_ENV_VAR)
                .ok()
                .filter(|t| !t.trim().is_empty());
        }
        Ok(config)
    }

    /// Validate the configuration, returning an error for invalid combinations.
    pub fn validate(&self) -> Result<()> {
        let base_url = self.remote.base_url.trim();
        if base_url.is_empty() {
            return Err(SatchelError::Config(
                "remote.base_url must not be empty".into(),
            ));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(SatchelError::Config(format!(
                "remote.base_url must be an http(s) URL, got {base_url}"
            )));
        }
        if self.remote.timeout_secs == 0 {
            return Err(SatchelError::Config(
                "remote.timeout_secs must be greater than zero".into(),
            ));
        }
        if self.satchel.database.path.is_none() {
            return Err(SatchelError::Config(
                "satchel.database.path is required".into(),
            ));
        }
        if self.sync.calendar_days_back < 0 || self.sync.calendar_days_ahead < 0 {
            return Err(SatchelError::Config(
                "sync.calendar_days_back and sync.calendar_days_ahead must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// The session-scoped remote configuration, if a token is available.
    pub fn remote_config(&self) -> Option<RemoteConfig> {
        let token = self.remote.token.as_deref()?;
        RemoteConfig::new(&self.remote.base_url, token).ok()
    }
}
