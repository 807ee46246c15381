// Local configuration for the engine.
//
// Global config: `~/.folio/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use folio_common::types::UserId;

/// Environment variable that overrides the configured profile.
pub const PROFILE_ENV: &str = "FOLIO_PROFILE";

/// Default debounce window for autosave.
const DEFAULT_DEBOUNCE_MS: u64 = 500;
/// Minimum allowed debounce window.
const MIN_DEBOUNCE_MS: u64 = 100;
/// Maximum allowed debounce window.
const MAX_DEBOUNCE_MS: u64 = 5_000;

/// Snapshot interval outside development (10 minutes).
const DEFAULT_SNAPSHOT_INTERVAL_SEC: u64 = 600;
/// Snapshot interval in the development profile.
const DEFAULT_DEV_SNAPSHOT_INTERVAL_SEC: u64 = 30;

/// Root directory for Folio global state: `~/.folio/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".folio"))
}

/// Path to the global config file: `~/.folio/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

// ── Engine config ──────────────────────────────────────────────────

/// Engine configuration at `~/.folio/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Selects the snapshot interval.
    pub profile: Profile,
    /// Identity of the local editor, used as `senderId`.
    pub user_id: UserId,
    /// Relay base URL (e.g. `http://127.0.0.1:8080`).
    pub relay_url: String,
    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_filter: String,
    pub autosave: AutosaveConfig,
    pub snapshots: SnapshotConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Production,
            user_id: 0,
            relay_url: "http://127.0.0.1:8080".into(),
            log_filter: "info".into(),
            autosave: AutosaveConfig::default(),
            snapshots: SnapshotConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load from `~/.folio/config.toml` and apply `FOLIO_PROFILE`. Returns
    /// defaults if the file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let mut config =
            global_config_path().and_then(|p| Self::load_from(&p).ok()).unwrap_or_default();
        if let Some(profile) = std::env::var(PROFILE_ENV).ok().and_then(|v| Profile::parse(&v)) {
            config.profile = profile;
        }
        config
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Debounce window, clamped to [100ms, 5s].
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.autosave.debounce_ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS))
    }

    /// Active-time interval between automatic snapshots for the current profile.
    pub fn snapshot_interval(&self) -> Duration {
        let secs = match self.profile {
            Profile::Development => self.snapshots.development_interval_sec,
            Profile::Production => self.snapshots.interval_sec,
        };
        Duration::from_secs(secs.max(1))
    }
}

/// Build profile of the running editor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    Development,
    Production,
}

impl Profile {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutosaveConfig {
    pub debounce_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self { debounce_ms: DEFAULT_DEBOUNCE_MS }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Production interval in seconds of active time.
    pub interval_sec: u64,
    /// Development interval in seconds of active time.
    pub development_interval_sec: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            interval_sec: DEFAULT_SNAPSHOT_INTERVAL_SEC,
            development_interval_sec: DEFAULT_DEV_SNAPSHOT_INTERVAL_SEC,
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Serialize(e) => write!(f, "config serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
