//! # Typed Settings
//!
//! A typed, validated view of a resolved snapshot for consumers that want
//! structs instead of paths.
//!
//! All settings structures:
//! - Use `serde` for deserialization from the merged document
//! - Use `validator` for a second line of range checks
//! - Ignore keys they do not know about

use crate::model::ModelSelection;
use crate::snapshot::ResolvedSnapshot;
use crate::validation::schema::{LOG_LEVELS, THEMES};
use errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Daemon settings.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Gives the daemon's services one struct to read per generation.
///
/// ## Usage
/// ```rust,no_run
/// use config::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.server.port, 7420);
/// ```
///
/// ## Fields
/// - `folders`: Indexed folders and their optional model override
/// - `embedding`: Batch size and the persisted default model choice
/// - `server`: Protocol listener address
/// - `ui`: Terminal UI appearance
/// - `logging`: Log filter used when `RUST_LOG` is not set
/// - `watcher`: File watcher debounce window
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub folders: Vec<FolderSettings>,

    #[serde(default)]
    pub embedding: EmbeddingSettings,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub ui: UiSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub watcher: WatcherSettings,
}

impl Settings {
    pub fn from_snapshot(snapshot: &ResolvedSnapshot) -> Result<Self, ConfigError> {
        let settings: Settings = snapshot
            .tree()
            .deserialize_into()
            .map_err(|reason| ConfigError::Settings { reason })?;
        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> Result<(), ConfigError> {
        let invalid = |e: validator::ValidationErrors| ConfigError::Settings {
            reason: e.to_string(),
        };
        for folder in &self.folders {
            folder.validate().map_err(invalid)?;
        }
        self.embedding.validate().map_err(invalid)?;
        self.server.validate().map_err(invalid)?;
        self.ui.validate().map_err(invalid)?;
        self.logging.validate().map_err(invalid)?;
        self.watcher.validate().map_err(invalid)?;
        Ok(())
    }
}

/// One indexed folder.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct FolderSettings {
    #[validate(length(min = 1))]
    pub path: String,

    /// Embedding model for this folder instead of the default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Embedding pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct EmbeddingSettings {
    #[serde(default = "default_batch_size")]
    #[validate(range(min = 1, max = 512))]
    pub batch_size: u32,

    /// Present only when the user picked a model explicitly
    #[serde(default)]
    pub default_model: Option<ModelSelection>,
}

fn default_batch_size() -> u32 {
    32
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            default_model: None,
        }
    }
}

/// Protocol listener settings.
///
/// ## Fields
/// - `host`: Bind address (default: "127.0.0.1")
/// - `port`: Bind port (default: 7420)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct ServerSettings {
    #[serde(default = "default_server_host")]
    #[validate(length(min = 1, max = 255))]
    pub host: String,

    #[serde(default = "default_server_port")]
    #[validate(range(min = 1024, max = 65535))]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    7420
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct UiSettings {
    #[serde(default = "default_theme")]
    #[validate(custom(function = "validate_theme"))]
    pub theme: String,
}

fn default_theme() -> String {
    "system".to_string()
}

fn validate_theme(value: &str) -> Result<(), validator::ValidationError> {
    if THEMES.contains(&value) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("Invalid theme"))
    }
}

impl Default for UiSettings {
    fn default() -> Self {
        Self {
            theme: default_theme(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn validate_log_level(value: &str) -> Result<(), validator::ValidationError> {
    if LOG_LEVELS.contains(&value) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("Invalid log level"))
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct WatcherSettings {
    #[serde(default = "default_debounce_ms")]
    #[validate(range(min = 50, max = 10000))]
    pub debounce_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl WatcherSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
