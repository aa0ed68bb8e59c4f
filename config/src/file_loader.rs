//! # Configuration File Loading
//!
//! Reads configuration documents from TOML or YAML files into a [`Value`]
//! tree. The format is picked from the file extension.

use crate::value::Value;
use std::path::Path;

/// Document format of a configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Toml,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Result<Self, FileLoadError> {
        let extension = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or(FileLoadError::NoExtension)?;

        match extension.to_lowercase().as_str() {
            "toml" => Ok(DocumentFormat::Toml),
            "yaml" | "yml" => Ok(DocumentFormat::Yaml),
            other => Err(FileLoadError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Why a configuration document could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum FileLoadError {
    #[error("file not found")]
    NotFound,

    #[error("{0}")]
    Io(std::io::Error),

    #[error("{0}")]
    Parse(String),

    #[error("config file has no extension")]
    NoExtension,

    #[error("unsupported config file format: {0}")]
    UnsupportedFormat(String),
}

/// Parse document text. An empty document is an empty map.
pub fn parse_document(contents: &str, format: DocumentFormat) -> Result<Value, FileLoadError> {
    if contents.trim().is_empty() {
        return Ok(Value::empty_map());
    }

    let value = match format {
        DocumentFormat::Yaml => {
            let yaml: serde_yaml::Value = serde_yaml::from_str(contents)
                .map_err(|e| FileLoadError::Parse(e.to_string()))?;
            Value::from_yaml(yaml).map_err(FileLoadError::Parse)?
        }
        DocumentFormat::Toml => {
            let table: toml::Table =
                toml::from_str(contents).map_err(|e| FileLoadError::Parse(e.to_string()))?;
            Value::from_toml(toml::Value::Table(table))
        }
    };

    match value {
        Value::Null => Ok(Value::empty_map()),
        Value::Map(_) => Ok(value),
        other => Err(FileLoadError::Parse(format!(
            "document root must be a map, found {}",
            other.kind()
        ))),
    }
}

/// Load a configuration document, detecting the format from the extension.
///
/// ## Supported Formats
/// - `.toml`: TOML format
/// - `.yaml`: YAML format
/// - `.yml`: YAML format
pub async fn load_document(path: &Path) -> Result<Value, FileLoadError> {
    let format = DocumentFormat::from_path(path)?;
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(FileLoadError::NotFound),
        Err(e) => return Err(FileLoadError::Io(e)),
    };
    parse_document(&contents, format)
}

/// Render a document for persistence.
pub fn render_document(value: &Value, format: DocumentFormat) -> Result<String, String> {
    match format {
        DocumentFormat::Yaml => serde_yaml::to_string(value).map_err(|e| e.to_string()),
        DocumentFormat::Toml => toml::to_string_pretty(value).map_err(|e| e.to_string()),
    }
}
