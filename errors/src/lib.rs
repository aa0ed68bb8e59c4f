//! # foldersd Errors
//!
//! Error taxonomy for the configuration engine.
//!
//! - Uses `thiserror` for structured error definitions
//! - Every variant uses named fields so messages stay greppable
//! - Validation issues are plain data so callers can render schema and
//!   domain problems differently

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Category of a single validation finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Wrong type, out of range, not in an enumerated set.
    Schema,
    /// Cross-field business rule (duplicate or nested folder, unknown model).
    Domain,
    /// The validator itself failed while checking the value.
    Fault,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssueKind::Schema => write!(f, "schema"),
            IssueKind::Domain => write!(f, "domain"),
            IssueKind::Fault => write!(f, "fault"),
        }
    }
}

/// One error or warning produced by a validator for a configuration path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: String,
    pub message: String,
    pub kind: IssueKind,
    /// Name of the validator that reported the issue.
    pub validator: String,
}

impl ValidationIssue {
    pub fn new(
        path: impl Into<String>,
        message: impl Into<String>,
        kind: IssueKind,
        validator: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
            validator: validator.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} [{}]", self.path, self.message, self.kind)
    }
}

/// Configuration engine errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse {source_name} configuration at {origin}: {reason}")]
    Parse {
        source_name: String,
        origin: String,
        reason: String,
    },

    #[error("I/O error during {operation} on {path}: {reason}")]
    Io {
        operation: String,
        path: String,
        reason: String,
    },

    #[error("Invalid configuration path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Configuration profile not found: {name}")]
    ProfileNotFound { name: String },

    #[error("{}", rejected_message(.issues))]
    Rejected { issues: Vec<ValidationIssue> },

    #[error("Configuration cannot be read as settings: {reason}")]
    Settings { reason: String },
}

fn rejected_message(issues: &[ValidationIssue]) -> String {
    match issues.first() {
        Some(first) if issues.len() == 1 => format!("Configuration rejected: {first}"),
        Some(first) => format!(
            "Configuration rejected with {} errors, first: {first}",
            issues.len()
        ),
        None => "Configuration rejected".to_string(),
    }
}

impl ConfigError {
    pub fn io(
        operation: impl Into<String>,
        path: impl fmt::Display,
        error: &std::io::Error,
    ) -> Self {
        ConfigError::Io {
            operation: operation.into(),
            path: path.to_string(),
            reason: error.to_string(),
        }
    }

    /// Issues carried by a rejection, empty for every other variant.
    pub fn issues(&self) -> &[ValidationIssue] {
        match self {
            ConfigError::Rejected { issues } => issues,
            _ => &[],
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, ConfigError::Rejected { .. })
    }
}

/// Default-model arbitration errors
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model is not in the curated catalog: {model_id}")]
    UnknownModel { model_id: String },

    #[error("Model catalog is empty")]
    CatalogEmpty,

    #[error("Model catalog lists no model that runs on CPU alone")]
    NoCpuModel,

    #[error("Capability detection failed: {reason}")]
    Detection { reason: String },

    #[error("Model catalog at {origin} is invalid: {reason}")]
    Catalog { origin: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Engine assembly errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Model(#[from] ModelError),
}
