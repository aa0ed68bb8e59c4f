//! # Configuration Sources
//!
//! Readers for every configuration origin: packaged defaults, the optional
//! system-wide file, the user file, an optional named profile overlay and
//! process-supplied overrides. Readers only do I/O and parsing; merging is
//! the resolver's job.
//!
//! # Precedence Order
//! 1. Process overrides (highest priority)
//! 2. Named profile overlay
//! 3. User file
//! 4. System-wide file
//! 5. Packaged defaults (lowest priority)

use crate::file_loader::{self, DocumentFormat, FileLoadError};
use crate::path::ConfigPath;
use crate::value::Value;
use chrono::{DateTime, Utc};
use errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Application name used for configuration directories.
pub const APP_NAME: &str = "foldersd";

/// Prefix of environment variables that override configuration paths.
pub const ENV_OVERRIDE_PREFIX: &str = "FOLDERSD__";

/// Defaults compiled into the binary.
pub const PACKAGED_DEFAULTS: &str = include_str!("../defaults.yaml");

const PACKAGED_ORIGIN: &str = "<packaged>";
const OVERRIDE_ORIGIN: &str = "<process>";
const PROFILE_EXTENSIONS: [&str; 3] = ["yaml", "yml", "toml"];

/// Where a configuration value came from, ordered by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    PackagedDefault,
    System,
    User,
    Profile,
    Override,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::PackagedDefault => "packaged-default",
            SourceKind::System => "system",
            SourceKind::User => "user",
            SourceKind::Profile => "profile",
            SourceKind::Override => "override",
        };
        f.write_str(name)
    }
}

/// One parsed configuration document, before merging.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFragment {
    pub source: SourceKind,
    /// File path or a placeholder such as `<packaged>`.
    pub origin: String,
    pub loaded_at: DateTime<Utc>,
    pub tree: Value,
}

impl RawFragment {
    pub fn new(source: SourceKind, origin: impl Into<String>, tree: Value) -> Self {
        Self {
            source,
            origin: origin.into(),
            loaded_at: Utc::now(),
            tree,
        }
    }

    pub fn empty(source: SourceKind, origin: impl Into<String>) -> Self {
        Self::new(source, origin, Value::empty_map())
    }
}

/// Filesystem locations of every configuration source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocations {
    /// Replaces the compiled-in defaults when set.
    pub packaged_defaults: Option<PathBuf>,
    pub system_file: Option<PathBuf>,
    pub user_file: PathBuf,
    pub profiles_dir: Option<PathBuf>,
    /// Name of the selected profile overlay, if any.
    pub profile: Option<String>,
}

impl SourceLocations {
    /// Platform locations: `<config_dir>/foldersd/config.yaml` for the user
    /// file and the platform system directory for the system-wide file.
    pub fn discover() -> Self {
        let base = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_NAME);
        Self {
            packaged_defaults: None,
            system_file: system_config_path(),
            user_file: base.join("config.yaml"),
            profiles_dir: Some(base.join("profiles")),
            profile: None,
        }
    }

    /// Everything under one directory, without a system-wide file.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            packaged_defaults: None,
            system_file: None,
            user_file: dir.join("config.yaml"),
            profiles_dir: Some(dir.join("profiles")),
            profile: None,
        }
    }

    pub fn with_profile(mut self, profile: Option<String>) -> Self {
        self.profile = profile;
        self
    }

    /// The overlay file of the selected profile, trying `.yaml`, `.yml` and
    /// `.toml` in that order.
    pub fn profile_file(&self) -> Option<PathBuf> {
        let name = self.profile.as_ref()?;
        let dir = self.profiles_dir.as_ref()?;
        PROFILE_EXTENSIONS
            .iter()
            .map(|ext| dir.join(format!("{name}.{ext}")))
            .find(|candidate| candidate.is_file())
    }
}

#[cfg(unix)]
fn system_config_path() -> Option<PathBuf> {
    Some(PathBuf::from("/etc").join(APP_NAME).join("config.yaml"))
}

#[cfg(windows)]
fn system_config_path() -> Option<PathBuf> {
    std::env::var_os("ProgramData")
        .map(|dir| PathBuf::from(dir).join(APP_NAME).join("config.yaml"))
}

#[cfg(not(any(unix, windows)))]
fn system_config_path() -> Option<PathBuf> {
    None
}

/// Reads all configured sources.
#[derive(Debug, Clone)]
pub struct SourceSet {
    locations: SourceLocations,
    overrides: Vec<(ConfigPath, Value)>,
}

impl SourceSet {
    pub fn new(locations: SourceLocations) -> Self {
        Self {
            locations,
            overrides: Vec::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: Vec<(ConfigPath, Value)>) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn locations(&self) -> &SourceLocations {
        &self.locations
    }

    pub fn user_file(&self) -> &Path {
        &self.locations.user_file
    }

    /// Load every fragment. Any parse failure fails the whole load.
    pub async fn load_all(&self) -> Result<Vec<RawFragment>, ConfigError> {
        let mut fragments = vec![self.read_packaged_defaults().await?];
        if let Some(system) = self.read_system().await? {
            fragments.push(system);
        }
        fragments.push(self.read_user().await?);
        if let Some(profile) = self.read_profile().await? {
            fragments.push(profile);
        }
        if let Some(overrides) = self.overrides_fragment()? {
            fragments.push(overrides);
        }
        Ok(fragments)
    }

    pub async fn read_packaged_defaults(&self) -> Result<RawFragment, ConfigError> {
        match &self.locations.packaged_defaults {
            Some(path) => read_required(SourceKind::PackagedDefault, path).await,
            None => {
                let tree = file_loader::parse_document(PACKAGED_DEFAULTS, DocumentFormat::Yaml)
                    .map_err(|e| parse_error(SourceKind::PackagedDefault, PACKAGED_ORIGIN, &e))?;
                Ok(RawFragment::new(
                    SourceKind::PackagedDefault,
                    PACKAGED_ORIGIN,
                    tree,
                ))
            }
        }
    }

    pub async fn read_system(&self) -> Result<Option<RawFragment>, ConfigError> {
        match &self.locations.system_file {
            Some(path) => read_optional(SourceKind::System, path).await.map(Some),
            None => Ok(None),
        }
    }

    pub async fn read_user(&self) -> Result<RawFragment, ConfigError> {
        read_optional(SourceKind::User, &self.locations.user_file).await
    }

    pub async fn read_profile(&self) -> Result<Option<RawFragment>, ConfigError> {
        let Some(name) = &self.locations.profile else {
            return Ok(None);
        };
        let path = self
            .locations
            .profile_file()
            .ok_or_else(|| ConfigError::ProfileNotFound { name: name.clone() })?;
        read_required(SourceKind::Profile, &path).await.map(Some)
    }

    pub fn overrides_fragment(&self) -> Result<Option<RawFragment>, ConfigError> {
        if self.overrides.is_empty() {
            return Ok(None);
        }
        let mut tree = Value::empty_map();
        for (path, value) in &self.overrides {
            tree.set_path(path, value.clone())
                .map_err(|reason| ConfigError::InvalidPath {
                    path: path.to_string(),
                    reason,
                })?;
        }
        Ok(Some(RawFragment::new(
            SourceKind::Override,
            OVERRIDE_ORIGIN,
            tree,
        )))
    }

    /// Atomically replace the user file with `tree`.
    pub async fn persist_user(&self, tree: &Value) -> Result<(), ConfigError> {
        let path = self.locations.user_file.clone();
        let format = DocumentFormat::from_path(&path).unwrap_or(DocumentFormat::Yaml);
        let contents = file_loader::render_document(tree, format).map_err(|reason| {
            ConfigError::Io {
                operation: "render".to_string(),
                path: path.display().to_string(),
                reason,
            }
        })?;

        tokio::task::spawn_blocking(move || write_atomically(&path, &contents))
            .await
            .map_err(|e| ConfigError::Io {
                operation: "persist".to_string(),
                path: self.locations.user_file.display().to_string(),
                reason: e.to_string(),
            })?
    }
}

fn write_atomically(path: &Path, contents: &str) -> Result<(), ConfigError> {
    use std::io::Write;

    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent).map_err(|e| ConfigError::io("create directory", parent.display(), &e))?;

    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| ConfigError::io("create temp file", parent.display(), &e))?;
    temp.write_all(contents.as_bytes())
        .and_then(|()| temp.as_file().sync_all())
        .map_err(|e| ConfigError::io("write", path.display(), &e))?;
    temp.persist(path)
        .map_err(|e| ConfigError::io("replace", path.display(), &e.error))?;
    debug!("Persisted user configuration to {:?}", path);
    Ok(())
}

async fn read_optional(kind: SourceKind, path: &Path) -> Result<RawFragment, ConfigError> {
    match read_fragment(kind, path).await {
        Err(FileLoadError::NotFound) => {
            debug!("No {} configuration at {:?}", kind, path);
            Ok(RawFragment::empty(kind, path.display().to_string()))
        }
        other => other.map_err(|e| load_error(kind, path, e)),
    }
}

async fn read_required(kind: SourceKind, path: &Path) -> Result<RawFragment, ConfigError> {
    read_fragment(kind, path)
        .await
        .map_err(|e| load_error(kind, path, e))
}

async fn read_fragment(kind: SourceKind, path: &Path) -> Result<RawFragment, FileLoadError> {
    let tree = file_loader::load_document(path).await?;
    let loaded_at = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => DateTime::<Utc>::from(modified),
        Err(_) => Utc::now(),
    };
    Ok(RawFragment {
        source: kind,
        origin: path.display().to_string(),
        loaded_at,
        tree,
    })
}

fn load_error(kind: SourceKind, path: &Path, error: FileLoadError) -> ConfigError {
    match error {
        FileLoadError::NotFound => ConfigError::Io {
            operation: "read".to_string(),
            path: path.display().to_string(),
            reason: "file not found".to_string(),
        },
        FileLoadError::Io(e) => ConfigError::io("read", path.display(), &e),
        other => parse_error(kind, &path.display().to_string(), &other),
    }
}

fn parse_error(kind: SourceKind, origin: &str, error: &FileLoadError) -> ConfigError {
    ConfigError::Parse {
        source_name: kind.to_string(),
        origin: origin.to_string(),
        reason: error.to_string(),
    }
}

/// Parse a `path=value` override argument.
pub fn parse_override(arg: &str) -> Result<(ConfigPath, Value), ConfigError> {
    let (raw_path, raw_value) = arg.split_once('=').ok_or_else(|| ConfigError::InvalidPath {
        path: arg.to_string(),
        reason: "override must look like path=value".to_string(),
    })?;
    let path = ConfigPath::parse(raw_path.trim())?;
    Ok((path, Value::parse_scalar(raw_value.trim())))
}

/// Collect overrides from `FOLDERSD__SECTION__KEY=value` variables.
pub fn overrides_from_env() -> Vec<(ConfigPath, Value)> {
    overrides_from_vars(std::env::vars())
}

fn overrides_from_vars(vars: impl Iterator<Item = (String, String)>) -> Vec<(ConfigPath, Value)> {
    let mut overrides: Vec<(ConfigPath, Value)> = vars
        .filter_map(|(name, raw)| {
            let rest = name.strip_prefix(ENV_OVERRIDE_PREFIX)?;
            let dotted = rest
                .split("__")
                .map(str::to_lowercase)
                .collect::<Vec<_>>()
                .join(".");
            match ConfigPath::parse(&dotted) {
                Ok(path) => Some((path, Value::parse_scalar(&raw))),
                Err(e) => {
                    warn!("Ignoring environment override {}: {}", name, e);
                    None
                }
            }
        })
        .collect();
    overrides.sort_by(|a, b| a.0.cmp(&b.0));
    overrides
}
