//! Domain rules for indexed folder entries.

use super::{CheckOutcome, DOMAIN_PRIORITY, ValidationContext, Validator};
use crate::path::{ConfigPath, PathMatcher};
use crate::value::Value;
use async_trait::async_trait;
use errors::{ConfigError, IssueKind};
use std::path::{Component, Path, PathBuf};

const FOLDER_PATH_PATTERN: &str = "folders[*].path";

/// Expand a leading `~` and resolve `.`/`..` without touching the disk.
pub fn normalize_folder(raw: &str) -> PathBuf {
    let expanded = match raw.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => {
            match dirs::home_dir() {
                Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
                None => PathBuf::from(raw),
            }
        }
        _ => PathBuf::from(raw),
    };

    let mut normalized = PathBuf::new();
    for component in expanded.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(component);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// How a candidate folder relates to one already configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlap {
    Same,
    Inside,
    Contains,
    Disjoint,
}

pub fn overlap(candidate: &Path, existing: &Path) -> Overlap {
    if candidate == existing {
        Overlap::Same
    } else if candidate.starts_with(existing) {
        Overlap::Inside
    } else if existing.starts_with(candidate) {
        Overlap::Contains
    } else {
        Overlap::Disjoint
    }
}

fn folder_index(path: &ConfigPath) -> Option<usize> {
    path.parent()?.last_index()
}

/// Rejects duplicate and nested folders, warns on ancestors.
///
/// An item written directly is compared with every other entry. Otherwise,
/// as when a whole list or snapshot is checked, each item is compared only
/// with the entries before it, so the order the user added folders in
/// decides which side of a nesting is the error.
pub struct FolderOverlapValidator {
    matchers: Vec<PathMatcher>,
}

impl FolderOverlapValidator {
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            matchers: vec![PathMatcher::new(FOLDER_PATH_PATTERN)?],
        })
    }
}

#[async_trait]
impl Validator for FolderOverlapValidator {
    fn name(&self) -> &str {
        "folder-overlap"
    }

    fn description(&self) -> &str {
        "folders must not repeat or nest inside one another"
    }

    fn priority(&self) -> i32 {
        DOMAIN_PRIORITY
    }

    fn kind(&self) -> IssueKind {
        IssueKind::Domain
    }

    fn applies_to(&self) -> &[PathMatcher] {
        &self.matchers
    }

    async fn check(
        &self,
        path: &ConfigPath,
        value: &Value,
        ctx: &ValidationContext<'_>,
    ) -> anyhow::Result<CheckOutcome> {
        let (Some(raw), Some(index)) = (value.as_str(), folder_index(path)) else {
            return Ok(CheckOutcome::ok());
        };
        let Some(folders) = ctx
            .candidate
            .get_path(&ConfigPath::parse("folders")?)
            .and_then(Value::as_list)
        else {
            return Ok(CheckOutcome::ok());
        };

        let item = ConfigPath::parse("folders")?.child_index(index);
        let written_directly = ctx.written.is_some_and(|written| written.starts_with(&item));
        let candidate = normalize_folder(raw);

        let mut outcome = CheckOutcome::ok();
        for (other_index, other) in folders.iter().enumerate() {
            if other_index == index || (!written_directly && other_index > index) {
                continue;
            }
            let Some(other_raw) = other.as_map().and_then(|m| m.get("path")).and_then(Value::as_str)
            else {
                continue;
            };
            match overlap(&candidate, &normalize_folder(other_raw)) {
                Overlap::Same => outcome.push_error(
                    path,
                    format!("`{raw}` is already configured as folders[{other_index}]"),
                ),
                Overlap::Inside => outcome.push_error(
                    path,
                    format!("`{raw}` is inside configured folder `{other_raw}`"),
                ),
                Overlap::Contains => outcome.push_warning(
                    path,
                    format!("`{raw}` contains configured folder `{other_raw}`"),
                ),
                Overlap::Disjoint => {}
            }
        }
        Ok(outcome)
    }
}

/// Folder paths must be absolute; missing directories only warn.
pub struct FolderPathValidator {
    matchers: Vec<PathMatcher>,
}

impl FolderPathValidator {
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            matchers: vec![PathMatcher::new(FOLDER_PATH_PATTERN)?],
        })
    }
}

#[async_trait]
impl Validator for FolderPathValidator {
    fn name(&self) -> &str {
        "folder-absolute"
    }

    fn description(&self) -> &str {
        "folder paths must be absolute and should exist"
    }

    fn priority(&self) -> i32 {
        DOMAIN_PRIORITY + 10
    }

    fn kind(&self) -> IssueKind {
        IssueKind::Domain
    }

    fn applies_to(&self) -> &[PathMatcher] {
        &self.matchers
    }

    async fn check(
        &self,
        path: &ConfigPath,
        value: &Value,
        _ctx: &ValidationContext<'_>,
    ) -> anyhow::Result<CheckOutcome> {
        let Some(raw) = value.as_str() else {
            return Ok(CheckOutcome::ok());
        };
        let folder = normalize_folder(raw);
        if !folder.is_absolute() {
            return Ok(CheckOutcome::error(
                path,
                format!("`{raw}` must be an absolute path"),
            ));
        }
        match tokio::fs::try_exists(&folder).await {
            Ok(true) => Ok(CheckOutcome::ok()),
            Ok(false) => Ok(CheckOutcome::warning(
                path,
                format!("`{raw}` does not exist yet"),
            )),
            Err(e) => Ok(CheckOutcome::warning(
                path,
                format!("`{raw}` cannot be checked: {e}"),
            )),
        }
    }
}
