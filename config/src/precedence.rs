//! # Configuration Precedence
//!
//! Merges raw fragments into one [`ResolvedSnapshot`].
//!
//! # Precedence Order
//! 1. Process overrides (highest priority)
//! 2. Named profile overlay
//! 3. User file
//! 4. System-wide file
//! 5. Packaged defaults (lowest priority)
//!
//! Maps merge deeply. Lists and scalars are replaced, never concatenated.
//! A `null` in a higher fragment leaves the lower value in place, so an
//! empty YAML group (`server:`) does not wipe the defaults beneath it.

use crate::path::ConfigPath;
use crate::snapshot::{ConfigValue, ResolvedSnapshot};
use crate::sources::RawFragment;
use crate::value::Value;
use errors::ConfigError;
use std::collections::BTreeMap;

/// Merge fragments by precedence into a snapshot numbered `generation`.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Produces the single resolved view every consumer reads. Each leaf is
/// tagged with the highest-precedence fragment that defined it.
///
/// ## Usage
/// ```rust,no_run
/// use config::precedence::resolve;
/// use config::sources::{RawFragment, SourceKind};
/// use config::Value;
///
/// let defaults = RawFragment::new(
///     SourceKind::PackagedDefault,
///     "<packaged>",
///     [("ui", [("theme", "system")].into_iter().collect::<Value>())].into_iter().collect(),
/// );
/// let snapshot = resolve(vec![defaults], 1).unwrap();
/// assert_eq!(snapshot.generation(), 1);
/// ```
///
/// ## Errors
/// Fails as a whole when any fragment root is not a map; nothing is
/// partially applied.
pub fn resolve(
    mut fragments: Vec<RawFragment>,
    generation: u64,
) -> Result<ResolvedSnapshot, ConfigError> {
    fragments.sort_by_key(|fragment| fragment.source);

    for fragment in &fragments {
        if !matches!(fragment.tree, Value::Map(_)) {
            return Err(ConfigError::Parse {
                source_name: fragment.source.to_string(),
                origin: fragment.origin.clone(),
                reason: format!("document root must be a map, found {}", fragment.tree.kind()),
            });
        }
    }

    let mut tree = Value::empty_map();
    for fragment in &fragments {
        merge_with_logging(&mut tree, fragment);
    }

    let mut entries = BTreeMap::new();
    for (path, value) in tree.leaves() {
        let Some(winner) = winning_fragment(&fragments, &path) else {
            continue;
        };
        entries.insert(
            path.clone(),
            ConfigValue {
                path,
                value: value.clone(),
                source: winner.source,
                updated_at: winner.loaded_at,
            },
        );
    }

    Ok(ResolvedSnapshot::new(generation, tree, entries))
}

fn winning_fragment<'a>(fragments: &'a [RawFragment], path: &ConfigPath) -> Option<&'a RawFragment> {
    fragments
        .iter()
        .rev()
        .find(|fragment| matches!(fragment.tree.get_path(path), Some(v) if *v != Value::Null))
        .or_else(|| {
            fragments
                .iter()
                .rev()
                .find(|fragment| fragment.tree.get_path(path).is_some())
        })
}

fn merge_with_logging(base: &mut Value, fragment: &RawFragment) {
    let mut changes = Vec::new();
    deep_merge(base, &fragment.tree, &ConfigPath::root(), &mut changes);

    if !changes.is_empty() {
        tracing::debug!(
            "Configuration from {} ({}): {:?}",
            fragment.source,
            fragment.origin,
            changes
        );
    }
}

fn deep_merge(base: &mut Value, overlay: &Value, path: &ConfigPath, changes: &mut Vec<String>) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Map(base_map), Value::Map(overlay_map)) => {
            for (key, value) in overlay_map {
                let child = path.child_key(key);
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value, &child, changes),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                        changes.push(child.to_string());
                    }
                }
            }
        }
        (base, overlay) => {
            if *base != *overlay {
                changes.push(path.to_string());
            }
            *base = overlay.clone();
        }
    }
}
