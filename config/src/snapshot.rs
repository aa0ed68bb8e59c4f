//! Immutable resolved configuration snapshots.
//!
//! A snapshot is never edited after construction. The gateway replaces the
//! whole `Arc<ResolvedSnapshot>` when a write or reload succeeds, so readers
//! holding an older generation keep a consistent view.

use crate::path::ConfigPath;
use crate::sources::SourceKind;
use crate::value::Value;
use chrono::{DateTime, Utc};
use errors::ConfigError;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// The winning value for one leaf path, with provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigValue {
    pub path: ConfigPath,
    pub value: Value,
    pub source: SourceKind,
    pub updated_at: DateTime<Utc>,
}

/// One fully merged configuration state.
#[derive(Debug, Clone)]
pub struct ResolvedSnapshot {
    generation: u64,
    tree: Value,
    entries: BTreeMap<ConfigPath, ConfigValue>,
}

impl ResolvedSnapshot {
    pub(crate) fn new(
        generation: u64,
        tree: Value,
        entries: BTreeMap<ConfigPath, ConfigValue>,
    ) -> Self {
        Self {
            generation,
            tree,
            entries,
        }
    }

    /// Empty generation-zero snapshot.
    pub fn empty() -> Self {
        Self::new(0, Value::empty_map(), BTreeMap::new())
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The merged document.
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    /// Any node of the merged tree: leaf, map or list item.
    pub fn get(&self, path: &ConfigPath) -> Option<&Value> {
        self.tree.get_path(path)
    }

    pub fn lookup(&self, raw: &str) -> Result<Option<&Value>, ConfigError> {
        Ok(self.get(&ConfigPath::parse(raw)?))
    }

    /// Provenance for `path`: its own leaf entry, or the entry of the
    /// enclosing leaf (a list item resolves to its list).
    pub fn entry(&self, path: &ConfigPath) -> Option<&ConfigValue> {
        let mut current = Some(path.clone());
        while let Some(candidate) = current {
            if let Some(entry) = self.entries.get(&candidate) {
                return Some(entry);
            }
            current = candidate.parent();
        }
        None
    }

    pub fn source_of(&self, path: &ConfigPath) -> Option<SourceKind> {
        self.entry(path).map(|entry| entry.source)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ConfigValue> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Same values and provenance, ignoring generation and timestamps.
    pub fn same_content(&self, other: &ResolvedSnapshot) -> bool {
        self.diff(other).is_empty()
    }

    /// Leaf paths whose value or source differs between the two snapshots.
    pub fn diff(&self, other: &ResolvedSnapshot) -> BTreeSet<ConfigPath> {
        let mut changed = BTreeSet::new();
        for (path, entry) in &self.entries {
            match other.entries.get(path) {
                Some(theirs) if theirs.value == entry.value && theirs.source == entry.source => {}
                _ => {
                    changed.insert(path.clone());
                }
            }
        }
        for path in other.entries.keys() {
            if !self.entries.contains_key(path) {
                changed.insert(path.clone());
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, value: Value, source: SourceKind) -> (ConfigPath, ConfigValue) {
        let path = ConfigPath::parse(path).unwrap();
        (
            path.clone(),
            ConfigValue {
                path,
                value,
                source,
                updated_at: Utc::now(),
            },
        )
    }

    fn snapshot(entries: Vec<(ConfigPath, ConfigValue)>) -> ResolvedSnapshot {
        let mut tree = Value::empty_map();
        for (path, entry) in &entries {
            tree.set_path(path, entry.value.clone()).unwrap();
        }
        ResolvedSnapshot::new(1, tree, entries.into_iter().collect())
    }

    #[test]
    fn test_entry_falls_back_to_enclosing_list() {
        let snap = snapshot(vec![entry(
            "folders",
            Value::List(vec![[("path", "/a")].into_iter().collect()]),
            SourceKind::User,
        )]);
        let item = ConfigPath::parse("folders[0].path").unwrap();
        assert_eq!(snap.source_of(&item), Some(SourceKind::User));
        assert_eq!(snap.get(&item), Some(&Value::from("/a")));
    }

    #[test]
    fn test_diff_reports_changed_added_removed() {
        let old = snapshot(vec![
            entry("ui.theme", "dark".into(), SourceKind::User),
            entry("server.port", Value::Int(1), SourceKind::PackagedDefault),
        ]);
        let new = snapshot(vec![
            entry("ui.theme", "light".into(), SourceKind::User),
            entry("logging.level", "info".into(), SourceKind::PackagedDefault),
        ]);
        let changed: Vec<String> = old.diff(&new).iter().map(ToString::to_string).collect();
        assert_eq!(changed, vec!["logging.level", "server.port", "ui.theme"]);
    }

    #[test]
    fn test_diff_counts_source_change() {
        let old = snapshot(vec![entry("ui.theme", "dark".into(), SourceKind::PackagedDefault)]);
        let new = snapshot(vec![entry("ui.theme", "dark".into(), SourceKind::User)]);
        assert_eq!(old.diff(&new).len(), 1);
    }

    #[test]
    fn test_same_content_ignores_generation() {
        let a = snapshot(vec![entry("ui.theme", "dark".into(), SourceKind::User)]);
        let b = a.clone().with_generation(7);
        assert!(a.same_content(&b));
        assert_eq!(b.generation(), 7);
    }

    #[test]
    fn test_lookup_rejects_bad_path() {
        let snap = ResolvedSnapshot::empty();
        assert!(snap.lookup("a..b").is_err());
        assert_eq!(snap.lookup("ui.theme").unwrap(), None);
    }
}
