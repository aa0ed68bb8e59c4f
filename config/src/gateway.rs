//! # Mutation Gateway
//!
//! Owns the published snapshot and is the only way configuration changes.
//!
//! Reads clone an `Arc` under a short read lock and never wait on a write.
//! Writes and reloads are serialized by one async mutex, validate before
//! anything becomes visible, and then swap the whole snapshot at once.

use crate::hot_reload::ReloadTarget;
use crate::path::ConfigPath;
use crate::precedence;
use crate::registry::{ChangeTrigger, ConfigChangeEvent, ConfigRegistry};
use crate::settings::Settings;
use crate::snapshot::{ConfigValue, ResolvedSnapshot};
use crate::sources::{RawFragment, SourceKind, SourceSet};
use crate::validation::{ValidationContext, ValidationPipeline};
use crate::value::Value;
use async_trait::async_trait;
use errors::{ConfigError, IssueKind, ValidationIssue};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const GATEWAY_VALIDATOR: &str = "gateway";

/// Result of re-reading every source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A new generation was installed.
    Applied { generation: u64, changed: usize },
    /// The sources resolve to what is already published.
    Unchanged { generation: u64 },
}

/// Single entry point for configuration reads and writes.
pub struct ConfigGateway {
    sources: SourceSet,
    pipeline: Arc<ValidationPipeline>,
    registry: Arc<ConfigRegistry>,
    current: RwLock<Arc<ResolvedSnapshot>>,
    /// Fragments behind the published snapshot. Held across awaits by the
    /// single writer.
    writer: Mutex<Vec<RawFragment>>,
}

impl std::fmt::Debug for ConfigGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigGateway")
            .field("generation", &self.generation())
            .field("user_file", &self.sources.user_file())
            .finish()
    }
}

impl ConfigGateway {
    /// Load, resolve and validate every source into generation 1.
    ///
    /// # M-CANONICAL-DOCS
    ///
    /// ## Purpose
    /// Builds the first snapshot at daemon startup. There is no earlier
    /// generation to fall back to, so any parse or validation error fails.
    ///
    /// ## Usage
    /// ```rust,no_run
    /// use config::gateway::ConfigGateway;
    /// use config::model::ModelCatalog;
    /// use config::registry::ConfigRegistry;
    /// use config::sources::{SourceLocations, SourceSet};
    /// use config::validation::{AccumulationPolicy, standard_pipeline};
    /// use std::sync::Arc;
    ///
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let catalog = Arc::new(ModelCatalog::embedded()?);
    /// let pipeline = Arc::new(standard_pipeline(catalog, AccumulationPolicy::AccumulateWarnings)?);
    /// let gateway = ConfigGateway::bootstrap(
    ///     SourceSet::new(SourceLocations::discover()),
    ///     pipeline,
    ///     Arc::new(ConfigRegistry::default()),
    /// )
    /// .await?;
    /// println!("generation {}", gateway.generation());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn bootstrap(
        sources: SourceSet,
        pipeline: Arc<ValidationPipeline>,
        registry: Arc<ConfigRegistry>,
    ) -> Result<Self, ConfigError> {
        let fragments = sources.load_all().await?;
        let snapshot = precedence::resolve(fragments.clone(), 1)?;
        let warnings = pipeline.validate_snapshot(&snapshot).await.into_result()?;
        log_warnings(&warnings);

        info!(
            "Configuration loaded: generation {}, {} values from {} sources",
            snapshot.generation(),
            snapshot.len(),
            fragments.len()
        );

        Ok(Self {
            sources,
            pipeline,
            registry,
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(fragments),
        })
    }

    /// The published snapshot. Holding it pins that generation.
    pub fn get_all(&self) -> Arc<ResolvedSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn get(&self, path: &ConfigPath) -> Option<Value> {
        self.get_all().get(path).cloned()
    }

    pub fn entry(&self, path: &ConfigPath) -> Option<ConfigValue> {
        self.get_all().entry(path).cloned()
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation()
    }

    pub fn settings(&self) -> Result<Settings, ConfigError> {
        Settings::from_snapshot(&self.get_all())
    }

    pub fn registry(&self) -> &Arc<ConfigRegistry> {
        &self.registry
    }

    pub fn pipeline(&self) -> &Arc<ValidationPipeline> {
        &self.pipeline
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    /// Validate and persist `value` at `path` in the user file.
    ///
    /// Returns the warnings raised. On rejection nothing is written and the
    /// published generation is unchanged.
    pub async fn set(
        &self,
        path: &ConfigPath,
        value: Value,
    ) -> Result<Vec<ValidationIssue>, ConfigError> {
        let mut fragments = self.writer.lock().await;
        self.write_locked(&mut fragments, path, value).await
    }

    /// Append `value` to the list at `path`, returning its index.
    pub async fn push(
        &self,
        path: &ConfigPath,
        value: Value,
    ) -> Result<(usize, Vec<ValidationIssue>), ConfigError> {
        let mut fragments = self.writer.lock().await;
        let index = match persisted_value(&fragments, path) {
            None => 0,
            Some(Value::List(items)) => items.len(),
            Some(other) => {
                return Err(ConfigError::InvalidPath {
                    path: path.to_string(),
                    reason: format!("expected a list, found {}", other.kind()),
                });
            }
        };
        let warnings = self
            .write_locked(&mut fragments, &path.child_index(index), value)
            .await?;
        Ok((index, warnings))
    }

    /// Remove `path` from the user file so lower sources show through.
    pub async fn unset(&self, path: &ConfigPath) -> Result<Vec<ValidationIssue>, ConfigError> {
        let mut fragments = self.writer.lock().await;
        let current = self.get_all();

        let mut user_tree = user_tree(&fragments);
        materialize_list(&mut user_tree, &fragments, path)?;
        if user_tree.remove_path(path).is_none() {
            return Err(ConfigError::InvalidPath {
                path: path.to_string(),
                reason: "not set in the user configuration".to_string(),
            });
        }

        let candidate_fragments = with_user_tree(&fragments, user_tree.clone(), &self.sources);
        let next = precedence::resolve(candidate_fragments.clone(), current.generation() + 1)?;
        let warnings = self
            .pipeline
            .validate_snapshot(&next)
            .await
            .into_result()?;

        self.sources.persist_user(&user_tree).await?;
        *fragments = candidate_fragments;
        let (installed, changed) = self.install(&current, next, ChangeTrigger::Write);
        info!(
            "Unset {} (generation {}, {} paths changed)",
            path,
            installed.generation(),
            changed
        );
        Ok(warnings)
    }

    /// Re-read every source, validate and install the result.
    ///
    /// On any failure the published generation stays in effect and the
    /// error is returned.
    pub async fn reload_from_sources(&self) -> Result<ReloadOutcome, ConfigError> {
        let mut fragments = self.writer.lock().await;
        let current = self.get_all();

        let loaded = self.sources.load_all().await.inspect_err(|e| {
            warn!(
                "Reload failed, keeping generation {}: {}",
                current.generation(),
                e
            );
        })?;
        let next = precedence::resolve(loaded.clone(), current.generation() + 1).inspect_err(
            |e| {
                warn!(
                    "Reload failed, keeping generation {}: {}",
                    current.generation(),
                    e
                );
            },
        )?;

        if next.same_content(&current) {
            *fragments = loaded;
            debug!(
                "Reload found no changes, staying at generation {}",
                current.generation()
            );
            return Ok(ReloadOutcome::Unchanged {
                generation: current.generation(),
            });
        }

        let result = self.pipeline.validate_snapshot(&next).await;
        for issue in &result.errors {
            warn!("Reload rejected: {}", issue);
        }
        let warnings = result.into_result()?;
        log_warnings(&warnings);

        *fragments = loaded;
        let (installed, changed) = self.install(&current, next, ChangeTrigger::Reload);
        info!(
            "Reloaded configuration: generation {} ({} paths changed)",
            installed.generation(),
            changed
        );
        Ok(ReloadOutcome::Applied {
            generation: installed.generation(),
            changed,
        })
    }

    async fn write_locked(
        &self,
        fragments: &mut Vec<RawFragment>,
        path: &ConfigPath,
        value: Value,
    ) -> Result<Vec<ValidationIssue>, ConfigError> {
        if path.is_root() {
            return Err(ConfigError::InvalidPath {
                path: String::new(),
                reason: "cannot replace the whole document".to_string(),
            });
        }
        let current = self.get_all();
        let mut user_tree = user_tree(fragments);
        materialize_list(&mut user_tree, fragments, path)?;

        let mut intended = current.tree().clone();
        if let Some(list_root) = path.list_root() {
            if let Some(list) = user_tree.get_path(&list_root) {
                intended
                    .set_path(&list_root, list.clone())
                    .map_err(|reason| invalid_path(&list_root, reason))?;
            }
        }
        intended
            .set_path(path, value.clone())
            .map_err(|reason| invalid_path(path, reason))?;
        let ctx = ValidationContext::for_write(&current, &intended, path);
        let mut warnings = self
            .pipeline
            .validate(path, &value, &ctx)
            .await
            .into_result()?;

        user_tree
            .set_path(path, value.clone())
            .map_err(|reason| invalid_path(path, reason))?;

        let candidate_fragments = with_user_tree(fragments, user_tree.clone(), &self.sources);
        let next = precedence::resolve(candidate_fragments.clone(), current.generation() + 1)?;
        self.check_shape(&next).await?;

        self.sources.persist_user(&user_tree).await?;
        *fragments = candidate_fragments;
        let (installed, changed) = self.install(&current, next, ChangeTrigger::Write);

        if installed.get(path) != Some(&value) {
            if let Some(source) = shadowing_source(&installed, path) {
                warnings.push(ValidationIssue::new(
                    path.to_string(),
                    format!("saved, but the {source} source overrides this value"),
                    IssueKind::Domain,
                    GATEWAY_VALIDATOR,
                ));
            }
        }

        debug!(
            "Set {} (generation {}, {} paths changed)",
            path,
            installed.generation(),
            changed
        );
        Ok(warnings)
    }

    /// Reject a resolved write whose document no longer has the expected
    /// shape. Folder and catalog rules were already applied to the value.
    async fn check_shape(&self, next: &ResolvedSnapshot) -> Result<(), ConfigError> {
        let issues: Vec<ValidationIssue> = self
            .pipeline
            .validate_snapshot(next)
            .await
            .errors
            .into_iter()
            .filter(|issue| issue.kind == IssueKind::Schema)
            .collect();
        if issues.is_empty() {
            return Ok(());
        }
        for issue in &issues {
            warn!("Write rejected: {}", issue);
        }
        Err(ConfigError::Rejected { issues })
    }

    /// Publish `next` unless it matches `current`.
    fn install(
        &self,
        current: &Arc<ResolvedSnapshot>,
        next: ResolvedSnapshot,
        trigger: ChangeTrigger,
    ) -> (Arc<ResolvedSnapshot>, usize) {
        let changed_paths = current.diff(&next);
        if changed_paths.is_empty() {
            return (Arc::clone(current), 0);
        }

        let changed = changed_paths.len();
        let next = Arc::new(next);
        *self.current.write() = Arc::clone(&next);
        self.registry.publish(&ConfigChangeEvent {
            changed_paths,
            generation: next.generation(),
            trigger,
        });
        (next, changed)
    }
}

#[async_trait]
impl ReloadTarget for ConfigGateway {
    async fn reload(&self) -> Result<ReloadOutcome, ConfigError> {
        self.reload_from_sources().await
    }
}

fn invalid_path(path: &ConfigPath, reason: String) -> ConfigError {
    ConfigError::InvalidPath {
        path: path.to_string(),
        reason,
    }
}

fn log_warnings(warnings: &[ValidationIssue]) {
    for issue in warnings {
        warn!("Configuration warning: {}", issue);
    }
}

fn user_tree(fragments: &[RawFragment]) -> Value {
    fragments
        .iter()
        .find(|fragment| fragment.source == SourceKind::User)
        .map(|fragment| fragment.tree.clone())
        .unwrap_or_else(Value::empty_map)
}

fn with_user_tree(fragments: &[RawFragment], tree: Value, sources: &SourceSet) -> Vec<RawFragment> {
    let mut updated: Vec<RawFragment> = fragments
        .iter()
        .filter(|fragment| fragment.source != SourceKind::User)
        .cloned()
        .collect();
    updated.push(RawFragment::new(
        SourceKind::User,
        sources.user_file().display().to_string(),
        tree,
    ));
    updated
}

/// The highest source above the user file that provides `path` or any
/// value below it.
fn shadowing_source(snapshot: &ResolvedSnapshot, path: &ConfigPath) -> Option<SourceKind> {
    snapshot
        .entries()
        .filter(|entry| entry.path.starts_with(path) || path.starts_with(&entry.path))
        .map(|entry| entry.source)
        .filter(|source| *source > SourceKind::User)
        .max()
}

/// The value at `path` as the packaged defaults, system and user files
/// would resolve it, ignoring profiles and overrides.
fn persisted_value<'f>(fragments: &'f [RawFragment], path: &ConfigPath) -> Option<&'f Value> {
    fragments
        .iter()
        .filter(|fragment| fragment.source <= SourceKind::User)
        .filter_map(|fragment| {
            fragment
                .tree
                .get_path(path)
                .filter(|value| !matches!(value, Value::Null))
                .map(|value| (fragment.source, value))
        })
        .max_by_key(|(source, _)| *source)
        .map(|(_, value)| value)
}

/// Lists replace rather than merge, so a write into a list the user file
/// does not hold yet starts from the list the lower files resolve to.
fn materialize_list(
    user_tree: &mut Value,
    fragments: &[RawFragment],
    path: &ConfigPath,
) -> Result<(), ConfigError> {
    let Some(list_root) = path.list_root() else {
        return Ok(());
    };
    if matches!(user_tree.get_path(&list_root), Some(held) if !matches!(held, Value::Null)) {
        return Ok(());
    }
    if let Some(inherited) = persisted_value(fragments, &list_root) {
        user_tree
            .set_path(&list_root, inherited.clone())
            .map_err(|reason| invalid_path(&list_root, reason))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelCatalog;
    use crate::path::PathFilter;
    use crate::sources::SourceLocations;
    use crate::validation::{AccumulationPolicy, standard_pipeline};
    use std::fs;
    use tempfile::TempDir;

    async fn gateway_in(dir: &TempDir) -> ConfigGateway {
        gateway_with(SourceLocations::in_dir(dir.path())).await
    }

    async fn gateway_with(locations: SourceLocations) -> ConfigGateway {
        let catalog = Arc::new(ModelCatalog::embedded().unwrap());
        let pipeline =
            Arc::new(standard_pipeline(catalog, AccumulationPolicy::AccumulateWarnings).unwrap());
        ConfigGateway::bootstrap(
            SourceSet::new(locations),
            pipeline,
            Arc::new(ConfigRegistry::default()),
        )
        .await
        .unwrap()
    }

    fn path(raw: &str) -> ConfigPath {
        ConfigPath::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn test_bootstrap_uses_packaged_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;
        assert_eq!(gateway.generation(), 1);
        assert_eq!(gateway.get(&path("server.port")), Some(Value::Int(7420)));
        assert_eq!(
            gateway.entry(&path("server.port")).unwrap().source,
            SourceKind::PackagedDefault
        );
    }

    #[tokio::test]
    async fn test_set_then_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;

        let warnings = gateway.set(&path("ui.theme"), Value::from("dark")).await.unwrap();
        assert!(warnings.is_empty());
        assert_eq!(gateway.get(&path("ui.theme")), Some(Value::from("dark")));
        assert_eq!(gateway.entry(&path("ui.theme")).unwrap().source, SourceKind::User);
        assert_eq!(gateway.generation(), 2);

        let saved = fs::read_to_string(dir.path().join("config.yaml")).unwrap();
        assert!(saved.contains("theme: dark"));
    }

    #[tokio::test]
    async fn test_rejected_set_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;

        let err = gateway.set(&path("server.port"), Value::Int(80)).await.unwrap_err();
        assert_eq!(err.issues().len(), 1);
        assert_eq!(err.issues()[0].path, "server.port");
        assert_eq!(gateway.generation(), 1);
        assert_eq!(gateway.get(&path("server.port")), Some(Value::Int(7420)));
        assert!(!dir.path().join("config.yaml").exists());
    }

    #[tokio::test]
    async fn test_set_publishes_write_event() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;
        let mut sub = gateway.registry().subscribe(PathFilter::prefix("ui").unwrap());

        gateway.set(&path("ui.theme"), Value::from("light")).await.unwrap();
        let event = sub.recv().await.unwrap();
        assert_eq!(event.trigger, ChangeTrigger::Write);
        assert_eq!(event.generation, 2);
        assert!(event.changed_paths.contains(&path("ui.theme")));
    }

    #[tokio::test]
    async fn test_setting_same_value_keeps_generation() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;
        gateway.set(&path("ui.theme"), Value::from("dark")).await.unwrap();
        gateway.set(&path("ui.theme"), Value::from("dark")).await.unwrap();
        assert_eq!(gateway.generation(), 2);
    }

    #[tokio::test]
    async fn test_push_appends_folders() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;
        let docs = dir.path().join("docs");
        let notes = dir.path().join("notes");
        fs::create_dir_all(&docs).unwrap();
        fs::create_dir_all(&notes).unwrap();

        let folder = |p: &std::path::Path| -> Value {
            [("path", p.to_string_lossy().to_string())].into_iter().collect()
        };
        let (first, _) = gateway.push(&path("folders"), folder(&docs)).await.unwrap();
        let (second, _) = gateway.push(&path("folders"), folder(&notes)).await.unwrap();
        assert_eq!((first, second), (0, 1));
        assert_eq!(
            gateway.get(&path("folders")).unwrap().as_list().unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_nested_folder_rejected_ancestor_warned() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;
        let data = dir.path().join("data");
        let sub = data.join("sub");
        fs::create_dir_all(&sub).unwrap();
        let folder = |p: &std::path::Path| -> Value {
            [("path", p.to_string_lossy().to_string())].into_iter().collect()
        };

        gateway.push(&path("folders"), folder(&data)).await.unwrap();
        let err = gateway.push(&path("folders"), folder(&sub)).await.unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(err.issues()[0].path, "folders[1].path");

        let other = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&other).await;
        let data = other.path().join("data");
        let sub = data.join("sub");
        fs::create_dir_all(&sub).unwrap();
        gateway.push(&path("folders"), folder(&sub)).await.unwrap();
        let (_, warnings) = gateway.push(&path("folders"), folder(&data)).await.unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].path, "folders[1].path");
    }

    #[tokio::test]
    async fn test_unset_reverts_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;
        gateway.set(&path("server.port"), Value::Int(9000)).await.unwrap();
        gateway.unset(&path("server.port")).await.unwrap();
        assert_eq!(gateway.get(&path("server.port")), Some(Value::Int(7420)));
        assert_eq!(
            gateway.entry(&path("server.port")).unwrap().source,
            SourceKind::PackagedDefault
        );
    }

    #[tokio::test]
    async fn test_unset_missing_key_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;
        let err = gateway.unset(&path("ui.theme")).await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPath { .. }));
    }

    #[tokio::test]
    async fn test_write_below_scalar_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;

        let err = gateway.set(&path("server.port.x"), Value::Int(1)).await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPath { .. }));
        let err = gateway.set(&path("ui.theme[0]"), Value::from("dark")).await.unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPath { .. }));

        assert_eq!(gateway.generation(), 1);
        assert_eq!(gateway.get(&path("server.port")), Some(Value::Int(7420)));
        assert!(!dir.path().join("config.yaml").exists());
    }

    #[tokio::test]
    async fn test_shape_changing_writes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;
        let nested: Value = [("x", 1i64)].into_iter().collect();

        let err = gateway.set(&path("server"), Value::from("abc")).await.unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(err.issues()[0].path, "server");

        let err = gateway.set(&path("server.port"), nested).await.unwrap_err();
        assert!(err.is_rejection());

        let err = gateway.set(&path("folders"), Value::from("/data")).await.unwrap_err();
        assert!(err.is_rejection());

        assert_eq!(gateway.generation(), 1);
        assert!(!dir.path().join("config.yaml").exists());
        let restarted = gateway_in(&dir).await;
        assert_eq!(restarted.get(&path("server.port")), Some(Value::Int(7420)));
    }

    #[tokio::test]
    async fn test_write_leaving_incomplete_parent_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;

        let err = gateway
            .set(&path("embedding.default_model.model_id"), Value::from("minilm-l6"))
            .await
            .unwrap_err();
        assert!(err.is_rejection());
        assert!(err.issues().iter().all(|issue| issue.kind == IssueKind::Schema));
        assert!(
            err.issues()
                .iter()
                .any(|issue| issue.path == "embedding.default_model")
        );
        assert_eq!(gateway.generation(), 1);
        assert!(!dir.path().join("config.yaml").exists());
    }

    #[tokio::test]
    async fn test_push_under_profile_keeps_profile_folders_out_of_user_file() {
        let dir = tempfile::tempdir().unwrap();
        let alpha = dir.path().join("alpha");
        let beta = dir.path().join("beta");
        fs::create_dir_all(&alpha).unwrap();
        fs::create_dir_all(&beta).unwrap();
        let profiles = dir.path().join("profiles");
        fs::create_dir_all(&profiles).unwrap();
        fs::write(
            profiles.join("work.yaml"),
            format!("folders:\n  - path: {}\n", alpha.display()),
        )
        .unwrap();
        let gateway = gateway_with(
            SourceLocations::in_dir(dir.path()).with_profile(Some("work".to_string())),
        )
        .await;

        let folder: Value = [("path", beta.to_string_lossy().to_string())]
            .into_iter()
            .collect();
        let (index, warnings) = gateway.push(&path("folders"), folder).await.unwrap();
        assert_eq!(index, 0);
        assert!(warnings.iter().any(|w| w.validator == GATEWAY_VALIDATOR));

        let saved = fs::read_to_string(dir.path().join("config.yaml")).unwrap();
        assert!(saved.contains("beta"));
        assert!(!saved.contains("alpha"));
        assert_eq!(gateway.entry(&path("folders")).unwrap().source, SourceKind::Profile);

        let without_profile = gateway_in(&dir).await;
        let folders = without_profile.get(&path("folders")).unwrap();
        assert_eq!(folders.as_list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reload_picks_up_external_edit() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;
        fs::write(dir.path().join("config.yaml"), "ui:\n  theme: light\n").unwrap();

        let outcome = gateway.reload_from_sources().await.unwrap();
        assert_eq!(outcome, ReloadOutcome::Applied { generation: 2, changed: 1 });
        assert_eq!(gateway.get(&path("ui.theme")), Some(Value::from("light")));
    }

    #[tokio::test]
    async fn test_reload_without_changes_keeps_generation() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;
        gateway.set(&path("ui.theme"), Value::from("dark")).await.unwrap();
        let outcome = gateway.reload_from_sources().await.unwrap();
        assert_eq!(outcome, ReloadOutcome::Unchanged { generation: 2 });
    }

    #[tokio::test]
    async fn test_invalid_reload_keeps_last_good_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = gateway_in(&dir).await;
        let before = gateway.get_all();

        fs::write(dir.path().join("config.yaml"), "ui: [unclosed\n").unwrap();
        assert!(matches!(
            gateway.reload_from_sources().await,
            Err(ConfigError::Parse { .. })
        ));

        fs::write(dir.path().join("config.yaml"), "server:\n  port: 1\n").unwrap();
        assert!(gateway.reload_from_sources().await.unwrap_err().is_rejection());

        let after = gateway.get_all();
        assert_eq!(after.generation(), before.generation());
        assert!(after.same_content(&before));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_never_see_torn_state() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = Arc::new(gateway_in(&dir).await);
        let server = |host: &str, port: i64| -> Value {
            [("host", Value::from(host)), ("port", Value::Int(port))]
                .into_iter()
                .collect()
        };

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut readers = Vec::new();
        for _ in 0..4 {
            let gateway = Arc::clone(&gateway);
            let stop = Arc::clone(&stop);
            readers.push(tokio::spawn(async move {
                let mut last_generation = 0;
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    let snapshot = gateway.get_all();
                    assert!(snapshot.generation() >= last_generation);
                    last_generation = snapshot.generation();
                    let host = snapshot.get(&path("server.host")).cloned();
                    let port = snapshot.get(&path("server.port")).cloned();
                    match (host, port) {
                        (Some(Value::String(h)), Some(Value::Int(p))) => {
                            let consistent = match h.as_str() {
                                "127.0.0.1" => p == 7420,
                                "0.0.0.0" => p % 2 == 0,
                                "localhost" => p % 2 == 1,
                                _ => false,
                            };
                            assert!(consistent, "torn read: {h}:{p}");
                        }
                        other => panic!("missing server values: {other:?}"),
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }

        for i in 0..20 {
            let host = if i % 2 == 0 { "0.0.0.0" } else { "localhost" };
            gateway
                .set(&path("server"), server(host, 8000 + i))
                .await
                .unwrap();
        }
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(gateway.generation(), 21);
    }
}
