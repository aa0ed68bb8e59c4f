//! # Engine Assembly
//!
//! Builds every component once and hands them out by reference. There is
//! no global state; whoever needs configuration receives the engine or one
//! of its parts.

use crate::gateway::ConfigGateway;
use crate::hot_reload::{ConfigWatcher, DEFAULT_DEBOUNCE, WatchTarget, WatcherHandle};
use crate::model::{CapabilityProbe, ModelArbiter, ModelCatalog};
use crate::path::ConfigPath;
use crate::registry::{ConfigRegistry, DEFAULT_QUEUE_CAPACITY};
use crate::sources::{SourceLocations, SourceSet};
use crate::validation::{AccumulationPolicy, ValidationPipeline, standard_pipeline};
use crate::value::Value;
use errors::{ConfigError, EngineError};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

/// How to assemble an engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub locations: SourceLocations,
    /// Highest-precedence values, from the command line and environment.
    pub overrides: Vec<(ConfigPath, Value)>,
    /// Replaces the compiled-in model catalog.
    pub catalog_file: Option<PathBuf>,
    pub policy: AccumulationPolicy,
    pub queue_capacity: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            locations: SourceLocations::discover(),
            overrides: Vec::new(),
            catalog_file: None,
            policy: AccumulationPolicy::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// The configuration engine of one daemon process.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Owns the catalog, validation pipeline, registry, gateway and model
/// arbiter, wired together.
///
/// ## Usage
/// ```rust,no_run
/// use config::engine::{ConfigEngine, EngineOptions};
/// use config::model::SystemProbe;
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = ConfigEngine::build(EngineOptions::default(), Arc::new(SystemProbe::default())).await?;
/// engine.arbiter.initialize().await?;
/// let _watcher = engine.start_watcher()?;
/// # Ok(())
/// # }
/// ```
pub struct ConfigEngine {
    pub catalog: Arc<ModelCatalog>,
    pub pipeline: Arc<ValidationPipeline>,
    pub registry: Arc<ConfigRegistry>,
    pub gateway: Arc<ConfigGateway>,
    pub arbiter: Arc<ModelArbiter>,
}

impl ConfigEngine {
    pub async fn build(
        options: EngineOptions,
        probe: Arc<dyn CapabilityProbe>,
    ) -> Result<Self, EngineError> {
        let catalog = Arc::new(match &options.catalog_file {
            Some(path) => ModelCatalog::load(path).await?,
            None => ModelCatalog::embedded()?,
        });
        let pipeline = Arc::new(standard_pipeline(Arc::clone(&catalog), options.policy)?);
        let registry = Arc::new(ConfigRegistry::new(options.queue_capacity));

        let sources = SourceSet::new(options.locations).with_overrides(options.overrides);
        let gateway = Arc::new(
            ConfigGateway::bootstrap(sources, Arc::clone(&pipeline), Arc::clone(&registry))
                .await?,
        );
        let arbiter = Arc::new(ModelArbiter::new(
            Arc::clone(&catalog),
            probe,
            Arc::clone(&gateway),
        ));

        Ok(Self {
            catalog,
            pipeline,
            registry,
            gateway,
            arbiter,
        })
    }

    /// Paths whose edits should trigger a reload.
    pub fn watch_targets(&self) -> Vec<WatchTarget> {
        let debounce = match self.gateway.settings() {
            Ok(settings) => settings.watcher.debounce(),
            Err(e) => {
                warn!("Using default debounce: {}", e);
                DEFAULT_DEBOUNCE
            }
        };

        let locations = self.gateway.sources().locations();
        let mut targets = vec![WatchTarget::file(&locations.user_file, debounce)];
        if let Some(system) = &locations.system_file {
            targets.push(WatchTarget::file(system, debounce));
        }
        if let Some(defaults) = &locations.packaged_defaults {
            targets.push(WatchTarget::file(defaults, debounce));
        }
        if let Some(profiles) = &locations.profiles_dir {
            targets.push(WatchTarget::directory(profiles, debounce));
        }
        targets
    }

    pub fn start_watcher(&self) -> Result<WatcherHandle, ConfigError> {
        ConfigWatcher::new(self.watch_targets())?.start(Arc::clone(&self.gateway) as _)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hot_reload::WatchKind;
    use crate::model::{HardwareProfile, StaticProbe};
    use crate::path::PathFilter;
    use std::time::Duration;

    fn options(dir: &std::path::Path) -> EngineOptions {
        EngineOptions {
            locations: SourceLocations::in_dir(dir),
            ..EngineOptions::default()
        }
    }

    fn probe() -> Arc<dyn CapabilityProbe> {
        Arc::new(StaticProbe::new(HardwareProfile {
            cpu_cores: 4,
            memory_mb: 8192,
            gpu: false,
        }))
    }

    #[tokio::test]
    async fn test_build_wires_shared_registry() {
        let dir = tempfile::tempdir().unwrap();
        let engine = ConfigEngine::build(options(dir.path()), probe()).await.unwrap();
        assert!(Arc::ptr_eq(&engine.registry, engine.gateway.registry()));
        assert!(Arc::ptr_eq(&engine.pipeline, engine.gateway.pipeline()));
    }

    #[tokio::test]
    async fn test_overrides_win() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = options(dir.path());
        opts.overrides = vec![(ConfigPath::parse("server.port").unwrap(), Value::Int(9100))];
        let engine = ConfigEngine::build(opts, probe()).await.unwrap();
        assert_eq!(engine.gateway.settings().unwrap().server.port, 9100);
    }

    #[tokio::test]
    async fn test_watch_targets_follow_locations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "watcher:\n  debounce_ms: 250\n").unwrap();
        let engine = ConfigEngine::build(options(dir.path()), probe()).await.unwrap();

        let targets = engine.watch_targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].kind, WatchKind::File);
        assert_eq!(targets[1].kind, WatchKind::Directory);
        assert!(targets.iter().all(|t| t.debounce == Duration::from_millis(250)));
    }

    #[tokio::test]
    async fn test_watcher_reloads_external_edit() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.yaml");
        std::fs::write(&file, "watcher:\n  debounce_ms: 100\n").unwrap();
        let engine = ConfigEngine::build(options(dir.path()), probe()).await.unwrap();
        let mut sub = engine.registry.subscribe(PathFilter::prefix("ui").unwrap());
        let handle = engine.start_watcher().unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        std::fs::write(&file, "watcher:\n  debounce_ms: 100\nui:\n  theme: dark\n").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(event.changed_paths.contains(&ConfigPath::parse("ui.theme").unwrap()));
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_invalid_startup_configuration_fails() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), "server:\n  port: 22\n").unwrap();
        let result = ConfigEngine::build(options(dir.path()), probe()).await;
        assert!(matches!(result, Err(EngineError::Config(ConfigError::Rejected { .. }))));
    }
}
