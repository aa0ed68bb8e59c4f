//! # Configuration Hot Reload
//!
//! Watches configuration files for changes and reloads configuration
//! automatically.
//!
//! Any number of filesystem notifications arriving within the debounce
//! window collapse into a single reload, whichever watched path fired.
//! Editor swap and temp files are dropped before they count.

use crate::gateway::ReloadOutcome;
use async_trait::async_trait;
use errors::ConfigError;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use regex::RegexSet;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// File names produced by editors and atomic-save helpers.
const IGNORED_NAMES: &[&str] = &[
    r"~$",
    r"\.sw[pox]$",
    r"^\.#",
    r"^#.*#$",
    r"^\.tmp",
    r"\.tmp$",
    r"^4913$",
    r"^\.DS_Store$",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    File,
    Directory,
}

/// A path whose changes trigger a reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchTarget {
    pub path: PathBuf,
    pub kind: WatchKind,
    pub debounce: Duration,
}

impl WatchTarget {
    pub fn file(path: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            path: path.into(),
            kind: WatchKind::File,
            debounce,
        }
    }

    pub fn directory(path: impl Into<PathBuf>, debounce: Duration) -> Self {
        Self {
            path: path.into(),
            kind: WatchKind::Directory,
            debounce,
        }
    }

    /// Directory handed to the OS watcher.
    fn watch_dir(&self) -> Option<PathBuf> {
        match self.kind {
            WatchKind::Directory => Some(self.path.clone()),
            WatchKind::File => self
                .path
                .parent()
                .map(|parent| {
                    if parent.as_os_str().is_empty() {
                        PathBuf::from(".")
                    } else {
                        parent.to_path_buf()
                    }
                }),
        }
    }
}

/// Whatever a debounced change should reload.
#[async_trait]
pub trait ReloadTarget: Send + Sync + 'static {
    async fn reload(&self) -> Result<ReloadOutcome, ConfigError>;
}

/// Names of editor artifacts that never trigger a reload.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    names: RegexSet,
}

impl IgnoreRules {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            names: RegexSet::new(IGNORED_NAMES)?,
        })
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| self.names.is_match(name))
    }
}

#[derive(Debug, Clone)]
struct TargetMatch {
    dirs: Vec<PathBuf>,
    file_name: Option<std::ffi::OsString>,
}

/// Decides whether a notification concerns any watch target.
#[derive(Debug, Clone)]
pub struct EventFilter {
    targets: Vec<TargetMatch>,
    ignore: IgnoreRules,
}

impl EventFilter {
    pub fn new(targets: &[WatchTarget], ignore: IgnoreRules) -> Self {
        let targets = targets
            .iter()
            .filter_map(|target| {
                let dir = target.watch_dir()?;
                let mut dirs = vec![dir.clone()];
                if let Ok(canonical) = dir.canonicalize() {
                    if canonical != dir {
                        dirs.push(canonical);
                    }
                }
                let file_name = match target.kind {
                    WatchKind::File => Some(target.path.file_name()?.to_os_string()),
                    WatchKind::Directory => None,
                };
                Some(TargetMatch { dirs, file_name })
            })
            .collect();
        Self { targets, ignore }
    }

    pub fn accepts(&self, event: &Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        event.paths.iter().any(|path| self.accepts_path(path))
    }

    fn accepts_path(&self, path: &Path) -> bool {
        if self.ignore.is_ignored(path) {
            debug!("Ignoring editor artifact {:?}", path);
            return false;
        }
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return false;
        };
        self.targets.iter().any(|target| {
            target.dirs.iter().any(|dir| dir == parent)
                && target
                    .file_name
                    .as_ref()
                    .is_none_or(|wanted| wanted.as_os_str() == name)
        })
    }
}

/// Watches configuration sources and reloads after bursts settle.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Monitors the user file, system file and profile directory and calls
/// [`ReloadTarget::reload`] once per burst of changes. Uses the `notify`
/// crate for cross-platform file system watching.
///
/// ## Usage
/// ```rust,no_run
/// use config::hot_reload::{ConfigWatcher, WatchTarget, DEFAULT_DEBOUNCE};
/// # use config::gateway::ConfigGateway;
/// # use std::sync::Arc;
/// # async fn run(gateway: Arc<ConfigGateway>) -> Result<(), Box<dyn std::error::Error>> {
/// let watcher = ConfigWatcher::new(vec![WatchTarget::file(
///     "/home/me/.config/foldersd/config.yaml",
///     DEFAULT_DEBOUNCE,
/// )])?;
/// let handle = watcher.start(gateway)?;
/// tokio::signal::ctrl_c().await?;
/// handle.stop().await;
/// # Ok(())
/// # }
/// ```
///
/// ## Performance
/// Files are watched through their parent directory, non-recursively, so
/// rename-over saves and not-yet-created files are still seen.
#[derive(Debug, Clone)]
pub struct ConfigWatcher {
    targets: Vec<WatchTarget>,
    ignore: IgnoreRules,
}

impl ConfigWatcher {
    pub fn new(targets: Vec<WatchTarget>) -> Result<Self, ConfigError> {
        let ignore = IgnoreRules::new().map_err(|e| ConfigError::Settings {
            reason: format!("invalid ignore pattern: {e}"),
        })?;
        Ok(Self { targets, ignore })
    }

    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    /// The shared window: the longest debounce any target asks for.
    pub fn debounce(&self) -> Duration {
        self.targets
            .iter()
            .map(|target| target.debounce)
            .max()
            .unwrap_or(DEFAULT_DEBOUNCE)
    }

    /// Begin watching. Must be called inside a tokio runtime.
    pub fn start(self, reload: Arc<dyn ReloadTarget>) -> Result<WatcherHandle, ConfigError> {
        let (event_tx, event_rx) = mpsc::channel(256);
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.blocking_send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| ConfigError::Io {
            operation: "create watcher".to_string(),
            path: String::new(),
            reason: e.to_string(),
        })?;

        let mut watched = BTreeSet::new();
        for target in &self.targets {
            let Some(dir) = target.watch_dir() else {
                continue;
            };
            if !dir.is_dir() {
                warn!(
                    "Not watching {:?}: directory {:?} does not exist",
                    target.path, dir
                );
                continue;
            }
            if !watched.insert(dir.clone()) {
                continue;
            }
            watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| ConfigError::Io {
                    operation: "watch".to_string(),
                    path: dir.display().to_string(),
                    reason: e.to_string(),
                })?;
            info!("Watching configuration directory: {:?}", dir);
        }

        let debounce = self.debounce();
        let filter = EventFilter::new(&self.targets, self.ignore);
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(run_debounce_loop(event_rx, filter, debounce, reload, stop_rx));

        Ok(WatcherHandle {
            _watcher: watcher,
            stop: Some(stop_tx),
            task,
        })
    }
}

/// Keeps the OS watcher and debounce task alive. Dropping it stops both.
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub async fn stop(self) {
        let WatcherHandle {
            _watcher,
            stop,
            task,
        } = self;
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
        if let Err(e) = task.await {
            error!("Watcher task ended abnormally: {}", e);
        }
    }
}

/// Collapse bursts of events into single reloads.
///
/// Every accepted event pushes the deadline out by `debounce`; the reload
/// fires once the window passes with no further events.
pub async fn run_debounce_loop(
    mut events: mpsc::Receiver<notify::Result<Event>>,
    filter: EventFilter,
    debounce: Duration,
    target: Arc<dyn ReloadTarget>,
    mut stop: oneshot::Receiver<()>,
) {
    let sleep = tokio::time::sleep(debounce);
    tokio::pin!(sleep);
    let mut pending = false;

    loop {
        tokio::select! {
            _ = &mut stop => {
                debug!("Configuration watcher stopping");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    debug!("Watcher event channel closed");
                    break;
                };
                match event {
                    Ok(event) if filter.accepts(&event) => {
                        debug!("Configuration change: {:?} {:?}", event.kind, event.paths);
                        pending = true;
                        sleep.as_mut().reset(Instant::now() + debounce);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Watch error: {}", e),
                }
            }
            () = &mut sleep, if pending => {
                pending = false;
                match target.reload().await {
                    Ok(ReloadOutcome::Applied { generation, changed }) => {
                        info!("Reloaded configuration after file change: generation {} ({} paths)", generation, changed);
                    }
                    Ok(ReloadOutcome::Unchanged { generation }) => {
                        debug!("File change left configuration at generation {}", generation);
                    }
                    Err(e) => {
                        error!("Reload after file change failed: {}", e);
                    }
                }
            }
        }
    }
}
