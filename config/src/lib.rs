//! # Configuration Engine
//!
//! Layered configuration for the foldersd indexing daemon.
//!
//! This crate provides:
//! - Readers for packaged defaults, system, user and profile files plus
//!   process overrides
//! - A resolver that merges them into immutable, generation-numbered
//!   snapshots with per-value provenance
//! - A prioritized validation pipeline (schema, folder and catalog rules)
//! - A single write path that validates, persists and publishes atomically
//! - Debounced file watching and change notification to subscribers
//! - Default embedding model arbitration against a curated catalog
//!
//! # Best Practices
//!
//! - Uses `validator` crate for input validation
//! - Readers never see a partially applied write
//! - Provides clear error messages for invalid configuration

pub mod engine;
pub mod file_loader;
pub mod gateway;
pub mod hot_reload;
pub mod model;
pub mod path;
pub mod precedence;
pub mod registry;
pub mod settings;
pub mod snapshot;
pub mod sources;
pub mod validation;
pub mod value;

pub use engine::{ConfigEngine, EngineOptions};
pub use file_loader::{DocumentFormat, load_document, parse_document};
pub use gateway::{ConfigGateway, ReloadOutcome};
pub use hot_reload::{ConfigWatcher, ReloadTarget, WatchTarget, WatcherHandle};
pub use model::{ModelArbiter, ModelCatalog, ModelSelection, SelectionSource};
pub use path::{ConfigPath, PathFilter, PathMatcher};
pub use precedence::resolve;
pub use registry::{ChangeTrigger, ConfigChangeEvent, ConfigRegistry, Subscription};
pub use settings::Settings;
pub use snapshot::{ConfigValue, ResolvedSnapshot};
pub use sources::{RawFragment, SourceKind, SourceLocations, SourceSet};
pub use validation::{
    AccumulationPolicy, ValidationContext, ValidationPipeline, ValidationResult, Validator,
};
pub use validator::Validate;
pub use value::Value;
