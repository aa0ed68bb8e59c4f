pub mod config;
pub mod folders;
pub mod model;
pub mod serve;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use ::config::engine::{ConfigEngine, EngineOptions};
use ::config::model::{ModelCatalog, SystemProbe};
use ::config::sources::{overrides_from_env, parse_override};
use ::config::{ConfigPath, SourceLocations, Value};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "foldersd",
    author,
    version,
    about = "foldersd - index local folders for semantic search",
    long_about = "Indexes local folders with a local embedding model.\n\nConfiguration is layered: \
                  packaged defaults, system file, user file, profile overlay, then --set and \
                  FOLDERSD__SECTION__KEY overrides."
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the daemon: load configuration, watch files, follow changes")]
    Serve(serve::ServeArgs),

    #[command(subcommand, about = "Read, change and validate configuration")]
    Config(config::ConfigCommand),

    #[command(subcommand, about = "Manage indexed folders")]
    Folders(folders::FoldersCommand),

    #[command(subcommand, about = "Show, recommend and select the default embedding model")]
    Model(model::ModelCommand),
}

/// Source locations and overrides shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    #[arg(long, global = true, env = "FOLDERSD_CONFIG", help = "User configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "System-wide configuration file")]
    pub system_config: Option<PathBuf>,

    #[arg(long, global = true, help = "Replace the compiled-in defaults with this file")]
    pub defaults: Option<PathBuf>,

    #[arg(long, global = true, help = "Directory holding profile overlays")]
    pub profiles_dir: Option<PathBuf>,

    #[arg(long, global = true, env = "FOLDERSD_PROFILE", help = "Profile overlay to apply")]
    pub profile: Option<String>,

    #[arg(
        long = "set",
        global = true,
        value_name = "PATH=VALUE",
        help = "Override a configuration value for this run (repeatable)"
    )]
    pub overrides: Vec<String>,

    #[arg(long, global = true, help = "Model catalog file instead of the compiled-in one")]
    pub catalog: Option<PathBuf>,

    #[arg(long, global = true, help = "Output as JSON")]
    pub json: bool,
}

impl GlobalArgs {
    pub fn locations(&self) -> SourceLocations {
        let mut locations = SourceLocations::discover();
        if let Some(user) = &self.config {
            locations.user_file = user.clone();
        }
        if let Some(system) = &self.system_config {
            locations.system_file = Some(system.clone());
        }
        if let Some(defaults) = &self.defaults {
            locations.packaged_defaults = Some(defaults.clone());
        }
        if let Some(dir) = &self.profiles_dir {
            locations.profiles_dir = Some(dir.clone());
        }
        locations.with_profile(self.profile.clone())
    }

    /// Environment overrides first, then `--set` in command-line order.
    pub fn overrides(&self) -> Result<Vec<(ConfigPath, Value)>> {
        let mut overrides = overrides_from_env();
        for arg in &self.overrides {
            overrides.push(parse_override(arg)?);
        }
        Ok(overrides)
    }

    pub fn options(&self) -> Result<EngineOptions> {
        Ok(EngineOptions {
            locations: self.locations(),
            overrides: self.overrides()?,
            catalog_file: self.catalog.clone(),
            ..EngineOptions::default()
        })
    }

    pub async fn catalog(&self) -> Result<ModelCatalog> {
        Ok(match &self.catalog {
            Some(path) => ModelCatalog::load(path).await?,
            None => ModelCatalog::embedded()?,
        })
    }

    pub async fn engine(&self) -> Result<ConfigEngine> {
        let engine = ConfigEngine::build(self.options()?, Arc::new(SystemProbe::default())).await?;
        Ok(engine)
    }
}

pub fn parse_path(raw: &str) -> Result<ConfigPath> {
    Ok(ConfigPath::parse(raw)?)
}
