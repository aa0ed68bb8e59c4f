use super::{GlobalArgs, parse_path};
use crate::output;
use crate::ux_error;
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use config::precedence::resolve;
use config::sources::SourceSet;
use config::validation::{AccumulationPolicy, standard_pipeline};
use config::Value;
use std::sync::Arc;

#[derive(Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Print the effective value at a path")]
    Get(GetArgs),

    #[command(about = "Validate and store a value in the user configuration file")]
    Set(SetArgs),

    #[command(about = "Remove a value from the user configuration file")]
    Unset(UnsetArgs),

    #[command(about = "Print the whole effective configuration")]
    Show(ShowArgs),

    #[command(about = "Resolve and validate every source without changing anything")]
    Validate,

    #[command(about = "Show where each configuration source is read from")]
    Paths,
}

#[derive(Args)]
pub struct GetArgs {
    #[arg(help = "Configuration path, e.g. server.port or folders[0].path")]
    pub path: String,
}

#[derive(Args)]
pub struct SetArgs {
    #[arg(help = "Configuration path, e.g. ui.theme")]
    pub path: String,

    #[arg(help = "New value, parsed like YAML (9000, true, dark, [a, b])")]
    pub value: String,
}

#[derive(Args)]
pub struct UnsetArgs {
    #[arg(help = "Configuration path to remove from the user file")]
    pub path: String,
}

#[derive(Args)]
pub struct ShowArgs {
    #[arg(long, help = "List every leaf with the source it came from")]
    pub sources: bool,
}

pub async fn run(cmd: ConfigCommand, global: &GlobalArgs) -> Result<()> {
    match cmd {
        ConfigCommand::Get(args) => get(args, global).await,
        ConfigCommand::Set(args) => set(args, global).await,
        ConfigCommand::Unset(args) => unset(args, global).await,
        ConfigCommand::Show(args) => show(args, global).await,
        ConfigCommand::Validate => validate(global).await,
        ConfigCommand::Paths => paths(global),
    }
}

async fn get(args: GetArgs, global: &GlobalArgs) -> Result<()> {
    let path = parse_path(&args.path)?;
    let engine = global.engine().await?;

    let Some(value) = engine.gateway.get(&path) else {
        return Err(ux_error::UxError::new(format!("No value at '{}'", path))
            .fix("Check the spelling of the path")
            .suggest("foldersd config show --sources")
            .into());
    };
    let source = engine.gateway.entry(&path).map(|entry| entry.source);

    if global.json {
        return output::json(&serde_json::json!({
            "path": path.to_string(),
            "value": value,
            "source": source,
            "generation": engine.gateway.generation(),
        }));
    }

    match value {
        Value::List(_) | Value::Map(_) => print!("{}", serde_yaml::to_string(&value)?),
        Value::String(text) => println!("{text}"),
        scalar => println!("{scalar}"),
    }
    Ok(())
}

async fn set(args: SetArgs, global: &GlobalArgs) -> Result<()> {
    let path = parse_path(&args.path)?;
    let value = Value::parse_scalar(&args.value);
    let engine = global.engine().await?;

    let warnings = engine.gateway.set(&path, value.clone()).await?;

    if global.json {
        return output::json(&serde_json::json!({
            "path": path.to_string(),
            "value": value,
            "generation": engine.gateway.generation(),
            "warnings": warnings,
        }));
    }

    output::warnings(&warnings);
    output::success(&format!(
        "{} = {} (generation {})",
        path,
        value,
        engine.gateway.generation()
    ));
    Ok(())
}

async fn unset(args: UnsetArgs, global: &GlobalArgs) -> Result<()> {
    let path = parse_path(&args.path)?;
    let engine = global.engine().await?;

    let warnings = engine.gateway.unset(&path).await?;

    if global.json {
        return output::json(&serde_json::json!({
            "path": path.to_string(),
            "effective": engine.gateway.get(&path),
            "generation": engine.gateway.generation(),
            "warnings": warnings,
        }));
    }

    output::warnings(&warnings);
    match engine.gateway.get(&path) {
        Some(value) => output::success(&format!("Removed {path}, now {value} from lower sources")),
        None => output::success(&format!("Removed {path}")),
    }
    Ok(())
}

async fn show(args: ShowArgs, global: &GlobalArgs) -> Result<()> {
    let engine = global.engine().await?;
    let snapshot = engine.gateway.get_all();

    if global.json {
        if args.sources {
            let entries: Vec<_> = snapshot.entries().collect();
            return output::json(&entries);
        }
        return output::json(snapshot.tree());
    }

    if !args.sources {
        print!("{}", serde_yaml::to_string(snapshot.tree())?);
        return Ok(());
    }

    output::header(&format!("Configuration (generation {})", snapshot.generation()));
    println!();
    for entry in snapshot.entries() {
        output::field(
            &entry.path.to_string(),
            &entry.value.to_string(),
            Some(&entry.source.to_string()),
        );
    }
    Ok(())
}

/// Resolve and validate without bootstrapping, so every problem is listed
/// instead of the first startup failure.
async fn validate(global: &GlobalArgs) -> Result<()> {
    let catalog = Arc::new(global.catalog().await?);
    let pipeline = standard_pipeline(catalog, AccumulationPolicy::AccumulateWarnings)?;
    let sources = SourceSet::new(global.locations()).with_overrides(global.overrides()?);
    let fragments = sources.load_all().await?;
    let loaded = fragments.len();
    let snapshot = resolve(fragments, 1)?;
    let result = pipeline.validate_snapshot(&snapshot).await;

    if global.json {
        output::json(&result)?;
    } else {
        output::warnings(&result.warnings);
        if result.is_valid() {
            output::success(&format!(
                "{} values from {} sources are valid",
                snapshot.len(),
                loaded
            ));
        }
    }

    if result.is_valid() {
        Ok(())
    } else {
        Err(ux_error::rejected(&result.errors).into())
    }
}

fn paths(global: &GlobalArgs) -> Result<()> {
    let locations = global.locations();
    let describe = |path: Option<&std::path::Path>| match path {
        Some(path) if path.exists() => path.display().to_string(),
        Some(path) => format!("{} (missing)", path.display()),
        None => "(none)".to_string(),
    };

    if global.json {
        return output::json(&serde_json::json!({
            "packaged_defaults": locations.packaged_defaults,
            "system": locations.system_file,
            "user": locations.user_file,
            "profiles_dir": locations.profiles_dir,
            "profile": locations.profile,
            "profile_file": locations.profile_file(),
        }));
    }

    output::header("Configuration Sources");
    println!();
    let packaged = match &locations.packaged_defaults {
        Some(path) => describe(Some(path.as_path())),
        None => "(compiled in)".to_string(),
    };
    output::field("packaged defaults", &packaged, None);
    output::field("system", &describe(locations.system_file.as_deref()), None);
    output::field("user", &describe(Some(locations.user_file.as_path())), None);
    output::field("profiles", &describe(locations.profiles_dir.as_deref()), None);
    if let Some(profile) = &locations.profile {
        let file = locations
            .profile_file()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not found".red().to_string());
        output::field("profile", profile, Some(&file));
    }
    println!();
    output::hint("Precedence: overrides > profile > user > system > packaged defaults");
    Ok(())
}
