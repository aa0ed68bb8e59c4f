use super::GlobalArgs;
use crate::output;
use crate::ux_error::UxError;
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use config::validation::folders::normalize_folder;
use config::{ConfigPath, Value};
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum FoldersCommand {
    #[command(about = "Add a folder to the index")]
    Add(AddArgs),

    #[command(about = "Stop indexing a folder")]
    Remove(RemoveArgs),

    #[command(about = "List indexed folders and the model each one uses")]
    List,
}

#[derive(Args)]
pub struct AddArgs {
    #[arg(help = "Folder to index; relative paths are resolved against the current directory")]
    pub path: PathBuf,

    #[arg(long, help = "Embedding model for this folder instead of the default")]
    pub model: Option<String>,
}

#[derive(Args)]
pub struct RemoveArgs {
    #[arg(help = "Folder to stop indexing")]
    pub path: PathBuf,
}

pub async fn run(cmd: FoldersCommand, global: &GlobalArgs) -> Result<()> {
    match cmd {
        FoldersCommand::Add(args) => add(args, global).await,
        FoldersCommand::Remove(args) => remove(args, global).await,
        FoldersCommand::List => list(global).await,
    }
}

fn folders_path() -> Result<ConfigPath> {
    Ok(ConfigPath::parse("folders")?)
}

fn absolute(path: &Path) -> Result<String> {
    let normalized = normalize_folder(&path.to_string_lossy());
    Ok(std::path::absolute(normalized)?.display().to_string())
}

async fn add(args: AddArgs, global: &GlobalArgs) -> Result<()> {
    let engine = global.engine().await?;
    let folder = absolute(&args.path)?;

    let mut item: Vec<(&str, Value)> = vec![("path", Value::from(folder.as_str()))];
    if let Some(model) = &args.model {
        item.push(("model", Value::from(model.as_str())));
    }
    let item: Value = item.into_iter().collect();

    let (index, warnings) = engine.gateway.push(&folders_path()?, item).await?;

    if global.json {
        return output::json(&serde_json::json!({
            "index": index,
            "path": folder,
            "model": args.model,
            "generation": engine.gateway.generation(),
            "warnings": warnings,
        }));
    }

    output::warnings(&warnings);
    output::success(&format!("Indexing {folder} as folders[{index}]"));
    Ok(())
}

async fn remove(args: RemoveArgs, global: &GlobalArgs) -> Result<()> {
    let engine = global.engine().await?;
    let wanted = normalize_folder(&absolute(&args.path)?);
    let settings = engine.gateway.settings()?;

    let Some(index) = settings
        .folders
        .iter()
        .position(|folder| normalize_folder(&folder.path) == wanted)
    else {
        return Err(UxError::new(format!("'{}' is not an indexed folder", wanted.display()))
            .suggest("foldersd folders list")
            .into());
    };

    let path = folders_path()?.child_index(index);
    let warnings = engine.gateway.unset(&path).await?;

    if global.json {
        return output::json(&serde_json::json!({
            "removed": wanted,
            "generation": engine.gateway.generation(),
            "warnings": warnings,
        }));
    }

    output::warnings(&warnings);
    output::success(&format!("Stopped indexing {}", wanted.display()));
    Ok(())
}

async fn list(global: &GlobalArgs) -> Result<()> {
    let engine = global.engine().await?;
    let default = engine.arbiter.initialize().await?;
    let settings = engine.gateway.settings()?;

    if global.json {
        let folders: Vec<_> = settings
            .folders
            .iter()
            .map(|folder| {
                serde_json::json!({
                    "path": folder.path,
                    "model": folder.model.as_deref().unwrap_or(&default.model_id),
                    "model_override": folder.model.is_some(),
                })
            })
            .collect();
        return output::json(&folders);
    }

    if settings.folders.is_empty() {
        println!("{}", "No folders are indexed.".dimmed());
        output::hint("foldersd folders add <path>");
        return Ok(());
    }

    output::header("Indexed Folders");
    println!();
    for folder in &settings.folders {
        match &folder.model {
            Some(model) => output::field(&folder.path, model, None),
            None => output::field(&folder.path, &default.model_id, Some("default")),
        }
    }
    Ok(())
}
