use super::GlobalArgs;
use crate::output;
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use config::model::ModelSelection;

#[derive(Subcommand)]
pub enum ModelCommand {
    #[command(about = "Show the effective default model and why it was chosen")]
    Show,

    #[command(about = "Select the default model and persist the choice")]
    Set(SetArgs),

    #[command(about = "Recommend a model for this machine without changing anything")]
    Recommend(RecommendArgs),

    #[command(about = "List the curated model catalog")]
    List,
}

#[derive(Args)]
pub struct SetArgs {
    #[arg(help = "Catalog model id")]
    pub model_id: String,

    #[arg(long = "lang", value_name = "CODE", help = "Languages the content is written in (repeatable)")]
    pub languages: Vec<String>,
}

#[derive(Args)]
pub struct RecommendArgs {
    #[arg(long = "lang", value_name = "CODE", help = "Only models covering these languages (repeatable)")]
    pub languages: Vec<String>,
}

pub async fn run(cmd: ModelCommand, global: &GlobalArgs) -> Result<()> {
    match cmd {
        ModelCommand::Show => show(global).await,
        ModelCommand::Set(args) => set(args, global).await,
        ModelCommand::Recommend(args) => recommend(args, global).await,
        ModelCommand::List => list(global).await,
    }
}

fn languages(raw: Vec<String>) -> Option<Vec<String>> {
    (!raw.is_empty()).then_some(raw)
}

fn print_selection(selection: &ModelSelection) {
    output::field("model", &selection.model_id, Some(&selection.source.to_string()));
    output::field("reason", &selection.reason, None);
    output::field("selected at", &selection.selected_at.to_rfc3339(), None);
    if let Some(languages) = &selection.languages {
        output::field("languages", &languages.join(", "), None);
    }
}

async fn show(global: &GlobalArgs) -> Result<()> {
    let engine = global.engine().await?;
    let selection = engine.arbiter.initialize().await?;

    if global.json {
        return output::json(&serde_json::json!({
            "state": engine.arbiter.state(),
            "selection": selection,
        }));
    }

    output::header("Default Embedding Model");
    println!();
    print_selection(&selection);
    Ok(())
}

async fn set(args: SetArgs, global: &GlobalArgs) -> Result<()> {
    let engine = global.engine().await?;
    let (selection, warnings) = engine
        .arbiter
        .set_default_model(&args.model_id, languages(args.languages))
        .await?;

    if global.json {
        return output::json(&serde_json::json!({
            "selection": selection,
            "warnings": warnings,
        }));
    }

    output::warnings(&warnings);
    output::success(&format!("Default model set to {}", selection.model_id));
    Ok(())
}

async fn recommend(args: RecommendArgs, global: &GlobalArgs) -> Result<()> {
    let engine = global.engine().await?;
    let languages = languages(args.languages);
    let recommendation = engine
        .arbiter
        .get_recommended_model(languages.as_deref())
        .await?;

    if global.json {
        return output::json(&recommendation);
    }

    output::header("Recommended Model");
    println!();
    print_selection(&recommendation);
    if engine.arbiter.state() == config::model::ArbiterState::UserSelected {
        println!();
        output::hint("A user selection is in effect; run `foldersd model set` to change it");
    }
    Ok(())
}

async fn list(global: &GlobalArgs) -> Result<()> {
    let engine = global.engine().await?;
    let catalog = &engine.catalog;
    let current = engine.arbiter.get_default_model().map(|s| s.model_id);

    if global.json {
        return output::json(&**catalog);
    }

    output::header(&format!("Model Catalog (v{})", catalog.version));
    println!();
    for model in catalog.models() {
        let marker = if current.as_deref() == Some(model.id.as_str()) {
            "*".green().bold().to_string()
        } else {
            " ".to_string()
        };
        let gpu = if model.requires_gpu { ", GPU" } else { "" };
        println!(
            "{} {:<24} {:>6} MB  min {:>6} MB RAM{}  {}",
            marker,
            model.id.cyan(),
            model.size_mb,
            model.min_memory_mb,
            gpu,
            model.languages.join(",").dimmed()
        );
    }
    Ok(())
}
