use super::GlobalArgs;
use crate::logging::LogControl;
use crate::output;
use anyhow::Result;
use clap::Args;
use config::path::PathFilter;
use config::ConfigPath;
use tracing::{info, warn};

#[derive(Args)]
pub struct ServeArgs {
    #[arg(long, help = "Do not watch configuration files for changes")]
    pub no_watch: bool,
}

pub async fn run(args: ServeArgs, global: &GlobalArgs, log: &LogControl) -> Result<()> {
    let engine = global.engine().await?;
    let settings = engine.gateway.settings()?;
    log.apply_level(&settings.logging.level);

    let selection = engine.arbiter.initialize().await?;
    let follow = engine.arbiter.spawn_follow()?;
    let watcher = if args.no_watch {
        None
    } else {
        Some(engine.start_watcher()?)
    };

    output::info(&format!(
        "foldersd ready: {} folders, model {}, generation {}",
        settings.folders.len(),
        selection.model_id,
        engine.gateway.generation()
    ));

    let log_level = ConfigPath::parse("logging.level")?;
    let mut changes = engine.registry.subscribe(PathFilter::All);
    let mut default_model = engine.registry.watch_default_model();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
            event = changes.recv() => {
                let Some(event) = event else { break };
                info!(
                    "Configuration generation {} ({:?}): {} paths changed",
                    event.generation,
                    event.trigger,
                    event.changed_paths.len()
                );
                if event.changed_paths.contains(&log_level) {
                    match engine.gateway.settings() {
                        Ok(settings) => log.apply_level(&settings.logging.level),
                        Err(e) => warn!("Keeping current log level: {}", e),
                    }
                }
            }
            Ok(()) = default_model.changed() => {
                if let Some(selection) = default_model.borrow_and_update().clone() {
                    info!(
                        "Default model is now {} ({}): {}",
                        selection.model_id, selection.source, selection.reason
                    );
                }
            }
        }
    }

    if let Some(watcher) = watcher {
        watcher.stop().await;
    }
    follow.abort();
    Ok(())
}
