use anyhow::Result;
use clap::Parser;

mod commands;
mod logging;
mod output;
pub mod ux_error;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let log = logging::init();
    let cli = Cli::parse();
    let global = cli.global;

    let result = match cli.command {
        Commands::Serve(args) => commands::serve::run(args, &global, &log).await,
        Commands::Config(cmd) => commands::config::run(cmd, &global).await,
        Commands::Folders(cmd) => commands::folders::run(cmd, &global).await,
        Commands::Model(cmd) => commands::model::run(cmd, &global).await,
    };

    if let Err(err) = result {
        match ux_error::explain(&err) {
            Some(ux) => ux.display(),
            None => output::error(&format!("{err:#}")),
        }
        std::process::exit(1);
    }
    Ok(())
}
