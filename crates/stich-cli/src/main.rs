use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stich_core::config::MessageDelivery;
use stich_infrastructure::{ConfigService, StichPaths, logging};

mod commands;

#[derive(Parser)]
#[command(name = "stich")]
#[command(about = "Stich CLI - realtime scaffold generation", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.config/stich/config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted generation and follow it until it finishes
    Generate {
        /// Owner of the new session
        #[arg(long)]
        user: String,

        /// Shorten every scripted delay
        #[arg(long)]
        fast: bool,

        /// Message delivery policy (latest | every)
        #[arg(long)]
        delivery: Option<MessageDelivery>,

        /// Print each state change as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_service = match &cli.config {
        Some(path) => ConfigService::with_path(path),
        None => ConfigService::new()?,
    };
    let config = config_service
        .get_config()
        .with_context(|| format!("Failed to load {}", config_service.path().display()))?;

    let _guard = logging::init_tracing(&config.logging, &StichPaths::default())?;

    match cli.command {
        Commands::Generate {
            user,
            fast,
            delivery,
            json,
        } => {
            let options = commands::generate::GenerateOptions {
                user,
                fast,
                delivery,
                json,
            };
            commands::generate::run(config.generation, options).await?;
        }
    }

    Ok(())
}
