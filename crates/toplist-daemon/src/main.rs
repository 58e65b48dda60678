//! Toplist
//!
//! Rolls user and subject tag lists into ranked tag collections.
//!
//! # Usage
//!
//! ```bash
//! toplist import --collection user users.jsonl
//! toplist run users --namespace book --status all
//! toplist run all
//! toplist schedule
//! toplist top --namespace book --tag fiction
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/toplist/config.toml)
//! 3. Environment variables (TOPLIST_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use toplist_daemon::{
    handle_import, handle_run, init_logging, load_settings, show_config, show_history, show_stats,
    show_top, start_scheduler, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(
        cli.config.as_deref(),
        cli.db_path.as_deref(),
        cli.log_level.as_deref(),
    )?;
    init_logging(&settings)?;

    match cli.command {
        Commands::Import { collection, file } => {
            handle_import(&settings, &collection, &file)?;
        }
        Commands::Run { command } => {
            handle_run(&settings, command).await?;
        }
        Commands::Schedule => {
            start_scheduler(&settings).await?;
        }
        Commands::Top {
            namespace,
            status,
            tag,
            limit,
        } => {
            show_top(&settings, &namespace, status.as_deref(), &tag, limit)?;
        }
        Commands::Stats => {
            show_stats(&settings)?;
        }
        Commands::History => {
            show_history(&settings)?;
        }
        Commands::ShowConfig => {
            show_config(&settings)?;
        }
    }

    Ok(())
}
