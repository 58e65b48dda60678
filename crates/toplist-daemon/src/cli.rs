//! CLI argument parsing for the toplist binary.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Toplist
///
/// Rolls per-user and per-subject tag lists into ranked tag collections.
#[derive(Parser, Debug)]
#[command(name = "toplist")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/toplist/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load documents from a JSON array or JSON-lines file into a collection
    Import {
        /// Target collection (e.g. "user", "book")
        #[arg(long)]
        collection: String,

        /// File to read
        file: String,
    },

    /// Run rollups now
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },

    /// Run the cron scheduler in the foreground until Ctrl+C
    Schedule,

    /// Show the highest counts recorded for a tag
    Top {
        /// Namespace (book, music, movie)
        #[arg(long)]
        namespace: String,

        /// Query the users rollup of this status instead of the subjects rollup
        #[arg(long)]
        status: Option<String>,

        /// Tag name
        #[arg(long)]
        tag: String,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },

    /// Show database statistics
    Stats,

    /// Show the latest run of every rollup
    History,

    /// Print the effective configuration as TOML
    ShowConfig,
}

/// Run subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum RunCommands {
    /// Users' top tags into top_<namespace>_<status>_user_by_tag
    Users {
        #[arg(long)]
        namespace: String,

        #[arg(long)]
        status: String,
    },

    /// Subjects' tags into top_<namespace>_by_tag
    Subjects {
        #[arg(long)]
        namespace: String,
    },

    /// Every target configured under [schedule]
    All,
}
