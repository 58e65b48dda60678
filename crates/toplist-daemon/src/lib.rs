//! Toplist command-line library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (import, run, schedule, top, stats, history)

pub mod cli;
pub mod commands;

pub use cli::{Cli, Commands, RunCommands};
pub use commands::{
    handle_import, handle_run, init_logging, load_settings, show_config, show_history, show_stats,
    show_top, start_scheduler,
};
