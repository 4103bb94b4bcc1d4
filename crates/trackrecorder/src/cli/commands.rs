//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Run command arguments.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Use a simulated receiver instead of connecting to gpsd
    #[arg(long)]
    pub simulate: bool,

    /// Skip priming live totals from today's existing log
    #[arg(long)]
    pub no_prime: bool,
}

/// Report command arguments.
#[derive(Debug, Args)]
pub struct ReportCommand {
    /// Include per-session breakdown for each day
    #[arg(short, long)]
    pub sessions: bool,
}

/// Sessions command arguments.
#[derive(Debug, Args)]
pub struct SessionsCommand {
    /// The log file to reconstruct sessions from
    pub file: PathBuf,

    /// Drop jitter points from each session's retained track
    #[arg(short, long)]
    pub filter_noise: bool,

    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
