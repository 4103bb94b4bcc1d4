//! Command-line interface for trackrecorder.
//!
//! This module provides the CLI structure and command handlers for the
//! `trakrec` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, ReportCommand, RunCommand, SessionsCommand, StatusCommand};

/// trakrec - Record your GPS tracks
///
/// Connects to a gpsd instance, maintains a running session summary of
/// distance, time, and altitude, and appends every fix to a per-day log
/// that can be replayed later.
#[derive(Debug, Parser)]
#[command(name = "trakrec")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Record fixes until interrupted
    Run(RunCommand),

    /// Summarize every per-day log in the log directory
    Report(ReportCommand),

    /// Reconstruct the sessions recorded in one log file
    Sessions(SessionsCommand),

    /// Show today's recorded totals
    Status(StatusCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        if self.quiet {
            crate::logging::Verbosity::Quiet
        } else {
            match self.verbose {
                0 => crate::logging::Verbosity::Normal,
                1 => crate::logging::Verbosity::Verbose,
                _ => crate::logging::Verbosity::Trace,
            }
        }
    }
}
