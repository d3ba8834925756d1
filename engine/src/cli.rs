//! CLI interface for Cadence
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for driving the kernel.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cadence orchestration kernel
///
/// Submits objectives to the decision-cycle kernel, routes them to registered
/// capabilities, and drives each one through bounded OBSERVE→ORIENT→DECIDE→ACT
/// cycles with durable, resumable state.
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Submit an objective and drive it to a terminal state
    Run {
        /// The objective description
        description: String,

        /// Scheduling priority (higher first; informational for now)
        #[arg(short, long, default_value = "0")]
        priority: i64,
    },

    /// Resume an interrupted objective from its ledger snapshot
    Resume {
        /// Objective ID to resume
        objective_id: String,
    },

    /// Show recent objectives
    History {
        /// Number of objectives to show (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Replay the full memory record of one objective
    Replay {
        /// Objective ID to replay
        objective_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_parses() {
        let cli = Cli::try_parse_from(["cadence", "run", "fix failing test"]).unwrap();
        match cli.command {
            Command::Run {
                description,
                priority,
            } => {
                assert_eq!(description, "fix failing test");
                assert_eq!(priority, 0);
            }
            _ => panic!("expected run command"),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "cadence",
            "--json",
            "--config",
            "/tmp/alt.toml",
            "history",
            "--limit",
            "3",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/alt.toml")));
        match cli.command {
            Command::History { limit } => assert_eq!(limit, 3),
            _ => panic!("expected history command"),
        }
    }
}
