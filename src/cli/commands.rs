//! CLI command definitions using clap.
//!
//! - config: print the effective configuration
//! - simulate: wait for a simulated queue to go idle

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Quiesce - wait for a paused task queue to go idle
#[derive(Parser, Debug)]
#[command(name = "quiesce")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the effective configuration as YAML
    Config,

    /// Post work on a simulated queue and wait for it to go idle
    Simulate(SimulateArgs),
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct SimulateArgs {
    /// Post a task this many milliseconds after start (repeatable)
    #[arg(long = "task-at", value_name = "MS")]
    pub task_at: Vec<u64>,

    /// Keep an idling resource busy for this many milliseconds
    #[arg(long, value_name = "MS")]
    pub busy_for: Option<u64>,

    /// Wait at least this many milliseconds before waiting for idle
    #[arg(long, value_name = "MS")]
    pub at_least: Option<u64>,

    /// Override the master idle timeout
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Sleep on the system clock instead of a manual one
    #[arg(long)]
    pub real_time: bool,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_requires_command() {
        assert!(Cli::try_parse_from(["quiesce"]).is_err());
    }

    #[test]
    fn test_cli_config_command() {
        let cli = Cli::try_parse_from(["quiesce", "-v", "config"]).unwrap();
        assert!(cli.is_verbose());
        assert!(matches!(cli.command, Commands::Config));
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["quiesce", "config", "-c", "/path/to/quiesce.yml"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/quiesce.yml")));
    }

    #[test]
    fn test_simulate_args() {
        let cli = Cli::try_parse_from([
            "quiesce",
            "simulate",
            "--task-at",
            "0",
            "--task-at",
            "40",
            "--busy-for",
            "120",
            "--timeout-ms",
            "500",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.task_at, vec![0, 40]);
                assert_eq!(args.busy_for, Some(120));
                assert_eq!(args.at_least, None);
                assert_eq!(args.timeout_ms, Some(500));
                assert!(!args.real_time);
                assert!(args.json);
            }
            other => panic!("Expected simulate command, got {:?}", other),
        }
    }

    #[test]
    fn test_cli_debug_assert() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
