//! CLI command definitions and handlers

pub mod config;
pub mod progress;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// perfdash - keep KPI and OKR progress in step with completed work
///
/// Every command runs against the configured store. Use `--store` to point
/// at a different directory for one invocation.
#[derive(Parser, Debug)]
#[command(name = "perfdash")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log level (overrides logging.level; RUST_LOG wins over both)
    #[arg(long, global = true, value_parser = ["trace", "debug", "info", "warn", "error"])]
    pub log_level: Option<String>,

    /// Store directory (file backend)
    #[arg(long, global = true, env = "PERFDASH_STORE")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Filter to start logging with, before any config is read
    pub fn initial_log_filter(&self, rust_log: Option<&str>) -> String {
        rust_log
            .or(self.log_level.as_deref())
            .unwrap_or("info")
            .to_string()
    }

    /// Filter to switch to once the config is loaded, or `None` when
    /// `RUST_LOG` or `--log-level` already decided it
    pub fn configured_log_filter(&self, rust_log: Option<&str>, configured: &str) -> Option<String> {
        if rust_log.is_some() || self.log_level.is_some() {
            return None;
        }
        Some(configured.to_string())
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Mark a stored work entry completed and propagate it
    Complete(CompleteArgs),

    /// Record a completed work entry and propagate it
    Log(LogArgs),

    /// Recompute every objective and KPI from their key results
    Recalc,

    /// Show dashboard status counts
    Status(StatusArgs),

    /// Load collections from a JSON file
    Import(ImportArgs),

    /// Move legacy suggested tasks into the task collection
    MigrateTasks,

    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Args, Debug)]
pub struct CompleteArgs {
    /// Work entry id
    pub id: String,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Title of the work entry
    #[arg(long, default_value = "Logged work")]
    pub title: String,

    /// Time spent, in minutes
    #[arg(long, conflicts_with = "duration")]
    pub minutes: Option<u32>,

    /// Time spent as free text, e.g. "1h 30m"
    #[arg(long)]
    pub duration: Option<String>,

    /// Task the work belongs to
    #[arg(long)]
    pub task: Option<String>,

    /// Key result to advance when the task names none
    #[arg(long)]
    pub key_result: Option<String>,

    /// Objective owning the key result
    #[arg(long)]
    pub objective: Option<String>,

    /// Project to recompute
    #[arg(long)]
    pub project: Option<String>,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// JSON object keyed by collection name
    pub file: PathBuf,

    /// Run a full recalculation afterwards
    #[arg(long)]
    pub recalc: bool,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default global config file
    Init,

    /// Show the merged configuration
    Show,

    /// Set a value in the global config file
    Set {
        /// Dotted key, e.g. propagation.write_mode
        key: String,
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_log() {
        let cli = Cli::parse_from([
            "perfdash",
            "--store",
            "/tmp/pd",
            "log",
            "--duration",
            "1h 30m",
            "--task",
            "t-1",
        ]);
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/pd")));
        let Command::Log(args) = cli.command else {
            panic!("expected log command");
        };
        assert_eq!(args.duration.as_deref(), Some("1h 30m"));
        assert_eq!(args.task.as_deref(), Some("t-1"));
        assert_eq!(args.minutes, None);
    }

    #[test]
    fn test_minutes_and_duration_conflict() {
        let result = Cli::try_parse_from([
            "perfdash", "log", "--minutes", "30", "--duration", "1h",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_log_filter_precedence() {
        let plain = Cli::parse_from(["perfdash", "recalc"]);
        assert_eq!(plain.initial_log_filter(None), "info");
        assert_eq!(plain.configured_log_filter(None, "debug"), Some("debug".to_string()));
        assert_eq!(plain.initial_log_filter(Some("perfdash=trace")), "perfdash=trace");
        assert_eq!(plain.configured_log_filter(Some("perfdash=trace"), "debug"), None);

        let flagged = Cli::parse_from(["perfdash", "--log-level", "warn", "recalc"]);
        assert_eq!(flagged.initial_log_filter(None), "warn");
        assert_eq!(flagged.configured_log_filter(None, "debug"), None);
    }

    #[test]
    fn test_parse_config_set() {
        let cli = Cli::parse_from(["perfdash", "config", "set", "logging.level", "debug"]);
        match cli.command {
            Command::Config(ConfigArgs {
                action: ConfigAction::Set { key, value },
            }) => {
                assert_eq!(key, "logging.level");
                assert_eq!(value, "debug");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
