//! CLI module - command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod config;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ailex::config::Config;

#[derive(Parser)]
#[command(name = "ailex")]
#[command(version)]
#[command(about = "Telegram assistant for AI and automation topics", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.ailex/config.json
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot (default)
    Run,
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the config file and the effective settings
    Check,
    /// Print the effective configuration with secrets masked
    Show,
}

/// Load the config from `path` or the default location, environment applied.
pub(crate) fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_path(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::load().with_context(|| "Failed to load config"),
    }
}

/// Entry point for the CLI, called from main().
pub async fn run() -> Result<()> {
    // Deployments configure the bot through the environment; a local .env
    // file is honoured the same way.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = load_config(config_path)?;
            ailex::utils::logging::init_logging(&config.logging)
                .with_context(|| "Failed to initialize logging")?;
            run::cmd_run(config).await?;
        }
        Commands::Config { action } => {
            config::cmd_config(action, config_path)?;
        }
        Commands::Version => {
            cmd_version();
        }
    }

    Ok(())
}

fn cmd_version() {
    println!("ailex {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Telegram assistant for AI and automation topics");
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
    fn test_default_command_is_none() {
        let cli = Cli::try_parse_from(["ailex"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_config_show_with_path() {
        let cli = Cli::try_parse_from(["ailex", "config", "show", "--config", "/tmp/a.json"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Show
            })
        ));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/a.json")));
    }

    #[test]
    fn test_load_config_from_tempfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"scheduler": {"interval_secs": 42}}"#).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.scheduler.interval_secs, 42);
    }
}
