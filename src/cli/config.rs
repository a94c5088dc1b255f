//! Config check and show command handlers.

use std::path::Path;

use anyhow::{Context, Result};

use ailex::config::validate::{validate_config, Diagnostic, DiagnosticLevel};
use ailex::config::Config;

use super::ConfigAction;

/// Handle `ailex config <action>`.
pub(crate) fn cmd_config(action: ConfigAction, path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check => cmd_check(path),
        ConfigAction::Show => cmd_show(path),
    }
}

fn cmd_check(path: Option<&Path>) -> Result<()> {
    let config_path = path.map(Path::to_path_buf).unwrap_or_else(Config::path);
    println!("Config file: {}", config_path.display());

    let mut diagnostics: Vec<Diagnostic> = Vec::new();
    if config_path.exists() {
        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(raw) => diagnostics.extend(validate_config(&raw)),
            Err(e) => {
                println!("[ERROR] Invalid JSON: {}", e);
                return Ok(());
            }
        }
    } else {
        println!("[OK] No config file found (using defaults)");
    }

    let config = super::load_config(Some(&config_path))?;
    diagnostics.extend(config.validate());

    for diag in &diagnostics {
        println!("{}", diag);
    }

    let errors = diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Error)
        .count();
    let warnings = diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Warn)
        .count();

    if errors == 0 && warnings == 0 {
        println!("\nConfiguration looks good!");
    } else {
        println!("\nFound {} error(s), {} warning(s)", errors, warnings);
    }
    Ok(())
}

fn cmd_show(path: Option<&Path>) -> Result<()> {
    let config = super::load_config(path)?;
    let json = serde_json::to_string_pretty(&config.masked())
        .context("Failed to serialize config")?;
    println!("{}", json);
    Ok(())
}
