//! arx-config
//!
//! Manages the persisted arx configuration.

use anyhow::{Context, Result};
use arx_core::ArxConfig;
use clap::{ArgAction, CommandFactory, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "arx-config")]
#[command(version)]
#[command(about = "Manage arx configuration", long_about = None)]
struct Cli {
    /// Path to configuration file (default: auto-detect)
    #[arg(long)]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show current configuration
    Show,

    /// Set verbose mode
    Verbose {
        /// true/false, on/off or 1/0
        #[arg(value_parser = parse_switch, action = ArgAction::Set)]
        value: bool,
    },

    /// Show configuration file path
    Path,
}

fn parse_switch(value: &str) -> std::result::Result<bool, String> {
    match value.to_lowercase().as_str() {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        other => Err(format!("invalid value '{}', expected true/false, on/off or 1/0", other)),
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let path = cli
        .config_path
        .or_else(ArxConfig::find)
        .unwrap_or_else(ArxConfig::default_path);

    let load = || -> Result<ArxConfig> {
        if path.is_file() {
            ArxConfig::from_file(&path).with_context(|| format!("Failed to read {}", path.display()))
        } else {
            Ok(ArxConfig::default())
        }
    };

    match cli.command {
        Some(Commands::Show) => {
            let config = load()?;
            let key = config.classifier.api_key.is_some()
                || std::env::var_os(arx_core::config::API_KEY_ENV).is_some();

            println!("Configuration file: {}", path.display());
            println!("Verbose mode: {}", config.verbose);
            println!("Parallelism: {}", config.parallelism);
            println!(
                "Scratch root: {}",
                config
                    .scratch_root
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| arx_core::workspace::default_scratch_root().display().to_string())
            );
            if let Some(dir) = &config.rules_dir {
                println!("Rules directory: {}", dir.display());
            }
            println!(
                "Classifier: {} at {}",
                config.classifier.model, config.classifier.endpoint
            );
            println!("API key: {}", if key { "set" } else { "not set" });
        }
        Some(Commands::Verbose { value }) => {
            let mut config = load()?;
            config.verbose = value;
            config
                .save(&path)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Verbose mode {}", if value { "enabled" } else { "disabled" });
        }
        Some(Commands::Path) => println!("{}", path.display()),
        None => {
            Cli::command().print_help()?;
            return Ok(ExitCode::FAILURE);
        }
    }

    Ok(ExitCode::SUCCESS)
}
