//! arx
//!
//! A wrapper around yay that analyzes AUR packages for malicious intent
//! before they are built.
//!
//! Usage:
//!   arx -S package1 package2
//!
//! Every other yay invocation is passed through unchanged.

mod args;
mod output;
mod prompt;

use anyhow::{Context, Result};
use arx_core::{Analyzer, ArxConfig, YayHelper};
use colored::Colorize;
use std::env;
use std::path::Path;
use std::process::{Command, ExitCode, Stdio};
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging() {
    let debug = env::var_os("ARX_DEBUG").map(|v| !v.is_empty()).unwrap_or(false);
    let filter = if debug {
        "arx=debug,arx_core=debug"
    } else {
        "arx=warn,arx_core=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .without_time()
        .init();
}

async fn run() -> Result<ExitCode> {
    let yay_args: Vec<String> = env::args().skip(1).collect();

    if args::wants_help(&yay_args) {
        print_usage();
        return Ok(ExitCode::SUCCESS);
    }

    init_logging();

    let config = ArxConfig::load()
        .context("Failed to load configuration")?
        .with_env_overrides();
    let yay = YayHelper::locate()?;

    let packages = args::packages_to_install(&yay_args);
    if packages.is_empty() {
        return run_helper(yay.path(), &yay_args);
    }

    println!("{} {}", "Packages to install:".cyan().bold(), packages.join(", "));

    let mut found = Vec::new();
    let mut not_found = Vec::new();
    for package in &packages {
        match yay.package_exists(package).await {
            Ok(true) => found.push(package.clone()),
            Ok(false) => not_found.push(package.clone()),
            Err(e) => {
                // let the analysis decide; a failed fetch is reported as incomplete
                warn!("Could not check whether {} exists: {}", package, e);
                found.push(package.clone());
            }
        }
    }

    if !not_found.is_empty() {
        output::print_not_found(&not_found);
        if found.is_empty() {
            println!("No valid packages to install. Exiting.");
            return Ok(ExitCode::FAILURE);
        }
    }

    if config.classifier.api_key.is_none() {
        println!(
            "{}",
            "OPENAI_API_KEY is not set; semantic analysis is disabled and scores are capped."
                .yellow()
        );
    }

    println!("{}", format!("Analyzing {} package(s)...", found.len()).dimmed());
    let analyzer = Analyzer::new(&config, Arc::new(yay.clone()))
        .context("Failed to set up the analyzer")?;
    let session = analyzer
        .analyze_session(&found)
        .await
        .context("Package analysis failed")?;

    for assessment in &session.assessments {
        output::print_assessment(assessment, config.verbose);
    }
    output::print_session(&session, packages.len());

    if !prompt::confirm("Do you want to continue with the installation?")? {
        println!("{}", "Installation cancelled by user.".yellow());
        return Ok(ExitCode::FAILURE);
    }

    let install_args = args::without_packages(&yay_args, &not_found);
    println!();
    println!("{}", "Proceeding with installation...".green());
    println!();

    run_helper(yay.path(), &install_args)
}

fn run_helper(helper: &Path, args: &[String]) -> Result<ExitCode> {
    let status = Command::new(helper)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("Failed to run {}", helper.display()))?;

    Ok(if status.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(status.code().unwrap_or(1) as u8)
    })
}

fn print_usage() {
    println!("arx - A secure wrapper around yay package manager");
    println!("Analyzes packages for malicious intent before installation");
    println!();
    println!("Usage: arx [yay-arguments]");
    println!();
    println!("Examples:");
    println!("  arx -S firefox");
    println!("  arx -Syu");
    println!("  arx -Ss package-name");
    println!("  arx -R package-name");
    println!();
    println!("Environment:");
    println!("  OPENAI_API_KEY   API key for semantic analysis");
    println!("  ARX_TEMP_DIR     Directory for temporary package workspaces");
    println!("  ARX_DEBUG        Enable debug logging");
    println!();
    println!("All yay arguments are supported. See 'yay --help' for more options.");
    println!("Settings are managed with 'arx-config'.");
}
