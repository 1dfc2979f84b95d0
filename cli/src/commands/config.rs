// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use genesis_core::domain::config::{GenesisConfig, GenomeBackend};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,

        /// Print the effective configuration as YAML
        #[arg(long)]
        yaml: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./genesis-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths, yaml } => show(config_override, paths, yaml),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, force } => generate(&output, force),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool, as_yaml: bool) -> Result<()> {
    let config = GenesisConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  --config flag: {}", path.display()),
            None => println!("  --config flag: {}", "(not set)".dimmed()),
        }
        for (i, path) in GenesisConfig::discovery_paths().iter().enumerate() {
            let marker = if path.exists() { "found".green() } else { "missing".dimmed() };
            println!("  {}. {} ({})", i + 1, path.display(), marker);
        }
        println!();
    }

    if as_yaml {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!();

    let orchestrator = &config.spec.orchestrator;
    println!("{}", "Orchestrator:".bold());
    println!("  Max concurrent: {}", orchestrator.max_concurrent);
    println!("  Max blocking: {}", orchestrator.max_blocking);
    match orchestrator.default_timeout {
        Some(timeout) => println!("  Default timeout: {:?}", timeout),
        None => println!("  Default timeout: {}", "(none)".dimmed()),
    }
    println!();

    println!("{}", "Message Bus:".bold());
    println!("  Request timeout: {:?}", config.spec.message_bus.request_timeout);
    println!();

    let memory = &config.spec.genetic_memory;
    println!("{}", "Genetic Memory:".bold());
    match memory.backend {
        GenomeBackend::InMemory => println!("  Backend: in-memory"),
        GenomeBackend::Sled => println!(
            "  Backend: sled ({})",
            memory
                .path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "no path".to_string())
        ),
    }
    println!("  History limit: {}", memory.history_limit);
    println!();

    println!("{}", "Observability:".bold());
    println!("  Log level: {}", config.spec.observability.log_level);
    println!("  Log format: {:?}", config.spec.observability.log_format);

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = GenesisConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    GenesisConfig::default()
        .to_yaml_file(output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
