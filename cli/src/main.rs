// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # GENESIS CLI
//!
//! The `genesis` binary drives the orchestrator, message bus and genetic
//! memory from the command line.
//!
//! ## Commands
//!
//! - `genesis config show|validate|generate` - Configuration management
//! - `genesis genome store|show|lineage|history|fittest|metrics|replicate|delete` - Genetic memory
//! - `genesis demo` - Run a small in-process agent swarm end to end

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use genesis_core::domain::config::{GenesisConfig, LogFormat};
use genesis_orchestrator::commands::{self, ConfigCommand, DemoArgs, GenomeCommand};
use genesis_orchestrator::logging::init_logging;

/// GENESIS - Orchestrate, connect and evolve agents
#[derive(Parser)]
#[command(name = "genesis")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "GENESIS_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Defaults to the config value.
    #[arg(long, global = true, env = "GENESIS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Inspect and edit the genome store
    #[command(name = "genome")]
    Genome {
        #[command(subcommand)]
        command: GenomeCommand,
    },

    /// Run a demo swarm through the orchestrator and message bus
    #[command(name = "demo")]
    Demo(DemoArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Config errors surface from the command itself, after logging is up
    let loaded = GenesisConfig::load_or_default(cli.config.clone());
    let observability = loaded
        .as_ref()
        .map(|config| config.spec.observability.clone())
        .unwrap_or_default();
    let level = cli.log_level.as_deref().unwrap_or(&observability.log_level);
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        observability.log_format
    };
    init_logging(level, format)?;

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Genome { command }) => {
            commands::genome::handle_command(command, loaded?).await
        }
        Some(Commands::Demo(args)) => commands::demo::run(args, loaded?).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}
