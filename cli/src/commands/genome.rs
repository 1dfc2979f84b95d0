// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Genetic memory commands
//!
//! Commands: store, show, lineage, history, fittest, metrics, replicate, delete

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use genesis_core::domain::config::{GenesisConfig, GeneticMemoryConfig, GenomeBackend};
use genesis_cortex::{EvolutionEvent, FitnessMetrics, Genome, GenomeSpec, GenomeStore, Mutation, SledGenomeRepository};

#[derive(Subcommand)]
pub enum GenomeCommand {
    /// Store a new version of an agent
    Store {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,

        /// Agent source text
        #[arg(long, conflicts_with = "code_file")]
        code: Option<String>,

        /// Read agent source text from a file
        #[arg(long, value_name = "FILE")]
        code_file: Option<PathBuf>,

        /// Agent spec as a JSON object
        #[arg(long, value_name = "JSON")]
        spec: Option<String>,

        /// Parent agent id
        #[arg(long)]
        parent: Option<String>,
    },

    /// Show the latest or a specific version
    Show {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,

        #[arg(long)]
        version: Option<u32>,

        /// Show every stored version
        #[arg(long, conflicts_with = "version")]
        all: bool,
    },

    /// Show the ancestry of an agent, oldest first
    Lineage {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,
    },

    /// Show evolution events, newest first
    History {
        /// Only events for this agent
        #[arg(long)]
        agent: Option<String>,

        /// Number of events (default: genetic_memory.history_limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Rank agents by a fitness metric
    Fittest {
        #[arg(value_name = "METRIC")]
        metric: String,

        #[arg(short, long, default_value_t = 5)]
        limit: usize,
    },

    /// Merge metrics into the latest version (NAME=VALUE ...)
    Metrics {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,

        #[arg(value_name = "NAME=VALUE", required = true, value_parser = parse_metric)]
        metrics: Vec<(String, f64)>,
    },

    /// Copy an agent into a new one, optionally mutating spec keys
    Replicate {
        #[arg(value_name = "SOURCE_ID")]
        source_id: String,

        #[arg(value_name = "NEW_ID")]
        new_id: String,

        /// Overwrite an existing spec key: KEY=JSON
        #[arg(long = "mutate", value_name = "KEY=JSON", value_parser = parse_mutation)]
        mutations: Vec<Mutation>,
    },

    /// Delete an agent's latest pointer, and its versions unless kept
    Delete {
        #[arg(value_name = "AGENT_ID")]
        agent_id: String,

        #[arg(long)]
        keep_versions: bool,
    },
}

/// Build a genome store for the configured backend
pub fn open_store(config: &GeneticMemoryConfig) -> Result<GenomeStore> {
    let store = match config.backend {
        GenomeBackend::InMemory => GenomeStore::in_memory(),
        GenomeBackend::Sled => {
            let path = config
                .path
                .as_ref()
                .context("genetic_memory.path is required for the sled backend")?;
            let repo = SledGenomeRepository::open(path)
                .with_context(|| format!("Failed to open genome database at {:?}", path))?;
            GenomeStore::new(Arc::new(repo))
        }
    };
    Ok(store.with_history_limit(config.history_limit))
}

pub async fn handle_command(command: GenomeCommand, config: GenesisConfig) -> Result<()> {
    let memory = &config.spec.genetic_memory;
    if memory.backend == GenomeBackend::InMemory {
        println!(
            "{}",
            "⚠ genetic_memory.backend is in-memory; changes are discarded on exit".yellow()
        );
    }
    let store = open_store(memory)?;

    match command {
        GenomeCommand::Store {
            agent_id,
            code,
            code_file,
            spec,
            parent,
        } => {
            let code = match (code, code_file) {
                (Some(code), _) => code,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {:?}", path))?,
                (None, None) => anyhow::bail!("one of --code or --code-file is required"),
            };
            let spec = spec.as_deref().map(parse_spec).transpose()?.unwrap_or_default();
            let genome = store.store_genome(&agent_id, code, spec, parent).await?;
            println!(
                "{}",
                format!("✓ Stored {} v{}", genome.agent_id, genome.version).green()
            );
        }
        GenomeCommand::Show {
            agent_id,
            version,
            all,
        } => {
            if all {
                let versions = store.get_all_versions(&agent_id).await?;
                if versions.is_empty() {
                    println!("{}", format!("No versions stored for {}", agent_id).yellow());
                }
                println!("{}", serde_json::to_string_pretty(&versions)?);
            } else {
                match store.get_genome(&agent_id, version).await? {
                    Some(genome) => println!("{}", serde_json::to_string_pretty(&genome)?),
                    None => println!("{}", format!("Genome not found: {}", agent_id).yellow()),
                }
            }
        }
        GenomeCommand::Lineage { agent_id } => {
            let lineage = store.get_lineage(&agent_id).await?;
            if lineage.is_empty() {
                println!("{}", format!("Genome not found: {}", agent_id).yellow());
            }
            for (depth, genome) in lineage.iter().enumerate() {
                println!("{}{}", "  ".repeat(depth), describe(genome));
            }
        }
        GenomeCommand::History { agent, limit } => {
            let events = store.get_evolution_history(agent.as_deref(), limit).await?;
            for event in &events {
                print_event(event);
            }
            if events.is_empty() {
                println!("{}", "No evolution events".dimmed());
            }
        }
        GenomeCommand::Fittest { metric, limit } => {
            let ranked = store.find_fittest(&metric, limit).await?;
            if ranked.is_empty() {
                println!("{}", format!("No agents report '{}'", metric).yellow());
            }
            for (rank, genome) in ranked.iter().enumerate() {
                let score = genome.metric(&metric).unwrap_or_default();
                println!("{:>3}. {:<8.4} {}", rank + 1, score, describe(genome));
            }
        }
        GenomeCommand::Metrics { agent_id, metrics } => {
            let metrics: FitnessMetrics = metrics.into_iter().collect();
            let genome = store.update_metrics(&agent_id, metrics).await?;
            println!(
                "{}",
                format!("✓ Updated metrics of {} v{}", genome.agent_id, genome.version).green()
            );
            println!("{}", serde_json::to_string_pretty(&genome.metrics)?);
        }
        GenomeCommand::Replicate {
            source_id,
            new_id,
            mutations,
        } => {
            let genome = store.replicate_genome(&source_id, &new_id, &mutations).await?;
            println!(
                "{}",
                format!("✓ Replicated {} into {} v{}", source_id, genome.agent_id, genome.version).green()
            );
        }
        GenomeCommand::Delete {
            agent_id,
            keep_versions,
        } => {
            if store.delete_genome(&agent_id, keep_versions).await? {
                println!("{}", format!("✓ Deleted {}", agent_id).green());
            } else {
                println!("{}", format!("Nothing stored for {}", agent_id).yellow());
            }
        }
    }

    Ok(())
}

fn describe(genome: &Genome) -> String {
    match &genome.parent_id {
        Some(parent) => format!("{} v{} (parent: {})", genome.agent_id.bold(), genome.version, parent),
        None => format!("{} v{}", genome.agent_id.bold(), genome.version),
    }
}

fn print_event(event: &EvolutionEvent) {
    println!(
        "{} {:<10} {} {}",
        event.timestamp.format("%Y-%m-%d %H:%M:%S"),
        event.event_type.to_string().cyan(),
        event.agent_id,
        Value::Object(event.details.clone()).to_string().dimmed()
    );
}

fn parse_spec(raw: &str) -> Result<GenomeSpec> {
    match serde_json::from_str::<Value>(raw).context("--spec is not valid JSON")? {
        Value::Object(spec) => Ok(spec),
        other => anyhow::bail!("--spec must be a JSON object, got {}", other),
    }
}

fn parse_metric(raw: &str) -> std::result::Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", raw))?;
    let value = value
        .parse::<f64>()
        .map_err(|e| format!("invalid value for '{}': {}", name, e))?;
    if !value.is_finite() {
        return Err(format!("value for '{}' must be a finite number, got {}", name, value));
    }
    Ok((name.to_string(), value))
}

fn parse_mutation(raw: &str) -> std::result::Result<Mutation, String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=JSON, got '{}'", raw))?;
    // Bare words are taken as strings
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok(Mutation::new(key, key, value).with_reason("cli"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_metric() {
        assert_eq!(parse_metric("score=0.75").unwrap(), ("score".to_string(), 0.75));
        assert!(parse_metric("score").is_err());
        assert!(parse_metric("score=high").is_err());
    }

    #[test]
    fn test_parse_metric_rejects_non_finite() {
        for raw in ["score=nan", "score=NaN", "score=inf", "score=-infinity"] {
            let err = parse_metric(raw).unwrap_err();
            assert!(err.contains("finite"), "{}: {}", raw, err);
        }
        assert_eq!(parse_metric("score=-1e3").unwrap().1, -1000.0);
    }

    #[test]
    fn test_parse_mutation_accepts_json_and_bare_words() {
        let m = parse_mutation("temperature=0.9").unwrap();
        assert_eq!(m.target, "temperature");
        assert_eq!(m.new_value, json!(0.9));

        let m = parse_mutation("model=gpt-large").unwrap();
        assert_eq!(m.new_value, json!("gpt-large"));
    }

    #[test]
    fn test_parse_spec_requires_object() {
        assert_eq!(parse_spec(r#"{"name":"a"}"#).unwrap()["name"], json!("a"));
        assert!(parse_spec("[1,2]").is_err());
    }

    #[tokio::test]
    async fn test_sled_store_persists_between_opens() {
        let dir = tempfile::tempdir().unwrap();
        let config = GeneticMemoryConfig {
            backend: GenomeBackend::Sled,
            path: Some(dir.path().join("genomes")),
            history_limit: 10,
        };

        {
            let store = open_store(&config).unwrap();
            store
                .store_genome("writer", "v1", GenomeSpec::new(), None)
                .await
                .unwrap();
        }

        let store = open_store(&config).unwrap();
        let genome = store.get_genome("writer", None).await.unwrap().unwrap();
        assert_eq!(genome.version, 1);
    }

    #[test]
    fn test_sled_without_path_is_rejected() {
        let config = GeneticMemoryConfig {
            backend: GenomeBackend::Sled,
            path: None,
            history_limit: 10,
        };
        assert!(open_store(&config).is_err());
    }
}
