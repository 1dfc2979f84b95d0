// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Demo swarm
//!
//! Registers a few research agents and a writer on an in-process message
//! bus, fans a topic out to the researchers, ranks them by fitness, pipes
//! the best finding through the writer, and replicates the winner.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tracing::info;

use genesis_core::application::orchestrator::TaskOrchestrator;
use genesis_core::domain::config::GenesisConfig;
use genesis_core::domain::task::{Executable, Task};
use genesis_cortex::{FitnessMetrics, GenomeSpec, GenomeStore, Mutation};
use genesis_swarm::application::{BusAgent, BusError, MessageBus};
use genesis_swarm::domain::{AgentCard, Message};

use super::genome::open_store;

const COORDINATOR: &str = "coordinator";
const WRITER: &str = "writer";

#[derive(Args)]
pub struct DemoArgs {
    /// Topic handed to the research agents
    #[arg(long, default_value = "agent orchestration")]
    pub topic: String,

    /// Number of research agents
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub researchers: u8,
}

pub async fn run(args: DemoArgs, config: GenesisConfig) -> Result<()> {
    config.validate().context("Configuration validation failed")?;

    let bus = MessageBus::new(config.spec.message_bus.clone());
    let orchestrator = TaskOrchestrator::new(config.spec.orchestrator.clone());
    let store = open_store(&config.spec.genetic_memory)?;

    bus.register_agent(AgentCard::new(COORDINATOR, "Coordinator"));
    let mut loops = Vec::new();

    for i in 1..=args.researchers {
        let agent_id = format!("researcher-{}", i);
        bus.register_agent(
            AgentCard::new(&agent_id, format!("Researcher {}", i))
                .with_description("Collects notes on a topic")
                .with_capabilities(["research"]),
        );
        install_researcher(&bus, &agent_id, usize::from(i))?;
        loops.push(spawn_loop(&bus, &agent_id));

        let spec = spec_for(&agent_id, "research", 0.2 * f64::from(i));
        store
            .store_genome(&agent_id, "researcher", spec, None)
            .await?;
    }

    bus.register_agent(
        AgentCard::new(WRITER, "Writer")
            .with_description("Turns findings into a summary")
            .with_capabilities(["write"]),
    );
    install_writer(&bus)?;
    loops.push(spawn_loop(&bus, WRITER));
    store
        .store_genome(WRITER, "writer", spec_for(WRITER, "write", 0.7), None)
        .await?;

    let outcome = run_swarm(&args, &bus, &orchestrator, &store).await;

    bus.stop();
    for handle in loops {
        handle.await.context("Message loop panicked")??;
    }
    outcome
}

async fn run_swarm(
    args: &DemoArgs,
    bus: &MessageBus,
    orchestrator: &TaskOrchestrator,
    store: &GenomeStore,
) -> Result<()> {
    // 1. Fan the topic out to every researcher
    let researchers = bus.discover_agents(Some("research"));
    println!(
        "{}",
        format!("Discovered {} research agents", researchers.len()).bold()
    );

    let tasks = researchers
        .iter()
        .map(|card| {
            Task::new(
                &card.agent_id,
                json!(args.topic),
                BusAgent::new(bus.clone(), COORDINATOR, &card.agent_id).into_executable(),
            )
        })
        .collect();
    let results = orchestrator.execute_parallel(tasks, None).await;

    // 2. Score each researcher
    for result in &results {
        let quality = result
            .output
            .get("notes")
            .and_then(Value::as_array)
            .map_or(0.0, |notes| notes.len() as f64 / f64::from(args.researchers));
        let metrics = FitnessMetrics::from([
            ("success_rate".to_string(), if result.success { 1.0 } else { 0.0 }),
            ("quality".to_string(), quality),
        ]);
        store.update_metrics(&result.task_name, metrics).await?;

        match &result.error {
            None => println!("  {} {}", "✓".green(), result.task_name),
            Some(error) => println!("  {} {}: {}", "✗".red(), result.task_name, error),
        }
    }

    // 3. Count notes across researchers with map-reduce
    let findings: Vec<Value> = results.iter().map(|r| r.output.clone()).collect();
    let count_notes = Executable::from_fn(|finding: Value| async move {
        let notes = finding.get("notes").and_then(Value::as_array).map_or(0, Vec::len);
        Ok::<Value, anyhow::Error>(json!(notes))
    });
    let sum = Executable::blocking(|counts: Value| {
        let total: u64 = counts
            .as_array()
            .map(|c| c.iter().filter_map(Value::as_u64).sum())
            .unwrap_or_default();
        Ok(json!(total))
    });
    let total = orchestrator.execute_map_reduce(findings, count_notes, sum).await;
    println!("  Total notes collected: {}", total.output);

    // 4. Pipe the fittest researcher through the writer
    let fittest = store.find_fittest("quality", 1).await?;
    let best = fittest
        .first()
        .context("No researcher produced a finding")?;
    println!(
        "{}",
        format!(
            "Fittest researcher: {} (quality {:.2})",
            best.agent_id,
            best.metric("quality").unwrap_or_default()
        )
        .bold()
    );

    let pipeline = vec![
        Task::stage(
            "research",
            BusAgent::new(bus.clone(), COORDINATOR, &best.agent_id).into_executable(),
        ),
        Task::stage(
            "write",
            BusAgent::new(bus.clone(), COORDINATOR, WRITER).into_executable(),
        ),
    ];
    let summary = orchestrator
        .execute_pipeline(pipeline, json!(args.topic))
        .await;
    if !summary.success {
        anyhow::bail!(
            "Pipeline failed at {}: {}",
            summary.task_name,
            summary.error.unwrap_or_default()
        );
    }
    println!("  {}", summary.output.as_str().unwrap_or_default());

    // 5. Replicate the winner with a hotter temperature
    let child_id = format!("{}-evolved", best.agent_id);
    let child = store
        .replicate_genome(
            &best.agent_id,
            &child_id,
            &[Mutation::new("temperature", "temperature", json!(0.9)).with_reason("explore")],
        )
        .await?;
    let lineage: Vec<String> = store
        .get_lineage(&child.agent_id)
        .await?
        .iter()
        .map(|g| format!("{} v{}", g.agent_id, g.version))
        .collect();
    println!("{}", format!("Lineage: {}", lineage.join(" -> ")).bold());

    let stats = bus.stats();
    info!(
        registered_agents = stats.registered_agents,
        pending_requests = stats.pending_requests,
        "Demo finished"
    );
    Ok(())
}

/// Researcher `n` returns `n` notes on the requested topic.
fn install_researcher(bus: &MessageBus, agent_id: &str, notes: usize) -> Result<(), BusError> {
    let name = agent_id.to_string();
    bus.set_handler(agent_id, move |message: Message| {
        let name = name.clone();
        async move {
            let topic = message.payload.as_str().unwrap_or("anything").to_string();
            let notes: Vec<String> = (1..=notes)
                .map(|i| format!("{} note {} on {}", name, i, topic))
                .collect();
            let reply = message.create_response(json!({ "agent": name, "notes": notes }));
            Ok::<Option<Message>, anyhow::Error>(Some(reply))
        }
    })
}

fn install_writer(bus: &MessageBus) -> Result<(), BusError> {
    bus.set_handler(WRITER, |message: Message| async move {
        let author = message
            .payload
            .get("agent")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let notes: Vec<&str> = message
            .payload
            .get("notes")
            .and_then(Value::as_array)
            .map(|n| n.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        let summary = format!("Summary by {} from {} notes: {}", WRITER, author, notes.join("; "));
        Ok::<Option<Message>, anyhow::Error>(Some(message.create_response(json!(summary))))
    })
}

fn spawn_loop(bus: &MessageBus, agent_id: &str) -> JoinHandle<Result<(), BusError>> {
    let bus = bus.clone();
    let agent_id = agent_id.to_string();
    tokio::spawn(async move { bus.start_message_loop(&agent_id).await })
}

fn spec_for(agent_id: &str, role: &str, temperature: f64) -> GenomeSpec {
    let mut spec = GenomeSpec::new();
    spec.insert("name".to_string(), json!(agent_id));
    spec.insert("role".to_string(), json!(role));
    spec.insert("temperature".to_string(), json!(temperature));
    spec
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_demo_runs_end_to_end() {
        let args = DemoArgs {
            topic: "testing".to_string(),
            researchers: 2,
        };
        run(args, GenesisConfig::default()).await.unwrap();
    }
}
