// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Genome Store - versioned genetic memory for agents
//!
//! Every write for an agent goes through that agent's async lock, so version
//! numbers stay strictly monotonic under concurrent writers. Reads are
//! lock-free and return `Ok(None)` or an empty list for unknown agents.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::domain::evolution::{EvolutionEvent, EvolutionEventType};
use crate::domain::genome::{FitnessMetrics, Genome, GenomeSpec, Mutation};
use crate::domain::repository::{GenomeRepository, RepositoryError};
use crate::infrastructure::in_memory::InMemoryGenomeRepository;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum GenomeStoreError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Genome not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type Result<T> = std::result::Result<T, GenomeStoreError>;

pub struct GenomeStore {
    repository: Arc<dyn GenomeRepository>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
    history_limit: usize,
}

impl GenomeStore {
    pub fn new(repository: Arc<dyn GenomeRepository>) -> Self {
        Self {
            repository,
            write_locks: DashMap::new(),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryGenomeRepository::new()))
    }

    /// Default number of events returned by `get_evolution_history`
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Store a new version of `agent_id`.
    ///
    /// The first version records a `create` event, later ones `evolve`.
    pub async fn store_genome(
        &self,
        agent_id: &str,
        code: impl Into<String>,
        spec: GenomeSpec,
        parent_id: Option<String>,
    ) -> Result<Genome> {
        validate_agent_id(agent_id)?;
        let _guard = self.write_lock(agent_id).await;

        self.append_locked(agent_id, code.into(), spec, parent_id, None, Map::new())
            .await
    }

    /// Store the next version of an existing agent, keeping its parent.
    pub async fn evolve_genome(
        &self,
        agent_id: &str,
        code: impl Into<String>,
        spec: GenomeSpec,
        reason: &str,
    ) -> Result<Genome> {
        validate_agent_id(agent_id)?;
        let _guard = self.write_lock(agent_id).await;

        let current = self
            .repository
            .find_latest(agent_id)
            .await?
            .ok_or_else(|| GenomeStoreError::NotFound(agent_id.to_string()))?;

        let mut details = Map::new();
        details.insert("reason".to_string(), json!(reason));
        details.insert("previous_version".to_string(), json!(current.version));

        self.append_locked(
            agent_id,
            code.into(),
            spec,
            current.parent_id,
            Some(EvolutionEventType::Evolve),
            details,
        )
        .await
    }

    /// Copy the latest genome of `source_id` into a new agent `new_id`.
    ///
    /// The copy's `spec.name` becomes `new_id`. Each mutation overwrites its
    /// target key only when the key already exists in the spec.
    pub async fn replicate_genome(&self, source_id: &str, new_id: &str, mutations: &[Mutation]) -> Result<Genome> {
        validate_agent_id(new_id)?;
        if source_id == new_id {
            return Err(GenomeStoreError::Validation(format!(
                "cannot replicate '{}' onto itself",
                source_id
            )));
        }

        let source = self
            .repository
            .find_latest(source_id)
            .await?
            .ok_or_else(|| GenomeStoreError::NotFound(source_id.to_string()))?;

        let mut spec = source.spec.clone();
        spec.insert("name".to_string(), json!(new_id));
        let applied: Vec<Mutation> = mutations.iter().filter_map(|m| m.apply(&mut spec)).collect();
        if applied.len() < mutations.len() {
            debug!(
                source_id = %source_id,
                skipped = mutations.len() - applied.len(),
                "Skipped mutations targeting unknown spec keys"
            );
        }

        let mut details = Map::new();
        details.insert("source_id".to_string(), json!(source_id));
        details.insert("source_version".to_string(), json!(source.version));
        details.insert("mutations".to_string(), json!(applied));

        let _guard = self.write_lock(new_id).await;

        self.append_locked(
            new_id,
            source.code,
            spec,
            Some(source_id.to_string()),
            Some(EvolutionEventType::Replicate),
            details,
        )
        .await
    }

    /// Latest genome, or a specific version (versions start at 1).
    pub async fn get_genome(&self, agent_id: &str, version: Option<u32>) -> Result<Option<Genome>> {
        match version {
            Some(0) => Err(GenomeStoreError::Validation(
                "genome versions start at 1".to_string(),
            )),
            Some(v) => Ok(self.repository.find_version(agent_id, v).await?),
            None => Ok(self.repository.find_latest(agent_id).await?),
        }
    }

    /// Ancestors of `agent_id` through `parent_id`, oldest first, ending with `agent_id`.
    pub async fn get_lineage(&self, agent_id: &str) -> Result<Vec<Genome>> {
        let mut lineage = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(agent_id.to_string());

        while let Some(id) = current.take() {
            if !visited.insert(id.clone()) {
                warn!(agent_id = %agent_id, repeated = %id, "Lineage contains a cycle, stopping");
                break;
            }
            let Some(genome) = self.repository.find_latest(&id).await? else {
                break;
            };
            current = genome.parent_id.clone();
            lineage.push(genome);
        }

        lineage.reverse();
        Ok(lineage)
    }

    /// Every stored snapshot of `agent_id`, oldest first
    pub async fn get_all_versions(&self, agent_id: &str) -> Result<Vec<Genome>> {
        Ok(self.repository.list_versions(agent_id).await?)
    }

    /// Merge `metrics` into the latest snapshot without creating a version.
    /// Every value must be finite.
    pub async fn update_metrics(&self, agent_id: &str, metrics: FitnessMetrics) -> Result<Genome> {
        if let Some((name, value)) = metrics.iter().find(|(_, value)| !value.is_finite()) {
            return Err(GenomeStoreError::Validation(format!(
                "metric '{}' must be a finite number, got {}",
                name, value
            )));
        }
        let _guard = self.write_lock(agent_id).await;

        let mut genome = self
            .repository
            .find_latest(agent_id)
            .await?
            .ok_or_else(|| GenomeStoreError::NotFound(agent_id.to_string()))?;

        genome.metrics.extend(metrics);
        self.repository
            .set_metrics(agent_id, genome.version, &genome.metrics)
            .await?;

        debug!(agent_id = %agent_id, version = genome.version, metrics = ?genome.metrics, "Updated metrics");
        Ok(genome)
    }

    /// Latest genomes that carry `metric`, best first.
    pub async fn find_fittest(&self, metric: &str, limit: usize) -> Result<Vec<Genome>> {
        let mut ranked: Vec<(f64, Genome)> = self
            .repository
            .list_latest()
            .await?
            .into_iter()
            .filter_map(|genome| genome.metric(metric).map(|score| (score, genome)))
            .collect();

        ranked.sort_by(|(a, ga), (b, gb)| b.total_cmp(a).then_with(|| ga.agent_id.cmp(&gb.agent_id)));
        ranked.truncate(limit);
        Ok(ranked.into_iter().map(|(_, genome)| genome).collect())
    }

    pub async fn record_evolution(
        &self,
        agent_id: &str,
        event_type: EvolutionEventType,
        details: Map<String, Value>,
    ) -> Result<EvolutionEvent> {
        validate_agent_id(agent_id)?;
        let event = EvolutionEvent::new(agent_id, event_type, details);
        self.repository.append_event(&event).await?;
        Ok(event)
    }

    /// Evolution events newest first. `limit` defaults to the configured history limit.
    pub async fn get_evolution_history(&self, agent_id: Option<&str>, limit: Option<usize>) -> Result<Vec<EvolutionEvent>> {
        let limit = limit.unwrap_or(self.history_limit);
        Ok(self.repository.list_events(agent_id, limit).await?)
    }

    /// Remove the latest pointer, and every snapshot unless `keep_versions`.
    /// Always records a `kill` event. Returns whether anything was removed.
    pub async fn delete_genome(&self, agent_id: &str, keep_versions: bool) -> Result<bool> {
        validate_agent_id(agent_id)?;
        let _guard = self.write_lock(agent_id).await;

        let had_latest = self.repository.remove_latest(agent_id).await?;
        let removed_versions = if keep_versions {
            0
        } else {
            self.repository.remove_versions(agent_id).await?
        };

        let mut details = Map::new();
        details.insert("keep_versions".to_string(), json!(keep_versions));
        details.insert("removed_versions".to_string(), json!(removed_versions));
        self.record_evolution(agent_id, EvolutionEventType::Kill, details)
            .await?;

        info!(agent_id = %agent_id, keep_versions, removed_versions, "Deleted genome");
        Ok(had_latest || removed_versions > 0)
    }

    async fn write_lock(&self, agent_id: &str) -> WriteGuard<'_> {
        let lock = self
            .write_locks
            .entry(agent_id.to_string())
            .or_default()
            .value()
            .clone();
        WriteGuard {
            locks: &self.write_locks,
            agent_id: agent_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Caller must hold the agent's write lock.
    async fn append_locked(
        &self,
        agent_id: &str,
        code: String,
        spec: GenomeSpec,
        parent_id: Option<String>,
        event_type: Option<EvolutionEventType>,
        mut details: Map<String, Value>,
    ) -> Result<Genome> {
        let version = self.repository.max_version(agent_id).await? + 1;
        let genome = Genome::new(agent_id, code, spec, version, parent_id);
        self.repository.append_version(&genome).await?;

        let event_type = event_type.unwrap_or(if version == 1 {
            EvolutionEventType::Create
        } else {
            EvolutionEventType::Evolve
        });
        details.insert("version".to_string(), json!(version));
        details.insert("parent_id".to_string(), json!(genome.parent_id));
        self.repository
            .append_event(&EvolutionEvent::new(agent_id, event_type, details))
            .await?;

        metrics::counter!("genesis_genomes_stored_total", "event" => event_type.as_str()).increment(1);
        info!(agent_id = %agent_id, version, event = %event_type, "Stored genome");
        Ok(genome)
    }
}

/// Holds an agent's write lock. On drop the lock entry is pruned once no
/// other writer holds or waits on it.
struct WriteGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    agent_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.agent_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

fn validate_agent_id(agent_id: &str) -> Result<()> {
    if agent_id.trim().is_empty() {
        return Err(GenomeStoreError::Validation("agent_id cannot be empty".to_string()));
    }
    if agent_id.contains('\0') {
        return Err(GenomeStoreError::Validation("agent_id cannot contain NUL".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(value: Value) -> GenomeSpec {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_version_zero_is_invalid() {
        let store = GenomeStore::in_memory();
        store.store_genome("a", "code", GenomeSpec::new(), None).await.unwrap();
        assert!(matches!(
            store.get_genome("a", Some(0)).await,
            Err(GenomeStoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_agent_id_rejected() {
        let store = GenomeStore::in_memory();
        assert!(matches!(
            store.store_genome(" ", "code", GenomeSpec::new(), None).await,
            Err(GenomeStoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_metrics_merges_without_new_version() {
        let store = GenomeStore::in_memory();
        store.store_genome("a", "code", GenomeSpec::new(), None).await.unwrap();

        store
            .update_metrics("a", FitnessMetrics::from([("success_rate".to_string(), 0.5)]))
            .await
            .unwrap();
        let updated = store
            .update_metrics("a", FitnessMetrics::from([("avg_time".to_string(), 1.2)]))
            .await
            .unwrap();

        assert_eq!(updated.version, 1);
        assert_eq!(updated.metric("success_rate"), Some(0.5));
        assert_eq!(updated.metric("avg_time"), Some(1.2));

        let snapshot = store.get_genome("a", Some(1)).await.unwrap().unwrap();
        assert_eq!(snapshot.metrics, updated.metrics);
    }

    #[tokio::test]
    async fn test_update_metrics_unknown_agent() {
        let store = GenomeStore::in_memory();
        assert!(matches!(
            store.update_metrics("ghost", FitnessMetrics::new()).await,
            Err(GenomeStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_lineage_terminates_on_cycle() {
        let store = GenomeStore::in_memory();
        store.store_genome("a", "code", GenomeSpec::new(), Some("b".into())).await.unwrap();
        store.store_genome("b", "code", GenomeSpec::new(), Some("a".into())).await.unwrap();

        let lineage: Vec<_> = store
            .get_lineage("a")
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.agent_id)
            .collect();
        assert_eq!(lineage, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_evolve_keeps_parent_and_records_reason() {
        let store = GenomeStore::in_memory();
        store.store_genome("child", "v1", spec(json!({"name": "child"})), Some("root".into())).await.unwrap();

        let evolved = store
            .evolve_genome("child", "v2", spec(json!({"name": "child"})), "low success rate")
            .await
            .unwrap();
        assert_eq!(evolved.version, 2);
        assert_eq!(evolved.parent_id.as_deref(), Some("root"));

        let history = store.get_evolution_history(Some("child"), Some(1)).await.unwrap();
        assert_eq!(history[0].event_type, EvolutionEventType::Evolve);
        assert_eq!(history[0].details["reason"], "low success rate");
        assert_eq!(history[0].details["previous_version"], 1);

        assert!(matches!(
            store.evolve_genome("missing", "v1", GenomeSpec::new(), "n/a").await,
            Err(GenomeStoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_non_finite_metrics_rejected() {
        let store = GenomeStore::in_memory();
        store.store_genome("a", "code", GenomeSpec::new(), None).await.unwrap();
        store
            .update_metrics("a", FitnessMetrics::from([("score".to_string(), 0.4)]))
            .await
            .unwrap();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(matches!(
                store
                    .update_metrics("a", FitnessMetrics::from([("score".to_string(), bad)]))
                    .await,
                Err(GenomeStoreError::Validation(_))
            ));
        }

        let genome = store.get_genome("a", None).await.unwrap().unwrap();
        assert_eq!(genome.metric("score"), Some(0.4));
    }

    #[tokio::test]
    async fn test_write_locks_are_pruned_after_writes() {
        let store = GenomeStore::in_memory();
        store.store_genome("a", "v1", spec(json!({"name": "a"})), None).await.unwrap();
        store.evolve_genome("a", "v2", spec(json!({"name": "a"})), "retry").await.unwrap();
        store.replicate_genome("a", "b", &[]).await.unwrap();
        store
            .update_metrics("b", FitnessMetrics::from([("score".to_string(), 1.0)]))
            .await
            .unwrap();
        assert!(store.update_metrics("ghost", FitnessMetrics::new()).await.is_err());
        store.delete_genome("a", false).await.unwrap();

        assert_eq!(store.write_locks.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_write_locks_are_pruned_under_contention() {
        let store = Arc::new(GenomeStore::in_memory());
        let writers: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .store_genome("shared", format!("v{}", i), GenomeSpec::new(), None)
                        .await
                        .unwrap()
                })
            })
            .collect();
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(store.get_all_versions("shared").await.unwrap().len(), 16);
        assert_eq!(store.write_locks.len(), 0);
    }
}
