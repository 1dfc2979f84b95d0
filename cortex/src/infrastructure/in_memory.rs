// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::evolution::EvolutionEvent;
use crate::domain::genome::{FitnessMetrics, Genome};
use crate::domain::repository::{GenomeRepository, RepositoryError};

#[derive(Default)]
struct State {
    /// agent_id -> version -> snapshot
    versions: HashMap<String, BTreeMap<u32, Genome>>,
    /// agent_id -> latest version
    latest: HashMap<String, u32>,
    /// Insertion order doubles as history order
    events: Vec<EvolutionEvent>,
}

/// Ephemeral genome storage for tests and local runs
#[derive(Clone, Default)]
pub struct InMemoryGenomeRepository {
    state: Arc<RwLock<State>>,
}

impl InMemoryGenomeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GenomeRepository for InMemoryGenomeRepository {
    async fn append_version(&self, genome: &Genome) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        let log = state.versions.entry(genome.agent_id.clone()).or_default();
        if log.contains_key(&genome.version) {
            return Err(RepositoryError::Conflict(format!(
                "{} v{} already exists",
                genome.agent_id, genome.version
            )));
        }
        log.insert(genome.version, genome.clone());
        state.latest.insert(genome.agent_id.clone(), genome.version);
        Ok(())
    }

    async fn max_version(&self, agent_id: &str) -> Result<u32, RepositoryError> {
        let state = self.state.read();
        Ok(state
            .versions
            .get(agent_id)
            .and_then(|log| log.keys().next_back().copied())
            .unwrap_or(0))
    }

    async fn find_version(&self, agent_id: &str, version: u32) -> Result<Option<Genome>, RepositoryError> {
        let state = self.state.read();
        Ok(state.versions.get(agent_id).and_then(|log| log.get(&version)).cloned())
    }

    async fn find_latest(&self, agent_id: &str) -> Result<Option<Genome>, RepositoryError> {
        let state = self.state.read();
        let Some(version) = state.latest.get(agent_id) else {
            return Ok(None);
        };
        Ok(state.versions.get(agent_id).and_then(|log| log.get(version)).cloned())
    }

    async fn list_versions(&self, agent_id: &str) -> Result<Vec<Genome>, RepositoryError> {
        let state = self.state.read();
        Ok(state
            .versions
            .get(agent_id)
            .map(|log| log.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_latest(&self) -> Result<Vec<Genome>, RepositoryError> {
        let state = self.state.read();
        Ok(state
            .latest
            .iter()
            .filter_map(|(agent_id, version)| state.versions.get(agent_id)?.get(version).cloned())
            .collect())
    }

    async fn set_metrics(&self, agent_id: &str, version: u32, metrics: &FitnessMetrics) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        let genome = state
            .versions
            .get_mut(agent_id)
            .and_then(|log| log.get_mut(&version))
            .ok_or_else(|| RepositoryError::NotFound(format!("{} v{}", agent_id, version)))?;
        genome.metrics = metrics.clone();
        Ok(())
    }

    async fn remove_latest(&self, agent_id: &str) -> Result<bool, RepositoryError> {
        Ok(self.state.write().latest.remove(agent_id).is_some())
    }

    async fn remove_versions(&self, agent_id: &str) -> Result<usize, RepositoryError> {
        Ok(self
            .state
            .write()
            .versions
            .remove(agent_id)
            .map(|log| log.len())
            .unwrap_or(0))
    }

    async fn append_event(&self, event: &EvolutionEvent) -> Result<(), RepositoryError> {
        self.state.write().events.push(event.clone());
        Ok(())
    }

    async fn list_events(&self, agent_id: Option<&str>, limit: usize) -> Result<Vec<EvolutionEvent>, RepositoryError> {
        let state = self.state.read();
        Ok(state
            .events
            .iter()
            .rev()
            .filter(|e| agent_id.map_or(true, |id| e.agent_id == id))
            .take(limit)
            .cloned()
            .collect())
    }
}
