// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sled-backed genome repository
//!
//! Trees:
//! - `genome_versions`: `agent_id \0 version (u32 BE)` -> snapshot JSON
//! - `genome_latest`: `agent_id` -> version (u32 BE)
//! - `evolution_events`: monotonic id (u64 BE) -> event JSON

use std::path::Path;

use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use tracing::info;

use crate::domain::evolution::EvolutionEvent;
use crate::domain::genome::{FitnessMetrics, Genome};
use crate::domain::repository::{GenomeRepository, RepositoryError};

const VERSIONS_TREE: &str = "genome_versions";
const LATEST_TREE: &str = "genome_latest";
const EVENTS_TREE: &str = "evolution_events";

#[derive(Clone)]
pub struct SledGenomeRepository {
    db: sled::Db,
    versions: sled::Tree,
    latest: sled::Tree,
    events: sled::Tree,
}

impl SledGenomeRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref();
        info!(path = %path.display(), "Opening genome database");
        Self::from_db(sled::open(path)?)
    }

    /// A database that is deleted when dropped
    pub fn temporary() -> Result<Self, RepositoryError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, RepositoryError> {
        Ok(Self {
            versions: db.open_tree(VERSIONS_TREE)?,
            latest: db.open_tree(LATEST_TREE)?,
            events: db.open_tree(EVENTS_TREE)?,
            db,
        })
    }

    pub async fn flush(&self) -> Result<(), RepositoryError> {
        self.db.flush_async().await?;
        Ok(())
    }

    fn version_key(agent_id: &str, version: u32) -> Vec<u8> {
        let mut key = Self::agent_prefix(agent_id);
        key.extend_from_slice(&version.to_be_bytes());
        key
    }

    fn agent_prefix(agent_id: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(agent_id.len() + 5);
        prefix.extend_from_slice(agent_id.as_bytes());
        prefix.push(0);
        prefix
    }

    fn decode_version(bytes: &[u8]) -> Result<u32, RepositoryError> {
        let raw: [u8; 4] = bytes
            .try_into()
            .map_err(|_| RepositoryError::Serialization(format!("invalid version pointer of {} bytes", bytes.len())))?;
        Ok(u32::from_be_bytes(raw))
    }
}

#[async_trait]
impl GenomeRepository for SledGenomeRepository {
    async fn append_version(&self, genome: &Genome) -> Result<(), RepositoryError> {
        let key = Self::version_key(&genome.agent_id, genome.version);
        let value = serde_json::to_vec(genome)?;
        let pointer = genome.version.to_be_bytes();

        let result = (&self.versions, &self.latest).transaction(|(versions, latest)| {
            if versions.get(&key)?.is_some() {
                return Err(ConflictableTransactionError::Abort(RepositoryError::Conflict(format!(
                    "{} v{} already exists",
                    genome.agent_id, genome.version
                ))));
            }
            versions.insert(key.as_slice(), value.as_slice())?;
            latest.insert(genome.agent_id.as_bytes(), &pointer[..])?;
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(e),
            Err(TransactionError::Storage(e)) => Err(e.into()),
        }
    }

    async fn max_version(&self, agent_id: &str) -> Result<u32, RepositoryError> {
        match self.versions.scan_prefix(Self::agent_prefix(agent_id)).next_back() {
            Some(entry) => {
                let (key, _) = entry?;
                Self::decode_version(&key[key.len() - 4..])
            }
            None => Ok(0),
        }
    }

    async fn find_version(&self, agent_id: &str, version: u32) -> Result<Option<Genome>, RepositoryError> {
        match self.versions.get(Self::version_key(agent_id, version))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn find_latest(&self, agent_id: &str) -> Result<Option<Genome>, RepositoryError> {
        match self.latest.get(agent_id.as_bytes())? {
            Some(pointer) => self.find_version(agent_id, Self::decode_version(&pointer)?).await,
            None => Ok(None),
        }
    }

    async fn list_versions(&self, agent_id: &str) -> Result<Vec<Genome>, RepositoryError> {
        self.versions
            .scan_prefix(Self::agent_prefix(agent_id))
            .map(|entry| -> Result<Genome, RepositoryError> {
                let (_, bytes) = entry?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .collect()
    }

    async fn list_latest(&self) -> Result<Vec<Genome>, RepositoryError> {
        let pointers = self.latest.iter().collect::<Result<Vec<_>, _>>()?;
        let mut genomes = Vec::with_capacity(pointers.len());
        for (agent_id, pointer) in pointers {
            let agent_id = String::from_utf8_lossy(&agent_id);
            if let Some(genome) = self.find_version(&agent_id, Self::decode_version(&pointer)?).await? {
                genomes.push(genome);
            }
        }
        Ok(genomes)
    }

    async fn set_metrics(&self, agent_id: &str, version: u32, metrics: &FitnessMetrics) -> Result<(), RepositoryError> {
        let mut genome = self
            .find_version(agent_id, version)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("{} v{}", agent_id, version)))?;
        genome.metrics = metrics.clone();
        self.versions
            .insert(Self::version_key(agent_id, version), serde_json::to_vec(&genome)?)?;
        Ok(())
    }

    async fn remove_latest(&self, agent_id: &str) -> Result<bool, RepositoryError> {
        Ok(self.latest.remove(agent_id.as_bytes())?.is_some())
    }

    async fn remove_versions(&self, agent_id: &str) -> Result<usize, RepositoryError> {
        let keys = self
            .versions
            .scan_prefix(Self::agent_prefix(agent_id))
            .keys()
            .collect::<Result<Vec<_>, _>>()?;
        for key in &keys {
            self.versions.remove(key)?;
        }
        Ok(keys.len())
    }

    async fn append_event(&self, event: &EvolutionEvent) -> Result<(), RepositoryError> {
        let id = self.db.generate_id()?;
        self.events.insert(id.to_be_bytes(), serde_json::to_vec(event)?)?;
        Ok(())
    }

    async fn list_events(&self, agent_id: Option<&str>, limit: usize) -> Result<Vec<EvolutionEvent>, RepositoryError> {
        let mut events = Vec::new();
        for entry in self.events.iter().rev() {
            if events.len() >= limit {
                break;
            }
            let (_, bytes) = entry?;
            let event: EvolutionEvent = serde_json::from_slice(&bytes)?;
            if agent_id.map_or(true, |id| event.agent_id == id) {
                events.push(event);
            }
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evolution::EvolutionEventType;
    use serde_json::Map;

    fn genome(agent_id: &str, version: u32) -> Genome {
        Genome::new(agent_id, format!("code v{}", version), Map::new(), version, None)
    }

    #[tokio::test]
    async fn test_prefix_scan_does_not_leak_between_agents() {
        let repo = SledGenomeRepository::temporary().unwrap();
        repo.append_version(&genome("a", 1)).await.unwrap();
        repo.append_version(&genome("a", 2)).await.unwrap();
        repo.append_version(&genome("ab", 1)).await.unwrap();

        assert_eq!(repo.max_version("a").await.unwrap(), 2);
        assert_eq!(repo.list_versions("a").await.unwrap().len(), 2);
        assert_eq!(repo.list_versions("ab").await.unwrap().len(), 1);
        assert_eq!(repo.max_version("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_versions_sort_numerically() {
        let repo = SledGenomeRepository::temporary().unwrap();
        for v in [1, 2, 255, 256, 10] {
            repo.append_version(&genome("agent", v)).await.unwrap();
        }
        let versions: Vec<u32> = repo
            .list_versions("agent")
            .await
            .unwrap()
            .iter()
            .map(|g| g.version)
            .collect();
        assert_eq!(versions, vec![1, 2, 10, 255, 256]);
        assert_eq!(repo.max_version("agent").await.unwrap(), 256);
    }

    #[tokio::test]
    async fn test_duplicate_version_conflicts() {
        let repo = SledGenomeRepository::temporary().unwrap();
        repo.append_version(&genome("a", 1)).await.unwrap();
        assert!(matches!(
            repo.append_version(&genome("a", 1)).await,
            Err(RepositoryError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let repo = SledGenomeRepository::open(dir.path()).unwrap();
            repo.append_version(&genome("persisted", 1)).await.unwrap();
            repo.append_event(&EvolutionEvent::new("persisted", EvolutionEventType::Create, Map::new()))
                .await
                .unwrap();
            repo.flush().await.unwrap();
        }

        let repo = SledGenomeRepository::open(dir.path()).unwrap();
        let latest = repo.find_latest("persisted").await.unwrap().unwrap();
        assert_eq!(latest.code, "code v1");
        assert_eq!(repo.list_events(Some("persisted"), 10).await.unwrap().len(), 1);
    }
}
