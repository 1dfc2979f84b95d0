// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository interface for genetic memory
//!
//! Storage is an append-only version log per agent plus a "latest" index
//! that points at one version in that log. Versioned snapshots are never
//! rewritten except for their metrics annotation.

use async_trait::async_trait;

use super::evolution::EvolutionEvent;
use super::genome::{FitnessMetrics, Genome};

#[async_trait]
pub trait GenomeRepository: Send + Sync {
    /// Write a new snapshot and point the latest index at it.
    /// Fails with `Conflict` if that version already exists.
    async fn append_version(&self, genome: &Genome) -> Result<(), RepositoryError>;

    /// Highest version ever written for `agent_id`, 0 when none.
    async fn max_version(&self, agent_id: &str) -> Result<u32, RepositoryError>;

    async fn find_version(&self, agent_id: &str, version: u32) -> Result<Option<Genome>, RepositoryError>;

    async fn find_latest(&self, agent_id: &str) -> Result<Option<Genome>, RepositoryError>;

    /// All snapshots of `agent_id`, oldest first
    async fn list_versions(&self, agent_id: &str) -> Result<Vec<Genome>, RepositoryError>;

    /// The latest snapshot of every live agent
    async fn list_latest(&self) -> Result<Vec<Genome>, RepositoryError>;

    /// Replace the metrics annotation of one snapshot
    async fn set_metrics(&self, agent_id: &str, version: u32, metrics: &FitnessMetrics) -> Result<(), RepositoryError>;

    /// Drop the latest pointer. Returns whether one existed.
    async fn remove_latest(&self, agent_id: &str) -> Result<bool, RepositoryError>;

    /// Drop every snapshot of `agent_id`. Returns how many were removed.
    async fn remove_versions(&self, agent_id: &str) -> Result<usize, RepositoryError>;

    async fn append_event(&self, event: &EvolutionEvent) -> Result<(), RepositoryError>;

    /// Events newest first, optionally for one agent
    async fn list_events(&self, agent_id: Option<&str>, limit: usize) -> Result<Vec<EvolutionEvent>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for RepositoryError {
    fn from(err: sled::Error) -> Self {
        RepositoryError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
