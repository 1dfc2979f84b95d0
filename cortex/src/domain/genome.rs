// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Genome aggregate for the Cortex bounded context
//! A genome is everything needed to recreate one version of an agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Agent specification document (model, prompt, tools, ...)
pub type GenomeSpec = Map<String, Value>;

/// Performance metrics keyed by name (success_rate, avg_time, ...)
pub type FitnessMetrics = BTreeMap<String, f64>;

/// One immutable version of an agent definition.
///
/// `metrics` is the only field that changes after a snapshot is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    pub agent_id: String,
    pub code: String,
    #[serde(default)]
    pub spec: GenomeSpec,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub metrics: FitnessMetrics,
}

impl Genome {
    pub fn new(
        agent_id: impl Into<String>,
        code: impl Into<String>,
        spec: GenomeSpec,
        version: u32,
        parent_id: Option<String>,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            code: code.into(),
            spec,
            version,
            created_at: Utc::now(),
            parent_id,
            metrics: FitnessMetrics::new(),
        }
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// A change applied to a spec when replicating a genome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    /// Kind of change (prompt, model, temperature, tool, ...)
    pub mutation_type: String,
    /// Spec key to overwrite
    pub target: String,
    #[serde(default)]
    pub old_value: Value,
    pub new_value: Value,
    #[serde(default)]
    pub reason: String,
}

impl Mutation {
    pub fn new(mutation_type: impl Into<String>, target: impl Into<String>, new_value: Value) -> Self {
        Self {
            mutation_type: mutation_type.into(),
            target: target.into(),
            old_value: Value::Null,
            new_value,
            reason: String::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    /// Overwrite `target` in `spec` if the key exists. Returns the applied
    /// mutation with `old_value` filled in.
    pub fn apply(&self, spec: &mut GenomeSpec) -> Option<Mutation> {
        let slot = spec.get_mut(&self.target)?;
        let old_value = std::mem::replace(slot, self.new_value.clone());
        Some(Mutation {
            old_value,
            ..self.clone()
        })
    }
}
