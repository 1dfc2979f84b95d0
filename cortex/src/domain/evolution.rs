// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionEventType {
    Create,
    Evolve,
    Replicate,
    Kill,
}

impl EvolutionEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvolutionEventType::Create => "create",
            EvolutionEventType::Evolve => "evolve",
            EvolutionEventType::Replicate => "replicate",
            EvolutionEventType::Kill => "kill",
        }
    }
}

impl fmt::Display for EvolutionEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of a change to an agent's genome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvolutionEvent {
    pub event_id: Uuid,
    pub agent_id: String,
    pub event_type: EvolutionEventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl EvolutionEvent {
    pub fn new(agent_id: impl Into<String>, event_type: EvolutionEventType, details: Map<String, Value>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            event_type,
            timestamp: Utc::now(),
            details,
        }
    }
}
