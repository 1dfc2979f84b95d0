// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Capability record an agent publishes when it joins the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCard {
    pub agent_id: String,
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    #[serde(default)]
    pub input_schema: Value,

    #[serde(default)]
    pub output_schema: Value,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl AgentCard {
    pub fn new(agent_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            name: name.into(),
            description: String::new(),
            capabilities: BTreeSet::new(),
            input_schema: Value::Null,
            output_schema: Value::Null,
            version: default_version(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities.extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn matches_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}
