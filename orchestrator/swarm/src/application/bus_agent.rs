// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use genesis_core::domain::task::{Agent, Executable};
use serde_json::Value;

use crate::application::message_bus::MessageBus;
use crate::domain::{Message, MessageType};

/// Orchestrator [`Agent`] backed by a remote agent on the bus.
///
/// Each `run` sends a `task_request` to `target` and returns the payload of
/// the correlated response. An `error` response becomes a task failure.
pub struct BusAgent {
    bus: MessageBus,
    sender: String,
    target: String,
    timeout: Option<Duration>,
}

impl BusAgent {
    pub fn new(bus: MessageBus, sender: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            bus,
            sender: sender.into(),
            target: target.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn into_executable(self) -> Executable {
        Executable::from_agent(Arc::new(self))
    }
}

#[async_trait]
impl Agent for BusAgent {
    async fn run(&self, input: Value) -> anyhow::Result<Value> {
        let request = Message::direct(MessageType::TaskRequest, &self.sender, &self.target, input);
        let response = self.bus.request(request, self.timeout).await?;

        if response.message_type == MessageType::Error {
            let reason = response
                .payload
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| response.payload.to_string());
            anyhow::bail!("Agent '{}' failed: {}", self.target, reason);
        }

        Ok(response.payload)
    }
}
