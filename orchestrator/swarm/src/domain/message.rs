// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent-to-Agent Messages
//!
//! The wire envelope exchanged over the [`MessageBus`]. A message with a
//! `receiver` is delivered to that agent's mailbox; without one it is a
//! broadcast. A reply-typed message (`task_response`, `pong`, `error`,
//! `agent_card`) carrying a `correlation_id` is a response to the message
//! with that id. Other types may carry one to reference an earlier message.
//!
//! [`MessageBus`]: crate::application::message_bus::MessageBus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    // Task lifecycle
    TaskRequest,
    TaskResponse,
    TaskStatus,
    TaskCancel,

    // Discovery
    Discover,
    AgentCard,

    // Control
    Ping,
    Pong,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::TaskRequest => "task_request",
            MessageType::TaskResponse => "task_response",
            MessageType::TaskStatus => "task_status",
            MessageType::TaskCancel => "task_cancel",
            MessageType::Discover => "discover",
            MessageType::AgentCard => "agent_card",
            MessageType::Ping => "ping",
            MessageType::Pong => "pong",
            MessageType::Error => "error",
        }
    }

    /// Types that answer an earlier message and may resolve a `request()`.
    pub fn is_reply(&self) -> bool {
        matches!(
            self,
            MessageType::TaskResponse | MessageType::Pong | MessageType::Error | MessageType::AgentCard
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a remote task, carried in `task_status` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    #[serde(rename = "type")]
    pub message_type: MessageType,

    #[serde(default)]
    pub sender: String,

    /// `None` broadcasts to every registered agent except the sender.
    #[serde(default)]
    pub receiver: Option<String>,

    #[serde(default = "empty_payload")]
    pub payload: Value,

    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub correlation_id: Option<Uuid>,

    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

fn empty_payload() -> Value {
    Value::Object(Default::default())
}

impl Message {
    pub fn new(
        message_type: MessageType,
        sender: impl Into<String>,
        receiver: Option<String>,
        payload: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_type,
            sender: sender.into(),
            receiver,
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
            metadata: HashMap::new(),
        }
    }

    /// Direct message to a single agent.
    pub fn direct(
        message_type: MessageType,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self::new(message_type, sender, Some(receiver.into()), payload)
    }

    pub fn broadcast(message_type: MessageType, sender: impl Into<String>, payload: Value) -> Self {
        Self::new(message_type, sender, None, payload)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn is_broadcast(&self) -> bool {
        self.receiver.is_none()
    }

    /// A correlated reply. Correlated requests such as `task_cancel` are not responses.
    pub fn is_response(&self) -> bool {
        self.correlation_id.is_some() && self.message_type.is_reply()
    }

    /// A `task_response` addressed back to this message's sender.
    pub fn create_response(&self, payload: Value) -> Message {
        self.create_typed_response(payload, MessageType::TaskResponse)
    }

    /// Reply with an explicit type (`pong`, `error`, `agent_card`, ...).
    pub fn create_typed_response(&self, payload: Value, message_type: MessageType) -> Message {
        let mut response = Message::new(
            message_type,
            self.receiver.clone().unwrap_or_default(),
            Some(self.sender.clone()),
            payload,
        );
        response.correlation_id = Some(self.id);
        response
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
