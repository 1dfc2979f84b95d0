// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Orchestration Domain Events
//!
//! Facts emitted by the [`TaskOrchestrator`] while it drives tasks. They are
//! published on the in-process [`EventBus`] and are never required for
//! correctness: an orchestrator without a bus behaves identically.
//!
//! [`TaskOrchestrator`]: crate::application::orchestrator::TaskOrchestrator
//! [`EventBus`]: crate::infrastructure::event_bus::EventBus

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::task::ExecutionMode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TaskEvent {
    TaskStarted {
        task_name: String,
        blocking: bool,
        started_at: DateTime<Utc>,
    },
    TaskCompleted {
        task_name: String,
        duration_ms: u64,
        completed_at: DateTime<Utc>,
    },
    TaskFailed {
        task_name: String,
        error: String,
        failed_at: DateTime<Utc>,
    },
    TaskTimedOut {
        task_name: String,
        timeout_ms: u64,
        timed_out_at: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn task_name(&self) -> &str {
        match self {
            TaskEvent::TaskStarted { task_name, .. }
            | TaskEvent::TaskCompleted { task_name, .. }
            | TaskEvent::TaskFailed { task_name, .. }
            | TaskEvent::TaskTimedOut { task_name, .. } => task_name,
        }
    }
}

/// Batch-level events, one pair per `execute_*` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrchestrationEvent {
    BatchStarted {
        batch_id: Uuid,
        mode: ExecutionMode,
        task_count: usize,
        started_at: DateTime<Utc>,
    },
    BatchCompleted {
        batch_id: Uuid,
        mode: ExecutionMode,
        succeeded: usize,
        failed: usize,
        completed_at: DateTime<Utc>,
    },
}
