// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Domain (Orchestration Context)
//!
//! Value types handed to and returned from the [`TaskOrchestrator`].
//!
//! - [`Task`]: one opaque unit of work, made of a name, an input payload and an
//!   [`Executable`].
//! - [`TaskResult`]: the structured outcome of a task, success or failure.
//! - [`Agent`] / [`BlockingAgent`]: the single-operation contract the
//!   orchestrator consumes. Agents are opaque; the orchestrator never inspects
//!   them beyond calling `run`.
//!
//! [`TaskOrchestrator`]: crate::application::orchestrator::TaskOrchestrator

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Free-form metadata attached to tasks and results.
pub type Metadata = HashMap<String, Value>;

/// Error text carried by results whose task did not finish before the deadline.
pub const TIMEOUT_ERROR: &str = "Timeout exceeded";

/// An asynchronous agent: anything exposing `run(input) -> output`.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn run(&self, input: Value) -> anyhow::Result<Value>;
}

/// A synchronous agent. Runs on the blocking offload pool, never on the scheduler.
pub trait BlockingAgent: Send + Sync {
    fn run(&self, input: Value) -> anyhow::Result<Value>;
}

struct FnAgent<F>(F);

#[async_trait]
impl<F, Fut> Agent for FnAgent<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn run(&self, input: Value) -> anyhow::Result<Value> {
        (self.0)(input).await
    }
}

struct BlockingFnAgent<F>(F);

impl<F> BlockingAgent for BlockingFnAgent<F>
where
    F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    fn run(&self, input: Value) -> anyhow::Result<Value> {
        (self.0)(input)
    }
}

/// The body of a [`Task`]. Cheap to clone; map-reduce shares one executable
/// across every map task.
#[derive(Clone)]
pub enum Executable {
    Async(Arc<dyn Agent>),
    Blocking(Arc<dyn BlockingAgent>),
}

impl Executable {
    pub fn from_agent(agent: Arc<dyn Agent>) -> Self {
        Self::Async(agent)
    }

    pub fn from_blocking(agent: Arc<dyn BlockingAgent>) -> Self {
        Self::Blocking(agent)
    }

    /// Wrap an async closure.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self::Async(Arc::new(FnAgent(f)))
    }

    /// Wrap a synchronous closure. It will be offloaded with `spawn_blocking`.
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(BlockingFnAgent(f)))
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, Self::Blocking(_))
    }
}

impl fmt::Debug for Executable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Async(_) => f.write_str("Executable::Async"),
            Self::Blocking(_) => f.write_str("Executable::Blocking"),
        }
    }
}

/// A unit of work submitted to the orchestrator.
#[derive(Debug, Clone)]
pub struct Task {
    /// Identifier, unique within one batch. Results are cached under it.
    pub name: String,
    /// Explicit input. `None` means "take the previous stage's output" in a
    /// pipeline and `null` everywhere else.
    pub input: Option<Value>,
    pub executable: Executable,
    pub metadata: Metadata,
}

impl Task {
    pub fn new(name: impl Into<String>, input: Value, executable: Executable) -> Self {
        Self {
            name: name.into(),
            input: Some(input),
            executable,
            metadata: Metadata::new(),
        }
    }

    /// A pipeline stage that consumes the output of the stage before it.
    pub fn stage(name: impl Into<String>, executable: Executable) -> Self {
        Self {
            name: name.into(),
            input: None,
            executable,
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Outcome of one task. Always structurally valid, whether or not the task succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_name: String,
    #[serde(default)]
    pub output: Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl TaskResult {
    pub fn success(task_name: impl Into<String>, output: Value, metadata: Metadata) -> Self {
        Self {
            task_name: task_name.into(),
            output,
            success: true,
            error: None,
            metadata,
        }
    }

    pub fn failure(task_name: impl Into<String>, error: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            task_name: task_name.into(),
            output: Value::Null,
            success: false,
            error: Some(error.into()),
            metadata,
        }
    }

    pub fn timed_out(task_name: impl Into<String>, metadata: Metadata) -> Self {
        Self::failure(task_name, TIMEOUT_ERROR, metadata)
    }

    pub fn is_timeout(&self) -> bool {
        self.error.as_deref() == Some(TIMEOUT_ERROR)
    }
}

/// How a set of agents is driven by `execute_agents`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Parallel,
    Sequential,
    MapReduce,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_async_closure_executable() {
        let exec = Executable::from_fn(|input: Value| async move {
            Ok::<_, anyhow::Error>(json!(format!("processed: {}", input.as_str().unwrap_or_default())))
        });
        assert!(!exec.is_blocking());

        let Executable::Async(agent) = exec else {
            panic!("expected async executable");
        };
        assert_eq!(agent.run(json!("data")).await.unwrap(), json!("processed: data"));
    }

    #[test]
    fn test_blocking_closure_executable() {
        let exec = Executable::blocking(|input: Value| Ok(json!(input.as_i64().unwrap_or(0) * 2)));
        assert!(exec.is_blocking());

        let Executable::Blocking(agent) = exec else {
            panic!("expected blocking executable");
        };
        assert_eq!(agent.run(json!(21)).unwrap(), json!(42));
    }

    #[test]
    fn test_task_result_json_shape() {
        let result = TaskResult::failure("step2", "boom", Metadata::new());
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["task_name"], "step2");
        assert_eq!(value["success"], false);
        assert_eq!(value["error"], "boom");
        assert_eq!(value["output"], Value::Null);

        let ok = TaskResult::success("a", json!(1), Metadata::new());
        let value = serde_json::to_value(&ok).unwrap();
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_timeout_result() {
        let result = TaskResult::timed_out("slow", Metadata::new());
        assert!(!result.success);
        assert!(result.is_timeout());
        assert!(result.error.unwrap().contains("Timeout"));
    }

    #[test]
    fn test_execution_mode_rejects_unknown() {
        let mode: ExecutionMode = serde_json::from_str("\"map_reduce\"").unwrap();
        assert_eq!(mode, ExecutionMode::MapReduce);
        assert!(serde_json::from_str::<ExecutionMode>("\"scatter\"").is_err());
    }

    #[test]
    fn test_stage_has_no_input() {
        let stage = Task::stage("s", Executable::blocking(|v| Ok(v))).with_metadata("owner", json!("ops"));
        assert!(stage.input.is_none());
        assert_eq!(stage.metadata["owner"], "ops");
    }
}
