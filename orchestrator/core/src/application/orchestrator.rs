// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Task Orchestrator (Orchestration Context)
//!
//! Drives opaque [`Task`]s through three execution shapes:
//!
//! | Operation | Shape |
//! |---|---|
//! | [`TaskOrchestrator::execute_parallel`] | fan-out, bounded by a per-call semaphore, results in input order |
//! | [`TaskOrchestrator::execute_pipeline`] | strictly sequential, each output feeds the next stage |
//! | [`TaskOrchestrator::execute_map_reduce`] | parallel map over items, then a single reduce |
//!
//! Every task runs inside its own spawned tokio task, so an agent error or a
//! panic is recovered into a failed [`TaskResult`] and never reaches the
//! caller. Blocking agents are moved onto `spawn_blocking`, gated by an
//! orchestrator-wide permit pool.
//!
//! On a deadline, unfinished tasks are reported as `"Timeout exceeded"` and
//! their join handles are dropped. The task bodies keep running detached but
//! can no longer touch the result cache, which is written only at collection
//! time.

use chrono::Utc;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::config::OrchestratorConfig;
use crate::domain::events::{OrchestrationEvent, TaskEvent};
use crate::domain::task::{Executable, ExecutionMode, Metadata, Task, TaskResult};
use crate::infrastructure::event_bus::EventBus;

/// Task names used by [`TaskOrchestrator::execute_map_reduce_with`].
#[derive(Debug, Clone)]
pub struct MapReduceNames {
    /// Map tasks are named `{map_prefix}_{index}`.
    pub map_prefix: String,
    pub reduce: String,
}

impl Default for MapReduceNames {
    fn default() -> Self {
        Self {
            map_prefix: "map".to_string(),
            reduce: "reduce".to_string(),
        }
    }
}

/// Executes one task body. Cloned into every spawned task.
#[derive(Clone)]
struct TaskRunner {
    blocking_permits: Arc<Semaphore>,
    event_bus: Option<EventBus>,
}

impl TaskRunner {
    async fn run(&self, task: Task) -> TaskResult {
        let Task {
            name,
            input,
            executable,
            metadata,
        } = task;
        let input = input.unwrap_or(Value::Null);

        self.publish(TaskEvent::TaskStarted {
            task_name: name.clone(),
            blocking: executable.is_blocking(),
            started_at: Utc::now(),
        });

        let started = Instant::now();
        let outcome = match executable {
            Executable::Async(agent) => agent.run(input).await,
            Executable::Blocking(agent) => {
                match self.blocking_permits.clone().acquire_owned().await {
                    Ok(permit) => {
                        let joined = tokio::task::spawn_blocking(move || {
                            let _permit = permit;
                            agent.run(input)
                        })
                        .await;
                        match joined {
                            Ok(outcome) => outcome,
                            Err(e) => Err(anyhow::anyhow!(panic_message(e))),
                        }
                    }
                    Err(_) => Err(anyhow::anyhow!("Blocking pool is closed")),
                }
            }
        };
        let elapsed = started.elapsed();
        let duration_ms = elapsed.as_millis() as u64;

        metrics::histogram!("genesis_task_duration_seconds").record(elapsed.as_secs_f64());

        match outcome {
            Ok(output) => {
                debug!(task = %name, duration_ms, "Task completed");
                metrics::counter!("genesis_tasks_total", "outcome" => "success").increment(1);
                self.publish(TaskEvent::TaskCompleted {
                    task_name: name.clone(),
                    duration_ms,
                    completed_at: Utc::now(),
                });
                TaskResult::success(name, output, metadata)
            }
            Err(e) => {
                let error = format!("{:#}", e);
                warn!(task = %name, error = %error, "Task failed");
                metrics::counter!("genesis_tasks_total", "outcome" => "failure").increment(1);
                self.publish(TaskEvent::TaskFailed {
                    task_name: name.clone(),
                    error: error.clone(),
                    failed_at: Utc::now(),
                });
                TaskResult::failure(name, error, metadata)
            }
        }
    }

    fn publish(&self, event: TaskEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_task_event(event);
        }
    }
}

/// Coordinates parallel, pipeline and map-reduce execution of tasks.
pub struct TaskOrchestrator {
    max_concurrent: usize,
    default_timeout: Option<Duration>,
    runner: TaskRunner,
    results: Arc<DashMap<String, TaskResult>>,
}

impl TaskOrchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            default_timeout: config.default_timeout,
            runner: TaskRunner {
                blocking_permits: Arc::new(Semaphore::new(config.max_blocking.max(1))),
                event_bus: None,
            },
            results: Arc::new(DashMap::new()),
        }
    }

    /// Publish task and batch lifecycle events on `event_bus`.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.runner.event_bus = Some(event_bus);
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Run all tasks concurrently, at most `max_concurrent` at a time.
    ///
    /// The returned vector has one entry per task, in input order. When
    /// `timeout` (or the configured default) elapses, tasks that have not
    /// finished are reported as timed out while finished ones keep their
    /// real results.
    pub async fn execute_parallel(&self, tasks: Vec<Task>, timeout: Option<Duration>) -> Vec<TaskResult> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let batch_id = Uuid::new_v4();
        let task_count = tasks.len();
        info!(batch_id = %batch_id, task_count, max_concurrent = self.max_concurrent, "Starting parallel batch");
        self.publish_batch(OrchestrationEvent::BatchStarted {
            batch_id,
            mode: ExecutionMode::Parallel,
            task_count,
            started_at: Utc::now(),
        });

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles: Vec<(String, Metadata, JoinHandle<TaskResult>)> = Vec::with_capacity(task_count);

        for task in tasks {
            let name = task.name.clone();
            let metadata = task.metadata.clone();
            let semaphore = semaphore.clone();
            let runner = self.runner.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return TaskResult::failure(task.name, "Concurrency limiter closed", task.metadata),
                };
                runner.run(task).await
            });
            handles.push((name, metadata, handle));
        }

        let timeout = timeout.or(self.default_timeout);
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);
        let mut expired = false;
        let mut results = Vec::with_capacity(task_count);

        for (name, metadata, mut handle) in handles {
            let joined = match deadline {
                None => Some(handle.await),
                Some(_) if expired => {
                    if handle.is_finished() {
                        Some(handle.await)
                    } else {
                        None
                    }
                }
                Some(deadline) => match tokio::time::timeout_at(deadline, &mut handle).await {
                    Ok(joined) => Some(joined),
                    Err(_) => {
                        expired = true;
                        None
                    }
                },
            };

            let result = match joined {
                Some(Ok(result)) => result,
                Some(Err(e)) => {
                    let error = panic_message(e);
                    warn!(task = %name, error = %error, "Task panicked");
                    metrics::counter!("genesis_tasks_total", "outcome" => "panic").increment(1);
                    TaskResult::failure(name.clone(), error, metadata)
                }
                None => {
                    let timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
                    warn!(task = %name, timeout_ms, "Task exceeded batch deadline");
                    metrics::counter!("genesis_tasks_total", "outcome" => "timeout").increment(1);
                    self.runner.publish(TaskEvent::TaskTimedOut {
                        task_name: name.clone(),
                        timeout_ms,
                        timed_out_at: Utc::now(),
                    });
                    TaskResult::timed_out(name.clone(), metadata)
                }
            };

            self.results.insert(name, result.clone());
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.success).count();
        info!(batch_id = %batch_id, succeeded, failed = task_count - succeeded, "Parallel batch finished");
        self.publish_batch(OrchestrationEvent::BatchCompleted {
            batch_id,
            mode: ExecutionMode::Parallel,
            succeeded,
            failed: task_count - succeeded,
            completed_at: Utc::now(),
        });

        results
    }

    /// Run tasks one after another, threading each output into the next stage.
    ///
    /// Stops at the first failure and returns that stage's result. On success
    /// returns a synthetic `"pipeline"` result whose `metadata.steps` lists
    /// the stage names in order.
    pub async fn execute_pipeline(&self, tasks: Vec<Task>, initial_input: Value) -> TaskResult {
        let batch_id = Uuid::new_v4();
        let task_count = tasks.len();
        self.publish_batch(OrchestrationEvent::BatchStarted {
            batch_id,
            mode: ExecutionMode::Sequential,
            task_count,
            started_at: Utc::now(),
        });

        let mut current = initial_input;
        let mut steps = Vec::with_capacity(task_count);

        for mut task in tasks {
            task.input.get_or_insert_with(|| mem::take(&mut current));
            steps.push(task.name.clone());

            let result = self.run_isolated(task).await;
            self.results.insert(result.task_name.clone(), result.clone());

            if !result.success {
                info!(batch_id = %batch_id, stage = %result.task_name, "Pipeline stopped at failing stage");
                self.publish_batch(OrchestrationEvent::BatchCompleted {
                    batch_id,
                    mode: ExecutionMode::Sequential,
                    succeeded: steps.len() - 1,
                    failed: 1,
                    completed_at: Utc::now(),
                });
                return result;
            }
            current = result.output;
        }

        self.publish_batch(OrchestrationEvent::BatchCompleted {
            batch_id,
            mode: ExecutionMode::Sequential,
            succeeded: task_count,
            failed: 0,
            completed_at: Utc::now(),
        });

        let mut metadata = Metadata::new();
        metadata.insert("steps".to_string(), json!(steps));
        TaskResult::success("pipeline", current, metadata)
    }

    /// Map `map` over every item in parallel, then reduce the outputs once.
    pub async fn execute_map_reduce(&self, items: Vec<Value>, map: Executable, reduce: Executable) -> TaskResult {
        self.execute_map_reduce_with(items, map, reduce, MapReduceNames::default())
            .await
    }

    pub async fn execute_map_reduce_with(
        &self,
        items: Vec<Value>,
        map: Executable,
        reduce: Executable,
        names: MapReduceNames,
    ) -> TaskResult {
        let map_tasks = items
            .into_iter()
            .enumerate()
            .map(|(i, item)| Task::new(format!("{}_{}", names.map_prefix, i), item, map.clone()))
            .collect();

        let mapped = self.execute_parallel(map_tasks, None).await;

        let failed = mapped.iter().filter(|r| !r.success).count();
        if failed > 0 {
            warn!(failed, "Map phase failed, skipping reduce");
            return TaskResult::failure(
                names.reduce,
                format!("Map phase failed: {} tasks failed", failed),
                Metadata::new(),
            );
        }

        let outputs = Value::Array(mapped.into_iter().map(|r| r.output).collect());
        let result = self.run_isolated(Task::new(names.reduce, outputs, reduce)).await;
        self.results.insert(result.task_name.clone(), result.clone());
        result
    }

    /// Run a named set of executables over one shared input.
    ///
    /// `Parallel` gives every agent the same input. `Sequential` chains each
    /// output into the next agent and stops after the first failure, so the
    /// returned vector may be shorter than `agents`. `MapReduce` needs
    /// separate map and reduce bodies and is rejected per agent.
    pub async fn execute_agents(
        &self,
        agents: Vec<(String, Executable)>,
        input: Value,
        mode: ExecutionMode,
        timeout: Option<Duration>,
    ) -> Vec<TaskResult> {
        match mode {
            ExecutionMode::Parallel => {
                let tasks = agents
                    .into_iter()
                    .map(|(name, executable)| Task::new(name, input.clone(), executable))
                    .collect();
                self.execute_parallel(tasks, timeout).await
            }
            ExecutionMode::Sequential => {
                let mut results = Vec::with_capacity(agents.len());
                let mut current = input;
                for (name, executable) in agents {
                    let result = self.run_isolated(Task::new(name, current, executable)).await;
                    self.results.insert(result.task_name.clone(), result.clone());
                    let success = result.success;
                    current = result.output.clone();
                    results.push(result);
                    if !success {
                        break;
                    }
                }
                results
            }
            ExecutionMode::MapReduce => agents
                .into_iter()
                .map(|(name, _)| {
                    TaskResult::failure(
                        name,
                        "map_reduce mode is not supported by execute_agents; use execute_map_reduce",
                        Metadata::new(),
                    )
                })
                .collect(),
        }
    }

    /// Cached result of the most recent task with this name.
    pub fn get_result(&self, task_name: &str) -> Option<TaskResult> {
        self.results.get(task_name).map(|entry| entry.value().clone())
    }

    pub fn clear_results(&self) {
        self.results.clear();
    }

    /// Spawn one task and wait for it, turning a panic into a failed result.
    async fn run_isolated(&self, task: Task) -> TaskResult {
        let name = task.name.clone();
        let metadata = task.metadata.clone();
        let runner = self.runner.clone();

        match tokio::spawn(async move { runner.run(task).await }).await {
            Ok(result) => result,
            Err(e) => {
                let error = panic_message(e);
                warn!(task = %name, error = %error, "Task panicked");
                TaskResult::failure(name, error, metadata)
            }
        }
    }

    fn publish_batch(&self, event: OrchestrationEvent) {
        if let Some(bus) = &self.runner.event_bus {
            bus.publish_orchestration_event(event);
        }
    }
}

impl Default for TaskOrchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

/// Run `executables` in parallel on a default orchestrator. Tasks are named
/// `task_{i}`; a missing input is `null`.
pub async fn run_parallel(
    executables: Vec<Executable>,
    inputs: Option<Vec<Value>>,
    timeout: Option<Duration>,
) -> Vec<TaskResult> {
    let inputs = inputs.unwrap_or_default();
    let tasks = executables
        .into_iter()
        .enumerate()
        .map(|(i, executable)| {
            let input = inputs.get(i).cloned().unwrap_or(Value::Null);
            Task::new(format!("task_{}", i), input, executable)
        })
        .collect();

    TaskOrchestrator::default().execute_parallel(tasks, timeout).await
}

/// Run `executables` as a pipeline on a default orchestrator. Stages are
/// named `step_{i}`.
pub async fn run_pipeline(executables: Vec<Executable>, initial_input: Value) -> TaskResult {
    let tasks = executables
        .into_iter()
        .enumerate()
        .map(|(i, executable)| Task::stage(format!("step_{}", i), executable))
        .collect();

    TaskOrchestrator::default()
        .execute_pipeline(tasks, initial_input)
        .await
}

fn panic_message(error: JoinError) -> String {
    if error.is_cancelled() {
        return "Task was cancelled".to_string();
    }

    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("Task panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("Task panicked: {}", message)
    } else {
        "Task panicked".to_string()
    }
}
