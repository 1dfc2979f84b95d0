// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! GENESIS Core
//!
//! Task orchestration for agent workloads: parallel fan-out, pipelines and
//! map-reduce over opaque [`Agent`](domain::task::Agent)s.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Orchestration engine and shared configuration

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
