// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Task value types, lifecycle events and the configuration manifest.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Types shared by the orchestrator, the swarm and the CLI

pub mod config;
pub mod events;
pub mod task;
