// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application
//!
//! Message routing and the bridge from bus agents to the task orchestrator.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** `MessageBus` operations and `BusAgent`

pub mod bus_agent;
pub mod message_bus;

pub use bus_agent::BusAgent;
pub use message_bus::{BusError, BusStats, MessageBus, MessageHandler};
