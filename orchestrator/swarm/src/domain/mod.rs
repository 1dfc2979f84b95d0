// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure value types for agent-to-agent messaging. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`message`] | `Message`, `MessageType`, `TaskStatus` |
//! | [`agent_card`] | `AgentCard` |

pub mod agent_card;
pub mod message;

pub use agent_card::*;
pub use message::*;
