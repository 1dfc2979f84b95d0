// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `genesis-swarm`: Agent-to-Agent Messaging
//!
//! An in-process message bus through which registered agents exchange
//! [`Message`](domain::Message)s, discover each other by capability, and make
//! correlated request/response calls.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Message`, `MessageType`, `AgentCard` |
//! | [`application`] | Application | `MessageBus`, `MessageHandler`, `BusAgent` |
//!
//! ## Key Concepts
//!
//! - **Mailbox**: one unbounded FIFO per registered agent. Ordering holds per
//!   sender/receiver pair only.
//! - **Correlation**: a message whose `correlation_id` names an outstanding
//!   `request()` resolves that request directly and never enters a mailbox.
//! - **Message loop**: a single consumer per agent that feeds its mailbox to
//!   the installed handler and sends back whatever the handler returns.
//!
//! The bus is in-memory only. Mailbox contents are lost on shutdown.

pub mod domain;
pub mod application;

pub use domain::*;
