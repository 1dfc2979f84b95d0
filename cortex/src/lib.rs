// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Cortex: genetic memory for agents
//!
//! Stores every version of an agent definition (its genome), the lineage
//! between agents, fitness metrics, and an append-only evolution history.
//!
//! - [`domain`]: genome, mutation and evolution event types, repository trait
//! - [`infrastructure`]: in-memory and sled repositories
//! - [`application`]: [`GenomeStore`], the public facade

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{GenomeStore, GenomeStoreError};
pub use domain::*;
pub use infrastructure::*;
