// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod genome_store;

pub use genome_store::{GenomeStore, GenomeStoreError, DEFAULT_HISTORY_LIMIT};
