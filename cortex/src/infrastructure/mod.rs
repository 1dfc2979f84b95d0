// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod in_memory;
pub mod sled_store;

pub use in_memory::InMemoryGenomeRepository;
pub use sled_store::SledGenomeRepository;
