// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod evolution;
pub mod genome;
pub mod repository;

pub use evolution::{EvolutionEvent, EvolutionEventType};
pub use genome::{FitnessMetrics, Genome, GenomeSpec, Mutation};
pub use repository::{GenomeRepository, RepositoryError};
