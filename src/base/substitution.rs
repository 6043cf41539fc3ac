//! Substitution records for fixed mutations.

use crate::base::{Generation, Mutation, MutationType, SubpopId};
use std::sync::Arc;

/// A snapshot of a mutation at the moment it reached 100% frequency.
///
/// Created only by the generation swapper; lives until simulation end.
#[derive(Debug, Clone)]
pub struct Substitution {
    mutation_type: Arc<MutationType>,
    position: i64,
    selection_coeff: f64,
    subpop_origin: SubpopId,
    origin_generation: Generation,
    fixation_generation: Generation,
}

impl Substitution {
    /// Snapshot a fixed mutation.
    pub fn new(mutation: &Mutation, fixation_generation: Generation) -> Self {
        Self {
            mutation_type: Arc::clone(mutation.mutation_type()),
            position: mutation.position(),
            selection_coeff: mutation.selection_coeff(),
            subpop_origin: mutation.subpop_origin(),
            origin_generation: mutation.origin_generation(),
            fixation_generation,
        }
    }

    /// The mutation type of the fixed mutation.
    #[inline]
    pub fn mutation_type(&self) -> &Arc<MutationType> {
        &self.mutation_type
    }

    /// Position on the chromosome.
    #[inline]
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Selection coefficient of the fixed mutation.
    #[inline]
    pub fn selection_coeff(&self) -> f64 {
        self.selection_coeff
    }

    /// Subpopulation the mutation arose in.
    #[inline]
    pub fn subpop_origin(&self) -> SubpopId {
        self.subpop_origin
    }

    /// Generation the mutation arose in.
    #[inline]
    pub fn origin_generation(&self) -> Generation {
        self.origin_generation
    }

    /// Generation the mutation fixed in.
    #[inline]
    pub fn fixation_generation(&self) -> Generation {
        self.fixation_generation
    }
}
