//! Genomes: one haplotype of an individual.
//!
//! A [`Genome`] is an ordered, position-sorted sequence of non-owning
//! mutation handles, tagged by chromosome kind. A *null* genome represents a
//! strand that does not exist (for example the Y strand of an XX female);
//! it carries no mutations and must never be mutated.

use crate::base::{MutationId, MutationRegistry};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chromosome kind of a genome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenomeType {
    /// An autosome
    Autosome,
    /// An X chromosome
    XChromosome,
    /// A Y chromosome
    YChromosome,
}

impl fmt::Display for GenomeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Autosome => write!(f, "A"),
            Self::XChromosome => write!(f, "X"),
            Self::YChromosome => write!(f, "Y"),
        }
    }
}

/// One haplotype: an ordered list of mutation handles with a chromosome
/// kind tag.
///
/// Invariant: positions of the handles are non-decreasing, and the same
/// handle never appears twice at one position. `clear` never frees
/// mutations; the genome is non-owning.
#[derive(Debug, Clone)]
pub struct Genome {
    genome_type: GenomeType,
    is_null: bool,
    mutations: Vec<MutationId>,
}

impl Genome {
    /// Create an empty, non-null genome of the given kind.
    pub fn new(genome_type: GenomeType) -> Self {
        Self {
            genome_type,
            is_null: false,
            mutations: Vec::new(),
        }
    }

    /// Create a null genome of the given kind.
    pub fn new_null(genome_type: GenomeType) -> Self {
        Self {
            genome_type,
            is_null: true,
            mutations: Vec::new(),
        }
    }

    /// Chromosome kind of this genome.
    #[inline]
    pub fn genome_type(&self) -> GenomeType {
        self.genome_type
    }

    /// `true` if this strand does not physically exist.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.is_null
    }

    /// Number of mutation handles carried.
    #[inline]
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// `true` if the genome carries no mutations.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Borrow the mutation handles in position order.
    #[inline]
    pub fn mutations(&self) -> &[MutationId] {
        &self.mutations
    }

    /// The last mutation handle, if any.
    #[inline]
    pub fn back(&self) -> Option<MutationId> {
        self.mutations.last().copied()
    }

    /// Drop all handles. The referenced mutations are not freed.
    pub fn clear(&mut self) {
        self.mutations.clear();
    }

    /// Append a handle without any ordering checks.
    ///
    /// Used during crossover, where handles are produced in position order.
    #[inline]
    pub fn push(&mut self, id: MutationId) {
        debug_assert!(!self.is_null, "a null genome cannot carry mutations");
        self.mutations.push(id);
    }

    /// Insert a handle keeping position order.
    ///
    /// Scans backward from the tail; few handles are expected in the scratch
    /// genomes this is used for, so this is fast.
    pub fn insert_sorted(&mut self, id: MutationId, registry: &MutationRegistry) {
        debug_assert!(!self.is_null, "a null genome cannot carry mutations");

        let position = registry.get(id).position();
        let mut index = self.mutations.len();
        while index > 0 && registry.get(self.mutations[index - 1]).position() > position {
            index -= 1;
        }
        self.mutations.insert(index, id);
    }

    /// Replace this genome's handles with a copy of another genome's.
    ///
    /// Null strands may only be copied from null strands (a no-op).
    pub fn copy_from(&mut self, other: &Genome) {
        debug_assert_eq!(
            self.is_null,
            other.is_null,
            "null and non-null strands cannot copy into each other"
        );
        self.mutations.clear();
        self.mutations.extend_from_slice(&other.mutations);
    }

    /// Drop every handle whose mutation has fixed, i.e. whose reference
    /// count equals `total_genome_count`.
    pub fn remove_fixed(&mut self, registry: &MutationRegistry, total_genome_count: usize) {
        self.mutations
            .retain(|&id| registry.get(id).reference_count() as usize != total_genome_count);
    }
}
