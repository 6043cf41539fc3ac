//! Mutations and mutation types.
//!
//! A [`Mutation`] is a single heritable change at an integer position on the
//! chromosome. Mutations are owned exclusively by the
//! [`MutationRegistry`](crate::base::MutationRegistry); genomes hold
//! non-owning [`MutationId`](crate::base::MutationId) handles. A mutation is
//! immutable after construction except for its reference count, which the
//! generation swapper rewrites every generation.

use crate::base::{Generation, SubpopId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Distribution of fitness effects for a mutation type.
///
/// Selection coefficients are drawn once, at mutation construction. A
/// negative `mean` is allowed for the exponential and gamma forms and yields
/// negative (deleterious) coefficients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FitnessDistribution {
    /// Every draw returns the same coefficient
    Fixed(f64),
    /// Exponentially distributed with the given mean
    Exponential { mean: f64 },
    /// Gamma distributed with the given mean and shape
    Gamma { mean: f64, shape: f64 },
}

impl FitnessDistribution {
    /// Draw one selection coefficient.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match *self {
            Self::Fixed(s) => s,
            Self::Exponential { mean } => {
                // -mean * ln(U) with U in (0, 1]; the sign of the mean
                // carries through to the draw.
                let u: f64 = 1.0 - rng.random::<f64>();
                -mean * u.ln()
            }
            Self::Gamma { mean, shape } => {
                use rand_distr::{Distribution, Gamma};

                let scale = (mean / shape).abs();
                let gamma = Gamma::new(shape, scale)
                    .expect("gamma shape and scale are validated at construction");
                let draw = gamma.sample(rng);
                if mean < 0.0 { -draw } else { draw }
            }
        }
    }
}

/// A mutation type: shared, immutable description of a class of mutations.
///
/// The dominance coefficient scales the fitness effect in heterozygotes;
/// the distribution of fitness effects supplies selection coefficients for
/// newly arising mutations of this type.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationType {
    /// Numeric identifier, printed as `m<id>` in dumps
    id: i32,
    /// Dominance coefficient applied to heterozygous carriers
    dominance_coeff: f64,
    /// Distribution new selection coefficients are drawn from
    dfe: FitnessDistribution,
}

impl MutationType {
    /// Create a new mutation type.
    ///
    /// # Panics
    /// Panics if a gamma DFE is given a non-positive shape; gamma shapes
    /// must be validated by the caller.
    pub fn new(id: i32, dominance_coeff: f64, dfe: FitnessDistribution) -> Arc<Self> {
        if let FitnessDistribution::Gamma { shape, .. } = dfe {
            assert!(shape > 0.0, "gamma DFE shape must be positive");
        }
        Arc::new(Self {
            id,
            dominance_coeff,
            dfe,
        })
    }

    /// Numeric identifier of this type.
    #[inline]
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Dominance coefficient for heterozygous carriers.
    #[inline]
    pub fn dominance_coeff(&self) -> f64 {
        self.dominance_coeff
    }

    /// Draw a selection coefficient from this type's DFE.
    #[inline]
    pub fn draw_selection_coeff<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.dfe.draw(rng)
    }
}

/// A single mutation, owned by the registry.
#[derive(Debug, Clone)]
pub struct Mutation {
    /// Mutation type; dictates dominance and DFE identity
    mutation_type: Arc<MutationType>,
    /// Position on the chromosome
    position: i64,
    /// Selection coefficient, drawn at construction
    selection_coeff: f64,
    /// Subpopulation the mutation arose in
    subpop_origin: SubpopId,
    /// Generation the mutation arose in
    origin_generation: Generation,
    /// Number of handles in the canonical genome bank that point at this
    /// mutation; rewritten by the tally pass each generation
    reference_count: u32,
}

impl Mutation {
    /// Create a new mutation with a zero reference count.
    pub fn new(
        mutation_type: Arc<MutationType>,
        position: i64,
        selection_coeff: f64,
        subpop_origin: SubpopId,
        origin_generation: Generation,
    ) -> Self {
        Self {
            mutation_type,
            position,
            selection_coeff,
            subpop_origin,
            origin_generation,
            reference_count: 0,
        }
    }

    /// The mutation type of this mutation.
    #[inline]
    pub fn mutation_type(&self) -> &Arc<MutationType> {
        &self.mutation_type
    }

    /// Position on the chromosome.
    #[inline]
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Selection coefficient.
    #[inline]
    pub fn selection_coeff(&self) -> f64 {
        self.selection_coeff
    }

    /// Subpopulation of origin.
    #[inline]
    pub fn subpop_origin(&self) -> SubpopId {
        self.subpop_origin
    }

    /// Generation of origin.
    #[inline]
    pub fn origin_generation(&self) -> Generation {
        self.origin_generation
    }

    /// Current reference count.
    #[inline]
    pub fn reference_count(&self) -> u32 {
        self.reference_count
    }

    /// Reset the reference count to zero.
    #[inline]
    pub(crate) fn zero_reference_count(&mut self) {
        self.reference_count = 0;
    }

    /// Increment the reference count by one.
    #[inline]
    pub(crate) fn increment_reference_count(&mut self) {
        self.reference_count += 1;
    }

    /// Two mutations are the same polymorphism if they share position,
    /// mutation type, and selection coefficient.
    pub fn same_polymorphism(&self, other: &Mutation) -> bool {
        self.position == other.position
            && self.mutation_type.id() == other.mutation_type.id()
            && self.selection_coeff == other.selection_coeff
    }
}
