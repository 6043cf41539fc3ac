//! Core leaf types: mutations, the mutation registry, substitutions, and
//! sampling helpers.

pub mod mutation;
pub mod registry;
pub mod sampling;
pub mod substitution;

pub use mutation::{FitnessDistribution, Mutation, MutationType};
pub use registry::{MutationId, MutationRegistry};
pub use substitution::Substitution;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a subpopulation, printed as `p<id>`.
pub type SubpopId = i32;

/// Discrete generation counter.
pub type Generation = i32;

/// Sex of an individual, or of a requested child.
///
/// Hermaphrodites exist only in models without sexes; individuals in
/// sex-enabled models are female or male.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndividualSex {
    Female,
    Male,
    Hermaphrodite,
}

impl fmt::Display for IndividualSex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Female => write!(f, "F"),
            Self::Male => write!(f, "M"),
            Self::Hermaphrodite => write!(f, "H"),
        }
    }
}
