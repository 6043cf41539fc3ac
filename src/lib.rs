//! Demesim: a forward-time Wright-Fisher population-genetics core.
//!
//! The crate advances subpopulations one discrete generation at a time:
//! offspring are produced by fitness-weighted parent sampling, parental
//! chromosomes recombine at drawn breakpoints, new mutations are registered
//! in a central arena, and mutations that reach fixation are converted into
//! compact substitution records. Scripted mate-choice, modify-child, and
//! fitness callbacks are mediated through an interpreter trait.

pub mod base;
pub mod errors;
pub mod evolution;
pub mod genome;
pub mod simulation;

pub mod prelude;

// Re-export commonly used types
pub use base::{IndividualSex, Mutation, MutationId, MutationRegistry, MutationType, Substitution};
pub use errors::SimulationError;
pub use genome::{Chromosome, Genome, GenomeType};
pub use simulation::{Population, Simulation, Subpopulation};
