//! Convenience re-exports for downstream users.

pub use crate::base::{
    FitnessDistribution, Generation, IndividualSex, Mutation, MutationId, MutationRegistry,
    MutationType, SubpopId, Substitution,
};
pub use crate::errors::{CallbackError, ConfigError, SimulationError, TypingError};
pub use crate::evolution::{
    BlockQuery, CallbackKind, Interpreter, MateChoiceOutcome, NullInterpreter, ScriptBlock, Value,
};
pub use crate::genome::{Chromosome, Genome, GenomeType, RecombinationMap};
pub use crate::simulation::{
    Population, SexOptions, Simulation, SimulationParams, Subpopulation,
};
