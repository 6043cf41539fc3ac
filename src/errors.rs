use std::error;
use std::fmt;
use std::io;

use crate::genome::GenomeType;
use crate::simulation::SubpopId;

/// Configuration errors raised by the population facade and by admission
/// checks on subpopulation parameters.
///
/// Every variant is fatal: the simulation state at the moment of the error
/// is not safe to continue from.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A subpopulation with this id already exists
    DuplicateSubpopulation(SubpopId),
    /// A subpopulation was created or resized with zero individuals
    EmptySubpopulation(SubpopId),
    /// An operation referenced a subpopulation id that does not exist
    UnknownSubpopulation(SubpopId),
    /// An admission-only operation was called while the child generation was valid
    ChildGenerationActive(&'static str),
    /// Selfing fraction outside [0, 1]
    SelfingFractionOutOfRange(f64),
    /// A non-zero selfing fraction was configured for a sex-enabled subpopulation
    SelfingWithSexes(SubpopId),
    /// Migration fraction outside [0, 1]
    MigrationFractionOutOfRange(f64),
    /// The migrant fractions of a subpopulation sum to more than 1
    ExcessMigration(SubpopId),
    /// The sex ratio would produce a child generation with only one sex
    UnisexualPopulation { subpop: SubpopId, sex_ratio: f64 },
    /// A sex-specific operation was applied to a subpopulation without sexes
    SexNotEnabled(SubpopId),
    /// Too few females in a mating group to satisfy the selfing quota
    InsufficientFemales { females: usize, demanded: usize },
    /// A Y-chromosome sample was requested from females
    FemaleSampleOfY(SubpopId),
    /// Chromosome parameters are malformed
    InvalidChromosome(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateSubpopulation(id) => {
                write!(f, "add_subpopulation: subpopulation p{id} already exists")
            }
            Self::EmptySubpopulation(id) => {
                write!(f, "add_subpopulation: subpopulation p{id} is empty")
            }
            Self::UnknownSubpopulation(id) => {
                write!(f, "no subpopulation p{id}")
            }
            Self::ChildGenerationActive(op) => {
                write!(f, "{op}: called while the child generation was valid")
            }
            Self::SelfingFractionOutOfRange(x) => {
                write!(f, "set_selfing: selfing fraction {x} must be within [0, 1]")
            }
            Self::SelfingWithSexes(id) => {
                write!(
                    f,
                    "set_selfing: subpopulation p{id} models sexes; selfing must be 0"
                )
            }
            Self::MigrationFractionOutOfRange(x) => {
                write!(
                    f,
                    "set_migration: migration fraction {x} must be within [0, 1]"
                )
            }
            Self::ExcessMigration(id) => {
                write!(f, "evolve_subpopulation: too many migrants in subpopulation p{id}")
            }
            Self::UnisexualPopulation { subpop, sex_ratio } => {
                write!(
                    f,
                    "subpopulation p{subpop}: sex ratio {sex_ratio} results in a unisexual population"
                )
            }
            Self::SexNotEnabled(id) => {
                write!(f, "subpopulation p{id} does not model sexes")
            }
            Self::InsufficientFemales { females, demanded } => {
                write!(
                    f,
                    "evolve_subpopulation: insufficient females {females} to satisfy selfing demand {demanded}"
                )
            }
            Self::FemaleSampleOfY(id) => {
                write!(
                    f,
                    "print_sample: called to output Y chromosomes from females of p{id}"
                )
            }
            Self::InvalidChromosome(msg) => {
                write!(f, "chromosome: {msg}")
            }
        }
    }
}

impl error::Error for ConfigError {}

/// Genetic-typing errors raised by the crossover engine when the child and
/// parental genome types are inconsistent.
#[derive(Debug, Clone, PartialEq)]
pub enum TypingError {
    /// Parent and child genome types cannot be reconciled
    ParentChildMismatch {
        child: GenomeType,
        parent1: GenomeType,
        parent2: GenomeType,
    },
    /// A hermaphrodite child was requested for a non-autosomal genome
    HermaphroditeSexChromosome,
    /// A female child was requested for a Y-chromosome genome
    FemaleYChromosome,
    /// The child genome is null but a source strand is not
    NullChildNonNullStrand,
    /// The child genome is non-null but a source strand is null
    NonNullChildNullStrand,
}

impl fmt::Display for TypingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParentChildMismatch {
                child,
                parent1,
                parent2,
            } => {
                write!(
                    f,
                    "crossover_mutation: mismatch between child genome type {child} and parent types ({parent1}, {parent2})"
                )
            }
            Self::HermaphroditeSexChromosome => {
                write!(
                    f,
                    "crossover_mutation: a hermaphrodite child is requested but the child genome is not autosomal"
                )
            }
            Self::FemaleYChromosome => {
                write!(
                    f,
                    "crossover_mutation: a female child is requested but the child genome is a Y chromosome"
                )
            }
            Self::NullChildNonNullStrand => {
                write!(
                    f,
                    "crossover_mutation: child genome is null but a chosen parental strand is not"
                )
            }
            Self::NonNullChildNullStrand => {
                write!(
                    f,
                    "crossover_mutation: child genome is non-null but a chosen parental strand is null"
                )
            }
        }
    }
}

impl error::Error for TypingError {}

/// Callback-protocol errors raised by the mediator when a scripted callback
/// returns something outside its contract, or when the interpreter itself
/// fails.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackError {
    /// mateChoice() returned a value that is neither null nor a float vector
    MateChoiceReturnType,
    /// mateChoice() returned a float vector of the wrong length
    MateChoiceLength { expected: usize, actual: usize },
    /// A weight returned by mateChoice() is not finite
    NonFiniteWeight(f64),
    /// A weight returned by mateChoice() is negative
    NegativeWeight(f64),
    /// The weights returned by mateChoice() sum to zero or less
    NonPositiveWeightSum(f64),
    /// modifyChild() did not return a logical singleton
    ModifyChildReturnType,
    /// fitness() did not return a float singleton
    FitnessReturnType,
    /// The external interpreter reported an error
    Interpreter(String),
}

impl fmt::Display for CallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MateChoiceReturnType => {
                write!(f, "mateChoice() callback: invalid return value")
            }
            Self::MateChoiceLength { expected, actual } => {
                write!(
                    f,
                    "mateChoice() callback: returned {actual} weights for a source of size {expected}"
                )
            }
            Self::NonFiniteWeight(x) => {
                write!(f, "mateChoice() callback: weight {x} is not finite")
            }
            Self::NegativeWeight(x) => {
                write!(f, "mateChoice() callback: weight {x} is less than 0.0")
            }
            Self::NonPositiveWeightSum(sum) => {
                write!(
                    f,
                    "mateChoice() callback: weights sum to {sum}, which is 0.0 or less"
                )
            }
            Self::ModifyChildReturnType => {
                write!(
                    f,
                    "modifyChild() callback: a logical singleton return value is required"
                )
            }
            Self::FitnessReturnType => {
                write!(
                    f,
                    "fitness() callback: a float singleton return value is required"
                )
            }
            Self::Interpreter(msg) => write!(f, "interpreter error: {msg}"),
        }
    }
}

impl error::Error for CallbackError {}

/// Top-level error for every fatal condition in the population core.
#[derive(Debug)]
pub enum SimulationError {
    Config(ConfigError),
    Typing(TypingError),
    Callback(CallbackError),
    Io(io::Error),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "configuration error: {e}"),
            Self::Typing(e) => write!(f, "genetic typing error: {e}"),
            Self::Callback(e) => write!(f, "callback protocol error: {e}"),
            Self::Io(e) => write!(f, "output error: {e}"),
        }
    }
}

impl error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Typing(e) => Some(e),
            Self::Callback(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<ConfigError> for SimulationError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<TypingError> for SimulationError {
    fn from(e: TypingError) -> Self {
        Self::Typing(e)
    }
}

impl From<CallbackError> for SimulationError {
    fn from(e: CallbackError) -> Self {
        Self::Callback(e)
    }
}

impl From<io::Error> for SimulationError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
