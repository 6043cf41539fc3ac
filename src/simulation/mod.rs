//! The simulation layer: subpopulations, the population facade, mating,
//! generation swaps, dumps, and the generation loop.

pub mod engine;
pub mod generation;
pub mod mating;
pub mod output;
pub mod parameters;
pub mod population;
pub mod subpopulation;

pub use engine::Simulation;
pub use output::Polymorphism;
pub use parameters::{SexOptions, SimulationParams};
pub use population::Population;
pub use subpopulation::Subpopulation;

pub use crate::base::{Generation, SubpopId};
