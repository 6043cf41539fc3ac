//! The generation loop.
//!
//! [`Simulation`] owns the population, the chromosome, the script blocks,
//! the interpreter, and the random stream, and advances them one discrete
//! generation per [`step`](Simulation::step). The core itself is
//! single-threaded and cooperative: the only suspension points are
//! interpreter calls, which run synchronously.

use crate::base::Generation;
use crate::errors::SimulationError;
use crate::evolution::{blocks_matching, BlockQuery, Interpreter, NullInterpreter, ScriptBlock};
use crate::genome::Chromosome;
use crate::simulation::{Population, SexOptions, SimulationParams};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::{debug, info};

/// A complete forward simulation.
pub struct Simulation {
    population: Population,
    chromosome: Chromosome,
    script_blocks: Vec<ScriptBlock>,
    interpreter: Box<dyn Interpreter>,
    params: SimulationParams,
    generation: Generation,
    rng: Xoshiro256PlusPlus,
}

impl Simulation {
    /// Create a simulation. The RNG is seeded from the parameters, or from
    /// entropy when no seed is given.
    pub fn new(
        chromosome: Chromosome,
        params: SimulationParams,
        sex: Option<SexOptions>,
        interpreter: Box<dyn Interpreter>,
    ) -> Self {
        let rng = match params.seed {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_seed(rand::rng().random()),
        };

        Self {
            population: Population::new(sex),
            chromosome,
            script_blocks: Vec::new(),
            interpreter,
            params,
            generation: 1,
            rng,
        }
    }

    /// A simulation without scripted callbacks.
    pub fn without_callbacks(
        chromosome: Chromosome,
        params: SimulationParams,
        sex: Option<SexOptions>,
    ) -> Self {
        Self::new(chromosome, params, sex, Box::new(NullInterpreter))
    }

    /// The population.
    #[inline]
    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Mutable access to the population, for setup between generations.
    pub fn population_mut(&mut self) -> &mut Population {
        &mut self.population
    }

    /// The chromosome collaborator.
    #[inline]
    pub fn chromosome(&self) -> &Chromosome {
        &self.chromosome
    }

    /// The current generation, starting at 1.
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Run parameters.
    #[inline]
    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    /// Mutable access to the random stream, for setup draws.
    pub fn rng_mut(&mut self) -> &mut Xoshiro256PlusPlus {
        &mut self.rng
    }

    /// Register a script block.
    pub fn add_script_block(&mut self, block: ScriptBlock) {
        self.script_blocks.push(block);
    }

    /// The registered script blocks.
    pub fn script_blocks(&self) -> &[ScriptBlock] {
        &self.script_blocks
    }

    /// Advance one generation: run due events, evolve every subpopulation,
    /// and swap generations.
    pub fn step(&mut self) -> Result<(), SimulationError> {
        let generation = self.generation;

        // events due this generation, evaluated for their side effects
        let events = blocks_matching(&self.script_blocks, generation, BlockQuery::Event, None);
        for block in events {
            if block.active {
                self.interpreter.evaluate(block, &[])?;
            }
        }

        // produce every subpopulation's children, with the callbacks
        // scoped to each target
        for id in self.population.subpop_ids() {
            let mate_choice =
                blocks_matching(&self.script_blocks, generation, BlockQuery::MateChoice, Some(id));
            let modify_child =
                blocks_matching(&self.script_blocks, generation, BlockQuery::ModifyChild, Some(id));

            self.population.evolve_subpopulation(
                id,
                &self.chromosome,
                generation,
                &mate_choice,
                &modify_child,
                self.interpreter.as_mut(),
                &mut self.rng,
            )?;
        }

        // swap, refreshing fitness with the callbacks for the next
        // generation
        let fitness =
            blocks_matching(&self.script_blocks, generation + 1, BlockQuery::Fitness, None);
        self.population
            .swap_generations(generation, &fitness, self.interpreter.as_mut())?;

        debug!(
            generation,
            mutations = self.population.registry().len(),
            substitutions = self.population.substitutions().len(),
            "generation complete"
        );
        self.generation += 1;
        Ok(())
    }

    /// Run for the configured number of generations.
    pub fn run(&mut self) -> Result<(), SimulationError> {
        info!(
            generations = self.params.total_generations,
            seed = ?self.params.seed,
            "starting simulation"
        );
        for _ in 0..self.params.total_generations {
            self.step()?;
        }
        Ok(())
    }

    /// Run for a specific number of generations.
    pub fn run_for(&mut self, generations: Generation) -> Result<(), SimulationError> {
        for _ in 0..generations {
            self.step()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{FitnessDistribution, MutationType};
    use crate::genome::RecombinationMap;

    fn neutral_simulation(mutation_rate: f64, seed: u64) -> Simulation {
        let mt = MutationType::new(1, 0.5, FitnessDistribution::Fixed(0.0));
        let chromosome = Chromosome::new(
            999,
            mutation_rate,
            RecombinationMap::uniform(999, 1e-4),
            vec![(mt, 1.0)],
        )
        .unwrap();
        Simulation::without_callbacks(chromosome, SimulationParams::new(10, Some(seed)), None)
    }

    #[test]
    fn test_step_advances_generation() {
        let mut sim = neutral_simulation(0.0, 42);
        sim.population_mut().add_subpopulation(1, 10, None).unwrap();

        assert_eq!(sim.generation(), 1);
        sim.step().unwrap();
        assert_eq!(sim.generation(), 2);
        assert!(!sim.population().child_generation_valid());
    }

    #[test]
    fn test_run_completes() {
        let mut sim = neutral_simulation(1e-4, 42);
        sim.population_mut().add_subpopulation(1, 20, None).unwrap();

        sim.run().unwrap();
        assert_eq!(sim.generation(), 11);
        assert_eq!(
            sim.population().subpopulation(1).unwrap().parent_subpop_size(),
            20
        );
    }

    #[test]
    fn test_mutations_accumulate_and_stay_bounded() {
        let mut sim = neutral_simulation(1e-3, 7);
        sim.population_mut().add_subpopulation(1, 10, None).unwrap();

        sim.run_for(5).unwrap();

        // every live mutation is carried by some strand but not by all
        let total = 20;
        for (_, mutation) in sim.population().registry().iter() {
            let references = mutation.reference_count() as usize;
            assert!(references > 0 && references < total);
        }
    }

    #[test]
    fn test_deterministic_with_seed() {
        let run = |seed| {
            let mut sim = neutral_simulation(1e-3, seed);
            sim.population_mut().add_subpopulation(1, 10, None).unwrap();
            sim.run_for(5).unwrap();
            let mut out = Vec::new();
            sim.population().print_all(&mut out).unwrap();
            out
        };

        assert_eq!(run(42), run(42));
        assert_ne!(run(42), run(43));
    }
}
