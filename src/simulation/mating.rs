//! The mating scheduler: producing a subpopulation's child generation.
//!
//! Offspring are split by a multinomial draw into migrant groups (one per
//! source in the migrant map, in map order) and a native group, generated
//! last. Within each group, females are generated before males when sexes
//! are modeled. Child indices in the bank are therefore deterministic given
//! the random stream.
//!
//! Each child repeats a draw loop: the first parent comes from the source's
//! fitness-weighted draw, the second from the selfing quota, the
//! mate-choice chain, or a direct fitness draw. A mate-choice redraw
//! restarts the loop with a fresh first parent; a modify-child rejection
//! discards the finished child without consuming the selfing slot or
//! advancing any counter.

use crate::base::{sampling, Generation, IndividualSex, MutationRegistry, SubpopId};
use crate::errors::{ConfigError, SimulationError};
use crate::evolution::{
    apply_mate_choice_callbacks, apply_modify_child_callbacks, crossover_mutation, Interpreter,
    MateChoiceOutcome, MateChoiceSource, ModifyChildContext, ScriptBlock,
};
use crate::genome::{Chromosome, Genome};
use crate::simulation::{Population, Subpopulation};
use rand::Rng;

/// Read-only view of the subpopulation offspring are drawn from.
///
/// Holding the parent bank and fitness tables by slice keeps the target's
/// child bank free for writing even when a subpopulation mates with itself.
#[derive(Clone, Copy)]
struct MatingSource<'a> {
    id: SubpopId,
    parent_count: usize,
    parent_genomes: &'a [Genome],
    selfing_fraction: f64,
    parental_fitness: &'a [f64],
    female_fitness: &'a [f64],
    male_fitness: &'a [f64],
    parental_total: f64,
    female_total: f64,
    male_total: f64,
}

impl<'a> MatingSource<'a> {
    fn from_subpop(subpop: &'a Subpopulation) -> Self {
        Self {
            id: subpop.id(),
            parent_count: subpop.parent_subpop_size,
            parent_genomes: &subpop.parent_genomes,
            selfing_fraction: subpop.selfing_fraction,
            parental_fitness: &subpop.cached_parental_fitness,
            female_fitness: &subpop.cached_female_fitness,
            male_fitness: &subpop.cached_male_fitness,
            parental_total: subpop.parental_total_fitness,
            female_total: subpop.female_total_fitness,
            male_total: subpop.male_total_fitness,
        }
    }

    fn draw_parent<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        sampling::weighted_index(self.parental_fitness, self.parental_total, rng)
    }

    fn draw_female<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        sampling::weighted_index(self.female_fitness, self.female_total, rng)
    }

    fn draw_male<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        sampling::weighted_index(self.male_fitness, self.male_total, rng)
    }

    fn mate_choice_source(&self, sex_enabled: bool) -> MateChoiceSource<'a> {
        if sex_enabled {
            MateChoiceSource {
                subpop_id: self.id,
                parent_count: self.parent_count,
                weights: self.male_fitness,
                weights_total: self.male_total,
            }
        } else {
            MateChoiceSource {
                subpop_id: self.id,
                parent_count: self.parent_count,
                weights: self.parental_fitness,
                weights_total: self.parental_total,
            }
        }
    }
}

/// Child placement counters, shared across all groups of one subpopulation
/// so bank positions stay deterministic.
#[derive(Debug, Default)]
struct ChildCounters {
    child: usize,
    female: usize,
    male: usize,
}

impl Population {
    /// Produce the complete child bank of one subpopulation.
    ///
    /// Draws the migrant split, generates each migrant group and then the
    /// native group, and marks the child generation valid on success.
    #[allow(clippy::too_many_arguments)]
    pub fn evolve_subpopulation<R: Rng + ?Sized>(
        &mut self,
        subpop_id: SubpopId,
        chromosome: &Chromosome,
        generation: Generation,
        mate_choice_callbacks: &[&ScriptBlock],
        modify_child_callbacks: &[&ScriptBlock],
        interpreter: &mut dyn Interpreter,
        rng: &mut R,
    ) -> Result<(), SimulationError> {
        let mut subpop = self
            .subpops
            .remove(&subpop_id)
            .ok_or(ConfigError::UnknownSubpopulation(subpop_id))?;

        let result = evolve_removed(
            self,
            &mut subpop,
            chromosome,
            generation,
            mate_choice_callbacks,
            modify_child_callbacks,
            interpreter,
            rng,
        );

        if result.is_ok() {
            subpop.child_generation_valid = true;
            self.child_generation_valid = true;
        }
        self.subpops.insert(subpop_id, subpop);
        result
    }
}

#[allow(clippy::too_many_arguments)]
fn evolve_removed<R: Rng + ?Sized>(
    population: &mut Population,
    subpop: &mut Subpopulation,
    chromosome: &Chromosome,
    generation: Generation,
    mate_choice_callbacks: &[&ScriptBlock],
    modify_child_callbacks: &[&ScriptBlock],
    interpreter: &mut dyn Interpreter,
    rng: &mut R,
) -> Result<(), SimulationError> {
    let target_id = subpop.id();
    let sex_enabled = subpop.sex_enabled();
    let total_children = subpop.child_subpop_size;
    let sex_ratio = subpop.child_sex_ratio;

    if sex_enabled {
        // both sexes must be represented among the children
        subpop.child_sex_counts()?;
    }

    // the migrant split: one weight per source plus the within-population
    // remainder
    let migrant_sources: Vec<(SubpopId, f64)> = subpop
        .migrant_fractions
        .iter()
        .map(|(&id, &fraction)| (id, fraction))
        .collect();
    let migration_rate_sum: f64 = migrant_sources.iter().map(|(_, f)| f).sum();
    if migration_rate_sum > 1.0 {
        return Err(ConfigError::ExcessMigration(target_id).into());
    }
    let mut rates: Vec<f64> = migrant_sources.iter().map(|&(_, f)| f).collect();
    rates.push(1.0 - migration_rate_sum);
    let group_counts = sampling::multinomial(total_children, &rates, rng);

    let target_first_male = subpop.child_first_male_index;

    // split the population and the target subpopulation into disjoint
    // pieces: the child bank is written while parent banks, fitness tables
    // and the registry are used alongside it
    let Population {
        subpops, registry, ..
    } = population;
    let subpops = &*subpops;

    let Subpopulation {
        parent_genomes,
        child_genomes,
        cached_parental_fitness,
        cached_female_fitness,
        cached_male_fitness,
        parental_total_fitness,
        female_total_fitness,
        male_total_fitness,
        parent_subpop_size,
        selfing_fraction,
        ..
    } = subpop;

    let native = MatingSource {
        id: target_id,
        parent_count: *parent_subpop_size,
        parent_genomes,
        selfing_fraction: *selfing_fraction,
        parental_fitness: cached_parental_fitness,
        female_fitness: cached_female_fitness,
        male_fitness: cached_male_fitness,
        parental_total: *parental_total_fitness,
        female_total: *female_total_fitness,
        male_total: *male_total_fitness,
    };

    let mut counters = ChildCounters::default();

    // migrant groups in map order, then the native group
    for (group_index, &group_count) in group_counts.iter().enumerate() {
        let source = if group_index < migrant_sources.len() {
            let (source_id, _) = migrant_sources[group_index];
            if source_id == target_id {
                native
            } else {
                MatingSource::from_subpop(
                    subpops
                        .get(&source_id)
                        .ok_or(ConfigError::UnknownSubpopulation(source_id))?,
                )
            }
        } else {
            native
        };

        generate_group(
            source,
            group_count,
            sex_enabled.then(|| {
                let males = (group_count as f64 * sex_ratio).round() as usize;
                (group_count - males, males)
            }),
            target_id,
            target_first_male,
            child_genomes,
            &mut counters,
            chromosome,
            generation,
            mate_choice_callbacks,
            modify_child_callbacks,
            interpreter,
            registry,
            rng,
        )?;
    }

    Ok(())
}

/// Generate one offspring group (migrants from one source, or natives).
#[allow(clippy::too_many_arguments)]
fn generate_group<R: Rng + ?Sized>(
    source: MatingSource<'_>,
    group_count: usize,
    sex_split: Option<(usize, usize)>,
    target_id: SubpopId,
    target_first_male: usize,
    child_genomes: &mut [Genome],
    counters: &mut ChildCounters,
    chromosome: &Chromosome,
    generation: Generation,
    mate_choice_callbacks: &[&ScriptBlock],
    modify_child_callbacks: &[&ScriptBlock],
    interpreter: &mut dyn Interpreter,
    registry: &mut MutationRegistry,
    rng: &mut R,
) -> Result<(), SimulationError> {
    // the selfing quota of this group comes from the *source's* fraction
    let mut number_to_self = (group_count as f64 * source.selfing_fraction).round() as usize;

    let Some((female_count, male_count)) = sex_split else {
        // no sexes: one flat loop of hermaphrodite children
        let mut generated = 0usize;
        while generated < group_count {
            let child_index = counters.child;
            let (parent1, parent2, selfed) = loop {
                let parent1 = source.draw_parent(rng);
                if number_to_self > 0 {
                    break (parent1, parent1, true);
                }
                if !mate_choice_callbacks.is_empty() {
                    match apply_mate_choice_callbacks(
                        parent1,
                        target_id,
                        &source.mate_choice_source(false),
                        mate_choice_callbacks,
                        interpreter,
                        rng,
                    )? {
                        MateChoiceOutcome::Parent(parent2) => break (parent1, parent2, false),
                        MateChoiceOutcome::Redraw => continue,
                    }
                }
                // the direct draw does not prohibit drawing parent1 again
                break (parent1, source.draw_parent(rng), false);
            };

            build_child(
                child_genomes,
                &source,
                child_index,
                parent1,
                parent2,
                IndividualSex::Hermaphrodite,
                chromosome,
                generation,
                registry,
                rng,
            )?;

            if !modify_child_callbacks.is_empty() {
                let context = ModifyChildContext {
                    child_index,
                    child_is_female: None,
                    parent1_index: parent1,
                    parent2_index: parent2,
                    is_selfing: selfed,
                    subpop: target_id,
                    source_subpop: source.id,
                };
                if !apply_modify_child_callbacks(&context, modify_child_callbacks, interpreter)? {
                    continue;
                }
            }

            if selfed {
                number_to_self -= 1;
            }
            generated += 1;
            counters.child += 1;
        }
        return Ok(());
    };

    if female_count < number_to_self {
        return Err(ConfigError::InsufficientFemales {
            females: female_count,
            demanded: number_to_self,
        }
        .into());
    }

    // females first
    let mut generated = 0usize;
    while generated < female_count {
        let child_index = counters.female;
        let (parent1, parent2, selfed) = loop {
            let parent1 = source.draw_female(rng);
            if number_to_self > 0 {
                break (parent1, parent1, true);
            }
            if !mate_choice_callbacks.is_empty() {
                match apply_mate_choice_callbacks(
                    parent1,
                    target_id,
                    &source.mate_choice_source(true),
                    mate_choice_callbacks,
                    interpreter,
                    rng,
                )? {
                    MateChoiceOutcome::Parent(parent2) => break (parent1, parent2, false),
                    MateChoiceOutcome::Redraw => continue,
                }
            }
            break (parent1, source.draw_male(rng), false);
        };

        build_child(
            child_genomes,
            &source,
            child_index,
            parent1,
            parent2,
            IndividualSex::Female,
            chromosome,
            generation,
            registry,
            rng,
        )?;

        if !modify_child_callbacks.is_empty() {
            let context = ModifyChildContext {
                child_index,
                child_is_female: Some(true),
                parent1_index: parent1,
                parent2_index: parent2,
                is_selfing: selfed,
                subpop: target_id,
                source_subpop: source.id,
            };
            if !apply_modify_child_callbacks(&context, modify_child_callbacks, interpreter)? {
                continue;
            }
        }

        if selfed {
            number_to_self -= 1;
        }
        generated += 1;
        counters.female += 1;
    }

    // then males; selfing cannot produce a male child
    while generated < female_count + male_count {
        let child_index = target_first_male + counters.male;
        let (parent1, parent2) = loop {
            let parent1 = source.draw_female(rng);
            if !mate_choice_callbacks.is_empty() {
                match apply_mate_choice_callbacks(
                    parent1,
                    target_id,
                    &source.mate_choice_source(true),
                    mate_choice_callbacks,
                    interpreter,
                    rng,
                )? {
                    MateChoiceOutcome::Parent(parent2) => break (parent1, parent2),
                    MateChoiceOutcome::Redraw => continue,
                }
            }
            break (parent1, source.draw_male(rng));
        };

        build_child(
            child_genomes,
            &source,
            child_index,
            parent1,
            parent2,
            IndividualSex::Male,
            chromosome,
            generation,
            registry,
            rng,
        )?;

        if !modify_child_callbacks.is_empty() {
            let context = ModifyChildContext {
                child_index,
                child_is_female: Some(false),
                parent1_index: parent1,
                parent2_index: parent2,
                is_selfing: false,
                subpop: target_id,
                source_subpop: source.id,
            };
            if !apply_modify_child_callbacks(&context, modify_child_callbacks, interpreter)? {
                continue;
            }
        }

        generated += 1;
        counters.male += 1;
    }

    Ok(())
}

/// Build both strands of one child via the crossover engine.
#[allow(clippy::too_many_arguments)]
fn build_child<R: Rng + ?Sized>(
    child_genomes: &mut [Genome],
    source: &MatingSource<'_>,
    child_index: usize,
    parent1: usize,
    parent2: usize,
    child_sex: IndividualSex,
    chromosome: &Chromosome,
    generation: Generation,
    registry: &mut MutationRegistry,
    rng: &mut R,
) -> Result<(), SimulationError> {
    let genome1 = 2 * child_index;
    crossover_mutation(
        &mut child_genomes[genome1],
        source.parent_genomes,
        2 * parent1,
        2 * parent1 + 1,
        source.id,
        chromosome,
        generation,
        child_sex,
        registry,
        rng,
    )?;
    crossover_mutation(
        &mut child_genomes[genome1 + 1],
        source.parent_genomes,
        2 * parent2,
        2 * parent2 + 1,
        source.id,
        chromosome,
        generation,
        child_sex,
        registry,
        rng,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{FitnessDistribution, Mutation, MutationType};
    use crate::evolution::NullInterpreter;
    use crate::genome::{GenomeType, RecombinationMap};
    use crate::simulation::SexOptions;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    fn quiet_chromosome() -> Chromosome {
        let mt = MutationType::new(1, 0.5, FitnessDistribution::Fixed(0.0));
        Chromosome::new(999, 0.0, RecombinationMap::uniform(999, 0.0), vec![(mt, 1.0)]).unwrap()
    }

    fn mark_parents(population: &mut Population, subpop_id: SubpopId, position: i64) {
        let mt = MutationType::new(1, 0.5, FitnessDistribution::Fixed(0.0));
        let id = population
            .registry_mut()
            .insert(Mutation::new(mt, position, 0.0, subpop_id, 0));
        for genome in population
            .subpopulation_mut(subpop_id)
            .unwrap()
            .parent_genomes_mut()
        {
            genome.push(id);
        }
    }

    #[test]
    fn test_evolve_fills_child_bank_from_native_parents() {
        let mut population = Population::new(None);
        population.add_subpopulation(1, 4, None).unwrap();
        mark_parents(&mut population, 1, 5);

        let chromosome = quiet_chromosome();
        let mut interpreter = NullInterpreter;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

        population
            .evolve_subpopulation(1, &chromosome, 1, &[], &[], &mut interpreter, &mut rng)
            .unwrap();

        assert!(population.child_generation_valid());
        let subpop = population.subpopulation(1).unwrap();
        // without mutation or recombination, every child strand is a copy
        // of some parental strand and carries the marker
        for genome in subpop.child_genomes() {
            assert_eq!(genome.len(), 1);
        }
    }

    #[test]
    fn test_full_migration_replaces_ancestry() {
        let mut population = Population::new(None);
        population.add_subpopulation(1, 5, None).unwrap();
        population.add_subpopulation(2, 5, None).unwrap();
        mark_parents(&mut population, 1, 10);
        mark_parents(&mut population, 2, 20);
        // all of p2's offspring come from p1
        population.set_migration(2, 1, 1.0).unwrap();

        let chromosome = quiet_chromosome();
        let mut interpreter = NullInterpreter;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

        population
            .evolve_subpopulation(2, &chromosome, 1, &[], &[], &mut interpreter, &mut rng)
            .unwrap();

        let p1_marker = {
            let subpop = population.subpopulation(1).unwrap();
            subpop.parent_genomes()[0].mutations()[0]
        };
        let subpop = population.subpopulation(2).unwrap();
        for genome in subpop.child_genomes() {
            assert_eq!(genome.mutations(), &[p1_marker]);
        }
    }

    #[test]
    fn test_excess_migration_rejected() {
        let mut population = Population::new(None);
        population.add_subpopulation(1, 5, None).unwrap();
        population.add_subpopulation(2, 5, None).unwrap();
        population.add_subpopulation(3, 5, None).unwrap();
        population.set_migration(3, 1, 0.7).unwrap();
        population.set_migration(3, 2, 0.7).unwrap();

        let chromosome = quiet_chromosome();
        let mut interpreter = NullInterpreter;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

        let err = population
            .evolve_subpopulation(3, &chromosome, 1, &[], &[], &mut interpreter, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err,
            SimulationError::Config(ConfigError::ExcessMigration(3))
        ));
    }

    #[test]
    fn test_sexual_children_are_typed_by_sex() {
        let mut population = Population::new(Some(SexOptions::x_chromosome(1.0)));
        population.add_subpopulation(1, 10, Some(0.5)).unwrap();

        let chromosome = quiet_chromosome();
        let mut interpreter = NullInterpreter;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

        population
            .evolve_subpopulation(1, &chromosome, 1, &[], &[], &mut interpreter, &mut rng)
            .unwrap();

        let subpop = population.subpopulation(1).unwrap();
        let first_male = subpop.child_first_male_index();
        assert_eq!(first_male, 5);

        for index in 0..subpop.child_subpop_size() {
            let g1 = &subpop.child_genomes()[2 * index];
            let g2 = &subpop.child_genomes()[2 * index + 1];
            if index < first_male {
                assert_eq!(g1.genome_type(), GenomeType::XChromosome);
                assert_eq!(g2.genome_type(), GenomeType::XChromosome);
                assert!(!g1.is_null() && !g2.is_null());
            } else {
                assert_eq!(g1.genome_type(), GenomeType::XChromosome);
                assert!(!g1.is_null());
                assert_eq!(g2.genome_type(), GenomeType::YChromosome);
                assert!(g2.is_null());
            }
        }
    }

    #[test]
    fn test_unisexual_sex_ratio_rejected_at_evolve() {
        let mut population = Population::new(Some(SexOptions::autosomal()));
        population.add_subpopulation(1, 10, Some(0.5)).unwrap();
        // push the ratio to an invalid value behind the admission check
        population.subpopulation_mut(1).unwrap().child_sex_ratio = 1.0;

        let chromosome = quiet_chromosome();
        let mut interpreter = NullInterpreter;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

        let err = population
            .evolve_subpopulation(1, &chromosome, 1, &[], &[], &mut interpreter, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err,
            SimulationError::Config(ConfigError::UnisexualPopulation { .. })
        ));
    }

    #[test]
    fn test_single_parent_population() {
        let mut population = Population::new(None);
        population.add_subpopulation(1, 1, None).unwrap();
        mark_parents(&mut population, 1, 5);

        let chromosome = quiet_chromosome();
        let mut interpreter = NullInterpreter;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

        population
            .evolve_subpopulation(1, &chromosome, 1, &[], &[], &mut interpreter, &mut rng)
            .unwrap();

        // every child strand descends from the single parent's two strands
        let subpop = population.subpopulation(1).unwrap();
        let parent_strands: Vec<_> = subpop
            .parent_genomes()
            .iter()
            .map(|g| g.mutations().to_vec())
            .collect();
        for genome in subpop.child_genomes() {
            assert!(parent_strands.contains(&genome.mutations().to_vec()));
        }
    }
}
