//! The generation swap: reference tallies, fixation, loss, and the
//! promotion of child banks to parent banks.
//!
//! Step order matters: the tally writes the reference counts the purge and
//! the genome scrub both read, and substitutions must be emitted before the
//! fixed mutation objects are destroyed.

use crate::base::{Generation, MutationId, Substitution};
use crate::errors::SimulationError;
use crate::evolution::{Interpreter, ScriptBlock};
use crate::simulation::Population;
use tracing::debug;

impl Population {
    /// Advance the population across the generation boundary.
    ///
    /// Tallies mutation references over the child banks, removes lost
    /// mutations, converts fixed mutations to substitutions, swaps every
    /// subpopulation's banks, and refreshes the cached fitness tables using
    /// the fitness callbacks applicable to the next generation.
    pub fn swap_generations(
        &mut self,
        generation: Generation,
        fitness_callbacks: &[&ScriptBlock],
        interpreter: &mut dyn Interpreter,
    ) -> Result<(), SimulationError> {
        self.tally_mutation_references();
        self.remove_fixed_mutations(generation);

        #[cfg(feature = "zombie-checks")]
        {
            let zombies = self.zombie_handles();
            debug_assert!(zombies.is_empty(), "zombies found in genomes: {zombies:?}");
        }

        for subpop in self.subpops.values_mut() {
            subpop.swap_child_and_parent_genomes();
        }
        self.child_generation_valid = false;

        // fitness for the next generation, with each subpopulation seeing
        // only the callbacks scoped to it
        let Population {
            subpops, registry, ..
        } = &mut *self;
        for (&id, subpop) in subpops.iter_mut() {
            let applicable: Vec<&ScriptBlock> = fitness_callbacks
                .iter()
                .copied()
                .filter(|block| block.matches_subpop(id))
                .collect();
            subpop.update_fitness(&applicable, interpreter, registry)?;
        }

        Ok(())
    }

    /// Zero every reference count, then count the handles in all non-null
    /// child genomes. Updates the total non-null genome count, the
    /// denominator for fixation.
    pub fn tally_mutation_references(&mut self) {
        self.registry.zero_reference_counts();

        let mut total_genome_count = 0usize;
        let Population {
            subpops, registry, ..
        } = &mut *self;

        for subpop in subpops.values() {
            for genome in subpop.child_genomes() {
                if !genome.is_null() {
                    for &id in genome.mutations() {
                        registry.get_mut(id).increment_reference_count();
                    }
                    total_genome_count += 1;
                }
            }
        }

        self.total_genome_count = total_genome_count;
    }

    /// Classify every registry entry by reference count, scrub fixed
    /// handles out of the child genomes, emit substitutions, and free lost
    /// mutations.
    fn remove_fixed_mutations(&mut self, generation: Generation) {
        let total_genome_count = self.total_genome_count;

        let mut lost: Vec<MutationId> = Vec::new();
        let mut fixed: Vec<MutationId> = Vec::new();
        for (id, mutation) in self.registry.iter() {
            let references = mutation.reference_count() as usize;
            if references == 0 {
                lost.push(id);
            } else if references == total_genome_count {
                fixed.push(id);
            }
        }

        if !fixed.is_empty() {
            // fixed handles are recognized in the genomes by their
            // reference counts, so the scrub runs before any removal
            let Population {
                subpops, registry, ..
            } = &mut *self;
            for subpop in subpops.values_mut() {
                for genome in subpop.child_genomes.iter_mut() {
                    if !genome.is_null() {
                        genome.remove_fixed(registry, total_genome_count);
                    }
                }
            }

            fixed.sort_by_key(|&id| self.registry.get(id).position());
            for id in fixed.iter().copied() {
                let mutation = self.registry.remove(id);
                self.substitutions
                    .push(Substitution::new(&mutation, generation));
            }
        }

        for id in lost.iter().copied() {
            self.registry.remove(id);
        }

        debug!(
            generation,
            fixed = fixed.len(),
            lost = lost.len(),
            live = self.registry.len(),
            "generation swap purge"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{FitnessDistribution, Mutation, MutationType};
    use crate::evolution::NullInterpreter;
    use std::sync::Arc;

    fn population_with_subpop(size: usize) -> Population {
        let mut population = Population::new(None);
        population.add_subpopulation(1, size, None).unwrap();
        population
    }

    fn insert_mutation(population: &mut Population, position: i64) -> MutationId {
        let mt = MutationType::new(1, 0.5, FitnessDistribution::Fixed(0.0));
        population
            .registry_mut()
            .insert(Mutation::new(Arc::clone(&mt), position, 0.0, 1, 1))
    }

    #[test]
    fn test_tally_counts_child_references() {
        let mut population = population_with_subpop(2);
        let id = insert_mutation(&mut population, 10);

        {
            let subpop = population.subpopulation_mut(1).unwrap();
            subpop.child_genomes_mut()[0].push(id);
            subpop.child_genomes_mut()[2].push(id);
        }

        population.tally_mutation_references();

        assert_eq!(population.total_genome_count(), 4);
        assert_eq!(population.registry().get(id).reference_count(), 2);
    }

    #[test]
    fn test_drift_fixation_scenario() {
        // one mutation carried by all eight child genomes of a size-4
        // subpopulation: the swap must empty every genome, clear the
        // registry, and log exactly one substitution
        let mut population = population_with_subpop(4);
        let id = insert_mutation(&mut population, 100);

        {
            let subpop = population.subpopulation_mut(1).unwrap();
            for genome in subpop.child_genomes_mut() {
                genome.push(id);
            }
        }
        population.child_generation_valid = true;

        let mut interpreter = NullInterpreter;
        population.swap_generations(3, &[], &mut interpreter).unwrap();

        assert!(population.registry().is_empty());
        assert_eq!(population.substitutions().len(), 1);
        let substitution = &population.substitutions()[0];
        assert_eq!(substitution.position(), 100);
        assert_eq!(substitution.fixation_generation(), 3);

        // the swapped-in parent bank is empty of mutations
        let subpop = population.subpopulation(1).unwrap();
        for genome in subpop.parent_genomes() {
            assert!(genome.is_empty());
        }
        assert!(!population.child_generation_valid());
    }

    #[test]
    fn test_lost_mutation_is_freed() {
        let mut population = population_with_subpop(2);
        let kept = insert_mutation(&mut population, 10);
        let lost = insert_mutation(&mut population, 20);

        {
            let subpop = population.subpopulation_mut(1).unwrap();
            subpop.child_genomes_mut()[0].push(kept);
        }

        let mut interpreter = NullInterpreter;
        population.swap_generations(1, &[], &mut interpreter).unwrap();

        assert!(population.registry().contains(kept));
        assert!(!population.registry().contains(lost));
        assert!(population.substitutions().is_empty());
    }

    #[test]
    fn test_segregating_mutation_survives() {
        let mut population = population_with_subpop(2);
        let id = insert_mutation(&mut population, 10);

        {
            let subpop = population.subpopulation_mut(1).unwrap();
            subpop.child_genomes_mut()[0].push(id);
            subpop.child_genomes_mut()[1].push(id);
            subpop.child_genomes_mut()[2].push(id);
        }

        let mut interpreter = NullInterpreter;
        population.swap_generations(1, &[], &mut interpreter).unwrap();

        // 3 of 4 genomes carry it: neither lost nor fixed
        assert!(population.registry().contains(id));
        assert_eq!(population.registry().len(), 1);
        assert!(population.substitutions().is_empty());

        let subpop = population.subpopulation(1).unwrap();
        let carried: usize = subpop
            .parent_genomes()
            .iter()
            .map(|g| g.mutations().len())
            .sum();
        assert_eq!(carried, 3);
    }

    #[test]
    fn test_substitutions_sorted_by_position() {
        let mut population = population_with_subpop(1);
        let late = insert_mutation(&mut population, 500);
        let early = insert_mutation(&mut population, 5);

        {
            let subpop = population.subpopulation_mut(1).unwrap();
            for genome in subpop.child_genomes_mut() {
                genome.push(early);
                genome.push(late);
            }
        }

        let mut interpreter = NullInterpreter;
        population.swap_generations(2, &[], &mut interpreter).unwrap();

        let positions: Vec<i64> = population
            .substitutions()
            .iter()
            .map(|s| s.position())
            .collect();
        assert_eq!(positions, vec![5, 500]);
    }

    #[test]
    fn test_x_model_nulls_not_counted_as_carriers() {
        use crate::simulation::SexOptions;

        // 2 females (X, X) + 2 males (X, null): 6 non-null genomes
        let mut population = Population::new(Some(SexOptions::x_chromosome(1.0)));
        population.add_subpopulation(1, 4, Some(0.5)).unwrap();
        let id = insert_mutation(&mut population, 10);

        {
            let subpop = population.subpopulation_mut(1).unwrap();
            for genome in subpop.child_genomes_mut() {
                if !genome.is_null() {
                    genome.push(id);
                }
            }
        }

        let mut interpreter = NullInterpreter;
        population.swap_generations(1, &[], &mut interpreter).unwrap();

        // carried by every real X strand: fixed, not miscalled as
        // segregating because of the null Y strands
        assert_eq!(population.total_genome_count(), 6);
        assert!(population.registry().is_empty());
        assert_eq!(population.substitutions().len(), 1);
    }
}
