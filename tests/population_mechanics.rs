//! Integration tests for the population core: fixation, migration,
//! inheritance boundaries, and cross-generation invariants.

use demesim::base::{FitnessDistribution, Mutation, MutationType};
use demesim::evolution::NullInterpreter;
use demesim::genome::{Chromosome, RecombinationMap};
use demesim::prelude::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::collections::HashSet;
use std::sync::Arc;

fn neutral_type() -> Arc<MutationType> {
    MutationType::new(1, 0.5, FitnessDistribution::Fixed(0.0))
}

fn chromosome(mutation_rate: f64, recomb_rate: f64) -> Chromosome {
    Chromosome::new(
        999,
        mutation_rate,
        RecombinationMap::uniform(999, recomb_rate),
        vec![(neutral_type(), 1.0)],
    )
    .unwrap()
}

/// Push a marker mutation into every parent genome of one subpopulation
/// and return its handle.
fn mark_parents(population: &mut Population, subpop: SubpopId, position: i64) -> MutationId {
    let id = population
        .registry_mut()
        .insert(Mutation::new(neutral_type(), position, 0.0, subpop, 0));
    for genome in population
        .subpopulation_mut(subpop)
        .unwrap()
        .parent_genomes_mut()
    {
        genome.push(id);
    }
    id
}

#[test]
fn drift_fixation_produces_one_substitution() {
    // a mutation carried by all eight child genomes of a size-4 asexual
    // subpopulation fixes at the swap: registry empty, one substitution,
    // every genome scrubbed
    let mut population = Population::new(None);
    population.add_subpopulation(1, 4, None).unwrap();

    let id = population
        .registry_mut()
        .insert(Mutation::new(neutral_type(), 100, 0.0, 1, 1));
    for genome in population
        .subpopulation_mut(1)
        .unwrap()
        .child_genomes_mut()
    {
        genome.push(id);
    }

    let mut interpreter = NullInterpreter;
    population.swap_generations(5, &[], &mut interpreter).unwrap();

    assert!(population.registry().is_empty());
    assert_eq!(population.substitutions().len(), 1);
    assert_eq!(population.substitutions()[0].position(), 100);
    assert_eq!(population.substitutions()[0].fixation_generation(), 5);
    for genome in population.subpopulation(1).unwrap().parent_genomes() {
        assert!(genome.is_empty());
    }
}

#[test]
fn migrant_and_native_groups_partition_offspring() {
    // with fraction 0.3 from p1, every child of p2 descends wholly from
    // one source: both strands carry the same marker, and the two groups
    // partition the bank
    let mut population = Population::new(None);
    population.add_subpopulation(1, 10, None).unwrap();
    population.add_subpopulation(2, 10, None).unwrap();
    let marker_a = mark_parents(&mut population, 1, 10);
    let marker_b = mark_parents(&mut population, 2, 20);
    population.set_migration(2, 1, 0.3).unwrap();

    let quiet = chromosome(0.0, 0.0);
    let mut interpreter = NullInterpreter;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
    population
        .evolve_subpopulation(2, &quiet, 1, &[], &[], &mut interpreter, &mut rng)
        .unwrap();

    let subpop = population.subpopulation(2).unwrap();
    let mut migrants = 0usize;
    let mut natives = 0usize;
    for child in 0..subpop.child_subpop_size() {
        let g1 = subpop.child_genomes()[2 * child].mutations();
        let g2 = subpop.child_genomes()[2 * child + 1].mutations();
        // both strands descend from the same source subpopulation
        assert_eq!(g1, g2);
        if g1 == [marker_a] {
            migrants += 1;
        } else {
            assert_eq!(g1, &[marker_b]);
            natives += 1;
        }
    }
    assert_eq!(migrants + natives, 10);
    // migrants are generated first, so they occupy the low indices
    for child in 0..migrants {
        assert_eq!(subpop.child_genomes()[2 * child].mutations(), &[marker_a]);
    }
}

#[test]
fn migrant_counts_converge_to_fraction() {
    // empirical mean of the multinomial migrant count approaches
    // fraction x subpop_size
    let mut population = Population::new(None);
    population.add_subpopulation(1, 100, None).unwrap();
    population.add_subpopulation(2, 100, None).unwrap();
    let marker_a = mark_parents(&mut population, 1, 10);
    mark_parents(&mut population, 2, 20);
    population.set_migration(2, 1, 0.3).unwrap();

    let quiet = chromosome(0.0, 0.0);
    let mut interpreter = NullInterpreter;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);

    let trials = 200;
    let mut total_migrants = 0usize;
    for generation in 0..trials {
        population
            .evolve_subpopulation(
                2,
                &quiet,
                generation,
                &[],
                &[],
                &mut interpreter,
                &mut rng,
            )
            .unwrap();
        let subpop = population.subpopulation(2).unwrap();
        total_migrants += (0..subpop.child_subpop_size())
            .filter(|&child| subpop.child_genomes()[2 * child].mutations() == [marker_a])
            .count();
    }

    let mean = total_migrants as f64 / trials as f64;
    // expected 30; the standard error of the estimate is about 0.3
    assert!((mean - 30.0).abs() < 2.0, "empirical mean {mean}");
}

#[test]
fn single_parent_population_inherits_both_strands() {
    let mut population = Population::new(None);
    population.add_subpopulation(1, 1, None).unwrap();

    // give the lone parent two distinguishable strands
    let a = population
        .registry_mut()
        .insert(Mutation::new(neutral_type(), 10, 0.0, 1, 0));
    let b = population
        .registry_mut()
        .insert(Mutation::new(neutral_type(), 20, 0.0, 1, 0));
    {
        let subpop = population.subpopulation_mut(1).unwrap();
        subpop.parent_genomes_mut()[0].push(a);
        subpop.parent_genomes_mut()[1].push(b);
    }

    let quiet = chromosome(0.0, 0.0);
    let mut interpreter = NullInterpreter;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
    population
        .evolve_subpopulation(1, &quiet, 1, &[], &[], &mut interpreter, &mut rng)
        .unwrap();

    // each child strand is one of the parent's two strands
    let subpop = population.subpopulation(1).unwrap();
    for genome in subpop.child_genomes() {
        assert!(genome.mutations() == [a] || genome.mutations() == [b]);
    }
}

#[test]
fn y_inheritance_is_single_strand() {
    // a male child's Y is a direct copy of the paternal Y strand
    let mut population = Population::new(Some(SexOptions::y_chromosome()));
    population.add_subpopulation(1, 4, Some(0.5)).unwrap();

    // mark every male parent's Y strand
    let marker = population
        .registry_mut()
        .insert(Mutation::new(neutral_type(), 100, 0.0, 1, 0));
    {
        let subpop = population.subpopulation_mut(1).unwrap();
        let first_male = subpop.parent_first_male_index();
        for index in first_male..subpop.parent_subpop_size() {
            subpop.parent_genomes_mut()[2 * index + 1].push(marker);
        }
    }

    let quiet = chromosome(0.0, 0.0);
    let mut interpreter = NullInterpreter;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
    population
        .evolve_subpopulation(1, &quiet, 1, &[], &[], &mut interpreter, &mut rng)
        .unwrap();

    let subpop = population.subpopulation(1).unwrap();
    let first_male = subpop.child_first_male_index();
    for index in 0..subpop.child_subpop_size() {
        let g2 = &subpop.child_genomes()[2 * index + 1];
        if index < first_male {
            assert!(g2.is_null());
        } else {
            // every male child's Y carries the paternal marker
            assert_eq!(g2.mutations(), &[marker]);
        }
    }
}

#[test]
fn invariants_hold_across_generations() {
    let mut sim = Simulation::without_callbacks(
        chromosome(1e-3, 1e-4),
        SimulationParams::new(20, Some(42)),
        None,
    );
    sim.population_mut().add_subpopulation(1, 10, None).unwrap();
    sim.run().unwrap();

    let population = sim.population();
    let registry = population.registry();
    let total_genomes = 20usize;

    // every live mutation segregates: 0 < refcount < total non-null
    // genomes, boundary values having been removed at the swap
    for (_, mutation) in registry.iter() {
        let references = mutation.reference_count() as usize;
        assert!(references > 0 && references < total_genomes);
    }

    // genomes are position-sorted, duplicate-free per position, and only
    // reference live registry entries
    let mut carried: HashSet<MutationId> = HashSet::new();
    let subpop = population.subpopulation(1).unwrap();
    for genome in subpop.parent_genomes() {
        let mut last_position = i64::MIN;
        let mut at_position: Vec<MutationId> = Vec::new();
        for &id in genome.mutations() {
            assert!(registry.contains(id));
            let position = registry.get(id).position();
            assert!(position >= last_position);
            if position != last_position {
                at_position.clear();
            }
            assert!(!at_position.contains(&id), "duplicate handle at {position}");
            at_position.push(id);
            last_position = position;
            carried.insert(id);
        }
    }

    // the union of carried handles is exactly the registry's handle set
    let registered: HashSet<MutationId> = registry.iter().map(|(id, _)| id).collect();
    assert_eq!(carried, registered);

    // substitutions never reappear in the live registry
    for substitution in population.substitutions() {
        for (_, mutation) in registry.iter() {
            assert!(
                !(mutation.position() == substitution.position()
                    && mutation.origin_generation() == substitution.origin_generation()
                    && mutation.selection_coeff() == substitution.selection_coeff()
                    && mutation.subpop_origin() == substitution.subpop_origin())
            );
        }
    }
}

#[test]
fn neutral_closed_population_preserves_parent_alleles() {
    // no migration, no selfing, no mutation: after one generation every
    // child allele existed in the parent bank
    let mut population = Population::new(None);
    population.add_subpopulation(1, 20, None).unwrap();
    let marker = mark_parents(&mut population, 1, 50);

    let quiet = chromosome(0.0, 1e-4);
    let mut interpreter = NullInterpreter;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
    population
        .evolve_subpopulation(1, &quiet, 1, &[], &[], &mut interpreter, &mut rng)
        .unwrap();

    let subpop = population.subpopulation(1).unwrap();
    for genome in subpop.child_genomes() {
        assert_eq!(genome.mutations(), &[marker]);
    }
}

#[test]
fn print_all_round_trips_after_a_run() {
    let mut sim = Simulation::without_callbacks(
        chromosome(1e-3, 1e-4),
        SimulationParams::new(10, Some(9)),
        None,
    );
    sim.population_mut().add_subpopulation(1, 8, None).unwrap();
    sim.run().unwrap();

    let mut first = Vec::new();
    let mut second = Vec::new();
    sim.population().print_all(&mut first).unwrap();
    sim.population().print_all(&mut second).unwrap();
    assert_eq!(first, second);

    let text = String::from_utf8(first).unwrap();
    assert!(text.starts_with("Populations:\np1 8 H\n"));
    assert!(text.contains("Mutations:\n"));
    assert!(text.contains("Individuals:\n"));
    assert!(text.contains("Genomes:\n"));
}
