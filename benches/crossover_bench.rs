use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use demesim::base::{
    FitnessDistribution, IndividualSex, Mutation, MutationRegistry, MutationType,
};
use demesim::genome::{Chromosome, Genome, GenomeType, RecombinationMap};
use demesim::evolution::crossover_mutation;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

fn bench_crossover(c: &mut Criterion) {
    let mut group = c.benchmark_group("crossover");
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

    let mutation_type = MutationType::new(1, 0.5, FitnessDistribution::Fixed(0.0));
    let last_position = 99_999i64;

    for &mutation_count in &[10usize, 100, 1_000] {
        // two parent strands carrying `mutation_count` segregating sites
        let mut registry = MutationRegistry::new();
        let mut bank = vec![
            Genome::new(GenomeType::Autosome),
            Genome::new(GenomeType::Autosome),
        ];
        for strand in 0..2 {
            let mut positions: Vec<i64> = (0..mutation_count)
                .map(|_| rng.random_range(0..=last_position))
                .collect();
            positions.sort_unstable();
            for position in positions {
                let id = registry.insert(Mutation::new(
                    std::sync::Arc::clone(&mutation_type),
                    position,
                    0.0,
                    1,
                    1,
                ));
                bank[strand].push(id);
            }
        }

        let chromosome = Chromosome::new(
            last_position,
            1e-8,
            RecombinationMap::uniform(last_position, 1e-7),
            vec![(std::sync::Arc::clone(&mutation_type), 1.0)],
        )
        .unwrap();

        group.throughput(Throughput::Elements(mutation_count as u64));
        group.bench_function(format!("sites={mutation_count}"), |b| {
            let mut child = Genome::new(GenomeType::Autosome);
            b.iter(|| {
                crossover_mutation(
                    black_box(&mut child),
                    &bank,
                    0,
                    1,
                    1,
                    &chromosome,
                    1,
                    IndividualSex::Hermaphrodite,
                    &mut registry,
                    &mut rng,
                )
                .unwrap();
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_crossover);
criterion_main!(benches);
