//! Weighted sampling helpers shared by the mating scheduler and the
//! callback mediator.

use rand::Rng;
use rand_distr::{Binomial, Distribution};

/// Draw an index with probability proportional to its weight.
///
/// Walks the cumulative sum with a single uniform draw in `[0, total)`.
/// Floating-point underflow in the prefix walk assigns the tail to the last
/// index. If `total` is not positive, the draw is uniform over all indices.
pub fn weighted_index<R: Rng + ?Sized>(weights: &[f64], total: f64, rng: &mut R) -> usize {
    debug_assert!(!weights.is_empty());

    if total <= 0.0 {
        return rng.random_range(0..weights.len());
    }

    let target = rng.random::<f64>() * total;
    let mut cumulative = 0.0;

    for (index, &w) in weights.iter().enumerate() {
        cumulative += w;
        if target < cumulative {
            return index;
        }
    }

    weights.len() - 1
}

/// Sample counts from a multinomial distribution over `probabilities`.
///
/// Uses the conditional-binomial decomposition: each category's count is
/// binomial in the remaining trials with its probability renormalized by the
/// probability mass not yet consumed. The counts always sum to `n`.
pub fn multinomial<R: Rng + ?Sized>(n: usize, probabilities: &[f64], rng: &mut R) -> Vec<usize> {
    let mut counts = vec![0usize; probabilities.len()];
    let mut remaining_trials = n as u64;
    let mut remaining_mass: f64 = probabilities.iter().sum();

    for (index, &p) in probabilities.iter().enumerate() {
        if remaining_trials == 0 {
            break;
        }
        if index == probabilities.len() - 1 || remaining_mass <= p {
            counts[index] = remaining_trials as usize;
            break;
        }

        let conditional = (p / remaining_mass).clamp(0.0, 1.0);
        let draw = Binomial::new(remaining_trials, conditional)
            .expect("conditional probability is clamped to [0, 1]")
            .sample(rng);

        counts[index] = draw as usize;
        remaining_trials -= draw;
        remaining_mass -= p;
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;

    #[test]
    fn test_weighted_index_bounds() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let weights = [1.0, 2.0, 3.0];

        for _ in 0..1000 {
            let index = weighted_index(&weights, 6.0, &mut rng);
            assert!(index < 3);
        }
    }

    #[test]
    fn test_weighted_index_single_winner() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let weights = [0.0, 0.0, 5.0, 0.0];

        for _ in 0..100 {
            assert_eq!(weighted_index(&weights, 5.0, &mut rng), 2);
        }
    }

    #[test]
    fn test_weighted_index_uniform_fallback() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let weights = [0.0, 0.0, 0.0];

        let mut seen = [false; 3];
        for _ in 0..200 {
            seen[weighted_index(&weights, 0.0, &mut rng)] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_weighted_index_proportions() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(7);
        let weights = [1.0, 3.0];

        let draws = 20_000;
        let mut hits = 0usize;
        for _ in 0..draws {
            if weighted_index(&weights, 4.0, &mut rng) == 1 {
                hits += 1;
            }
        }
        let frequency = hits as f64 / draws as f64;
        assert!(
            (frequency - 0.75).abs() < 0.02,
            "frequency {frequency} should be near 0.75"
        );
    }

    #[test]
    fn test_multinomial_sums_to_n() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
        let probabilities = [0.2, 0.3, 0.5];

        for n in [0usize, 1, 10, 1000] {
            let counts = multinomial(n, &probabilities, &mut rng);
            assert_eq!(counts.iter().sum::<usize>(), n);
        }
    }

    #[test]
    fn test_multinomial_degenerate() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

        let counts = multinomial(50, &[0.0, 1.0], &mut rng);
        assert_eq!(counts, vec![0, 50]);

        let counts = multinomial(50, &[1.0], &mut rng);
        assert_eq!(counts, vec![50]);
    }

    #[test]
    fn test_multinomial_mean() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(9);
        let probabilities = [0.3, 0.7];

        let trials = 2000;
        let mut total_first = 0usize;
        for _ in 0..trials {
            total_first += multinomial(10, &probabilities, &mut rng)[0];
        }
        let mean = total_first as f64 / trials as f64;
        // expected 3.0, sd of the estimate ~0.032
        assert!((mean - 3.0).abs() < 0.2, "empirical mean {mean}");
    }
}
