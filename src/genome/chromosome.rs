//! The chromosome: mutation and breakpoint drawing for gamete production.
//!
//! The chromosome is a read-only collaborator of the population core. It
//! knows the chromosome length, the per-site mutation rate, a recombination
//! rate map, and the weighted set of mutation types that new mutations are
//! drawn from.

use crate::base::{Generation, Mutation, MutationType, SubpopId};
use crate::errors::ConfigError;
use rand::Rng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Description of a recombination rate map: interval ends (inclusive,
/// strictly increasing, the last equal to the chromosome's last position)
/// and per-site crossover rates for each interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecombinationMap {
    /// Inclusive end position of each interval
    pub ends: Vec<i64>,
    /// Per-site crossover rate within each interval
    pub rates: Vec<f64>,
}

impl RecombinationMap {
    /// A single interval covering the whole chromosome at a uniform rate.
    pub fn uniform(last_position: i64, rate: f64) -> Self {
        Self {
            ends: vec![last_position],
            rates: vec![rate],
        }
    }
}

/// Chromosome parameters for mutation and breakpoint drawing.
#[derive(Debug, Clone)]
pub struct Chromosome {
    /// Last valid position; positions run 0..=last_position
    last_position: i64,
    /// Mutation types new mutations are drawn from, with draw weights
    mutation_types: Vec<(Arc<MutationType>, f64)>,
    /// Total mutation-type weight
    mutation_type_weight_total: f64,
    /// Expected number of new mutations per gamete
    overall_mutation_rate: f64,
    /// Recombination intervals (inclusive end, per-site rate)
    recombination_ends: Vec<i64>,
    /// Expected crossovers contributed by each interval
    interval_crossover_weights: Vec<f64>,
    /// Expected number of breakpoints per gamete
    overall_recombination_rate: f64,
}

impl Chromosome {
    /// Create a chromosome from a per-site mutation rate and a
    /// recombination map.
    ///
    /// # Errors
    /// Returns an error if the map is empty or malformed, if rates are
    /// negative, or if no mutation type is supplied.
    pub fn new(
        last_position: i64,
        mutation_rate: f64,
        recombination: RecombinationMap,
        mutation_types: Vec<(Arc<MutationType>, f64)>,
    ) -> Result<Self, ConfigError> {
        if last_position < 0 {
            return Err(ConfigError::InvalidChromosome("last position is negative"));
        }
        if mutation_rate < 0.0 {
            return Err(ConfigError::InvalidChromosome("mutation rate is negative"));
        }
        if mutation_types.is_empty() {
            return Err(ConfigError::InvalidChromosome("no mutation types supplied"));
        }
        if mutation_types.iter().any(|(_, w)| *w <= 0.0) {
            return Err(ConfigError::InvalidChromosome(
                "mutation type weights must be positive",
            ));
        }
        Self::validate_map(last_position, &recombination)?;

        let mutation_type_weight_total = mutation_types.iter().map(|(_, w)| w).sum();
        let overall_mutation_rate = mutation_rate * (last_position + 1) as f64;

        // each interval contributes rate * span expected crossovers
        let mut interval_crossover_weights = Vec::with_capacity(recombination.ends.len());
        let mut previous_end = -1i64;
        for (&end, &rate) in recombination.ends.iter().zip(&recombination.rates) {
            let span = (end - previous_end) as f64;
            interval_crossover_weights.push(rate * span);
            previous_end = end;
        }
        let overall_recombination_rate = interval_crossover_weights.iter().sum();

        Ok(Self {
            last_position,
            mutation_types,
            mutation_type_weight_total,
            overall_mutation_rate,
            recombination_ends: recombination.ends,
            interval_crossover_weights,
            overall_recombination_rate,
        })
    }

    fn validate_map(last_position: i64, map: &RecombinationMap) -> Result<(), ConfigError> {
        let well_formed = !map.ends.is_empty()
            && map.ends.len() == map.rates.len()
            && map.rates.iter().all(|&r| r >= 0.0)
            && map.ends.windows(2).all(|w| w[0] < w[1])
            && map.ends.last() == Some(&last_position);
        if well_formed {
            Ok(())
        } else {
            Err(ConfigError::InvalidChromosome(
                "recombination map must be sorted, non-negative, and end at the last position",
            ))
        }
    }

    /// Last valid position on the chromosome.
    #[inline]
    pub fn last_position(&self) -> i64 {
        self.last_position
    }

    /// Expected number of new mutations per gamete.
    #[inline]
    pub fn overall_mutation_rate(&self) -> f64 {
        self.overall_mutation_rate
    }

    /// Expected number of breakpoints per gamete.
    #[inline]
    pub fn overall_recombination_rate(&self) -> f64 {
        self.overall_recombination_rate
    }

    /// Draw the number of new mutations for one gamete.
    pub fn draw_mutation_count<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        poisson_draw(self.overall_mutation_rate, rng)
    }

    /// Draw the number of breakpoints for one gamete.
    pub fn draw_breakpoint_count<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        poisson_draw(self.overall_recombination_rate, rng)
    }

    /// Draw the mutation count and breakpoint count together.
    pub fn draw_mutation_and_breakpoint_counts<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> (usize, usize) {
        (self.draw_mutation_count(rng), self.draw_breakpoint_count(rng))
    }

    /// Draw `n` breakpoint positions, unsorted.
    ///
    /// An interval is chosen with probability proportional to its expected
    /// crossover contribution, then the position is uniform within it.
    pub fn draw_breakpoints<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<i64> {
        let mut breakpoints = Vec::with_capacity(n);

        for _ in 0..n {
            let interval = crate::base::sampling::weighted_index(
                &self.interval_crossover_weights,
                self.overall_recombination_rate,
                rng,
            );
            let start = if interval == 0 {
                0
            } else {
                self.recombination_ends[interval - 1] + 1
            };
            let end = self.recombination_ends[interval];
            breakpoints.push(rng.random_range(start..=end));
        }

        breakpoints
    }

    /// Construct one new mutation: uniform position, weighted mutation
    /// type, selection coefficient from the type's DFE.
    pub fn draw_new_mutation<R: Rng + ?Sized>(
        &self,
        subpop_origin: SubpopId,
        generation: Generation,
        rng: &mut R,
    ) -> Mutation {
        let position = rng.random_range(0..=self.last_position);

        let type_index = if self.mutation_types.len() == 1 {
            0
        } else {
            let target = rng.random::<f64>() * self.mutation_type_weight_total;
            let mut cumulative = 0.0;
            let mut chosen = self.mutation_types.len() - 1;
            for (index, (_, weight)) in self.mutation_types.iter().enumerate() {
                cumulative += weight;
                if target < cumulative {
                    chosen = index;
                    break;
                }
            }
            chosen
        };

        let mutation_type = Arc::clone(&self.mutation_types[type_index].0);
        let selection_coeff = mutation_type.draw_selection_coeff(rng);

        Mutation::new(
            mutation_type,
            position,
            selection_coeff,
            subpop_origin,
            generation,
        )
    }
}

fn poisson_draw<R: Rng + ?Sized>(rate: f64, rng: &mut R) -> usize {
    if rate <= 0.0 {
        return 0;
    }
    let poisson = Poisson::new(rate).expect("rate is positive and finite");
    poisson.sample(rng) as usize
}
