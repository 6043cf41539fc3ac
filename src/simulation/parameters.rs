//! Run parameters.
//!
//! Serde-derived configuration structs; a parameter file round-trips
//! through JSON to fully reproduce a run setup.

use crate::base::Generation;
use crate::genome::GenomeType;
use serde::{Deserialize, Serialize};

/// Sex modeling options, shared by every subpopulation of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SexOptions {
    /// Which chromosome type is being modeled
    pub modeled_chromosome: GenomeType,
    /// Dominance coefficient for hemizygous sex-chromosome carriers
    pub x_dominance_coeff: f64,
}

impl SexOptions {
    /// Model autosomes with separate sexes.
    pub fn autosomal() -> Self {
        Self {
            modeled_chromosome: GenomeType::Autosome,
            x_dominance_coeff: 1.0,
        }
    }

    /// Model the X chromosome with the given hemizygous dominance.
    pub fn x_chromosome(x_dominance_coeff: f64) -> Self {
        Self {
            modeled_chromosome: GenomeType::XChromosome,
            x_dominance_coeff,
        }
    }

    /// Model the Y chromosome.
    pub fn y_chromosome() -> Self {
        Self {
            modeled_chromosome: GenomeType::YChromosome,
            x_dominance_coeff: 1.0,
        }
    }
}

/// High-level run parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParams {
    /// Number of generations to run
    pub total_generations: Generation,
    /// Optional RNG seed for reproducibility
    pub seed: Option<u64>,
}

impl SimulationParams {
    pub fn new(total_generations: Generation, seed: Option<u64>) -> Self {
        Self {
            total_generations,
            seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_json_round_trip() {
        let params = SimulationParams::new(100, Some(42));
        let json = serde_json::to_string(&params).unwrap();
        let back: SimulationParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back.total_generations, 100);
        assert_eq!(back.seed, Some(42));
    }

    #[test]
    fn test_sex_options_constructors() {
        let x = SexOptions::x_chromosome(0.5);
        assert_eq!(x.modeled_chromosome, GenomeType::XChromosome);
        assert_eq!(x.x_dominance_coeff, 0.5);

        let y = SexOptions::y_chromosome();
        assert_eq!(y.modeled_chromosome, GenomeType::YChromosome);
    }
}
