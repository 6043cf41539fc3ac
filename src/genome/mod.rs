//! Genome representation: haplotype strands and the chromosome collaborator.

pub mod chromosome;
pub mod genome;

pub use chromosome::{Chromosome, RecombinationMap};
pub use genome::{Genome, GenomeType};
