//! Text dumps of the population state.
//!
//! All dumps operate over the current canonical bank (child banks while
//! the child generation is valid, parent banks otherwise) and are pure
//! inspection: printing never mutates state, so a dump is reproducible
//! until the next generation is produced.

use crate::base::{Generation, IndividualSex, Mutation, MutationType, SubpopId};
use crate::errors::{ConfigError, SimulationError};
use crate::genome::{Chromosome, Genome, GenomeType};
use crate::simulation::{Population, Subpopulation};
use rand::Rng;
use std::io::{self, Write};
use std::sync::Arc;

/// One polymorphism: a distinct (position, type, selection coefficient)
/// triple with its carrier count in the surveyed genomes.
#[derive(Debug, Clone)]
pub struct Polymorphism {
    mutation_type: Arc<MutationType>,
    position: i64,
    selection_coeff: f64,
    subpop_origin: SubpopId,
    origin_generation: Generation,
    prevalence: u32,
}

impl Polymorphism {
    fn from_mutation(mutation: &Mutation) -> Self {
        Self {
            mutation_type: Arc::clone(mutation.mutation_type()),
            position: mutation.position(),
            selection_coeff: mutation.selection_coeff(),
            subpop_origin: mutation.subpop_origin(),
            origin_generation: mutation.origin_generation(),
            prevalence: 1,
        }
    }

    /// Identity is position, mutation type, and selection coefficient.
    fn matches(&self, mutation: &Mutation) -> bool {
        self.position == mutation.position()
            && self.mutation_type.id() == mutation.mutation_type().id()
            && self.selection_coeff == mutation.selection_coeff()
    }

    /// Position on the chromosome.
    #[inline]
    pub fn position(&self) -> i64 {
        self.position
    }

    /// Number of surveyed genomes carrying this polymorphism.
    #[inline]
    pub fn prevalence(&self) -> u32 {
        self.prevalence
    }

    /// Print one polymorphism line.
    pub fn print<W: Write>(&self, out: &mut W, id: usize) -> io::Result<()> {
        writeln!(
            out,
            "{id} m{mutation_type} {position} {selection} {dominance} p{origin} {generation} {prevalence}",
            mutation_type = self.mutation_type.id(),
            position = self.position,
            selection = self.selection_coeff,
            dominance = self.mutation_type.dominance_coeff(),
            origin = self.subpop_origin,
            generation = self.origin_generation,
            prevalence = self.prevalence,
        )
    }
}

/// Polymorphism tally, ordered by position with stable insertion order
/// within a position. Indices into the tally are the ids printed in the
/// `Mutations:` and `Genomes:` sections.
#[derive(Debug, Default)]
struct PolymorphismMap {
    entries: Vec<Polymorphism>,
}

impl PolymorphismMap {
    fn add_mutation(&mut self, mutation: &Mutation) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.matches(mutation)) {
            entry.prevalence += 1;
            return;
        }
        let index = self
            .entries
            .partition_point(|e| e.position <= mutation.position());
        self.entries.insert(index, Polymorphism::from_mutation(mutation));
    }

    fn index_of(&self, mutation: &Mutation) -> Option<usize> {
        self.entries.iter().position(|e| e.matches(mutation))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn iter(&self) -> impl Iterator<Item = &Polymorphism> {
        self.entries.iter()
    }
}

fn canonical_genomes(subpop: &Subpopulation, child_valid: bool) -> &[Genome] {
    if child_valid {
        subpop.child_genomes()
    } else {
        subpop.parent_genomes()
    }
}

fn canonical_size(subpop: &Subpopulation, child_valid: bool) -> usize {
    if child_valid {
        subpop.child_subpop_size()
    } else {
        subpop.parent_subpop_size()
    }
}

fn canonical_sex_ratio(subpop: &Subpopulation, child_valid: bool) -> f64 {
    if child_valid {
        subpop.child_sex_ratio()
    } else {
        subpop.parent_sex_ratio()
    }
}

fn canonical_first_male(subpop: &Subpopulation, child_valid: bool) -> usize {
    if child_valid {
        subpop.child_first_male_index()
    } else {
        subpop.parent_first_male_index()
    }
}

impl Population {
    /// Dump every subpopulation, polymorphism, individual, and genome.
    pub fn print_all<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let child_valid = self.child_generation_valid();

        writeln!(out, "Populations:")?;
        for (&id, subpop) in self.subpopulations() {
            let size = canonical_size(subpop, child_valid);
            if subpop.sex_enabled() {
                let ratio = canonical_sex_ratio(subpop, child_valid);
                writeln!(out, "p{id} {size} S {ratio}")?;
            } else {
                writeln!(out, "p{id} {size} H")?;
            }
        }

        let mut polymorphisms = PolymorphismMap::default();
        for (_, subpop) in self.subpopulations() {
            for genome in canonical_genomes(subpop, child_valid) {
                if !genome.is_null() {
                    for &id in genome.mutations() {
                        polymorphisms.add_mutation(self.registry().get(id));
                    }
                }
            }
        }

        writeln!(out, "Mutations:")?;
        for (id, polymorphism) in polymorphisms.iter().enumerate() {
            polymorphism.print(out, id)?;
        }

        writeln!(out, "Individuals:")?;
        for (&id, subpop) in self.subpopulations() {
            let size = canonical_size(subpop, child_valid);
            let first_male = canonical_first_male(subpop, child_valid);
            for index in 0..size {
                let sex = if subpop.sex_enabled() {
                    if index < first_male {
                        IndividualSex::Female
                    } else {
                        IndividualSex::Male
                    }
                } else {
                    IndividualSex::Hermaphrodite
                };
                writeln!(
                    out,
                    "p{id}:i{index} {sex} p{id}:{g1} p{id}:{g2}",
                    g1 = index * 2,
                    g2 = index * 2 + 1,
                )?;
            }
        }

        writeln!(out, "Genomes:")?;
        for (&id, subpop) in self.subpopulations() {
            for (index, genome) in canonical_genomes(subpop, child_valid).iter().enumerate() {
                write!(out, "p{id}:{index} {}", genome.genome_type())?;
                if genome.is_null() {
                    write!(out, " <null>")?;
                } else {
                    for &mutation_id in genome.mutations() {
                        let polymorphism_id = polymorphisms
                            .index_of(self.registry().get(mutation_id))
                            .expect("every carried mutation was tallied above");
                        write!(out, " {polymorphism_id}")?;
                    }
                }
                writeln!(out)?;
            }
        }

        Ok(())
    }

    /// Draw a with-replacement sample of genome indices from a
    /// subpopulation's canonical bank, honoring a sex restriction.
    fn sample_genomes<R: Rng + ?Sized>(
        &self,
        subpop_id: SubpopId,
        sample_size: usize,
        requested_sex: Option<IndividualSex>,
        rng: &mut R,
    ) -> Result<(Vec<usize>, PolymorphismMap), SimulationError> {
        let subpop = self
            .subpopulation(subpop_id)
            .ok_or(ConfigError::UnknownSubpopulation(subpop_id))?;
        let child_valid = self.child_generation_valid();

        if requested_sex == Some(IndividualSex::Female)
            && subpop.modeled_chromosome() == GenomeType::YChromosome
        {
            return Err(ConfigError::FemaleSampleOfY(subpop_id).into());
        }

        let genomes = canonical_genomes(subpop, child_valid);
        let first_male = canonical_first_male(subpop, child_valid);

        let mut sample = Vec::with_capacity(sample_size);
        let mut polymorphisms = PolymorphismMap::default();

        for _ in 0..sample_size {
            // select a random genome (not a random individual), skipping
            // null strands and the wrong sex
            let index = loop {
                let candidate = rng.random_range(0..genomes.len());
                if genomes[candidate].is_null() {
                    continue;
                }
                if let Some(sex) = requested_sex {
                    if subpop.sex_enabled() {
                        let individual_sex = if candidate / 2 < first_male {
                            IndividualSex::Female
                        } else {
                            IndividualSex::Male
                        };
                        if individual_sex != sex {
                            continue;
                        }
                    }
                }
                break candidate;
            };

            sample.push(index);
            for &id in genomes[index].mutations() {
                polymorphisms.add_mutation(self.registry().get(id));
            }
        }

        Ok((sample, polymorphisms))
    }

    /// Print a with-replacement sample of genomes in the dump format.
    pub fn print_sample<W: Write, R: Rng + ?Sized>(
        &self,
        out: &mut W,
        subpop_id: SubpopId,
        sample_size: usize,
        requested_sex: Option<IndividualSex>,
        rng: &mut R,
    ) -> Result<(), SimulationError> {
        let (sample, polymorphisms) =
            self.sample_genomes(subpop_id, sample_size, requested_sex, rng)?;
        let subpop = self.subpopulation(subpop_id).expect("checked in sampling");
        let genomes = canonical_genomes(subpop, self.child_generation_valid());

        writeln!(out, "Mutations:")?;
        for (id, polymorphism) in polymorphisms.iter().enumerate() {
            polymorphism.print(out, id)?;
        }

        writeln!(out, "Genomes:")?;
        for &index in &sample {
            let genome = &genomes[index];
            write!(out, "p{subpop_id}:{index} {}", genome.genome_type())?;
            if genome.is_null() {
                write!(out, " <null>")?;
            } else {
                for &mutation_id in genome.mutations() {
                    let polymorphism_id = polymorphisms
                        .index_of(self.registry().get(mutation_id))
                        .expect("every carried mutation was tallied above");
                    write!(out, " {polymorphism_id}")?;
                }
            }
            writeln!(out)?;
        }

        Ok(())
    }

    /// Print a with-replacement sample in `ms` format: segregating site
    /// count, positions scaled into [0, 1], and one 0/1 string per genome.
    pub fn print_sample_ms<W: Write, R: Rng + ?Sized>(
        &self,
        out: &mut W,
        subpop_id: SubpopId,
        sample_size: usize,
        chromosome: &Chromosome,
        requested_sex: Option<IndividualSex>,
        rng: &mut R,
    ) -> Result<(), SimulationError> {
        let (sample, polymorphisms) =
            self.sample_genomes(subpop_id, sample_size, requested_sex, rng)?;
        let subpop = self.subpopulation(subpop_id).expect("checked in sampling");
        let genomes = canonical_genomes(subpop, self.child_generation_valid());

        writeln!(out)?;
        writeln!(out, "//")?;
        writeln!(out, "segsites: {}", polymorphisms.len())?;

        if polymorphisms.len() > 0 {
            write!(out, "positions:")?;
            for polymorphism in polymorphisms.iter() {
                write!(
                    out,
                    " {:.7}",
                    polymorphism.position() as f64 / chromosome.last_position() as f64
                )?;
            }
            writeln!(out)?;
        }

        for &index in &sample {
            let mut genotype = vec![b'0'; polymorphisms.len()];
            for &mutation_id in genomes[index].mutations() {
                if let Some(polymorphism_id) =
                    polymorphisms.index_of(self.registry().get(mutation_id))
                {
                    genotype[polymorphism_id] = b'1';
                }
            }
            out.write_all(&genotype)?;
            writeln!(out)?;
        }

        Ok(())
    }
}
