//! Subpopulations: double-buffered genome banks and fitness bookkeeping.
//!
//! A subpopulation owns two genome banks of length `2 × size` (two strands
//! per individual, adjacent). During mating the parent bank is read-only and
//! the child bank is write-only; the generation swapper promotes children to
//! parents. When sexes are modeled, females occupy `[0, first_male_index)`
//! and males the rest, and genome typing follows the modeled chromosome.

use crate::base::{sampling, IndividualSex, MutationId, MutationRegistry, SubpopId};
use crate::errors::{ConfigError, SimulationError};
use crate::evolution::{apply_fitness_callbacks, Interpreter, ScriptBlock};
use crate::genome::{Genome, GenomeType};
use rand::Rng;
use std::collections::BTreeMap;

/// One subpopulation: parent and child genome banks plus mating parameters.
#[derive(Debug)]
pub struct Subpopulation {
    id: SubpopId,
    pub(crate) parent_genomes: Vec<Genome>,
    pub(crate) child_genomes: Vec<Genome>,
    pub(crate) parent_subpop_size: usize,
    pub(crate) child_subpop_size: usize,
    pub(crate) parent_sex_ratio: f64,
    pub(crate) child_sex_ratio: f64,
    pub(crate) parent_first_male_index: usize,
    pub(crate) child_first_male_index: usize,
    sex_enabled: bool,
    modeled_chromosome: GenomeType,
    x_dominance_coeff: f64,
    pub(crate) selfing_fraction: f64,
    pub(crate) migrant_fractions: BTreeMap<SubpopId, f64>,
    pub(crate) cached_parental_fitness: Vec<f64>,
    pub(crate) cached_female_fitness: Vec<f64>,
    pub(crate) cached_male_fitness: Vec<f64>,
    pub(crate) parental_total_fitness: f64,
    pub(crate) female_total_fitness: f64,
    pub(crate) male_total_fitness: f64,
    pub(crate) child_generation_valid: bool,
}

impl Subpopulation {
    /// Create a hermaphroditic subpopulation of autosomal individuals.
    pub fn new_hermaphroditic(id: SubpopId, size: usize) -> Result<Self, ConfigError> {
        if size < 1 {
            return Err(ConfigError::EmptySubpopulation(id));
        }

        let mut subpop = Self {
            id,
            parent_genomes: Vec::new(),
            child_genomes: Vec::new(),
            parent_subpop_size: size,
            child_subpop_size: size,
            parent_sex_ratio: 0.0,
            child_sex_ratio: 0.0,
            parent_first_male_index: size,
            child_first_male_index: size,
            sex_enabled: false,
            modeled_chromosome: GenomeType::Autosome,
            x_dominance_coeff: 1.0,
            selfing_fraction: 0.0,
            migrant_fractions: BTreeMap::new(),
            cached_parental_fitness: Vec::new(),
            cached_female_fitness: Vec::new(),
            cached_male_fitness: Vec::new(),
            parental_total_fitness: 0.0,
            female_total_fitness: 0.0,
            male_total_fitness: 0.0,
            child_generation_valid: false,
        };
        subpop.generate_children_to_fit(true)?;
        subpop.reset_fitness_to_neutral();
        Ok(subpop)
    }

    /// Create a sex-enabled subpopulation modeling the given chromosome.
    ///
    /// `sex_ratio` is the fraction of males; it must leave at least one
    /// individual of each sex.
    pub fn new_sexual(
        id: SubpopId,
        size: usize,
        sex_ratio: f64,
        modeled_chromosome: GenomeType,
        x_dominance_coeff: f64,
    ) -> Result<Self, ConfigError> {
        if size < 1 {
            return Err(ConfigError::EmptySubpopulation(id));
        }

        let mut subpop = Self {
            id,
            parent_genomes: Vec::new(),
            child_genomes: Vec::new(),
            parent_subpop_size: size,
            child_subpop_size: size,
            parent_sex_ratio: sex_ratio,
            child_sex_ratio: sex_ratio,
            parent_first_male_index: 0,
            child_first_male_index: 0,
            sex_enabled: true,
            modeled_chromosome,
            x_dominance_coeff,
            selfing_fraction: 0.0,
            migrant_fractions: BTreeMap::new(),
            cached_parental_fitness: Vec::new(),
            cached_female_fitness: Vec::new(),
            cached_male_fitness: Vec::new(),
            parental_total_fitness: 0.0,
            female_total_fitness: 0.0,
            male_total_fitness: 0.0,
            child_generation_valid: false,
        };
        subpop.generate_children_to_fit(true)?;
        subpop.reset_fitness_to_neutral();
        Ok(subpop)
    }

    /// Subpopulation id.
    #[inline]
    pub fn id(&self) -> SubpopId {
        self.id
    }

    /// `true` if this subpopulation models separate sexes.
    #[inline]
    pub fn sex_enabled(&self) -> bool {
        self.sex_enabled
    }

    /// The chromosome type being modeled.
    #[inline]
    pub fn modeled_chromosome(&self) -> GenomeType {
        self.modeled_chromosome
    }

    /// Dominance coefficient applied to hemizygous sex-chromosome carriers.
    #[inline]
    pub fn x_dominance_coeff(&self) -> f64 {
        self.x_dominance_coeff
    }

    /// Number of parent individuals.
    #[inline]
    pub fn parent_subpop_size(&self) -> usize {
        self.parent_subpop_size
    }

    /// Number of child individuals.
    #[inline]
    pub fn child_subpop_size(&self) -> usize {
        self.child_subpop_size
    }

    /// Fraction of children that are male (sex-enabled models only).
    #[inline]
    pub fn child_sex_ratio(&self) -> f64 {
        self.child_sex_ratio
    }

    /// Fraction of parents that were generated male.
    #[inline]
    pub fn parent_sex_ratio(&self) -> f64 {
        self.parent_sex_ratio
    }

    /// Index of the first male in the parent bank.
    #[inline]
    pub fn parent_first_male_index(&self) -> usize {
        self.parent_first_male_index
    }

    /// Index of the first male in the child bank.
    #[inline]
    pub fn child_first_male_index(&self) -> usize {
        self.child_first_male_index
    }

    /// Fraction of offspring produced by selfing.
    #[inline]
    pub fn selfing_fraction(&self) -> f64 {
        self.selfing_fraction
    }

    /// Migrant fractions by source subpopulation.
    #[inline]
    pub fn migrant_fractions(&self) -> &BTreeMap<SubpopId, f64> {
        &self.migrant_fractions
    }

    /// The parent genome bank.
    #[inline]
    pub fn parent_genomes(&self) -> &[Genome] {
        &self.parent_genomes
    }

    /// Mutable access to the parent genome bank.
    pub fn parent_genomes_mut(&mut self) -> &mut [Genome] {
        &mut self.parent_genomes
    }

    /// The child genome bank.
    #[inline]
    pub fn child_genomes(&self) -> &[Genome] {
        &self.child_genomes
    }

    /// Mutable access to the child genome bank.
    pub fn child_genomes_mut(&mut self) -> &mut [Genome] {
        &mut self.child_genomes
    }

    /// Cached per-parent fitness values.
    #[inline]
    pub fn cached_parental_fitness(&self) -> &[f64] {
        &self.cached_parental_fitness
    }

    /// Sum of the cached parental fitness values.
    #[inline]
    pub fn parental_total_fitness(&self) -> f64 {
        self.parental_total_fitness
    }

    /// Sex of a parent individual by index.
    pub fn sex_of_parent(&self, index: usize) -> IndividualSex {
        if !self.sex_enabled {
            IndividualSex::Hermaphrodite
        } else if index < self.parent_first_male_index {
            IndividualSex::Female
        } else {
            IndividualSex::Male
        }
    }

    /// Sex of a child individual by index.
    pub fn sex_of_child(&self, index: usize) -> IndividualSex {
        if !self.sex_enabled {
            IndividualSex::Hermaphrodite
        } else if index < self.child_first_male_index {
            IndividualSex::Female
        } else {
            IndividualSex::Male
        }
    }

    /// Compute the female/male child counts implied by the child sex ratio.
    ///
    /// # Errors
    /// Rejects a split that leaves either sex empty.
    pub fn child_sex_counts(&self) -> Result<(usize, usize), ConfigError> {
        let total = self.child_subpop_size;
        let males = (total as f64 * self.child_sex_ratio).round() as usize;
        let females = total.saturating_sub(males);
        if males == 0 || females == 0 {
            return Err(ConfigError::UnisexualPopulation {
                subpop: self.id,
                sex_ratio: self.child_sex_ratio,
            });
        }
        Ok((females, males))
    }

    /// Regenerate the child genome bank (and optionally the parent bank) to
    /// fit the current sizes and sex ratios.
    ///
    /// Genome typing per individual follows the modeled chromosome: with an
    /// X model males carry a null Y strand; with a Y model every X strand is
    /// null and only male Y strands are real.
    pub fn generate_children_to_fit(&mut self, parents_also: bool) -> Result<(), ConfigError> {
        let (child_genomes, child_first_male) =
            self.generate_bank(self.child_subpop_size, self.child_sex_ratio)?;
        self.child_genomes = child_genomes;
        self.child_first_male_index = child_first_male;

        if parents_also {
            let (parent_genomes, parent_first_male) =
                self.generate_bank(self.parent_subpop_size, self.parent_sex_ratio)?;
            self.parent_genomes = parent_genomes;
            self.parent_first_male_index = parent_first_male;
        }
        Ok(())
    }

    fn generate_bank(
        &self,
        size: usize,
        sex_ratio: f64,
    ) -> Result<(Vec<Genome>, usize), ConfigError> {
        if !self.sex_enabled {
            let mut bank = Vec::with_capacity(2 * size);
            for _ in 0..size {
                bank.push(Genome::new(GenomeType::Autosome));
                bank.push(Genome::new(GenomeType::Autosome));
            }
            return Ok((bank, size));
        }

        let males = (size as f64 * sex_ratio).round() as usize;
        let females = size.saturating_sub(males);
        if males == 0 || females == 0 {
            return Err(ConfigError::UnisexualPopulation {
                subpop: self.id,
                sex_ratio,
            });
        }
        let first_male_index = females;

        let mut bank = Vec::with_capacity(2 * size);
        for index in 0..size {
            let female = index < first_male_index;
            match self.modeled_chromosome {
                GenomeType::Autosome => {
                    bank.push(Genome::new(GenomeType::Autosome));
                    bank.push(Genome::new(GenomeType::Autosome));
                }
                GenomeType::XChromosome => {
                    bank.push(Genome::new(GenomeType::XChromosome));
                    if female {
                        bank.push(Genome::new(GenomeType::XChromosome));
                    } else {
                        bank.push(Genome::new_null(GenomeType::YChromosome));
                    }
                }
                GenomeType::YChromosome => {
                    bank.push(Genome::new_null(GenomeType::XChromosome));
                    if female {
                        bank.push(Genome::new_null(GenomeType::XChromosome));
                    } else {
                        bank.push(Genome::new(GenomeType::YChromosome));
                    }
                }
            }
        }
        Ok((bank, first_male_index))
    }

    /// Swap the child and parent banks, sizes, sex ratios, and first-male
    /// indices. The child generation becomes invalid.
    pub fn swap_child_and_parent_genomes(&mut self) {
        std::mem::swap(&mut self.parent_genomes, &mut self.child_genomes);
        std::mem::swap(&mut self.parent_subpop_size, &mut self.child_subpop_size);
        std::mem::swap(&mut self.parent_sex_ratio, &mut self.child_sex_ratio);
        std::mem::swap(
            &mut self.parent_first_male_index,
            &mut self.child_first_male_index,
        );
        self.child_generation_valid = false;
    }

    /// Reset every cached fitness value to 1.0.
    ///
    /// Used at construction and when parents are imported from another
    /// subpopulation by fitness-weighted draws: those parents were already
    /// selected by fitness, so re-applying it would double-count.
    pub fn reset_fitness_to_neutral(&mut self) {
        let size = self.parent_subpop_size;
        self.cached_parental_fitness = vec![1.0; size];
        self.parental_total_fitness = size as f64;

        if self.sex_enabled {
            let first_male = self.parent_first_male_index;
            self.cached_female_fitness = (0..size)
                .map(|i| if i < first_male { 1.0 } else { 0.0 })
                .collect();
            self.cached_male_fitness = (0..size)
                .map(|i| if i < first_male { 0.0 } else { 1.0 })
                .collect();
            self.female_total_fitness = first_male as f64;
            self.male_total_fitness = (size - first_male) as f64;
        } else {
            self.cached_female_fitness = Vec::new();
            self.cached_male_fitness = Vec::new();
            self.female_total_fitness = 0.0;
            self.male_total_fitness = 0.0;
        }
    }

    /// Recompute the cached fitness tables from the parent bank, running
    /// any applicable fitness() callbacks per mutation.
    pub fn update_fitness(
        &mut self,
        callbacks: &[&ScriptBlock],
        interpreter: &mut dyn Interpreter,
        registry: &MutationRegistry,
    ) -> Result<(), SimulationError> {
        let size = self.parent_subpop_size;
        let mut fitness = Vec::with_capacity(size);
        for index in 0..size {
            fitness.push(self.fitness_of_parent(index, callbacks, interpreter, registry)?);
        }

        self.parental_total_fitness = fitness.iter().sum();
        self.cached_parental_fitness = fitness;

        if self.sex_enabled {
            let first_male = self.parent_first_male_index;
            self.cached_female_fitness = self
                .cached_parental_fitness
                .iter()
                .enumerate()
                .map(|(i, &w)| if i < first_male { w } else { 0.0 })
                .collect();
            self.cached_male_fitness = self
                .cached_parental_fitness
                .iter()
                .enumerate()
                .map(|(i, &w)| if i < first_male { 0.0 } else { w })
                .collect();
            self.female_total_fitness = self.cached_female_fitness.iter().sum();
            self.male_total_fitness = self.cached_male_fitness.iter().sum();
        }
        Ok(())
    }

    /// Multiplicative fitness of one parent over its two strands.
    fn fitness_of_parent(
        &self,
        index: usize,
        callbacks: &[&ScriptBlock],
        interpreter: &mut dyn Interpreter,
        registry: &MutationRegistry,
    ) -> Result<f64, SimulationError> {
        let genome1 = &self.parent_genomes[2 * index];
        let genome2 = &self.parent_genomes[2 * index + 1];

        let mut w = 1.0;

        match (genome1.is_null(), genome2.is_null()) {
            (true, true) => Ok(1.0),
            (false, true) | (true, false) => {
                // hemizygous: one real strand, scaled by the X dominance
                let strand = if genome1.is_null() { genome2 } else { genome1 };
                for &id in strand.mutations() {
                    let contribution = self.mutation_contribution(
                        id,
                        None,
                        callbacks,
                        interpreter,
                        registry,
                    )?;
                    w *= contribution;
                    if w <= 0.0 {
                        return Ok(0.0);
                    }
                }
                Ok(w)
            }
            (false, false) => {
                let strand1 = genome1.mutations();
                let strand2 = genome2.mutations();
                let mut i1 = 0usize;
                let mut i2 = 0usize;

                while i1 < strand1.len() && i2 < strand2.len() {
                    let pos1 = registry.get(strand1[i1]).position();
                    let pos2 = registry.get(strand2[i2]).position();

                    if pos1 < pos2 {
                        w *= self.mutation_contribution(
                            strand1[i1],
                            Some(false),
                            callbacks,
                            interpreter,
                            registry,
                        )?;
                        i1 += 1;
                    } else if pos2 < pos1 {
                        w *= self.mutation_contribution(
                            strand2[i2],
                            Some(false),
                            callbacks,
                            interpreter,
                            registry,
                        )?;
                        i2 += 1;
                    } else {
                        // equal positions: pair up identical handles as
                        // homozygous, the rest are heterozygous
                        let position = pos1;
                        let run1_start = i1;
                        let run2_start = i2;
                        while i1 < strand1.len()
                            && registry.get(strand1[i1]).position() == position
                        {
                            i1 += 1;
                        }
                        while i2 < strand2.len()
                            && registry.get(strand2[i2]).position() == position
                        {
                            i2 += 1;
                        }
                        let run1 = &strand1[run1_start..i1];
                        let run2 = &strand2[run2_start..i2];

                        for &id in run1 {
                            let homozygous = run2.contains(&id);
                            w *= self.mutation_contribution(
                                id,
                                Some(homozygous),
                                callbacks,
                                interpreter,
                                registry,
                            )?;
                        }
                        for &id in run2 {
                            if !run1.contains(&id) {
                                w *= self.mutation_contribution(
                                    id,
                                    Some(false),
                                    callbacks,
                                    interpreter,
                                    registry,
                                )?;
                            }
                        }
                    }
                    if w <= 0.0 {
                        return Ok(0.0);
                    }
                }

                for &id in &strand1[i1..] {
                    w *= self.mutation_contribution(
                        id,
                        Some(false),
                        callbacks,
                        interpreter,
                        registry,
                    )?;
                }
                for &id in &strand2[i2..] {
                    w *= self.mutation_contribution(
                        id,
                        Some(false),
                        callbacks,
                        interpreter,
                        registry,
                    )?;
                }

                Ok(w.max(0.0))
            }
        }
    }

    /// Fitness contribution of one mutation, after fitness() callbacks.
    ///
    /// `homozygous` is `None` for a hemizygous carrier.
    fn mutation_contribution(
        &self,
        id: MutationId,
        homozygous: Option<bool>,
        callbacks: &[&ScriptBlock],
        interpreter: &mut dyn Interpreter,
        registry: &MutationRegistry,
    ) -> Result<f64, SimulationError> {
        let mutation = registry.get(id);
        let s = mutation.selection_coeff();
        let rel_fitness = match homozygous {
            Some(true) => 1.0 + s,
            Some(false) => 1.0 + mutation.mutation_type().dominance_coeff() * s,
            None => 1.0 + self.x_dominance_coeff * s,
        };

        if callbacks.is_empty() {
            return Ok(rel_fitness.max(0.0));
        }

        let rewritten = apply_fitness_callbacks(
            id,
            mutation.mutation_type().id(),
            rel_fitness,
            homozygous,
            self.id,
            callbacks,
            interpreter,
        )?;
        Ok(rewritten.max(0.0))
    }

    /// Draw a parent index weighted by cached parental fitness.
    ///
    /// Two successive draws may return the same individual; the asexual
    /// mating path deliberately permits such incidental self-mating even
    /// when the selfing fraction is zero.
    pub fn draw_parent_using_fitness<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        sampling::weighted_index(
            &self.cached_parental_fitness,
            self.parental_total_fitness,
            rng,
        )
    }

    /// Draw a female parent index weighted by cached female fitness.
    pub fn draw_female_parent_using_fitness<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        debug_assert!(self.sex_enabled);
        let index = sampling::weighted_index(
            &self.cached_female_fitness,
            self.female_total_fitness,
            rng,
        );
        debug_assert!(index < self.parent_first_male_index);
        index
    }

    /// Draw a male parent index weighted by cached male fitness.
    pub fn draw_male_parent_using_fitness<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        debug_assert!(self.sex_enabled);
        let index = sampling::weighted_index(
            &self.cached_male_fitness,
            self.male_total_fitness,
            rng,
        );
        debug_assert!(index >= self.parent_first_male_index);
        index
    }
}
