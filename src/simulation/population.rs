//! The population facade: subpopulation administration and shared state.
//!
//! The population owns the subpopulation map, the mutation registry, and
//! the substitution log. Administrative operations validate their
//! preconditions and fail loudly; size and sex-ratio changes are
//! admission-only operations that act on the child generation before it is
//! produced.

use crate::base::{MutationRegistry, SubpopId, Substitution};
use crate::errors::{ConfigError, SimulationError};
use crate::simulation::{SexOptions, Subpopulation};
use rand::Rng;
use std::collections::BTreeMap;
use tracing::debug;

/// All subpopulations of a simulation plus the shared mutation state.
#[derive(Debug)]
pub struct Population {
    pub(crate) subpops: BTreeMap<SubpopId, Subpopulation>,
    pub(crate) registry: MutationRegistry,
    pub(crate) substitutions: Vec<Substitution>,
    sex: Option<SexOptions>,
    /// `true` while the child banks are the live, canonical layer
    pub(crate) child_generation_valid: bool,
    /// Non-null genomes counted by the last tally pass
    pub(crate) total_genome_count: usize,
}

impl Population {
    /// Create an empty population. `sex` enables separate sexes for every
    /// subpopulation subsequently added.
    pub fn new(sex: Option<SexOptions>) -> Self {
        Self {
            subpops: BTreeMap::new(),
            registry: MutationRegistry::new(),
            substitutions: Vec::new(),
            sex,
            child_generation_valid: false,
            total_genome_count: 0,
        }
    }

    /// `true` if this population models separate sexes.
    #[inline]
    pub fn sex_enabled(&self) -> bool {
        self.sex.is_some()
    }

    /// `true` while child banks are the canonical layer.
    #[inline]
    pub fn child_generation_valid(&self) -> bool {
        self.child_generation_valid
    }

    /// Non-null genome count from the last tally pass.
    #[inline]
    pub fn total_genome_count(&self) -> usize {
        self.total_genome_count
    }

    /// Number of subpopulations.
    #[inline]
    pub fn subpop_count(&self) -> usize {
        self.subpops.len()
    }

    /// Look up a subpopulation.
    pub fn subpopulation(&self, id: SubpopId) -> Option<&Subpopulation> {
        self.subpops.get(&id)
    }

    /// Look up a subpopulation mutably.
    pub fn subpopulation_mut(&mut self, id: SubpopId) -> Option<&mut Subpopulation> {
        self.subpops.get_mut(&id)
    }

    /// Iterate over subpopulations in id order.
    pub fn subpopulations(&self) -> impl Iterator<Item = (&SubpopId, &Subpopulation)> {
        self.subpops.iter()
    }

    /// Subpopulation ids in order.
    pub fn subpop_ids(&self) -> Vec<SubpopId> {
        self.subpops.keys().copied().collect()
    }

    /// The mutation registry.
    #[inline]
    pub fn registry(&self) -> &MutationRegistry {
        &self.registry
    }

    /// Mutable access to the mutation registry.
    pub fn registry_mut(&mut self) -> &mut MutationRegistry {
        &mut self.registry
    }

    /// The substitution log, in fixation order.
    #[inline]
    pub fn substitutions(&self) -> &[Substitution] {
        &self.substitutions
    }

    fn build_subpop(
        &self,
        id: SubpopId,
        size: usize,
        sex_ratio: Option<f64>,
    ) -> Result<Subpopulation, ConfigError> {
        let mut subpop = match self.sex {
            Some(sex) => Subpopulation::new_sexual(
                id,
                size,
                sex_ratio.unwrap_or(0.5),
                sex.modeled_chromosome,
                sex.x_dominance_coeff,
            )?,
            // the sex ratio is meaningless without sexes and is ignored
            None => Subpopulation::new_hermaphroditic(id, size)?,
        };
        // synchronize the new subpop's stage with ours
        subpop.child_generation_valid = self.child_generation_valid;
        Ok(subpop)
    }

    /// Add a new, empty subpopulation.
    pub fn add_subpopulation(
        &mut self,
        id: SubpopId,
        size: usize,
        sex_ratio: Option<f64>,
    ) -> Result<(), SimulationError> {
        if self.subpops.contains_key(&id) {
            return Err(ConfigError::DuplicateSubpopulation(id).into());
        }

        let subpop = self.build_subpop(id, size, sex_ratio)?;
        self.subpops.insert(id, subpop);
        debug!(subpop = id, size, "added subpopulation");
        Ok(())
    }

    /// Add a subpopulation whose parents are drawn from a source
    /// subpopulation by fitness-weighted sampling.
    ///
    /// Fitness is not recomputed for the new subpopulation: the migrants
    /// were already selected by fitness, and re-applying it would
    /// double-count selection in this generation.
    pub fn add_subpopulation_from<R: Rng + ?Sized>(
        &mut self,
        id: SubpopId,
        source_id: SubpopId,
        size: usize,
        sex_ratio: Option<f64>,
        rng: &mut R,
    ) -> Result<(), SimulationError> {
        if self.subpops.contains_key(&id) {
            return Err(ConfigError::DuplicateSubpopulation(id).into());
        }
        if !self.subpops.contains_key(&source_id) {
            return Err(ConfigError::UnknownSubpopulation(source_id).into());
        }

        let mut subpop = self.build_subpop(id, size, sex_ratio)?;
        let source = &self.subpops[&source_id];

        for parent_index in 0..subpop.parent_subpop_size {
            let migrant_index = if self.sex.is_some() {
                if parent_index < subpop.parent_first_male_index {
                    source.draw_female_parent_using_fitness(rng)
                } else {
                    source.draw_male_parent_using_fitness(rng)
                }
            } else {
                source.draw_parent_using_fitness(rng)
            };

            subpop.parent_genomes[2 * parent_index]
                .copy_from(&source.parent_genomes[2 * migrant_index]);
            subpop.parent_genomes[2 * parent_index + 1]
                .copy_from(&source.parent_genomes[2 * migrant_index + 1]);
        }

        self.subpops.insert(id, subpop);
        debug!(subpop = id, source = source_id, size, "added subpopulation from source");
        Ok(())
    }

    /// Set the size of a subpopulation's next child generation.
    ///
    /// A size of zero erases the subpopulation and purges it from every
    /// other subpopulation's migrant map.
    pub fn set_size(&mut self, id: SubpopId, size: usize) -> Result<(), SimulationError> {
        if self.child_generation_valid {
            return Err(ConfigError::ChildGenerationActive("set_size").into());
        }
        if !self.subpops.contains_key(&id) {
            return Err(ConfigError::UnknownSubpopulation(id).into());
        }

        if size == 0 {
            self.subpops.remove(&id);
            for subpop in self.subpops.values_mut() {
                subpop.migrant_fractions.remove(&id);
            }
            debug!(subpop = id, "removed subpopulation");
        } else {
            let subpop = self.subpops.get_mut(&id).expect("existence checked above");
            subpop.child_subpop_size = size;
            subpop.generate_children_to_fit(false)?;
        }
        Ok(())
    }

    /// Set the sex ratio of a subpopulation's next child generation.
    pub fn set_sex_ratio(&mut self, id: SubpopId, sex_ratio: f64) -> Result<(), SimulationError> {
        if self.child_generation_valid {
            return Err(ConfigError::ChildGenerationActive("set_sex_ratio").into());
        }
        let Some(subpop) = self.subpops.get_mut(&id) else {
            return Err(ConfigError::UnknownSubpopulation(id).into());
        };
        if !subpop.sex_enabled() {
            return Err(ConfigError::SexNotEnabled(id).into());
        }

        subpop.child_sex_ratio = sex_ratio;
        subpop.generate_children_to_fit(false)?;
        Ok(())
    }

    /// Set the selfing fraction of a subpopulation.
    ///
    /// Selfing is only permitted in models without sexes.
    pub fn set_selfing(&mut self, id: SubpopId, fraction: f64) -> Result<(), SimulationError> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ConfigError::SelfingFractionOutOfRange(fraction).into());
        }
        let Some(subpop) = self.subpops.get_mut(&id) else {
            return Err(ConfigError::UnknownSubpopulation(id).into());
        };
        if subpop.sex_enabled() && fraction > 0.0 {
            return Err(ConfigError::SelfingWithSexes(id).into());
        }

        subpop.selfing_fraction = fraction;
        Ok(())
    }

    /// Set the migrant fraction arriving in `id` from `source_id`.
    ///
    /// A fraction of zero erases the entry.
    pub fn set_migration(
        &mut self,
        id: SubpopId,
        source_id: SubpopId,
        fraction: f64,
    ) -> Result<(), SimulationError> {
        if !self.subpops.contains_key(&source_id) {
            return Err(ConfigError::UnknownSubpopulation(source_id).into());
        }
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ConfigError::MigrationFractionOutOfRange(fraction).into());
        }
        let Some(subpop) = self.subpops.get_mut(&id) else {
            return Err(ConfigError::UnknownSubpopulation(id).into());
        };

        subpop.migrant_fractions.remove(&source_id);
        if fraction > 0.0 {
            subpop.migrant_fractions.insert(source_id, fraction);
        }
        Ok(())
    }

    /// Collect child-bank handles that refer to freed registry slots.
    ///
    /// An empty result means no stale handles exist.
    #[cfg(feature = "zombie-checks")]
    pub fn zombie_handles(&self) -> Vec<crate::base::MutationId> {
        let mut zombies = Vec::new();
        for subpop in self.subpops.values() {
            for genome in subpop.child_genomes() {
                zombies.extend(self.registry.find_zombies(genome.mutations().iter()));
            }
        }
        zombies
    }
}
