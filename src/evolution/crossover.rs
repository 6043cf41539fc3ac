//! Gamete construction: crossover, sex-chromosome typing, and new mutations.
//!
//! [`crossover_mutation`] builds one child genome from two parental genomes
//! plus freshly drawn mutations. The algorithm walks the current parental
//! strand, the standby strand, and the sorted list of new mutations with
//! three monotone cursors, switching strands at each recombination
//! breakpoint. A sentinel breakpoint one past the chromosome end flushes the
//! final tail without special-casing.
//!
//! With a list of breakpoints `(r1, r2)`:
//!
//! ```text
//! mutations (      x < r1) are taken from parent strand 1
//! mutations (r1 <= x < r2) are taken from parent strand 2
//! mutations (r2 <= x     ) are taken from parent strand 1
//! ```

use crate::base::{Generation, IndividualSex, MutationId, MutationRegistry, SubpopId};
use crate::errors::{SimulationError, TypingError};
use crate::genome::{Chromosome, Genome, GenomeType};
use rand::Rng;

/// Build one child genome from the two strands of one parent.
///
/// `parent_bank` is the read-only parent genome bank of the source
/// subpopulation; `parent1_genome_index` and `parent2_genome_index` address
/// the two strands crossover reads from. New mutations are registered in
/// `registry` and woven into the child.
///
/// Sex-chromosome cases where crossover cannot occur (X from an XY father,
/// Y inheritance) degrade to a single-strand copy of the required strand.
/// Every inconsistent parent/child typing combination is a fatal error.
#[allow(clippy::too_many_arguments)]
pub fn crossover_mutation<R: Rng + ?Sized>(
    child: &mut Genome,
    parent_bank: &[Genome],
    mut parent1_genome_index: usize,
    mut parent2_genome_index: usize,
    source_subpop_id: SubpopId,
    chromosome: &Chromosome,
    generation: Generation,
    child_sex: IndividualSex,
    registry: &mut MutationRegistry,
    rng: &mut R,
) -> Result<(), SimulationError> {
    let child_type = child.genome_type();
    let parent1_type = parent_bank[parent1_genome_index].genome_type();
    let parent2_type = parent_bank[parent2_genome_index].genome_type();

    // if true, crossover cannot occur and only parent strand 1 is read
    let mut use_only_strand_1 = false;
    // if true, swap the strands up front: 50% of the time for random
    // assortment, or always when typing directs us to strand 2
    let mut do_swap = true;

    let mismatch = || {
        SimulationError::Typing(TypingError::ParentChildMismatch {
            child: child_type,
            parent1: parent1_type,
            parent2: parent2_type,
        })
    };

    match child_type {
        GenomeType::Autosome => {
            // modeling autosomes, child sex is irrelevant
            if parent1_type != GenomeType::Autosome || parent2_type != GenomeType::Autosome {
                return Err(mismatch());
            }
        }
        GenomeType::XChromosome | GenomeType::YChromosome => {
            if child_sex == IndividualSex::Hermaphrodite {
                return Err(TypingError::HermaphroditeSexChromosome.into());
            }
            if parent1_type == GenomeType::Autosome || parent2_type == GenomeType::Autosome {
                return Err(mismatch());
            }

            if child_type == GenomeType::XChromosome {
                match child_sex {
                    IndividualSex::Male => {
                        // a male's X must come from the maternal (X, X)
                        // parent; a Y strand here means the wrong parent
                        if parent1_type == GenomeType::YChromosome
                            || parent2_type == GenomeType::YChromosome
                        {
                            return Err(mismatch());
                        }
                        // inheritance from the female, ordinary crossover
                    }
                    IndividualSex::Female => {
                        if parent1_type == GenomeType::YChromosome
                            && parent2_type == GenomeType::XChromosome
                        {
                            // paternal (Y, X): take the X, strand 2
                            use_only_strand_1 = true;
                            do_swap = true;
                        } else if parent1_type == GenomeType::XChromosome
                            && parent2_type == GenomeType::YChromosome
                        {
                            // paternal (X, Y): take the X, strand 1
                            use_only_strand_1 = true;
                            do_swap = false;
                        }
                        // else maternal (X, X), ordinary crossover
                    }
                    IndividualSex::Hermaphrodite => unreachable!(),
                }
            } else {
                // Y child, so the child must be male
                if child_sex == IndividualSex::Female {
                    return Err(TypingError::FemaleYChromosome.into());
                }

                if parent1_type == GenomeType::YChromosome
                    && parent2_type == GenomeType::XChromosome
                {
                    // paternal (Y, X): take the Y, strand 1
                    use_only_strand_1 = true;
                    do_swap = false;
                } else if parent1_type == GenomeType::XChromosome
                    && parent2_type == GenomeType::YChromosome
                {
                    // paternal (X, Y): take the Y, strand 2
                    use_only_strand_1 = true;
                    do_swap = true;
                } else {
                    // (X, X) cannot supply a Y
                    return Err(mismatch());
                }
            }
        }
    }

    // random assortment, or the forced strand selection from typing
    if do_swap && (use_only_strand_1 || rng.random::<f64>() < 0.5) {
        std::mem::swap(&mut parent1_genome_index, &mut parent2_genome_index);
    }

    // null cases: a null strand cannot cross over and cannot mutate
    if child.is_null() {
        if use_only_strand_1 {
            if !parent_bank[parent1_genome_index].is_null() {
                return Err(TypingError::NullChildNonNullStrand.into());
            }
        } else if !parent_bank[parent1_genome_index].is_null()
            || !parent_bank[parent2_genome_index].is_null()
        {
            return Err(TypingError::NullChildNonNullStrand.into());
        }
        return Ok(());
    }

    if use_only_strand_1 {
        if parent_bank[parent1_genome_index].is_null() {
            return Err(TypingError::NonNullChildNullStrand.into());
        }
    } else if parent_bank[parent1_genome_index].is_null()
        || parent_bank[parent2_genome_index].is_null()
    {
        return Err(TypingError::NonNullChildNullStrand.into());
    }

    // start with a clean slate in the child genome
    child.clear();

    let (num_mutations, num_breakpoints) = if use_only_strand_1 {
        (chromosome.draw_mutation_count(rng), 0)
    } else {
        chromosome.draw_mutation_and_breakpoint_counts(rng)
    };

    // mutations are rare, so streamline the case where none occur
    if num_mutations == 0 {
        if num_breakpoints == 0 {
            // no mutations and no crossovers: plain copy of the strand
            child.copy_from(&parent_bank[parent1_genome_index]);
            return Ok(());
        }

        let breakpoints = prepare_breakpoints(chromosome, num_breakpoints, rng);
        copy_with_crossovers(
            child,
            parent_bank[parent1_genome_index].mutations(),
            parent_bank[parent2_genome_index].mutations(),
            &breakpoints,
            registry,
        );
        return Ok(());
    }

    // register the new mutations and keep them sorted in a scratch genome
    let mut mutations_to_add = Genome::new(child.genome_type());
    for _ in 0..num_mutations {
        let mutation = chromosome.draw_new_mutation(source_subpop_id, generation, rng);
        let id = registry.insert(mutation);
        mutations_to_add.insert_sorted(id, registry);
    }

    let breakpoints = prepare_breakpoints(chromosome, num_breakpoints, rng);

    // with zero breakpoints only the sentinel remains and the second strand
    // is never read; it may be null in single-strand mode
    let strand2: &[MutationId] = if num_breakpoints == 0 {
        &[]
    } else {
        parent_bank[parent2_genome_index].mutations()
    };

    merge_strands(
        child,
        parent_bank[parent1_genome_index].mutations(),
        strand2,
        mutations_to_add.mutations(),
        &breakpoints,
        registry,
    );

    Ok(())
}

/// Draw `n` breakpoints, append the end-of-chromosome sentinel, sort, and
/// drop duplicates.
fn prepare_breakpoints<R: Rng + ?Sized>(
    chromosome: &Chromosome,
    n: usize,
    rng: &mut R,
) -> Vec<i64> {
    let mut breakpoints = chromosome.draw_breakpoints(n, rng);
    breakpoints.push(chromosome.last_position() + 1);
    breakpoints.sort_unstable();
    breakpoints.dedup();
    breakpoints
}

#[inline]
fn position_at(registry: &MutationRegistry, strand: &[MutationId], index: usize) -> i64 {
    if index < strand.len() {
        registry.get(strand[index]).position()
    } else {
        i64::MAX
    }
}

/// Crossover without new mutations: alternate strands at each breakpoint.
///
/// No duplicate check is needed; each parental strand is already
/// duplicate-free and only one strand contributes at any position.
fn copy_with_crossovers(
    child: &mut Genome,
    strand1: &[MutationId],
    strand2: &[MutationId],
    breakpoints: &[i64],
    registry: &MutationRegistry,
) {
    let mut current = strand1;
    let mut current_index = 0usize;
    let mut standby = strand2;
    let mut standby_index = 0usize;

    for &breakpoint in breakpoints {
        // emit everything on the active strand before the breakpoint
        while position_at(registry, current, current_index) < breakpoint {
            child.push(current[current_index]);
            current_index += 1;
        }

        // switch strands, then skip what the standby strand carried before
        // the breakpoint; it was not the active strand there
        std::mem::swap(&mut current, &mut standby);
        std::mem::swap(&mut current_index, &mut standby_index);
        while position_at(registry, current, current_index) < breakpoint {
            current_index += 1;
        }
    }
}

/// Merge the active parental strand with the sorted new-mutation list,
/// switching strands at breakpoints and suppressing exact-duplicate handles.
fn merge_strands(
    child: &mut Genome,
    strand1: &[MutationId],
    strand2: &[MutationId],
    new_mutations: &[MutationId],
    breakpoints: &[i64],
    registry: &MutationRegistry,
) {
    let mut current = strand1;
    let mut current_index = 0usize;
    let mut standby = strand2;
    let mut standby_index = 0usize;
    let mut new_index = 0usize;

    let mut break_index = 0usize;
    loop {
        let breakpoint = breakpoints[break_index];
        let mut parent_pos = position_at(registry, current, current_index);
        let mut new_pos = position_at(registry, new_mutations, new_index);

        // emit parental and new mutations in position order up to the
        // breakpoint
        while parent_pos < breakpoint || new_pos < breakpoint {
            while parent_pos < breakpoint && parent_pos <= new_pos {
                emit_deduplicated(child, current[current_index], parent_pos, registry);
                current_index += 1;
                parent_pos = position_at(registry, current, current_index);
            }
            while new_pos < breakpoint && new_pos <= parent_pos {
                emit_deduplicated(child, new_mutations[new_index], new_pos, registry);
                new_index += 1;
                new_pos = position_at(registry, new_mutations, new_index);
            }
        }

        // the sentinel past the chromosome end is always last, so the
        // strand switch below never runs after the final flush
        break_index += 1;
        if break_index == breakpoints.len() {
            break;
        }

        std::mem::swap(&mut current, &mut standby);
        std::mem::swap(&mut current_index, &mut standby_index);
        while position_at(registry, current, current_index) < breakpoint {
            current_index += 1;
        }
    }
}

/// Push `id` unless the identical handle is already present at `position`.
///
/// Scans backward through the handles sharing the candidate's position;
/// positional coexistence of distinct mutations is allowed, only the exact
/// same handle is suppressed.
fn emit_deduplicated(
    child: &mut Genome,
    id: MutationId,
    position: i64,
    registry: &MutationRegistry,
) {
    if let Some(last) = child.back() {
        if registry.get(last).position() == position {
            let handles = child.mutations();
            let mut k = handles.len();
            while k > 0 && registry.get(handles[k - 1]).position() == position {
                if handles[k - 1] == id {
                    return;
                }
                k -= 1;
            }
        }
    }
    child.push(id);
}
