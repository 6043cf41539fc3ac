//! The mutation registry: single ownership root for all live mutations.
//!
//! The registry is a slot arena. Handles ([`MutationId`]) are stable slot
//! indices: removing one mutation vacates its slot without moving any other
//! entry, so handles held by genomes to surviving mutations are never
//! invalidated. Vacated slots are recycled through a free list.

use crate::base::Mutation;
use std::fmt;

/// Non-owning handle to a mutation in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutationId(u32);

impl MutationId {
    /// Raw slot index; stable for the lifetime of the mutation.
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
enum Slot {
    Occupied(Mutation),
    Vacant,
    /// A freed slot retained for stale-handle detection; never recycled.
    #[cfg(feature = "zombie-checks")]
    Zombie,
}

/// Growable arena of owned mutations.
///
/// Supports amortized O(1) insertion, O(1) removal, and a full live scan
/// for the tally pass.
#[derive(Debug, Default)]
pub struct MutationRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl MutationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live mutations.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// `true` if no mutations are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Register a mutation, returning its stable handle.
    pub fn insert(&mut self, mutation: Mutation) -> MutationId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Slot::Occupied(mutation);
            MutationId(index)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot::Occupied(mutation));
            MutationId(index)
        }
    }

    /// Access the mutation behind a handle.
    ///
    /// # Panics
    /// Panics if the handle does not refer to a live mutation.
    #[inline]
    pub fn get(&self, id: MutationId) -> &Mutation {
        match &self.slots[id.0 as usize] {
            Slot::Occupied(m) => m,
            _ => panic!("stale mutation handle {id}"),
        }
    }

    /// Mutably access the mutation behind a handle.
    ///
    /// # Panics
    /// Panics if the handle does not refer to a live mutation.
    #[inline]
    pub fn get_mut(&mut self, id: MutationId) -> &mut Mutation {
        match &mut self.slots[id.0 as usize] {
            Slot::Occupied(m) => m,
            _ => panic!("stale mutation handle {id}"),
        }
    }

    /// Remove a mutation, returning it. Surviving handles stay valid.
    ///
    /// # Panics
    /// Panics if the handle does not refer to a live mutation.
    pub fn remove(&mut self, id: MutationId) -> Mutation {
        let slot = &mut self.slots[id.0 as usize];
        match std::mem::replace(slot, Self::freed_slot()) {
            Slot::Occupied(m) => {
                self.live -= 1;
                #[cfg(not(feature = "zombie-checks"))]
                self.free.push(id.0);
                m
            }
            other => {
                *slot = other;
                panic!("stale mutation handle {id}")
            }
        }
    }

    #[cfg(not(feature = "zombie-checks"))]
    #[inline]
    fn freed_slot() -> Slot {
        Slot::Vacant
    }

    #[cfg(feature = "zombie-checks")]
    #[inline]
    fn freed_slot() -> Slot {
        Slot::Zombie
    }

    /// `true` if the handle refers to a live mutation.
    #[inline]
    pub fn contains(&self, id: MutationId) -> bool {
        matches!(
            self.slots.get(id.0 as usize),
            Some(Slot::Occupied(_))
        )
    }

    /// Iterate over all live mutations.
    pub fn iter(&self) -> impl Iterator<Item = (MutationId, &Mutation)> {
        self.slots.iter().enumerate().filter_map(|(i, slot)| match slot {
            Slot::Occupied(m) => Some((MutationId(i as u32), m)),
            _ => None,
        })
    }

    /// Iterate mutably over all live mutations.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (MutationId, &mut Mutation)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Occupied(m) => Some((MutationId(i as u32), m)),
                _ => None,
            })
    }

    /// Zero the reference count of every live mutation.
    pub fn zero_reference_counts(&mut self) {
        for (_, mutation) in self.iter_mut() {
            mutation.zero_reference_count();
        }
    }

    /// Scan a set of handles for zombies (freed slots still referenced).
    ///
    /// Returns the offending handles. Only meaningful with the
    /// `zombie-checks` feature; without it freed slots are recycled and a
    /// stale handle is indistinguishable from a live one.
    #[cfg(feature = "zombie-checks")]
    pub fn find_zombies<'a>(
        &self,
        handles: impl Iterator<Item = &'a MutationId>,
    ) -> Vec<MutationId> {
        handles
            .filter(|id| matches!(self.slots.get(id.0 as usize), Some(Slot::Zombie)))
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{FitnessDistribution, MutationType};
    use std::sync::Arc;

    fn test_mutation(position: i64) -> Mutation {
        let mt = MutationType::new(1, 0.5, FitnessDistribution::Fixed(0.0));
        Mutation::new(mt, position, 0.0, 0, 1)
    }

    #[test]
    fn test_insert_and_get() {
        let mut registry = MutationRegistry::new();
        let id = registry.insert(test_mutation(10));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(id).position(), 10);
        assert!(registry.contains(id));
    }

    #[test]
    fn test_remove_keeps_other_handles_valid() {
        let mut registry = MutationRegistry::new();
        let a = registry.insert(test_mutation(10));
        let b = registry.insert(test_mutation(20));
        let c = registry.insert(test_mutation(30));

        let removed = registry.remove(b);
        assert_eq!(removed.position(), 20);
        assert_eq!(registry.len(), 2);

        // handles to the survivors are untouched
        assert_eq!(registry.get(a).position(), 10);
        assert_eq!(registry.get(c).position(), 30);
        assert!(!registry.contains(b));
    }

    #[cfg(not(feature = "zombie-checks"))]
    #[test]
    fn test_slot_reuse() {
        let mut registry = MutationRegistry::new();
        let a = registry.insert(test_mutation(10));
        registry.remove(a);

        let b = registry.insert(test_mutation(20));
        // the vacated slot is recycled
        assert_eq!(a.index(), b.index());
        assert_eq!(registry.get(b).position(), 20);
    }

    #[test]
    fn test_iter_skips_vacant() {
        let mut registry = MutationRegistry::new();
        let _a = registry.insert(test_mutation(10));
        let b = registry.insert(test_mutation(20));
        let _c = registry.insert(test_mutation(30));
        registry.remove(b);

        let positions: Vec<i64> = registry.iter().map(|(_, m)| m.position()).collect();
        assert_eq!(positions, vec![10, 30]);
    }

    #[test]
    fn test_zero_reference_counts() {
        let mut registry = MutationRegistry::new();
        let id = registry.insert(test_mutation(10));
        registry.get_mut(id).increment_reference_count();
        registry.get_mut(id).increment_reference_count();
        assert_eq!(registry.get(id).reference_count(), 2);

        registry.zero_reference_counts();
        assert_eq!(registry.get(id).reference_count(), 0);
    }

    #[test]
    #[should_panic(expected = "stale mutation handle")]
    fn test_stale_handle_panics() {
        let mut registry = MutationRegistry::new();
        let id = registry.insert(test_mutation(10));
        registry.remove(id);
        let _ = registry.get(id);
    }

    #[cfg(feature = "zombie-checks")]
    #[test]
    fn test_find_zombies() {
        let mut registry = MutationRegistry::new();
        let a = registry.insert(test_mutation(10));
        let b = registry.insert(test_mutation(20));
        registry.remove(a);

        let handles = vec![a, b];
        let zombies = registry.find_zombies(handles.iter());
        assert_eq!(zombies, vec![a]);
    }
}
