use std::collections::VecDeque;

use super::id::{EntityId, INDEX_BITS, MAX_GENERATION, MIN_DELETED_IDS};
use crate::utils::errors::{Result, SimError};

/// Allocates and recycles generational entity ids.
///
/// Removal pushes the id onto a deferred-reuse queue; creation only pops from
/// it once more than [`MIN_DELETED_IDS`] entries are waiting, and bumps the
/// generation so stale handles to the slot stop matching. A slot whose
/// generation saturates is retired for the lifetime of the manager.
pub struct EntityManager {
    generations: Vec<u32>,
    alive: Vec<bool>,
    free_ids: VecDeque<EntityId>,
    reuse_threshold: usize,
    len: usize,
}

impl EntityManager {
    pub fn new() -> Self {
        Self::with_reuse_threshold(MIN_DELETED_IDS)
    }

    /// A lower threshold is useful in tests that exercise id recycling.
    pub fn with_reuse_threshold(reuse_threshold: usize) -> Self {
        Self {
            generations: Vec::new(),
            alive: Vec::new(),
            free_ids: VecDeque::new(),
            reuse_threshold,
            len: 0,
        }
    }

    pub fn create(&mut self) -> Result<EntityId> {
        if self.free_ids.len() > self.reuse_threshold {
            if let Some(old) = self.free_ids.pop_front() {
                let index = old.index();
                debug_assert!(!self.alive[index]);
                let generation = self.generations[index] + 1;
                self.generations[index] = generation;
                self.alive[index] = true;
                self.len += 1;
                return Ok(EntityId::new(index as u32, generation));
            }
        }

        let index = self.generations.len();
        if index >= (1usize << INDEX_BITS) {
            return Err(SimError::validation("entity index space exhausted"));
        }
        self.generations.push(0);
        self.alive.push(true);
        self.len += 1;
        Ok(EntityId::new(index as u32, 0))
    }

    pub fn remove(&mut self, id: EntityId) -> Result<()> {
        if !self.is_alive(id) {
            return Err(SimError::liveness(format!(
                "entity {:?} is not alive",
                id.raw()
            )));
        }

        let index = id.index();
        self.alive[index] = false;
        self.len -= 1;

        // A saturated generation retires the slot instead of recycling it.
        if self.generations[index] < MAX_GENERATION {
            self.free_ids.push_back(id);
        }
        Ok(())
    }

    #[inline]
    pub fn is_alive(&self, id: EntityId) -> bool {
        let index = id.index();
        index < self.generations.len()
            && self.generations[index] == id.generation()
            && self.alive[index]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live ids in slot order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.alive.iter().enumerate().filter_map(|(index, &alive)| {
            if alive {
                Some(EntityId::new(index as u32, self.generations[index]))
            } else {
                None
            }
        })
    }
}

impl Default for EntityManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_remove() {
        let mut manager = EntityManager::new();
        let id = manager.create().unwrap();
        assert!(manager.is_alive(id));
        assert_eq!(manager.len(), 1);

        manager.remove(id).unwrap();
        assert!(!manager.is_alive(id));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_remove_twice_is_liveness_error() {
        let mut manager = EntityManager::new();
        let id = manager.create().unwrap();
        manager.remove(id).unwrap();
        let err = manager.remove(id).unwrap_err();
        assert_eq!(err.kind, crate::utils::ErrorKind::Liveness);
    }

    #[test]
    fn test_no_reuse_below_threshold() {
        let mut manager = EntityManager::with_reuse_threshold(4);
        let ids: Vec<_> = (0..4).map(|_| manager.create().unwrap()).collect();
        for id in &ids {
            manager.remove(*id).unwrap();
        }
        // Queue holds 4 entries, not more than the threshold: append instead.
        let fresh = manager.create().unwrap();
        assert_eq!(fresh.index(), 4);
        assert_eq!(fresh.generation(), 0);
    }

    #[test]
    fn test_reuse_bumps_generation() {
        let mut manager = EntityManager::with_reuse_threshold(0);
        let first = manager.create().unwrap();
        manager.remove(first).unwrap();

        let second = manager.create().unwrap();
        assert_eq!(second.index(), first.index());
        assert_eq!(second.generation(), first.generation() + 1);
        assert!(!manager.is_alive(first));
        assert!(manager.is_alive(second));
    }

    #[test]
    fn test_stale_generation_not_alive() {
        let mut manager = EntityManager::with_reuse_threshold(0);
        let first = manager.create().unwrap();
        manager.remove(first).unwrap();
        let _second = manager.create().unwrap();

        assert!(!manager.is_alive(first));
    }

    #[test]
    fn test_iter_in_slot_order() {
        let mut manager = EntityManager::new();
        let a = manager.create().unwrap();
        let b = manager.create().unwrap();
        let c = manager.create().unwrap();
        manager.remove(b).unwrap();

        let live: Vec<_> = manager.iter().collect();
        assert_eq!(live, vec![a, c]);
    }

    #[test]
    fn test_generation_saturation_retires_slot() {
        let mut manager = EntityManager::with_reuse_threshold(0);
        let mut id = manager.create().unwrap();
        for _ in 0..super::MAX_GENERATION {
            manager.remove(id).unwrap();
            id = manager.create().unwrap();
        }
        assert_eq!(id.generation(), super::MAX_GENERATION);

        // The saturated slot is not queued for reuse.
        manager.remove(id).unwrap();
        let next = manager.create().unwrap();
        assert_ne!(next.index(), id.index());
    }
}
