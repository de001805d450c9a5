use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Index of a group in the scenario's ordered list of group names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group(pub usize);

/// Record held by one slot of the store.
///
/// Age and group of a dead slot carry no meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
    id: u64,
    alive: bool,
    age: f64,
    group: Group,
}

impl Individual {
    fn vacant() -> Self {
        Self {
            id: 0,
            alive: false,
            age: 0.0,
            group: Group(0),
        }
    }

    /// Serial number assigned when the individual was placed in its slot.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn age(&self) -> f64 {
        self.age
    }

    pub fn group(&self) -> Group {
        self.group
    }
}

/// Slots of individuals plus live counts per group.
///
/// The sum of `counts` always equals the number of live slots. Dead slots
/// are kept in an ordered free set so that a birth reuses the lowest dead
/// slot, the same one a first-available scan would find.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Population {
    slots: Vec<Individual>,
    counts: Vec<usize>,
    free: BTreeSet<usize>,
    n_placed: u64,
}

impl Population {
    pub fn new(capacity: usize, n_groups: usize) -> Self {
        Self {
            slots: vec![Individual::vacant(); capacity],
            counts: vec![0; n_groups],
            free: (0..capacity).collect(),
            n_placed: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[Individual] {
        &self.slots
    }

    #[cfg(test)]
    pub fn slot(&self, slot: usize) -> &Individual {
        &self.slots[slot]
    }

    /// Live counts indexed by group.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    pub fn n_alive(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// Place a new individual in the lowest dead slot and return that slot.
    pub fn spawn(&mut self, group: Group, age: f64) -> Result<usize, SimError> {
        self.check_group(group)?;
        let slot = self.free.pop_first().ok_or(SimError::CapacityExceeded {
            capacity: self.capacity(),
        })?;

        self.slots[slot] = Individual {
            id: self.n_placed,
            alive: true,
            age,
            group,
        };
        self.n_placed += 1;
        self.counts[group.0] += 1;

        Ok(slot)
    }

    /// Mark a live slot dead.
    pub fn kill(&mut self, slot: usize) -> Result<(), SimError> {
        let group = self.live(slot)?.group;
        self.slots[slot].alive = false;
        self.counts[group.0] -= 1;
        self.free.insert(slot);
        Ok(())
    }

    /// Move a live individual to another group in place.
    pub fn transition(&mut self, slot: usize, to: Group, reset_age: bool) -> Result<(), SimError> {
        self.check_group(to)?;
        let from = self.live(slot)?.group;

        let indiv = &mut self.slots[slot];
        indiv.group = to;
        if reset_age {
            indiv.age = 0.0;
        }
        self.counts[from.0] -= 1;
        self.counts[to.0] += 1;

        Ok(())
    }

    /// Add `dt` to the age of every live individual of an aging group.
    pub fn advance_ages<F>(&mut self, dt: f64, ages: F)
    where
        F: Fn(Group) -> bool,
    {
        let n_aging: usize = (0..self.counts.len())
            .filter(|&i_grp| ages(Group(i_grp)))
            .map(|i_grp| self.counts[i_grp])
            .sum();

        let mut n_visited = 0;
        for indiv in self.slots.iter_mut() {
            if n_visited == n_aging {
                break;
            }
            if indiv.alive && ages(indiv.group) {
                indiv.age += dt;
                n_visited += 1;
            }
        }
    }

    /// Individual in `slot`, provided it is alive.
    pub fn live(&self, slot: usize) -> Result<&Individual, SimError> {
        match self.slots.get(slot) {
            Some(indiv) if indiv.alive => Ok(indiv),
            _ => Err(SimError::DeadSlot { slot }),
        }
    }

    fn check_group(&self, group: Group) -> Result<(), SimError> {
        if group.0 >= self.counts.len() {
            return Err(SimError::UnknownGroup {
                group: group.0,
                n_groups: self.counts.len(),
            });
        }
        Ok(())
    }
}
