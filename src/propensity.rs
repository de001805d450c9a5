use crate::error::SimError;
use crate::population::{Group, Individual, Population};
use serde::{Deserialize, Serialize};

/// What a fired reaction does to the population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    /// The actor stays as it is and one offspring is placed in a dead slot.
    Birth { offspring: Group },
    /// The actor's slot is marked dead.
    Death,
    /// The actor changes group in place.
    Transition { to: Group, reset_age: bool },
    /// The actor moves to `to` with its age reset and one offspring is placed.
    Split { to: Group, offspring: Group },
}

/// A reaction kind declared by a scenario.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reaction {
    pub name: &'static str,
    pub effect: Effect,
}

/// Rate laws of one biological scenario.
///
/// Implementations must be pure functions of their arguments so the table
/// can be rebuilt deterministically at every step.
pub trait PropensityModel {
    /// Names of the groups, in count order.
    fn groups(&self) -> &'static [&'static str];

    /// Reaction kinds, in table order.
    fn reactions(&self) -> &'static [Reaction];

    /// Rate of reaction `kind` for a live individual. Must be zero for kinds
    /// that do not apply to the individual's group.
    fn live_rate(&self, kind: usize, indiv: &Individual, counts: &[usize]) -> f64;

    /// Whether individuals of `group` grow older as time passes.
    fn ages(&self, group: Group) -> bool;

    fn propensity(&self, kind: usize, indiv: &Individual, counts: &[usize]) -> f64 {
        if indiv.is_alive() {
            self.live_rate(kind, indiv, counts)
        } else {
            0.0
        }
    }
}

/// Search used to locate the fired reaction in the cumulative table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Selection {
    /// Scan from the first entry.
    Linear,
    /// Bisect the cumulative table.
    #[default]
    Binary,
}

/// One (slot, reaction kind) pair of the table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReactionEntry {
    pub slot: usize,
    pub kind: usize,
    pub propensity: f64,
}

/// Raw and cumulative propensities for every (slot, reaction kind) pair.
///
/// Entries are laid out slot-major: `idx = slot * n_kinds + kind`. A rebuild
/// stops after the last live slot; the entries past that point belong to
/// dead slots, so their raw propensity is zero and their cumulative value is
/// the total.
#[derive(Debug, Clone, Default)]
pub struct PropensityTable {
    n_kinds: usize,
    raw: Vec<f64>,
    cumulative: Vec<f64>,
    n_built: usize,
    total: f64,
}

impl PropensityTable {
    pub fn new(capacity: usize, n_kinds: usize) -> Self {
        let len = capacity * n_kinds;
        Self {
            n_kinds,
            raw: vec![0.0; len],
            cumulative: vec![0.0; len],
            n_built: 0,
            total: 0.0,
        }
    }

    /// Recompute every propensity from the current population and return
    /// the total.
    pub fn rebuild<M>(&mut self, pop: &Population, model: &M) -> Result<f64, SimError>
    where
        M: PropensityModel + ?Sized,
    {
        let reactions = model.reactions();
        let counts = pop.counts();
        let n_alive = pop.n_alive();

        let mut running = 0.0;
        let mut n_visited = 0;
        let mut n_built = 0;
        for (slot, indiv) in pop.slots().iter().enumerate() {
            if n_visited == n_alive {
                break;
            }
            for (kind, reaction) in reactions.iter().enumerate() {
                let value = model.propensity(kind, indiv, counts);
                if !value.is_finite() || value < 0.0 {
                    return Err(SimError::InvalidPropensity {
                        slot,
                        reaction: reaction.name,
                        value,
                    });
                }
                let idx = slot * self.n_kinds + kind;
                running += value;
                self.raw[idx] = value;
                self.cumulative[idx] = running;
            }
            n_built = (slot + 1) * self.n_kinds;
            if indiv.is_alive() {
                n_visited += 1;
            }
        }

        self.n_built = n_built;
        self.total = running;
        log::trace!("rebuilt {n_built} entries, total propensity {running}");

        Ok(running)
    }

    /// Sum of all propensities; equals the last cumulative entry.
    pub fn total(&self) -> f64 {
        self.total
    }

    /// Logical length, `capacity * n_kinds`.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn entry(&self, idx: usize) -> ReactionEntry {
        ReactionEntry {
            slot: idx / self.n_kinds,
            kind: idx % self.n_kinds,
            propensity: self.raw(idx),
        }
    }

    pub fn raw(&self, idx: usize) -> f64 {
        if idx < self.n_built { self.raw[idx] } else { 0.0 }
    }

    #[cfg(test)]
    pub fn cumulative(&self, idx: usize) -> f64 {
        if idx < self.n_built {
            self.cumulative[idx]
        } else {
            self.total
        }
    }

    /// Index of the smallest entry whose cumulative propensity reaches
    /// `r2 * total`, or `None` when nothing can fire.
    ///
    /// A target beyond the last cumulative value (rounding) is clamped to
    /// the last entry with a positive propensity.
    pub fn select(&self, r2: f64, strategy: Selection) -> Option<usize> {
        if self.total <= 0.0 {
            return None;
        }
        let target = r2 * self.total;
        let built = &self.cumulative[..self.n_built];

        let idx = match strategy {
            Selection::Linear => built
                .iter()
                .position(|&cum| cum >= target)
                .unwrap_or(self.n_built),
            Selection::Binary => built.partition_point(|&cum| cum < target),
        };
        if idx < self.n_built {
            return Some(idx);
        }
        self.raw[..self.n_built].iter().rposition(|&val| val > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::*;
    use rand_chacha::ChaCha12Rng;
    use rand_distr::Open01;

    const SOLO: Group = Group(0);
    const PAIR: Group = Group(1);

    /// Birth at a fixed rate for everyone, death at a rate growing with age
    /// for the second group only.
    struct Toy {
        birth: f64,
    }

    const TOY_REACTIONS: &[Reaction] = &[
        Reaction {
            name: "birth",
            effect: Effect::Birth { offspring: SOLO },
        },
        Reaction {
            name: "death",
            effect: Effect::Death,
        },
    ];

    impl PropensityModel for Toy {
        fn groups(&self) -> &'static [&'static str] {
            &["solo", "pair"]
        }

        fn reactions(&self) -> &'static [Reaction] {
            TOY_REACTIONS
        }

        fn live_rate(&self, kind: usize, indiv: &Individual, _counts: &[usize]) -> f64 {
            match (kind, indiv.group()) {
                (0, _) => self.birth,
                (1, PAIR) => indiv.age(),
                _ => 0.0,
            }
        }

        fn ages(&self, group: Group) -> bool {
            group == PAIR
        }
    }

    fn toy_population() -> Population {
        let mut pop = Population::new(8, 2);
        pop.spawn(SOLO, 0.0).unwrap();
        pop.spawn(PAIR, 2.0).unwrap();
        pop.spawn(SOLO, 0.0).unwrap();
        pop.spawn(PAIR, 3.0).unwrap();
        pop.kill(2).unwrap();
        pop
    }

    #[test]
    fn rebuild_accumulates_in_slot_order() {
        let pop = toy_population();
        let mut table = PropensityTable::new(pop.capacity(), 2);
        let total = table.rebuild(&pop, &Toy { birth: 1.0 }).unwrap();

        assert_eq!(table.len(), 16);
        assert_eq!(total, 7.0);
        let expected_raw = [1.0, 0.0, 1.0, 2.0, 0.0, 0.0, 1.0, 3.0];
        let expected_cum = [1.0, 1.0, 2.0, 4.0, 4.0, 4.0, 5.0, 7.0];
        for idx in 0..8 {
            assert_eq!(table.raw(idx), expected_raw[idx]);
            assert_eq!(table.cumulative(idx), expected_cum[idx]);
        }
        for idx in 8..table.len() {
            assert_eq!(table.raw(idx), 0.0);
            assert_eq!(table.cumulative(idx), total);
        }
        assert_eq!(table.cumulative(table.len() - 1), table.total());
    }

    #[test]
    fn cumulative_is_non_decreasing() {
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        let mut pop = Population::new(64, 2);
        for _ in 0..40 {
            let group = if rng.random_bool(0.5) { SOLO } else { PAIR };
            pop.spawn(group, rng.random_range(0.0..5.0)).unwrap();
        }
        for slot in 0..40 {
            if rng.random_bool(0.3) {
                pop.kill(slot).unwrap();
            }
        }

        let mut table = PropensityTable::new(pop.capacity(), 2);
        table.rebuild(&pop, &Toy { birth: 0.25 }).unwrap();
        for idx in 1..table.len() {
            assert!(table.cumulative(idx) >= table.cumulative(idx - 1));
            assert!(table.raw(idx) >= 0.0);
        }
    }

    #[test]
    fn empty_population_has_zero_total() {
        let pop = Population::new(4, 2);
        let mut table = PropensityTable::new(4, 2);
        assert_eq!(table.rebuild(&pop, &Toy { birth: 1.0 }).unwrap(), 0.0);
        assert_eq!(table.select(0.5, Selection::Binary), None);
        assert_eq!(table.select(0.5, Selection::Linear), None);
    }

    #[test]
    fn negative_rate_is_rejected() {
        let pop = toy_population();
        let mut table = PropensityTable::new(pop.capacity(), 2);
        let err = table.rebuild(&pop, &Toy { birth: -1.0 }).unwrap_err();
        assert!(matches!(
            err,
            SimError::InvalidPropensity {
                slot: 0,
                reaction: "birth",
                ..
            }
        ));
    }

    #[test]
    fn select_picks_first_entry_reaching_target() {
        let pop = toy_population();
        let mut table = PropensityTable::new(pop.capacity(), 2);
        table.rebuild(&pop, &Toy { birth: 1.0 }).unwrap();

        // cumulative: 1 1 2 4 4 4 5 7
        for strategy in [Selection::Linear, Selection::Binary] {
            assert_eq!(table.select(0.1, strategy), Some(0));
            assert_eq!(table.select(1.0 / 7.0, strategy), Some(0));
            assert_eq!(table.select(1.5 / 7.0, strategy), Some(2));
            assert_eq!(table.select(3.0 / 7.0, strategy), Some(3));
            assert_eq!(table.select(4.5 / 7.0, strategy), Some(6));
            assert_eq!(table.select(0.99, strategy), Some(7));
        }
        assert_eq!(
            table.entry(3),
            ReactionEntry {
                slot: 1,
                kind: 1,
                propensity: 2.0
            }
        );
    }

    #[test]
    fn overrun_is_clamped_to_last_positive_entry() {
        let mut pop = Population::new(4, 2);
        pop.spawn(PAIR, 1.0).unwrap();
        pop.spawn(SOLO, 0.0).unwrap();
        let mut table = PropensityTable::new(4, 2);
        table.rebuild(&pop, &Toy { birth: 1.0 }).unwrap();

        // last built entry is the zero death rate of slot 1
        for strategy in [Selection::Linear, Selection::Binary] {
            assert_eq!(table.select(1.5, strategy), Some(2));
        }
    }

    #[test]
    fn linear_and_binary_selection_agree() {
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let mut pop = Population::new(128, 2);
        for _ in 0..100 {
            let group = if rng.random_bool(0.5) { SOLO } else { PAIR };
            pop.spawn(group, rng.random_range(0.0..3.0)).unwrap();
        }
        for slot in 0..100 {
            if rng.random_bool(0.5) {
                pop.kill(slot).unwrap();
            }
        }
        let mut table = PropensityTable::new(pop.capacity(), 2);
        table.rebuild(&pop, &Toy { birth: 0.5 }).unwrap();

        for _ in 0..1000 {
            let r2: f64 = rng.sample(Open01);
            let linear = table.select(r2, Selection::Linear);
            assert_eq!(linear, table.select(r2, Selection::Binary));
            let idx = linear.unwrap();
            assert!(table.entry(idx).propensity > 0.0);
        }
    }
}
