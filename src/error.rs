use thiserror::Error;

/// Invariant violations detected by the simulation core.
///
/// None of these are recoverable: a trajectory that hits one is aborted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimError {
    #[error("population store is full ({capacity} slots), cannot place a new individual")]
    CapacityExceeded { capacity: usize },

    #[error("slot {slot} does not hold a live individual")]
    DeadSlot { slot: usize },

    #[error("group {group} is not declared by the scenario ({n_groups} groups)")]
    UnknownGroup { group: usize, n_groups: usize },

    #[error("reaction {reaction:?} of slot {slot} has invalid propensity {value}")]
    InvalidPropensity {
        slot: usize,
        reaction: &'static str,
        value: f64,
    },
}
