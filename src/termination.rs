use crate::population::Population;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalReason {
    MaxTime,
    Extinction,
    MaxPopulation,
    /// Live individuals remain but no reaction can fire.
    Stalled,
}

impl fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TerminalReason::MaxTime => "max time",
            TerminalReason::Extinction => "extinction",
            TerminalReason::MaxPopulation => "max population",
            TerminalReason::Stalled => "no reaction can fire",
        };
        f.write_str(text)
    }
}

/// Written once when the trajectory ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalRecord {
    pub reason: TerminalReason,
    pub message: String,
}

impl TerminalRecord {
    pub fn new(reason: TerminalReason) -> Self {
        Self {
            reason,
            message: format!("End of simulation: {reason}"),
        }
    }
}

/// Live count at which the store counts as full.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityBoundary {
    /// Every slot is occupied.
    #[default]
    Exact,
    /// One slot is still free.
    ReserveOne,
}

impl CapacityBoundary {
    pub fn limit(self, capacity: usize) -> usize {
        match self {
            CapacityBoundary::Exact => capacity,
            CapacityBoundary::ReserveOne => capacity.saturating_sub(1),
        }
    }
}

/// Which checks a scenario takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checks {
    pub extinction: bool,
    pub max_population: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminationPolicy {
    pub max_time: f64,
    pub checks: Checks,
    pub boundary: CapacityBoundary,
}

impl TerminationPolicy {
    /// Evaluate the checks in priority order; the first match wins.
    pub fn evaluate(&self, t: f64, pop: &Population) -> Option<TerminalRecord> {
        let n_alive = pop.n_alive();
        let reason = if t > self.max_time {
            TerminalReason::MaxTime
        } else if self.checks.extinction && n_alive == 0 {
            TerminalReason::Extinction
        } else if self.checks.max_population && n_alive >= self.boundary.limit(pop.capacity()) {
            TerminalReason::MaxPopulation
        } else {
            return None;
        };
        Some(TerminalRecord::new(reason))
    }
}
