use crate::population::Population;
use crate::termination::TerminalRecord;
use serde::{Deserialize, Serialize};

/// Simulated time.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    pub t: f64,
    /// Size of the last step.
    pub dt: f64,
    pub n_steps: u64,
}

impl Clock {
    pub fn advance(&mut self, dt: f64) {
        self.dt = dt;
        self.t += dt;
        self.n_steps += 1;
    }
}

/// Reaction fired by the last step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fired {
    pub slot: usize,
    pub kind: usize,
}

/// Everything that changes from one step to the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub clock: Clock,
    pub population: Population,
    pub last_fired: Option<Fired>,
    pub terminal: Option<TerminalRecord>,
}

/// Observation emitted at a step boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub t: f64,
    pub counts: Vec<usize>,
}
