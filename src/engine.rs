use crate::config::Config;
use crate::error::SimError;
use crate::model::{Clock, Fired, Snapshot, State};
use crate::population::Population;
use crate::propensity::{Effect, PropensityModel, PropensityTable, ReactionEntry};
use crate::termination::{TerminalReason, TerminalRecord, TerminationPolicy};
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Open01;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Supplier of uniform draws for the stepping procedure.
pub trait VariateSource {
    /// Next draw in `(0, 1)`.
    fn next_uniform(&mut self) -> f64;
}

impl VariateSource for ChaCha12Rng {
    fn next_uniform(&mut self) -> f64 {
        self.sample(Open01)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Running,
    Terminal,
}

/// Stochastic simulation engine (Gillespie direct method).
///
/// Holds the configuration, current state, and random number generator of
/// one trajectory, and provides methods to step, run, save, and load it.
/// The propensity table is derived from the state and rebuilt on load.
#[derive(Serialize, Deserialize)]
pub struct Engine {
    cfg: Config,
    state: State,
    rng: ChaCha12Rng,
    #[serde(skip)]
    table: PropensityTable,
    /// Set while `table` does not reflect `state`.
    #[serde(skip)]
    stale: bool,
}

impl Engine {
    /// Create a new `Engine` holding the scenario's initial population.
    ///
    /// `stream` selects an independent random stream for the given seed, so
    /// trajectories sharing a config do not share draws.
    pub fn new(cfg: Config, stream: u64) -> Result<Self, SimError> {
        let mut rng = ChaCha12Rng::seed_from_u64(cfg.sim.seed);
        rng.set_stream(stream);

        let scenario = &cfg.scenario;
        let mut population = Population::new(cfg.sim.capacity, scenario.groups().len());
        for cohort in scenario.cohorts() {
            for _ in 0..cohort.count {
                population.spawn(cohort.group, cohort.age)?;
            }
        }

        let state = State {
            clock: Clock::default(),
            population,
            last_fired: None,
            terminal: None,
        };
        let mut engine = Self {
            cfg,
            state,
            rng,
            table: PropensityTable::default(),
            stale: false,
        };
        engine.init_table()?;

        // A seeded population can already be extinct or full.
        if let Some(record) = engine.policy().evaluate(0.0, &engine.state.population) {
            engine.freeze(record);
        }

        Ok(engine)
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn terminal(&self) -> Option<&TerminalRecord> {
        self.state.terminal.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.terminal.is_some()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            t: self.state.clock.t,
            counts: self.state.population.counts().to_vec(),
        }
    }

    /// Perform one step with draws from the engine's own generator.
    pub fn step(&mut self) -> Result<Status, SimError> {
        if let Some(status) = self.check_frozen()? {
            return Ok(status);
        }
        let r1 = self.rng.next_uniform();
        let r2 = self.rng.next_uniform();
        self.fire(r1, r2)
    }

    /// Perform one step with draws from `source`: first the waiting time,
    /// then the reaction.
    #[cfg(test)]
    pub fn step_with<S>(&mut self, source: &mut S) -> Result<Status, SimError>
    where
        S: VariateSource + ?Sized,
    {
        if let Some(status) = self.check_frozen()? {
            return Ok(status);
        }
        let r1 = source.next_uniform();
        let r2 = source.next_uniform();
        self.fire(r1, r2)
    }

    /// Run until terminal or until `output.steps_per_file` steps have been
    /// performed, writing the trajectory to a CSV file.
    pub fn run_simulation<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let mut writer =
            csv::Writer::from_path(file).with_context(|| format!("failed to create {file:?}"))?;

        let mut header = vec!["t"];
        header.extend(self.cfg.scenario.groups());
        writer
            .write_record(&header)
            .context("failed to write header")?;

        // Step of the last written row.
        let mut saved_step = None;
        if self.state.clock.n_steps == 0 {
            self.write_row(&mut writer)?;
            saved_step = Some(0);
        }

        let steps_per_file = self.cfg.output.steps_per_file;
        let steps_per_save = self.cfg.output.steps_per_save;
        let steps_per_log = (steps_per_file / 16).max(1);
        for i_step in 0..steps_per_file {
            if self.is_terminal() {
                break;
            }

            let status = self.step().context("failed to perform step")?;

            let n_steps = self.state.clock.n_steps;
            let due = status == Status::Terminal || (i_step + 1) % steps_per_save == 0;
            if due && saved_step != Some(n_steps) {
                self.write_row(&mut writer)?;
                saved_step = Some(n_steps);
            }

            if (i_step + 1) % steps_per_log == 0 {
                let progress = 100.0 * (i_step + 1) as f64 / steps_per_file as f64;
                log::info!("completed {progress:06.2}% (t = {:.6})", self.state.clock.t);
            }
        }

        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write_named(&mut writer, &self).context("failed to serialize engine")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let mut engine: Engine =
            decode::from_read(&mut reader).context("failed to deserialize engine")?;
        engine
            .init_table()
            .context("failed to rebuild propensity table")?;
        Ok(engine)
    }

    fn init_table(&mut self) -> Result<(), SimError> {
        let n_kinds = self.cfg.scenario.reactions().len();
        self.table = PropensityTable::new(self.cfg.sim.capacity, n_kinds);
        self.rebuild_table()
    }

    fn rebuild_table(&mut self) -> Result<(), SimError> {
        self.stale = true;
        self.table
            .rebuild(&self.state.population, &self.cfg.scenario)?;
        self.stale = false;
        Ok(())
    }

    fn policy(&self) -> TerminationPolicy {
        TerminationPolicy {
            max_time: self.cfg.sim.max_time,
            checks: self.cfg.scenario.checks(),
            boundary: self.cfg.sim.capacity_boundary,
        }
    }

    /// Status of an engine that must not step: already terminal, or with
    /// nothing left that can fire. A table left stale by a failed rebuild is
    /// rebuilt first, so the failure repeats instead of selecting from it.
    fn check_frozen(&mut self) -> Result<Option<Status>, SimError> {
        if self.is_terminal() {
            return Ok(Some(Status::Terminal));
        }
        if self.stale {
            self.rebuild_table()?;
        }
        if self.table.total() <= 0.0 {
            let reason = if self.state.population.n_alive() == 0 {
                TerminalReason::Extinction
            } else {
                TerminalReason::Stalled
            };
            self.freeze(TerminalRecord::new(reason));
            return Ok(Some(Status::Terminal));
        }
        Ok(None)
    }

    fn fire(&mut self, r1: f64, r2: f64) -> Result<Status, SimError> {
        let total = self.table.total();

        // Exponential waiting time by inverse-CDF sampling.
        let dt = (1.0 / r1).ln() / total;

        let Some(idx) = self.table.select(r2, self.cfg.sim.selection) else {
            self.freeze(TerminalRecord::new(TerminalReason::Stalled));
            return Ok(Status::Terminal);
        };
        let entry = self.table.entry(idx);
        let actor_id = self.check_effect(entry)?;

        self.state.clock.advance(dt);
        let scenario = &self.cfg.scenario;
        self.state
            .population
            .advance_ages(dt, |grp| scenario.ages(grp));

        self.apply(entry)?;
        self.state.last_fired = Some(Fired {
            slot: entry.slot,
            kind: entry.kind,
        });
        log::trace!(
            "t = {} fired {} on individual {actor_id} (slot {}), counts {:?}",
            self.state.clock.t,
            self.cfg.scenario.reactions()[entry.kind].name,
            entry.slot,
            self.state.population.counts()
        );

        if let Some(record) = self
            .policy()
            .evaluate(self.state.clock.t, &self.state.population)
        {
            self.freeze(record);
            return Ok(Status::Terminal);
        }

        self.rebuild_table()?;

        Ok(Status::Running)
    }

    /// Reject a reaction that cannot be applied, before anything is mutated.
    /// Returns the id of the acting individual.
    fn check_effect(&self, entry: ReactionEntry) -> Result<u64, SimError> {
        let pop = &self.state.population;
        let actor_id = pop.live(entry.slot)?.id();
        let effect = self.cfg.scenario.reactions()[entry.kind].effect;
        let places_offspring = matches!(effect, Effect::Birth { .. } | Effect::Split { .. });
        if places_offspring && pop.is_full() {
            return Err(SimError::CapacityExceeded {
                capacity: pop.capacity(),
            });
        }
        Ok(actor_id)
    }

    fn apply(&mut self, entry: ReactionEntry) -> Result<(), SimError> {
        let effect = self.cfg.scenario.reactions()[entry.kind].effect;
        let pop = &mut self.state.population;
        match effect {
            Effect::Birth { offspring } => {
                pop.spawn(offspring, 0.0)?;
            }
            Effect::Death => pop.kill(entry.slot)?,
            Effect::Transition { to, reset_age } => pop.transition(entry.slot, to, reset_age)?,
            Effect::Split { to, offspring } => {
                pop.transition(entry.slot, to, true)?;
                pop.spawn(offspring, 0.0)?;
            }
        }
        Ok(())
    }

    fn freeze(&mut self, record: TerminalRecord) {
        log::info!(
            "{} (t = {:.6}, counts {:?})",
            record.message,
            self.state.clock.t,
            self.state.population.counts()
        );
        self.state.terminal = Some(record);
    }

    fn write_row<W: Write>(&self, writer: &mut csv::Writer<W>) -> Result<()> {
        let snapshot = self.snapshot();
        let mut record = vec![snapshot.t.to_string()];
        record.extend(snapshot.counts.iter().map(|count| count.to_string()));
        writer
            .write_record(&record)
            .context("failed to write trajectory row")?;
        Ok(())
    }
}
