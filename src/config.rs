use crate::propensity::Selection;
use crate::scenario::Scenario;
use crate::termination::CapacityBoundary;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    pub sim: SimConfig,
    pub scenario: Scenario,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Parameters shared by every scenario.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    /// Seed of the random number generator (each run uses its own stream).
    pub seed: u64,
    /// Simulated time after which a trajectory ends.
    pub max_time: f64,
    /// Number of slots in the population store.
    pub capacity: usize,
    /// Live count at which the store counts as full.
    #[serde(default)]
    pub capacity_boundary: CapacityBoundary,
    /// Search used for reaction selection.
    #[serde(default)]
    pub selection: Selection,
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Maximum number of steps written to one trajectory file.
    pub steps_per_file: usize,
    /// Number of steps between written rows.
    pub steps_per_save: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            steps_per_file: 65_536,
            steps_per_save: 1,
        }
    }
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        check_num(self.sim.max_time, 0.0..1e12).context("invalid maximum time")?;
        check_num(self.sim.capacity, 1..=100_000_000).context("invalid capacity")?;

        self.scenario
            .validate()
            .context("invalid scenario parameters")?;

        let n_init = self.scenario.n_initial();
        if n_init > self.sim.capacity {
            bail!(
                "initial population {n_init} exceeds capacity {}",
                self.sim.capacity
            );
        }

        check_num(self.output.steps_per_file, 1..=100_000_000)
            .context("invalid number of steps per file")?;
        check_num(self.output.steps_per_save, 1..=self.output.steps_per_file)
            .context("invalid number of steps per save")?;

        Ok(())
    }
}

pub fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
