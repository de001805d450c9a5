use crate::config::Config;
use crate::engine::Engine;
use anyhow::{Context, Result, bail};
use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Layout of a simulation directory.
///
/// `config.toml` sits at the top; every trajectory gets its own `run-NNNN`
/// directory holding numbered CSV chunks and the latest checkpoint.
pub struct Manager {
    sim_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(sim_dir: P) -> Result<Self> {
        let sim_dir = sim_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(sim_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { sim_dir, cfg })
    }

    /// Start a new trajectory in the next free run directory.
    pub fn create_run(&self) -> Result<()> {
        let run_idx = self.count_run_dirs().context("failed to count run dirs")?;

        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        let engine = Engine::new(self.cfg.clone(), run_idx as u64)
            .context("failed to generate initial condition")?;

        self.advance_run(run_idx, 0, engine)
    }

    /// Continue a trajectory from its checkpoint into a new file.
    pub fn resume_run(&self, run_idx: usize) -> Result<()> {
        let file_idx = self
            .count_trajectory_files(run_idx)
            .context("failed to count trajectory files")?;

        let checkpoint_file = self.checkpoint_file(run_idx);
        let engine = Engine::load_checkpoint(&checkpoint_file)
            .with_context(|| format!("failed to load {checkpoint_file:?}"))?;
        if engine.cfg() != &self.cfg {
            bail!("checkpoint config differs from the current config");
        }
        let clock = &engine.state().clock;
        log::info!(
            "loaded {checkpoint_file:?} (t = {:.6}, step {})",
            clock.t,
            clock.n_steps
        );

        if let Some(record) = engine.terminal() {
            log::info!("run {run_idx} already ended: {}", record.message);
            return Ok(());
        }

        self.advance_run(run_idx, file_idx, engine)
    }

    /// Remove every run directory.
    pub fn clean_sim(&self) -> Result<()> {
        for run_dir in self.run_dirs().context("failed to list run dirs")? {
            fs::remove_dir_all(&run_dir)
                .with_context(|| format!("failed to remove {run_dir:?}"))?;
            log::info!("removed {run_dir:?}");
        }
        Ok(())
    }

    fn advance_run(&self, run_idx: usize, file_idx: usize, mut engine: Engine) -> Result<()> {
        engine
            .run_simulation(self.trajectory_file(run_idx, file_idx))
            .context("failed to run simulation")?;

        engine
            .save_checkpoint(self.checkpoint_file(run_idx))
            .context("failed to save checkpoint")?;

        Ok(())
    }

    fn run_dirs(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.sim_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let run_dirs = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .collect();
        Ok(run_dirs)
    }

    fn count_run_dirs(&self) -> Result<usize> {
        Ok(self.run_dirs()?.len())
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.sim_dir.join(format!("run-{run_idx:04}"))
    }

    fn count_trajectory_files(&self, run_idx: usize) -> Result<usize> {
        let pattern = self.run_dir(run_idx).join("trajectory-*.csv");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let count = glob(pattern)
            .context("failed to glob trajectory files")?
            .filter_map(Result::ok)
            .count();
        Ok(count)
    }

    fn checkpoint_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("checkpoint.msgpack")
    }

    fn trajectory_file(&self, run_idx: usize, file_idx: usize) -> PathBuf {
        self.run_dir(run_idx)
            .join(format!("trajectory-{file_idx:04}.csv"))
    }
}
