use crate::config::check_num;
use crate::population::{Group, Individual};
use crate::propensity::{Effect, PropensityModel, Reaction};
use crate::termination::Checks;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Individuals placed before the first step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cohort {
    pub group: Group,
    pub count: usize,
    pub age: f64,
}

/// Scenario selected by the `kind` key of the `[scenario]` table.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Scenario {
    Logistic(Logistic),
    Blowfly(Blowfly),
    Epidermal(Epidermal),
    AgedDecay(AgedDecay),
}

trait ScenarioModel: PropensityModel {
    fn cohorts(&self) -> Vec<Cohort>;
    fn checks(&self) -> Checks;
    fn validate(&self) -> Result<()>;
}

impl Scenario {
    fn model(&self) -> &dyn ScenarioModel {
        match self {
            Scenario::Logistic(model) => model,
            Scenario::Blowfly(model) => model,
            Scenario::Epidermal(model) => model,
            Scenario::AgedDecay(model) => model,
        }
    }

    pub fn cohorts(&self) -> Vec<Cohort> {
        self.model().cohorts()
    }

    pub fn n_initial(&self) -> usize {
        self.cohorts().iter().map(|cohort| cohort.count).sum()
    }

    pub fn checks(&self) -> Checks {
        self.model().checks()
    }

    pub fn validate(&self) -> Result<()> {
        self.model().validate()
    }
}

impl PropensityModel for Scenario {
    fn groups(&self) -> &'static [&'static str] {
        self.model().groups()
    }

    fn reactions(&self) -> &'static [Reaction] {
        self.model().reactions()
    }

    fn live_rate(&self, kind: usize, indiv: &Individual, counts: &[usize]) -> f64 {
        self.model().live_rate(kind, indiv, counts)
    }

    fn ages(&self, group: Group) -> bool {
        self.model().ages(group)
    }
}

/// Hazard of a Weibull lifetime, `m d (age d)^(m - 1)`.
fn weibull_hazard(age: f64, scale: f64, shape: f64) -> f64 {
    shape * scale * (age * scale).powf(shape - 1.0)
}

/// Logistic growth: constant birth, crowding-driven death.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logistic {
    /// Intrinsic growth rate.
    pub r: f64,
    /// Carrying capacity.
    pub k: f64,
    pub n_init: usize,
}

impl Default for Logistic {
    fn default() -> Self {
        Self {
            r: 1.0,
            k: 30.0,
            n_init: 10,
        }
    }
}

const INDIVIDUAL: Group = Group(0);

const LOGISTIC_REACTIONS: &[Reaction] = &[
    Reaction {
        name: "birth",
        effect: Effect::Birth {
            offspring: INDIVIDUAL,
        },
    },
    Reaction {
        name: "death",
        effect: Effect::Death,
    },
];

impl PropensityModel for Logistic {
    fn groups(&self) -> &'static [&'static str] {
        &["n"]
    }

    fn reactions(&self) -> &'static [Reaction] {
        LOGISTIC_REACTIONS
    }

    fn live_rate(&self, kind: usize, _indiv: &Individual, counts: &[usize]) -> f64 {
        match kind {
            0 => self.r,
            1 => self.r * counts[INDIVIDUAL.0] as f64 / self.k,
            _ => 0.0,
        }
    }

    fn ages(&self, _group: Group) -> bool {
        false
    }
}

impl ScenarioModel for Logistic {
    fn cohorts(&self) -> Vec<Cohort> {
        vec![Cohort {
            group: INDIVIDUAL,
            count: self.n_init,
            age: 0.0,
        }]
    }

    fn checks(&self) -> Checks {
        Checks {
            extinction: true,
            max_population: true,
        }
    }

    fn validate(&self) -> Result<()> {
        check_num(self.r, 0.0..1e9).context("invalid growth rate")?;
        check_num(self.k, 1e-9..1e12).context("invalid carrying capacity")?;
        Ok(())
    }
}

/// Age-structured blowfly population.
///
/// Adults lay juveniles at a density-dependent rate; juveniles mature with
/// a risk that grows exponentially once their age nears `tau`.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Blowfly {
    pub death_juvenile: f64,
    pub death_adult: f64,
    /// Maximum per-adult fecundity.
    pub beta: f64,
    /// Adult density at which fecundity drops by a factor `e`.
    pub c: f64,
    /// Maturation age.
    pub tau: f64,
    pub juvenile_init: usize,
    pub adult_init: usize,
}

impl Default for Blowfly {
    fn default() -> Self {
        Self {
            death_juvenile: 0.0060455567,
            death_adult: 0.27,
            beta: 8.5,
            c: 600.0,
            tau: 15.6,
            juvenile_init: 0,
            adult_init: 5000,
        }
    }
}

const JUVENILE: Group = Group(0);
const ADULT: Group = Group(1);

const BLOWFLY_REACTIONS: &[Reaction] = &[
    Reaction {
        name: "birth",
        effect: Effect::Birth {
            offspring: JUVENILE,
        },
    },
    Reaction {
        name: "death",
        effect: Effect::Death,
    },
    Reaction {
        name: "maturation",
        effect: Effect::Transition {
            to: ADULT,
            reset_age: false,
        },
    },
];

impl PropensityModel for Blowfly {
    fn groups(&self) -> &'static [&'static str] {
        &["juveniles", "adults"]
    }

    fn reactions(&self) -> &'static [Reaction] {
        BLOWFLY_REACTIONS
    }

    fn live_rate(&self, kind: usize, indiv: &Individual, counts: &[usize]) -> f64 {
        match (kind, indiv.group()) {
            (0, ADULT) => self.beta * (-(counts[ADULT.0] as f64) / self.c).exp(),
            (1, JUVENILE) => self.death_juvenile,
            (1, ADULT) => self.death_adult,
            (2, JUVENILE) => (indiv.age() - self.tau).exp(),
            _ => 0.0,
        }
    }

    fn ages(&self, group: Group) -> bool {
        group == JUVENILE
    }
}

impl ScenarioModel for Blowfly {
    fn cohorts(&self) -> Vec<Cohort> {
        vec![
            Cohort {
                group: JUVENILE,
                count: self.juvenile_init,
                age: 0.0,
            },
            Cohort {
                group: ADULT,
                count: self.adult_init,
                age: self.tau,
            },
        ]
    }

    fn checks(&self) -> Checks {
        Checks {
            extinction: true,
            max_population: true,
        }
    }

    fn validate(&self) -> Result<()> {
        check_num(self.death_juvenile, 0.0..1e9).context("invalid juvenile death rate")?;
        check_num(self.death_adult, 0.0..1e9).context("invalid adult death rate")?;
        check_num(self.beta, 0.0..1e9).context("invalid fecundity")?;
        check_num(self.c, 1e-9..1e12).context("invalid density scale")?;
        check_num(self.tau, 0.0..1e6).context("invalid maturation age")?;
        Ok(())
    }
}

/// Epidermal cell renewal.
///
/// Stem cells commit to transit cells; a transit cell splits into a
/// differentiated cell and a new stem cell; differentiated cells are shed
/// with a Weibull-distributed lifetime.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Epidermal {
    /// Commitment rate of stem cells.
    pub lambda: f64,
    /// Age around which transit cells split.
    pub tau: f64,
    pub weibull_scale: f64,
    pub weibull_shape: f64,
    pub stem_init: usize,
    pub transit_init: usize,
    pub differentiated_init: usize,
}

impl Default for Epidermal {
    fn default() -> Self {
        Self {
            lambda: 30.0,
            tau: 3.0,
            weibull_scale: 0.03,
            weibull_shape: 2.0,
            stem_init: 1,
            transit_init: 0,
            differentiated_init: 0,
        }
    }
}

const STEM: Group = Group(0);
const TRANSIT: Group = Group(1);
const DIFFERENTIATED: Group = Group(2);

const EPIDERMAL_REACTIONS: &[Reaction] = &[
    Reaction {
        name: "commitment",
        effect: Effect::Transition {
            to: TRANSIT,
            reset_age: true,
        },
    },
    Reaction {
        name: "shedding",
        effect: Effect::Death,
    },
    Reaction {
        name: "split",
        effect: Effect::Split {
            to: DIFFERENTIATED,
            offspring: STEM,
        },
    },
];

impl PropensityModel for Epidermal {
    fn groups(&self) -> &'static [&'static str] {
        &["stem", "transit", "differentiated"]
    }

    fn reactions(&self) -> &'static [Reaction] {
        EPIDERMAL_REACTIONS
    }

    fn live_rate(&self, kind: usize, indiv: &Individual, _counts: &[usize]) -> f64 {
        match (kind, indiv.group()) {
            (0, STEM) => self.lambda,
            (1, DIFFERENTIATED) => {
                weibull_hazard(indiv.age(), self.weibull_scale, self.weibull_shape)
            }
            (2, TRANSIT) => (indiv.age() - self.tau).exp(),
            _ => 0.0,
        }
    }

    fn ages(&self, group: Group) -> bool {
        group == TRANSIT || group == DIFFERENTIATED
    }
}

impl ScenarioModel for Epidermal {
    fn cohorts(&self) -> Vec<Cohort> {
        [
            (STEM, self.stem_init),
            (TRANSIT, self.transit_init),
            (DIFFERENTIATED, self.differentiated_init),
        ]
        .into_iter()
        .map(|(group, count)| Cohort {
            group,
            count,
            age: 0.0,
        })
        .collect()
    }

    fn checks(&self) -> Checks {
        Checks {
            extinction: false,
            max_population: true,
        }
    }

    fn validate(&self) -> Result<()> {
        check_num(self.lambda, 0.0..1e9).context("invalid commitment rate")?;
        check_num(self.tau, 0.0..1e6).context("invalid split age")?;
        check_num(self.weibull_scale, 1e-12..1e6).context("invalid Weibull scale")?;
        check_num(self.weibull_shape, 1.0..100.0).context("invalid Weibull shape")?;
        Ok(())
    }
}

/// Pure decay of particles with a Weibull-distributed lifetime.
///
/// A shape of 1 gives constant-rate exponential decay.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgedDecay {
    pub weibull_scale: f64,
    pub weibull_shape: f64,
    pub n_init: usize,
    /// Age of every particle at `t = 0`.
    pub age_init: f64,
}

impl Default for AgedDecay {
    fn default() -> Self {
        Self {
            weibull_scale: 0.03,
            weibull_shape: 2.0,
            n_init: 1000,
            age_init: 1.0,
        }
    }
}

const PARTICLE: Group = Group(0);

const DECAY_REACTIONS: &[Reaction] = &[Reaction {
    name: "decay",
    effect: Effect::Death,
}];

impl PropensityModel for AgedDecay {
    fn groups(&self) -> &'static [&'static str] {
        &["particles"]
    }

    fn reactions(&self) -> &'static [Reaction] {
        DECAY_REACTIONS
    }

    fn live_rate(&self, kind: usize, indiv: &Individual, _counts: &[usize]) -> f64 {
        match kind {
            0 => weibull_hazard(indiv.age(), self.weibull_scale, self.weibull_shape),
            _ => 0.0,
        }
    }

    fn ages(&self, _group: Group) -> bool {
        true
    }
}

impl ScenarioModel for AgedDecay {
    fn cohorts(&self) -> Vec<Cohort> {
        vec![Cohort {
            group: PARTICLE,
            count: self.n_init,
            age: self.age_init,
        }]
    }

    fn checks(&self) -> Checks {
        Checks {
            extinction: true,
            max_population: false,
        }
    }

    fn validate(&self) -> Result<()> {
        check_num(self.weibull_scale, 1e-12..1e6).context("invalid Weibull scale")?;
        // the hazard diverges at age zero below a shape of one
        check_num(self.weibull_shape, 1.0..100.0).context("invalid Weibull shape")?;
        check_num(self.age_init, 0.0..1e6).context("invalid initial age")?;
        if self.weibull_shape > 1.0 && self.age_init == 0.0 {
            bail!("initial age must be positive when the Weibull shape exceeds 1");
        }
        Ok(())
    }
}
