use argmin::core::{CostFunction, Error, Executor, State, SyncAlias};
use argmin::solver::particleswarm::ParticleSwarm;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{weighted_mse, FitSample, Trial};
use crate::variography::model_variograms::{VariogramModel, VariogramType};

/// Settings of the population backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionaryConfig {
    /// Particles in the swarm.
    pub population_size: usize,
    /// Lower bound on cost evaluations, raised to ten per sample.
    pub max_evaluations: usize,
}

impl Default for EvolutionaryConfig {
    fn default() -> Self {
        Self {
            population_size: 20,
            max_evaluations: 1000,
        }
    }
}

/// Weighted MSE over `[range, sill]` or `[range, sill, nugget]`.
struct VariogramCost<'a> {
    samples: &'a [FitSample],
    variogram_type: VariogramType,
    consider_nugget: bool,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl<'a> VariogramCost<'a> {
    fn trial(&self, vars: &[f64]) -> Trial {
        let v = |k: usize| vars[k].clamp(self.lower[k], self.upper[k]);
        Trial {
            range: v(0),
            sill: v(1),
            nugget: if self.consider_nugget { v(2) } else { 0.0 },
        }
    }

    fn mse(&self, vars: &[f64]) -> f64 {
        let mse = weighted_mse(self.samples, self.variogram_type, &self.trial(vars));
        if mse.is_finite() {
            mse
        } else {
            f64::MAX
        }
    }

    fn centre(&self) -> Vec<f64> {
        self.lower
            .iter()
            .zip(self.upper.iter())
            .map(|(lo, hi)| 0.5 * (lo + hi))
            .collect()
    }
}

impl CostFunction for &VariogramCost<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.mse(params))
    }
}

/// Best particle of a whole run, as tracked by the solver state.
struct SearchOutcome {
    position: Vec<f64>,
    cost: f64,
    iterations: u64,
}

/// Population backend.
///
/// Particle swarm over `range ∈ [1e-6 · ub, ub]` with
/// `ub = max(1.5 · max distance, lag_size)` and `sill, nugget ∈ [0, max value]`.
/// The returned model is the best position any particle reached during the run.
pub fn fit<R: Rng + ?Sized>(
    samples: &[FitSample],
    variogram_type: VariogramType,
    consider_nugget: bool,
    lag_size: f64,
    config: &EvolutionaryConfig,
    rng: &mut R,
) -> VariogramModel {
    let max_distance = samples.iter().map(|s| s.distance).fold(0f64, f64::max);
    let max_value = samples.iter().map(|s| s.value).fold(0f64, f64::max);
    let range_upper = (1.5 * max_distance).max(lag_size);
    let value_upper = max_value.max(f64::EPSILON);

    let mut lower = vec![range_upper * 1e-6, 0.0];
    let mut upper = vec![range_upper, value_upper];
    if consider_nugget {
        lower.push(0.0);
        upper.push(value_upper);
    }

    let cost = VariogramCost {
        samples,
        variogram_type,
        consider_nugget,
        lower: lower.clone(),
        upper: upper.clone(),
    };
    let max_evaluations = config.max_evaluations.max(10 * samples.len());

    let position = match search(&cost, (lower, upper), config.population_size, max_evaluations, rng) {
        Ok(outcome) => {
            debug!(
                iterations = outcome.iterations,
                mse = outcome.cost,
                "particle swarm variogram search finished"
            );
            outcome.position
        }
        Err(err) => {
            warn!(error = %err, "particle swarm failed, using centre of the search box");
            cost.centre()
        }
    };

    let mse = cost.mse(&position);
    cost.trial(&position).into_model(variogram_type, mse)
}

fn search<O, R>(
    cost: O,
    bounds: (Vec<f64>, Vec<f64>),
    population_size: usize,
    max_evaluations: usize,
    rng: &mut R,
) -> Result<SearchOutcome, Error>
where
    O: CostFunction<Param = Vec<f64>, Output = f64> + SyncAlias,
    R: Rng + ?Sized,
{
    let particles = population_size.max(2);
    let iterations = (max_evaluations / particles).max(1) as u64;

    let solver = ParticleSwarm::new(bounds, particles)
        .with_rng_generator(StdRng::seed_from_u64(rng.gen()));

    let res = Executor::new(cost, solver)
        .configure(|state| state.max_iters(iterations))
        .run()?;

    let iterations = res.state.get_iter();
    let cost = res.state.best_cost;
    let best = res
        .state
        .best_individual
        .ok_or_else(|| Error::msg("particle swarm finished without a best particle"))?;

    Ok(SearchOutcome {
        position: best.position,
        cost,
        iterations,
    })
}
