use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{KrigingError, Result};
use crate::variography::experimental::ExperimentalVariogram;
use crate::variography::model_variograms::{structure, VariogramModel, VariogramType};

pub mod lm_fitter;
pub mod swarm_fitter;

pub use swarm_fitter::EvolutionaryConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FitBackend {
    /// Levenberg-Marquardt least squares.
    Gradient,
    /// Particle swarm population search.
    Evolutionary,
}

/// How much each lag counts in the fit objective.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FitWeighting {
    #[default]
    Uniform,
    /// Weight each lag by the number of pairs in it.
    PairCount,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FitSample {
    pub distance: f64,
    pub value: f64,
    pub weight: f64,
}

impl FitSample {
    /// Non-empty lags of `variogram` as fit samples. Empty lags never appear.
    pub fn from_variogram(variogram: &ExperimentalVariogram, weighting: FitWeighting) -> Vec<Self> {
        variogram
            .bins
            .iter()
            .filter_map(|bin| {
                let value = bin.value?;
                let weight = match weighting {
                    FitWeighting::Uniform => 1.0,
                    FitWeighting::PairCount => bin.count as f64,
                };
                (weight > 0.0 && value.is_finite()).then_some(FitSample {
                    distance: bin.mean_distance,
                    value,
                    weight,
                })
            })
            .collect()
    }
}

/// Model parameters while a search is running.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Trial {
    pub sill: f64,
    pub range: f64,
    pub nugget: f64,
}

impl Trial {
    #[inline(always)]
    pub fn predict(&self, variogram_type: VariogramType, h: f64) -> f64 {
        self.nugget + structure(variogram_type, self.sill, self.range, h)
    }

    pub fn into_model(self, variogram_type: VariogramType, fit_error: f64) -> VariogramModel {
        VariogramModel::new(variogram_type, self.nugget, self.sill, self.range)
            .with_fit_error(fit_error)
    }
}

/// Weighted mean squared error of `trial` over `samples`.
pub(crate) fn weighted_mse(samples: &[FitSample], variogram_type: VariogramType, trial: &Trial) -> f64 {
    let (sse, total) = samples.iter().fold((0f64, 0f64), |(sse, total), s| {
        let r = trial.predict(variogram_type, s.distance) - s.value;
        (sse + s.weight * r * r, total + s.weight)
    });
    if total > 0.0 {
        sse / total
    } else {
        f64::INFINITY
    }
}

/// Fits one variogram type to binned samples with the chosen backend.
#[derive(Clone, Debug)]
pub struct VariogramFitter {
    pub variogram_type: VariogramType,
    pub consider_nugget: bool,
    pub lag_size: f64,
    pub backend: FitBackend,
    pub evolutionary: EvolutionaryConfig,
}

impl VariogramFitter {
    pub fn fit<R: Rng + ?Sized>(&self, samples: &[FitSample], rng: &mut R) -> Result<VariogramModel> {
        if samples.is_empty() {
            return Err(KrigingError::NoValidBins);
        }

        let model = match self.backend {
            FitBackend::Gradient => lm_fitter::fit(
                samples,
                self.variogram_type,
                self.consider_nugget,
                self.lag_size,
            ),
            FitBackend::Evolutionary => swarm_fitter::fit(
                samples,
                self.variogram_type,
                self.consider_nugget,
                self.lag_size,
                &self.evolutionary,
                rng,
            ),
        };

        info!(
            variogram_type = %model.variogram_type,
            nugget = model.nugget,
            sill = model.sill,
            range = model.range,
            mse = model.fit_error,
            "fitted variogram"
        );

        Ok(model)
    }
}
