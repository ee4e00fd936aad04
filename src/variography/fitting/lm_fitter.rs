use itertools::izip;
use rmpfit::{MPConfig, MPFitter, MPPar, MPResult, MPSuccess};
use tracing::{debug, warn};

use super::{weighted_mse, FitSample, Trial};
use crate::variography::model_variograms::{VariogramModel, VariogramType};

const MAX_ITER: usize = 100;

/// Least squares problem over `[sill, range]` or `[sill, range, nugget]`.
struct VariogramLeastSquares<'a> {
    samples: &'a [FitSample],
    sqrt_weights: Vec<f64>,
    variogram_type: VariogramType,
    consider_nugget: bool,
    mppar_params: Vec<MPPar>,
    // best parameters seen by any evaluation
    best: Option<(f64, Vec<f64>)>,
}

impl<'a> VariogramLeastSquares<'a> {
    fn new(
        samples: &'a [FitSample],
        variogram_type: VariogramType,
        consider_nugget: bool,
        range_floor: f64,
    ) -> Self {
        let mut mppar_params = vec![
            // sill
            MPPar {
                limited_low: true,
                limit_low: 0.0,
                ..Default::default()
            },
            // range
            MPPar {
                limited_low: true,
                limit_low: range_floor,
                ..Default::default()
            },
        ];
        if consider_nugget {
            // nugget starts at zero, a bound there would pin it
            mppar_params.push(MPPar::default());
        }

        Self {
            samples,
            sqrt_weights: samples.iter().map(|s| s.weight.sqrt()).collect(),
            variogram_type,
            consider_nugget,
            mppar_params,
            best: None,
        }
    }

    fn trial(&self, params: &[f64]) -> Trial {
        Trial {
            sill: params[0],
            range: params[1],
            nugget: if self.consider_nugget { params[2] } else { 0.0 },
        }
    }
}

impl<'a> MPFitter for VariogramLeastSquares<'a> {
    fn eval(&mut self, params: &[f64], deviates: &mut [f64]) -> MPResult<()> {
        let trial = self.trial(params);

        let mut sse = 0f64;
        for (d, sample, w) in izip!(deviates.iter_mut(), self.samples, self.sqrt_weights.iter()) {
            *d = w * (trial.predict(self.variogram_type, sample.distance) - sample.value);
            sse += *d * *d;
        }

        if sse.is_finite() && self.best.as_ref().map_or(true, |(b, _)| sse < *b) {
            self.best = Some((sse, params.to_vec()));
        }

        Ok(())
    }

    fn number_of_points(&self) -> usize {
        self.samples.len()
    }

    fn config(&self) -> MPConfig {
        MPConfig {
            max_iter: MAX_ITER,
            ..Default::default()
        }
    }

    fn parameters(&self) -> Option<&[MPPar]> {
        Some(self.mppar_params.as_slice())
    }
}

/// Gradient backend.
///
/// Starts from `sill = mean(values)`, `range = lag_size`, `nugget = 0`. The
/// nugget is unbounded while iterating and clamped to zero afterwards. With
/// two samples the nugget is held at zero; with fewer the start point is
/// returned as is. Non-convergence falls back to the best parameters evaluated.
pub fn fit(
    samples: &[FitSample],
    variogram_type: VariogramType,
    consider_nugget: bool,
    lag_size: f64,
) -> VariogramModel {
    let mean = samples.iter().map(|s| s.value).sum::<f64>() / samples.len() as f64;
    let mut params = vec![mean.max(0.0), lag_size];
    if consider_nugget {
        params.push(0.0);
    }

    if samples.len() < params.len() {
        if consider_nugget && samples.len() >= 2 {
            debug!(
                samples = samples.len(),
                "too few lags to fit a nugget, fitting sill and range only"
            );
            return fit(samples, variogram_type, false, lag_size);
        }
        debug!(
            samples = samples.len(),
            params = params.len(),
            "too few lags to fit, keeping initial guess"
        );
        return finish(samples, variogram_type, consider_nugget, &params);
    }

    let range_floor = (lag_size * 1e-6).max(f64::MIN_POSITIVE);
    let mut problem = VariogramLeastSquares::new(samples, variogram_type, consider_nugget, range_floor);

    match problem.mpfit(params.as_mut_slice()) {
        Ok(status) => {
            if matches!(status.success, MPSuccess::MaxIter) {
                warn!(
                    iterations = MAX_ITER,
                    "variogram fit did not converge, using best parameters found"
                );
                if let Some((_, best)) = problem.best.take() {
                    params = best;
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "variogram fit failed, using best parameters found");
            if let Some((_, best)) = problem.best.take() {
                params = best;
            }
        }
    }

    finish(samples, variogram_type, consider_nugget, &params)
}

fn finish(
    samples: &[FitSample],
    variogram_type: VariogramType,
    consider_nugget: bool,
    params: &[f64],
) -> VariogramModel {
    let trial = Trial {
        sill: params[0].max(0.0),
        range: params[1],
        nugget: if consider_nugget { params[2].max(0.0) } else { 0.0 },
    };
    let mse = weighted_mse(samples, variogram_type, &trial);
    trial.into_model(variogram_type, mse)
}
