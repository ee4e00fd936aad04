use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{KrigingError, Result};

pub mod iso_exponential;
pub mod iso_gaussian;
pub mod iso_spherical;

use iso_exponential::IsoExponential;
use iso_gaussian::IsoGaussian;
use iso_spherical::IsoSpherical;

/// Structured (nugget free) part of an isotropic variogram.
pub trait IsoVariogramModel {
    fn variogram(&self, h: f64) -> f64;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VariogramType {
    Spherical,
    Exponential,
    Gaussian,
}

impl fmt::Display for VariogramType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VariogramType::Spherical => "spherical",
            VariogramType::Exponential => "exponential",
            VariogramType::Gaussian => "gaussian",
        };
        f.write_str(name)
    }
}

/// User supplied model parameters, bypassing fitting.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariogramParameters {
    pub variogram_type: VariogramType,
    pub nugget: f64,
    pub sill: f64,
    pub range: f64,
}

/// Closed form semivariogram.
///
/// Every type evaluates to exactly zero at distance zero, regardless of the
/// nugget, so the kriging matrix diagonal stays zero.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VariogramModel {
    pub variogram_type: VariogramType,
    pub nugget: f64,
    pub sill: f64,
    pub range: f64,
    /// Weighted mean squared error of the fit, zero for supplied models.
    pub fit_error: f64,
}

impl VariogramModel {
    pub fn new(variogram_type: VariogramType, nugget: f64, sill: f64, range: f64) -> Self {
        Self {
            variogram_type,
            nugget,
            sill,
            range,
            fit_error: 0.0,
        }
    }

    pub fn with_fit_error(self, fit_error: f64) -> Self {
        Self { fit_error, ..self }
    }

    pub fn evaluate(&self, distance: f64) -> f64 {
        if distance == 0.0 {
            return 0.0;
        }
        self.nugget + self.structure(distance)
    }

    /// Nugget free part at `distance`, following the same formulas as [`Self::evaluate`].
    #[inline(always)]
    pub fn structure(&self, distance: f64) -> f64 {
        structure(self.variogram_type, self.sill, self.range, distance)
    }

    /// Check parameters before the model drives a kriging run.
    ///
    /// `nugget > sill` is accepted but logged.
    pub fn validate(&self) -> Result<()> {
        if !(self.range > 0.0 && self.range.is_finite()) {
            return Err(KrigingError::invalid("range", self.range, "must be positive and finite"));
        }
        if !(self.sill >= 0.0 && self.sill.is_finite()) {
            return Err(KrigingError::invalid("sill", self.sill, "must be non-negative and finite"));
        }
        if !(self.nugget >= 0.0 && self.nugget.is_finite()) {
            return Err(KrigingError::invalid(
                "nugget",
                self.nugget,
                "must be non-negative and finite",
            ));
        }
        if self.nugget > self.sill {
            warn!(
                nugget = self.nugget,
                sill = self.sill,
                "variogram nugget exceeds sill"
            );
        }
        Ok(())
    }

    /// `2 * n + 1` evenly spaced `(distance, semivariance)` samples over
    /// `[0, max_distance]` for plotting. The sample at zero reports the nugget.
    pub fn curve(&self, max_distance: f64, n: usize) -> Vec<(f64, f64)> {
        let steps = 2 * n;
        (0..=steps)
            .map(|i| {
                let d = if steps == 0 {
                    0.0
                } else {
                    i as f64 * max_distance / steps as f64
                };
                let g = if d == 0.0 { self.nugget } else { self.evaluate(d) };
                (d, g)
            })
            .collect()
    }
}

impl From<VariogramParameters> for VariogramModel {
    fn from(p: VariogramParameters) -> Self {
        Self::new(p.variogram_type, p.nugget, p.sill, p.range)
    }
}

#[inline(always)]
pub(crate) fn structure(variogram_type: VariogramType, sill: f64, range: f64, h: f64) -> f64 {
    match variogram_type {
        VariogramType::Spherical => IsoSpherical::new(range, sill).variogram(h),
        VariogramType::Exponential => IsoExponential::new(range, sill).variogram(h),
        VariogramType::Gaussian => IsoGaussian::new(range, sill).variogram(h),
    }
}
