use std::f64::consts::FRAC_PI_4;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{KrigingError, Result};
use crate::geometry::aabb::Aabb;
use crate::variography::experimental::BinningMode;
use crate::variography::fitting::{EvolutionaryConfig, FitBackend, FitWeighting};
use crate::variography::model_variograms::{VariogramParameters, VariogramType};

/// Settings of one interpolation run.
///
/// Passed by reference into [`crate::estimators::KrigingEngine`] and never
/// mutated by it. Missing JSON fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KrigingConfig {
    /// Bin a single direction sector instead of all directions.
    pub anisotropic: bool,
    /// Sector direction in radians, counter-clockwise from +x.
    pub angle: f64,
    /// Sector half width in radians.
    pub tolerance: f64,
    /// Maximum distance of a pair from the sector centerline.
    pub bandwidth: f64,
    /// Lag width, `0` to derive it from the corpus.
    pub lag_size: f64,
    pub number_of_lags: usize,
    /// Share of the largest pair distance covered by the lags when sizing them automatically.
    pub distance_ratio: f64,
    pub consider_nugget: bool,
    pub variogram_type: VariogramType,
    pub fit_backend: FitBackend,
    pub fit_weighting: FitWeighting,
    pub evolutionary: EvolutionaryConfig,
    /// Use these parameters instead of fitting.
    pub variogram: Option<VariogramParameters>,
    pub number_of_nearest_neighbors: usize,
    /// Output cell size.
    pub resolution: f64,
    /// Output extent, the sample extent when absent.
    pub bounding_box: Option<Aabb>,
    /// Subsample the corpus down to this many points before pairing.
    pub max_points: Option<usize>,
    pub rng_seed: Option<u64>,
    /// Singular values at or below this are dropped by the pseudo-inverse fallback.
    pub svd_tolerance: f64,
    pub compute_variance: bool,
    pub cross_validate: bool,
    /// Solve the cells of each row on the rayon pool.
    pub parallel: bool,
}

impl Default for KrigingConfig {
    fn default() -> Self {
        Self {
            anisotropic: false,
            angle: 0.0,
            tolerance: FRAC_PI_4,
            bandwidth: 5000.0,
            lag_size: 0.0,
            number_of_lags: 12,
            distance_ratio: 0.5,
            consider_nugget: true,
            variogram_type: VariogramType::Spherical,
            fit_backend: FitBackend::Gradient,
            fit_weighting: FitWeighting::Uniform,
            evolutionary: EvolutionaryConfig::default(),
            variogram: None,
            number_of_nearest_neighbors: 12,
            resolution: 1.0,
            bounding_box: None,
            max_points: None,
            rng_seed: None,
            svd_tolerance: 0.003,
            compute_variance: false,
            cross_validate: false,
            parallel: false,
        }
    }
}

impl KrigingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.number_of_nearest_neighbors == 0 {
            return Err(KrigingError::invalid(
                "number_of_nearest_neighbors",
                self.number_of_nearest_neighbors,
                "must be at least 1",
            ));
        }
        if self.number_of_lags == 0 {
            return Err(KrigingError::invalid(
                "number_of_lags",
                self.number_of_lags,
                "must be at least 1",
            ));
        }
        if !(self.resolution > 0.0 && self.resolution.is_finite()) {
            return Err(KrigingError::invalid(
                "resolution",
                self.resolution,
                "must be positive and finite",
            ));
        }
        if !(self.lag_size >= 0.0 && self.lag_size.is_finite()) {
            return Err(KrigingError::invalid(
                "lag_size",
                self.lag_size,
                "must be zero (automatic) or positive",
            ));
        }
        if !(self.distance_ratio > 0.0 && self.distance_ratio.is_finite()) {
            return Err(KrigingError::invalid(
                "distance_ratio",
                self.distance_ratio,
                "must be positive",
            ));
        }
        if !(self.svd_tolerance >= 0.0) {
            return Err(KrigingError::invalid(
                "svd_tolerance",
                self.svd_tolerance,
                "must be non-negative",
            ));
        }
        if self.anisotropic {
            if !(self.tolerance >= 0.0) {
                return Err(KrigingError::invalid(
                    "tolerance",
                    self.tolerance,
                    "must be non-negative",
                ));
            }
            if !(self.bandwidth >= 0.0) {
                return Err(KrigingError::invalid(
                    "bandwidth",
                    self.bandwidth,
                    "must be non-negative",
                ));
            }
        }
        if let Some(bbox) = &self.bounding_box {
            if bbox.is_empty() {
                return Err(KrigingError::invalid(
                    "bounding_box",
                    format!("{:?}", bbox),
                    "minimum exceeds maximum",
                ));
            }
        }
        if self.max_points == Some(0) {
            return Err(KrigingError::invalid("max_points", 0, "must be at least 1"));
        }
        if self.evolutionary.population_size == 0 {
            return Err(KrigingError::invalid(
                "population_size",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Binning mode for fitting, derived from the anisotropy settings.
    pub fn binning_mode(&self) -> BinningMode {
        if self.anisotropic {
            BinningMode::Anisotropic {
                angle: self.angle,
                tolerance: self.tolerance,
                bandwidth: self.bandwidth,
            }
        } else {
            BinningMode::Isotropic
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut w, self)?;
        w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        KrigingConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_neighbours() {
        let config = KrigingConfig {
            number_of_nearest_neighbors: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(KrigingError::InvalidParameter {
                name: "number_of_nearest_neighbors",
                ..
            })
        ));
    }

    #[test]
    fn rejects_bad_numbers() {
        let bad = [
            KrigingConfig {
                number_of_lags: 0,
                ..Default::default()
            },
            KrigingConfig {
                resolution: 0.0,
                ..Default::default()
            },
            KrigingConfig {
                lag_size: -1.0,
                ..Default::default()
            },
            KrigingConfig {
                distance_ratio: 0.0,
                ..Default::default()
            },
            KrigingConfig {
                anisotropic: true,
                bandwidth: -2.0,
                ..Default::default()
            },
            KrigingConfig {
                bounding_box: Some(Aabb {
                    mins: [1.0, 0.0],
                    maxs: [0.0, 1.0],
                }),
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: KrigingConfig = serde_json::from_str(
            r#"{"variogram_type":"gaussian","fit_backend":"evolutionary","number_of_lags":8}"#,
        )
        .unwrap();

        assert_eq!(config.variogram_type, VariogramType::Gaussian);
        assert_eq!(config.fit_backend, FitBackend::Evolutionary);
        assert_eq!(config.number_of_lags, 8);
        assert_eq!(config.svd_tolerance, 0.003);
        assert_eq!(config.binning_mode(), BinningMode::Isotropic);
    }

    #[test]
    fn save_and_load() {
        let path = std::env::temp_dir().join(format!("geokrige_config_{}.json", std::process::id()));
        let config = KrigingConfig {
            anisotropic: true,
            angle: 1.0,
            rng_seed: Some(17),
            bounding_box: Some(Aabb {
                mins: [0.0, 0.0],
                maxs: [10.0, 5.0],
            }),
            ..Default::default()
        };

        config.save(&path).unwrap();
        let loaded = KrigingConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }
}
