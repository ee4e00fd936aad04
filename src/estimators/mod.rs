use std::borrow::Cow;

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info};

use crate::config::KrigingConfig;
use crate::error::{KrigingError, Result};
use crate::progress::{NoProgress, ProgressSink, ProgressTracker};
use crate::raster::{GridRaster, GridSpec};
use crate::spatial_database::point_set::PointSet;
use crate::systems::ok_system::{KrigingEstimate, KrigingSystem, SolveMethod};
use crate::variography::experimental::{
    bin_pairs, BinnedVariogram, BinningMode, ExperimentalVariogram, VariogramSurface,
};
use crate::variography::fitting::{FitSample, VariogramFitter};
use crate::variography::model_variograms::VariogramModel;
use crate::variography::pairs::PairCatalog;

pub mod cross_validation;

use cross_validation::CrossValidation;

pub const INTERPOLATING: &str = "Interpolating";
pub const FITTING: &str = "Fitting variogram";

/// Everything one run produces.
#[derive(Clone, Debug)]
pub struct KrigingResult {
    pub model: VariogramModel,
    /// Binned lags the model was fitted to, absent for supplied models.
    pub variogram: Option<ExperimentalVariogram>,
    pub estimate: GridRaster,
    pub variance: Option<GridRaster>,
    pub cross_validation: Option<CrossValidation>,
    /// Samples used after subsampling.
    pub sample_count: usize,
    /// Cells whose system needed the pseudo-inverse.
    pub pseudo_inverse_solves: usize,
}

/// Runs the whole pipeline for one configuration.
pub struct KrigingEngine<'a> {
    config: &'a KrigingConfig,
    progress: &'a dyn ProgressSink,
}

impl<'a> KrigingEngine<'a> {
    pub fn new(config: &'a KrigingConfig) -> Self {
        Self {
            config,
            progress: &NoProgress,
        }
    }

    pub fn with_progress(config: &'a KrigingConfig, progress: &'a dyn ProgressSink) -> Self {
        Self { config, progress }
    }

    fn rng(&self) -> StdRng {
        match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Subsample oversized corpora.
    fn prepare<'p>(&self, points: &'p PointSet, rng: &mut StdRng) -> Cow<'p, PointSet> {
        match self.config.max_points {
            Some(max) if points.len() > max => Cow::Owned(points.subsample(max, rng)),
            _ => Cow::Borrowed(points),
        }
    }

    /// Configured lag size, or `max pair distance * distance_ratio / number_of_lags`.
    pub fn lag_size(&self, catalog: &PairCatalog) -> Result<f64> {
        if self.config.lag_size > 0.0 {
            return Ok(self.config.lag_size);
        }
        let lag = catalog.max_distance * self.config.distance_ratio
            / self.config.number_of_lags as f64;
        if !(lag > 0.0) {
            return Err(KrigingError::invalid(
                "lag_size",
                lag,
                "all samples coincide, cannot size lags automatically",
            ));
        }
        info!(lag_size = lag, "derived lag size");
        Ok(lag)
    }

    fn catalog(&self, points: &PointSet, mode: &BinningMode) -> Result<PairCatalog> {
        if points.len() < 2 {
            return Err(KrigingError::InsufficientData {
                needed: 2,
                found: points.len(),
            });
        }
        let catalog = PairCatalog::build(points, mode.pair_policy());
        info!(pairs = catalog.len(), "enumerated sample pairs");
        Ok(catalog)
    }

    /// Bin the corpus along the configured direction and fit the model to it.
    pub fn fit_variogram(
        &self,
        points: &PointSet,
        rng: &mut StdRng,
    ) -> Result<(VariogramModel, ExperimentalVariogram)> {
        let mode = self.config.binning_mode();
        let catalog = self.catalog(points, &mode)?;
        let lag_size = self.lag_size(&catalog)?;

        let variogram = match bin_pairs(&catalog, lag_size, self.config.number_of_lags, &mode)? {
            BinnedVariogram::Lags(v) => v,
            BinnedVariogram::Surface(_) => return Err(KrigingError::NoValidBins),
        };
        debug!(
            bins = variogram.bins.len(),
            empty = variogram.empty_count(),
            "experimental variogram"
        );

        let samples = FitSample::from_variogram(&variogram, self.config.fit_weighting);
        let fitter = VariogramFitter {
            variogram_type: self.config.variogram_type,
            consider_nugget: self.config.consider_nugget,
            lag_size,
            backend: self.config.fit_backend,
            evolutionary: self.config.evolutionary.clone(),
        };
        let model = fitter.fit(&samples, rng)?;

        Ok((model, variogram))
    }

    /// Semivariogram surface of the corpus, for inspecting anisotropy.
    pub fn variogram_surface(&self, points: &PointSet) -> Result<VariogramSurface> {
        self.config.validate()?;
        let mut rng = self.rng();
        let points = self.prepare(points, &mut rng);

        let catalog = self.catalog(&points, &BinningMode::Map)?;
        let lag_size = self.lag_size(&catalog)?;

        match bin_pairs(&catalog, lag_size, self.config.number_of_lags, &BinningMode::Map)? {
            BinnedVariogram::Surface(surface) => Ok(surface),
            BinnedVariogram::Lags(_) => Err(KrigingError::NoValidBins),
        }
    }

    pub fn run(&self, points: &PointSet) -> Result<KrigingResult> {
        self.config.validate()?;
        let tracker = ProgressTracker::new(self.progress);
        let mut rng = self.rng();

        let points = self.prepare(points, &mut rng);
        if points.is_empty() {
            return Err(KrigingError::InsufficientData {
                needed: 1,
                found: 0,
            });
        }

        let (model, variogram) = match &self.config.variogram {
            Some(params) => (VariogramModel::from(*params), None),
            None => {
                tracker.emit(FITTING, 0);
                let (model, variogram) = self.fit_variogram(&points, &mut rng)?;
                tracker.emit(FITTING, 100);
                (model, Some(variogram))
            }
        };
        model.validate()?;

        let system = KrigingSystem::new(
            &points,
            &model,
            self.config.number_of_nearest_neighbors,
            self.config.svd_tolerance,
        )?;

        let bounds = self.config.bounding_box.unwrap_or(points.bounds);
        let spec = GridSpec::from_bounds(&bounds, self.config.resolution)?;
        info!(
            rows = spec.rows,
            cols = spec.cols,
            neighbors = system.k(),
            "interpolating grid"
        );

        let mut values = Array2::from_elem((spec.rows, spec.cols), 0f64);
        let mut variance = self
            .config
            .compute_variance
            .then(|| Array2::from_elem((spec.rows, spec.cols), 0f64));
        let mut pseudo_inverse_solves = 0;

        tracker.update(INTERPOLATING, 0, spec.rows);
        for row in 0..spec.rows {
            for (col, est) in self.solve_row(&system, &spec, row)?.into_iter().enumerate() {
                values[[row, col]] = est.value;
                if let Some(variance) = variance.as_mut() {
                    variance[[row, col]] = est.variance;
                }
                if est.method == SolveMethod::PseudoInverse {
                    pseudo_inverse_solves += 1;
                }
            }
            tracker.update(INTERPOLATING, row + 1, spec.rows);
        }
        if pseudo_inverse_solves > 0 {
            info!(
                cells = pseudo_inverse_solves,
                "solved singular systems with the pseudo-inverse"
            );
        }

        let cross_validation = if self.config.cross_validate {
            if points.len() < 2 {
                return Err(KrigingError::InsufficientData {
                    needed: 2,
                    found: points.len(),
                });
            }
            let cv = CrossValidation::run(&system, &points, &tracker, self.config.parallel)?;
            info!(rmse = cv.rmse, mean_error = cv.mean_error, "cross validation");
            Some(cv)
        } else {
            None
        };

        Ok(KrigingResult {
            model,
            variogram,
            estimate: GridRaster::new(spec, values),
            variance: variance.map(|v| GridRaster::new(spec, v)),
            cross_validation,
            sample_count: points.len(),
            pseudo_inverse_solves,
        })
    }

    fn solve_row(
        &self,
        system: &KrigingSystem,
        spec: &GridSpec,
        row: usize,
    ) -> Result<Vec<KrigingEstimate>> {
        let solve = |col: usize| {
            let (x, y) = spec.cell_center(row, col);
            system.estimate(x, y)
        };

        if self.config.parallel {
            (0..spec.cols).into_par_iter().map(solve).collect()
        } else {
            (0..spec.cols).map(solve).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::aabb::Aabb;
    use crate::spatial_database::SamplePoint;
    use crate::variography::fitting::FitBackend;
    use crate::variography::model_variograms::{VariogramParameters, VariogramType};
    use approx::assert_abs_diff_eq;
    use nalgebra::Point2;
    use rand::Rng;
    use std::sync::Mutex;

    fn lattice() -> PointSet {
        PointSet::new(
            (0..5)
                .flat_map(|i| {
                    (0..5).map(move |j| {
                        let (x, y) = (i as f64, j as f64);
                        SamplePoint::new(x, y, (x * 0.7).sin() + 0.3 * y)
                    })
                })
                .collect(),
        )
    }

    fn random_set(n: usize, seed: u64) -> PointSet {
        let mut rng = StdRng::seed_from_u64(seed);
        PointSet::new(
            (0..n)
                .map(|_| {
                    let x = rng.gen_range(0.0..50.0);
                    let y = rng.gen_range(0.0..50.0);
                    SamplePoint::new(x, y, (x / 10.0).sin() + (y / 15.0).cos())
                })
                .collect(),
        )
    }

    #[test]
    fn grid_cells_on_samples_reproduce_them() {
        let points = lattice();
        let config = KrigingConfig {
            number_of_nearest_neighbors: 8,
            variogram: Some(VariogramParameters {
                variogram_type: VariogramType::Spherical,
                nugget: 0.0,
                sill: 1.0,
                range: 4.0,
            }),
            compute_variance: true,
            ..Default::default()
        };

        let result = KrigingEngine::new(&config).run(&points).unwrap();

        assert_eq!((result.estimate.spec.rows, result.estimate.spec.cols), (5, 5));
        let variance = result.variance.unwrap();
        for p in points.points.iter() {
            let row = (4.0 - p.y) as usize;
            let col = p.x as usize;
            assert_abs_diff_eq!(result.estimate.get(row, col).unwrap(), p.z, epsilon = 1e-6);
            assert_abs_diff_eq!(variance.get(row, col).unwrap(), 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn two_point_corpus_keeps_initial_range() {
        let points = PointSet::new(vec![
            SamplePoint::new(0.0, 0.0, 1.0),
            SamplePoint::new(3.0, 4.0, 5.0),
        ]);
        let config = KrigingConfig {
            lag_size: 10.0,
            number_of_lags: 1,
            number_of_nearest_neighbors: 2,
            ..Default::default()
        };

        let result = KrigingEngine::new(&config).run(&points).unwrap();
        let variogram = result.variogram.unwrap();

        assert_eq!(variogram.bins.len(), 1);
        assert_eq!(variogram.bins[0].count, 1);
        assert_eq!(result.model.range, 10.0);
        assert!(result.estimate.data.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn zero_neighbours_is_rejected() {
        let config = KrigingConfig {
            number_of_nearest_neighbors: 0,
            ..Default::default()
        };
        let err = KrigingEngine::new(&config).run(&lattice()).err().unwrap();
        assert!(matches!(err, KrigingError::InvalidParameter { .. }));
    }

    #[test]
    fn cross_validation_excludes_query_point() {
        let points = random_set(12, 3);
        let config = KrigingConfig {
            number_of_nearest_neighbors: points.len() - 1,
            resolution: 10.0,
            cross_validate: true,
            rng_seed: Some(2),
            ..Default::default()
        };

        let result = KrigingEngine::new(&config).run(&points).unwrap();
        let cv = result.cross_validation.unwrap();

        assert_eq!(cv.predicted.len(), points.len());
        assert!(cv.rmse.is_finite() && cv.mean_error.is_finite());
        for (p, q) in cv.predicted.iter().zip(points.points.iter()) {
            assert_eq!((p.x, p.y), (q.x, q.y));
        }

        let model = result.model;
        let system = KrigingSystem::new(&points, &model, points.len() - 1, 0.003).unwrap();
        for i in 0..points.len() {
            assert!(!system.cross_validate(i).unwrap().neighbors.contains(&i));
        }
    }

    #[test]
    fn supplied_variogram_skips_fitting() {
        let config = KrigingConfig {
            variogram: Some(VariogramParameters {
                variogram_type: VariogramType::Gaussian,
                nugget: 0.0,
                sill: 1.0,
                range: 3.0,
            }),
            bounding_box: Some(Aabb::from_min_max(Point2::new(0.0, 0.0), Point2::new(2.0, 2.0))),
            ..Default::default()
        };

        let result = KrigingEngine::new(&config).run(&lattice()).unwrap();

        assert!(result.variogram.is_none());
        assert_eq!(result.model.range, 3.0);
        assert_eq!((result.estimate.spec.rows, result.estimate.spec.cols), (3, 3));
    }

    #[test]
    fn parallel_rows_match_sequential() {
        let points = random_set(80, 5);
        let base = KrigingConfig {
            resolution: 5.0,
            rng_seed: Some(4),
            cross_validate: true,
            ..Default::default()
        };
        let parallel = KrigingConfig {
            parallel: true,
            ..base.clone()
        };

        let a = KrigingEngine::new(&base).run(&points).unwrap();
        let b = KrigingEngine::new(&parallel).run(&points).unwrap();

        assert_eq!(a.model, b.model);
        assert_eq!(a.estimate, b.estimate);
        assert_eq!(a.cross_validation, b.cross_validation);
    }

    #[test]
    fn progress_is_monotonic_per_label() {
        let points = random_set(40, 6);
        let config = KrigingConfig {
            resolution: 2.5,
            fit_backend: FitBackend::Evolutionary,
            rng_seed: Some(8),
            ..Default::default()
        };
        let seen = Mutex::new(Vec::new());
        let sink = |label: &str, percent: u8| seen.lock().unwrap().push((label.to_string(), percent));

        KrigingEngine::with_progress(&config, &sink).run(&points).unwrap();

        let seen = seen.into_inner().unwrap();
        let interp = seen
            .iter()
            .filter(|(l, _)| l == INTERPOLATING)
            .map(|(_, p)| *p)
            .collect::<Vec<_>>();
        assert_eq!(interp.first(), Some(&0));
        assert_eq!(interp.last(), Some(&100));
        assert!(interp.windows(2).all(|w| w[0] < w[1]));
        assert!(seen.iter().any(|(l, p)| l == FITTING && *p == 100));
    }

    #[test]
    fn anisotropic_run_fits_along_the_sector() {
        let points = random_set(80, 12);
        let config = KrigingConfig {
            anisotropic: true,
            angle: std::f64::consts::FRAC_PI_2,
            tolerance: std::f64::consts::FRAC_PI_4,
            bandwidth: 10.0,
            resolution: 5.0,
            rng_seed: Some(13),
            compute_variance: true,
            ..Default::default()
        };
        let engine = KrigingEngine::new(&config);

        let result = engine.run(&points).unwrap();

        let variogram = result.variogram.unwrap();
        assert_eq!(variogram.bins.len(), config.number_of_lags);
        assert!(variogram.non_empty().count() > 0);
        assert!(result.model.validate().is_ok());
        assert!(result.estimate.data.iter().all(|v| v.is_finite()));
        assert!(result.variance.unwrap().data.iter().all(|v| v.is_finite()));

        // the sector draws on a subset of the isotropic pairs
        let isotropic = KrigingConfig {
            anisotropic: false,
            ..config.clone()
        };
        let iso_pairs = KrigingEngine::new(&isotropic)
            .run(&points)
            .unwrap()
            .variogram
            .unwrap()
            .bins
            .iter()
            .map(|b| b.count)
            .sum::<usize>();
        let sector_pairs = variogram.bins.iter().map(|b| b.count).sum::<usize>();
        assert!(sector_pairs < iso_pairs);
    }

    #[test]
    fn subsampling_caps_the_corpus() {
        let points = random_set(300, 9);
        let config = KrigingConfig {
            max_points: Some(60),
            rng_seed: Some(10),
            resolution: 10.0,
            ..Default::default()
        };

        let result = KrigingEngine::new(&config).run(&points).unwrap();
        assert_eq!(result.sample_count, 60);
    }

    #[test]
    fn surface_has_both_half_planes() {
        let config = KrigingConfig {
            lag_size: 1.0,
            number_of_lags: 3,
            ..Default::default()
        };
        let surface = KrigingEngine::new(&config).variogram_surface(&lattice()).unwrap();

        assert_eq!(surface.bins.dim(), (6, 6));
        assert_eq!(surface.bins[[3, 3]].value, surface.bins[[2, 2]].value);
        assert!(surface.bins[[3, 3]].value.is_some());
    }

    #[test]
    fn single_sample_cannot_be_fitted() {
        let points = PointSet::new(vec![SamplePoint::new(0.0, 0.0, 1.0)]);
        let config = KrigingConfig::default();
        assert!(matches!(
            KrigingEngine::new(&config).run(&points),
            Err(KrigingError::InsufficientData { needed: 2, found: 1 })
        ));
    }
}
