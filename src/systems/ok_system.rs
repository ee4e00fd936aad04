use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::error::{KrigingError, Result};
use crate::spatial_database::point_set::PointSet;
use crate::variography::model_variograms::VariogramModel;

/// Which neighbours a solve may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveMode {
    /// Plain interpolation at an arbitrary location.
    Interpolate,
    /// Leave-one-out prediction at sample `exclude`, which never enters its own system.
    CrossValidate { exclude: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolveMethod {
    Direct,
    /// Singular value pseudo-inverse after the direct solve failed.
    PseudoInverse,
}

#[derive(Clone, Debug, PartialEq)]
pub struct KrigingEstimate {
    pub value: f64,
    pub variance: f64,
    /// One weight per neighbour, summing to one.
    pub weights: Vec<f64>,
    pub lagrange: f64,
    pub neighbors: Vec<usize>,
    pub method: SolveMethod,
}

/// Ordinary kriging over the `k` nearest samples of a corpus.
///
/// Holds only shared references, so one system can serve every cell of a grid
/// from several threads.
pub struct KrigingSystem<'a> {
    point_set: &'a PointSet,
    model: &'a VariogramModel,
    k: usize,
    svd_tolerance: f64,
}

impl<'a> KrigingSystem<'a> {
    pub fn new(
        point_set: &'a PointSet,
        model: &'a VariogramModel,
        k: usize,
        svd_tolerance: f64,
    ) -> Result<Self> {
        if k == 0 {
            return Err(KrigingError::invalid(
                "number_of_nearest_neighbors",
                k,
                "must be at least 1",
            ));
        }
        if !(svd_tolerance >= 0.0) {
            return Err(KrigingError::invalid(
                "svd_tolerance",
                svd_tolerance,
                "must be non-negative",
            ));
        }
        if point_set.is_empty() {
            return Err(KrigingError::InsufficientData {
                needed: 1,
                found: 0,
            });
        }

        Ok(Self {
            point_set,
            model,
            k: k.min(point_set.len()),
            svd_tolerance,
        })
    }

    /// Number of neighbours used per interpolation, after clamping to the corpus size.
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn neighbors(&self, x: f64, y: f64, mode: SolveMode) -> Vec<usize> {
        match mode {
            SolveMode::Interpolate => self.point_set.index.k_nearest([x, y], self.k),
            SolveMode::CrossValidate { exclude } => {
                let mut found = self.point_set.index.k_nearest([x, y], self.k + 1);
                match found.iter().position(|&i| i == exclude) {
                    Some(pos) => {
                        found.remove(pos);
                    }
                    None => found.truncate(self.k),
                }
                found
            }
        }
    }

    pub fn estimate(&self, x: f64, y: f64) -> Result<KrigingEstimate> {
        self.solve(x, y, SolveMode::Interpolate)
    }

    /// Leave-one-out prediction of sample `index`.
    pub fn cross_validate(&self, index: usize) -> Result<KrigingEstimate> {
        let point = self.point_set.points.get(index).ok_or_else(|| {
            KrigingError::invalid("index", index, "no such sample")
        })?;
        self.solve(point.x, point.y, SolveMode::CrossValidate { exclude: index })
    }

    pub fn solve(&self, x: f64, y: f64, mode: SolveMode) -> Result<KrigingEstimate> {
        let neighbors = self.neighbors(x, y, mode);
        if neighbors.is_empty() {
            return Err(KrigingError::InsufficientData {
                needed: 1,
                found: 0,
            });
        }

        let (c, d) = self.build(x, y, &neighbors);
        let (w, method) = self.solve_system(c, &d)?;

        let n = neighbors.len();
        let value = neighbors
            .iter()
            .zip(w.iter())
            .map(|(&i, w)| w * self.point_set.points[i].z)
            .sum::<f64>();
        let variance = w.rows(0, n).dot(&d.rows(0, n)) + w[n];

        Ok(KrigingEstimate {
            value,
            variance,
            weights: w.rows(0, n).iter().copied().collect(),
            lagrange: w[n],
            neighbors,
            method,
        })
    }

    /// Left hand side `C` and right hand side `D` of the bordered system.
    fn build(&self, x: f64, y: f64, neighbors: &[usize]) -> (DMatrix<f64>, DVector<f64>) {
        let n = neighbors.len();
        let points = &self.point_set.points;

        let mut c = DMatrix::zeros(n + 1, n + 1);
        let mut d = DVector::zeros(n + 1);
        for (i, &pi) in neighbors.iter().enumerate() {
            let a = &points[pi];
            for (j, &pj) in neighbors.iter().enumerate().skip(i + 1) {
                let g = self.model.evaluate(a.distance_to(points[pj].x, points[pj].y));
                c[(i, j)] = g;
                c[(j, i)] = g;
            }
            c[(i, n)] = 1.0;
            c[(n, i)] = 1.0;
            d[i] = self.model.evaluate(a.distance_to(x, y));
        }
        d[n] = 1.0;

        (c, d)
    }

    fn solve_system(
        &self,
        c: DMatrix<f64>,
        d: &DVector<f64>,
    ) -> Result<(DVector<f64>, SolveMethod)> {
        if let Some(w) = c.clone().lu().solve(d) {
            if w.iter().all(|v| v.is_finite()) {
                return Ok((w, SolveMethod::Direct));
            }
        }

        debug!(size = c.nrows(), "singular kriging system, using pseudo-inverse");

        let pinv = c
            .svd(true, true)
            .pseudo_inverse(self.svd_tolerance)
            .map_err(|e| KrigingError::Svd(e.to_string()))?;

        Ok((pinv * d, SolveMethod::PseudoInverse))
    }
}
