use std::path::Path;

use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::Serialize;

use crate::error::Result;
use crate::progress::ProgressTracker;
use crate::spatial_database::point_set::PointSet;
use crate::spatial_database::SamplePoint;
use crate::systems::ok_system::KrigingSystem;

pub const LABEL: &str = "Cross validating";

/// Leave-one-out predictions aligned with the input samples.
#[derive(Clone, Debug, PartialEq)]
pub struct CrossValidation {
    /// Input location with the predicted value as `z` and kriging variance as `v`.
    pub predicted: Vec<SamplePoint>,
    pub observed: Vec<f64>,
    pub rmse: f64,
    /// Mean of `predicted - observed`.
    pub mean_error: f64,
}

#[derive(Serialize)]
struct CsvRow {
    x: f64,
    y: f64,
    predicted: f64,
    observed: f64,
    variance: f64,
}

impl CrossValidation {
    pub fn run(
        system: &KrigingSystem,
        point_set: &PointSet,
        tracker: &ProgressTracker,
        parallel: bool,
    ) -> Result<Self> {
        let n = point_set.len();
        let predict = |i: usize| {
            system.cross_validate(i).map(|est| {
                let p = point_set.points[i];
                SamplePoint {
                    z: est.value,
                    v: est.variance,
                    ..p
                }
            })
        };

        let predicted = if parallel {
            let predicted = (0..n).into_par_iter().map(predict).collect::<Result<Vec<_>>>()?;
            tracker.update(LABEL, n, n);
            predicted
        } else {
            let mut predicted = Vec::with_capacity(n);
            for i in 0..n {
                predicted.push(predict(i)?);
                tracker.update(LABEL, i + 1, n);
            }
            predicted
        };

        Ok(Self::from_predictions(&point_set.points, predicted))
    }

    pub fn from_predictions(samples: &[SamplePoint], predicted: Vec<SamplePoint>) -> Self {
        let observed = samples.iter().map(|p| p.z).collect::<Vec<_>>();
        let n = observed.len().max(1) as f64;

        let (sum, sum_sq) = predicted
            .iter()
            .zip(observed.iter())
            .fold((0f64, 0f64), |(sum, sum_sq), (p, o)| {
                let e = p.z - o;
                (sum + e, sum_sq + e * e)
            });

        Self {
            predicted,
            observed,
            rmse: (sum_sq / n).sqrt(),
            mean_error: sum / n,
        }
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        for (p, o) in self.predicted.iter().zip(self.observed.iter()) {
            wtr.serialize(CsvRow {
                x: p.x,
                y: p.y,
                predicted: p.z,
                observed: *o,
                variance: p.v,
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn summary_statistics() {
        let samples = vec![
            SamplePoint::new(0.0, 0.0, 1.0),
            SamplePoint::new(1.0, 0.0, 2.0),
            SamplePoint::new(2.0, 0.0, 3.0),
        ];
        let predicted = vec![
            SamplePoint::new(0.0, 0.0, 2.0),
            SamplePoint::new(1.0, 0.0, 2.0),
            SamplePoint::new(2.0, 0.0, 1.0),
        ];

        let cv = CrossValidation::from_predictions(&samples, predicted);

        assert_relative_eq!(cv.mean_error, -1.0 / 3.0);
        assert_relative_eq!(cv.rmse, (5.0f64 / 3.0).sqrt());
    }

    #[test]
    fn csv_has_one_row_per_sample() {
        let samples = vec![SamplePoint::new(0.0, 1.0, 1.0), SamplePoint::new(2.0, 3.0, 2.0)];
        let cv = CrossValidation::from_predictions(&samples, samples.clone());

        let path = std::env::temp_dir().join(format!("geokrige_cv_{}.csv", std::process::id()));
        cv.write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "x,y,predicted,observed,variance");
        assert_eq!(lines.len(), 3);
        assert_eq!(cv.rmse, 0.0);
    }
}
