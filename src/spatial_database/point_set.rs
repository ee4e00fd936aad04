use std::collections::HashMap;
use std::path::Path;

use rand::Rng;
use tracing::info;

use crate::error::{KrigingError, Result};
use crate::geometry::aabb::Aabb;
use crate::spatial_database::rtree_index::SpatialIndex;
use crate::spatial_database::{InputGeometry, SamplePoint};

/// The sample corpus of one pipeline run together with its neighbour index.
#[derive(Clone)]
pub struct PointSet {
    pub points: Vec<SamplePoint>,
    pub index: SpatialIndex<usize>,
    pub bounds: Aabb,
}

impl PointSet {
    pub fn new(points: Vec<SamplePoint>) -> Self {
        let index = SpatialIndex::from_items(&points, SamplePoint::coords);
        let bounds = Aabb::from_points(points.iter().map(SamplePoint::point))
            .unwrap_or_else(Aabb::empty);

        Self {
            points,
            index,
            bounds,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Load samples from a CSV file with a header row.
    pub fn from_csv<P: AsRef<Path>>(
        csv_path: P,
        x_col: &str,
        y_col: &str,
        z_col: &str,
    ) -> Result<Self> {
        let mut rdr = csv::Reader::from_path(csv_path)?;
        let headers = rdr.headers()?.clone();
        for col in [x_col, y_col, z_col] {
            if !headers.iter().any(|h| h == col) {
                return Err(KrigingError::MissingColumn(col.to_string()));
            }
        }

        let mut points = Vec::new();
        for result in rdr.deserialize() {
            let record: HashMap<String, String> = result?;

            let x = parse_field(&record, x_col)?;
            let y = parse_field(&record, y_col)?;
            let z = parse_field(&record, z_col)?;

            points.push(SamplePoint::new(x, y, z));
        }

        Ok(Self::new(points))
    }

    /// Flatten point and multipoint records into samples.
    ///
    /// Any other geometry aborts the load with [`KrigingError::NonPointGeometry`].
    pub fn from_geometries<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = (InputGeometry, f64)>,
    {
        let mut points = Vec::new();
        for (geometry, z) in records {
            match geometry {
                InputGeometry::Point([x, y]) => points.push(SamplePoint::new(x, y, z)),
                InputGeometry::MultiPoint(parts) => {
                    points.extend(parts.into_iter().map(|[x, y]| SamplePoint::new(x, y, z)))
                }
                other => {
                    return Err(KrigingError::NonPointGeometry {
                        kind: other.kind().to_string(),
                    })
                }
            }
        }

        Ok(Self::new(points))
    }

    /// Uniform random subset of at most `max_points` samples, drawn without
    /// replacement. Original ordering is preserved.
    pub fn subsample<R: Rng + ?Sized>(&self, max_points: usize, rng: &mut R) -> Self {
        if self.len() <= max_points {
            return self.clone();
        }

        let mut inds = rand::seq::index::sample(rng, self.len(), max_points).into_vec();
        inds.sort_unstable();

        info!(
            from = self.len(),
            to = max_points,
            "subsampling point corpus"
        );

        Self::new(inds.into_iter().map(|i| self.points[i]).collect())
    }
}

fn parse_field(record: &HashMap<String, String>, col: &str) -> Result<f64> {
    let raw = record
        .get(col)
        .ok_or_else(|| KrigingError::MissingColumn(col.to_string()))?;
    let value = raw
        .trim()
        .parse::<f64>()
        .map_err(|_| KrigingError::invalid("csv field", raw, format!("column {col} is not numeric")))?;
    if !value.is_finite() {
        return Err(KrigingError::invalid(
            "csv field",
            raw,
            format!("column {col} is not finite"),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::io::Write;

    fn write_csv(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "geokrige_{}_{}.csv",
            name,
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn csv_loads_named_columns() {
        let path = write_csv("load", "id,east,north,grade\n1,0.0,1.0,3.5\n2,2.0,3.0,4.5\n");
        let set = PointSet::from_csv(&path, "east", "north", "grade").unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(set.len(), 2);
        assert_eq!(set.points[1], SamplePoint::new(2.0, 3.0, 4.5));
        assert_eq!(set.bounds.mins, [0.0, 1.0]);
        assert_eq!(set.bounds.maxs, [2.0, 3.0]);
    }

    #[test]
    fn csv_missing_column() {
        let path = write_csv("missing", "x,y\n1,2\n");
        let err = PointSet::from_csv(&path, "x", "y", "z").err().unwrap();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, KrigingError::MissingColumn(c) if c == "z"));
    }

    #[test]
    fn csv_rejects_non_finite_values() {
        for (name, row) in [("nan", "NaN,1.0,2.0"), ("inf", "1.0,inf,2.0"), ("neg_inf", "1.0,1.0,-inf")] {
            let path = write_csv(name, &format!("x,y,z\n0.0,0.0,1.0\n{row}\n"));
            let err = PointSet::from_csv(&path, "x", "y", "z").err().unwrap();
            std::fs::remove_file(&path).ok();

            assert!(matches!(err, KrigingError::InvalidParameter { .. }), "{name}");
        }
    }

    #[test]
    fn csv_missing_file_is_io_error() {
        let res = PointSet::from_csv("/definitely/not/here.csv", "x", "y", "z");
        assert!(res.is_err());
    }

    #[test]
    fn geometries_reject_non_points() {
        let ok = PointSet::from_geometries(vec![
            (InputGeometry::Point([0.0, 0.0]), 1.0),
            (InputGeometry::MultiPoint(vec![[1.0, 0.0], [2.0, 0.0]]), 2.0),
        ])
        .unwrap();
        assert_eq!(ok.len(), 3);
        assert_eq!(ok.points[2].z, 2.0);

        let err = PointSet::from_geometries(vec![
            (InputGeometry::Point([0.0, 0.0]), 1.0),
            (InputGeometry::Polygon(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]]), 2.0),
        ])
        .err()
        .unwrap();
        assert!(matches!(err, KrigingError::NonPointGeometry { kind } if kind == "polygon"));
    }

    #[test]
    fn subsample_without_replacement() {
        let points = (0..200)
            .map(|i| SamplePoint::new(i as f64, 0.0, i as f64))
            .collect::<Vec<_>>();
        let set = PointSet::new(points);
        let mut rng = StdRng::seed_from_u64(7);

        let sub = set.subsample(50, &mut rng);
        assert_eq!(sub.len(), 50);
        assert_eq!(sub.index.len(), 50);

        let mut xs = sub.points.iter().map(|p| p.x as i64).collect::<Vec<_>>();
        let sorted = xs.clone();
        xs.dedup();
        assert_eq!(xs.len(), 50);
        assert!(sorted.windows(2).all(|w| w[0] < w[1]));

        let same = set.subsample(500, &mut rng);
        assert_eq!(same.len(), 200);
    }
}
