use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{KrigingError, Result};
use crate::geometry::aabb::Aabb;

pub const NO_DATA: f64 = -32768.0;

/// Output grid laid over a bounding box, with cell centres on the box edges.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub west: f64,
    pub north: f64,
    pub resolution: f64,
    pub rows: usize,
    pub cols: usize,
}

impl GridSpec {
    pub fn from_bounds(bounds: &Aabb, resolution: f64) -> Result<Self> {
        if !(resolution > 0.0 && resolution.is_finite()) {
            return Err(KrigingError::invalid(
                "resolution",
                resolution,
                "must be positive and finite",
            ));
        }
        if bounds.is_empty() {
            return Err(KrigingError::invalid(
                "bounding_box",
                format!("{:?}", bounds),
                "minimum exceeds maximum",
            ));
        }

        let west = bounds.min_x() - 0.5 * resolution;
        let north = bounds.max_y() + 0.5 * resolution;
        let rows = ((north - bounds.min_y()) / resolution).ceil() as usize;
        let cols = ((bounds.max_x() - west) / resolution).ceil() as usize;

        Ok(Self {
            west,
            north,
            resolution,
            rows,
            cols,
        })
    }

    pub fn south(&self) -> f64 {
        self.north - self.rows as f64 * self.resolution
    }

    pub fn east(&self) -> f64 {
        self.west + self.cols as f64 * self.resolution
    }

    /// `(easting, northing)` of the centre of a cell; row 0 is the northern edge.
    #[inline(always)]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let half = self.resolution / 2.0;
        (
            col as f64 * self.resolution + self.west + half,
            self.north - half - row as f64 * self.resolution,
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RasterHeader {
    pub min: f64,
    pub max: f64,
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
    pub cols: usize,
    pub rows: usize,
    pub no_data: f64,
}

impl RasterHeader {
    fn write_dep<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        let byte_order = if cfg!(target_endian = "little") {
            "LITTLE_ENDIAN"
        } else {
            "BIG_ENDIAN"
        };

        writeln!(w, "Min:\t{}", self.min)?;
        writeln!(w, "Max:\t{}", self.max)?;
        writeln!(w, "North:\t{}", self.north)?;
        writeln!(w, "South:\t{}", self.south)?;
        writeln!(w, "East:\t{}", self.east)?;
        writeln!(w, "West:\t{}", self.west)?;
        writeln!(w, "Cols:\t{}", self.cols)?;
        writeln!(w, "Rows:\t{}", self.rows)?;
        writeln!(w, "Data Type:\tfloat")?;
        writeln!(w, "Z Units:\tnot specified")?;
        writeln!(w, "XY Units:\tnot specified")?;
        writeln!(w, "Projection:\tnot specified")?;
        writeln!(w, "Data Scale:\tcontinuous")?;
        writeln!(w, "Preferred Palette:\trgb.pal")?;
        writeln!(w, "NoData:\t{}", self.no_data)?;
        writeln!(w, "Byte Order:\t{}", byte_order)?;
        Ok(())
    }
}

/// Row-major grid of cell values, row 0 northmost.
#[derive(Clone, Debug, PartialEq)]
pub struct GridRaster {
    pub spec: GridSpec,
    pub data: Array2<f64>,
}

impl GridRaster {
    pub fn new(spec: GridSpec, data: Array2<f64>) -> Self {
        Self { spec, data }
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        self.data.get((row, col)).copied()
    }

    pub fn header(&self) -> RasterHeader {
        let (min, max) = self
            .data
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let (min, max) = if min <= max { (min, max) } else { (NO_DATA, NO_DATA) };

        RasterHeader {
            min,
            max,
            north: self.spec.north,
            south: self.spec.south(),
            east: self.spec.east(),
            west: self.spec.west,
            cols: self.spec.cols,
            rows: self.spec.rows,
            no_data: NO_DATA,
        }
    }

    /// Write a Whitebox raster: the `.dep` text header at `header_path` and
    /// the `.tas` float32 data file next to it, in native byte order.
    pub fn write_whitebox<P: AsRef<Path>>(&self, header_path: P) -> Result<()> {
        let header_path = header_path.as_ref();
        let data_path = header_path.with_extension("tas");

        let mut dep = BufWriter::new(File::create(header_path)?);
        self.header().write_dep(&mut dep)?;
        dep.flush()?;

        let mut tas = BufWriter::new(File::create(data_path)?);
        for v in self.data.iter() {
            let v = if v.is_finite() { *v } else { NO_DATA };
            tas.write_all(&(v as f32).to_ne_bytes())?;
        }
        tas.flush()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    #[test]
    fn grid_covers_bounds_with_half_cell_margin() {
        let bounds = Aabb::from_min_max(Point2::new(0.0, 0.0), Point2::new(10.0, 4.0));
        let spec = GridSpec::from_bounds(&bounds, 2.0).unwrap();

        assert_eq!(spec.west, -1.0);
        assert_eq!(spec.north, 5.0);
        assert_eq!(spec.rows, 3);
        assert_eq!(spec.cols, 6);
        assert_eq!(spec.south(), -1.0);
        assert_eq!(spec.east(), 11.0);

        assert_eq!(spec.cell_center(0, 0), (0.0, 4.0));
        assert_eq!(spec.cell_center(2, 5), (10.0, 0.0));
    }

    #[test]
    fn single_point_extent_gives_one_cell() {
        let bounds = Aabb::from_min_max(Point2::new(3.0, 3.0), Point2::new(3.0, 3.0));
        let spec = GridSpec::from_bounds(&bounds, 1.0).unwrap();
        assert_eq!((spec.rows, spec.cols), (1, 1));
        assert_eq!(spec.cell_center(0, 0), (3.0, 3.0));
    }

    #[test]
    fn rejects_bad_resolution() {
        let bounds = Aabb::from_min_max(Point2::new(0.0, 0.0), Point2::new(1.0, 1.0));
        assert!(GridSpec::from_bounds(&bounds, 0.0).is_err());
        assert!(GridSpec::from_bounds(&bounds, f64::NAN).is_err());
    }

    #[test]
    fn writes_whitebox_pair() {
        let bounds = Aabb::from_min_max(Point2::new(0.0, 0.0), Point2::new(2.0, 1.0));
        let spec = GridSpec::from_bounds(&bounds, 1.0).unwrap();
        let data = Array2::from_shape_fn((spec.rows, spec.cols), |(r, c)| (r * 10 + c) as f64);
        let raster = GridRaster::new(spec, data);

        let dir = std::env::temp_dir();
        let dep = dir.join(format!("geokrige_raster_{}.dep", std::process::id()));
        raster.write_whitebox(&dep).unwrap();

        let header = std::fs::read_to_string(&dep).unwrap();
        let bytes = std::fs::read(dep.with_extension("tas")).unwrap();
        std::fs::remove_file(&dep).ok();
        std::fs::remove_file(dep.with_extension("tas")).ok();

        assert!(header.contains("Rows:\t2\n"));
        assert!(header.contains("Cols:\t3\n"));
        assert!(header.contains("Max:\t12\n"));
        assert!(header.contains("NoData:\t-32768\n"));
        assert_eq!(bytes.len(), 6 * 4);

        let last = f32::from_ne_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
        assert_relative_eq!(last, 12.0);
    }
}
