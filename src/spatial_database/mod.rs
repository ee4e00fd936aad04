use nalgebra::Point2;
use serde::{Deserialize, Serialize};

pub mod point_set;
pub mod rtree_index;

/// A single observation in the plane.
///
/// `v` carries the kriging variance of a prediction and is zero for loaded samples.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub v: f64,
}

impl SamplePoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z, v: 0.0 }
    }

    #[inline(always)]
    pub fn coords(&self) -> [f64; 2] {
        [self.x, self.y]
    }

    #[inline(always)]
    pub fn point(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    #[inline(always)]
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        (self.x - x).hypot(self.y - y)
    }
}

/// Geometry of an input record before it enters the pipeline.
///
/// Only point geometries carry samples; anything else is rejected.
#[derive(Clone, Debug, PartialEq)]
pub enum InputGeometry {
    Point([f64; 2]),
    MultiPoint(Vec<[f64; 2]>),
    Polyline(Vec<[f64; 2]>),
    Polygon(Vec<[f64; 2]>),
}

impl InputGeometry {
    pub fn kind(&self) -> &'static str {
        match self {
            InputGeometry::Point(_) => "point",
            InputGeometry::MultiPoint(_) => "multipoint",
            InputGeometry::Polyline(_) => "polyline",
            InputGeometry::Polygon(_) => "polygon",
        }
    }
}
