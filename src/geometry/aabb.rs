use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Axis aligned bounding box in the plane.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub mins: [f64; 2],
    pub maxs: [f64; 2],
}

impl Aabb {
    #[inline(always)]
    pub fn from_min_max(min: Point2<f64>, max: Point2<f64>) -> Self {
        Self {
            mins: [min.x, min.y],
            maxs: [max.x, max.y],
        }
    }

    /// Box that contains nothing; extending it with a point yields that point.
    #[inline(always)]
    pub fn empty() -> Self {
        Self {
            mins: [f64::INFINITY; 2],
            maxs: [f64::NEG_INFINITY; 2],
        }
    }

    /// Smallest box containing every point, `None` for an empty iterator.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point2<f64>>,
    {
        let aabb = points.into_iter().fold(Self::empty(), |mut acc, p| {
            acc.extend(&p);
            acc
        });
        (!aabb.is_empty()).then_some(aabb)
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.mins[0] > self.maxs[0] || self.mins[1] > self.maxs[1]
    }

    #[inline(always)]
    pub fn extend(&mut self, point: &Point2<f64>) {
        self.mins[0] = self.mins[0].min(point.x);
        self.mins[1] = self.mins[1].min(point.y);
        self.maxs[0] = self.maxs[0].max(point.x);
        self.maxs[1] = self.maxs[1].max(point.y);
    }

    #[inline(always)]
    pub fn min_x(&self) -> f64 {
        self.mins[0]
    }

    #[inline(always)]
    pub fn min_y(&self) -> f64 {
        self.mins[1]
    }

    #[inline(always)]
    pub fn max_x(&self) -> f64 {
        self.maxs[0]
    }

    #[inline(always)]
    pub fn max_y(&self) -> f64 {
        self.maxs[1]
    }
}
