use std::f64::consts::{FRAC_PI_2, TAU};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::aabb::Aabb;
use crate::spatial_database::point_set::PointSet;
use crate::spatial_database::rtree_index::SpatialIndex;
use crate::spatial_database::SamplePoint;

/// Which pairs of samples a catalog retains.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PairPolicy {
    /// Every ordered pair `(i, j)` with `i != j`.
    AllOrdered,
    /// One representative of each unordered pair, `i` preceding `j`.
    Half,
}

impl PairPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            PairPolicy::AllOrdered => "all-ordered",
            PairPolicy::Half => "half",
        }
    }

    #[inline(always)]
    fn keeps(&self, i: usize, a: &SamplePoint, j: usize, b: &SamplePoint) -> bool {
        if i == j {
            return false;
        }
        match self {
            PairPolicy::AllOrdered => true,
            PairPolicy::Half => precedes(i, a, j, b),
        }
    }
}

/// Total order on samples: by x, then y, then index.
#[inline(always)]
fn precedes(i: usize, a: &SamplePoint, j: usize, b: &SamplePoint) -> bool {
    a.x.total_cmp(&b.x)
        .then(a.y.total_cmp(&b.y))
        .then(i.cmp(&j))
        .is_lt()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pair {
    pub i: usize,
    pub j: usize,
    pub distance: f64,
    /// Signed `x_j - x_i`.
    pub horizontal_offset: f64,
    /// Signed `y_j - y_i`.
    pub vertical_offset: f64,
    /// Angle of the offset vector in `[0, 2π)`.
    pub direction: f64,
    /// `(z_i - z_j)² / 2`
    pub moment: f64,
}

impl Pair {
    pub fn new(i: usize, a: &SamplePoint, j: usize, b: &SamplePoint) -> Self {
        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let dz = a.z - b.z;

        Self {
            i,
            j,
            distance: dx.hypot(dy),
            horizontal_offset: dx,
            vertical_offset: dy,
            direction: direction(dx, dy),
            moment: dz * dz / 2.0,
        }
    }
}

/// Quadrant aware angle of `(dx, dy)`, normalized into `[0, 2π)`.
pub fn direction(dx: f64, dy: f64) -> f64 {
    if dx == 0.0 {
        return if dy >= 0.0 { FRAC_PI_2 } else { 3.0 * FRAC_PI_2 };
    }

    let angle = dy.atan2(dx);
    let angle = if angle < 0.0 { angle + TAU } else { angle };

    // a tiny negative dy can round up to exactly 2π
    if angle >= TAU {
        0.0
    } else {
        angle
    }
}

/// All retained sample pairs of one corpus, with an index over their offset vectors.
pub struct PairCatalog {
    pub pairs: Vec<Pair>,
    pub policy: PairPolicy,
    pub max_distance: f64,
    pub bounds: Aabb,
    /// Keyed by `[vertical_offset, horizontal_offset]`, payload is the pair index.
    pub offset_index: SpatialIndex<usize>,
}

impl PairCatalog {
    pub fn build(point_set: &PointSet, policy: PairPolicy) -> Self {
        let points = &point_set.points;
        let mut pairs = Vec::with_capacity(match policy {
            PairPolicy::AllOrdered => points.len() * points.len().saturating_sub(1),
            PairPolicy::Half => points.len() * points.len().saturating_sub(1) / 2,
        });
        let mut max_distance = 0f64;

        for (i, a) in points.iter().enumerate() {
            for (j, b) in points.iter().enumerate() {
                if !policy.keeps(i, a, j, b) {
                    continue;
                }
                let pair = Pair::new(i, a, j, b);
                max_distance = max_distance.max(pair.distance);
                pairs.push(pair);
            }
        }

        let offset_index = SpatialIndex::from_items(&pairs, |p| {
            [p.vertical_offset, p.horizontal_offset]
        });

        debug!(
            policy = policy.name(),
            pairs = pairs.len(),
            max_distance,
            "built pair catalog"
        );

        Self {
            pairs,
            policy,
            max_distance,
            bounds: point_set.bounds,
            offset_index,
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs whose offset lies within `radius` of `(horizontal, vertical)`.
    pub fn pairs_near_offset(&self, horizontal: f64, vertical: f64, radius: f64) -> Vec<&Pair> {
        self.offset_index
            .within_radius([vertical, horizontal], radius)
            .into_iter()
            .map(|ind| &self.pairs[ind])
            .collect()
    }
}
