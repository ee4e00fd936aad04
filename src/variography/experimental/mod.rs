use std::f64::consts::{SQRT_2, TAU};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{KrigingError, Result};
use crate::variography::pairs::{Pair, PairCatalog, PairPolicy};

/// Aggregate of the pairs that fell into one lag (or lag cell).
///
/// `value` is `None` for a bin nothing contributed to; such bins carry zero weight.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bin {
    pub mean_distance: f64,
    pub mean_horizontal_offset: f64,
    pub mean_vertical_offset: f64,
    pub value: Option<f64>,
    pub weight: f64,
    pub count: usize,
}

impl Bin {
    pub fn empty() -> Self {
        Self {
            mean_distance: 0.0,
            mean_horizontal_offset: 0.0,
            mean_vertical_offset: 0.0,
            value: None,
            weight: 0.0,
            count: 0,
        }
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// Same bin seen from the opposite side of the origin.
    fn mirrored(&self) -> Self {
        Self {
            mean_horizontal_offset: -self.mean_horizontal_offset,
            mean_vertical_offset: -self.mean_vertical_offset,
            ..*self
        }
    }
}

#[derive(Default)]
struct Accumulator {
    distance: f64,
    horizontal: f64,
    vertical: f64,
    moment: f64,
    weight: f64,
    count: usize,
}

impl Accumulator {
    #[inline(always)]
    fn add(&mut self, pair: &Pair, weight: f64) {
        self.distance += pair.distance;
        self.horizontal += pair.horizontal_offset;
        self.vertical += pair.vertical_offset;
        self.moment += pair.moment * weight;
        self.weight += weight;
        self.count += 1;
    }

    fn finish(self) -> Bin {
        if self.count == 0 || self.weight <= 0.0 {
            return Bin {
                count: self.count,
                ..Bin::empty()
            };
        }
        let n = self.count as f64;
        Bin {
            mean_distance: self.distance / n,
            mean_horizontal_offset: self.horizontal / n,
            mean_vertical_offset: self.vertical / n,
            value: Some(self.moment / self.weight),
            weight: self.weight,
            count: self.count,
        }
    }
}

/// How pairs are grouped into bins.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum BinningMode {
    /// Lags over all directions.
    Isotropic,
    /// Lags restricted to one direction sector.
    ///
    /// `angle` and `tolerance` are in radians, `bandwidth` is the maximum
    /// perpendicular distance from the sector centerline.
    Anisotropic {
        angle: f64,
        tolerance: f64,
        bandwidth: f64,
    },
    /// 2D grid of lag cells over offset space.
    Map,
}

impl BinningMode {
    /// The pairing policy a catalog must be built with for this mode.
    pub fn pair_policy(&self) -> PairPolicy {
        match self {
            BinningMode::Isotropic | BinningMode::Anisotropic { .. } => PairPolicy::AllOrdered,
            BinningMode::Map => PairPolicy::Half,
        }
    }
}

/// Lag binned semivariance along one axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalVariogram {
    pub lag_size: f64,
    pub bins: Vec<Bin>,
}

impl ExperimentalVariogram {
    /// Upper end of the binned distance range.
    pub fn range(&self) -> f64 {
        self.lag_size * self.bins.len() as f64
    }

    pub fn non_empty(&self) -> impl Iterator<Item = &Bin> {
        self.bins.iter().filter(|b| !b.is_empty())
    }

    pub fn empty_count(&self) -> usize {
        self.bins.iter().filter(|b| b.is_empty()).count()
    }
}

/// Semivariogram surface over offset space.
///
/// Row index follows the vertical offset and column index the horizontal
/// offset, both increasing; cell `(r, c)` is centred at
/// `((c - n + 0.5) * lag, (r - n + 0.5) * lag)` for `n` lags per half axis.
#[derive(Clone, Debug, PartialEq)]
pub struct VariogramSurface {
    pub lag_size: f64,
    pub n_lags: usize,
    pub bins: Array2<Bin>,
}

impl VariogramSurface {
    /// `(horizontal, vertical)` offset at the centre of cell `(row, col)`.
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        let n = self.n_lags as f64;
        (
            (col as f64 - n + 0.5) * self.lag_size,
            (row as f64 - n + 0.5) * self.lag_size,
        )
    }

    pub fn values(&self) -> Array2<Option<f64>> {
        self.bins.map(|b| b.value)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BinnedVariogram {
    Lags(ExperimentalVariogram),
    Surface(VariogramSurface),
}

/// Aggregate `catalog` into `n_lags` bins of width `lag_size` according to `mode`.
///
/// Sector modes produce one lag axis covering `[0, lag_size * n_lags)`; map mode
/// produces a `2n × 2n` surface.
pub fn bin_pairs(
    catalog: &PairCatalog,
    lag_size: f64,
    n_lags: usize,
    mode: &BinningMode,
) -> Result<BinnedVariogram> {
    if !(lag_size > 0.0 && lag_size.is_finite()) {
        return Err(KrigingError::invalid("lag_size", lag_size, "must be positive and finite"));
    }
    if n_lags == 0 {
        return Err(KrigingError::invalid("number_of_lags", n_lags, "must be at least 1"));
    }
    if catalog.policy != mode.pair_policy() {
        return Err(KrigingError::PairPolicyMismatch {
            expected: mode.pair_policy().name(),
            found: catalog.policy.name(),
        });
    }

    let binned = match *mode {
        BinningMode::Isotropic => BinnedVariogram::Lags(sector_bins(
            catalog,
            lag_size,
            n_lags,
            |pair| pair.horizontal_offset >= 0.0,
        )),
        BinningMode::Anisotropic {
            angle,
            tolerance,
            bandwidth,
        } => {
            if !(tolerance >= 0.0) {
                return Err(KrigingError::invalid("tolerance", tolerance, "must be non-negative"));
            }
            if !(bandwidth >= 0.0) {
                return Err(KrigingError::invalid("bandwidth", bandwidth, "must be non-negative"));
            }
            let angle = angle.rem_euclid(TAU);
            BinnedVariogram::Lags(sector_bins(catalog, lag_size, n_lags, |pair| {
                in_sector(angle, tolerance, pair.direction)
                    && (pair.distance * (angle - pair.direction).sin()).abs() <= bandwidth
            }))
        }
        BinningMode::Map => BinnedVariogram::Surface(map_bins(catalog, lag_size, n_lags)),
    };

    Ok(binned)
}

/// Whether `direction` lies within `tolerance` of `angle`, wrapping at 2π.
#[inline(always)]
fn in_sector(angle: f64, tolerance: f64, direction: f64) -> bool {
    let diff = (direction - angle).rem_euclid(TAU);
    diff <= tolerance || TAU - diff <= tolerance
}

fn sector_bins<F>(catalog: &PairCatalog, lag_size: f64, n_lags: usize, keep: F) -> ExperimentalVariogram
where
    F: Fn(&Pair) -> bool,
{
    let range = lag_size * n_lags as f64;
    let mut acc = (0..n_lags).map(|_| Accumulator::default()).collect::<Vec<_>>();

    for pair in catalog.pairs.iter() {
        if pair.distance >= range || !keep(pair) {
            continue;
        }
        let ind = ((pair.distance / lag_size).floor() as usize).min(n_lags - 1);
        acc[ind].add(pair, 1.0);
    }

    let variogram = ExperimentalVariogram {
        lag_size,
        bins: acc.into_iter().map(Accumulator::finish).collect(),
    };

    debug!(
        lags = n_lags,
        empty = variogram.empty_count(),
        "binned pairs into lags"
    );

    variogram
}

fn map_bins(catalog: &PairCatalog, lag_size: f64, n_lags: usize) -> VariogramSurface {
    let side = 2 * n_lags;
    let radius = lag_size * SQRT_2;
    let mut surface = VariogramSurface {
        lag_size,
        n_lags,
        bins: Array2::from_elem((side, side), Bin::empty()),
    };

    // half pairs all have horizontal offset >= 0, so fill the right half directly
    for row in 0..side {
        for col in n_lags..side {
            let (h, v) = surface.cell_center(row, col);
            let mut acc = Accumulator::default();

            for pair in catalog.pairs_near_offset(h, v, radius) {
                let dh = (h - pair.horizontal_offset).abs();
                let dv = (v - pair.vertical_offset).abs();
                if dh > lag_size || dv > lag_size {
                    continue;
                }
                let w = (1.0 - dh / lag_size).max(0.0) * (1.0 - dv / lag_size).max(0.0);
                acc.add(pair, w);
            }

            surface.bins[[row, col]] = acc.finish();
        }
    }

    // and the left half by point reflection through the origin
    for row in 0..side {
        for col in 0..n_lags {
            surface.bins[[row, col]] = surface.bins[[side - 1 - row, side - 1 - col]].mirrored();
        }
    }

    surface
}
