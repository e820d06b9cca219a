use nalgebra::Vector3;
use rayon::prelude::*;

use crate::{Execution, Float};

/// Number of partial results produced by the first reduction stage.
pub const REDUCTION_GROUPS: usize = 64;

/// Relative padding added around the bodies so none of them sits exactly on
/// the boundary of the root cell.
const MARGIN: Float = 1e-3;

/// Axis-aligned bounding box of all bodies.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vector3<Float>,
    pub max: Vector3<Float>,
}

/// The cubic cell covered by the root node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RootCell {
    pub center: Vector3<Float>,
    /// Half of the side length.
    pub half_width: Float,
}

impl Default for BoundingBox {
    /// The unit cube centered at the origin.
    fn default() -> Self {
        Self {
            min: Vector3::repeat(-0.5),
            max: Vector3::repeat(0.5),
        }
    }
}

impl BoundingBox {
    fn empty() -> Self {
        Self {
            min: Vector3::repeat(Float::INFINITY),
            max: Vector3::repeat(Float::NEG_INFINITY),
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            min: self.min.inf(&other.min),
            max: self.max.sup(&other.max),
        }
    }

    /// Bounds of the finite positions in `positions`.
    ///
    /// `inf` and `sup` silently drop NaN coordinates, so non-finite
    /// positions are skipped before they reach the comparison.
    fn of_slice(positions: &[Vector3<Float>]) -> Self {
        positions
            .iter()
            .filter(|p| p.iter().all(|x| x.is_finite()))
            .fold(Self::empty(), |acc, p| Self {
                min: acc.min.inf(p),
                max: acc.max.sup(p),
            })
    }

    fn is_empty(&self) -> bool {
        self.min.iter().zip(self.max.iter()).any(|(lo, hi)| lo > hi)
    }

    /// Bounding box of `positions`, reduced in two stages.
    ///
    /// The first stage splits the positions into [`REDUCTION_GROUPS`] groups
    /// that are reduced independently; the second stage reduces the partial
    /// boxes to one. Non-finite positions are ignored; if no finite position
    /// remains, or the slice is empty, the result is [`BoundingBox::default`].
    #[must_use]
    pub fn reduce(positions: &[Vector3<Float>], execution: Execution) -> Self {
        if positions.is_empty() {
            return Self::default();
        }

        let group_size = positions.len().div_ceil(REDUCTION_GROUPS);
        let partials: Vec<Self> = if execution.is_parallel() {
            positions
                .par_chunks(group_size)
                .map(Self::of_slice)
                .collect()
        } else {
            positions.chunks(group_size).map(Self::of_slice).collect()
        };

        let reduced = partials
            .into_iter()
            .fold(Self::empty(), |acc, partial| acc.merge(partial));

        if reduced.is_empty() {
            Self::default()
        } else {
            reduced
        }
    }

    /// Smallest cube containing the box, padded by a small margin.
    #[must_use]
    pub fn to_cube(&self) -> RootCell {
        let center = (self.min + self.max) / 2.;
        let extent = (self.max - self.min).max();
        let half_width = extent / 2. * (1. + MARGIN) + Float::EPSILON * (1. + center.amax());

        RootCell { center, half_width }
    }
}

impl RootCell {
    #[must_use]
    pub fn contains(&self, position: &Vector3<Float>) -> bool {
        (position - self.center).amax() <= self.half_width
    }
}
