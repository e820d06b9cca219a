mod creator;

pub use creator::*;

use nalgebra::Vector3;

use crate::Float;

/// The body store.
///
/// This struct is used to utilize the Struct-of-Arrays (SOA) architecture.
/// Body indices are stable for the lifetime of a store; a configuration
/// change replaces the whole store.
#[derive(Clone, Debug, Default)]
pub struct Bodies {
    pub(crate) masses: Vec<Float>,
    pub(crate) positions: Vec<Vector3<Float>>,
    pub(crate) velocities: Vec<Vector3<Float>>,
    pub(crate) accelerations: Vec<Vector3<Float>>,
    /// Whether `accelerations` belong to the current positions.
    pub(crate) accelerations_valid: bool,
}

impl Bodies {
    #[must_use]
    pub fn new(
        masses: Vec<Float>,
        positions: Vec<Vector3<Float>>,
        velocities: Vec<Vector3<Float>>,
    ) -> Self {
        let len = masses.len();
        assert_eq!(len, positions.len());
        assert_eq!(len, velocities.len());

        Self {
            masses,
            positions,
            velocities,
            accelerations: vec![Vector3::zeros(); len],
            accelerations_valid: false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.masses.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masses.is_empty()
    }

    #[must_use]
    pub fn masses(&self) -> &[Float] {
        &self.masses
    }

    #[must_use]
    pub fn positions(&self) -> &[Vector3<Float>] {
        &self.positions
    }

    #[must_use]
    pub fn velocities(&self) -> &[Vector3<Float>] {
        &self.velocities
    }

    #[must_use]
    pub fn accelerations(&self) -> &[Vector3<Float>] {
        &self.accelerations
    }

    #[must_use]
    pub fn total_mass(&self) -> Float {
        self.masses.iter().sum()
    }

    /// Overwrite `self` with `other`, reusing the existing allocations.
    pub(crate) fn restore_from(&mut self, other: &Bodies) {
        self.masses.clone_from(&other.masses);
        self.positions.clone_from(&other.positions);
        self.velocities.clone_from(&other.velocities);
        self.accelerations.clone_from(&other.accelerations);
        self.accelerations_valid = other.accelerations_valid;
    }

    /// Total linear momentum.
    #[must_use]
    pub fn momentum(&self) -> Vector3<Float> {
        self.masses
            .iter()
            .zip(&self.velocities)
            .fold(Vector3::zeros(), |acc, (&m, v)| acc + v * m)
    }
}

impl FromIterator<(Float, Vector3<Float>, Vector3<Float>)> for Bodies {
    fn from_iter<T: IntoIterator<Item = (Float, Vector3<Float>, Vector3<Float>)>>(
        iter: T,
    ) -> Self {
        let iter = iter.into_iter();
        let cap = iter.size_hint().0;
        let mut masses = Vec::with_capacity(cap);
        let mut positions = Vec::with_capacity(cap);
        let mut velocities = Vec::with_capacity(cap);

        for (m, p, v) in iter {
            masses.push(m);
            positions.push(p);
            velocities.push(v);
        }

        let len = masses.len();
        Self {
            masses,
            positions,
            velocities,
            accelerations: vec![Vector3::zeros(); len],
            accelerations_valid: false,
        }
    }
}
