use nalgebra::Vector3;

use crate::{config::SimulationConfig, Float};

/// Parameters of the softened Newtonian force law and the opening angle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GravityParams {
    pub g: Float,
    /// Softening length.
    pub epsilon: Float,
    pub theta: Float,
}

impl GravityParams {
    #[must_use]
    pub fn new(g: Float, epsilon: Float, theta: Float) -> Self {
        Self { g, epsilon, theta }
    }

    #[must_use]
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(
            config.gravitational_constant,
            config.barnes_hut.epsilon,
            config.barnes_hut.theta,
        )
    }

    #[inline]
    #[must_use]
    pub fn epsilon_squared(&self) -> Float {
        self.epsilon * self.epsilon
    }
}

/// Acceleration of a body at `position1` caused by a point mass `mass2` at `position2`.
///
/// `a = G m r / (|r|^2 + epsilon^2)^(3/2)`. Coincident points without
/// softening contribute nothing instead of producing NaN.
#[inline]
#[must_use]
pub fn acceleration(
    position1: Vector3<Float>,
    mass2: Float,
    position2: Vector3<Float>,
    g: Float,
    epsilon_squared: Float,
) -> Vector3<Float> {
    let r = position2 - position1;
    let r_square = r.norm_squared() + epsilon_squared;
    if r_square == 0. {
        return Vector3::zeros();
    }
    r * (g * mass2 / (r_square * r_square.sqrt()))
}
