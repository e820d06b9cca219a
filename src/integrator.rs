use nalgebra::Vector3;
use rayon::prelude::*;

use crate::{
    config::{NumericalMethod, TimeStepConfig},
    Bodies, Execution, Float,
};

/// Clamp a frame's wall-clock delta into `time_step` and scale it by `speed_mul`.
///
/// Non-finite deltas are treated like a zero delta.
#[must_use]
pub fn clamp_delta(elapsed: Float, time_step: &TimeStepConfig, speed_mul: Float) -> Float {
    let elapsed = if elapsed.is_finite() { elapsed } else { 0. };
    elapsed.clamp(time_step.min, time_step.max) * speed_mul
}

/// `v += a * dt`
pub fn kick(bodies: &mut Bodies, dt: Float, execution: Execution) {
    let accelerations = &bodies.accelerations;
    match execution {
        Execution::SingleThreaded => {
            for (v, a) in bodies.velocities.iter_mut().zip(accelerations) {
                *v += a * dt;
            }
        }
        Execution::Rayon | Execution::ThreadPool { .. } => {
            bodies
                .velocities
                .par_iter_mut()
                .zip(accelerations)
                .for_each(|(v, a)| *v += a * dt);
        }
    }
}

/// `p += v * dt`
pub fn drift(bodies: &mut Bodies, dt: Float, execution: Execution) {
    let velocities = &bodies.velocities;
    match execution {
        Execution::SingleThreaded => {
            for (p, v) in bodies.positions.iter_mut().zip(velocities) {
                *p += v * dt;
            }
        }
        Execution::Rayon | Execution::ThreadPool { .. } => {
            bodies
                .positions
                .par_iter_mut()
                .zip(velocities)
                .for_each(|(p, v)| *p += v * dt);
        }
    }
    bodies.accelerations_valid = false;
}

/// Advances the body store by one time step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Integrator {
    method: NumericalMethod,
    execution: Execution,
}

impl Integrator {
    #[must_use]
    pub fn new(method: NumericalMethod, execution: Execution) -> Self {
        Self { method, execution }
    }

    #[must_use]
    pub fn method(&self) -> NumericalMethod {
        self.method
    }

    /// Advance `bodies` by `dt`.
    ///
    /// `accelerate` must fill `bodies.accelerations` for the current
    /// positions. If it fails the error is returned immediately and `bodies`
    /// may be partially advanced; the caller is responsible for restoring it.
    ///
    /// Euler: `v += a dt; p += v dt`.
    ///
    /// Leapfrog: `v += a dt/2; p += v dt; recompute a; v += a dt/2`. The
    /// closing acceleration is kept and reused as the opening acceleration of
    /// the next step as long as the positions are unchanged.
    pub fn step<E>(
        &self,
        bodies: &mut Bodies,
        dt: Float,
        mut accelerate: impl FnMut(&mut Bodies) -> Result<(), E>,
    ) -> Result<(), E> {
        match self.method {
            NumericalMethod::Euler => {
                accelerate(bodies)?;
                kick(bodies, dt, self.execution);
                drift(bodies, dt, self.execution);
            }
            NumericalMethod::Leapfrog => {
                if !bodies.accelerations_valid {
                    accelerate(bodies)?;
                }
                kick(bodies, dt / 2., self.execution);
                drift(bodies, dt, self.execution);
                accelerate(bodies)?;
                bodies.accelerations_valid = true;
                kick(bodies, dt / 2., self.execution);
            }
        }
        Ok(())
    }
}

/// Total kinetic energy, used to check that integration stays bounded.
#[must_use]
pub fn kinetic_energy(bodies: &Bodies) -> Float {
    bodies
        .masses
        .iter()
        .zip(&bodies.velocities)
        .map(|(&m, v)| 0.5 * m * v.norm_squared())
        .sum()
}
