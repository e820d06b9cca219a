//! Operator-facing simulation configuration.
//!
//! Every field is a tunable knob, so invalid values are clamped by
//! [`SimulationConfig::normalized`] instead of being rejected.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{Execution, Float, Result};

/// Upper bound on the body count so that body and node indices both fit the
/// 32 bit slot encoding with room for the node arena.
pub const MAX_BODIES: usize = 1 << 28;

/// Largest accepted `max_octree_depth`.
pub const MAX_OCTREE_DEPTH: u32 = 64;

/// Sampled masses are clamped to at least this value.
pub const MIN_MASS: Float = 1e-6;

/// Initial position distribution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionConfig {
    /// Uniformly distributed inside a ball of the starting radius.
    #[default]
    Uniform,
    /// Evenly spread over the surface of a sphere using a Fibonacci lattice.
    Sphere,
}

/// Initial velocity distribution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VelocityConfig {
    /// Uniformly random direction and magnitude inside the unit ball.
    Random,
    /// Pointing away from the origin.
    RadialOut,
    /// Pointing towards the origin.
    RadialIn,
    /// Random, but scaled down to be negligible.
    #[default]
    ApproxZero,
    /// Tangential to circles around the y axis, i.e. rotation in the xz plane.
    TangentialXZ,
}

/// Force evaluation algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgorithmConfig {
    BarnesHut,
    /// Every body against every other body.
    #[default]
    BruteForceGlobal,
    /// Every body against every other body, streaming sources in cached tiles.
    BruteForceLocal,
}

/// Time integration scheme.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumericalMethod {
    #[default]
    Euler,
    Leapfrog,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalDistribution {
    pub mean: Float,
    pub deviation: Float,
}

impl Default for NormalDistribution {
    fn default() -> Self {
        Self {
            mean: 0.5,
            deviation: 0.25,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarnesHutConfig {
    /// Deepest level a node may be created at; the root is level 0.
    pub max_octree_depth: u32,
    /// Opening angle. A cell of side `s` at distance `d` is used as a single
    /// point mass if `s / d < theta`.
    pub theta: Float,
    /// Softening length.
    pub epsilon: Float,
}

impl Default for BarnesHutConfig {
    fn default() -> Self {
        Self {
            max_octree_depth: 32,
            theta: 1.5,
            epsilon: 0.01,
        }
    }
}

/// Range that the per-frame delta time is clamped to, before scaling.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeStepConfig {
    pub min: Float,
    pub max: Float,
}

impl Default for TimeStepConfig {
    fn default() -> Self {
        Self {
            min: 1e-4,
            max: 5e-3,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    pub enabled: bool,
    /// Radius of every body for contact detection.
    pub radius: Float,
    /// Coefficient of restitution, 0 is perfectly inelastic and 1 is elastic.
    pub restitution: Float,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            radius: 0.01,
            restitution: 0.5,
        }
    }
}

/// Everything needed to (re)initialize a [`Simulation`](crate::Simulation).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub num_bodies: usize,
    pub gravitational_constant: Float,
    pub starting_speed_mul: Float,
    pub starting_volume_radius: Float,
    pub num_massive_objects: usize,
    pub massive_object_mass: Float,
    pub mass_distribution: NormalDistribution,
    pub position: PositionConfig,
    pub velocity: VelocityConfig,
    pub algorithm: AlgorithmConfig,
    pub numerical_method: NumericalMethod,
    pub barnes_hut: BarnesHutConfig,
    pub collision: CollisionConfig,
    pub time_step: TimeStepConfig,
    /// How much faster than wall-clock time the simulation runs.
    pub speed_mul: Float,
    pub seed: u64,
    pub execution: Execution,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            num_bodies: 20_000,
            gravitational_constant: 6.67e-11,
            starting_speed_mul: 1.,
            starting_volume_radius: 1.5,
            num_massive_objects: 0,
            massive_object_mass: 1.,
            mass_distribution: NormalDistribution::default(),
            position: PositionConfig::default(),
            velocity: VelocityConfig::default(),
            algorithm: AlgorithmConfig::default(),
            numerical_method: NumericalMethod::default(),
            barnes_hut: BarnesHutConfig::default(),
            collision: CollisionConfig::default(),
            time_step: TimeStepConfig::default(),
            speed_mul: 1.,
            seed: 42,
            execution: Execution::default(),
        }
    }
}

fn non_negative(value: Float, fallback: Float) -> Float {
    if value.is_finite() {
        value.max(0.)
    } else {
        fallback
    }
}

impl SimulationConfig {
    /// Read a JSON configuration. Missing fields take their default values.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        Ok(config.normalized())
    }

    /// Clamp every field into its valid range.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();

        self.num_bodies = self.num_bodies.min(MAX_BODIES);
        self.num_massive_objects = self.num_massive_objects.min(self.num_bodies);

        self.gravitational_constant =
            non_negative(self.gravitational_constant, defaults.gravitational_constant);
        self.starting_speed_mul = non_negative(self.starting_speed_mul, 0.);
        self.starting_volume_radius = non_negative(
            self.starting_volume_radius,
            defaults.starting_volume_radius,
        );
        self.massive_object_mass = non_negative(self.massive_object_mass, MIN_MASS).max(MIN_MASS);

        let mass = &mut self.mass_distribution;
        if !mass.mean.is_finite() {
            mass.mean = defaults.mass_distribution.mean;
        }
        mass.deviation = if mass.deviation.is_finite() {
            mass.deviation.abs()
        } else {
            0.
        };

        let bh = &mut self.barnes_hut;
        bh.max_octree_depth = bh.max_octree_depth.clamp(1, MAX_OCTREE_DEPTH);
        bh.theta = non_negative(bh.theta, defaults.barnes_hut.theta);
        bh.epsilon = non_negative(bh.epsilon, defaults.barnes_hut.epsilon);

        let collision = &mut self.collision;
        collision.radius = non_negative(collision.radius, defaults.collision.radius);
        collision.restitution = non_negative(collision.restitution, 0.).min(1.);

        let ts = &mut self.time_step;
        ts.min = non_negative(ts.min, defaults.time_step.min);
        ts.max = non_negative(ts.max, defaults.time_step.max).max(ts.min);

        self.speed_mul = non_negative(self.speed_mul, 0.);

        if let Execution::ThreadPool { num_threads } = &mut self.execution {
            *num_threads = (*num_threads).max(1);
        }

        self
    }
}
