use nalgebra::Vector3;
use rand::{rngs::StdRng, seq::index, SeedableRng};
use rand_distr::{Distribution, Normal, UnitBall};

use crate::{
    config::{PositionConfig, SimulationConfig, VelocityConfig, MIN_MASS},
    Bodies, Float, Result,
};

/// Velocities of [`VelocityConfig::ApproxZero`] are scaled down by this factor.
const APPROX_ZERO_SCALE: Float = 1e-3;

pub trait ParticleCreator {
    /// Create the mass, position and velocity of body `index`.
    fn create_particle(&mut self, index: usize) -> (Float, Vector3<Float>, Vector3<Float>);

    fn create_particles(&mut self, n: usize) -> Bodies {
        (0..n).map(|i| self.create_particle(i)).collect()
    }
}

/// Creates the initial bodies described by a [`SimulationConfig`].
///
/// All randomness comes from a [`StdRng`] seeded with [`SimulationConfig::seed`],
/// so the same configuration always produces the same bodies.
#[derive(Clone, Debug)]
pub struct BodyCreator {
    rng: StdRng,
    mass_distr: Normal<Float>,
    massive: Vec<bool>,
    massive_mass: Float,
    count: usize,
    radius: Float,
    speed: Float,
    position: PositionConfig,
    velocity: VelocityConfig,
}

impl BodyCreator {
    pub fn new(config: &SimulationConfig) -> Result<Self> {
        let config = config.clone().normalized();
        let mut rng = StdRng::seed_from_u64(config.seed);

        let mass_distr = Normal::new(
            config.mass_distribution.mean,
            config.mass_distribution.deviation,
        )?;

        let mut massive = vec![false; config.num_bodies];
        for i in index::sample(&mut rng, config.num_bodies, config.num_massive_objects).iter() {
            massive[i] = true;
        }

        Ok(Self {
            rng,
            mass_distr,
            massive,
            massive_mass: config.massive_object_mass,
            count: config.num_bodies,
            radius: config.starting_volume_radius,
            speed: config.starting_speed_mul,
            position: config.position,
            velocity: config.velocity,
        })
    }

    /// Create all bodies of the configuration.
    pub fn create_bodies(&mut self) -> Bodies {
        self.create_particles(self.count)
    }

    fn unit_ball(&mut self) -> Vector3<Float> {
        let [x, y, z]: [Float; 3] = UnitBall.sample(&mut self.rng);
        Vector3::new(x, y, z)
    }

    /// Point `index` of a Fibonacci lattice with `self.count` points on the unit sphere.
    fn fibonacci_point(&self, index: usize) -> Vector3<Float> {
        let golden_angle = std::f32::consts::PI * (3. - (5 as Float).sqrt());
        let n = self.count.max(1) as Float;

        let y = 1. - 2. * (index as Float + 0.5) / n;
        let ring = (1. - y * y).max(0.).sqrt();
        let phi = golden_angle * index as Float;

        Vector3::new(ring * phi.cos(), y, ring * phi.sin())
    }

    fn velocity_for(&mut self, position: &Vector3<Float>) -> Vector3<Float> {
        let direction = match self.velocity {
            VelocityConfig::Random => self.unit_ball(),
            VelocityConfig::ApproxZero => self.unit_ball() * APPROX_ZERO_SCALE,
            VelocityConfig::RadialOut => position.try_normalize(0.).unwrap_or_else(Vector3::zeros),
            VelocityConfig::RadialIn => -position.try_normalize(0.).unwrap_or_else(Vector3::zeros),
            VelocityConfig::TangentialXZ => Vector3::new(-position.z, 0., position.x)
                .try_normalize(0.)
                .unwrap_or_else(Vector3::zeros),
        };
        direction * self.speed
    }
}

impl ParticleCreator for BodyCreator {
    fn create_particle(&mut self, index: usize) -> (Float, Vector3<Float>, Vector3<Float>) {
        let sampled = self.mass_distr.sample(&mut self.rng);
        let mass = if self.massive.get(index).copied().unwrap_or(false) {
            self.massive_mass
        } else {
            sampled.max(MIN_MASS)
        };

        let pos = match self.position {
            PositionConfig::Uniform => self.unit_ball() * self.radius,
            PositionConfig::Sphere => self.fibonacci_point(index) * self.radius,
        };
        let vel = self.velocity_for(&pos);

        (mass, pos, vel)
    }
}
