use std::{fmt, time::Instant};

use log::{debug, error, info, warn};
use nalgebra::Vector3;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{
    collision, direct_summation,
    integrator::{self, Integrator},
    AlgorithmConfig, Bodies, BodyCreator, BoundingBox, BuildDiagnostics, Execution, Float,
    GravityParams, NumericalMethod, Octree, OctreeBuilder, Result, SimulationConfig, Stage,
    StageTrace,
};

/// Outcome of one step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    /// Bodies were moved by the full time step.
    Advanced,
    /// The octree could not hold every body; the previous state was kept.
    Held,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepReport {
    /// Index of this step, counting held steps.
    pub step: u64,
    pub dt: Float,
    pub status: StepStatus,
    /// Diagnostics of the last octree build of the step, [`None`] for the
    /// brute-force algorithms. Advanced steps may still carry
    /// `DEPTH_EXCEEDED` for bodies kept as overflow bodies.
    pub build: Option<BuildDiagnostics>,
    /// Whether the node arena had to be grown during the step.
    pub retried: bool,
    /// Collision contacts resolved in the step, each pair counted twice.
    pub contacts: usize,
}

/// Flat form of a [`StepReport`], one row of the diagnostic log.
#[derive(Clone, Debug, PartialEq)]
pub struct DiagnosticRecord {
    pub step: u64,
    pub dt: Float,
    pub status: StepStatus,
    pub flags: u8,
    pub failed_bodies: usize,
    pub nodes_used: usize,
    pub node_capacity: usize,
    pub max_depth_reached: u32,
    pub retried: bool,
    pub contacts: usize,
}

impl DiagnosticRecord {
    pub const CSV_HEADER: &'static str = "step,dt,status,flags,failed_bodies,nodes_used,node_capacity,max_depth_reached,retried,contacts";
}

impl From<&StepReport> for DiagnosticRecord {
    fn from(report: &StepReport) -> Self {
        let build = report.build.clone().unwrap_or_default();
        Self {
            step: report.step,
            dt: report.dt,
            status: report.status,
            flags: build.flags.bits(),
            failed_bodies: build.failed_bodies.len(),
            nodes_used: build.nodes_used,
            node_capacity: build.capacity,
            max_depth_reached: build.max_depth_reached,
            retried: report.retried,
            contacts: report.contacts,
        }
    }
}

impl fmt::Display for DiagnosticRecord {
    /// One CSV row in the column order of [`DiagnosticRecord::CSV_HEADER`].
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{:?},{},{},{},{},{},{},{}",
            self.step,
            self.dt,
            self.status,
            self.flags,
            self.failed_bodies,
            self.nodes_used,
            self.node_capacity,
            self.max_depth_reached,
            self.retried,
            self.contacts
        )
    }
}

/// Everything the force stages need for one step.
struct Forces<'a> {
    algorithm: AlgorithmConfig,
    params: GravityParams,
    max_depth: u32,
    execution: Execution,
    builder: &'a mut OctreeBuilder,
    trace: &'a mut StageTrace,
    last_build: Option<BuildDiagnostics>,
    retried: bool,
    capture: bool,
    captured: Option<Octree>,
}

impl Forces<'_> {
    /// Bounding box, build and saturation for the current positions.
    ///
    /// A node overflow is retried once with a doubled arena.
    fn octree(&mut self, bodies: &Bodies) -> std::result::Result<Octree, BuildDiagnostics> {
        let execution = self.execution;
        let root = self.trace.run(Stage::BoundingBox, || {
            BoundingBox::reduce(bodies.positions(), execution).to_cube()
        });

        let mut grown = false;
        loop {
            let start = Instant::now();
            let built = self
                .builder
                .build(bodies.positions(), root, self.max_depth, execution);
            self.trace.finish(Stage::Build, start);

            match built {
                Ok(tree) => {
                    let diagnostics = tree.diagnostics();
                    if !diagnostics.failed_bodies.is_empty() {
                        debug!(
                            "{} bodies kept as overflow bodies below depth {}",
                            diagnostics.failed_bodies.len(),
                            self.max_depth
                        );
                    }
                    self.last_build = Some(diagnostics);
                    return Ok(self
                        .trace
                        .run(Stage::Saturate, || tree.saturate(bodies, execution)));
                }
                Err(diagnostics) if diagnostics.is_recoverable() && !grown => {
                    self.builder.grow();
                    warn!(
                        "octree node arena overflowed at {} nodes, retrying with {}",
                        diagnostics.capacity,
                        self.builder.capacity()
                    );
                    grown = true;
                    self.retried = true;
                }
                Err(diagnostics) => {
                    self.last_build = Some(diagnostics.clone());
                    return Err(diagnostics);
                }
            }
        }
    }

    /// Fill `bodies.accelerations` with the configured algorithm.
    fn evaluate(&mut self, bodies: &mut Bodies) -> std::result::Result<(), BuildDiagnostics> {
        let execution = self.execution;
        let params = self.params;
        let mut accelerations = std::mem::take(&mut bodies.accelerations);

        let result = match self.algorithm {
            AlgorithmConfig::BarnesHut => self.octree(bodies).map(|octree| {
                self.trace.run(Stage::Force, || {
                    octree.accelerations(bodies, &params, execution, &mut accelerations);
                });
                if self.capture {
                    self.captured = Some(octree);
                }
            }),
            AlgorithmConfig::BruteForceGlobal => {
                self.trace.run(Stage::Force, || {
                    direct_summation::accelerations_global(
                        bodies,
                        &params,
                        execution,
                        &mut accelerations,
                    );
                });
                Ok(())
            }
            AlgorithmConfig::BruteForceLocal => {
                self.trace.run(Stage::Force, || {
                    direct_summation::accelerations_local(
                        bodies,
                        &params,
                        execution,
                        &mut accelerations,
                    );
                });
                Ok(())
            }
        };

        bodies.accelerations = accelerations;
        result
    }
}

/// The complete simulation state of one configuration.
///
/// A configuration change replaces the whole state with [`Simulation::reset`];
/// nothing is carried over from the previous generation.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    generation: u64,
    bodies: Bodies,
    snapshot: Bodies,
    builder: OctreeBuilder,
    pool: Option<ThreadPool>,
    integrator: Integrator,
    params: GravityParams,
    step_index: u64,
    elapsed: f64,
    trace: StageTrace,
    last_report: Option<StepReport>,
    capture_buffers: bool,
    last_octree: Option<Octree>,
}

impl Simulation {
    /// Create the bodies described by `config`.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let config = config.normalized();
        let bodies = BodyCreator::new(&config)?.create_bodies();
        Self::with_generation(config, bodies, 0)
    }

    /// Simulate the given bodies instead of generating them.
    ///
    /// The body generation fields of `config` are ignored.
    pub fn from_bodies(config: SimulationConfig, bodies: Bodies) -> Result<Self> {
        let mut config = config.normalized();
        config.num_bodies = bodies.len();
        config.num_massive_objects = config.num_massive_objects.min(bodies.len());
        Self::with_generation(config, bodies, 0)
    }

    fn with_generation(config: SimulationConfig, bodies: Bodies, generation: u64) -> Result<Self> {
        let pool = match config.execution {
            Execution::ThreadPool { num_threads } => Some(
                ThreadPoolBuilder::new()
                    .num_threads(num_threads)
                    .thread_name(|i| format!("octree-gravity-{i}"))
                    .build()?,
            ),
            Execution::SingleThreaded | Execution::Rayon => None,
        };

        info!(
            "generation {generation}: {} bodies, {:?} with {:?}, {:?} execution",
            bodies.len(),
            config.algorithm,
            config.numerical_method,
            config.execution
        );

        Ok(Self {
            builder: OctreeBuilder::new(bodies.len()),
            snapshot: Bodies::default(),
            integrator: Integrator::new(config.numerical_method, config.execution),
            params: GravityParams::from_config(&config),
            pool,
            bodies,
            config,
            generation,
            step_index: 0,
            elapsed: 0.,
            trace: StageTrace::default(),
            last_report: None,
            capture_buffers: false,
            last_octree: None,
        })
    }

    /// Discard the current state and start a new generation from `config`.
    pub fn reset(&mut self, config: SimulationConfig) -> Result<()> {
        let config = config.normalized();
        let bodies = BodyCreator::new(&config)?.create_bodies();
        let capture_buffers = self.capture_buffers;
        *self = Self::with_generation(config, bodies, self.generation + 1)?;
        self.capture_buffers = capture_buffers;
        Ok(())
    }

    /// Advance by a frame's wall-clock delta, clamped to the configured
    /// range and scaled by the speed multiplier.
    pub fn advance(&mut self, elapsed_secs: Float) -> StepReport {
        let dt = integrator::clamp_delta(elapsed_secs, &self.config.time_step, self.config.speed_mul);
        self.step(dt)
    }

    /// Advance by exactly `dt`.
    ///
    /// Bodies beyond the depth limit stay in the tree as overflow bodies and
    /// the step advances. If bodies are left out of the octree by node
    /// overflow, even after growing the node arena once, or by lock
    /// contention, the bodies keep their previous state and the step is
    /// reported as [`StepStatus::Held`].
    pub fn step(&mut self, dt: Float) -> StepReport {
        self.trace.clear();
        let execution = self.config.execution;
        let leapfrog = self.integrator.method() == NumericalMethod::Leapfrog;
        if leapfrog {
            self.snapshot.restore_from(&self.bodies);
        }

        let mut forces = Forces {
            algorithm: self.config.algorithm,
            params: self.params,
            max_depth: self.config.barnes_hut.max_octree_depth,
            execution,
            builder: &mut self.builder,
            trace: &mut self.trace,
            last_build: None,
            retried: false,
            capture: self.capture_buffers,
            captured: None,
        };

        let bodies = &mut self.bodies;
        let integrator = self.integrator;
        let collision = self.config.collision;
        let start = Instant::now();
        let mut step = || -> std::result::Result<usize, BuildDiagnostics> {
            integrator.step(bodies, dt, |b| forces.evaluate(b))?;
            forces.trace.finish(Stage::Integrate, start);

            let mut contacts = 0;
            if collision.enabled {
                match forces.octree(bodies) {
                    Ok(octree) => {
                        contacts = forces.trace.run(Stage::Collide, || {
                            collision::resolve(bodies, &octree, &collision, execution)
                        });
                    }
                    Err(diagnostics) => {
                        warn!("collision pass skipped: {:?}", diagnostics.flags);
                    }
                }
            }
            Ok(contacts)
        };
        let outcome = match &self.pool {
            Some(pool) => pool.install(step),
            None => step(),
        };

        self.last_octree = forces.captured;
        let report = StepReport {
            step: self.step_index,
            dt,
            status: StepStatus::Advanced,
            build: forces.last_build,
            retried: forces.retried,
            contacts: 0,
        };
        let report = match outcome {
            Ok(contacts) => {
                self.elapsed += f64::from(dt);
                StepReport { contacts, ..report }
            }
            Err(diagnostics) => {
                error!(
                    "step {} held: octree build failed with {:?} for {} bodies ({} of {} nodes used)",
                    self.step_index,
                    diagnostics.flags,
                    diagnostics.failed_bodies.len(),
                    diagnostics.nodes_used,
                    diagnostics.capacity
                );
                if leapfrog {
                    self.bodies.restore_from(&self.snapshot);
                }
                StepReport {
                    status: StepStatus::Held,
                    build: Some(diagnostics),
                    ..report
                }
            }
        };

        self.step_index += 1;
        self.last_report = Some(report.clone());
        report
    }

    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Number of resets since creation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn bodies(&self) -> &Bodies {
        &self.bodies
    }

    #[must_use]
    pub fn positions(&self) -> &[Vector3<Float>] {
        self.bodies.positions()
    }

    #[must_use]
    pub fn velocities(&self) -> &[Vector3<Float>] {
        self.bodies.velocities()
    }

    #[must_use]
    pub fn accelerations(&self) -> &[Vector3<Float>] {
        self.bodies.accelerations()
    }

    /// Write `[x, y, z, mass]` of every body into `buffer`.
    pub fn fill_render_buffer(&self, buffer: &mut Vec<[f32; 4]>) {
        buffer.clear();
        buffer.extend(
            self.bodies
                .positions()
                .iter()
                .zip(self.bodies.masses())
                .map(|(p, &m)| [p.x, p.y, p.z, m]),
        );
    }

    /// Report of the most recent step.
    #[must_use]
    pub fn last_diagnostics(&self) -> Option<&StepReport> {
        self.last_report.as_ref()
    }

    #[must_use]
    pub fn step_index(&self) -> u64 {
        self.step_index
    }

    /// Simulated time of all advanced steps.
    #[must_use]
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Stages of the most recent step in completion order.
    #[must_use]
    pub fn stage_trace(&self) -> &StageTrace {
        &self.trace
    }

    /// Keep the saturated octree of each step for [`Simulation::last_octree`].
    ///
    /// The setting survives [`Simulation::reset`].
    pub fn capture_buffers(&mut self, enabled: bool) {
        self.capture_buffers = enabled;
        if !enabled {
            self.last_octree = None;
        }
    }

    /// Octree of the last force evaluation of the most recent step, if
    /// buffer capture is enabled and the step used Barnes-Hut.
    #[must_use]
    pub fn last_octree(&self) -> Option<&Octree> {
        self.last_octree.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    use super::*;
    use crate::{barnes_hut::ROOT, BuildFlags, PositionConfig, VelocityConfig};

    fn two_bodies() -> Bodies {
        Bodies::new(
            vec![1., 1.],
            vec![Vector3::new(-1., 0., 0.), Vector3::new(1., 0., 0.)],
            vec![Vector3::zeros(); 2],
        )
    }

    fn exact_config() -> SimulationConfig {
        let mut config = SimulationConfig {
            gravitational_constant: 1.,
            algorithm: AlgorithmConfig::BarnesHut,
            ..Default::default()
        };
        config.barnes_hut.theta = 0.;
        config.barnes_hut.epsilon = 0.;
        config
    }

    #[test]
    fn two_body_euler_step() {
        let mut sim = Simulation::from_bodies(exact_config(), two_bodies()).unwrap();
        let report = sim.step(0.01);

        assert_eq!(report.status, StepStatus::Advanced);
        assert!(!report.retried);
        assert_relative_eq!(sim.accelerations()[0], Vector3::new(0.25, 0., 0.));
        assert_relative_eq!(sim.accelerations()[1], Vector3::new(-0.25, 0., 0.));
        assert_relative_eq!(sim.velocities()[0], Vector3::new(0.0025, 0., 0.));
        assert_relative_eq!(sim.velocities()[1], Vector3::new(-0.0025, 0., 0.));
        assert_relative_eq!(sim.positions()[0].x, -1. + 0.0025 * 0.01, max_relative = 1e-6);
        assert_eq!(sim.step_index(), 1);
        assert_relative_eq!(sim.elapsed(), 0.01, epsilon = 1e-9);
    }

    #[test]
    fn two_body_with_every_algorithm() {
        for algorithm in [
            AlgorithmConfig::BarnesHut,
            AlgorithmConfig::BruteForceGlobal,
            AlgorithmConfig::BruteForceLocal,
        ] {
            let config = SimulationConfig {
                algorithm,
                ..exact_config()
            };
            let mut sim = Simulation::from_bodies(config, two_bodies()).unwrap();
            sim.step(0.01);
            assert_relative_eq!(sim.velocities()[0].norm(), 0.0025);
            assert_eq!(
                sim.last_diagnostics().unwrap().build.is_some(),
                algorithm == AlgorithmConfig::BarnesHut
            );
        }
    }

    fn sphere_config(algorithm: AlgorithmConfig) -> SimulationConfig {
        let mut config = SimulationConfig {
            num_bodies: 1000,
            gravitational_constant: 1e-3,
            starting_volume_radius: 1.,
            starting_speed_mul: 0.,
            position: PositionConfig::Uniform,
            velocity: VelocityConfig::Random,
            algorithm,
            seed: 7,
            ..Default::default()
        };
        config.barnes_hut.theta = 0.5;
        config
    }

    #[test]
    fn barnes_hut_tracks_brute_force() {
        let mut bh = Simulation::new(sphere_config(AlgorithmConfig::BarnesHut)).unwrap();
        let mut bf = Simulation::new(sphere_config(AlgorithmConfig::BruteForceGlobal)).unwrap();
        assert_eq!(bh.positions(), bf.positions());
        assert!(bh.velocities().iter().all(|v| *v == Vector3::zeros()));

        for _ in 0..100 {
            assert_eq!(bh.step(0.01).status, StepStatus::Advanced);
            bf.step(0.01);
        }

        let mean_divergence = bh
            .positions()
            .iter()
            .zip(bf.positions())
            .map(|(a, b)| (a - b).norm())
            .sum::<Float>()
            / 1000.;
        // Radius of the starting sphere is 1.
        assert!(mean_divergence < 0.05, "{mean_divergence}");
    }

    #[test]
    fn zero_delta_is_clamped_to_minimum() {
        let config = SimulationConfig {
            num_bodies: 500,
            gravitational_constant: 1e-3,
            velocity: VelocityConfig::Random,
            ..Default::default()
        };
        let mut sim = Simulation::new(config).unwrap();
        let min_dt = sim.config().time_step.min;
        let before = sim.positions().to_vec();

        let report = sim.advance(0.);
        assert_eq!(report.dt, min_dt);

        for ((p0, p1), v) in before.iter().zip(sim.positions()).zip(sim.velocities()) {
            assert!(p1.iter().all(|x| x.is_finite()));
            assert!((p1 - p0).norm() <= min_dt * v.norm() * (1. + 1e-3) + 1e-6);
        }
    }

    #[test]
    fn speed_multiplier_scales_delta() {
        let config = SimulationConfig {
            num_bodies: 10,
            speed_mul: 3.,
            ..Default::default()
        };
        let mut sim = Simulation::new(config).unwrap();
        assert_relative_eq!(sim.advance(1e-3).dt, 3e-3);
        assert_relative_eq!(sim.advance(1.).dt, 3. * 5e-3);
    }

    #[test]
    fn coincident_bodies_keep_advancing() {
        for method in [NumericalMethod::Euler, NumericalMethod::Leapfrog] {
            let config = SimulationConfig {
                num_bodies: 2000,
                gravitational_constant: 1e-3,
                velocity: VelocityConfig::Random,
                algorithm: AlgorithmConfig::BarnesHut,
                numerical_method: method,
                ..Default::default()
            };
            let mut bodies = BodyCreator::new(&config).unwrap().create_bodies();
            bodies.positions[1] = bodies.positions[0];
            bodies.velocities[1] = bodies.velocities[0];
            let before = bodies.positions().to_vec();
            let mut sim = Simulation::from_bodies(config, bodies).unwrap();

            for _ in 0..50 {
                let report = sim.step(1e-3);
                assert_eq!(report.status, StepStatus::Advanced);
                let build = report.build.unwrap();
                assert_eq!(build.flags, BuildFlags::DEPTH_EXCEEDED);
                assert_eq!(build.failed_bodies.len(), 1);
            }

            let moved = before
                .iter()
                .zip(sim.positions())
                .filter(|(p0, p1)| p0 != p1)
                .count();
            assert_eq!(moved, 2000);
            assert_eq!(sim.positions()[0], sim.positions()[1]);
            assert!(sim.positions().iter().all(|p| p.iter().all(|x| x.is_finite())));
            assert_relative_eq!(sim.elapsed(), 0.05, epsilon = 1e-6);
        }
    }

    #[test]
    fn lock_contention_holds_the_step() {
        for method in [NumericalMethod::Euler, NumericalMethod::Leapfrog] {
            let config = SimulationConfig {
                numerical_method: method,
                ..exact_config()
            };
            let bodies = two_bodies();
            let mut sim = Simulation::from_bodies(config, bodies.clone()).unwrap();
            sim.builder = OctreeBuilder::new(2).with_lock_retries(4);
            // Octant of the body at (-1, 0, 0).
            sim.builder.stuck_slot = Some((ROOT, 6));

            let report = sim.step(0.01);
            assert_eq!(report.status, StepStatus::Held);
            assert!(!report.retried);
            let build = report.build.unwrap();
            assert_eq!(build.flags, BuildFlags::LOCK_CONTENTION);
            assert_eq!(build.failed_bodies, vec![0]);
            assert_eq!(sim.positions(), bodies.positions());
            assert_eq!(sim.velocities(), bodies.velocities());
            assert_eq!(sim.step_index(), 1);
            assert_eq!(sim.elapsed(), 0.);

            sim.builder.stuck_slot = None;
            assert_eq!(sim.step(0.01).status, StepStatus::Advanced);
            assert_relative_eq!(sim.elapsed(), 0.01, epsilon = 1e-9);
        }
    }

    #[test]
    fn captured_octree_matches_the_bodies() {
        let mut sim = Simulation::from_bodies(exact_config(), two_bodies()).unwrap();
        sim.step(0.01);
        assert!(sim.last_octree().is_none());

        sim.capture_buffers(true);
        sim.step(0.01);
        let octree = sim.last_octree().unwrap();
        assert_relative_eq!(octree.total_mass(), 2.);
        assert_eq!(octree.body_count(ROOT), 2);

        sim.reset(SimulationConfig {
            num_bodies: 10,
            algorithm: AlgorithmConfig::BruteForceGlobal,
            ..Default::default()
        })
        .unwrap();
        sim.step(0.01);
        assert!(sim.last_octree().is_none());

        sim.reset(SimulationConfig {
            num_bodies: 10,
            algorithm: AlgorithmConfig::BarnesHut,
            ..Default::default()
        })
        .unwrap();
        sim.step(0.01);
        assert_eq!(sim.last_octree().unwrap().body_count(ROOT), 10);
    }

    #[test]
    fn overflow_is_retried_once() {
        // One body in every octant of the root, plus one more that needs a single extra node.
        let mut positions: Vec<_> = (0..8)
            .map(|i| {
                let c = |bit: usize| if i & bit != 0 { 1. } else { -1. };
                Vector3::new(c(1), c(2), c(4))
            })
            .collect();
        positions.push(Vector3::new(-0.2, -0.2, -0.2));
        let n = positions.len();
        let bodies = Bodies::new(vec![1.; n], positions, vec![Vector3::zeros(); n]);

        let mut sim = Simulation::from_bodies(exact_config(), bodies).unwrap();
        sim.builder = OctreeBuilder::with_capacity(n, 1);
        let report = sim.step(0.01);
        assert_eq!(report.status, StepStatus::Advanced);
        assert!(report.retried);
        assert_eq!(report.build.unwrap().capacity, 2);
        assert!(sim.stage_trace().is_consistent());
    }

    #[test]
    fn repeated_overflow_holds_the_step() {
        let config = SimulationConfig {
            num_bodies: 200,
            algorithm: AlgorithmConfig::BarnesHut,
            ..Default::default()
        };
        let mut sim = Simulation::new(config).unwrap();
        let before = sim.positions().to_vec();
        sim.builder = OctreeBuilder::with_capacity(200, 1);

        let report = sim.step(0.01);
        assert_eq!(report.status, StepStatus::Held);
        assert!(report.retried);
        assert_eq!(report.build.unwrap().flags, BuildFlags::NODE_OVERFLOW);
        assert_eq!(sim.positions(), &before[..]);

        let record = DiagnosticRecord::from(sim.last_diagnostics().unwrap());
        assert_eq!(record.flags, BuildFlags::NODE_OVERFLOW.bits());
        assert_eq!(record.status, StepStatus::Held);
    }

    #[test]
    fn execution_modes_agree() {
        let run = |execution| {
            let config = SimulationConfig {
                num_bodies: 2000,
                gravitational_constant: 1e-3,
                numerical_method: NumericalMethod::Leapfrog,
                velocity: VelocityConfig::Random,
                algorithm: AlgorithmConfig::BarnesHut,
                execution,
                ..Default::default()
            };
            let mut sim = Simulation::new(config).unwrap();
            for _ in 0..5 {
                sim.step(1e-3);
            }
            sim.positions().to_vec()
        };

        let single = run(Execution::SingleThreaded);
        assert_eq!(single, run(Execution::Rayon));
        assert_eq!(single, run(Execution::ThreadPool { num_threads: 3 }));
    }

    #[test]
    fn stage_order() {
        let config = SimulationConfig {
            num_bodies: 100,
            algorithm: AlgorithmConfig::BarnesHut,
            ..Default::default()
        };
        let mut sim = Simulation::new(config.clone()).unwrap();
        sim.step(1e-3);
        assert_eq!(
            sim.stage_trace().stages().collect::<Vec<_>>(),
            vec![
                Stage::BoundingBox,
                Stage::Build,
                Stage::Saturate,
                Stage::Force,
                Stage::Integrate
            ]
        );

        let mut config = SimulationConfig {
            numerical_method: NumericalMethod::Leapfrog,
            ..config
        };
        config.collision.enabled = true;
        let mut sim = Simulation::new(config).unwrap();
        sim.step(1e-3);
        let stages: Vec<_> = sim.stage_trace().stages().collect();
        assert_eq!(stages.iter().filter(|&&s| s == Stage::Force).count(), 2);
        assert_eq!(stages[stages.len() - 5], Stage::Integrate);
        assert_eq!(stages.last(), Some(&Stage::Collide));
        assert!(sim.stage_trace().is_consistent());

        // The closing acceleration of the first step opens the second one.
        sim.step(1e-3);
        let forces = sim.stage_trace().stages().filter(|&s| s == Stage::Force).count();
        assert_eq!(forces, 1);
    }

    #[test]
    fn collisions_conserve_momentum() {
        let mut config = SimulationConfig {
            num_bodies: 3000,
            gravitational_constant: 0.,
            starting_volume_radius: 0.2,
            velocity: VelocityConfig::Random,
            ..Default::default()
        };
        config.collision.enabled = true;
        config.collision.radius = 0.01;
        let mut sim = Simulation::new(config).unwrap();
        let p0 = sim.bodies().momentum();

        let report = sim.step(1e-3);
        assert!(report.contacts > 0);
        assert_abs_diff_eq!(sim.bodies().momentum(), p0, epsilon = 1e-2);
    }

    #[test]
    fn reset_starts_a_new_generation() {
        let mut sim = Simulation::new(SimulationConfig {
            num_bodies: 100,
            numerical_method: NumericalMethod::Leapfrog,
            ..Default::default()
        })
        .unwrap();
        sim.step(1e-3);
        assert!(sim.bodies().accelerations_valid);

        sim.reset(SimulationConfig {
            num_bodies: 50,
            num_massive_objects: 80,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(sim.generation(), 1);
        assert_eq!(sim.bodies().len(), 50);
        assert_eq!(sim.config().num_massive_objects, 50);
        assert_eq!(sim.step_index(), 0);
        assert!(sim.last_diagnostics().is_none());
        assert!(!sim.bodies().accelerations_valid);
    }

    #[test]
    fn render_buffer_layout() {
        let sim = Simulation::from_bodies(exact_config(), two_bodies()).unwrap();
        let mut buffer = vec![[9.; 4]; 7];
        sim.fill_render_buffer(&mut buffer);
        assert_eq!(buffer, vec![[-1., 0., 0., 1.], [1., 0., 0., 1.]]);
    }

    #[test]
    fn empty_simulation_steps() {
        let mut sim = Simulation::new(SimulationConfig {
            num_bodies: 0,
            ..Default::default()
        })
        .unwrap();
        let report = sim.step(1e-3);
        assert_eq!(report.status, StepStatus::Advanced);
        assert!(sim.positions().is_empty());
    }

    #[test]
    fn diagnostic_record_row() {
        let report = StepReport {
            step: 3,
            dt: 0.5,
            status: StepStatus::Advanced,
            build: None,
            retried: false,
            contacts: 2,
        };
        let record = DiagnosticRecord::from(&report);
        assert_eq!(record.to_string(), "3,0.5,Advanced,0,0,0,0,0,false,2");
        assert_eq!(
            DiagnosticRecord::CSV_HEADER.split(',').count(),
            record.to_string().split(',').count()
        );
    }
}
