//! Real-time gravitational N-body simulation.
//!
//! Forces are approximated with a Barnes-Hut octree that is rebuilt every step
//! by many cooperating workers without locks:
//!
//! 1. [`BoundingBox`] reduces all positions to a cubic root cell in two stages.
//! 2. [`OctreeBuilder`] inserts every body concurrently using compare-and-swap on
//!    shared child slots and an atomic node allocation counter.
//! 3. The built tree is saturated bottom-up with aggregate masses and centers of mass.
//! 4. Accelerations are evaluated per body with an explicit-stack traversal
//!    gated by the opening angle `theta`.
//! 5. Bodies are advanced with Euler or Leapfrog integration, optionally
//!    followed by a collision pass.
//!
//! [`Simulation`] owns all state and drives these stages for each step.

pub mod barnes_hut;
pub mod collision;
pub mod config;
pub mod csv;
pub mod direct_summation;
pub mod error;
pub mod gravity;
pub mod integrator;
pub mod particles;
pub mod pipeline;
pub mod simulation;

pub use barnes_hut::{
    BoundingBox, BuildDiagnostics, BuildFlags, BuiltOctree, NodeRef, Octree, OctreeBuilder,
    RootCell,
};
pub use config::{
    AlgorithmConfig, BarnesHutConfig, CollisionConfig, NormalDistribution, NumericalMethod,
    PositionConfig, SimulationConfig, TimeStepConfig, VelocityConfig,
};
pub use error::SimulationError;
pub use gravity::GravityParams;
pub use particles::{Bodies, BodyCreator};
pub use pipeline::{Stage, StageTrace};
pub use simulation::{DiagnosticRecord, Simulation, StepReport, StepStatus};

use serde::{Deserialize, Serialize};

/// Scalar type of all body and node buffers.
pub type Float = f32;

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimulationError>;

/// How the data-parallel stages are executed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Execution {
    /// Every stage runs on the calling thread, one lane after another.
    SingleThreaded,
    /// Lanes are distributed over the global Rayon pool.
    #[default]
    Rayon,
    /// Lanes are distributed over a dedicated pool with `num_threads` workers.
    ThreadPool { num_threads: usize },
}

impl Execution {
    #[must_use]
    pub fn is_parallel(self) -> bool {
        !matches!(self, Execution::SingleThreaded)
    }
}
