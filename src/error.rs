//! Error types for simulation setup and I/O.

use thiserror::Error;

/// Errors that abort a simulation run.
///
/// Tree-build failures are not represented here. They are reported through
/// [`StepReport`](crate::StepReport) and the simulation keeps its last valid
/// state.
#[derive(Error, Debug)]
pub enum SimulationError {
    /// The worker pool for the requested [`Execution`](crate::Execution) could not be created.
    #[error("failed to create worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// The configured mass distribution cannot be sampled.
    #[error("invalid mass distribution: {0}")]
    MassDistribution(#[from] rand_distr::NormalError),

    /// Reading a configuration or writing an output file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file could not be parsed.
    #[error("invalid configuration file: {0}")]
    Config(#[from] serde_json::Error),
}
