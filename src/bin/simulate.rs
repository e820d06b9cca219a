use std::{fs, path::PathBuf, time::Instant};

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use log::info;
use octree_gravity::{
    csv, AlgorithmConfig, DiagnosticRecord, Execution, NumericalMethod, Simulation,
    SimulationConfig, StepStatus,
};

/// Run a gravitational N-body simulation without a window.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// JSON configuration; missing fields take their default values.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of steps to run.
    #[arg(short = 'n', long, default_value_t = 100)]
    steps: u64,

    /// Fixed frame delta in seconds. Without it the measured wall-clock time
    /// of the previous step is used.
    #[arg(long)]
    frame_delta: Option<f32>,

    /// Override the body count of the configuration.
    #[arg(short, long)]
    bodies: Option<usize>,

    #[arg(long, value_enum)]
    algorithm: Option<Algorithm>,

    #[arg(long, value_enum)]
    method: Option<Method>,

    /// Worker threads; 0 runs single-threaded.
    #[arg(short, long)]
    threads: Option<usize>,

    /// Where to write the final bodies.
    #[arg(short, long, default_value = "bodies.csv")]
    output: PathBuf,

    /// Also write one diagnostic record per step.
    #[arg(long)]
    diagnostics: Option<PathBuf>,

    /// Write the octree buffers and flagged bodies of every step into this directory.
    #[arg(long, value_name = "DIR")]
    dump_buffers: Option<PathBuf>,

    /// Log progress every this many steps.
    #[arg(long, default_value_t = 10)]
    progress: u64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Algorithm {
    BarnesHut,
    Global,
    Local,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Method {
    Euler,
    Leapfrog,
}

impl Args {
    fn simulation_config(&self) -> Result<SimulationConfig> {
        let mut config = match &self.config {
            Some(path) => SimulationConfig::from_json_file(path)
                .wrap_err_with(|| format!("failed to load {}", path.display()))?,
            None => SimulationConfig::default(),
        };

        if let Some(bodies) = self.bodies {
            config.num_bodies = bodies;
        }
        if let Some(algorithm) = self.algorithm {
            config.algorithm = match algorithm {
                Algorithm::BarnesHut => AlgorithmConfig::BarnesHut,
                Algorithm::Global => AlgorithmConfig::BruteForceGlobal,
                Algorithm::Local => AlgorithmConfig::BruteForceLocal,
            };
        }
        if let Some(method) = self.method {
            config.numerical_method = match method {
                Method::Euler => NumericalMethod::Euler,
                Method::Leapfrog => NumericalMethod::Leapfrog,
            };
        }
        match self.threads {
            Some(0) => config.execution = Execution::SingleThreaded,
            Some(num_threads) => config.execution = Execution::ThreadPool { num_threads },
            None => {}
        }

        Ok(config.normalized())
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.simulation_config()?;
    let mut simulation = Simulation::new(config)?;

    if let Some(dir) = &args.dump_buffers {
        fs::create_dir_all(dir)
            .wrap_err_with(|| format!("failed to create {}", dir.display()))?;
        simulation.capture_buffers(true);
    }

    let mut records = Vec::new();
    let mut held = 0;
    let started = Instant::now();
    let mut frame = Instant::now();

    for _ in 0..args.steps {
        let elapsed = args
            .frame_delta
            .unwrap_or_else(|| frame.elapsed().as_secs_f32());
        frame = Instant::now();

        let report = simulation.advance(elapsed);
        if report.status == StepStatus::Held {
            held += 1;
        }
        if args.diagnostics.is_some() {
            records.push(DiagnosticRecord::from(&report));
        }
        if let Some(dir) = &args.dump_buffers {
            if let Some(octree) = simulation.last_octree() {
                let path = dir.join(format!("step_{:06}_octree.csv", report.step));
                csv::write_octree(octree, &path)
                    .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            }
            if let Some(build) = report.build.as_ref().filter(|b| !b.failed_bodies.is_empty()) {
                let path = dir.join(format!("step_{:06}_failed.csv", report.step));
                csv::write_failed_bodies(build, &path)
                    .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            }
        }

        if args.progress > 0 && (report.step + 1) % args.progress == 0 {
            info!(
                "step {}/{}: simulated {:.4}s, {:?}",
                report.step + 1,
                args.steps,
                simulation.elapsed(),
                report.status
            );
        }
    }

    info!(
        "{} steps ({held} held) in {:.2?}",
        args.steps,
        started.elapsed()
    );

    csv::write_bodies(simulation.bodies(), &args.output)
        .wrap_err_with(|| format!("failed to write {}", args.output.display()))?;
    info!("bodies written to {}", args.output.display());

    if let Some(path) = &args.diagnostics {
        csv::write_diagnostics(&records, path)
            .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        info!("diagnostics written to {}", path.display());
    }

    Ok(())
}
