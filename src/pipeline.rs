//! The stages of one simulation step and their completion order.
//!
//! Every stage runs to completion before the next starts: a stage is a
//! function call whose parallel loops have all joined when it returns. The
//! data dependencies are carried by types (`RootCell` -> `BuiltOctree` ->
//! `Octree` -> accelerations), and [`StageTrace`] records the order in
//! which stages actually finished so that it can be checked afterwards.

use std::{
    fmt,
    time::{Duration, Instant},
};

use log::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    BoundingBox,
    Build,
    Saturate,
    Force,
    Integrate,
    Collide,
}

impl Stage {
    /// The stage whose output this stage consumes, if it must directly precede it.
    #[must_use]
    pub fn depends_on(self) -> Option<Stage> {
        match self {
            Stage::Build => Some(Stage::BoundingBox),
            Stage::Saturate => Some(Stage::Build),
            Stage::BoundingBox | Stage::Force | Stage::Integrate | Stage::Collide => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::BoundingBox => "bounding box",
            Stage::Build => "build",
            Stage::Saturate => "saturate",
            Stage::Force => "force",
            Stage::Integrate => "integrate",
            Stage::Collide => "collide",
        };
        f.write_str(name)
    }
}

/// Completed stages of the current step, in completion order.
#[derive(Clone, Debug, Default)]
pub struct StageTrace {
    completed: Vec<(Stage, Duration)>,
}

impl StageTrace {
    pub fn clear(&mut self) {
        self.completed.clear();
    }

    /// Run `stage` to completion and record it.
    pub fn run<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.finish(stage, start);
        out
    }

    /// Record that `stage`, started at `start`, has completed.
    pub fn finish(&mut self, stage: Stage, start: Instant) {
        let elapsed = start.elapsed();
        debug!("{stage} stage finished in {elapsed:?}");
        self.completed.push((stage, elapsed));
    }

    pub fn stages(&self) -> impl Iterator<Item = Stage> + '_ {
        self.completed.iter().map(|&(stage, _)| stage)
    }

    /// Total time spent in `stage` during this step.
    #[must_use]
    pub fn time_in(&self, stage: Stage) -> Duration {
        self.completed
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, d)| *d)
            .sum()
    }

    /// Whether every stage with a dependency was immediately preceded by it.
    ///
    /// A build may directly follow a failed build, which is how a retry with
    /// a grown node arena shows up.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let stages: Vec<_> = self.stages().collect();
        stages.iter().enumerate().all(|(i, &stage)| match stage.depends_on() {
            Some(dependency) => {
                i > 0
                    && (stages[i - 1] == dependency
                        || (stage == Stage::Build && stages[i - 1] == Stage::Build))
            }
            None => true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_completion_order() {
        let mut trace = StageTrace::default();
        let cell = trace.run(Stage::BoundingBox, || 1);
        let tree = trace.run(Stage::Build, || cell + 1);
        let sum = trace.run(Stage::Saturate, || tree * 10);
        assert_eq!(sum, 20);

        assert_eq!(
            trace.stages().collect::<Vec<_>>(),
            vec![Stage::BoundingBox, Stage::Build, Stage::Saturate]
        );
        assert!(trace.is_consistent());

        trace.clear();
        assert_eq!(trace.stages().count(), 0);
    }

    #[test]
    fn detects_missing_dependency() {
        let mut trace = StageTrace::default();
        trace.run(Stage::BoundingBox, || ());
        trace.run(Stage::Saturate, || ());
        assert!(!trace.is_consistent());
    }

    #[test]
    fn retried_build_is_consistent() {
        let mut trace = StageTrace::default();
        for stage in [
            Stage::BoundingBox,
            Stage::Build,
            Stage::Build,
            Stage::Saturate,
            Stage::Force,
        ] {
            trace.run(stage, || ());
        }
        assert!(trace.is_consistent());
        assert!(trace.time_in(Stage::Build) >= Duration::ZERO);
    }
}
