//! Contact response between bodies that come closer than two body radii.

use nalgebra::Vector3;
use rayon::prelude::*;

use crate::{barnes_hut::StackEntry, config::CollisionConfig, Bodies, Execution, Float, Octree};

/// Velocity change of body `i` from every approaching neighbour within contact distance.
///
/// The impulse magnitude `J = -(1 + e) (v_rel · n) / (1/m_i + 1/m_j)` only
/// depends on the pair, so `i` and `j` receive equal and opposite impulses.
fn velocity_change(
    i: usize,
    bodies: &Bodies,
    velocities: &[Vector3<Float>],
    octree: &Octree,
    config: &CollisionConfig,
    stack: &mut Vec<StackEntry>,
) -> (Vector3<Float>, u32) {
    let mi = bodies.masses[i];
    if mi <= 0. {
        return (Vector3::zeros(), 0);
    }
    let pi = bodies.positions[i];
    let vi = velocities[i];

    let mut dv = Vector3::zeros();
    let mut contacts = 0;
    octree.neighbours_within(&pi, 2. * config.radius, bodies, stack, |j| {
        let mj = bodies.masses[j];
        if j == i || mj <= 0. {
            return;
        }
        let Some(n) = (bodies.positions[j] - pi).try_normalize(0.) else {
            return;
        };
        let approach = (velocities[j] - vi).dot(&n);
        if approach >= 0. {
            return;
        }

        let impulse = -(1. + config.restitution) * approach / (1. / mi + 1. / mj);
        dv -= n * (impulse / mi);
        contacts += 1;
    });
    (dv, contacts)
}

/// Apply contact impulses to every pair of approaching bodies closer than
/// `2 * config.radius`, using `octree` to find candidates.
///
/// All impulses are computed from the velocities before the pass, so the
/// result does not depend on the processing order. Returns the number of
/// contacts, counting each pair twice.
pub fn resolve(
    bodies: &mut Bodies,
    octree: &Octree,
    config: &CollisionConfig,
    execution: Execution,
) -> usize {
    let velocities = bodies.velocities.clone();
    let bodies_ref = &*bodies;

    let changes: Vec<_> = match execution {
        Execution::SingleThreaded => {
            let mut stack = Vec::new();
            (0..velocities.len())
                .map(|i| velocity_change(i, bodies_ref, &velocities, octree, config, &mut stack))
                .collect()
        }
        Execution::Rayon | Execution::ThreadPool { .. } => (0..velocities.len())
            .into_par_iter()
            .map_init(Vec::new, |stack, i| {
                velocity_change(i, bodies_ref, &velocities, octree, config, stack)
            })
            .collect(),
    };

    let mut contacts = 0;
    for (v, (dv, n)) in bodies.velocities.iter_mut().zip(changes) {
        *v += dv;
        contacts += n as usize;
    }
    contacts
}
