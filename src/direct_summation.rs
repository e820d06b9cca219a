//! Exact O(n²) force evaluation, used as the brute-force algorithms and as the
//! reference for the tree approximation.

use nalgebra::Vector3;
use rayon::prelude::*;

use crate::{gravity, Bodies, Execution, Float, GravityParams};

/// Number of source bodies staged together, and number of targets sharing one stage.
pub const TILE_SIZE: usize = 256;

fn acceleration_of(i: usize, bodies: &Bodies, g: Float, epsilon_squared: Float) -> Vector3<Float> {
    let p1 = bodies.positions[i];
    let mut acc = Vector3::zeros();
    for (j, (&m2, &p2)) in bodies.masses.iter().zip(&bodies.positions).enumerate() {
        if i == j {
            continue;
        }
        acc += gravity::acceleration(p1, m2, p2, g, epsilon_squared);
    }
    acc
}

/// Every body against every other body, reading sources straight from the body store.
pub fn accelerations_global(
    bodies: &Bodies,
    params: &GravityParams,
    execution: Execution,
    accelerations: &mut [Vector3<Float>],
) {
    let g = params.g;
    let eps2 = params.epsilon_squared();

    match execution {
        Execution::SingleThreaded => {
            for (i, a) in accelerations.iter_mut().enumerate() {
                *a = acceleration_of(i, bodies, g, eps2);
            }
        }
        Execution::Rayon | Execution::ThreadPool { .. } => {
            accelerations
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, a)| *a = acceleration_of(i, bodies, g, eps2));
        }
    }
}

/// Accelerations of one group of up to [`TILE_SIZE`] targets starting at `first`.
///
/// Sources are copied tile by tile into `tile`, and every target of the group
/// reads the staged tile before the next one is loaded.
fn accelerate_group(
    first: usize,
    group: &mut [Vector3<Float>],
    bodies: &Bodies,
    g: Float,
    epsilon_squared: Float,
    tile: &mut Vec<(Float, Vector3<Float>)>,
) {
    group.iter_mut().for_each(|a| *a = Vector3::zeros());

    for (t, (masses, positions)) in bodies
        .masses
        .chunks(TILE_SIZE)
        .zip(bodies.positions.chunks(TILE_SIZE))
        .enumerate()
    {
        tile.clear();
        tile.extend(masses.iter().copied().zip(positions.iter().copied()));
        let offset = t * TILE_SIZE;

        for (local, a) in group.iter_mut().enumerate() {
            let i = first + local;
            let p1 = bodies.positions[i];
            for (j, &(m2, p2)) in tile.iter().enumerate() {
                if offset + j == i {
                    continue;
                }
                *a += gravity::acceleration(p1, m2, p2, g, epsilon_squared);
            }
        }
    }
}

/// Every body against every other body, streaming sources through a small staging buffer.
///
/// Sources are visited in the same order as in [`accelerations_global`], so
/// both produce identical results.
pub fn accelerations_local(
    bodies: &Bodies,
    params: &GravityParams,
    execution: Execution,
    accelerations: &mut [Vector3<Float>],
) {
    let g = params.g;
    let eps2 = params.epsilon_squared();

    match execution {
        Execution::SingleThreaded => {
            let mut tile = Vec::with_capacity(TILE_SIZE);
            for (n, group) in accelerations.chunks_mut(TILE_SIZE).enumerate() {
                accelerate_group(n * TILE_SIZE, group, bodies, g, eps2, &mut tile);
            }
        }
        Execution::Rayon | Execution::ThreadPool { .. } => {
            accelerations
                .par_chunks_mut(TILE_SIZE)
                .enumerate()
                .for_each_init(
                    || Vec::with_capacity(TILE_SIZE),
                    |tile, (n, group)| {
                        accelerate_group(n * TILE_SIZE, group, bodies, g, eps2, tile);
                    },
                );
        }
    }
}
