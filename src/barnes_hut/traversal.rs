use nalgebra::Vector3;
use rayon::prelude::*;

use super::{center_from_subnode, NodeRef, Octree, ROOT};
use crate::{gravity, Bodies, Execution, Float, GravityParams};

/// An entry of the explicit traversal stack: node, cell center and half side length.
pub type StackEntry = (u32, Vector3<Float>, Float);

impl Octree {
    /// Approximate acceleration of body `body`.
    ///
    /// A child cell of side `s` whose center of mass lies at distance `d` is
    /// used as a single point mass if `s < theta * d` and the body is outside
    /// the cell. Every other cell is opened. Body leaves and the overflow
    /// bodies of opened cells always contribute, except the body itself.
    #[must_use]
    pub fn acceleration(
        &self,
        body: usize,
        bodies: &Bodies,
        params: &GravityParams,
        stack: &mut Vec<StackEntry>,
    ) -> Vector3<Float> {
        let position = bodies.positions[body];
        let g = params.g;
        let eps2 = params.epsilon_squared();
        let theta_squared = params.theta * params.theta;

        let mut acc = Vector3::zeros();
        stack.clear();
        stack.push((ROOT, self.root.center, self.root.half_width));

        while let Some((node, center, half_width)) = stack.pop() {
            for b in self.overflow_bodies(node) {
                let b = b as usize;
                if b != body {
                    acc += gravity::acceleration(
                        position,
                        bodies.masses[b],
                        bodies.positions[b],
                        g,
                        eps2,
                    );
                }
            }
            for octant in 0..8 {
                match self.child(node, octant) {
                    NodeRef::Body(b) if b as usize == body => {}
                    NodeRef::Body(b) => {
                        let b = b as usize;
                        acc += gravity::acceleration(
                            position,
                            bodies.masses[b],
                            bodies.positions[b],
                            g,
                            eps2,
                        );
                    }
                    NodeRef::Node(k) => {
                        let child_center = center_from_subnode(half_width, center, octant);
                        let child_half_width = half_width / 2.;
                        let side = 2. * child_half_width;
                        let com = self.centers_of_mass[k as usize];
                        let d_squared = (com - position).norm_squared();
                        let inside = (position - child_center).amax() <= child_half_width;

                        if !inside && side * side < theta_squared * d_squared {
                            acc += gravity::acceleration(
                                position,
                                self.masses[k as usize],
                                com,
                                g,
                                eps2,
                            );
                        } else {
                            stack.push((k, child_center, child_half_width));
                        }
                    }
                    NodeRef::Empty | NodeRef::Locked => {}
                }
            }
        }
        acc
    }

    /// Write the acceleration of every body into `accelerations`.
    pub fn accelerations(
        &self,
        bodies: &Bodies,
        params: &GravityParams,
        execution: Execution,
        accelerations: &mut [Vector3<Float>],
    ) {
        match execution {
            Execution::SingleThreaded => {
                let mut stack = Vec::new();
                for (i, a) in accelerations.iter_mut().enumerate() {
                    *a = self.acceleration(i, bodies, params, &mut stack);
                }
            }
            Execution::Rayon | Execution::ThreadPool { .. } => {
                accelerations.par_iter_mut().enumerate().for_each_init(
                    Vec::new,
                    |stack, (i, a)| {
                        *a = self.acceleration(i, bodies, params, stack);
                    },
                );
            }
        }
    }

    /// Call `f` with every body within `radius` of `position`, the body at
    /// `position` itself included.
    pub fn neighbours_within(
        &self,
        position: &Vector3<Float>,
        radius: Float,
        bodies: &Bodies,
        stack: &mut Vec<StackEntry>,
        mut f: impl FnMut(usize),
    ) {
        let radius_squared = radius * radius;
        stack.clear();
        stack.push((ROOT, self.root.center, self.root.half_width));

        while let Some((node, center, half_width)) = stack.pop() {
            for b in self.overflow_bodies(node) {
                if (bodies.positions[b as usize] - position).norm_squared() <= radius_squared {
                    f(b as usize);
                }
            }
            for octant in 0..8 {
                match self.child(node, octant) {
                    NodeRef::Body(b) => {
                        if (bodies.positions[b as usize] - position).norm_squared()
                            <= radius_squared
                        {
                            f(b as usize);
                        }
                    }
                    NodeRef::Node(k) => {
                        let child_center = center_from_subnode(half_width, center, octant);
                        let child_half_width = half_width / 2.;
                        // Distance from the query point to the closest point of the cell.
                        let gap = ((position - child_center).abs()
                            - Vector3::repeat(child_half_width))
                        .sup(&Vector3::zeros());
                        if gap.norm_squared() <= radius_squared {
                            stack.push((k, child_center, child_half_width));
                        }
                    }
                    NodeRef::Empty | NodeRef::Locked => {}
                }
            }
        }
    }
}
