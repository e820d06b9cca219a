use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use nalgebra::Vector3;
use rayon::prelude::*;

use super::{BuiltOctree, NodeRef, RootCell, ROOT};
use crate::{Bodies, Execution, Float};

/// Aggregates of one node, stored as raw bits so that lanes can publish them
/// without locks.
struct AtomicAggregate {
    mass: AtomicU32,
    center_of_mass: [AtomicU32; 3],
    body_count: AtomicU32,
}

impl AtomicAggregate {
    fn new() -> Self {
        Self {
            mass: AtomicU32::new(0),
            center_of_mass: std::array::from_fn(|_| AtomicU32::new(0)),
            body_count: AtomicU32::new(0),
        }
    }

    fn store(&self, mass: Float, center_of_mass: Vector3<Float>, body_count: u32) {
        self.mass.store(mass.to_bits(), Ordering::Relaxed);
        for (slot, x) in self.center_of_mass.iter().zip(center_of_mass.iter()) {
            slot.store(x.to_bits(), Ordering::Relaxed);
        }
        self.body_count.store(body_count, Ordering::Relaxed);
    }

    fn load(&self) -> (Float, Vector3<Float>, u32) {
        let [x, y, z] = &self.center_of_mass;
        (
            Float::from_bits(self.mass.load(Ordering::Relaxed)),
            Vector3::new(
                Float::from_bits(x.load(Ordering::Relaxed)),
                Float::from_bits(y.load(Ordering::Relaxed)),
                Float::from_bits(z.load(Ordering::Relaxed)),
            ),
            self.body_count.load(Ordering::Relaxed),
        )
    }
}

/// A built octree whose nodes carry aggregate masses and centers of mass.
///
/// This is a frozen copy of the arena and independent of the builder.
#[derive(Clone, Debug)]
pub struct Octree {
    pub(super) num_bodies: u32,
    pub(super) root: RootCell,
    pub(super) children: Vec<[u32; 8]>,
    pub(super) masses: Vec<Float>,
    pub(super) centers_of_mass: Vec<Vector3<Float>>,
    body_counts: Vec<u32>,
    /// `(node, body)` pairs of depth-limited bodies, sorted by node.
    pub(super) overflow: Vec<(u32, u32)>,
}

/// Bodies of `overflow` attached to `node`.
fn overflow_of(overflow: &[(u32, u32)], node: u32) -> &[(u32, u32)] {
    if overflow.is_empty() {
        return overflow;
    }
    let start = overflow.partition_point(|&(n, _)| n < node);
    let end = overflow.partition_point(|&(n, _)| n <= node);
    &overflow[start..end]
}

impl BuiltOctree<'_> {
    /// Number of child slots of `node` that hold a node.
    fn node_children(&self, node: u32) -> u8 {
        (0..8)
            .filter(|&octant| matches!(self.child(node, octant), NodeRef::Node(_)))
            .count() as u8
    }

    /// Mass, center of mass and body count of `node` from its children and
    /// its overflow bodies.
    ///
    /// A node whose children are all massless takes the plain mean of their
    /// positions as its center of mass.
    fn aggregate(
        &self,
        node: u32,
        bodies: &Bodies,
        aggregates: &[AtomicAggregate],
    ) -> (Float, Vector3<Float>, u32) {
        let mut mass = 0.;
        let mut weighted = Vector3::zeros();
        let mut unweighted = Vector3::zeros();
        let mut children = 0;
        let mut body_count = 0;

        for octant in 0..8 {
            let (m, p, count) = match self.child(node, octant) {
                NodeRef::Body(b) => (bodies.masses[b as usize], bodies.positions[b as usize], 1),
                NodeRef::Node(k) => aggregates[k as usize].load(),
                NodeRef::Empty | NodeRef::Locked => continue,
            };
            mass += m;
            weighted += p * m;
            unweighted += p;
            children += 1;
            body_count += count;
        }
        for &(_, b) in overflow_of(self.overflow(), node) {
            let (m, p) = (bodies.masses[b as usize], bodies.positions[b as usize]);
            mass += m;
            weighted += p * m;
            unweighted += p;
            children += 1;
            body_count += 1;
        }

        let center_of_mass = if mass > 0. {
            weighted / mass
        } else if children > 0 {
            unweighted / children as Float
        } else {
            self.root_cell().center
        };
        (mass, center_of_mass, body_count)
    }

    /// Propagate masses and centers of mass from the leaves to the root.
    ///
    /// Parallel: every node starts with a pending counter equal to its number
    /// of node children. All nodes without node children are processed
    /// concurrently; the lane that brings a parent's counter to zero carries
    /// on with the parent, so no lane ever waits.
    ///
    /// Single-threaded: one pass in descending node index. Children are
    /// always allocated after their parent, so every child is final by the
    /// time its parent is visited.
    #[must_use]
    pub fn saturate(&self, bodies: &Bodies, execution: Execution) -> Octree {
        let nodes = self.node_count();
        let aggregates: Vec<_> = (0..nodes).map(|_| AtomicAggregate::new()).collect();

        match execution {
            Execution::SingleThreaded => {
                for node in (0..nodes as u32).rev() {
                    let (m, p, c) = self.aggregate(node, bodies, &aggregates);
                    aggregates[node as usize].store(m, p, c);
                }
            }
            Execution::Rayon | Execution::ThreadPool { .. } => {
                let pending: Vec<_> = (0..nodes as u32)
                    .into_par_iter()
                    .map(|node| AtomicU8::new(self.node_children(node)))
                    .collect();

                (0..nodes as u32)
                    .into_par_iter()
                    .filter(|&node| pending[node as usize].load(Ordering::Relaxed) == 0)
                    .for_each(|leaf| {
                        let mut node = leaf;
                        loop {
                            let (m, p, c) = self.aggregate(node, bodies, &aggregates);
                            aggregates[node as usize].store(m, p, c);

                            let Some(parent) = self.parent(node) else {
                                break;
                            };
                            if pending[parent as usize].fetch_sub(1, Ordering::AcqRel) != 1 {
                                break;
                            }
                            node = parent;
                        }
                    });
            }
        }

        let mut masses = Vec::with_capacity(nodes);
        let mut centers_of_mass = Vec::with_capacity(nodes);
        let mut body_counts = Vec::with_capacity(nodes);
        for aggregate in &aggregates {
            let (m, p, c) = aggregate.load();
            masses.push(m);
            centers_of_mass.push(p);
            body_counts.push(c);
        }

        Octree {
            num_bodies: self.num_bodies() as u32,
            root: self.root_cell(),
            children: (0..nodes)
                .map(|k| {
                    std::array::from_fn(|octant| {
                        self.builder.children[k][octant].load(Ordering::Relaxed)
                    })
                })
                .collect(),
            masses,
            centers_of_mass,
            body_counts,
            overflow: self.overflow().to_vec(),
        }
    }
}

impl Octree {
    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.num_bodies as usize
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn root_cell(&self) -> RootCell {
        self.root
    }

    #[inline]
    #[must_use]
    pub fn child(&self, node: u32, octant: usize) -> NodeRef {
        NodeRef::decode(self.children[node as usize][octant], self.num_bodies)
    }

    #[must_use]
    pub fn mass(&self, node: u32) -> Float {
        self.masses[node as usize]
    }

    #[must_use]
    pub fn center_of_mass(&self, node: u32) -> Vector3<Float> {
        self.centers_of_mass[node as usize]
    }

    /// Number of bodies in the subtree of `node`.
    #[must_use]
    pub fn body_count(&self, node: u32) -> u32 {
        self.body_counts[node as usize]
    }

    #[must_use]
    pub fn total_mass(&self) -> Float {
        self.mass(ROOT)
    }

    /// Raw child slot values of `node`.
    #[must_use]
    pub fn child_slots(&self, node: u32) -> &[u32; 8] {
        &self.children[node as usize]
    }

    /// Depth-limited bodies attached to `node`.
    pub fn overflow_bodies(&self, node: u32) -> impl Iterator<Item = u32> + '_ {
        overflow_of(&self.overflow, node).iter().map(|&(_, b)| b)
    }

    /// `(node, body)` pairs of all depth-limited bodies, sorted by node.
    #[must_use]
    pub fn overflow(&self) -> &[(u32, u32)] {
        &self.overflow
    }
}
