use std::{
    fmt, hint,
    ops::{BitOr, BitOrAssign},
    sync::atomic::{AtomicU32, AtomicU8, Ordering},
    thread,
};

use log::warn;
use nalgebra::Vector3;
use rayon::prelude::*;

use super::{center_from_subnode, choose_subnode, NodeRef, RootCell, EMPTY, LOCKED, ROOT};
use crate::{config::MAX_BODIES, Execution, Float};

/// Busy-wait iterations on a locked slot before yielding the thread.
const SPIN_LIMIT: u32 = 64;
/// Attempts on a locked slot before the insertion is given up.
pub const MAX_LOCK_RETRIES: u32 = 1 << 16;

/// Error conditions raised while building the octree.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct BuildFlags(u8);

impl BuildFlags {
    pub const NONE: Self = Self(0);
    /// A body needed a node deeper than `max_octree_depth`.
    pub const DEPTH_EXCEEDED: Self = Self(1);
    /// The node arena ran out of slots.
    pub const NODE_OVERFLOW: Self = Self(1 << 1);
    /// A slot stayed locked for longer than the retry bound.
    pub const LOCK_CONTENTION: Self = Self(1 << 2);
    /// Flags that leave bodies outside the tree.
    pub const FATAL: Self = Self(Self::NODE_OVERFLOW.0 | Self::LOCK_CONTENTION.0);

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b111)
    }

    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[must_use]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for BuildFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for BuildFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for BuildFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Self::DEPTH_EXCEEDED, "DEPTH_EXCEEDED"),
            (Self::NODE_OVERFLOW, "NODE_OVERFLOW"),
            (Self::LOCK_CONTENTION, "LOCK_CONTENTION"),
        ];
        let set: Vec<_> = names
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        if set.is_empty() {
            write!(f, "BuildFlags(NONE)")
        } else {
            write!(f, "BuildFlags({})", set.join(" | "))
        }
    }
}

/// Host-side summary of one build.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildDiagnostics {
    pub flags: BuildFlags,
    /// Bodies that raised a flag, in ascending order.
    ///
    /// Bodies stopped by the depth limit are still part of the tree, kept in
    /// the overflow list of the deepest node on their path.
    pub failed_bodies: Vec<u32>,
    pub nodes_used: usize,
    pub capacity: usize,
    /// Level of the deepest node that received a body.
    pub max_depth_reached: u32,
}

impl BuildDiagnostics {
    /// Whether growing the node arena and building again can fix the failure.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.flags.contains(BuildFlags::NODE_OVERFLOW)
            && !self.flags.contains(BuildFlags::LOCK_CONTENTION)
    }
}

/// Reusable node arena for the concurrent octree build.
///
/// Node `k` owns eight child slots. A slot is claimed by a body with a
/// compare-and-swap from `EMPTY`; when two bodies meet in one slot the winner
/// of a CAS to `LOCKED` allocates a fresh node from the shared `bottom`
/// counter, moves the resident body into it and publishes the node with a
/// release store. Other lanes observing `LOCKED` retry.
///
/// A body that meets another one in a cell at the maximum depth is attached
/// to that cell's node instead of splitting it further.
pub struct OctreeBuilder {
    num_bodies: u32,
    pub(super) children: Vec<[AtomicU32; 8]>,
    pub(super) parents: Vec<AtomicU32>,
    depths: Vec<AtomicU8>,
    bottom: AtomicU32,
    body_flags: Vec<AtomicU8>,
    /// Node a depth-limited body hangs off, `EMPTY` for all others.
    attached: Vec<AtomicU32>,
    max_depth_reached: AtomicU32,
    lock_retries: u32,
    /// Nodes touched by the last build, all of which must be cleared before the next.
    dirty: usize,
    /// Child slot forced to `LOCKED` after every reset.
    #[cfg(test)]
    pub(crate) stuck_slot: Option<(u32, usize)>,
}

impl fmt::Debug for OctreeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OctreeBuilder")
            .field("num_bodies", &self.num_bodies)
            .field("capacity", &self.capacity())
            .field("lock_retries", &self.lock_retries)
            .field("dirty", &self.dirty)
            .finish_non_exhaustive()
    }
}

fn empty_node() -> [AtomicU32; 8] {
    std::array::from_fn(|_| AtomicU32::new(EMPTY))
}

impl OctreeBuilder {
    /// Arena sized for `num_bodies` well-separated bodies.
    #[must_use]
    pub fn new(num_bodies: usize) -> Self {
        Self::with_capacity(num_bodies, Self::default_capacity(num_bodies))
    }

    #[must_use]
    pub fn with_capacity(num_bodies: usize, capacity: usize) -> Self {
        assert!(num_bodies <= MAX_BODIES, "too many bodies: {num_bodies}");
        let capacity = capacity.clamp(1, Self::max_capacity(num_bodies));

        Self {
            num_bodies: num_bodies as u32,
            children: (0..capacity).map(|_| empty_node()).collect(),
            parents: (0..capacity).map(|_| AtomicU32::new(EMPTY)).collect(),
            depths: (0..capacity).map(|_| AtomicU8::new(0)).collect(),
            bottom: AtomicU32::new(1),
            body_flags: (0..num_bodies).map(|_| AtomicU8::new(0)).collect(),
            attached: (0..num_bodies).map(|_| AtomicU32::new(EMPTY)).collect(),
            max_depth_reached: AtomicU32::new(0),
            lock_retries: MAX_LOCK_RETRIES,
            dirty: capacity,
            #[cfg(test)]
            stuck_slot: None,
        }
    }

    /// Give up on a locked slot after `retries` attempts.
    #[must_use]
    pub fn with_lock_retries(mut self, retries: u32) -> Self {
        self.lock_retries = retries;
        self
    }

    fn default_capacity(num_bodies: usize) -> usize {
        (2 * num_bodies).max(64)
    }

    /// Node indices are stored after the body indices and must stay below the sentinels.
    fn max_capacity(num_bodies: usize) -> usize {
        LOCKED as usize - num_bodies
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.children.len()
    }

    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.num_bodies as usize
    }

    /// Double the node capacity.
    pub fn grow(&mut self) {
        let old = self.capacity();
        let new = (old * 2).min(Self::max_capacity(self.num_bodies()));
        self.children.resize_with(new, empty_node);
        self.parents.resize_with(new, || AtomicU32::new(EMPTY));
        self.depths.resize_with(new, || AtomicU8::new(0));
        warn!("octree node arena grown from {old} to {new} nodes");
    }

    fn rebind(&mut self, num_bodies: usize) {
        if num_bodies == self.num_bodies() {
            return;
        }
        let capacity = self.capacity().max(Self::default_capacity(num_bodies));
        *self = Self::with_capacity(num_bodies, capacity).with_lock_retries(self.lock_retries);
    }

    fn reset(&mut self, execution: Execution) {
        let dirty = self.dirty.min(self.capacity());
        let clear = |node: &mut [AtomicU32; 8]| {
            for slot in node.iter_mut() {
                *slot.get_mut() = EMPTY;
            }
        };
        match execution {
            Execution::SingleThreaded => {
                self.children[..dirty].iter_mut().for_each(clear);
                self.body_flags.iter_mut().for_each(|f| *f.get_mut() = 0);
                self.attached.iter_mut().for_each(|a| *a.get_mut() = EMPTY);
            }
            Execution::Rayon | Execution::ThreadPool { .. } => {
                self.children[..dirty].par_iter_mut().for_each(clear);
                self.body_flags.par_iter_mut().for_each(|f| *f.get_mut() = 0);
                self.attached.par_iter_mut().for_each(|a| *a.get_mut() = EMPTY);
            }
        }

        *self.parents[ROOT as usize].get_mut() = EMPTY;
        *self.depths[ROOT as usize].get_mut() = 0;
        *self.bottom.get_mut() = ROOT + 1;
        *self.max_depth_reached.get_mut() = 0;
        self.dirty = 0;
    }

    /// Insert every body into a fresh tree covering `root`.
    ///
    /// Bodies stopped by the depth limit are kept as overflow bodies and the
    /// build still succeeds; its diagnostics carry `DEPTH_EXCEEDED`. Node
    /// overflow or lock contention leave bodies outside the tree: the arena is
    /// left as is and the diagnostics describe every body that could not be
    /// placed.
    pub fn build(
        &mut self,
        positions: &[Vector3<Float>],
        root: RootCell,
        max_depth: u32,
        execution: Execution,
    ) -> Result<BuiltOctree<'_>, BuildDiagnostics> {
        self.rebind(positions.len());
        self.reset(execution);
        #[cfg(test)]
        if let Some((node, octant)) = self.stuck_slot {
            *self.children[node as usize][octant].get_mut() = LOCKED;
        }

        let this = &*self;
        match execution {
            Execution::SingleThreaded => {
                (0..positions.len()).for_each(|i| this.insert(i, positions, root, max_depth));
            }
            Execution::Rayon | Execution::ThreadPool { .. } => {
                (0..positions.len())
                    .into_par_iter()
                    .for_each(|i| this.insert(i, positions, root, max_depth));
            }
        }

        let nodes_used = (self.bottom.load(Ordering::Acquire) as usize).min(self.capacity());
        self.dirty = nodes_used;

        let diagnostics = self.diagnostics(nodes_used);
        if diagnostics.flags.intersects(BuildFlags::FATAL) {
            return Err(diagnostics);
        }

        let mut overflow: Vec<_> = diagnostics
            .failed_bodies
            .iter()
            .map(|&b| (self.attached[b as usize].load(Ordering::Relaxed), b))
            .collect();
        overflow.sort_unstable();

        Ok(BuiltOctree {
            builder: self,
            root,
            nodes_used,
            overflow,
        })
    }

    fn diagnostics(&self, nodes_used: usize) -> BuildDiagnostics {
        let mut flags = BuildFlags::NONE;
        let mut failed_bodies = Vec::new();
        for (i, f) in self.body_flags.iter().enumerate() {
            let f = BuildFlags::from_bits(f.load(Ordering::Relaxed));
            if !f.is_empty() {
                flags |= f;
                failed_bodies.push(i as u32);
            }
        }

        BuildDiagnostics {
            flags,
            failed_bodies,
            nodes_used,
            capacity: self.capacity(),
            max_depth_reached: self.max_depth_reached.load(Ordering::Relaxed),
        }
    }

    fn fail(&self, body: usize, flag: BuildFlags) {
        self.body_flags[body].fetch_or(flag.bits(), Ordering::Relaxed);
    }

    fn insert(&self, body: usize, positions: &[Vector3<Float>], root: RootCell, max_depth: u32) {
        let position = positions[body];
        let body_raw = NodeRef::Body(body as u32).encode(self.num_bodies);

        let mut node = ROOT;
        let mut center = root.center;
        let mut half_width = root.half_width;
        let mut depth = 0;
        let mut locked_retries = 0;

        loop {
            let octant = choose_subnode(&center, &position);
            let slot = &self.children[node as usize][octant];
            let raw = slot.load(Ordering::Acquire);

            match NodeRef::decode(raw, self.num_bodies) {
                NodeRef::Node(child) => {
                    center = center_from_subnode(half_width, center, octant);
                    half_width /= 2.;
                    node = child;
                    depth += 1;
                    locked_retries = 0;
                }
                NodeRef::Empty => {
                    if slot
                        .compare_exchange(EMPTY, body_raw, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        self.max_depth_reached.fetch_max(depth, Ordering::Relaxed);
                        return;
                    }
                }
                NodeRef::Locked => {
                    locked_retries += 1;
                    if locked_retries > self.lock_retries {
                        self.fail(body, BuildFlags::LOCK_CONTENTION);
                        return;
                    } else if locked_retries <= SPIN_LIMIT {
                        hint::spin_loop();
                    } else {
                        thread::yield_now();
                    }
                }
                NodeRef::Body(other) => {
                    if depth + 1 > max_depth {
                        self.attached[body].store(node, Ordering::Relaxed);
                        self.fail(body, BuildFlags::DEPTH_EXCEEDED);
                        self.max_depth_reached.fetch_max(depth, Ordering::Relaxed);
                        return;
                    }
                    if slot
                        .compare_exchange(raw, LOCKED, Ordering::Acquire, Ordering::Relaxed)
                        .is_err()
                    {
                        continue;
                    }

                    let new = self.bottom.fetch_add(1, Ordering::Relaxed);
                    if new as usize >= self.capacity() {
                        slot.store(raw, Ordering::Release);
                        self.fail(body, BuildFlags::NODE_OVERFLOW);
                        return;
                    }

                    let k = new as usize;
                    let child_center = center_from_subnode(half_width, center, octant);
                    let other_octant = choose_subnode(&child_center, &positions[other as usize]);
                    self.parents[k].store(node, Ordering::Relaxed);
                    self.depths[k].store((depth + 1) as u8, Ordering::Relaxed);
                    self.children[k][other_octant].store(raw, Ordering::Relaxed);
                    slot.store(NodeRef::Node(new).encode(self.num_bodies), Ordering::Release);
                    // The next iteration reloads the slot and descends into the new node.
                }
            }
        }
    }
}

/// A successfully built tree whose nodes carry no mass yet.
#[derive(Debug)]
pub struct BuiltOctree<'a> {
    pub(super) builder: &'a OctreeBuilder,
    root: RootCell,
    nodes_used: usize,
    overflow: Vec<(u32, u32)>,
}

impl BuiltOctree<'_> {
    #[must_use]
    pub fn root_cell(&self) -> RootCell {
        self.root
    }

    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.builder.num_bodies()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes_used
    }

    #[must_use]
    pub fn child(&self, node: u32, octant: usize) -> NodeRef {
        NodeRef::decode(
            self.builder.children[node as usize][octant].load(Ordering::Acquire),
            self.builder.num_bodies,
        )
    }

    /// Parent of `node`, [`None`] for the root.
    #[must_use]
    pub fn parent(&self, node: u32) -> Option<u32> {
        if node == ROOT {
            return None;
        }
        Some(self.builder.parents[node as usize].load(Ordering::Relaxed))
    }

    #[must_use]
    pub fn depth(&self, node: u32) -> u32 {
        u32::from(self.builder.depths[node as usize].load(Ordering::Relaxed))
    }

    /// `(node, body)` pairs of depth-limited bodies, sorted by node and body.
    #[must_use]
    pub fn overflow(&self) -> &[(u32, u32)] {
        &self.overflow
    }

    #[must_use]
    pub fn diagnostics(&self) -> BuildDiagnostics {
        self.builder.diagnostics(self.nodes_used)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::BoundingBox;

    fn random_positions(n: usize, seed: u64) -> Vec<Vector3<Float>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Vector3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                )
            })
            .collect()
    }

    fn unit_root() -> RootCell {
        RootCell {
            center: Vector3::zeros(),
            half_width: 1.,
        }
    }

    /// Every body index found in a child slot.
    fn leaf_bodies(tree: &BuiltOctree) -> Vec<u32> {
        let mut bodies = Vec::new();
        for node in 0..tree.node_count() as u32 {
            for octant in 0..8 {
                match tree.child(node, octant) {
                    NodeRef::Body(b) => bodies.push(b),
                    NodeRef::Locked => panic!("slot left locked"),
                    NodeRef::Empty | NodeRef::Node(_) => {}
                }
            }
        }
        bodies
    }

    #[test]
    fn every_body_has_exactly_one_slot() {
        for execution in [Execution::SingleThreaded, Execution::Rayon] {
            let positions = random_positions(3000, 7);
            let root = BoundingBox::reduce(&positions, execution).to_cube();
            let mut builder = OctreeBuilder::new(positions.len());
            let tree = builder.build(&positions, root, 32, execution).unwrap();

            let mut bodies = leaf_bodies(&tree);
            bodies.sort_unstable();
            assert_eq!(bodies, (0..3000).collect::<Vec<_>>());
        }
    }

    #[test]
    fn children_are_allocated_after_parents() {
        let positions = random_positions(2000, 3);
        let mut builder = OctreeBuilder::new(positions.len());
        let tree = builder
            .build(&positions, unit_root(), 32, Execution::Rayon)
            .unwrap();

        assert_eq!(tree.parent(ROOT), None);
        for node in 1..tree.node_count() as u32 {
            let parent = tree.parent(node).unwrap();
            assert!(parent < node);
            assert_eq!(tree.depth(node), tree.depth(parent) + 1);
            let linked = (0..8).any(|o| tree.child(parent, o) == NodeRef::Node(node));
            assert!(linked, "node {node} is not referenced by its parent");
        }
    }

    #[test]
    fn bodies_lie_inside_their_cells() {
        let positions = random_positions(500, 11);
        let mut builder = OctreeBuilder::new(positions.len());
        let tree = builder
            .build(&positions, unit_root(), 32, Execution::Rayon)
            .unwrap();

        let mut stack = vec![(ROOT, Vector3::zeros(), 1.0 as Float)];
        while let Some((node, center, half_width)) = stack.pop() {
            for octant in 0..8 {
                let child_center = center_from_subnode(half_width, center, octant);
                match tree.child(node, octant) {
                    NodeRef::Body(b) => {
                        let offset = positions[b as usize] - child_center;
                        assert!(offset.amax() <= half_width / 2. + 1e-6);
                    }
                    NodeRef::Node(k) => stack.push((k, child_center, half_width / 2.)),
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn depth_limited_bodies_hang_off_the_deepest_node() {
        // Nine bodies crowd one octant of the root; the rest are spread out.
        let mut positions: Vec<_> = (0..9)
            .map(|i| Vector3::new(-0.9 + 0.01 * i as Float, -0.9, -0.9))
            .collect();
        positions.push(Vector3::new(0.5, 0.5, 0.5));

        for execution in [Execution::SingleThreaded, Execution::Rayon] {
            let mut builder = OctreeBuilder::new(positions.len());
            let tree = builder.build(&positions, unit_root(), 1, execution).unwrap();
            let diagnostics = tree.diagnostics();

            assert_eq!(diagnostics.flags, BuildFlags::DEPTH_EXCEEDED);
            assert!(!diagnostics.is_recoverable());
            assert!(diagnostics.failed_bodies.iter().all(|&b| b < 9));
            assert_eq!(diagnostics.max_depth_reached, 1);

            let overflow_bodies: Vec<_> = tree.overflow().iter().map(|&(_, b)| b).collect();
            let mut sorted = overflow_bodies.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, diagnostics.failed_bodies);
            for &(node, _) in tree.overflow() {
                assert_eq!(tree.depth(node), 1);
            }

            let mut bodies = leaf_bodies(&tree);
            bodies.extend(overflow_bodies);
            bodies.sort_unstable();
            assert_eq!(bodies, (0..10).collect::<Vec<_>>());
        }
    }

    #[test]
    fn coincident_bodies_stop_at_depth_limit() {
        let positions = vec![Vector3::new(0.25, 0.25, 0.25); 2];
        let mut builder = OctreeBuilder::new(2);
        let tree = builder
            .build(&positions, unit_root(), 32, Execution::SingleThreaded)
            .unwrap();

        let diagnostics = tree.diagnostics();
        assert_eq!(diagnostics.flags, BuildFlags::DEPTH_EXCEEDED);
        assert_eq!(diagnostics.failed_bodies, vec![1]);
        assert_eq!(diagnostics.max_depth_reached, 32);
        assert_eq!(leaf_bodies(&tree), vec![0]);

        let [(node, body)] = tree.overflow() else {
            panic!("expected one overflow body, got {:?}", tree.overflow());
        };
        assert_eq!(*body, 1);
        assert_eq!(tree.depth(*node), 32);
    }

    #[test]
    fn stuck_lock_gives_up_after_retry_bound() {
        let positions = vec![Vector3::new(0.5, 0.5, 0.5), Vector3::new(-0.5, -0.5, -0.5)];
        let mut builder = OctreeBuilder::new(2).with_lock_retries(8);
        builder.stuck_slot = Some((ROOT, 7));

        let diagnostics = builder
            .build(&positions, unit_root(), 32, Execution::SingleThreaded)
            .unwrap_err();
        assert_eq!(diagnostics.flags, BuildFlags::LOCK_CONTENTION);
        assert_eq!(diagnostics.failed_bodies, vec![0]);
        assert!(!diagnostics.is_recoverable());

        // Once the slot is released the same arena builds normally.
        builder.stuck_slot = None;
        let tree = builder
            .build(&positions, unit_root(), 32, Execution::SingleThreaded)
            .unwrap();
        assert_eq!(tree.child(ROOT, 7), NodeRef::Body(0));
        assert_eq!(tree.child(ROOT, 0), NodeRef::Body(1));
    }

    #[test]
    fn overflow_with_depth_limit_is_still_recoverable() {
        let diagnostics = BuildDiagnostics {
            flags: BuildFlags::NODE_OVERFLOW | BuildFlags::DEPTH_EXCEEDED,
            ..Default::default()
        };
        assert!(diagnostics.is_recoverable());

        let diagnostics = BuildDiagnostics {
            flags: BuildFlags::NODE_OVERFLOW | BuildFlags::LOCK_CONTENTION,
            ..Default::default()
        };
        assert!(!diagnostics.is_recoverable());
    }

    #[test]
    fn overflow_is_recoverable_by_growing() {
        let positions = random_positions(200, 5);
        let mut builder = OctreeBuilder::with_capacity(positions.len(), 2);

        let diagnostics = builder
            .build(&positions, unit_root(), 32, Execution::Rayon)
            .unwrap_err();
        assert_eq!(diagnostics.flags, BuildFlags::NODE_OVERFLOW);
        assert!(diagnostics.is_recoverable());
        assert_eq!(diagnostics.capacity, 2);

        while builder.capacity() < 400 {
            builder.grow();
        }
        let tree = builder
            .build(&positions, unit_root(), 32, Execution::Rayon)
            .unwrap();
        assert_eq!(leaf_bodies(&tree).len(), 200);
    }

    #[test]
    fn arena_is_reusable() {
        let mut builder = OctreeBuilder::new(1000);
        let first = random_positions(1000, 1);
        let second = random_positions(1000, 2);

        builder
            .build(&first, unit_root(), 32, Execution::Rayon)
            .unwrap();
        let tree = builder
            .build(&second, unit_root(), 32, Execution::Rayon)
            .unwrap();
        assert_eq!(leaf_bodies(&tree).len(), 1000);

        // A different body count rebinds the arena.
        let third = random_positions(10, 3);
        let tree = builder
            .build(&third, unit_root(), 32, Execution::SingleThreaded)
            .unwrap();
        assert_eq!(tree.num_bodies(), 10);
        assert_eq!(leaf_bodies(&tree).len(), 10);
    }

    #[test]
    fn empty_and_single_body() {
        let mut builder = OctreeBuilder::new(0);
        let tree = builder
            .build(&[], unit_root(), 32, Execution::Rayon)
            .unwrap();
        assert_eq!(tree.node_count(), 1);
        assert!(leaf_bodies(&tree).is_empty());

        let tree = builder
            .build(&[Vector3::new(0.1, 0.2, 0.3)], unit_root(), 32, Execution::Rayon)
            .unwrap();
        assert_eq!(tree.child(ROOT, 7), NodeRef::Body(0));
    }

    #[test]
    fn flags_debug_lists_names() {
        let flags = BuildFlags::DEPTH_EXCEEDED | BuildFlags::LOCK_CONTENTION;
        assert_eq!(format!("{flags:?}"), "BuildFlags(DEPTH_EXCEEDED | LOCK_CONTENTION)");
        assert_eq!(format!("{:?}", BuildFlags::NONE), "BuildFlags(NONE)");
    }
}
