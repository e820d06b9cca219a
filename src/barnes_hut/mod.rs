//! Barnes-Hut octree: bounding box, lock-free build, saturation and traversal.
//!
//! Bodies and internal nodes share one 32 bit index space. A raw child slot
//! value below `n` (the body count) is a body, values from `n` up to
//! `n + capacity` are nodes and the two largest values are the `EMPTY` and
//! `LOCKED` sentinels. [`NodeRef`] is the typed view of such a slot.

mod bounds;
mod builder;
mod saturation;
mod traversal;

pub use bounds::*;
pub use builder::*;
pub use saturation::*;
pub use traversal::StackEntry;

use nalgebra::Vector3;

use crate::Float;

/// Raw slot value of an empty child.
pub(crate) const EMPTY: u32 = u32::MAX;
/// Raw slot value of a child that is being subdivided.
pub(crate) const LOCKED: u32 = u32::MAX - 1;

/// Node-local index of the root.
pub const ROOT: u32 = 0;

/// A typed child slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Empty,
    /// Transient state while another lane subdivides the slot.
    Locked,
    /// Index into the body store.
    Body(u32),
    /// Node-local index into the node arena.
    Node(u32),
}

impl NodeRef {
    /// Interpret a raw slot value for a tree over `num_bodies` bodies.
    #[inline]
    #[must_use]
    pub fn decode(raw: u32, num_bodies: u32) -> Self {
        match raw {
            EMPTY => NodeRef::Empty,
            LOCKED => NodeRef::Locked,
            body if body < num_bodies => NodeRef::Body(body),
            node => NodeRef::Node(node - num_bodies),
        }
    }

    /// Raw slot value for a tree over `num_bodies` bodies.
    #[inline]
    #[must_use]
    pub fn encode(self, num_bodies: u32) -> u32 {
        match self {
            NodeRef::Empty => EMPTY,
            NodeRef::Locked => LOCKED,
            NodeRef::Body(body) => body,
            NodeRef::Node(node) => num_bodies + node,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(self) -> bool {
        matches!(self, NodeRef::Empty)
    }
}

/// Child octant of `position` in the cell centered at `center`.
///
/// Bit 0 is set for the upper x half, bit 1 for y and bit 2 for z.
#[inline]
pub(crate) fn choose_subnode(center: &Vector3<Float>, position: &Vector3<Float>) -> usize {
    usize::from(position.x >= center.x)
        | usize::from(position.y >= center.y) << 1
        | usize::from(position.z >= center.z) << 2
}

/// Center of child octant `i` of the cell at `center` with half side length `half_width`.
#[inline]
pub(crate) fn center_from_subnode(
    half_width: Float,
    center: Vector3<Float>,
    i: usize,
) -> Vector3<Float> {
    let step = half_width / 2.;
    let sign = |bit: usize| if i & bit != 0 { step } else { -step };
    center + Vector3::new(sign(1), sign(2), sign(4))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ref_ranges_are_disjoint() {
        let n = 10;
        assert_eq!(NodeRef::decode(0, n), NodeRef::Body(0));
        assert_eq!(NodeRef::decode(9, n), NodeRef::Body(9));
        assert_eq!(NodeRef::decode(10, n), NodeRef::Node(0));
        assert_eq!(NodeRef::decode(17, n), NodeRef::Node(7));
        assert_eq!(NodeRef::decode(EMPTY, n), NodeRef::Empty);
        assert_eq!(NodeRef::decode(LOCKED, n), NodeRef::Locked);

        for r in [
            NodeRef::Empty,
            NodeRef::Locked,
            NodeRef::Body(3),
            NodeRef::Node(0),
            NodeRef::Node(1000),
        ] {
            assert_eq!(NodeRef::decode(r.encode(n), n), r);
        }
    }

    #[test]
    fn subnode_centers_contain_their_octant() {
        let center = Vector3::new(1., -2., 0.5);
        let half_width = 4.;
        for i in 0..8 {
            let child = center_from_subnode(half_width, center, i);
            assert_eq!(choose_subnode(&center, &child), i);
            assert_eq!((child - center).abs(), Vector3::repeat(2.));
        }
    }
}
