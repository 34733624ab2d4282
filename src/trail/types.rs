//! GPU data layouts for trail history, plus a host mirror of the ring
//! arithmetic.
//!
//! Every struct here is `#[repr(C)]` and must match the WGSL declarations in
//! `assets/shaders/modules/trail_types.wgsl` byte for byte.

use glam::{Vec3, Vec4};

/// Per-trail bookkeeping.
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable,
)]
pub struct Trail {
    /// Nodes ever appended; the next write goes to slot
    /// `total_input_num % node_num_per_trail`.
    pub total_input_num: u32,
    /// LOD tier whose vertex buffer last received this trail's vertices.
    pub selected_lod: u32,
    /// Frame counter at the last vertex regeneration.
    pub last_updated_frame: u32,
    /// `total_input_num` at the last vertex regeneration.
    pub vertex_input_num: u32,
}

/// One recorded sample of a trail.
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable,
)]
pub struct Node {
    /// World-space position.
    pub position: [f32; 3],
    /// Timestamp supplied at append time.
    pub time: f32,
    /// Per-node color.
    pub color: [f32; 4],
}

/// The node a simulation wants appended this frame, one per trail.
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable,
)]
pub struct InputNode {
    /// World-space position.
    pub position: [f32; 3],
    pub(crate) _pad: f32,
    /// Per-node color.
    pub color: [f32; 4],
}

impl InputNode {
    /// Input node at `position` with `color`.
    #[must_use]
    pub fn new(position: Vec3, color: Vec4) -> Self {
        Self {
            position: position.to_array(),
            _pad: 0.0,
            color: color.to_array(),
        }
    }
}

/// Axis-aligned bounding box. `min > max` marks an empty box.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Aabb {
    /// Minimum corner.
    pub min: [f32; 3],
    pub(crate) _pad_a: f32,
    /// Maximum corner.
    pub max: [f32; 3],
    pub(crate) _pad_b: f32,
}

impl Aabb {
    /// The box containing nothing.
    pub const EMPTY: Self = Self {
        min: [f32::MAX; 3],
        _pad_a: 0.0,
        max: [-f32::MAX; 3],
        _pad_b: 0.0,
    };

    /// Box spanning `min`..`max`.
    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min: min.to_array(),
            _pad_a: 0.0,
            max: max.to_array(),
            _pad_b: 0.0,
        }
    }

    /// Degenerate box around one point.
    #[must_use]
    pub fn from_point(p: Vec3) -> Self {
        Self::new(p, p)
    }

    /// `true` if the box contains no points.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_vec().cmpgt(self.max_vec()).any()
    }

    /// Smallest box containing both.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        Self::new(
            self.min_vec().min(other.min_vec()),
            self.max_vec().max(other.max_vec()),
        )
    }

    /// Grow every face outward by `amount`. Empty boxes stay empty.
    #[must_use]
    pub fn inflate(&self, amount: f32) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::new(
            self.min_vec() - Vec3::splat(amount),
            self.max_vec() + Vec3::splat(amount),
        )
    }

    /// Minimum corner as a vector.
    pub fn min_vec(&self) -> Vec3 {
        Vec3::from_array(self.min)
    }

    /// Maximum corner as a vector.
    pub fn max_vec(&self) -> Vec3 {
        Vec3::from_array(self.max)
    }
}

/// Ring slot the next node goes to after `total` appends.
#[inline]
#[must_use]
pub fn ring_slot(total: u32, capacity: u32) -> u32 {
    total % capacity
}

/// Ring slot of the node written `age` appends ago (0 = newest), clamped to
/// the oldest node still written. `None` if nothing was ever written.
#[must_use]
pub fn slot_by_age(total: u32, capacity: u32, age: u32) -> Option<u32> {
    if total == 0 {
        return None;
    }
    let written = total.min(capacity);
    let clamped = age.min(written - 1);
    Some(ring_slot(total - 1 - clamped, capacity))
}

/// Host-side ring with the same overwrite semantics as a GPU trail.
///
/// Used by diagnostics and tests to predict what the GPU ring holds.
#[derive(Debug, Clone)]
pub struct TrailRing {
    nodes: Vec<Vec3>,
    total: u32,
}

impl TrailRing {
    /// Empty ring with `capacity` slots.
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            nodes: vec![Vec3::ZERO; capacity as usize],
            total: 0,
        }
    }

    /// Append one position, overwriting the oldest once full.
    pub fn push(&mut self, position: Vec3) {
        let slot = ring_slot(self.total, self.capacity());
        self.nodes[slot as usize] = position;
        self.total = self.total.wrapping_add(1);
    }

    /// Ring capacity.
    pub fn capacity(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// Nodes ever appended.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Raw slot contents, in slot order.
    pub fn slots(&self) -> &[Vec3] {
        &self.nodes
    }

    /// Position written `age` appends ago, clamped to the oldest written
    /// node.
    pub fn by_age(&self, age: u32) -> Option<Vec3> {
        slot_by_age(self.total, self.capacity(), age)
            .map(|slot| self.nodes[slot as usize])
    }

    /// Most recently appended position.
    pub fn newest(&self) -> Option<Vec3> {
        self.by_age(0)
    }

    /// Written positions, oldest first.
    pub fn written(&self) -> Vec<Vec3> {
        let written = self.total.min(self.capacity());
        (0..written)
            .rev()
            .filter_map(|age| self.by_age(age))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_layout_sizes() {
        assert_eq!(size_of::<Trail>(), 16);
        assert_eq!(size_of::<Node>(), 32);
        assert_eq!(size_of::<InputNode>(), 32);
        assert_eq!(size_of::<Aabb>(), 32);
    }

    #[test]
    fn ring_wraps_after_capacity() {
        let mut ring = TrailRing::new(4);
        for i in 0..6 {
            ring.push(Vec3::splat(i as f32));
        }
        assert_eq!(ring.total(), 6);
        // Slots 0 and 1 were overwritten by appends 4 and 5.
        assert_eq!(ring.slots()[0], Vec3::splat(4.0));
        assert_eq!(ring.slots()[1], Vec3::splat(5.0));
        assert_eq!(ring.slots()[2], Vec3::splat(2.0));
        assert_eq!(ring.newest(), Some(Vec3::splat(5.0)));
        assert_eq!(
            ring.written(),
            vec![
                Vec3::splat(2.0),
                Vec3::splat(3.0),
                Vec3::splat(4.0),
                Vec3::splat(5.0)
            ]
        );
    }

    #[test]
    fn age_clamps_to_oldest_written() {
        let mut ring = TrailRing::new(8);
        assert_eq!(ring.by_age(0), None);
        ring.push(Vec3::X);
        ring.push(Vec3::Y);
        assert_eq!(ring.by_age(0), Some(Vec3::Y));
        assert_eq!(ring.by_age(1), Some(Vec3::X));
        assert_eq!(ring.by_age(7), Some(Vec3::X));
    }

    #[test]
    fn ring_slot_survives_counter_wrap() {
        // u32::MAX + 1 wraps to 0; capacity 64 divides 2^32 so slots stay
        // contiguous across the wrap.
        assert_eq!(ring_slot(u32::MAX, 64), 63);
        assert_eq!(ring_slot(u32::MAX.wrapping_add(1), 64), 0);
    }

    #[test]
    fn aabb_merge_and_empty() {
        let a = Aabb::from_point(Vec3::new(1.0, 2.0, 3.0));
        let b = Aabb::from_point(Vec3::new(-1.0, 5.0, 0.0));
        let m = a.merge(&b);
        assert_eq!(m.min_vec(), Vec3::new(-1.0, 2.0, 0.0));
        assert_eq!(m.max_vec(), Vec3::new(1.0, 5.0, 3.0));

        assert!(Aabb::EMPTY.is_empty());
        assert_eq!(Aabb::EMPTY.merge(&a), a);
        assert!(Aabb::EMPTY.inflate(1.0).is_empty());
        assert_eq!(a.inflate(0.5).min_vec(), Vec3::new(0.5, 1.5, 2.5));
    }
}
