//! Per-resolution sparse occupancy octree.
//!
//! Each resolution owns one octree over a cubic domain of 1 cm cells
//! sized to cover the workspace. Only non-empty subtrees are materialized;
//! nodes come from the shared [`NodePool`](super::pool::NodePool).
//!
//! Voxel identity is the 1 cm increment grid for every resolution, so the
//! tree descends to single-centimeter leaves regardless of the edge length
//! of the voxels it stores.

use super::coords::{GridCoordinates, IncrementCoordinates};
use super::pool::{NodeId, NodePool, PoolInner, NULL_NODE};
use super::resolution::VoxelResolution;
use super::voxel::VoxelPosition;
use glam::Vec3;
use std::sync::Arc;

/// Sparse occupancy map for one resolution.
pub struct SparseOctree {
    resolution: VoxelResolution,
    pool: Arc<NodePool>,
    root: NodeId,
    /// Minimum corner of the domain in increment space.
    origin: IncrementCoordinates,
    /// The root covers `2^depth` centimeter cells per axis.
    depth: u8,
    /// Occupied leaf count, maintained incrementally.
    count: usize,
    /// Nodes this tree currently holds in the pool.
    node_count: usize,
}

impl SparseOctree {
    pub fn new(resolution: VoxelResolution, workspace_size: Vec3, pool: Arc<NodePool>) -> Self {
        let (origin, depth) = Self::domain_for(workspace_size);
        Self {
            resolution,
            pool,
            root: NULL_NODE,
            origin,
            depth,
            count: 0,
            node_count: 0,
        }
    }

    /// Cubic domain covering the workspace: a power-of-two extent centered
    /// in X/Z and grounded at Y = 0.
    fn domain_for(workspace_size: Vec3) -> (IncrementCoordinates, u8) {
        let span_cm = workspace_size
            .max_element()
            .max(1.0)
            .mul_add(100.0, 0.5) as i64;
        let extent = (span_cm as u64).next_power_of_two().max(2) as i32;
        let origin = IncrementCoordinates::new(-extent / 2, 0, -extent / 2);
        (origin, extent.trailing_zeros() as u8)
    }

    #[inline]
    pub fn resolution(&self) -> VoxelResolution {
        self.resolution
    }

    #[inline]
    fn extent(&self) -> i32 {
        1i32 << self.depth
    }

    /// Whether an increment position falls inside the tree's domain.
    pub fn contains(&self, pos: IncrementCoordinates) -> bool {
        let g = GridCoordinates::from_increment(pos, self.origin);
        let e = self.extent();
        g.x >= 0 && g.x < e && g.y >= 0 && g.y < e && g.z >= 0 && g.z < e
    }

    /// Set the occupancy bit for a cell. Returns true iff the bit changed.
    pub fn set(&mut self, pos: IncrementCoordinates, value: bool) -> bool {
        if !self.contains(pos) {
            return false;
        }
        let local = GridCoordinates::from_increment(pos, self.origin);
        let extent = self.extent();
        let mut pool = self.pool.lock();

        if self.root == NULL_NODE {
            if !value {
                return false;
            }
            self.root = pool.alloc();
            self.node_count += 1;
        }

        let changed = Self::set_in(
            &mut pool,
            &mut self.node_count,
            self.root,
            extent,
            local,
            value,
        );
        if changed {
            if value {
                self.count += 1;
            } else {
                self.count -= 1;
            }
        }
        changed
    }

    fn set_in(
        pool: &mut PoolInner,
        node_count: &mut usize,
        node: NodeId,
        extent: i32,
        local: GridCoordinates,
        value: bool,
    ) -> bool {
        if extent == 1 {
            let leaf = pool.node_mut(node);
            if leaf.occupied == value {
                return false;
            }
            leaf.occupied = value;
            return true;
        }

        let half = extent / 2;
        let (index, child_local) = Self::child_of(local, half);
        let mut child = pool.node(node).children[index];
        if child == NULL_NODE {
            if !value {
                // Clearing an absent cell changes nothing.
                return false;
            }
            child = pool.alloc();
            pool.node_mut(node).children[index] = child;
            *node_count += 1;
        }
        Self::set_in(pool, node_count, child, half, child_local, value)
    }

    /// Read the occupancy bit. Absent cells are unoccupied.
    pub fn get(&self, pos: IncrementCoordinates) -> bool {
        if !self.contains(pos) || self.root == NULL_NODE {
            return false;
        }
        let pool = self.pool.lock();
        let mut node = self.root;
        let mut extent = self.extent();
        let mut local = GridCoordinates::from_increment(pos, self.origin);
        while extent > 1 {
            let half = extent / 2;
            let (index, child_local) = Self::child_of(local, half);
            node = pool.node(node).children[index];
            if node == NULL_NODE {
                return false;
            }
            extent = half;
            local = child_local;
        }
        pool.node(node).occupied
    }

    #[inline]
    fn child_of(local: GridCoordinates, half: i32) -> (usize, GridCoordinates) {
        let mut index = 0usize;
        let mut child = local;
        if local.x >= half {
            index |= 1;
            child.x -= half;
        }
        if local.y >= half {
            index |= 2;
            child.y -= half;
        }
        if local.z >= half {
            index |= 4;
            child.z -= half;
        }
        (index, child)
    }

    /// All occupied cells, in deterministic depth-first order.
    pub fn all_voxels(&self) -> Vec<IncrementCoordinates> {
        let mut out = Vec::with_capacity(self.count);
        if self.root == NULL_NODE {
            return out;
        }
        let pool = self.pool.lock();
        Self::collect(
            &pool,
            self.root,
            self.extent(),
            GridCoordinates::new(0, 0, 0),
            self.origin,
            &mut out,
        );
        out
    }

    fn collect(
        pool: &PoolInner,
        node: NodeId,
        extent: i32,
        base: GridCoordinates,
        origin: IncrementCoordinates,
        out: &mut Vec<IncrementCoordinates>,
    ) {
        if extent == 1 {
            if pool.node(node).occupied {
                out.push(base.to_increment(origin));
            }
            return;
        }
        let half = extent / 2;
        for (index, &child) in pool.node(node).children.iter().enumerate() {
            if child == NULL_NODE {
                continue;
            }
            let child_base = GridCoordinates::new(
                base.x + if index & 1 != 0 { half } else { 0 },
                base.y + if index & 2 != 0 { half } else { 0 },
                base.z + if index & 4 != 0 { half } else { 0 },
            );
            Self::collect(pool, child, half, child_base, origin, out);
        }
    }

    /// Occupied cells within an inclusive increment-space box, pruning
    /// subtrees that cannot intersect it.
    pub fn voxels_in_box(
        &self,
        min: IncrementCoordinates,
        max: IncrementCoordinates,
    ) -> Vec<IncrementCoordinates> {
        let mut out = Vec::new();
        if self.root == NULL_NODE {
            return out;
        }
        let extent = self.extent();
        let gmin = GridCoordinates::from_increment(min, self.origin);
        let gmax = GridCoordinates::from_increment(max, self.origin);
        let lo = GridCoordinates::new(gmin.x.max(0), gmin.y.max(0), gmin.z.max(0));
        let hi = GridCoordinates::new(
            gmax.x.min(extent - 1),
            gmax.y.min(extent - 1),
            gmax.z.min(extent - 1),
        );
        if lo.x > hi.x || lo.y > hi.y || lo.z > hi.z {
            return out;
        }
        let pool = self.pool.lock();
        Self::collect_in_box(
            &pool,
            self.root,
            extent,
            GridCoordinates::new(0, 0, 0),
            lo,
            hi,
            self.origin,
            &mut out,
        );
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_in_box(
        pool: &PoolInner,
        node: NodeId,
        extent: i32,
        base: GridCoordinates,
        lo: GridCoordinates,
        hi: GridCoordinates,
        origin: IncrementCoordinates,
        out: &mut Vec<IncrementCoordinates>,
    ) {
        if base.x > hi.x
            || base.y > hi.y
            || base.z > hi.z
            || base.x + extent - 1 < lo.x
            || base.y + extent - 1 < lo.y
            || base.z + extent - 1 < lo.z
        {
            return;
        }
        if extent == 1 {
            if pool.node(node).occupied {
                out.push(base.to_increment(origin));
            }
            return;
        }
        let half = extent / 2;
        for (index, &child) in pool.node(node).children.iter().enumerate() {
            if child == NULL_NODE {
                continue;
            }
            let child_base = GridCoordinates::new(
                base.x + if index & 1 != 0 { half } else { 0 },
                base.y + if index & 2 != 0 { half } else { 0 },
                base.z + if index & 4 != 0 { half } else { 0 },
            );
            Self::collect_in_box(pool, child, half, child_base, lo, hi, origin, out);
        }
    }

    /// Number of occupied cells. O(1).
    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Bytes held by this tree's nodes plus its own overhead.
    pub fn memory_bytes(&self) -> usize {
        self.node_count * NodePool::node_size_bytes() + std::mem::size_of::<Self>()
    }

    /// Collapse subtrees that contain no occupied leaf, releasing their
    /// nodes back to the pool. `get` results are preserved.
    pub fn optimize(&mut self) {
        if self.root == NULL_NODE {
            return;
        }
        let extent = self.extent();
        let mut pool = self.pool.lock();
        let root_occupied = Self::prune(&mut pool, &mut self.node_count, self.root, extent);
        if !root_occupied {
            pool.release(self.root);
            self.node_count -= 1;
            self.root = NULL_NODE;
        }
    }

    /// Returns whether the subtree holds any occupied leaf; empty children
    /// are released along the way.
    fn prune(pool: &mut PoolInner, node_count: &mut usize, node: NodeId, extent: i32) -> bool {
        if extent == 1 {
            return pool.node(node).occupied;
        }
        let half = extent / 2;
        let mut any = false;
        for index in 0..8 {
            let child = pool.node(node).children[index];
            if child == NULL_NODE {
                continue;
            }
            if Self::prune(pool, node_count, child, half) {
                any = true;
            } else {
                pool.release(child);
                *node_count -= 1;
                pool.node_mut(node).children[index] = NULL_NODE;
            }
        }
        any
    }

    /// Remove every voxel and release all nodes.
    pub fn clear(&mut self) {
        if self.root == NULL_NODE {
            self.count = 0;
            return;
        }
        let extent = self.extent();
        let mut pool = self.pool.lock();
        Self::release_subtree(&mut pool, &mut self.node_count, self.root, extent);
        self.root = NULL_NODE;
        self.count = 0;
        debug_assert_eq!(self.node_count, 0);
    }

    fn release_subtree(pool: &mut PoolInner, node_count: &mut usize, node: NodeId, extent: i32) {
        if extent > 1 {
            let half = extent / 2;
            for index in 0..8 {
                let child = pool.node(node).children[index];
                if child != NULL_NODE {
                    Self::release_subtree(pool, node_count, child, half);
                }
            }
        }
        pool.release(node);
        *node_count -= 1;
    }

    /// Whether every stored voxel (including its extent) would remain
    /// inside a workspace of `new_size`. The slack mirrors the engine's
    /// placement comparison so boundary voxels survive float rounding.
    pub fn can_resize(&self, new_size: Vec3) -> bool {
        const SLACK: f32 = 1e-5;
        let half_x = new_size.x * 0.5;
        let half_z = new_size.z * 0.5;
        self.all_voxels().into_iter().all(|inc| {
            let bounds = VoxelPosition::new(inc, self.resolution).world_bounds();
            bounds.min.x >= -half_x - SLACK
                && bounds.max.x <= half_x + SLACK
                && bounds.min.y >= -SLACK
                && bounds.max.y <= new_size.y + SLACK
                && bounds.min.z >= -half_z - SLACK
                && bounds.max.z <= half_z + SLACK
        })
    }

    /// Reconfigure the domain for a new workspace size, rebuilding the
    /// tree. Returns false and leaves the tree untouched if any stored
    /// voxel would fall outside the new bounds.
    pub fn resize(&mut self, new_size: Vec3) -> bool {
        if !self.can_resize(new_size) {
            return false;
        }
        let voxels = self.all_voxels();
        self.clear();
        let (origin, depth) = Self::domain_for(new_size);
        self.origin = origin;
        self.depth = depth;
        for inc in voxels {
            self.set(inc, true);
        }
        true
    }
}
