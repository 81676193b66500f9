//! Voxel identity and placement geometry.

use super::bounds::Aabb;
use super::coords::IncrementCoordinates;
use super::resolution::VoxelResolution;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// A stored voxel: an increment position paired with a resolution.
///
/// Placement follows the bottom-center convention: the increment Y is the
/// voxel's bottom face, while X and Z locate its horizontal center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoxelPosition {
    pub increment: IncrementCoordinates,
    pub resolution: VoxelResolution,
}

impl VoxelPosition {
    #[inline]
    pub fn new(increment: IncrementCoordinates, resolution: VoxelResolution) -> Self {
        Self {
            increment,
            resolution,
        }
    }

    /// World-space axis-aligned bounds of the voxel.
    pub fn world_bounds(&self) -> Aabb {
        let center = self.increment.to_world().value();
        let size = self.resolution.size_meters();
        let half = size * 0.5;
        Aabb::new(
            Vec3::new(center.x - half, center.y, center.z - half),
            Vec3::new(center.x + half, center.y + size, center.z + half),
        )
    }

    /// Edge length in increments (centimeters).
    #[inline]
    pub fn size_increments(&self) -> i32 {
        self.resolution.size_cm()
    }
}

/// Shrink applied to every interval in the overlap test so that voxels
/// sharing a face do not register as overlapping.
pub const COLLISION_EPSILON: f32 = 1e-4;

/// Whether a prospective voxel collides with an existing one.
///
/// Face-adjacent voxels coexist (the epsilon shrinks every interval), and
/// a strictly smaller prospective voxel may sit on or inside a larger one
/// for detail work.
pub fn placements_overlap(prospective: &VoxelPosition, existing: &VoxelPosition) -> bool {
    let a = prospective.world_bounds();
    let b = existing.world_bounds();

    let overlaps = a.min.x < b.max.x - COLLISION_EPSILON
        && a.max.x > b.min.x + COLLISION_EPSILON
        && a.min.y < b.max.y - COLLISION_EPSILON
        && a.max.y > b.min.y + COLLISION_EPSILON
        && a.min.z < b.max.z - COLLISION_EPSILON
        && a.max.z > b.min.z + COLLISION_EPSILON;

    if !overlaps {
        return false;
    }

    // Detail-work exception: a strictly smaller voxel may be placed on or
    // inside a larger one.
    prospective.resolution.size_cm() >= existing.resolution.size_cm()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coords::METERS_PER_INCREMENT;

    #[test]
    fn test_bottom_center_bounds() {
        let v = VoxelPosition::new(IncrementCoordinates::new(0, 0, 0), VoxelResolution::Size4cm);
        let b = v.world_bounds();
        assert!((b.min.x - -0.02).abs() < 1e-6);
        assert!((b.max.x - 0.02).abs() < 1e-6);
        assert!((b.min.y - 0.0).abs() < 1e-6);
        assert!((b.max.y - 0.04).abs() < 1e-6);
    }

    #[test]
    fn test_face_adjacent_voxels_do_not_overlap() {
        let a = VoxelPosition::new(IncrementCoordinates::new(0, 0, 0), VoxelResolution::Size1cm);
        let b = VoxelPosition::new(IncrementCoordinates::new(1, 0, 0), VoxelResolution::Size1cm);
        assert!(!placements_overlap(&b, &a));
        assert!(!placements_overlap(&a, &b));
    }

    #[test]
    fn test_same_size_intrusion_overlaps() {
        let a = VoxelPosition::new(IncrementCoordinates::new(0, 0, 0), VoxelResolution::Size4cm);
        let b = VoxelPosition::new(IncrementCoordinates::new(2, 0, 2), VoxelResolution::Size4cm);
        assert!(placements_overlap(&b, &a));
    }

    #[test]
    fn test_detail_work_exception() {
        let big = VoxelPosition::new(IncrementCoordinates::new(0, 0, 0), VoxelResolution::Size32cm);
        let small = VoxelPosition::new(IncrementCoordinates::new(0, 8, 0), VoxelResolution::Size1cm);
        assert!(!placements_overlap(&small, &big));
        // The reverse direction is still a collision.
        assert!(placements_overlap(&big, &small));
    }

    #[test]
    fn test_increment_unit_matches_world() {
        let v = VoxelPosition::new(IncrementCoordinates::new(7, 0, 0), VoxelResolution::Size2cm);
        let b = v.world_bounds();
        assert!((b.size().x - 2.0 * METERS_PER_INCREMENT).abs() < 1e-6);
    }
}
