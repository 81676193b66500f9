//! The bounded, centered workspace in which voxels live.
//!
//! The workspace is centered in X and Z and grounded at Y = 0; each
//! dimension stays within [`MIN_WORKSPACE_SIZE`]..=[`MAX_WORKSPACE_SIZE`].

use glam::Vec3;

pub const MIN_WORKSPACE_SIZE: f32 = 2.0;
pub const MAX_WORKSPACE_SIZE: f32 = 8.0;
pub const DEFAULT_WORKSPACE_SIZE: f32 = 5.0;

/// Authoritative workspace dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Workspace {
    size: Vec3,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            size: Vec3::splat(DEFAULT_WORKSPACE_SIZE),
        }
    }

    pub fn with_size(size: Vec3) -> Option<Self> {
        Self::is_valid_size(size).then_some(Self { size })
    }

    /// Every component must lie in [2, 8] meters.
    pub fn is_valid_size(size: Vec3) -> bool {
        size.min_element() >= MIN_WORKSPACE_SIZE && size.max_element() <= MAX_WORKSPACE_SIZE
    }

    pub fn clamp_size(size: Vec3) -> Vec3 {
        size.clamp(
            Vec3::splat(MIN_WORKSPACE_SIZE),
            Vec3::splat(MAX_WORKSPACE_SIZE),
        )
    }

    #[inline]
    pub fn size(&self) -> Vec3 {
        self.size
    }

    #[inline]
    pub fn min_bounds(&self) -> Vec3 {
        Vec3::new(-self.size.x * 0.5, 0.0, -self.size.z * 0.5)
    }

    #[inline]
    pub fn max_bounds(&self) -> Vec3 {
        Vec3::new(self.size.x * 0.5, self.size.y, self.size.z * 0.5)
    }

    #[inline]
    pub fn center(&self) -> Vec3 {
        Vec3::new(0.0, self.size.y * 0.5, 0.0)
    }

    pub fn volume(&self) -> f32 {
        self.size.x * self.size.y * self.size.z
    }

    /// Whether a world position lies inside the workspace (inclusive).
    pub fn is_position_valid(&self, position: Vec3) -> bool {
        let min = self.min_bounds();
        let max = self.max_bounds();
        position.x >= min.x
            && position.x <= max.x
            && position.y >= min.y
            && position.y <= max.y
            && position.z >= min.z
            && position.z <= max.z
    }

    /// Clamp a world position onto the workspace bounds.
    pub fn clamp_position(&self, position: Vec3) -> Vec3 {
        position.clamp(self.min_bounds(), self.max_bounds())
    }

    /// Attempt a resize. The size must be in range and `validate` (held by
    /// the voxel engine) must confirm no stored voxel would be lost; on
    /// rejection the size is unchanged.
    pub fn set_size_with<F>(&mut self, new_size: Vec3, validate: F) -> bool
    where
        F: FnOnce(Vec3, Vec3) -> bool,
    {
        if !Self::is_valid_size(new_size) {
            return false;
        }
        if !validate(self.size, new_size) {
            return false;
        }
        self.size = new_size;
        true
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bounds() {
        let ws = Workspace::new();
        assert_eq!(ws.size(), Vec3::splat(5.0));
        assert_eq!(ws.min_bounds(), Vec3::new(-2.5, 0.0, -2.5));
        assert_eq!(ws.max_bounds(), Vec3::new(2.5, 5.0, 2.5));
        assert_eq!(ws.center(), Vec3::new(0.0, 2.5, 0.0));
    }

    #[test]
    fn test_size_range() {
        assert!(Workspace::is_valid_size(Vec3::splat(2.0)));
        assert!(Workspace::is_valid_size(Vec3::splat(8.0)));
        assert!(!Workspace::is_valid_size(Vec3::splat(1.9)));
        assert!(!Workspace::is_valid_size(Vec3::new(4.0, 9.0, 4.0)));
    }

    #[test]
    fn test_position_validation() {
        let ws = Workspace::new();
        assert!(ws.is_position_valid(Vec3::ZERO));
        assert!(ws.is_position_valid(Vec3::new(2.5, 5.0, -2.5)));
        assert!(!ws.is_position_valid(Vec3::new(0.0, -0.1, 0.0)));
        assert!(!ws.is_position_valid(Vec3::new(2.6, 0.0, 0.0)));
    }

    #[test]
    fn test_clamp_position() {
        let ws = Workspace::new();
        let clamped = ws.clamp_position(Vec3::new(10.0, -3.0, 0.0));
        assert_eq!(clamped, Vec3::new(2.5, 0.0, 0.0));
    }

    #[test]
    fn test_resize_respects_callback() {
        let mut ws = Workspace::new();
        assert!(!ws.set_size_with(Vec3::splat(4.0), |_, _| false));
        assert_eq!(ws.size(), Vec3::splat(5.0));
        assert!(ws.set_size_with(Vec3::splat(4.0), |old, new| {
            assert_eq!(old, Vec3::splat(5.0));
            assert_eq!(new, Vec3::splat(4.0));
            true
        }));
        assert_eq!(ws.size(), Vec3::splat(4.0));
    }

    #[test]
    fn test_out_of_range_skips_callback() {
        let mut ws = Workspace::new();
        assert!(!ws.set_size_with(Vec3::splat(1.0), |_, _| panic!("must not be called")));
    }
}
