//! Coordinate spaces and conversions.
//!
//! The core distinguishes three coordinate kinds and never lets values
//! cross between them without an explicit conversion:
//! - [`WorldCoordinates`]: floating-point meters, origin centered in X/Z,
//!   Y measured upward from the ground plane.
//! - [`IncrementCoordinates`]: integer centimeters, the sole on-grid unit
//!   for voxel identity.
//! - [`GridCoordinates`]: integer cell indices local to one octree domain.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// Meters per increment (1 cm).
pub const METERS_PER_INCREMENT: f32 = 0.01;
/// Increments per meter.
pub const INCREMENTS_PER_METER: f32 = 100.0;
/// Tolerance used when deciding whether a world coordinate sits on the
/// 1 cm increment grid.
pub const GRID_EPSILON: f32 = 1e-4;

/// A position in world space (meters).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldCoordinates(pub Vec3);

impl WorldCoordinates {
    pub const ZERO: Self = Self(Vec3::ZERO);

    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self(Vec3::new(x, y, z))
    }

    #[inline]
    pub fn value(self) -> Vec3 {
        self.0
    }

    /// Convert to the nearest increment position (component-wise rounding).
    #[inline]
    pub fn to_increment(self) -> IncrementCoordinates {
        IncrementCoordinates::new(
            (self.0.x * INCREMENTS_PER_METER).round() as i32,
            (self.0.y * INCREMENTS_PER_METER).round() as i32,
            (self.0.z * INCREMENTS_PER_METER).round() as i32,
        )
    }

    /// True if every component is within [`GRID_EPSILON`] of a multiple
    /// of 0.01 m.
    pub fn is_on_increment_grid(self) -> bool {
        fn on_grid(v: f32) -> bool {
            let rem = (v.abs() % METERS_PER_INCREMENT).abs();
            rem < GRID_EPSILON || rem > METERS_PER_INCREMENT - GRID_EPSILON
        }
        on_grid(self.0.x) && on_grid(self.0.y) && on_grid(self.0.z)
    }
}

impl From<Vec3> for WorldCoordinates {
    fn from(v: Vec3) -> Self {
        Self(v)
    }
}

/// A position on the 1 cm increment grid (centimeters).
///
/// This is the canonical identity of a voxel, independent of resolution.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
pub struct IncrementCoordinates {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl IncrementCoordinates {
    pub const ZERO: Self = Self { x: 0, y: 0, z: 0 };

    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Convert to world space (meters).
    #[inline]
    pub fn to_world(self) -> WorldCoordinates {
        WorldCoordinates(Vec3::new(
            self.x as f32 * METERS_PER_INCREMENT,
            self.y as f32 * METERS_PER_INCREMENT,
            self.z as f32 * METERS_PER_INCREMENT,
        ))
    }

    /// True when the position sits on or above the ground plane.
    #[inline]
    pub fn is_above_ground(self) -> bool {
        self.y >= 0
    }
}

impl From<(i32, i32, i32)> for IncrementCoordinates {
    fn from((x, y, z): (i32, i32, i32)) -> Self {
        Self { x, y, z }
    }
}

impl From<[i32; 3]> for IncrementCoordinates {
    fn from([x, y, z]: [i32; 3]) -> Self {
        Self { x, y, z }
    }
}

impl Add for IncrementCoordinates {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for IncrementCoordinates {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<i32> for IncrementCoordinates {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: i32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Neg for IncrementCoordinates {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// A cell index local to one octree's domain (always non-negative while
/// inside the domain).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridCoordinates {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl GridCoordinates {
    #[inline]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Translate an increment position into an octree domain anchored at
    /// `origin`.
    #[inline]
    pub fn from_increment(inc: IncrementCoordinates, origin: IncrementCoordinates) -> Self {
        Self::new(inc.x - origin.x, inc.y - origin.y, inc.z - origin.z)
    }

    /// Translate back into increment space.
    #[inline]
    pub fn to_increment(self, origin: IncrementCoordinates) -> IncrementCoordinates {
        IncrementCoordinates::new(self.x + origin.x, self.y + origin.y, self.z + origin.z)
    }
}

/// The six axis-aligned face directions of a voxel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceDirection {
    PosX,
    NegX,
    PosY,
    NegY,
    PosZ,
    NegZ,
}

impl FaceDirection {
    pub const ALL: [FaceDirection; 6] = [
        FaceDirection::PosX,
        FaceDirection::NegX,
        FaceDirection::PosY,
        FaceDirection::NegY,
        FaceDirection::PosZ,
        FaceDirection::NegZ,
    ];

    /// Unit offset in increment space.
    #[inline]
    pub fn normal(self) -> IncrementCoordinates {
        match self {
            FaceDirection::PosX => IncrementCoordinates::new(1, 0, 0),
            FaceDirection::NegX => IncrementCoordinates::new(-1, 0, 0),
            FaceDirection::PosY => IncrementCoordinates::new(0, 1, 0),
            FaceDirection::NegY => IncrementCoordinates::new(0, -1, 0),
            FaceDirection::PosZ => IncrementCoordinates::new(0, 0, 1),
            FaceDirection::NegZ => IncrementCoordinates::new(0, 0, -1),
        }
    }
}
