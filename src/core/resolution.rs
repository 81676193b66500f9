//! The ten fixed voxel resolutions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Edge length of a voxel, named in centimeters.
///
/// Exactly ten resolutions exist; no other edge lengths are expressible.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum VoxelResolution {
    Size1cm = 0,
    Size2cm = 1,
    Size4cm = 2,
    Size8cm = 3,
    Size16cm = 4,
    Size32cm = 5,
    Size64cm = 6,
    Size128cm = 7,
    Size256cm = 8,
    Size512cm = 9,
}

impl VoxelResolution {
    pub const COUNT: usize = 10;

    pub const ALL: [VoxelResolution; Self::COUNT] = [
        VoxelResolution::Size1cm,
        VoxelResolution::Size2cm,
        VoxelResolution::Size4cm,
        VoxelResolution::Size8cm,
        VoxelResolution::Size16cm,
        VoxelResolution::Size32cm,
        VoxelResolution::Size64cm,
        VoxelResolution::Size128cm,
        VoxelResolution::Size256cm,
        VoxelResolution::Size512cm,
    ];

    /// Edge length in centimeters.
    #[inline]
    pub const fn size_cm(self) -> i32 {
        1 << (self as u8)
    }

    /// Edge length in meters.
    #[inline]
    pub fn size_meters(self) -> f32 {
        self.size_cm() as f32 * 0.01
    }

    /// Stable discriminant used by the wire formats.
    #[inline]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Inverse of [`VoxelResolution::index`]; `None` for an unknown
    /// discriminant.
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(VoxelResolution::Size1cm),
            1 => Some(VoxelResolution::Size2cm),
            2 => Some(VoxelResolution::Size4cm),
            3 => Some(VoxelResolution::Size8cm),
            4 => Some(VoxelResolution::Size16cm),
            5 => Some(VoxelResolution::Size32cm),
            6 => Some(VoxelResolution::Size64cm),
            7 => Some(VoxelResolution::Size128cm),
            8 => Some(VoxelResolution::Size256cm),
            9 => Some(VoxelResolution::Size512cm),
            _ => None,
        }
    }
}

impl Default for VoxelResolution {
    fn default() -> Self {
        VoxelResolution::Size1cm
    }
}

impl fmt::Display for VoxelResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}cm", self.size_cm())
    }
}
