//! Shared persistence types: versions, metadata, options, error taxonomy.

use crate::core::VoxelResolution;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// File format constants.
pub mod constants {
    /// Project file magic bytes.
    pub const MAGIC: [u8; 4] = *b"CVEF";
    /// Fixed project header size in bytes.
    pub const HEADER_SIZE: usize = 256;
    /// Maximum accepted chunk payload (100 MiB).
    pub const MAX_CHUNK_SIZE: u32 = 100 * 1024 * 1024;
    /// Maximum accepted length-prefixed string (1 MiB).
    pub const MAX_STRING_LEN: u32 = 1024 * 1024;
    /// Default project file extension.
    pub const FILE_EXTENSION: &str = "cvef";
    /// Suffix inserted before the extension of backup files.
    pub const BACKUP_SUFFIX: &str = ".bak";
    /// Suffix inserted before the extension of auto-save files.
    pub const AUTOSAVE_SUFFIX: &str = ".autosave";
}

/// A file format version, totally ordered lexicographically.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FileVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub build: u16,
}

impl FileVersion {
    pub const fn new(major: u16, minor: u16, patch: u16, build: u16) -> Self {
        Self {
            major,
            minor,
            patch,
            build,
        }
    }

    /// The version this crate writes.
    pub const fn current() -> Self {
        Self::new(1, 0, 0, 0)
    }

    /// A reader at `reader_version` accepts this file version when the
    /// majors match and the file's minor does not exceed the reader's.
    pub fn is_compatible(&self, reader_version: &FileVersion) -> bool {
        self.major == reader_version.major && self.minor <= reader_version.minor
    }
}

impl Default for FileVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.build)
    }
}

impl FromStr for FileVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('.').map(|p| p.parse::<u16>());
        let mut next = |name: &str| -> Result<u16, String> {
            match parts.next() {
                Some(Ok(v)) => Ok(v),
                Some(Err(e)) => Err(format!("bad {name} component: {e}")),
                None => Ok(0),
            }
        };
        let major = next("major")?;
        let minor = next("minor")?;
        let patch = next("patch")?;
        let build = next("build")?;
        Ok(Self::new(major, minor, patch, build))
    }
}

fn now_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Project metadata carried in the `META` chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub name: String,
    pub description: String,
    pub author: String,
    /// Seconds since the Unix epoch.
    pub created_seconds: u64,
    pub modified_seconds: u64,
    pub application: String,
    pub application_version: String,
    pub properties: BTreeMap<String, String>,
}

impl Default for ProjectMetadata {
    fn default() -> Self {
        let now = now_seconds();
        Self {
            name: "Untitled".to_string(),
            description: String::new(),
            author: String::new(),
            created_seconds: now,
            modified_seconds: now,
            application: "voxelcore".to_string(),
            application_version: env!("CARGO_PKG_VERSION").to_string(),
            properties: BTreeMap::new(),
        }
    }
}

impl ProjectMetadata {
    /// Refresh the modification timestamp.
    pub fn touch(&mut self) {
        self.modified_seconds = now_seconds();
    }
}

/// Workspace presentation settings carried in the `SETT` chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSettings {
    pub size: [f32; 3],
    /// Reserved; currently always zero.
    pub origin: [f32; 3],
    pub default_resolution: VoxelResolution,
    pub grid_visible: bool,
    pub axes_visible: bool,
    pub background_color: [f32; 4],
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            size: [5.0, 5.0, 5.0],
            origin: [0.0, 0.0, 0.0],
            default_resolution: VoxelResolution::Size1cm,
            grid_visible: true,
            axes_visible: true,
            background_color: [0.2, 0.2, 0.2, 1.0],
        }
    }
}

/// Options controlling a project save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOptions {
    pub compress: bool,
    /// Deflate level 0-9.
    pub compression_level: u32,
    pub include_history: bool,
    pub include_cache: bool,
    pub create_backup: bool,
    pub validate_before_save: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            compress: true,
            compression_level: 6,
            include_history: false,
            include_cache: false,
            create_backup: true,
            validate_before_save: true,
        }
    }
}

impl SaveOptions {
    /// No compression, no backup, no validation.
    pub fn fast() -> Self {
        Self {
            compress: false,
            create_backup: false,
            validate_before_save: false,
            ..Self::default()
        }
    }

    /// Maximum compression, no history or cache payloads.
    pub fn compact() -> Self {
        Self {
            compression_level: 9,
            include_history: false,
            include_cache: false,
            ..Self::default()
        }
    }

    /// Everything included, for debugging sessions.
    pub fn development() -> Self {
        Self {
            include_history: true,
            include_cache: true,
            ..Self::default()
        }
    }
}

/// Options controlling a project load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOptions {
    pub load_history: bool,
    pub load_cache: bool,
    pub validate_after_load: bool,
    pub upgrade_version: bool,
    pub ignore_version_mismatch: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            load_history: false,
            load_cache: false,
            validate_after_load: true,
            upgrade_version: true,
            ignore_version_mismatch: false,
        }
    }
}

impl LoadOptions {
    /// Strict validation, no version leniency.
    pub fn safe() -> Self {
        Self {
            validate_after_load: true,
            ignore_version_mismatch: false,
            ..Self::default()
        }
    }
}

/// STL output flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StlFormat {
    Binary,
    Ascii,
}

/// Output unit of an STL export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StlUnits {
    Millimeters,
    Centimeters,
    Meters,
    Inches,
}

impl StlUnits {
    /// Millimeters per unit.
    pub fn to_millimeters(self) -> f32 {
        match self {
            StlUnits::Millimeters => 1.0,
            StlUnits::Centimeters => 10.0,
            StlUnits::Meters => 1000.0,
            StlUnits::Inches => 25.4,
        }
    }
}

/// Options controlling an STL export.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StlExportOptions {
    pub format: StlFormat,
    pub units: StlUnits,
    pub scale: f32,
    pub merge_meshes: bool,
    pub validate_watertight: bool,
    pub translation: [f32; 3],
}

impl Default for StlExportOptions {
    fn default() -> Self {
        Self {
            format: StlFormat::Binary,
            units: StlUnits::Millimeters,
            scale: 1.0,
            merge_meshes: true,
            validate_watertight: true,
            translation: [0.0, 0.0, 0.0],
        }
    }
}

impl StlExportOptions {
    /// Millimeter binary output suitable for slicers.
    pub fn printing_3d() -> Self {
        Self::default()
    }

    /// Meter-unit ASCII output for CAD interchange.
    pub fn cad() -> Self {
        Self {
            format: StlFormat::Ascii,
            units: StlUnits::Meters,
            ..Self::default()
        }
    }
}

/// Statistics reported after an STL export.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StlExportStats {
    pub triangle_count: usize,
    pub vertex_count: usize,
    pub export_time_seconds: f32,
    pub file_size: u64,
    pub watertight: bool,
    pub warnings: Vec<String>,
}

/// Chunk identifiers: four ASCII bytes read as a little-endian u32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ChunkType {
    Metadata = u32::from_le_bytes(*b"META"),
    VoxelData = u32::from_le_bytes(*b"VOXE"),
    GroupData = u32::from_le_bytes(*b"GRUP"),
    CameraState = u32::from_le_bytes(*b"CAME"),
    SelectionData = u32::from_le_bytes(*b"SELE"),
    Settings = u32::from_le_bytes(*b"SETT"),
    CustomData = u32::from_le_bytes(*b"CUST"),
}

impl ChunkType {
    pub fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            x if x == ChunkType::Metadata as u32 => Some(ChunkType::Metadata),
            x if x == ChunkType::VoxelData as u32 => Some(ChunkType::VoxelData),
            x if x == ChunkType::GroupData as u32 => Some(ChunkType::GroupData),
            x if x == ChunkType::CameraState as u32 => Some(ChunkType::CameraState),
            x if x == ChunkType::SelectionData as u32 => Some(ChunkType::SelectionData),
            x if x == ChunkType::Settings as u32 => Some(ChunkType::Settings),
            x if x == ChunkType::CustomData as u32 => Some(ChunkType::CustomData),
            _ => None,
        }
    }
}

/// Errors surfaced by the persistence layer.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("file not found: {0}")]
    FileNotFound(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("disk full")]
    DiskFull,
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    #[error("version mismatch: file is {file}, reader is {reader}")]
    VersionMismatch {
        file: FileVersion,
        reader: FileVersion,
    },
    #[error("corrupted data: {0}")]
    CorruptedData(String),
    #[error("compression error: {0}")]
    CompressionError(String),
    #[error("write error: {0}")]
    WriteError(String),
    #[error("read error: {0}")]
    ReadError(String),
}

impl FileError {
    /// Map an I/O failure seen while reading.
    pub fn from_read(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => FileError::FileNotFound(err.to_string()),
            io::ErrorKind::PermissionDenied => FileError::AccessDenied(err.to_string()),
            io::ErrorKind::OutOfMemory => FileError::OutOfMemory,
            _ => FileError::ReadError(err.to_string()),
        }
    }

    /// Map an I/O failure seen while writing.
    pub fn from_write(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => FileError::AccessDenied(err.to_string()),
            io::ErrorKind::OutOfMemory => FileError::OutOfMemory,
            io::ErrorKind::StorageFull => FileError::DiskFull,
            _ => FileError::WriteError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        let a = FileVersion::new(1, 0, 0, 0);
        let b = FileVersion::new(1, 0, 1, 0);
        let c = FileVersion::new(2, 0, 0, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_version_compatibility() {
        let reader = FileVersion::new(1, 2, 0, 0);
        assert!(FileVersion::new(1, 0, 0, 0).is_compatible(&reader));
        assert!(FileVersion::new(1, 2, 5, 0).is_compatible(&reader));
        assert!(!FileVersion::new(1, 3, 0, 0).is_compatible(&reader));
        assert!(!FileVersion::new(2, 0, 0, 0).is_compatible(&reader));
    }

    #[test]
    fn test_version_string_roundtrip() {
        let v = FileVersion::new(1, 2, 3, 4);
        assert_eq!(v.to_string(), "1.2.3.4");
        assert_eq!("1.2.3.4".parse::<FileVersion>().unwrap(), v);
        assert_eq!(
            "2.1".parse::<FileVersion>().unwrap(),
            FileVersion::new(2, 1, 0, 0)
        );
        assert!("x.y".parse::<FileVersion>().is_err());
    }

    #[test]
    fn test_chunk_tags_are_ascii() {
        assert_eq!(ChunkType::Metadata as u32, u32::from_le_bytes(*b"META"));
        assert_eq!(ChunkType::from_u32(u32::from_le_bytes(*b"VOXE")), Some(ChunkType::VoxelData));
        assert_eq!(ChunkType::from_u32(0xDEAD_BEEF), None);
    }

    #[test]
    fn test_save_option_presets() {
        let fast = SaveOptions::fast();
        assert!(!fast.compress && !fast.create_backup && !fast.validate_before_save);
        let compact = SaveOptions::compact();
        assert_eq!(compact.compression_level, 9);
        assert!(!compact.include_history && !compact.include_cache);
    }

    #[test]
    fn test_unit_factors() {
        assert_eq!(StlUnits::Millimeters.to_millimeters(), 1.0);
        assert_eq!(StlUnits::Centimeters.to_millimeters(), 10.0);
        assert_eq!(StlUnits::Meters.to_millimeters(), 1000.0);
        assert_eq!(StlUnits::Inches.to_millimeters(), 25.4);
    }
}
