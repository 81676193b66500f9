//! Full-state capture and restore.
//!
//! A snapshot streams every octree into `(resolution, count, coords...)`
//! records, remembers the active resolution, and carries opaque
//! selection/camera/render blobs owned by those subsystems. The voxel
//! stream can be RLE-compressed in place; compression is idempotent and
//! tracked by a flag.
//!
//! On disk a snapshot is `SNAP`, a u32 version, an i64 timestamp, a
//! length-prefixed description, a flags byte, then one length-prefixed
//! blob per present section.

use crate::core::{IncrementCoordinates, VoxelEngine, VoxelResolution};
use crate::io::binary::{BinaryReader, BinaryWriter};
use crate::io::compression::{rle_decode, rle_encode};
use crate::io::{FileError, FileVersion};
use log::{info, warn};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const SNAPSHOT_MAGIC: [u8; 4] = *b"SNAP";
const SNAPSHOT_VERSION: u32 = 1;

const FLAG_VOXELS: u8 = 0x01;
const FLAG_SELECTIONS: u8 = 0x02;
const FLAG_CAMERA: u8 = 0x04;
const FLAG_RENDER: u8 = 0x08;

#[derive(Debug, Clone)]
struct VoxelSection {
    data: Vec<u8>,
    uncompressed_size: u32,
    compressed: bool,
    active_resolution: VoxelResolution,
}

/// A captured core state suitable for fast restore.
#[derive(Debug, Clone)]
pub struct StateSnapshot {
    timestamp_seconds: i64,
    description: String,
    voxels: Option<VoxelSection>,
    selections: Option<Vec<u8>>,
    camera: Option<Vec<u8>>,
    render_settings: Option<Vec<u8>>,
}

impl StateSnapshot {
    pub fn new(description: impl Into<String>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self {
            timestamp_seconds: timestamp,
            description: description.into(),
            voxels: None,
            selections: None,
            camera: None,
            render_settings: None,
        }
    }

    /// Capture the engine's voxel state into a fresh snapshot.
    pub fn of_voxels(engine: &VoxelEngine, description: impl Into<String>) -> Self {
        let mut snapshot = Self::new(description);
        snapshot.capture_voxels(engine);
        snapshot
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn timestamp_seconds(&self) -> i64 {
        self.timestamp_seconds
    }

    pub fn has_voxels(&self) -> bool {
        self.voxels.is_some()
    }

    /// Serialize every octree into the snapshot's voxel stream.
    pub fn capture_voxels(&mut self, engine: &VoxelEngine) {
        let mut data = Vec::new();
        let mut total = 0usize;
        for resolution in VoxelResolution::ALL {
            let voxels = engine.all_voxels(resolution);
            total += voxels.len();
            data.push(resolution.index());
            data.extend_from_slice(&(voxels.len() as u32).to_le_bytes());
            for voxel in voxels {
                data.extend_from_slice(&voxel.increment.x.to_le_bytes());
                data.extend_from_slice(&voxel.increment.y.to_le_bytes());
                data.extend_from_slice(&voxel.increment.z.to_le_bytes());
            }
        }
        info!("captured snapshot of {total} voxels");
        self.voxels = Some(VoxelSection {
            uncompressed_size: data.len() as u32,
            data,
            compressed: false,
            active_resolution: engine.active_resolution(),
        });
    }

    /// Clear the engine and replay the captured voxel stream into it.
    pub fn restore_voxels(&self, engine: &VoxelEngine) -> Result<(), FileError> {
        let section = self.voxels.as_ref().ok_or_else(|| {
            FileError::InvalidFormat("snapshot has no voxel section".to_string())
        })?;
        let data = if section.compressed {
            rle_decode(&section.data)?
        } else {
            section.data.clone()
        };

        let mut reader = BinaryReader::new(data.as_slice());
        let mut sections: Vec<(VoxelResolution, Vec<IncrementCoordinates>)> =
            Vec::with_capacity(VoxelResolution::COUNT);
        for _ in 0..VoxelResolution::COUNT {
            let raw = reader.read_u8()?;
            let resolution = VoxelResolution::from_index(raw).ok_or_else(|| {
                FileError::CorruptedData(format!("unknown resolution tag {raw} in snapshot"))
            })?;
            let count = reader.read_u32()?;
            let mut coords = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let x = reader.read_i32()?;
                let y = reader.read_i32()?;
                let z = reader.read_i32()?;
                coords.push(IncrementCoordinates::new(x, y, z));
            }
            sections.push((resolution, coords));
        }

        engine.clear_all();
        engine.set_active_resolution(section.active_resolution);

        // Largest resolution first: detail voxels inside bigger ones are
        // only accepted once the bigger ones exist.
        sections.sort_by_key(|(resolution, _)| std::cmp::Reverse(resolution.size_cm()));
        let mut failures = 0usize;
        for (resolution, coords) in sections {
            for pos in coords {
                if !engine.set(pos, resolution, true) {
                    failures += 1;
                }
            }
        }
        if failures > 0 {
            warn!("snapshot restore skipped {failures} voxels");
        }
        Ok(())
    }

    pub fn set_selections(&mut self, blob: Vec<u8>) {
        self.selections = Some(blob);
    }

    pub fn selections(&self) -> Option<&[u8]> {
        self.selections.as_deref()
    }

    pub fn set_camera(&mut self, blob: Vec<u8>) {
        self.camera = Some(blob);
    }

    pub fn camera(&self) -> Option<&[u8]> {
        self.camera.as_deref()
    }

    pub fn set_render_settings(&mut self, blob: Vec<u8>) {
        self.render_settings = Some(blob);
    }

    pub fn render_settings(&self) -> Option<&[u8]> {
        self.render_settings.as_deref()
    }

    pub fn is_compressed(&self) -> bool {
        self.voxels.as_ref().is_some_and(|v| v.compressed)
    }

    /// RLE-compress the voxel stream in place. Applied only if it
    /// shrinks the payload; compressing twice is a no-op.
    pub fn compress(&mut self) {
        let Some(section) = self.voxels.as_mut() else {
            return;
        };
        if section.compressed {
            return;
        }
        let packed = rle_encode(&section.data);
        if packed.len() < section.data.len() {
            info!(
                "snapshot voxel stream compressed {} -> {} bytes",
                section.data.len(),
                packed.len()
            );
            section.data = packed;
            section.compressed = true;
        }
    }

    /// Undo [`StateSnapshot::compress`].
    pub fn decompress(&mut self) -> Result<(), FileError> {
        let Some(section) = self.voxels.as_mut() else {
            return Ok(());
        };
        if !section.compressed {
            return Ok(());
        }
        section.data = rle_decode(&section.data)?;
        section.compressed = false;
        Ok(())
    }

    /// Canonical (decompressed) voxel stream, for state comparison.
    pub fn voxel_stream(&self) -> Option<Vec<u8>> {
        let section = self.voxels.as_ref()?;
        if section.compressed {
            rle_decode(&section.data).ok()
        } else {
            Some(section.data.clone())
        }
    }

    pub fn memory_usage(&self) -> usize {
        let mut size = std::mem::size_of::<Self>() + self.description.capacity();
        if let Some(section) = &self.voxels {
            size += section.data.capacity();
        }
        for blob in [&self.selections, &self.camera, &self.render_settings] {
            if let Some(blob) = blob {
                size += blob.capacity();
            }
        }
        size
    }

    fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.voxels.is_some() {
            flags |= FLAG_VOXELS;
        }
        if self.selections.is_some() {
            flags |= FLAG_SELECTIONS;
        }
        if self.camera.is_some() {
            flags |= FLAG_CAMERA;
        }
        if self.render_settings.is_some() {
            flags |= FLAG_RENDER;
        }
        flags
    }

    /// Write the snapshot to a writer in the `SNAP` format.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), FileError> {
        let mut w = BinaryWriter::new(writer);
        w.write_bytes(&SNAPSHOT_MAGIC)?;
        w.write_u32(SNAPSHOT_VERSION)?;
        w.write_i64(self.timestamp_seconds)?;
        w.write_string(&self.description)?;
        w.write_u8(self.flags())?;

        if let Some(section) = &self.voxels {
            let mut inner = Vec::new();
            {
                let mut iw = BinaryWriter::new(&mut inner);
                iw.write_u8(section.active_resolution.index())?;
                iw.write_bool(section.compressed)?;
                iw.write_u32(section.uncompressed_size)?;
                iw.write_blob(&section.data)?;
            }
            w.write_blob(&inner)?;
        }
        for blob in [&self.selections, &self.camera, &self.render_settings] {
            if let Some(blob) = blob {
                w.write_blob(blob)?;
            }
        }
        w.flush()
    }

    /// Read a snapshot written by [`StateSnapshot::write_to`].
    pub fn read_from<R: Read>(reader: R) -> Result<Self, FileError> {
        let mut r = BinaryReader::new(reader);
        let magic = r.read_bytes(4)?;
        if magic != SNAPSHOT_MAGIC {
            return Err(FileError::InvalidFormat("bad snapshot magic".to_string()));
        }
        let version = r.read_u32()?;
        if version != SNAPSHOT_VERSION {
            return Err(FileError::VersionMismatch {
                file: FileVersion::new(version as u16, 0, 0, 0),
                reader: FileVersion::new(SNAPSHOT_VERSION as u16, 0, 0, 0),
            });
        }
        let timestamp_seconds = r.read_i64()?;
        let description = r.read_string()?;
        let flags = r.read_u8()?;

        let mut snapshot = Self {
            timestamp_seconds,
            description,
            voxels: None,
            selections: None,
            camera: None,
            render_settings: None,
        };

        if flags & FLAG_VOXELS != 0 {
            let outer = r.read_blob()?;
            let mut ir = BinaryReader::new(outer.as_slice());
            let raw = ir.read_u8()?;
            let active_resolution = VoxelResolution::from_index(raw).ok_or_else(|| {
                FileError::CorruptedData(format!("unknown active resolution {raw}"))
            })?;
            let compressed = ir.read_bool()?;
            let uncompressed_size = ir.read_u32()?;
            let data = ir.read_blob()?;
            snapshot.voxels = Some(VoxelSection {
                data,
                uncompressed_size,
                compressed,
                active_resolution,
            });
        }
        if flags & FLAG_SELECTIONS != 0 {
            snapshot.selections = Some(r.read_blob()?);
        }
        if flags & FLAG_CAMERA != 0 {
            snapshot.camera = Some(r.read_blob()?);
        }
        if flags & FLAG_RENDER != 0 {
            snapshot.render_settings = Some(r.read_blob()?);
        }
        Ok(snapshot)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), FileError> {
        let file = File::create(path).map_err(FileError::from_write)?;
        self.write_to(BufWriter::new(file))
    }

    pub fn load_from_file(path: &Path) -> Result<Self, FileError> {
        let file = File::open(path).map_err(FileError::from_read)?;
        Self::read_from(BufReader::new(file))
    }
}

/// Two snapshots are equal when their captured content matches;
/// timestamps and descriptions are not part of the comparison.
impl PartialEq for StateSnapshot {
    fn eq(&self, other: &Self) -> bool {
        let voxels_match = match (&self.voxels, &other.voxels) {
            (None, None) => true,
            (Some(a), Some(b)) => {
                a.active_resolution == b.active_resolution
                    && self.voxel_stream() == other.voxel_stream()
            }
            _ => false,
        };
        voxels_match
            && self.selections == other.selections
            && self.camera == other.camera
            && self.render_settings == other.render_settings
    }
}
