//! The chunked project container.
//!
//! A project file is a fixed 256-byte header followed by typed chunks.
//! Every chunk carries its stored size, its uncompressed size (equal when
//! the chunk is not compressed) and a CRC-32 of the stored payload.
//! Unknown chunk types are skipped; a CRC mismatch fails the load.

use super::binary::{BinaryReader, BinaryWriter};
use super::compression::{crc32, deflate_compress, deflate_decompress};
use super::project::Project;
use super::types::{
    constants, ChunkType, FileError, FileVersion, LoadOptions, ProjectMetadata, SaveOptions,
    WorkspaceSettings,
};
use crate::core::{IncrementCoordinates, VoxelResolution};
use glam::Vec3;
use log::{debug, warn};
use std::io::{Read, Write};

/// Bit 0 of `compression_flags`: chunk payloads may be deflated.
pub const COMPRESSION_FLAG_CHUNKS: u32 = 1;

const RESERVED_BYTES: usize = 220;

/// The fixed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub version: FileVersion,
    /// Total file size in bytes; 0 is a valid sentinel for stream writes.
    pub file_size: u64,
    pub compression_flags: u32,
    /// Checksum of everything after the header; 0 is a valid sentinel
    /// for stream writes.
    pub checksum: u64,
}

impl FileHeader {
    pub fn new(compression_flags: u32) -> Self {
        Self {
            version: FileVersion::current(),
            file_size: 0,
            compression_flags,
            checksum: 0,
        }
    }

    pub fn is_chunk_compressed(&self) -> bool {
        self.compression_flags & COMPRESSION_FLAG_CHUNKS != 0
    }
}

/// Rolling 64-bit checksum over the chunk stream (shift-xor).
pub fn checksum64(data: &[u8]) -> u64 {
    let mut checksum = 0u64;
    for &byte in data {
        checksum = (checksum << 1) ^ byte as u64;
    }
    checksum
}

pub fn write_header<W: Write>(
    writer: &mut BinaryWriter<W>,
    header: &FileHeader,
) -> Result<(), FileError> {
    writer.write_bytes(&constants::MAGIC)?;
    writer.write_u16(header.version.major)?;
    writer.write_u16(header.version.minor)?;
    writer.write_u16(header.version.patch)?;
    writer.write_u16(0)?; // padding
    writer.write_u64(header.file_size)?;
    writer.write_u32(header.compression_flags)?;
    writer.write_u32(0)?; // padding
    writer.write_u64(header.checksum)?;
    writer.write_bytes(&[0u8; RESERVED_BYTES])
}

pub fn read_header<R: Read>(reader: &mut BinaryReader<R>) -> Result<FileHeader, FileError> {
    let magic = reader.read_bytes(4)?;
    if magic != constants::MAGIC {
        return Err(FileError::InvalidFormat("bad file magic".to_string()));
    }
    let major = reader.read_u16()?;
    let minor = reader.read_u16()?;
    let patch = reader.read_u16()?;
    reader.read_u16()?; // padding
    let file_size = reader.read_u64()?;
    let compression_flags = reader.read_u32()?;
    reader.read_u32()?; // padding
    let checksum = reader.read_u64()?;
    reader.read_bytes(RESERVED_BYTES)?;

    if major == 0 {
        return Err(FileError::InvalidFormat(
            "file version major must be nonzero".to_string(),
        ));
    }
    Ok(FileHeader {
        version: FileVersion::new(major, minor, patch, 0),
        file_size,
        compression_flags,
        checksum,
    })
}

struct ChunkHeader {
    raw_type: u32,
    size: u32,
    uncompressed_size: u32,
    checksum: u32,
}

fn write_chunk<W: Write>(
    writer: &mut BinaryWriter<W>,
    chunk_type: ChunkType,
    payload: &[u8],
    compress_level: Option<u32>,
) -> Result<(), FileError> {
    let mut stored = None;
    if let Some(level) = compress_level {
        let packed = deflate_compress(payload, level)?;
        if packed.len() < payload.len() {
            stored = Some(packed);
        }
    }
    let stored = stored.as_deref().unwrap_or(payload);

    writer.write_u32(chunk_type as u32)?;
    writer.write_u32(stored.len() as u32)?;
    writer.write_u32(payload.len() as u32)?;
    writer.write_u32(crc32(stored))?;
    writer.write_bytes(stored)
}

/// Read the next chunk header, or `None` at a clean end of stream.
fn read_chunk_header<R: Read>(
    reader: &mut BinaryReader<R>,
) -> Result<Option<ChunkHeader>, FileError> {
    let Some(raw_type) = reader.try_read_u32()? else {
        return Ok(None);
    };
    let size = reader.read_u32()?;
    let uncompressed_size = reader.read_u32()?;
    let checksum = reader.read_u32()?;
    if size > constants::MAX_CHUNK_SIZE || uncompressed_size > constants::MAX_CHUNK_SIZE {
        return Err(FileError::CorruptedData(format!(
            "chunk size {size} exceeds limit"
        )));
    }
    Ok(Some(ChunkHeader {
        raw_type,
        size,
        uncompressed_size,
        checksum,
    }))
}

/// Read and verify one chunk payload, inflating it if stored compressed.
fn read_chunk_payload<R: Read>(
    reader: &mut BinaryReader<R>,
    header: &ChunkHeader,
) -> Result<Vec<u8>, FileError> {
    let stored = reader.read_bytes(header.size as usize)?;
    if crc32(&stored) != header.checksum {
        return Err(FileError::CorruptedData(
            "chunk checksum mismatch".to_string(),
        ));
    }
    if header.size != header.uncompressed_size {
        deflate_decompress(&stored, header.uncompressed_size as usize)
    } else {
        Ok(stored)
    }
}

/// Write the full project: header then chunks. The stream path leaves
/// `file_size` and `checksum` at their zero sentinels; file-based savers
/// write the chunk stream separately and fill both in.
pub fn write_project<W: Write>(
    writer: &mut BinaryWriter<W>,
    project: &Project,
    options: &SaveOptions,
) -> Result<(), FileError> {
    let flags = if options.compress {
        COMPRESSION_FLAG_CHUNKS
    } else {
        0
    };
    write_header(writer, &FileHeader::new(flags))?;
    write_chunks(writer, project, options)
}

/// Write every chunk of the project, in a fixed order: settings precede
/// voxel data so a loader has the right workspace before placing voxels.
pub fn write_chunks<W: Write>(
    writer: &mut BinaryWriter<W>,
    project: &Project,
    options: &SaveOptions,
) -> Result<(), FileError> {
    let level = options.compress.then_some(options.compression_level);

    write_chunk(
        writer,
        ChunkType::Metadata,
        &encode_metadata(&project.metadata)?,
        level,
    )?;
    write_chunk(
        writer,
        ChunkType::Settings,
        &encode_settings(&project.effective_settings())?,
        level,
    )?;
    write_chunk(
        writer,
        ChunkType::VoxelData,
        &encode_voxel_data(project)?,
        level,
    )?;
    write_chunk(
        writer,
        ChunkType::SelectionData,
        &encode_selections(project)?,
        level,
    )?;
    if let Some(camera) = &project.camera {
        write_chunk(writer, ChunkType::CameraState, camera, level)?;
    }
    if let Some(groups) = &project.groups {
        write_chunk(writer, ChunkType::GroupData, groups, level)?;
    }
    for (key, data) in &project.custom_data {
        write_chunk(writer, ChunkType::CustomData, &encode_custom(key, data)?, level)?;
    }
    writer.flush()
}

/// Read a project from a stream positioned at the header.
pub fn read_project<R: Read>(
    reader: &mut BinaryReader<R>,
    options: &LoadOptions,
) -> Result<(Project, FileHeader), FileError> {
    let header = read_header(reader)?;
    let current = FileVersion::current();
    if !header.version.is_compatible(&current) && !options.ignore_version_mismatch {
        return Err(FileError::VersionMismatch {
            file: header.version,
            reader: current,
        });
    }

    let mut project = Project::new();
    read_chunks(reader, &mut project, options)?;
    Ok((project, header))
}

/// Read chunks until end of stream, applying each to the project.
pub fn read_chunks<R: Read>(
    reader: &mut BinaryReader<R>,
    project: &mut Project,
    _options: &LoadOptions,
) -> Result<(), FileError> {
    while let Some(chunk) = read_chunk_header(reader)? {
        match ChunkType::from_u32(chunk.raw_type) {
            Some(ChunkType::Metadata) => {
                let payload = read_chunk_payload(reader, &chunk)?;
                project.metadata = decode_metadata(&payload)?;
            }
            Some(ChunkType::Settings) => {
                let payload = read_chunk_payload(reader, &chunk)?;
                let settings = decode_settings(&payload)?;
                apply_settings(project, settings);
            }
            Some(ChunkType::VoxelData) => {
                let payload = read_chunk_payload(reader, &chunk)?;
                decode_voxel_data(&payload, project)?;
            }
            Some(ChunkType::SelectionData) => {
                let payload = read_chunk_payload(reader, &chunk)?;
                decode_selections(&payload, project)?;
            }
            Some(ChunkType::CameraState) => {
                project.camera = Some(read_chunk_payload(reader, &chunk)?);
            }
            Some(ChunkType::GroupData) => {
                project.groups = Some(read_chunk_payload(reader, &chunk)?);
            }
            Some(ChunkType::CustomData) => {
                let payload = read_chunk_payload(reader, &chunk)?;
                let (key, data) = decode_custom(&payload)?;
                project.custom_data.insert(key, data);
            }
            None => {
                debug!("skipping unknown chunk type {:#010x}", chunk.raw_type);
                reader.skip(chunk.size as u64)?;
            }
        }
    }
    Ok(())
}

fn apply_settings(project: &mut Project, settings: WorkspaceSettings) {
    let size = Vec3::from_array(settings.size);
    if !project.engine.resize_workspace(size) && project.engine.workspace_size() != size {
        warn!(
            "could not apply workspace size ({}, {}, {}) from file",
            size.x, size.y, size.z
        );
    }
    project.engine.set_active_resolution(settings.default_resolution);
    project.workspace = settings;
}

fn encode_metadata(metadata: &ProjectMetadata) -> Result<Vec<u8>, FileError> {
    let mut buffer = Vec::new();
    let mut w = BinaryWriter::new(&mut buffer);
    w.write_string(&metadata.name)?;
    w.write_string(&metadata.description)?;
    w.write_string(&metadata.author)?;
    w.write_u64(metadata.created_seconds)?;
    w.write_u64(metadata.modified_seconds)?;
    w.write_string(&metadata.application)?;
    w.write_string(&metadata.application_version)?;
    w.write_u32(metadata.properties.len() as u32)?;
    for (key, value) in &metadata.properties {
        w.write_string(key)?;
        w.write_string(value)?;
    }
    Ok(buffer)
}

fn decode_metadata(payload: &[u8]) -> Result<ProjectMetadata, FileError> {
    let mut r = BinaryReader::new(payload);
    let mut metadata = ProjectMetadata {
        name: r.read_string()?,
        description: r.read_string()?,
        author: r.read_string()?,
        created_seconds: r.read_u64()?,
        modified_seconds: r.read_u64()?,
        application: r.read_string()?,
        application_version: r.read_string()?,
        ..ProjectMetadata::default()
    };
    metadata.properties.clear();
    let count = r.read_u32()?;
    for _ in 0..count {
        let key = r.read_string()?;
        let value = r.read_string()?;
        metadata.properties.insert(key, value);
    }
    Ok(metadata)
}

fn encode_settings(settings: &WorkspaceSettings) -> Result<Vec<u8>, FileError> {
    let mut buffer = Vec::new();
    let mut w = BinaryWriter::new(&mut buffer);
    w.write_vec3(settings.size)?;
    w.write_vec3(settings.origin)?;
    w.write_u8(settings.default_resolution.index())?;
    w.write_bool(settings.grid_visible)?;
    w.write_bool(settings.axes_visible)?;
    for component in settings.background_color {
        w.write_f32(component)?;
    }
    Ok(buffer)
}

fn decode_settings(payload: &[u8]) -> Result<WorkspaceSettings, FileError> {
    let mut r = BinaryReader::new(payload);
    let size = r.read_vec3()?;
    let origin = r.read_vec3()?;
    let raw_resolution = r.read_u8()?;
    let default_resolution = VoxelResolution::from_index(raw_resolution).ok_or_else(|| {
        FileError::CorruptedData(format!("unknown default resolution {raw_resolution}"))
    })?;
    let grid_visible = r.read_bool()?;
    let axes_visible = r.read_bool()?;
    let background_color = [
        r.read_f32()?,
        r.read_f32()?,
        r.read_f32()?,
        r.read_f32()?,
    ];
    Ok(WorkspaceSettings {
        size,
        origin,
        default_resolution,
        grid_visible,
        axes_visible,
        background_color,
    })
}

fn encode_voxel_data(project: &Project) -> Result<Vec<u8>, FileError> {
    let mut buffer = Vec::new();
    let mut w = BinaryWriter::new(&mut buffer);
    w.write_u8(project.engine.active_resolution().index())?;
    w.write_u8(VoxelResolution::COUNT as u8)?;
    for resolution in VoxelResolution::ALL {
        let voxels = project.engine.all_voxels(resolution);
        w.write_u8(resolution.index())?;
        w.write_u32(voxels.len() as u32)?;
        for voxel in voxels {
            w.write_i32(voxel.increment.x)?;
            w.write_i32(voxel.increment.y)?;
            w.write_i32(voxel.increment.z)?;
        }
    }
    Ok(buffer)
}

fn decode_voxel_data(payload: &[u8], project: &mut Project) -> Result<(), FileError> {
    let mut r = BinaryReader::new(payload);
    let raw_active = r.read_u8()?;
    let active = VoxelResolution::from_index(raw_active).ok_or_else(|| {
        FileError::CorruptedData(format!("unknown active resolution {raw_active}"))
    })?;
    let resolution_count = r.read_u8()?;

    let mut sections: Vec<(VoxelResolution, Vec<IncrementCoordinates>)> =
        Vec::with_capacity(resolution_count as usize);
    for _ in 0..resolution_count {
        let raw = r.read_u8()?;
        let resolution = VoxelResolution::from_index(raw).ok_or_else(|| {
            FileError::CorruptedData(format!("unknown resolution tag {raw}"))
        })?;
        let count = r.read_u32()?;
        let mut coords = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let x = r.read_i32()?;
            let y = r.read_i32()?;
            let z = r.read_i32()?;
            coords.push(IncrementCoordinates::new(x, y, z));
        }
        sections.push((resolution, coords));
    }

    project.engine.clear_all();
    // Largest voxels first so detail voxels land on existing larger ones.
    sections.sort_by_key(|(resolution, _)| std::cmp::Reverse(resolution.size_cm()));
    let mut rejected = 0usize;
    for (resolution, coords) in sections {
        for pos in coords {
            if !project.engine.set(pos, resolution, true) {
                rejected += 1;
            }
        }
    }
    project.engine.set_active_resolution(active);
    if rejected > 0 {
        warn!("voxel chunk contained {rejected} unplaceable voxels");
    }
    Ok(())
}

fn encode_selections(project: &Project) -> Result<Vec<u8>, FileError> {
    let mut buffer = Vec::new();
    let mut w = BinaryWriter::new(&mut buffer);
    w.write_u32(project.named_selections.len() as u32)?;
    for (name, blob) in &project.named_selections {
        w.write_string(name)?;
        w.write_blob(blob)?;
    }
    Ok(buffer)
}

fn decode_selections(payload: &[u8], project: &mut Project) -> Result<(), FileError> {
    let mut r = BinaryReader::new(payload);
    let count = r.read_u32()?;
    project.named_selections.clear();
    for _ in 0..count {
        let name = r.read_string()?;
        let blob = r.read_blob()?;
        project.named_selections.push((name, blob));
    }
    Ok(())
}

fn encode_custom(key: &str, data: &[u8]) -> Result<Vec<u8>, FileError> {
    let mut buffer = Vec::new();
    let mut w = BinaryWriter::new(&mut buffer);
    w.write_string(key)?;
    w.write_blob(data)?;
    Ok(buffer)
}

fn decode_custom(payload: &[u8]) -> Result<(String, Vec<u8>), FileError> {
    let mut r = BinaryReader::new(payload);
    let key = r.read_string()?;
    let data = r.read_blob()?;
    Ok((key, data))
}
