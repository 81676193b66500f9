//! STL export: binary and ASCII triangle serialization.
//!
//! The exporter consumes a finished triangle mesh; it does not mesh
//! voxels. Preprocessing order is fixed: uniform scale, then translation,
//! then unit conversion from meters to the requested output unit.

use super::binary::BinaryWriter;
use super::types::{FileError, StlExportOptions, StlExportStats, StlFormat, StlUnits};
use crate::mesh::Mesh;
use glam::Vec3;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Triangles with less area than this are reported as degenerate.
const DEGENERATE_AREA: f32 = 1e-6;

/// Writes meshes to `.stl` files.
#[derive(Debug, Default)]
pub struct StlExporter;

impl StlExporter {
    pub fn new() -> Self {
        Self
    }

    /// Export one mesh. Returns the export statistics on success.
    pub fn export_mesh(
        &self,
        path: &Path,
        mesh: &Mesh,
        options: &StlExportOptions,
    ) -> Result<StlExportStats, FileError> {
        let started = Instant::now();
        let mut warnings = validate_mesh(mesh)?;

        let processed = preprocess_mesh(mesh, options);
        let watertight = is_watertight(&processed);
        if options.validate_watertight && !watertight {
            warnings.push("mesh is not watertight".to_string());
        }

        match options.format {
            StlFormat::Binary => write_binary_stl(path, &processed)?,
            StlFormat::Ascii => write_ascii_stl(path, &processed)?,
        }

        let file_size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        Ok(StlExportStats {
            triangle_count: processed.triangle_count(),
            vertex_count: processed.vertex_count(),
            export_time_seconds: started.elapsed().as_secs_f32(),
            file_size,
            watertight,
            warnings,
        })
    }

    /// Export several meshes: merged into one file, or (when merging is
    /// disabled) one numbered file per mesh. Statistics are aggregated.
    pub fn export_meshes(
        &self,
        path: &Path,
        meshes: &[Mesh],
        options: &StlExportOptions,
    ) -> Result<StlExportStats, FileError> {
        if meshes.is_empty() {
            return Err(FileError::InvalidFormat("no meshes to export".to_string()));
        }
        if options.merge_meshes || meshes.len() == 1 {
            let merged = Mesh::merged(meshes);
            return self.export_mesh(path, &merged, options);
        }

        let mut combined = StlExportStats {
            watertight: true,
            ..StlExportStats::default()
        };
        let started = Instant::now();
        for (index, mesh) in meshes.iter().enumerate() {
            let numbered = numbered_path(path, index);
            let stats = self.export_mesh(&numbered, mesh, options)?;
            combined.triangle_count += stats.triangle_count;
            combined.vertex_count += stats.vertex_count;
            combined.file_size += stats.file_size;
            combined.watertight &= stats.watertight;
            combined.warnings.extend(stats.warnings);
        }
        combined.export_time_seconds = started.elapsed().as_secs_f32();
        Ok(combined)
    }
}

/// Structural validation. Degenerate triangles are reported, not fatal.
fn validate_mesh(mesh: &Mesh) -> Result<Vec<String>, FileError> {
    if mesh.vertices.is_empty() {
        return Err(FileError::InvalidFormat("mesh has no vertices".to_string()));
    }
    if mesh.indices.is_empty() || mesh.indices.len() % 3 != 0 {
        return Err(FileError::InvalidFormat(
            "index count must be a nonzero multiple of 3".to_string(),
        ));
    }
    if let Some(&bad) = mesh
        .indices
        .iter()
        .find(|&&i| i as usize >= mesh.vertices.len())
    {
        return Err(FileError::InvalidFormat(format!(
            "index {bad} out of range for {} vertices",
            mesh.vertices.len()
        )));
    }

    let mut warnings = Vec::new();
    let degenerate = count_degenerate_triangles(mesh);
    if degenerate > 0 {
        warnings.push(format!("{degenerate} degenerate triangles"));
    }
    Ok(warnings)
}

/// Scale, translate, then convert meters to the output unit.
fn preprocess_mesh(mesh: &Mesh, options: &StlExportOptions) -> Mesh {
    let mut processed = mesh.clone();
    let translation = Vec3::from_array(options.translation);
    let unit_scale = StlUnits::Meters.to_millimeters() / options.units.to_millimeters();
    for vertex in &mut processed.vertices {
        let mut p = Vec3::from_array(vertex.position);
        p *= options.scale;
        p += translation;
        p *= unit_scale;
        vertex.position = p.to_array();
    }
    processed
}

fn triangle_positions(mesh: &Mesh, triangle: usize) -> [Vec3; 3] {
    let i = triangle * 3;
    [
        Vec3::from_array(mesh.vertices[mesh.indices[i] as usize].position),
        Vec3::from_array(mesh.vertices[mesh.indices[i + 1] as usize].position),
        Vec3::from_array(mesh.vertices[mesh.indices[i + 2] as usize].position),
    ]
}

fn triangle_normal(v0: Vec3, v1: Vec3, v2: Vec3) -> Vec3 {
    (v1 - v0).cross(v2 - v0).normalize_or_zero()
}

fn triangle_area(v0: Vec3, v1: Vec3, v2: Vec3) -> f32 {
    (v1 - v0).cross(v2 - v0).length() * 0.5
}

fn count_degenerate_triangles(mesh: &Mesh) -> usize {
    (0..mesh.triangle_count())
        .filter(|&t| {
            let [v0, v1, v2] = triangle_positions(mesh, t);
            triangle_area(v0, v1, v2) < DEGENERATE_AREA
        })
        .count()
}

/// Watertight: every edge shared by exactly two triangles and no
/// degenerate triangles.
fn is_watertight(mesh: &Mesh) -> bool {
    if mesh.indices.is_empty() {
        return false;
    }
    let mut edge_counts: HashMap<(u32, u32), u32> = HashMap::new();
    for triangle in mesh.indices.chunks_exact(3) {
        for (a, b) in [
            (triangle[0], triangle[1]),
            (triangle[1], triangle[2]),
            (triangle[2], triangle[0]),
        ] {
            let edge = (a.min(b), a.max(b));
            *edge_counts.entry(edge).or_insert(0) += 1;
        }
    }
    edge_counts.values().all(|&count| count == 2) && count_degenerate_triangles(mesh) == 0
}

/// Binary STL: an 80-byte header, a u32 triangle count, then 50 bytes per
/// triangle. Output is exactly `84 + 50 * triangle_count` bytes.
fn write_binary_stl(path: &Path, mesh: &Mesh) -> Result<(), FileError> {
    let file = File::create(path).map_err(FileError::from_write)?;
    let mut writer = BinaryWriter::new(BufWriter::new(file));

    let mut header = [0u8; 80];
    let banner = b"Binary STL exported by voxelcore";
    header[..banner.len()].copy_from_slice(banner);
    writer.write_bytes(&header)?;
    writer.write_u32(mesh.triangle_count() as u32)?;

    for triangle in 0..mesh.triangle_count() {
        let [v0, v1, v2] = triangle_positions(mesh, triangle);
        let normal = triangle_normal(v0, v1, v2);
        for vector in [normal, v0, v1, v2] {
            writer.write_f32(vector.x)?;
            writer.write_f32(vector.y)?;
            writer.write_f32(vector.z)?;
        }
        writer.write_u16(0)?; // attribute byte count
    }
    writer.flush()
}

/// ASCII STL with six fractional digits per float.
fn write_ascii_stl(path: &Path, mesh: &Mesh) -> Result<(), FileError> {
    let file = File::create(path).map_err(FileError::from_write)?;
    let mut writer = BufWriter::new(file);
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "mesh".to_string());

    let mut emit = |line: String| -> Result<(), FileError> {
        writer
            .write_all(line.as_bytes())
            .map_err(FileError::from_write)
    };

    emit(format!("solid {name}\n"))?;
    for triangle in 0..mesh.triangle_count() {
        let [v0, v1, v2] = triangle_positions(mesh, triangle);
        let n = triangle_normal(v0, v1, v2);
        emit(format!("  facet normal {:.6} {:.6} {:.6}\n", n.x, n.y, n.z))?;
        emit("    outer loop\n".to_string())?;
        for v in [v0, v1, v2] {
            emit(format!("      vertex {:.6} {:.6} {:.6}\n", v.x, v.y, v.z))?;
        }
        emit("    endloop\n".to_string())?;
        emit("  endfacet\n".to_string())?;
    }
    emit("endsolid\n".to_string())?;
    writer.flush().map_err(FileError::from_write)
}

/// `mesh.stl` -> `mesh_0.stl`, `mesh_1.stl`, ...
fn numbered_path(path: &Path, index: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{index}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{index}"),
    };
    path.with_file_name(name)
}
