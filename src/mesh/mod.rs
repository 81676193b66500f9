//! Triangle mesh data consumed by the STL exporter.
//!
//! The core does not mesh voxels; meshing lives with the external
//! collaborators. These types are the finished-mesh contract they hand
//! to the exporter.

use bytemuck::{Pod, Zeroable};

/// Vertex format for exported meshes.
///
/// Layout:
/// - Position: 3 floats (12 bytes)
/// - Normal: 3 floats (12 bytes)
/// - UV: 2 floats (8 bytes)
/// Total: 32 bytes per vertex. Only position is consumed by the STL
/// writer; normals are recomputed per triangle.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }

    /// A vertex with only a position; normal and UV zeroed.
    pub fn at(position: [f32; 3]) -> Self {
        Self {
            position,
            normal: [0.0; 3],
            uv: [0.0; 2],
        }
    }
}

/// An indexed triangle mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Vertex data
    pub vertices: Vec<Vertex>,
    /// Triangle indices; length is a multiple of three
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(vertex_capacity: usize, index_capacity: usize) -> Self {
        Self {
            vertices: Vec::with_capacity(vertex_capacity),
            indices: Vec::with_capacity(index_capacity),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Append a triangle from three new vertices.
    pub fn add_triangle(&mut self, vertices: [Vertex; 3]) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&vertices);
        self.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }

    /// Append a quad (two triangles, counter-clockwise winding).
    pub fn add_quad(&mut self, vertices: [Vertex; 4]) {
        let base = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&vertices);
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Concatenate meshes into one, offsetting indices past earlier
    /// vertex blocks.
    pub fn merged(meshes: &[Mesh]) -> Mesh {
        let total_vertices = meshes.iter().map(Mesh::vertex_count).sum();
        let total_indices = meshes.iter().map(|m| m.indices.len()).sum();
        let mut merged = Mesh::with_capacity(total_vertices, total_indices);
        for mesh in meshes {
            let offset = merged.vertices.len() as u32;
            merged.vertices.extend_from_slice(&mesh.vertices);
            merged
                .indices
                .extend(mesh.indices.iter().map(|&i| i + offset));
        }
        merged
    }

    /// Vertex data as bytes.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as bytes.
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn test_add_quad() {
        let mut mesh = Mesh::new();
        let v = Vertex::at([0.0, 0.0, 0.0]);
        mesh.add_quad([v, v, v, v]);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.indices.len(), 6);
    }

    #[test]
    fn test_merge_offsets_indices() {
        let mut a = Mesh::new();
        a.add_triangle([
            Vertex::at([0.0, 0.0, 0.0]),
            Vertex::at([1.0, 0.0, 0.0]),
            Vertex::at([0.0, 1.0, 0.0]),
        ]);
        let b = a.clone();
        let merged = Mesh::merged(&[a, b]);
        assert_eq!(merged.vertex_count(), 6);
        assert_eq!(merged.triangle_count(), 2);
        assert_eq!(&merged.indices[3..], &[3, 4, 5]);
    }

    #[test]
    fn test_byte_views() {
        let mut mesh = Mesh::new();
        mesh.add_triangle([
            Vertex::at([0.0, 0.0, 0.0]),
            Vertex::at([1.0, 0.0, 0.0]),
            Vertex::at([0.0, 1.0, 0.0]),
        ]);
        assert_eq!(mesh.vertex_bytes().len(), 3 * 32);
        assert_eq!(mesh.index_bytes().len(), 3 * 4);
    }
}
