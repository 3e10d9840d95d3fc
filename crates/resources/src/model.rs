//! Mesh geometry and the geometry arena.
//!
//! A [`MeshGeometry`] holds CPU-side vertex and index data for one or more
//! named submeshes that share the buffers. Each submesh carries its draw
//! arguments and an object-space bounding box. Geometry is stored in a
//! [`GeometryArena`] and referred to by [`MeshHandle`].

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use tracing::debug;

use crate::error::{ResourceError, ResourceResult};

/// Vertex layout of the lit, textured pipeline.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    #[inline]
    pub fn new(position: Vec3, normal: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }
}

/// A range of a mesh's index buffer drawn as one item.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubmeshGeometry {
    pub index_count: u32,
    pub start_index: u32,
    pub base_vertex: i32,
    /// Axis-aligned bounding box minimum
    pub aabb_min: Vec3,
    /// Axis-aligned bounding box maximum
    pub aabb_max: Vec3,
}

/// Vertex and index data shared by a set of submeshes.
#[derive(Clone, Debug, Default)]
pub struct MeshGeometry {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    submeshes: Vec<(String, SubmeshGeometry)>,
}

impl MeshGeometry {
    /// Creates a mesh with a single submesh covering all indices.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::EmptyGeometry`] if there are no vertices or
    /// no indices.
    pub fn single(
        name: impl Into<String>,
        submesh: impl Into<String>,
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
    ) -> ResourceResult<Self> {
        let name = name.into();
        if vertices.is_empty() || indices.is_empty() {
            return Err(ResourceError::EmptyGeometry(name));
        }
        let (aabb_min, aabb_max) = bounds_of(&vertices);
        let index_count = indices.len() as u32;
        Ok(Self {
            name,
            vertices,
            indices,
            submeshes: vec![(
                submesh.into(),
                SubmeshGeometry {
                    index_count,
                    start_index: 0,
                    base_vertex: 0,
                    aabb_min,
                    aabb_max,
                },
            )],
        })
    }

    /// Axis-aligned box centered on the origin with the given edge lengths.
    ///
    /// 24 vertices (4 per face, so each face has its own normals and
    /// texture coordinates) and 36 indices, counter-clockwise front faces.
    pub fn cuboid(
        name: impl Into<String>,
        width: f32,
        height: f32,
        depth: f32,
    ) -> ResourceResult<Self> {
        let h = Vec3::new(width, height, depth) * 0.5;

        // (normal, tangent u, tangent v) per face.
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            let base = vertices.len() as u32;
            for (su, sv, uv) in [
                (-1.0, -1.0, Vec2::new(0.0, 1.0)),
                (1.0, -1.0, Vec2::new(1.0, 1.0)),
                (1.0, 1.0, Vec2::new(1.0, 0.0)),
                (-1.0, 1.0, Vec2::new(0.0, 0.0)),
            ] {
                let position = (normal + u * su + v * sv) * h;
                vertices.push(Vertex::new(position, normal, uv));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        Self::single(name, "box", vertices, indices)
    }

    /// Adds a submesh over an existing index range.
    pub fn add_submesh(&mut self, name: impl Into<String>, submesh: SubmeshGeometry) {
        self.submeshes.push((name.into(), submesh));
    }

    /// Looks up a submesh by name.
    pub fn submesh(&self, name: &str) -> ResourceResult<&SubmeshGeometry> {
        self.submeshes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
            .ok_or_else(|| ResourceError::UnknownSubmesh {
                mesh: self.name.clone(),
                submesh: name.to_string(),
            })
    }

    /// Iterates over submeshes in insertion order.
    pub fn submeshes(&self) -> impl Iterator<Item = (&str, &SubmeshGeometry)> {
        self.submeshes.iter().map(|(n, s)| (n.as_str(), s))
    }

    /// Returns the total number of triangles in the mesh.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

fn bounds_of(vertices: &[Vertex]) -> (Vec3, Vec3) {
    vertices.iter().fold(
        (Vec3::splat(f32::INFINITY), Vec3::splat(f32::NEG_INFINITY)),
        |(min, max), v| (min.min(v.position), max.max(v.position)),
    )
}

/// Typed index of a mesh in a [`GeometryArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MeshHandle(u32);

impl MeshHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Owns all mesh geometry.
#[derive(Debug, Default)]
pub struct GeometryArena {
    meshes: Vec<MeshGeometry>,
}

impl GeometryArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a mesh and returns its handle.
    pub fn insert(&mut self, mesh: MeshGeometry) -> ResourceResult<MeshHandle> {
        if self.find(&mesh.name).is_some() {
            return Err(ResourceError::DuplicateName(mesh.name));
        }
        let handle = MeshHandle(self.meshes.len() as u32);
        debug!(
            "Stored mesh '{}': {} vertices, {} triangles",
            mesh.name,
            mesh.vertices.len(),
            mesh.triangle_count()
        );
        self.meshes.push(mesh);
        Ok(handle)
    }

    pub fn get(&self, handle: MeshHandle) -> ResourceResult<&MeshGeometry> {
        self.meshes
            .get(handle.index())
            .ok_or(ResourceError::UnknownMesh(handle))
    }

    pub fn find(&self, name: &str) -> Option<MeshHandle> {
        self.meshes
            .iter()
            .position(|m| m.name == name)
            .map(|index| MeshHandle(index as u32))
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}
