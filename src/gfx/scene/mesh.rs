use std::ops::Range;

use wgpu::util::DeviceExt;

use super::vertex::Vertex3D;
use crate::gfx::geometry::{Aabb, GeometryData};

/// Handle into the [`MeshManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeshId(pub usize);

/// Indexed triangle mesh with an explicit init/delete lifecycle
pub struct Mesh {
    name: String,
    vertices: Vec<Vertex3D>,
    indices: Vec<u32>,
    bounds: Aabb,
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    index_count: u32,
}

impl Mesh {
    pub fn new(name: &str, vertices: Vec<Vertex3D>, indices: Vec<u32>) -> Self {
        let bounds = Aabb::from_points(vertices.iter().map(|v| v.position.into()));
        Self {
            name: name.to_string(),
            index_count: indices.len() as u32,
            vertices,
            indices,
            bounds,
            vertex_buffer: None,
            index_buffer: None,
        }
    }

    pub fn from_geometry(name: &str, mut geometry: GeometryData) -> Self {
        let (vertices, indices) = geometry.to_vertices();
        Self::new(name, vertices, indices)
    }

    /// Uploads vertex and index data to the GPU
    pub fn init(&mut self, device: &wgpu::Device) {
        if self.is_initialized() {
            log::warn!("Mesh '{}' initialized twice", self.name);
            return;
        }

        self.vertex_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", self.name)),
            contents: bytemuck::cast_slice(&self.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        }));
        self.index_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", self.name)),
            contents: bytemuck::cast_slice(&self.indices),
            usage: wgpu::BufferUsages::INDEX,
        }));
    }

    pub fn delete(&mut self) {
        match (self.vertex_buffer.take(), self.index_buffer.take()) {
            (Some(vertex_buffer), Some(index_buffer)) => {
                vertex_buffer.destroy();
                index_buffer.destroy();
            }
            _ => log::warn!("Deleting mesh '{}' that was never initialized", self.name),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.vertex_buffer.is_some() && self.index_buffer.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        if self.is_initialized() {
            log::warn!("Mesh '{}' dropped while still initialized", self.name);
        }
    }
}

/// Append-only mesh store; handles stay valid for the manager's lifetime
#[derive(Default)]
pub struct MeshManager {
    meshes: Vec<Mesh>,
}

impl MeshManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uploads `mesh` and stores it
    pub fn add(&mut self, device: &wgpu::Device, mut mesh: Mesh) -> MeshId {
        mesh.init(device);
        self.meshes.push(mesh);
        MeshId(self.meshes.len() - 1)
    }

    pub fn get(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn delete_all(&mut self) {
        for mesh in &mut self.meshes {
            if mesh.is_initialized() {
                mesh.delete();
            }
        }
    }
}

pub trait DrawMesh<'a> {
    fn draw_mesh(&mut self, mesh: &'a Mesh);
    /// Draws `instances`; the caller binds the instance buffer to slot 1
    fn draw_mesh_instanced(&mut self, mesh: &'a Mesh, instances: Range<u32>);
}

impl<'a, 'b> DrawMesh<'b> for wgpu::RenderPass<'a>
where
    'b: 'a,
{
    fn draw_mesh(&mut self, mesh: &'b Mesh) {
        self.draw_mesh_instanced(mesh, 0..1);
    }

    fn draw_mesh_instanced(&mut self, mesh: &'b Mesh, instances: Range<u32>) {
        let (Some(vertex_buffer), Some(index_buffer)) = (&mesh.vertex_buffer, &mesh.index_buffer) else {
            log::error!("Drawing mesh '{}' before init", mesh.name);
            debug_assert!(false, "mesh drawn before init");
            return;
        };
        if mesh.index_count == 0 {
            return;
        }

        self.set_vertex_buffer(0, vertex_buffer.slice(..));
        self.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.draw_indexed(0..mesh.index_count, 0, instances);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::geometry::generate_cube;

    #[test]
    fn mesh_from_geometry_tracks_bounds_and_counts() {
        let mesh = Mesh::from_geometry("cube", generate_cube());
        assert_eq!(mesh.index_count(), 36);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.bounds().max.x, 0.5);
        assert!(!mesh.is_initialized());
    }

    #[test]
    fn empty_manager_has_no_meshes() {
        let manager = MeshManager::new();
        assert!(manager.get(MeshId(0)).is_none());
        assert!(manager.is_empty());
    }
}
