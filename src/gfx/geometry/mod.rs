//! # Procedural Geometry Generation
//!
//! CPU-side geometry: procedural primitives for light volumes, the skybox
//! cube and the fullscreen quad, plus normal/tangent generation and bounding
//! boxes for imported meshes.

pub mod primitives;
pub mod tangents;

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Transform, Vector3};

pub use primitives::*;

use crate::gfx::scene::vertex::Vertex3D;

/// Represents generated geometry data ready for GPU upload
#[derive(Debug, Clone, Default)]
pub struct GeometryData {
    /// Vertex positions (x, y, z)
    pub vertices: Vec<[f32; 3]>,
    /// Texture coordinates (u, v)
    pub tex_coords: Vec<[f32; 2]>,
    /// Normal vectors (x, y, z)
    pub normals: Vec<[f32; 3]>,
    /// Tangents with handedness; generated when empty
    pub tangents: Vec<[f32; 4]>,
    /// Triangle indices (counter-clockwise winding)
    pub indices: Vec<u32>,
}

impl GeometryData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// True when at least one whole triangle can be drawn
    pub fn has_triangles(&self) -> bool {
        !self.vertices.is_empty() && self.triangle_count() > 0
    }

    /// Fills in smooth normals when the source had none
    pub fn ensure_normals(&mut self) {
        if self.normals.len() != self.vertices.len() {
            self.normals = compute_smooth_normals(&self.vertices, &self.indices);
        }
    }

    /// Fills in MikkTSpace tangents when the source had none
    pub fn ensure_tangents(&mut self) {
        if self.tangents.len() == self.vertices.len() {
            return;
        }
        self.ensure_normals();
        if self.tex_coords.len() != self.vertices.len() {
            self.tex_coords = vec![[0.0, 0.0]; self.vertices.len()];
        }

        self.tangents = match tangents::generate_tangents_for_mesh(
            &self.vertices,
            &self.normals,
            &self.tex_coords,
            &self.indices,
        ) {
            Ok(tangents) => tangents,
            Err(reason) => {
                log::debug!("Falling back to arbitrary tangents: {}", reason);
                self.normals.iter().map(|n| fallback_tangent(*n)).collect()
            }
        };
    }

    /// Interleaves the attribute streams into GPU vertices
    pub fn to_vertices(&mut self) -> (Vec<Vertex3D>, Vec<u32>) {
        self.ensure_tangents();

        let vertices = (0..self.vertices.len())
            .map(|i| Vertex3D {
                position: self.vertices[i],
                normal: self.normals[i],
                tex_coords: self.tex_coords[i],
                tangent: self.tangents[i],
            })
            .collect();

        (vertices, self.indices.clone())
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().map(|p| Point3::from(*p)))
    }
}

/// Area-weighted vertex normals from triangle faces
pub fn compute_smooth_normals(positions: &[[f32; 3]], indices: &[u32]) -> Vec<[f32; 3]> {
    let mut normals = vec![Vector3::new(0.0f32, 0.0, 0.0); positions.len()];

    for triangle in indices.chunks_exact(3) {
        let [i0, i1, i2] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }
        let v0 = Vector3::from(positions[i0]);
        let face_normal = (Vector3::from(positions[i1]) - v0).cross(Vector3::from(positions[i2]) - v0);
        for index in [i0, i1, i2] {
            normals[index] += face_normal;
        }
    }

    normals
        .into_iter()
        .map(|n| {
            if n.magnitude2() > 0.0 {
                n.normalize().into()
            } else {
                [0.0, 1.0, 0.0]
            }
        })
        .collect()
}

/// Any unit vector orthogonal to `normal`
fn fallback_tangent(normal: [f32; 3]) -> [f32; 4] {
    let n = Vector3::from(normal);
    let helper = if n.x.abs() < 0.9 {
        Vector3::unit_x()
    } else {
        Vector3::unit_y()
    };
    let t = (helper - n * n.dot(helper)).normalize();
    [t.x, t.y, t.z, 1.0]
}

/// Axis aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl Aabb {
    /// An inverted box that any union replaces
    pub const EMPTY: Aabb = Aabb {
        min: Point3 { x: f32::MAX, y: f32::MAX, z: f32::MAX },
        max: Point3 { x: f32::MIN, y: f32::MIN, z: f32::MIN },
    };

    pub fn from_points(points: impl IntoIterator<Item = Point3<f32>>) -> Self {
        points.into_iter().fold(Self::EMPTY, |aabb, p| aabb.grow(p))
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn grow(self, p: Point3<f32>) -> Self {
        Self {
            min: Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            max: Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        }
    }

    pub fn union(self, other: Aabb) -> Self {
        if other.is_empty() {
            return self;
        }
        self.grow(other.min).grow(other.max)
    }

    pub fn corners(&self) -> [Point3<f32>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(a.x, b.y, b.z),
            Point3::new(b.x, b.y, b.z),
        ]
    }

    /// Bounds of this box after `transform`
    pub fn transformed(&self, transform: &Matrix4<f32>) -> Self {
        if self.is_empty() {
            return *self;
        }
        Self::from_points(self.corners().iter().map(|c| transform.transform_point(*c)))
    }

    pub fn center(&self) -> Point3<f32> {
        self.min.midpoint(self.max)
    }

    /// Radius of the bounding sphere around [`Aabb::center`]
    pub fn radius(&self) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        (self.max - self.min).magnitude() * 0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smooth_normals_of_flat_quad_point_up() {
        let plane = generate_plane(1.0, 1.0, 1, 1);
        let normals = compute_smooth_normals(&plane.vertices, &plane.indices);
        for n in normals {
            assert!((n[1] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn transformed_box_follows_translation() {
        let unit = Aabb::from_points([Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)]);
        let moved = unit.transformed(&Matrix4::from_translation(Vector3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.min, Point3::new(9.0, -1.0, -1.0));
        assert_eq!(moved.max, Point3::new(11.0, 1.0, 1.0));
    }

    #[test]
    fn union_with_empty_is_identity() {
        let a = Aabb::from_points([Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 2.0, 3.0)]);
        assert_eq!(a.union(Aabb::EMPTY), a);
        assert_eq!(Aabb::EMPTY.union(a), a);
        assert!(Aabb::EMPTY.is_empty());
    }

    #[test]
    fn generated_tangents_are_orthogonal_to_normals() {
        let mut sphere = generate_sphere(16, 8);
        let (vertices, _) = sphere.to_vertices();
        for v in vertices.iter().filter(|v| v.position[1].abs() < 0.9) {
            let n = Vector3::from(v.normal);
            let t = Vector3::new(v.tangent[0], v.tangent[1], v.tangent[2]);
            assert!(n.dot(t).abs() < 1e-3);
        }
    }

    #[test]
    fn faceless_geometry_gets_fallback_tangents() {
        let mut points = GeometryData {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]],
            ..Default::default()
        };
        assert!(!points.has_triangles());
        points.ensure_tangents();
        assert_eq!(points.tangents.len(), 2);
        assert_eq!(points.normals.len(), 2);

        let mut empty = GeometryData::new();
        empty.ensure_tangents();
        assert!(empty.tangents.is_empty());
        assert!(!empty.has_triangles());
        assert!(generate_plane(1.0, 1.0, 1, 1).has_triangles());
    }
}
