//! # Primitive Shape Generation
//!
//! Shapes the renderer draws itself. All windings are counter-clockwise
//! seen from outside.

use super::GeometryData;
use std::f32::consts::PI;

/// Generate a unit cube centered at the origin (-0.5..0.5 on every axis)
pub fn generate_cube() -> GeometryData {
    let mut data = GeometryData::new();

    // (normal, u axis, v axis) per face; u x v == normal keeps the winding outward
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
    ];

    for (normal, u, v) in faces {
        let base = data.vertices.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            data.vertices.push([
                0.5 * (normal[0] + su * u[0] + sv * v[0]),
                0.5 * (normal[1] + su * u[1] + sv * v[1]),
                0.5 * (normal[2] + su * u[2] + sv * v[2]),
            ]);
            data.normals.push(normal);
            data.tex_coords.push([(su + 1.0) * 0.5, (1.0 - sv) * 0.5]);
            // texture v runs against the v axis
            data.tangents.push([u[0], u[1], u[2], -1.0]);
        }
        data.indices
            .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
    }

    data
}

/// Generate a UV sphere of radius 1.0 centered at the origin
///
/// # Arguments
/// * `longitude_segments` - Number of vertical segments (longitude lines)
/// * `latitude_segments` - Number of horizontal segments (latitude lines)
pub fn generate_sphere(longitude_segments: u32, latitude_segments: u32) -> GeometryData {
    let mut data = GeometryData::new();

    let long_segs = longitude_segments.max(3);
    let lat_segs = latitude_segments.max(2);

    for lat in 0..=lat_segs {
        let theta = lat as f32 * PI / lat_segs as f32;
        let (sin_theta, cos_theta) = theta.sin_cos();

        for long in 0..=long_segs {
            let phi = long as f32 * 2.0 * PI / long_segs as f32;
            let (sin_phi, cos_phi) = phi.sin_cos();

            let position = [sin_theta * cos_phi, cos_theta, sin_theta * sin_phi];
            data.vertices.push(position);
            data.normals.push(position);
            data.tex_coords
                .push([long as f32 / long_segs as f32, lat as f32 / lat_segs as f32]);
        }
    }

    let row = long_segs + 1;
    for lat in 0..lat_segs {
        for long in 0..long_segs {
            let a = lat * row + long;
            let b = a + row;
            let c = b + 1;
            let d = a + 1;
            data.indices.extend_from_slice(&[a, d, b, d, c, b]);
        }
    }

    data
}

/// Circumscribed radius of [`generate_sphere`] for the given segment counts.
///
/// Light volumes are scaled by this so the faceted sphere fully encloses a
/// true sphere of radius 1.
pub fn sphere_enclosing_scale(longitude_segments: u32, latitude_segments: u32) -> f32 {
    let long_segs = longitude_segments.max(3) as f32;
    let lat_segs = latitude_segments.max(2) as f32;
    1.0 / ((PI / long_segs).cos() * (PI / (2.0 * lat_segs)).cos())
}

/// Generate a flat plane on XZ facing +Y
///
/// # Arguments
/// * `width` - Extent along X
/// * `depth` - Extent along Z
/// * `subdivisions_x` / `subdivisions_z` - Quads along each axis
pub fn generate_plane(width: f32, depth: f32, subdivisions_x: u32, subdivisions_z: u32) -> GeometryData {
    let mut data = GeometryData::new();

    let sx = subdivisions_x.max(1);
    let sz = subdivisions_z.max(1);

    for j in 0..=sz {
        for i in 0..=sx {
            let u = i as f32 / sx as f32;
            let v = j as f32 / sz as f32;
            data.vertices.push([(u - 0.5) * width, 0.0, (v - 0.5) * depth]);
            data.normals.push([0.0, 1.0, 0.0]);
            data.tex_coords.push([u, v]);
            data.tangents.push([1.0, 0.0, 0.0, -1.0]);
        }
    }

    let row = sx + 1;
    for j in 0..sz {
        for i in 0..sx {
            let a = j * row + i;
            let b = a + 1;
            let d = a + row;
            let c = d + 1;
            data.indices.extend_from_slice(&[a, d, b, b, d, c]);
        }
    }

    data
}

/// Two triangles covering clip space; texture coordinates have v pointing down
pub fn generate_fullscreen_quad() -> GeometryData {
    let mut data = GeometryData::new();

    for (x, y) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
        data.vertices.push([x, y, 0.0]);
        data.normals.push([0.0, 0.0, 1.0]);
        data.tex_coords.push([(x + 1.0) * 0.5, (1.0 - y) * 0.5]);
        data.tangents.push([1.0, 0.0, 0.0, 1.0]);
    }
    data.indices = vec![0, 1, 2, 2, 3, 0];

    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Vector3};

    fn assert_outward_winding(data: &GeometryData) {
        for triangle in data.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|k| Vector3::from(data.vertices[triangle[k] as usize]));
            let face_normal = (b - a).cross(c - a);
            if face_normal.magnitude2() < 1e-12 {
                continue; // degenerate pole triangles
            }
            let centroid = (a + b + c) / 3.0;
            let expected = Vector3::from(data.normals[triangle[0] as usize]);
            assert!(face_normal.dot(expected) > 0.0, "inward face at {:?}", centroid);
        }
    }

    #[test]
    fn test_cube_generation() {
        let cube = generate_cube();
        assert_eq!(cube.vertices.len(), 24); // 6 faces * 4 vertices
        assert_eq!(cube.indices.len(), 36); // 6 faces * 2 triangles * 3 indices
        assert_eq!(cube.triangle_count(), 12);
        assert!(cube.vertices.iter().flatten().all(|c| c.abs() <= 0.5 + 1e-6));
        assert_outward_winding(&cube);
    }

    #[test]
    fn test_sphere_generation() {
        let sphere = generate_sphere(8, 6);
        assert_eq!(sphere.vertices.len(), 9 * 7);
        assert_eq!(sphere.indices.len(), (8 * 6 * 6) as usize);
        assert_eq!(sphere.vertices.len(), sphere.normals.len());
        assert_eq!(sphere.vertices.len(), sphere.tex_coords.len());
        assert_outward_winding(&sphere);
    }

    #[test]
    fn enclosing_scale_exceeds_one() {
        assert!(sphere_enclosing_scale(16, 8) > 1.0);
        assert!(sphere_enclosing_scale(64, 32) < sphere_enclosing_scale(8, 4));
    }

    #[test]
    fn test_plane_generation() {
        let plane = generate_plane(2.0, 2.0, 2, 2);
        assert_eq!(plane.vertices.len(), 9); // 3x3 grid
        assert_eq!(plane.indices.len(), 24); // 4 quads * 2 triangles * 3 indices
        assert_outward_winding(&plane);
    }

    #[test]
    fn fullscreen_quad_spans_clip_space() {
        let quad = generate_fullscreen_quad();
        assert_eq!(quad.triangle_count(), 2);
        assert_eq!(quad.tex_coords[0], [0.0, 1.0]);
        assert_eq!(quad.tex_coords[2], [1.0, 0.0]);
    }
}
