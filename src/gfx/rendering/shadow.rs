//! Cascaded shadow map math
//!
//! Split distances follow the practical split scheme (a blend of uniform and
//! logarithmic partitions). Each cascade gets an orthographic light
//! projection fitted around the world-space corners of its slice of the
//! camera frustum.

use cgmath::{ortho, EuclideanSpace, InnerSpace, Matrix4, Point3, Vector3, Vector4};

use crate::error::LightError;
use crate::gfx::camera::camera_utils::{inverse_or_identity, OPENGL_TO_WGPU_MATRIX};

/// Cascade boundaries `[near, d1, .., far]`, `count + 1` values, strictly increasing.
///
/// `lambda` 0.0 gives uniform splits and 1.0 logarithmic ones.
pub fn compute_cascade_splits(near: f32, far: f32, count: usize, lambda: f32) -> Result<Vec<f32>, LightError> {
    if !(near > 0.0 && far > near && near.is_finite() && far.is_finite()) || count == 0 {
        return Err(LightError::InvalidCascadeRange { near, far });
    }

    let lambda = lambda.clamp(0.0, 1.0);
    let mut splits = Vec::with_capacity(count + 1);
    splits.push(near);
    for i in 1..count {
        let p = i as f32 / count as f32;
        let logarithmic = near * (far / near).powf(p);
        let uniform = near + (far - near) * p;
        splits.push(lambda * logarithmic + (1.0 - lambda) * uniform);
    }
    splits.push(far);
    Ok(splits)
}

/// World-space corners of the frustum described by `projection * view`.
///
/// wgpu clip space has depth in 0..1, so the near face is z = 0.
pub fn frustum_corners_world(projection: Matrix4<f32>, view: Matrix4<f32>) -> [Point3<f32>; 8] {
    let inverse = inverse_or_identity(projection * view);
    let mut corners = [Point3::new(0.0, 0.0, 0.0); 8];
    let mut i = 0;
    for x in [-1.0, 1.0] {
        for y in [-1.0, 1.0] {
            for z in [0.0, 1.0] {
                let p = inverse * Vector4::new(x, y, z, 1.0);
                corners[i] = Point3::from_homogeneous(p);
                i += 1;
            }
        }
    }
    corners
}

#[derive(Debug, Clone, Copy)]
pub struct CascadeFit {
    pub xy_margin: f32,
    pub z_multiplier: f32,
}

/// Light view-projection covering the frustum slice whose corners are given.
///
/// The XY extent is widened by `xy_margin`; the Z range is stretched by
/// `z_multiplier` on whichever side reaches toward the light so casters
/// outside the slice still land in the map.
pub fn fit_cascade(corners: &[Point3<f32>; 8], light_direction: Vector3<f32>, fit: CascadeFit) -> Matrix4<f32> {
    let center = corners.iter().fold(Vector3::new(0.0, 0.0, 0.0), |acc, c| acc + c.to_vec()) / 8.0;
    let center = Point3::from_vec(center);

    let direction = light_direction.normalize();
    let up = if direction.cross(Vector3::unit_y()).magnitude2() < 1e-6 {
        Vector3::unit_z()
    } else {
        Vector3::unit_y()
    };
    let light_view = Matrix4::look_at_rh(center - direction, center, up);

    let mut min = Vector3::new(f32::MAX, f32::MAX, f32::MAX);
    let mut max = Vector3::new(f32::MIN, f32::MIN, f32::MIN);
    for corner in corners {
        let p = (light_view * corner.to_homogeneous()).truncate();
        min = Vector3::new(min.x.min(p.x), min.y.min(p.y), min.z.min(p.z));
        max = Vector3::new(max.x.max(p.x), max.y.max(p.y), max.z.max(p.z));
    }

    let half_extent = (max.truncate() - min.truncate()) * 0.5 * fit.xy_margin;
    let mid = (max.truncate() + min.truncate()) * 0.5;
    let (left, right) = (mid.x - half_extent.x, mid.x + half_extent.x);
    let (bottom, top) = (mid.y - half_extent.y, mid.y + half_extent.y);

    let z = fit.z_multiplier.max(1.0);
    let min_z = if min.z < 0.0 { min.z * z } else { min.z / z };
    let max_z = if max.z < 0.0 { max.z / z } else { max.z * z };

    // View space looks down -Z, so near/far are the negated extremes
    let light_projection = OPENGL_TO_WGPU_MATRIX * ortho(left, right, bottom, top, -max_z, -min_z);
    light_projection * light_view
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{perspective, Deg};

    #[test]
    fn splits_are_strictly_increasing_and_span_range() {
        for lambda in [0.0, 0.5, 0.75, 1.0] {
            let splits = compute_cascade_splits(0.1, 150.0, 4, lambda).unwrap();
            assert_eq!(splits.len(), 5);
            assert_eq!(splits[0], 0.1);
            assert_eq!(splits[4], 150.0);
            assert!(splits.windows(2).all(|w| w[0] < w[1]), "{:?}", splits);
        }
    }

    #[test]
    fn uniform_lambda_gives_even_slices() {
        let splits = compute_cascade_splits(1.0, 9.0, 4, 0.0).unwrap();
        assert_eq!(splits, vec![1.0, 3.0, 5.0, 7.0, 9.0]);
    }

    #[test]
    fn degenerate_ranges_are_rejected() {
        assert!(compute_cascade_splits(0.0, 10.0, 4, 0.5).is_err());
        assert!(compute_cascade_splits(5.0, 5.0, 4, 0.5).is_err());
        assert!(compute_cascade_splits(0.1, 10.0, 0, 0.5).is_err());
    }

    #[test]
    fn frustum_corners_sit_on_near_and_far_planes() {
        let projection = OPENGL_TO_WGPU_MATRIX * perspective(Deg(60.0_f32), 1.0, 1.0, 10.0);
        let view = Matrix4::look_at_rh(Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 0.0, -1.0), Vector3::unit_y());
        let corners = frustum_corners_world(projection, view);
        let mut depths: Vec<f32> = corners.iter().map(|c| -c.z).collect();
        depths.sort_by(|a, b| a.total_cmp(b));
        for near in &depths[..4] {
            assert!((near - 1.0).abs() < 1e-3);
        }
        for far in &depths[4..] {
            assert!((far - 10.0).abs() < 1e-2);
        }
    }

    #[test]
    fn fitted_cascade_contains_its_slice() {
        let projection = OPENGL_TO_WGPU_MATRIX * perspective(Deg(45.0_f32), 16.0 / 9.0, 0.5, 20.0);
        let view = Matrix4::look_at_rh(Point3::new(3.0, 2.0, 5.0), Point3::new(0.0, 0.0, 0.0), Vector3::unit_y());
        let corners = frustum_corners_world(projection, view);
        let fit = CascadeFit {
            xy_margin: 1.1,
            z_multiplier: 10.0,
        };
        let light = fit_cascade(&corners, Vector3::new(-0.3, -1.0, -0.2), fit);

        for corner in &corners {
            let clip = light * corner.to_homogeneous();
            let ndc = clip.truncate() / clip.w;
            assert!(ndc.x.abs() <= 1.0 + 1e-4, "{:?}", ndc);
            assert!(ndc.y.abs() <= 1.0 + 1e-4, "{:?}", ndc);
            assert!((-1e-4..=1.0 + 1e-4).contains(&ndc.z), "{:?}", ndc);
        }
    }
}
