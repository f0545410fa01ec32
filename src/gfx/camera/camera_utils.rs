use cgmath::{perspective, Matrix4, Point3, Rad, SquareMatrix};

/// Remaps OpenGL clip space (z in -1..1) to wgpu clip space (z in 0..1)
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// What the renderer needs from a camera.
///
/// The renderer never stores the camera; it reads these values whenever the
/// caller pushes new matrices or draws a frame.
pub trait Camera {
    fn view_matrix(&self) -> Matrix4<f32>;
    fn position(&self) -> Point3<f32>;
    fn fov_y(&self) -> Rad<f32>;
    fn aspect(&self) -> f32;
    /// Near and far clip distances
    fn clip_planes(&self) -> (f32, f32);

    fn projection_matrix(&self) -> Matrix4<f32> {
        let (near, far) = self.clip_planes();
        self.projection_for_range(near, far)
    }

    /// Perspective projection restricted to `[near, far]` in wgpu clip space
    fn projection_for_range(&self, near: f32, far: f32) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fov_y(), self.aspect(), near, far)
    }
}

/// Camera block shared by every pass (bind group 0)
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Debug)]
pub struct CameraUniform {
    pub projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub inv_projection: [[f32; 4]; 4],
    pub inv_view: [[f32; 4]; 4],
    /// World-space eye position; w is unused padding.
    pub position: [f32; 4],
    /// Viewport origin and size in pixels
    pub viewport: [f32; 4],
}

impl Default for CameraUniform {
    fn default() -> Self {
        let identity = convert_matrix4_to_array(Matrix4::identity());
        Self {
            projection: identity,
            view: identity,
            inv_projection: identity,
            inv_view: identity,
            position: [0.0; 4],
            viewport: [0.0, 0.0, 1.0, 1.0],
        }
    }
}

pub fn convert_matrix4_to_array(matrix4: Matrix4<f32>) -> [[f32; 4]; 4] {
    matrix4.into()
}

/// Inverse of `matrix`, or identity when it is singular
pub fn inverse_or_identity(matrix: Matrix4<f32>) -> Matrix4<f32> {
    matrix.invert().unwrap_or_else(|| {
        log::warn!("Singular camera matrix; substituting identity");
        Matrix4::identity()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Vector4};

    struct FixedCamera;

    impl Camera for FixedCamera {
        fn view_matrix(&self) -> Matrix4<f32> {
            Matrix4::identity()
        }
        fn position(&self) -> Point3<f32> {
            Point3::new(0.0, 0.0, 0.0)
        }
        fn fov_y(&self) -> Rad<f32> {
            Deg(90.0).into()
        }
        fn aspect(&self) -> f32 {
            1.0
        }
        fn clip_planes(&self) -> (f32, f32) {
            (1.0, 10.0)
        }
    }

    #[test]
    fn projection_maps_clip_planes_to_wgpu_depth_range() {
        let proj = FixedCamera.projection_matrix();

        let near = proj * Vector4::new(0.0, 0.0, -1.0, 1.0);
        let far = proj * Vector4::new(0.0, 0.0, -10.0, 1.0);

        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-5);
    }
}
