use cgmath::{Deg, InnerSpace, Matrix4, Point3, Rad, Vector3};

use super::camera_utils::Camera;

const MAX_PITCH: f32 = 89.0;

/// Free-flying first person camera (Y up)
#[derive(Debug, Clone, Copy)]
pub struct FpsCamera {
    pub position: Point3<f32>,
    /// Degrees; 0 looks down -Z
    pub yaw: f32,
    /// Degrees, clamped to +-89
    pub pitch: f32,
    pub fovy: Rad<f32>,
    pub aspect: f32,
    pub znear: f32,
    pub zfar: f32,
}

impl FpsCamera {
    pub fn new(position: Point3<f32>, fovy: impl Into<Rad<f32>>, aspect: f32, znear: f32, zfar: f32) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            fovy: fovy.into(),
            aspect,
            znear,
            zfar,
        }
    }

    pub fn front(&self) -> Vector3<f32> {
        let (yaw, pitch) = (Rad::from(Deg(self.yaw)).0, Rad::from(Deg(self.pitch)).0);
        Vector3::new(
            yaw.sin() * pitch.cos(),
            pitch.sin(),
            -yaw.cos() * pitch.cos(),
        )
        .normalize()
    }

    pub fn right(&self) -> Vector3<f32> {
        self.front().cross(Vector3::unit_y()).normalize()
    }

    pub fn add_yaw(&mut self, delta: f32) {
        self.yaw = (self.yaw + delta) % 360.0;
    }

    pub fn add_pitch(&mut self, delta: f32) {
        self.pitch = (self.pitch + delta).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// Moves along the camera's local axes
    pub fn translate_local(&mut self, forward: f32, right: f32, up: f32) {
        self.position += self.front() * forward + self.right() * right + Vector3::unit_y() * up;
    }

    /// Places the camera `distance` away from `target`, looking at it
    pub fn look_at(&mut self, target: Point3<f32>, distance: f32) {
        let dir = self.front();
        self.position = target - dir * distance;
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }
}

impl Camera for FpsCamera {
    fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.front(), Vector3::unit_y())
    }

    fn position(&self) -> Point3<f32> {
        self.position
    }

    fn fov_y(&self) -> Rad<f32> {
        self.fovy
    }

    fn aspect(&self) -> f32 {
        self.aspect
    }

    fn clip_planes(&self) -> (f32, f32) {
        (self.znear, self.zfar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_is_clamped_short_of_the_poles() {
        let mut camera = FpsCamera::new(Point3::new(0.0, 0.0, 0.0), Deg(45.0_f32), 1.0, 0.1, 100.0);
        camera.add_pitch(200.0);
        assert_eq!(camera.pitch, MAX_PITCH);
        assert!(camera.right().x.is_finite());
    }

    #[test]
    fn default_orientation_looks_down_negative_z() {
        let camera = FpsCamera::new(Point3::new(0.0, 0.0, 0.0), Deg(45.0_f32), 1.0, 0.1, 100.0);
        let front = camera.front();
        assert!((front - Vector3::new(0.0, 0.0, -1.0)).magnitude() < 1e-5);
    }
}
