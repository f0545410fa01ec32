pub mod camera_controller;
pub mod camera_utils;
pub mod fps_camera;

// Re-export main types
pub use camera_controller::CameraController;
pub use camera_utils::{Camera, CameraUniform, OPENGL_TO_WGPU_MATRIX};
pub use fps_camera::FpsCamera;
