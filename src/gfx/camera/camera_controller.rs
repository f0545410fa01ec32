use winit::{
    event::{DeviceEvent, ElementState, KeyEvent, MouseScrollDelta},
    keyboard::{KeyCode, PhysicalKey},
};

use super::fps_camera::FpsCamera;

/// WASD + mouse-look controller for [`FpsCamera`]
pub struct CameraController {
    pub move_speed: f32,
    pub look_speed: f32,
    forward: f32,
    right: f32,
    up: f32,
    is_mouse_pressed: bool,
}

impl CameraController {
    pub fn new(move_speed: f32, look_speed: f32) -> Self {
        Self {
            move_speed,
            look_speed,
            forward: 0.0,
            right: 0.0,
            up: 0.0,
            is_mouse_pressed: false,
        }
    }

    /// Returns true when the camera orientation changed
    pub fn process_device_event(&mut self, event: &DeviceEvent, camera: &mut FpsCamera) -> bool {
        match event {
            DeviceEvent::Button {
                button: 0, // Left Mouse Button
                state,
            } => {
                self.is_mouse_pressed = *state == ElementState::Pressed;
                false
            }
            DeviceEvent::MouseMotion { delta } if self.is_mouse_pressed => {
                camera.add_yaw(delta.0 as f32 * self.look_speed);
                camera.add_pitch(-delta.1 as f32 * self.look_speed);
                true
            }
            DeviceEvent::MouseWheel { delta } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.05,
                };
                self.move_speed = (self.move_speed * (1.0 + scroll * 0.1)).clamp(0.1, 500.0);
                false
            }
            _ => false,
        }
    }

    pub fn process_key_event(&mut self, event: &KeyEvent) {
        let amount = if event.state == ElementState::Pressed {
            1.0
        } else {
            0.0
        };
        match event.physical_key {
            PhysicalKey::Code(KeyCode::KeyW) => self.forward = amount,
            PhysicalKey::Code(KeyCode::KeyS) => self.forward = -amount,
            PhysicalKey::Code(KeyCode::KeyD) => self.right = amount,
            PhysicalKey::Code(KeyCode::KeyA) => self.right = -amount,
            PhysicalKey::Code(KeyCode::Space) => self.up = amount,
            PhysicalKey::Code(KeyCode::ShiftLeft) => self.up = -amount,
            _ => (),
        }
    }

    /// Applies held movement keys; returns true when the camera moved
    pub fn update(&self, camera: &mut FpsCamera, dt: f32) -> bool {
        if self.forward == 0.0 && self.right == 0.0 && self.up == 0.0 {
            return false;
        }
        let step = self.move_speed * dt;
        camera.translate_local(self.forward * step, self.right * step, self.up * step);
        true
    }
}
