//! Point and directional lights
//!
//! Point light volumes are bounded by a radius derived from the light's
//! brightest channel. The radius only limits how much of the screen the
//! light pass shades; attenuation in the shader is not clipped by it.

use cgmath::{InnerSpace, Point3, Vector3};

use crate::config::SHADOW_CASCADE_COUNT;
use crate::error::LightError;

/// Intensity (out of 256) below which a light's contribution is invisible
pub const LIGHT_INTENSITY_THRESHOLD: f32 = 5.0;

/// Distance at which quadratic falloff `1 / (1 + d^2)` brings the brightest
/// channel down to [`LIGHT_INTENSITY_THRESHOLD`] / 256.
///
/// Lights dimmer than the threshold have no real solution and are rejected.
pub fn point_light_radius(color: Vector3<f32>) -> Result<f32, LightError> {
    for channel in [color.x, color.y, color.z] {
        if !channel.is_finite() || channel < 0.0 {
            return Err(LightError::InvalidColor(channel));
        }
    }
    let max_channel = color.x.max(color.y).max(color.z);
    let radicand = -4.0 * (1.0 - (256.0 / LIGHT_INTENSITY_THRESHOLD) * max_channel);
    if radicand < 0.0 {
        return Err(LightError::RadiusNotReal { max_channel });
    }
    Ok(radicand.sqrt() / 2.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    position: Point3<f32>,
    color: Vector3<f32>,
    radius: f32,
}

impl PointLight {
    pub fn new(position: Point3<f32>, color: Vector3<f32>) -> Result<Self, LightError> {
        Ok(Self {
            position,
            color,
            radius: point_light_radius(color)?,
        })
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn color(&self) -> Vector3<f32> {
        self.color
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn set_position(&mut self, position: Point3<f32>) {
        self.position = position;
    }

    /// Changes the colour and recomputes the radius; the light is unchanged on error
    pub fn set_color(&mut self, color: Vector3<f32>) -> Result<(), LightError> {
        self.radius = point_light_radius(color)?;
        self.color = color;
        Ok(())
    }

    pub fn instance(&self) -> PointLightInstance {
        PointLightInstance {
            position: self.position.into(),
            radius: self.radius,
            color: [self.color.x, self.color.y, self.color.z, 1.0],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    direction: Vector3<f32>,
    color: Vector3<f32>,
}

impl DirectionalLight {
    /// `direction` points from the light into the scene.
    ///
    /// A direction parallel to the world up axis is tilted slightly so the
    /// shadow look-at basis stays well defined.
    pub fn new(direction: Vector3<f32>, color: Vector3<f32>) -> Self {
        let mut direction = if direction.magnitude2() > f32::EPSILON {
            direction.normalize()
        } else {
            -Vector3::unit_y()
        };
        if direction.cross(Vector3::unit_y()).magnitude2() < 1e-6 {
            direction = Vector3::new(direction.x + 1e-3, direction.y, direction.z + 1e-3).normalize();
        }
        Self { direction, color }
    }

    pub fn direction(&self) -> Vector3<f32> {
        self.direction
    }

    pub fn color(&self) -> Vector3<f32> {
        self.color
    }
}

/// Lights currently in the scene
#[derive(Debug, Clone)]
pub struct LightSet {
    point_lights: Vec<PointLight>,
    max_point_lights: usize,
    directional: Option<DirectionalLight>,
}

impl LightSet {
    pub fn new(max_point_lights: usize) -> Self {
        Self {
            point_lights: Vec::new(),
            max_point_lights,
            directional: None,
        }
    }

    /// Adds a point light; ignored with a warning once the limit is reached
    pub fn push_point_light(&mut self, light: PointLight) {
        if self.point_lights.len() >= self.max_point_lights {
            log::warn!(
                "Point light limit of {} reached; ignoring light at {:?}",
                self.max_point_lights,
                light.position
            );
            return;
        }
        self.point_lights.push(light);
    }

    pub fn pop_point_light(&mut self) -> Option<PointLight> {
        let light = self.point_lights.pop();
        if light.is_none() {
            log::warn!("Popping a point light from an empty light set");
        }
        light
    }

    pub fn set_point_light(&mut self, index: usize, light: PointLight) {
        match self.point_lights.get_mut(index) {
            Some(slot) => *slot = light,
            None => log::warn!(
                "Point light index {} out of range ({} lights)",
                index,
                self.point_lights.len()
            ),
        }
    }

    pub fn point_lights(&self) -> &[PointLight] {
        &self.point_lights
    }

    pub fn max_point_lights(&self) -> usize {
        self.max_point_lights
    }

    pub fn set_directional_light(&mut self, light: Option<DirectionalLight>) {
        self.directional = light;
    }

    pub fn directional_light(&self) -> Option<&DirectionalLight> {
        self.directional.as_ref()
    }
}

/// Per-light instance data for the light volume and marker draws
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PointLightInstance {
    pub position: [f32; 3],
    pub radius: f32,
    pub color: [f32; 4],
}

impl PointLightInstance {
    const ATTRIBS: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![4 => Float32x3, 5 => Float32, 6 => Float32x4];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<PointLightInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Directional light block: world-space direction, one light-space matrix per
/// cascade and the view-space far distance of each cascade
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DirectionalLightUniform {
    pub direction: [f32; 4],
    pub color: [f32; 4],
    pub light_space: [[[f32; 4]; 4]; SHADOW_CASCADE_COUNT],
    pub cascade_far: [f32; SHADOW_CASCADE_COUNT],
}

impl Default for DirectionalLightUniform {
    fn default() -> Self {
        Self {
            direction: [0.0, -1.0, 0.0, 0.0],
            color: [0.0; 4],
            light_space: [[[0.0; 4]; 4]; SHADOW_CASCADE_COUNT],
            cascade_far: [0.0; SHADOW_CASCADE_COUNT],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn white_light_radius_matches_closed_form() {
        let radius = point_light_radius(Vector3::new(1.0, 1.0, 1.0)).unwrap();
        let expected = (-4.0_f32 * (1.0 - (256.0 / 5.0) * 1.0)).sqrt() / 2.0;
        assert_eq!(radius, expected);
        assert!((radius - 7.085).abs() < 1e-3);
    }

    #[test]
    fn radius_grows_with_brightest_channel() {
        let mut previous = 0.0;
        for step in 1..=20 {
            let channel = step as f32 * 0.5;
            let radius = point_light_radius(Vector3::new(0.0, channel, channel * 0.5)).unwrap();
            assert!(radius > previous);
            previous = radius;
        }
    }

    #[test]
    fn dim_or_invalid_lights_are_rejected() {
        assert!(matches!(
            point_light_radius(Vector3::new(0.01, 0.0, 0.0)),
            Err(LightError::RadiusNotReal { .. })
        ));
        assert!(matches!(
            point_light_radius(Vector3::new(f32::NAN, 1.0, 1.0)),
            Err(LightError::InvalidColor(_))
        ));
        assert!(matches!(
            point_light_radius(Vector3::new(-1.0, 1.0, 1.0)),
            Err(LightError::InvalidColor(_))
        ));
    }

    #[test]
    fn straight_down_light_is_nudged() {
        let light = DirectionalLight::new(Vector3::new(0.0, -5.0, 0.0), Vector3::new(1.0, 1.0, 1.0));
        let direction = light.direction();
        assert!((direction.magnitude() - 1.0).abs() < 1e-5);
        assert!(direction.cross(Vector3::unit_y()).magnitude2() > 1e-7);
        assert!(direction.y < -0.99);
    }

    #[test]
    fn point_light_overflow_is_ignored() {
        let mut lights = LightSet::new(2);
        let light = PointLight::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0)).unwrap();
        for _ in 0..3 {
            lights.push_point_light(light);
        }
        assert_eq!(lights.point_lights().len(), 2);

        let moved = PointLight::new(Point3::new(1.0, 2.0, 3.0), Vector3::new(2.0, 0.0, 0.0)).unwrap();
        lights.set_point_light(1, moved);
        lights.set_point_light(7, moved);
        assert_eq!(lights.point_lights()[1], moved);
        assert_eq!(lights.pop_point_light(), Some(moved));
        assert_eq!(lights.point_lights().len(), 1);
    }

    #[test]
    fn recolouring_recomputes_radius_or_leaves_light_untouched() {
        let mut light = PointLight::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 1.0, 1.0)).unwrap();
        let dim_radius = light.radius();

        light.set_color(Vector3::new(4.0, 0.0, 0.0)).unwrap();
        assert!(light.radius() > dim_radius);
        assert_eq!(light.color(), Vector3::new(4.0, 0.0, 0.0));

        let before = light;
        assert!(light.set_color(Vector3::new(0.0, 0.0, 0.0)).is_err());
        assert_eq!(light, before);

        light.set_position(Point3::new(0.0, 3.0, 0.0));
        assert_eq!(light.position(), Point3::new(0.0, 3.0, 0.0));
        assert_eq!(light.radius(), before.radius());
    }
}
