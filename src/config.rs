//! Renderer configuration
//!
//! Every tunable of the deferred pipeline lives here. Values are plain data;
//! the renderer reads them once at construction and again on resize.

use std::path::PathBuf;

use cgmath::Deg;

/// Number of shadow cascades. The directional light shader binds exactly this
/// many depth maps, so it is a compile-time constant rather than a setting.
pub const SHADOW_CASCADE_COUNT: usize = 4;

/// Upper bound on SSAO kernel samples; matches the kernel array in `ssao.wgsl`.
pub const MAX_SSAO_KERNEL_SIZE: usize = 64;

/// Configuration for creating a [`crate::Renderer`]
#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub near_plane: f32,
    pub far_plane: f32,
    pub fov_y: Deg<f32>,

    pub shadow_map_size: u32,
    /// Blend between uniform (0.0) and logarithmic (1.0) cascade splits.
    pub cascade_split_lambda: f32,
    pub cascade_xy_margin: f32,
    pub cascade_z_multiplier: f32,

    pub ssao_kernel_size: usize,
    pub ssao_radius: f32,
    pub ssao_bias: f32,

    pub bloom_mip_count: u32,
    pub bloom_filter_radius: f32,
    pub bloom_strength: f32,
    pub exposure: f32,

    pub max_point_lights: usize,

    pub environment_map: Option<PathBuf>,
    pub environment_face_size: u32,
    pub irradiance_face_size: u32,
    pub prefilter_face_size: u32,
    pub prefilter_mip_count: u32,
    pub brdf_lut_size: u32,

    pub debug_light_markers: bool,
    pub skybox: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            near_plane: 0.1,
            far_plane: 150.0,
            fov_y: Deg(45.0),
            shadow_map_size: 2048,
            cascade_split_lambda: 0.75,
            cascade_xy_margin: 1.1,
            cascade_z_multiplier: 10.0,
            ssao_kernel_size: MAX_SSAO_KERNEL_SIZE,
            ssao_radius: 0.5,
            ssao_bias: 0.025,
            bloom_mip_count: 6,
            bloom_filter_radius: 0.005,
            bloom_strength: 0.04,
            exposure: 1.0,
            max_point_lights: 128,
            environment_map: None,
            environment_face_size: 512,
            irradiance_face_size: 32,
            prefilter_face_size: 128,
            prefilter_mip_count: 5,
            brdf_lut_size: 512,
            debug_light_markers: true,
            skybox: true,
        }
    }
}

impl RendererConfig {
    pub fn with_clip_planes(mut self, near: f32, far: f32) -> Self {
        self.near_plane = near;
        self.far_plane = far;
        self
    }

    pub fn with_fov(mut self, fov_y: Deg<f32>) -> Self {
        self.fov_y = fov_y;
        self
    }

    /// Sets the square resolution of every cascade's depth map (builder pattern)
    pub fn with_shadow_map_size(mut self, size: u32) -> Self {
        self.shadow_map_size = size.max(1);
        self
    }

    pub fn with_cascade_split_lambda(mut self, lambda: f32) -> Self {
        self.cascade_split_lambda = lambda.clamp(0.0, 1.0);
        self
    }

    /// Sets the number of SSAO kernel samples, clamped to the shader's array size
    pub fn with_ssao_kernel_size(mut self, samples: usize) -> Self {
        self.ssao_kernel_size = samples.clamp(1, MAX_SSAO_KERNEL_SIZE);
        self
    }

    pub fn with_bloom(mut self, mip_count: u32, filter_radius: f32, strength: f32) -> Self {
        self.bloom_mip_count = mip_count;
        self.bloom_filter_radius = filter_radius;
        self.bloom_strength = strength;
        self
    }

    pub fn with_exposure(mut self, exposure: f32) -> Self {
        self.exposure = exposure;
        self
    }

    pub fn with_max_point_lights(mut self, count: usize) -> Self {
        self.max_point_lights = count;
        self
    }

    /// Uses an equirectangular HDR radiance map for image-based lighting
    pub fn with_environment_map(mut self, path: impl Into<PathBuf>) -> Self {
        self.environment_map = Some(path.into());
        self
    }

    pub fn with_debug_light_markers(mut self, enabled: bool) -> Self {
        self.debug_light_markers = enabled;
        self
    }

    pub fn with_skybox(mut self, enabled: bool) -> Self {
        self.skybox = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_out_of_range_values() {
        let config = RendererConfig::default()
            .with_ssao_kernel_size(500)
            .with_cascade_split_lambda(3.0)
            .with_shadow_map_size(0);

        assert_eq!(config.ssao_kernel_size, MAX_SSAO_KERNEL_SIZE);
        assert_eq!(config.cascade_split_lambda, 1.0);
        assert_eq!(config.shadow_map_size, 1);
    }

    #[test]
    fn builders_set_their_fields() {
        let config = RendererConfig::default()
            .with_clip_planes(0.5, 80.0)
            .with_fov(Deg(60.0))
            .with_bloom(4, 0.01, 0.1)
            .with_exposure(1.5)
            .with_max_point_lights(8)
            .with_environment_map("sky.hdr")
            .with_debug_light_markers(false)
            .with_skybox(false);

        assert_eq!((config.near_plane, config.far_plane), (0.5, 80.0));
        assert_eq!(config.fov_y, Deg(60.0));
        assert_eq!(
            (config.bloom_mip_count, config.bloom_filter_radius, config.bloom_strength),
            (4, 0.01, 0.1)
        );
        assert_eq!(config.exposure, 1.5);
        assert_eq!(config.max_point_lights, 8);
        assert_eq!(config.environment_map, Some(PathBuf::from("sky.hdr")));
        assert!(!config.debug_light_markers);
        assert!(!config.skybox);
    }
}
