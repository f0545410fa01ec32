//! Image-based lighting precompute
//!
//! Runs once at startup (and again when the environment changes):
//!
//! 1. the equirectangular radiance map is projected onto a mipmapped cubemap,
//! 2. the cubemap is convolved into a small diffuse irradiance cubemap,
//! 3. a specular cubemap is prefiltered with one roughness per mip,
//! 4. the split-sum BRDF integral is rasterized into a 2D lookup table.
//!
//! Every cube face is rendered into a scratch framebuffer and copied into the
//! destination layer, one submission per face so the capture uniform can be
//! rewritten between faces.

use cgmath::{perspective, Deg, EuclideanSpace, Matrix4, Point3, Vector3};
use image::{Rgb, Rgba32FImage};

use super::layouts::RenderLayouts;
use super::pipeline_manager::{PipelineId, PipelineManager};
use crate::config::RendererConfig;
use crate::error::FramebufferError;
use crate::gfx::camera::OPENGL_TO_WGPU_MATRIX;
use crate::gfx::framebuffer::{
    attachment::{AttachmentFormat, AttachmentKind, AttachmentSize},
    ColorAttachmentDescription, Framebuffer, FramebufferDescription,
};
use crate::gfx::resources::texture_resource::{mip_level_count, TextureResource};
use crate::gfx::scene::mesh::{DrawMesh, Mesh};
use crate::wgpu_utils::{bind_group, UniformBuffer};

pub const CUBEMAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Pipelines used to project the radiance map onto the environment cubemap
pub const CAPTURE_PIPELINES: [PipelineId; 1] = [PipelineId::EquirectToCube];
/// Pipelines used to derive the lighting maps from the environment cubemap
pub const CONVOLVE_PIPELINES: [PipelineId; 3] = [PipelineId::Irradiance, PipelineId::Prefilter, PipelineId::BrdfLut];

/// Render targets have y pointing down in texture space, cube faces expect it up
#[rustfmt::skip]
const FLIP_Y: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, -1.0, 0.0, 0.0,
    0.0, 0.0, 1.0, 0.0,
    0.0, 0.0, 0.0, 1.0,
);

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CaptureUniform {
    pub view_projection: [[f32; 4]; 4],
    /// Roughness, source face resolution, unused x2
    pub params: [f32; 4],
}

/// View-projection for each cube face in layer order +X, -X, +Y, -Y, +Z, -Z
pub fn cube_face_view_projections() -> [Matrix4<f32>; 6] {
    let projection = FLIP_Y * OPENGL_TO_WGPU_MATRIX * perspective(Deg(90.0), 1.0, 0.1, 10.0);
    let eye = Point3::origin();
    let faces = [
        (Vector3::unit_x(), -Vector3::unit_y()),
        (-Vector3::unit_x(), -Vector3::unit_y()),
        (Vector3::unit_y(), Vector3::unit_z()),
        (-Vector3::unit_y(), -Vector3::unit_z()),
        (Vector3::unit_z(), -Vector3::unit_y()),
        (-Vector3::unit_z(), -Vector3::unit_y()),
    ];
    faces.map(|(direction, up)| projection * Matrix4::look_at_rh(eye, eye + direction, up))
}

/// Roughness assigned to each prefilter mip, 0 at the base and 1 at the last
pub fn prefilter_roughness(mip: u32, mip_count: u32) -> f32 {
    if mip_count <= 1 {
        0.0
    } else {
        mip as f32 / (mip_count - 1) as f32
    }
}

/// Procedural sky used when no radiance map is configured
pub fn gradient_sky(width: u32, height: u32) -> Rgba32FImage {
    let zenith = Vector3::new(0.25, 0.45, 0.9);
    let horizon = Vector3::new(0.9, 0.9, 1.0);
    let ground = Vector3::new(0.2, 0.18, 0.16);

    let mut image = Rgba32FImage::new(width, height);
    for (_, y, pixel) in image.enumerate_pixels_mut() {
        // +1 at the top row, -1 at the bottom
        let elevation = 1.0 - 2.0 * (y as f32 + 0.5) / height as f32;
        let color = if elevation >= 0.0 {
            horizon + (zenith - horizon) * elevation.sqrt()
        } else {
            horizon + (ground - horizon) * (-elevation).sqrt().min(1.0)
        };
        *pixel = image::Rgba([color.x, color.y, color.z, 1.0]);
    }
    image
}

pub struct IblMaps {
    pub environment: TextureResource,
    pub irradiance: TextureResource,
    pub prefilter: TextureResource,
    pub brdf_lut: Framebuffer,
}

impl IblMaps {
    pub fn delete(&mut self) {
        self.environment.destroy();
        self.irradiance.destroy();
        self.prefilter.destroy();
        if self.brdf_lut.is_initialized() {
            self.brdf_lut.delete();
        }
    }
}

/// GPU state shared by every capture draw
pub struct IblBaker<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub pipelines: &'a PipelineManager,
    pub layouts: &'a RenderLayouts,
    pub cube: &'a Mesh,
    pub quad: &'a Mesh,
}

impl IblBaker<'_> {
    /// Builds every IBL map from an equirectangular radiance image
    pub fn bake(&self, radiance: &Rgba32FImage, config: &RendererConfig) -> Result<IblMaps, FramebufferError> {
        let (width, height) = radiance.dimensions();
        log::info!(
            "Precomputing IBL from a {}x{} radiance map (environment {}, irradiance {}, prefilter {}x{} mips)",
            width,
            height,
            config.environment_face_size,
            config.irradiance_face_size,
            config.prefilter_face_size,
            config.prefilter_mip_count
        );

        self.report_missing("Environment capture", &CAPTURE_PIPELINES);

        let equirect = TextureResource::from_equirect_hdr(self.device, self.queue, radiance, "Equirect Radiance");
        let mut capture = CaptureTarget::new(self.device, self.layouts, config.environment_face_size)?;

        let environment_mips = mip_level_count(config.environment_face_size, config.environment_face_size);
        let environment = TextureResource::render_cubemap(
            self.device,
            config.environment_face_size,
            environment_mips,
            CUBEMAP_FORMAT,
            "Environment Cubemap",
        );
        let equirect_source = bind_group(
            self.device,
            "Equirect Source",
            &self.layouts.equirect_source,
            &[
                wgpu::BindingResource::TextureView(&equirect.view),
                wgpu::BindingResource::Sampler(&equirect.sampler),
            ],
        );
        for mip in 0..environment_mips {
            let size = (config.environment_face_size >> mip).max(1);
            self.render_cube(
                &mut capture,
                PipelineId::EquirectToCube,
                &equirect_source,
                &environment.texture,
                size,
                mip,
                [0.0, 0.0, 0.0, 0.0],
            )?;
        }
        equirect.destroy();
        capture.delete();

        self.convolve(environment, config)
    }

    /// Builds the irradiance and prefilter maps from an existing environment
    /// cubemap, which the returned maps take ownership of
    pub fn convolve(&self, environment: TextureResource, config: &RendererConfig) -> Result<IblMaps, FramebufferError> {
        self.report_missing("IBL convolution", &CONVOLVE_PIPELINES);
        let mut capture = CaptureTarget::new(self.device, self.layouts, config.irradiance_face_size)?;
        let environment_face_size = environment.texture.width();

        let environment_source = bind_group(
            self.device,
            "Environment Source",
            &self.layouts.cube_source,
            &[
                wgpu::BindingResource::TextureView(&environment.view),
                wgpu::BindingResource::Sampler(&environment.sampler),
            ],
        );

        let irradiance = TextureResource::render_cubemap(
            self.device,
            config.irradiance_face_size,
            1,
            CUBEMAP_FORMAT,
            "Irradiance Cubemap",
        );
        self.render_cube(
            &mut capture,
            PipelineId::Irradiance,
            &environment_source,
            &irradiance.texture,
            config.irradiance_face_size,
            0,
            [0.0, 0.0, 0.0, 0.0],
        )?;

        let prefilter_mips = config
            .prefilter_mip_count
            .clamp(1, mip_level_count(config.prefilter_face_size, config.prefilter_face_size));
        let prefilter = TextureResource::render_cubemap(
            self.device,
            config.prefilter_face_size,
            prefilter_mips,
            CUBEMAP_FORMAT,
            "Prefilter Cubemap",
        );
        for mip in 0..prefilter_mips {
            let size = (config.prefilter_face_size >> mip).max(1);
            let roughness = prefilter_roughness(mip, prefilter_mips);
            self.render_cube(
                &mut capture,
                PipelineId::Prefilter,
                &environment_source,
                &prefilter.texture,
                size,
                mip,
                [roughness, environment_face_size as f32, 0.0, 0.0],
            )?;
        }

        capture.delete();
        let brdf_lut = self.bake_brdf_lut(config.brdf_lut_size)?;

        Ok(IblMaps {
            environment,
            irradiance,
            prefilter,
            brdf_lut,
        })
    }

    /// Logs the pipelines of `stage` that failed to build; their maps stay black
    fn report_missing(&self, stage: &str, ids: &[PipelineId]) {
        let missing = self.pipelines.missing(ids);
        if !missing.is_empty() {
            log::error!(
                "{} is missing pipelines {:?}; the maps they render stay black",
                stage,
                missing
            );
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_cube(
        &self,
        capture: &mut CaptureTarget,
        pipeline: PipelineId,
        source: &wgpu::BindGroup,
        destination: &wgpu::Texture,
        size: u32,
        mip_level: u32,
        params: [f32; 4],
    ) -> Result<(), FramebufferError> {
        let Some(pipeline) = self.pipelines.lookup(pipeline) else {
            return Ok(());
        };
        if capture.framebuffer.size() != (size, size) {
            capture.framebuffer.resize(self.device, size, size)?;
        }

        for (face, view_projection) in cube_face_view_projections().into_iter().enumerate() {
            capture.uniform.update_content(
                self.queue,
                CaptureUniform {
                    view_projection: view_projection.into(),
                    params,
                },
            );

            let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("IBL Capture Encoder"),
            });
            {
                let Some(mut pass) = capture.framebuffer.bind_write(
                    &mut encoder,
                    wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    None,
                ) else {
                    return Err(FramebufferError::Device {
                        label: capture.framebuffer.label().to_string(),
                        message: "capture target is not initialized".to_string(),
                    });
                };
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &capture.bind_group, &[]);
                pass.set_bind_group(1, source, &[]);
                pass.draw_mesh(self.cube);
            }
            capture
                .framebuffer
                .copy_color_to(&mut encoder, 0, destination, face as u32, mip_level);
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        Ok(())
    }

    fn bake_brdf_lut(&self, size: u32) -> Result<Framebuffer, FramebufferError> {
        let mut lut = Framebuffer::new(FramebufferDescription::new("BRDF LUT", size, size).with_color(
            AttachmentFormat::Rg,
            AttachmentSize::Sixteen,
            AttachmentKind::Float,
        ));
        lut.init(self.device)?;

        if let Some(pipeline) = self.pipelines.lookup(PipelineId::BrdfLut) {
            let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("BRDF LUT Encoder"),
            });
            if let Some(mut pass) = lut.bind_write(
                &mut encoder,
                wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                None,
            ) {
                pass.set_pipeline(pipeline);
                pass.draw_mesh(self.quad);
            }
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        Ok(lut)
    }
}

/// Scratch framebuffer resized for each capture resolution
struct CaptureTarget {
    framebuffer: Framebuffer,
    uniform: UniformBuffer<CaptureUniform>,
    bind_group: wgpu::BindGroup,
}

impl CaptureTarget {
    fn new(device: &wgpu::Device, layouts: &RenderLayouts, size: u32) -> Result<Self, FramebufferError> {
        // Only ever copied out of, never sampled
        let color = ColorAttachmentDescription::new(AttachmentFormat::Rgba, AttachmentSize::Sixteen, AttachmentKind::Float)
            .renderbuffer();
        let mut framebuffer =
            Framebuffer::new(FramebufferDescription::new("Cubemap Capture", size, size).with_color_attachment(color));
        framebuffer.init(device)?;

        let uniform = UniformBuffer::<CaptureUniform>::new(device);
        let bind_group = bind_group(device, "Capture Bind Group", &layouts.capture, &[uniform.binding_resource()]);
        Ok(Self {
            framebuffer,
            uniform,
            bind_group,
        })
    }

    fn delete(mut self) {
        if self.framebuffer.is_initialized() {
            self.framebuffer.delete();
        }
    }
}

/// Average colour of a radiance map, logged as a sanity check on load
pub fn mean_radiance(image: &Rgba32FImage) -> Rgb<f32> {
    let count = (image.width() * image.height()).max(1) as f32;
    let sum = image
        .pixels()
        .fold([0.0f32; 3], |acc, p| [acc[0] + p[0], acc[1] + p[1], acc[2] + p[2]]);
    Rgb([sum[0] / count, sum[1] / count, sum[2] / count])
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector4;

    fn project(view_projection: Matrix4<f32>, direction: Vector3<f32>) -> (f32, f32) {
        let clip = view_projection * Vector4::new(direction.x, direction.y, direction.z, 1.0);
        (clip.x / clip.w, clip.y / clip.w)
    }

    #[test]
    fn faces_follow_cubemap_layer_orientation() {
        // Each direction sits at face coordinates (s, t) = (0.75, 0.25),
        // which is the upper right quadrant of the rendered image.
        let directions = [
            Vector3::new(1.0, 0.5, -0.5),
            Vector3::new(-1.0, 0.5, 0.5),
            Vector3::new(0.5, 1.0, -0.5),
            Vector3::new(0.5, -1.0, 0.5),
            Vector3::new(0.5, 0.5, 1.0),
            Vector3::new(-0.5, 0.5, -1.0),
        ];
        for (face, (view_projection, direction)) in
            cube_face_view_projections().into_iter().zip(directions).enumerate()
        {
            let (x, y) = project(view_projection, direction);
            assert!((x - 0.5).abs() < 1e-4 && (y - 0.5).abs() < 1e-4, "face {}: ({}, {})", face, x, y);
        }
    }

    #[test]
    fn prefilter_roughness_spans_unit_range() {
        let roughness: Vec<f32> = (0..5).map(|mip| prefilter_roughness(mip, 5)).collect();
        assert_eq!(roughness, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(prefilter_roughness(0, 1), 0.0);
    }

    #[test]
    fn gradient_sky_is_bright_above_and_dark_below() {
        let sky = gradient_sky(64, 32);
        let top = sky.get_pixel(10, 0);
        let bottom = sky.get_pixel(10, 31);
        assert!(top[2] > top[0], "zenith should be blue");
        assert!(bottom[0] + bottom[1] + bottom[2] < top[0] + top[1] + top[2]);
        let mean = mean_radiance(&sky);
        assert!(mean[0] > 0.0 && mean[2] <= 1.0);
    }
}
