//! Size-dependent render targets
//!
//! Everything here is recreated by [`RenderTargets::resize`] when the
//! viewport changes. Shadow cascades have a fixed resolution and live in
//! [`ShadowCascades`].

use crate::config::SHADOW_CASCADE_COUNT;
use crate::error::FramebufferError;
use crate::gfx::framebuffer::{
    attachment::{AttachmentFormat, AttachmentKind, AttachmentSize, AttachmentStorage},
    bloom::BloomFramebuffer,
    Framebuffer, FramebufferDescription,
};
use crate::wgpu_utils::{bind_group, UniformBuffer};

/// Light-space matrix for one cascade's depth pass
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ShadowUniform {
    pub light_space: [[f32; 4]; 4],
}

pub fn gbuffer_description(width: u32, height: u32) -> FramebufferDescription {
    FramebufferDescription::new("G-Buffer", width, height)
        // position + ao
        .with_color(AttachmentFormat::Rgba, AttachmentSize::Sixteen, AttachmentKind::Float)
        // normal + roughness
        .with_color(AttachmentFormat::Rgba, AttachmentSize::Sixteen, AttachmentKind::Float)
        // albedo + metallic
        .with_color(AttachmentFormat::Rgba, AttachmentSize::Sixteen, AttachmentKind::Float)
        .with_depth_stencil(AttachmentStorage::Renderbuffer)
}

pub fn hdr_description(width: u32, height: u32) -> FramebufferDescription {
    FramebufferDescription::new("HDR", width, height)
        .with_color(AttachmentFormat::Rgba, AttachmentSize::Sixteen, AttachmentKind::Float)
        .with_depth_stencil(AttachmentStorage::Renderbuffer)
}

fn occlusion_description(label: &str, width: u32, height: u32) -> FramebufferDescription {
    FramebufferDescription::new(label, width, height).with_color(
        AttachmentFormat::Red,
        AttachmentSize::Eight,
        AttachmentKind::Unsigned,
    )
}

pub struct RenderTargets {
    pub gbuffer: Framebuffer,
    pub ssao: Framebuffer,
    pub ssao_blur: Framebuffer,
    pub hdr: Framebuffer,
    pub bloom: BloomFramebuffer,
    bloom_requested: bool,
    bloom_enabled: bool,
}

impl RenderTargets {
    /// Allocates every viewport-sized target.
    ///
    /// G-buffer, SSAO and HDR failures are fatal; a bloom failure only
    /// disables bloom.
    pub fn new(device: &wgpu::Device, width: u32, height: u32, bloom_mip_count: u32) -> Result<Self, FramebufferError> {
        let mut targets = Self {
            gbuffer: Framebuffer::new(gbuffer_description(width, height)),
            ssao: Framebuffer::new(occlusion_description("SSAO", width, height)),
            ssao_blur: Framebuffer::new(occlusion_description("SSAO Blur", width, height)),
            hdr: Framebuffer::new(hdr_description(width, height)),
            bloom: BloomFramebuffer::new(bloom_mip_count),
            bloom_requested: bloom_mip_count > 0,
            bloom_enabled: bloom_mip_count > 0,
        };

        targets.gbuffer.init(device)?;
        targets.ssao.init(device)?;
        targets.ssao_blur.init(device)?;
        targets.hdr.init(device)?;
        targets.init_bloom(device, width, height);
        Ok(targets)
    }

    fn init_bloom(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        if !self.bloom_enabled {
            return;
        }
        if let Err(err) = self.bloom.init(device, width, height) {
            log::error!("Bloom disabled: {}", err);
            self.bloom_enabled = false;
        } else if !self.bloom.is_initialized() {
            log::warn!("Bloom disabled: {}x{} is too small for a mip chain", width, height);
            self.bloom_enabled = false;
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<(), FramebufferError> {
        self.gbuffer.resize(device, width, height)?;
        self.ssao.resize(device, width, height)?;
        self.ssao_blur.resize(device, width, height)?;
        self.hdr.resize(device, width, height)?;
        self.bloom_enabled = self.bloom_requested;
        self.init_bloom(device, width, height);
        Ok(())
    }

    pub fn bloom_enabled(&self) -> bool {
        self.bloom_enabled
    }

    pub fn size(&self) -> (u32, u32) {
        self.hdr.size()
    }

    pub fn delete(&mut self) {
        for framebuffer in [&mut self.gbuffer, &mut self.ssao, &mut self.ssao_blur, &mut self.hdr] {
            if framebuffer.is_initialized() {
                framebuffer.delete();
            }
        }
        self.bloom.delete();
    }
}

/// One depth-only map per cascade with its light-space uniform
pub struct ShadowCascades {
    maps: Vec<Framebuffer>,
    uniforms: Vec<UniformBuffer<ShadowUniform>>,
    bind_groups: Vec<wgpu::BindGroup>,
}

impl ShadowCascades {
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, size: u32) -> Result<Self, FramebufferError> {
        let mut maps: Vec<Framebuffer> = Vec::with_capacity(SHADOW_CASCADE_COUNT);
        let mut uniforms = Vec::with_capacity(SHADOW_CASCADE_COUNT);
        let mut bind_groups = Vec::with_capacity(SHADOW_CASCADE_COUNT);

        for cascade in 0..SHADOW_CASCADE_COUNT {
            let mut map = Framebuffer::new(
                FramebufferDescription::new(&format!("Shadow Cascade {}", cascade), size, size)
                    .with_depth_stencil(AttachmentStorage::Texture),
            );
            if let Err(err) = map.init(device) {
                for mut created in maps {
                    created.delete();
                }
                return Err(err);
            }

            let uniform = UniformBuffer::new(device);
            bind_groups.push(bind_group(
                device,
                &format!("Shadow Cascade {} Bind Group", cascade),
                layout,
                &[uniform.binding_resource()],
            ));
            uniforms.push(uniform);
            maps.push(map);
        }

        Ok(Self {
            maps,
            uniforms,
            bind_groups,
        })
    }

    pub fn maps(&self) -> &[Framebuffer] {
        &self.maps
    }

    pub fn bind_group(&self, cascade: usize) -> Option<&wgpu::BindGroup> {
        self.bind_groups.get(cascade)
    }

    pub fn update(&mut self, queue: &wgpu::Queue, light_spaces: &[cgmath::Matrix4<f32>]) {
        for (uniform, light_space) in self.uniforms.iter_mut().zip(light_spaces) {
            uniform.update_content(
                queue,
                ShadowUniform {
                    light_space: (*light_space).into(),
                },
            );
        }
    }

    /// Depth views in cascade order
    pub fn views(&self) -> Vec<&wgpu::TextureView> {
        self.maps
            .iter()
            .filter_map(|map| map.depth_stencil_attachment().map(|depth| &depth.view))
            .collect()
    }

    pub fn delete(&mut self) {
        for map in &mut self.maps {
            if map.is_initialized() {
                map.delete();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::framebuffer::check_completeness;

    #[test]
    fn gbuffer_fits_default_limits() {
        let description = gbuffer_description(1920, 1080);
        assert!(check_completeness(&description, &wgpu::Limits::default()).is_ok());
        assert_eq!(
            description.resolve_color_formats().unwrap(),
            vec![wgpu::TextureFormat::Rgba16Float; 3]
        );
    }

    #[test]
    fn occlusion_targets_are_single_channel() {
        let description = occlusion_description("SSAO", 64, 64);
        assert_eq!(
            description.resolve_color_formats().unwrap(),
            vec![wgpu::TextureFormat::R8Unorm]
        );
        assert!(description.depth_stencil.is_none());
    }
}
