//! Physically based bloom
//!
//! The HDR image is downsampled through the bloom mip chain with a 13-tap
//! filter, then upsampled back with a 3x3 tent whose radius is configurable,
//! each step blending additively onto the next larger mip. Mip 0 ends up
//! holding the blurred result that the tonemap pass mixes in.

use super::layouts::RenderLayouts;
use super::pipeline_manager::{PipelineId, PipelineManager};
use super::targets::RenderTargets;
use crate::gfx::scene::mesh::{DrawMesh, Mesh};
use crate::wgpu_utils::{bind_group, UniformBuffer};

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BloomUniform {
    /// Filter radius in UV units; yzw unused
    pub params: [f32; 4],
}

pub struct BloomRenderer {
    uniform: UniformBuffer<BloomUniform>,
    sampler: wgpu::Sampler,
    /// Source bind group for the first downsample (the HDR color target)
    hdr_source: Option<wgpu::BindGroup>,
    /// One source bind group per bloom mip
    mip_sources: Vec<wgpu::BindGroup>,
}

impl BloomRenderer {
    pub fn new(device: &wgpu::Device, filter_radius: f32) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Bloom Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            uniform: UniformBuffer::new_with_data(
                device,
                &BloomUniform {
                    params: [filter_radius, 0.0, 0.0, 0.0],
                },
            ),
            sampler,
            hdr_source: None,
            mip_sources: Vec::new(),
        }
    }

    /// Rebuilds the source bind groups after the targets were (re)created
    pub fn rebuild(&mut self, device: &wgpu::Device, layouts: &RenderLayouts, targets: &RenderTargets) {
        self.hdr_source = None;
        self.mip_sources.clear();
        if !targets.bloom_enabled() {
            return;
        }

        let source = |label: &str, view: &wgpu::TextureView| {
            bind_group(
                device,
                label,
                &layouts.bloom,
                &[
                    wgpu::BindingResource::TextureView(view),
                    wgpu::BindingResource::Sampler(&self.sampler),
                    self.uniform.binding_resource(),
                ],
            )
        };

        self.hdr_source = targets
            .hdr
            .color_attachment(0)
            .map(|hdr| source("Bloom HDR Source", &hdr.view));
        self.mip_sources = targets
            .bloom
            .mips()
            .iter()
            .enumerate()
            .filter_map(|(i, mip)| {
                mip.color_attachment(0)
                    .map(|attachment| source(&format!("Bloom Mip {} Source", i), &attachment.view))
            })
            .collect();
    }

    /// HDR -> mip 0 -> mip 1 -> ... each pass halving the resolution
    pub fn downsample(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &PipelineManager,
        quad: &Mesh,
        targets: &RenderTargets,
    ) {
        let Some(pipeline) = pipelines.get(PipelineId::BloomDownsample) else {
            return;
        };
        let sources = self.hdr_source.iter().chain(self.mip_sources.iter());

        for (target, source) in targets.bloom.mips().iter().zip(sources) {
            let Some(mut pass) = target.bind_write(
                encoder,
                wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                None,
            ) else {
                return;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, source, &[]);
            pass.draw_mesh(quad);
        }
    }

    /// Smallest mip back up to mip 0, blending onto what the downsample left
    pub fn upsample(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &PipelineManager,
        quad: &Mesh,
        targets: &RenderTargets,
    ) {
        let Some(pipeline) = pipelines.get(PipelineId::BloomUpsample) else {
            return;
        };
        let mips = targets.bloom.mips();

        for i in (1..mips.len()).rev() {
            let Some(source) = self.mip_sources.get(i) else {
                continue;
            };
            let Some(mut pass) = mips[i - 1].bind_write(
                encoder,
                wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                None,
            ) else {
                return;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, source, &[]);
            pass.draw_mesh(quad);
        }
    }
}
