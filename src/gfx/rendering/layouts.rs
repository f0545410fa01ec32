//! Bind group layouts shared by the pass pipelines
//!
//! Group 0 is the camera for every pass that reads it; the G-buffer read
//! layout is group 1 for SSAO and the lighting passes.

use wgpu::{SamplerBindingType, ShaderStages};

use crate::config::SHADOW_CASCADE_COUNT;
use crate::wgpu_utils::binding_types::{
    entry, layout, sampler, texture_2d, texture_2d_unfilterable, texture_cube, texture_depth_2d, uniform,
};

pub struct RenderLayouts {
    pub camera: wgpu::BindGroupLayout,
    /// Position+AO, normal+roughness, albedo+metallic
    pub gbuffer: wgpu::BindGroupLayout,
    /// SSAO parameters and rotation noise
    pub ssao: wgpu::BindGroupLayout,
    /// One sampled texture and its sampler
    pub single_texture: wgpu::BindGroupLayout,
    pub ambient: wgpu::BindGroupLayout,
    pub directional: wgpu::BindGroupLayout,
    /// Source mip, sampler, filter parameters
    pub bloom: wgpu::BindGroupLayout,
    pub tonemap: wgpu::BindGroupLayout,
    /// Per-cascade light-space matrix
    pub shadow: wgpu::BindGroupLayout,
    /// Face view-projection plus capture parameters
    pub capture: wgpu::BindGroupLayout,
    pub equirect_source: wgpu::BindGroupLayout,
    /// Cubemap and sampler (skybox, irradiance and prefilter sources)
    pub cube_source: wgpu::BindGroupLayout,
}

impl RenderLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let vertex_fragment = ShaderStages::VERTEX_FRAGMENT;
        let fragment = ShaderStages::FRAGMENT;
        let filtering = SamplerBindingType::Filtering;

        let camera = layout(device, "Camera Layout", vertex_fragment, &[uniform()]);
        let gbuffer = layout(
            device,
            "G-Buffer Read Layout",
            fragment,
            &[texture_2d(), texture_2d(), texture_2d()],
        );
        let ssao = layout(
            device,
            "SSAO Params Layout",
            fragment,
            &[uniform(), texture_2d_unfilterable()],
        );
        let single_texture = layout(
            device,
            "Single Texture Layout",
            fragment,
            &[texture_2d(), sampler(filtering)],
        );
        let ambient = layout(
            device,
            "Ambient IBL Layout",
            fragment,
            &[
                texture_cube(),
                texture_cube(),
                texture_2d(),
                sampler(filtering),
                texture_2d(),
            ],
        );

        let mut directional_entries = vec![entry(0, fragment, uniform())];
        for cascade in 0..SHADOW_CASCADE_COUNT {
            directional_entries.push(entry(cascade as u32 + 1, fragment, texture_depth_2d()));
        }
        directional_entries.push(entry(
            SHADOW_CASCADE_COUNT as u32 + 1,
            fragment,
            sampler(SamplerBindingType::Comparison),
        ));
        let directional = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Directional Light Layout"),
            entries: &directional_entries,
        });

        let bloom = layout(
            device,
            "Bloom Layout",
            fragment,
            &[texture_2d(), sampler(filtering), uniform()],
        );
        let tonemap = layout(
            device,
            "Tonemap Layout",
            fragment,
            &[texture_2d(), texture_2d(), sampler(filtering), uniform()],
        );
        let shadow = layout(device, "Shadow Cascade Layout", ShaderStages::VERTEX, &[uniform()]);
        let capture = layout(device, "Capture Layout", vertex_fragment, &[uniform()]);
        let equirect_source = layout(
            device,
            "Equirect Source Layout",
            fragment,
            &[texture_2d_unfilterable(), sampler(SamplerBindingType::NonFiltering)],
        );
        let cube_source = layout(device, "Cube Source Layout", fragment, &[texture_cube(), sampler(filtering)]);

        Self {
            camera,
            gbuffer,
            ssao,
            single_texture,
            ambient,
            directional,
            bloom,
            tonemap,
            shadow,
            capture,
            equirect_source,
            cube_source,
        }
    }
}
