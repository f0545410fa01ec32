//! Pipeline descriptions for every pass of the frame and the IBL precompute

use wgpu::{CompareFunction, Face, TextureFormat};

use super::ibl::CUBEMAP_FORMAT;
use super::layouts::RenderLayouts;
use super::pipeline_manager::{PipelineConfig, PipelineId, PipelineManager, VertexInput, ADDITIVE_BLEND};
use crate::gfx::framebuffer::{Framebuffer, DEPTH_FORMAT};
use crate::gfx::resources::material::{MaterialLayouts, MaterialVariant};

const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
const OCCLUSION_FORMAT: TextureFormat = TextureFormat::R8Unorm;
const BRDF_LUT_FORMAT: TextureFormat = TextureFormat::Rg16Float;

pub fn gbuffer_pipeline(variant: MaterialVariant) -> PipelineId {
    match variant {
        MaterialVariant::PbrNormal => PipelineId::GBufferPbr,
        MaterialVariant::PbrNormalNoAo => PipelineId::GBufferPbrNoAo,
        MaterialVariant::PbrNormalArm => PipelineId::GBufferPbrArm,
    }
}

fn gbuffer_shader(variant: MaterialVariant) -> &'static str {
    match variant {
        MaterialVariant::PbrNormal => "gbuffer_pbr.wgsl",
        MaterialVariant::PbrNormalNoAo => "gbuffer_pbr_no_ao.wgsl",
        MaterialVariant::PbrNormalArm => "gbuffer_pbr_arm.wgsl",
    }
}

/// Fullscreen pass over the quad mesh
fn post_process(shader: &str) -> PipelineConfig {
    PipelineConfig::default_with_shader(shader)
        .with_vertex_input(VertexInput::Mesh)
        .with_cull_mode(None)
}

/// Registers every pipeline; `gbuffer` supplies the G-buffer color targets
pub fn register_pass_pipelines(
    manager: &mut PipelineManager,
    layouts: &RenderLayouts,
    materials: &MaterialLayouts,
    gbuffer: &Framebuffer,
    output_format: TextureFormat,
) {
    manager.register_pipeline(
        PipelineId::ShadowDepth,
        PipelineConfig::default_with_shader("shadow_depth.wgsl")
            .with_bind_group_layouts(&[&layouts.shadow])
            .with_vertex_input(VertexInput::MeshInstanced)
            .with_cull_mode(Some(Face::Front))
            .with_depth(DEPTH_FORMAT, true, CompareFunction::Less)
            .with_depth_bias(2, 2.0),
    );

    for variant in MaterialVariant::ALL {
        manager.register_pipeline(
            gbuffer_pipeline(variant),
            PipelineConfig::default_with_shader(gbuffer_shader(variant))
                .with_bind_group_layouts(&[&layouts.camera, materials.get(variant)])
                .with_vertex_input(VertexInput::MeshInstanced)
                .with_depth(DEPTH_FORMAT, true, CompareFunction::Less)
                .with_color_targets(gbuffer.color_targets(None)),
        );
    }

    manager.register_pipeline(
        PipelineId::Ssao,
        post_process("ssao.wgsl")
            .with_bind_group_layouts(&[&layouts.camera, &layouts.gbuffer, &layouts.ssao])
            .with_color_target(OCCLUSION_FORMAT, None),
    );
    manager.register_pipeline(
        PipelineId::SsaoBlur,
        post_process("ssao_blur.wgsl")
            .with_bind_group_layouts(&[&layouts.single_texture])
            .with_color_target(OCCLUSION_FORMAT, None),
    );

    manager.register_pipeline(
        PipelineId::LightingAmbient,
        post_process("lighting_ambient.wgsl")
            .with_bind_group_layouts(&[&layouts.camera, &layouts.gbuffer, &layouts.ambient])
            .with_color_target(HDR_FORMAT, None),
    );
    manager.register_pipeline(
        PipelineId::LightingPoint,
        PipelineConfig::default_with_shader("lighting_point.wgsl")
            .with_bind_group_layouts(&[&layouts.camera, &layouts.gbuffer])
            .with_vertex_input(VertexInput::MeshPointLights)
            .with_cull_mode(Some(Face::Front))
            .with_color_target(HDR_FORMAT, Some(ADDITIVE_BLEND)),
    );
    manager.register_pipeline(
        PipelineId::LightingDirectional,
        post_process("lighting_directional.wgsl")
            .with_bind_group_layouts(&[&layouts.camera, &layouts.gbuffer, &layouts.directional])
            .with_color_target(HDR_FORMAT, Some(ADDITIVE_BLEND)),
    );

    manager.register_pipeline(
        PipelineId::DebugLight,
        PipelineConfig::default_with_shader("debug_light.wgsl")
            .with_bind_group_layouts(&[&layouts.camera])
            .with_vertex_input(VertexInput::MeshPointLights)
            .with_depth(DEPTH_FORMAT, true, CompareFunction::Less)
            .with_color_target(HDR_FORMAT, None),
    );
    manager.register_pipeline(
        PipelineId::Skybox,
        PipelineConfig::default_with_shader("skybox.wgsl")
            .with_bind_group_layouts(&[&layouts.camera, &layouts.cube_source])
            .with_cull_mode(None)
            .with_depth(DEPTH_FORMAT, false, CompareFunction::LessEqual)
            .with_color_target(HDR_FORMAT, None),
    );

    manager.register_pipeline(
        PipelineId::BloomDownsample,
        post_process("bloom_downsample.wgsl")
            .with_bind_group_layouts(&[&layouts.bloom])
            .with_color_target(HDR_FORMAT, None),
    );
    manager.register_pipeline(
        PipelineId::BloomUpsample,
        post_process("bloom_upsample.wgsl")
            .with_bind_group_layouts(&[&layouts.bloom])
            .with_color_target(HDR_FORMAT, Some(ADDITIVE_BLEND)),
    );
    manager.register_pipeline(
        PipelineId::Tonemap,
        post_process("tonemap.wgsl")
            .with_bind_group_layouts(&[&layouts.tonemap])
            .with_color_target(output_format, None),
    );

    let capture = |shader: &str, source: &wgpu::BindGroupLayout| {
        PipelineConfig::default_with_shader(shader)
            .with_bind_group_layouts(&[&layouts.capture, source])
            .with_cull_mode(None)
            .with_color_target(CUBEMAP_FORMAT, None)
    };
    manager.register_pipeline(
        PipelineId::EquirectToCube,
        capture("ibl_equirect_to_cube.wgsl", &layouts.equirect_source),
    );
    manager.register_pipeline(PipelineId::Irradiance, capture("ibl_irradiance.wgsl", &layouts.cube_source));
    manager.register_pipeline(PipelineId::Prefilter, capture("ibl_prefilter.wgsl", &layouts.cube_source));
    manager.register_pipeline(
        PipelineId::BrdfLut,
        post_process("ibl_brdf.wgsl").with_color_target(BRDF_LUT_FORMAT, None),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_material_variant_has_its_own_pipeline() {
        let ids: Vec<PipelineId> = MaterialVariant::ALL.iter().map(|v| gbuffer_pipeline(*v)).collect();
        assert_eq!(
            ids,
            vec![PipelineId::GBufferPbr, PipelineId::GBufferPbrNoAo, PipelineId::GBufferPbrArm]
        );
    }

    #[test]
    fn gbuffer_shaders_are_builtin() {
        let builtin: Vec<&str> = super::super::pipeline_manager::builtin_shaders()
            .iter()
            .map(|(name, _)| *name)
            .collect();
        for variant in MaterialVariant::ALL {
            assert!(builtin.contains(&gbuffer_shader(variant)));
        }
    }
}
