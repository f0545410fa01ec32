//! Render pipeline management
//!
//! Every pass pipeline is registered up front with a [`PipelineConfig`] and
//! built by [`PipelineManager::create_all_pipelines`]. Shader modules come
//! from combined `#shader`-tagged sources; compiler diagnostics are logged
//! verbatim and a pipeline whose shader fails stays unavailable.

use std::{collections::HashMap, sync::Arc};
use wgpu::*;

use super::shader_source::split_stages;
use crate::error::ShaderError;
use crate::gfx::lights::PointLightInstance;
use crate::gfx::scene::vertex::{InstanceData, Vertex3D};

/// Every pipeline the renderer draws with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineId {
    ShadowDepth,
    GBufferPbr,
    GBufferPbrNoAo,
    GBufferPbrArm,
    Ssao,
    SsaoBlur,
    LightingAmbient,
    LightingPoint,
    LightingDirectional,
    DebugLight,
    Skybox,
    BloomDownsample,
    BloomUpsample,
    Tonemap,
    EquirectToCube,
    Irradiance,
    Prefilter,
    BrdfLut,
}

/// Built-in combined shader sources, by file name
const BUILTIN_SHADERS: &[(&str, &str)] = &[
    ("shadow_depth.wgsl", include_str!("shaders/shadow_depth.wgsl")),
    ("gbuffer_pbr.wgsl", include_str!("shaders/gbuffer_pbr.wgsl")),
    ("gbuffer_pbr_no_ao.wgsl", include_str!("shaders/gbuffer_pbr_no_ao.wgsl")),
    ("gbuffer_pbr_arm.wgsl", include_str!("shaders/gbuffer_pbr_arm.wgsl")),
    ("ssao.wgsl", include_str!("shaders/ssao.wgsl")),
    ("ssao_blur.wgsl", include_str!("shaders/ssao_blur.wgsl")),
    ("lighting_ambient.wgsl", include_str!("shaders/lighting_ambient.wgsl")),
    ("lighting_point.wgsl", include_str!("shaders/lighting_point.wgsl")),
    ("lighting_directional.wgsl", include_str!("shaders/lighting_directional.wgsl")),
    ("debug_light.wgsl", include_str!("shaders/debug_light.wgsl")),
    ("skybox.wgsl", include_str!("shaders/skybox.wgsl")),
    ("bloom_downsample.wgsl", include_str!("shaders/bloom_downsample.wgsl")),
    ("bloom_upsample.wgsl", include_str!("shaders/bloom_upsample.wgsl")),
    ("tonemap.wgsl", include_str!("shaders/tonemap.wgsl")),
    ("ibl_equirect_to_cube.wgsl", include_str!("shaders/ibl_equirect_to_cube.wgsl")),
    ("ibl_irradiance.wgsl", include_str!("shaders/ibl_irradiance.wgsl")),
    ("ibl_prefilter.wgsl", include_str!("shaders/ibl_prefilter.wgsl")),
    ("ibl_brdf.wgsl", include_str!("shaders/ibl_brdf.wgsl")),
];

pub fn builtin_shaders() -> &'static [(&'static str, &'static str)] {
    BUILTIN_SHADERS
}

/// Vertex buffers a pipeline consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexInput {
    Mesh,
    /// Mesh plus per-instance model and normal matrices (slot 1)
    MeshInstanced,
    /// Mesh plus per-instance point light data (slot 1)
    MeshPointLights,
}

impl VertexInput {
    fn layouts(self) -> Vec<VertexBufferLayout<'static>> {
        match self {
            VertexInput::Mesh => vec![Vertex3D::desc()],
            VertexInput::MeshInstanced => vec![Vertex3D::desc(), InstanceData::desc()],
            VertexInput::MeshPointLights => vec![Vertex3D::desc(), PointLightInstance::desc()],
        }
    }
}

/// Configuration for creating a render pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub label: String,
    pub shader: String,
    pub bind_group_layouts: Vec<BindGroupLayout>,
    pub vertex_input: VertexInput,
    pub cull_mode: Option<Face>,
    pub depth_stencil: Option<DepthStencilState>,
    pub color_targets: Vec<Option<ColorTargetState>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            label: "Default Pipeline".to_string(),
            shader: "shader.wgsl".to_string(),
            bind_group_layouts: Vec::new(),
            vertex_input: VertexInput::Mesh,
            cull_mode: Some(Face::Back),
            depth_stencil: None,
            color_targets: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn default_with_shader(shader: &str) -> Self {
        Self {
            label: shader.trim_end_matches(".wgsl").to_string(),
            shader: shader.to_string(),
            ..Default::default()
        }
    }

    pub fn with_cull_mode(mut self, face: Option<Face>) -> Self {
        self.cull_mode = face;
        self
    }

    pub fn with_bind_group_layouts(mut self, layouts: &[&BindGroupLayout]) -> Self {
        self.bind_group_layouts = layouts.iter().map(|layout| (*layout).clone()).collect();
        self
    }

    pub fn with_vertex_input(mut self, input: VertexInput) -> Self {
        self.vertex_input = input;
        self
    }

    /// Depth test against a [`crate::gfx::framebuffer::DEPTH_FORMAT`] attachment
    pub fn with_depth(mut self, format: TextureFormat, write: bool, compare: CompareFunction) -> Self {
        self.depth_stencil = Some(DepthStencilState {
            format,
            depth_write_enabled: write,
            depth_compare: compare,
            stencil: StencilState::default(),
            bias: DepthBiasState::default(),
        });
        self
    }

    pub fn with_depth_bias(mut self, constant: i32, slope_scale: f32) -> Self {
        if let Some(depth) = &mut self.depth_stencil {
            depth.bias = DepthBiasState {
                constant,
                slope_scale,
                clamp: 0.0,
            };
        }
        self
    }

    pub fn with_color_targets(mut self, targets: Vec<Option<ColorTargetState>>) -> Self {
        self.color_targets = targets;
        self
    }

    /// Single color target of `format` with optional blending
    pub fn with_color_target(self, format: TextureFormat, blend: Option<BlendState>) -> Self {
        self.with_color_targets(vec![Some(ColorTargetState {
            format,
            blend,
            write_mask: ColorWrites::ALL,
        })])
    }
}

/// Additive blend used for light accumulation and bloom upsampling
pub const ADDITIVE_BLEND: BlendState = BlendState {
    color: BlendComponent {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::One,
        operation: BlendOperation::Add,
    },
    alpha: BlendComponent {
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::One,
        operation: BlendOperation::Add,
    },
};

struct StageModules {
    vertex: ShaderModule,
    fragment: Option<ShaderModule>,
}

pub struct PipelineManager {
    device: Arc<Device>,
    pipelines: HashMap<PipelineId, RenderPipeline>,
    pipeline_configs: HashMap<PipelineId, PipelineConfig>,
    shader_modules: HashMap<String, StageModules>,
}

impl PipelineManager {
    pub fn new(device: Arc<Device>) -> Self {
        Self {
            device,
            pipelines: HashMap::new(),
            pipeline_configs: HashMap::new(),
            shader_modules: HashMap::new(),
        }
    }

    /// Compiles every built-in shader; failures are logged and skipped
    pub fn load_builtin_shaders(&mut self) -> usize {
        let mut failures = 0;
        for (name, source) in builtin_shaders() {
            if let Err(err) = self.load_shader(name, source) {
                log::error!("{}", err);
                failures += 1;
            }
        }
        failures
    }

    /// Splits and compiles a combined shader source
    pub fn load_shader(&mut self, name: &str, source: &str) -> Result<(), ShaderError> {
        let stages = split_stages(name, source)?;
        let vertex = self.compile(&format!("{} (vertex)", name), stages.vertex)?;
        let fragment = match stages.fragment {
            Some(fragment) => Some(self.compile(&format!("{} (fragment)", name), fragment)?),
            None => None,
        };

        self.shader_modules
            .insert(name.to_string(), StageModules { vertex, fragment });
        Ok(())
    }

    fn compile(&self, label: &str, source: String) -> Result<ShaderModule, ShaderError> {
        self.device.push_error_scope(ErrorFilter::Validation);
        let module = self.device.create_shader_module(ShaderModuleDescriptor {
            label: Some(label),
            source: ShaderSource::Wgsl(source.into()),
        });
        let scope_error = pollster::block_on(self.device.pop_error_scope());

        let info = pollster::block_on(module.get_compilation_info());
        let mut log_text = String::new();
        let mut has_errors = false;
        for message in &info.messages {
            let line = message.location.map(|l| l.line_number).unwrap_or(0);
            let entry = format!("{}:{}: {}", label, line, message.message);
            match message.message_type {
                CompilationMessageType::Error => {
                    has_errors = true;
                    log::error!("{}", entry);
                }
                CompilationMessageType::Warning => log::warn!("{}", entry),
                CompilationMessageType::Info => log::info!("{}", entry),
            }
            log_text.push_str(&entry);
            log_text.push('\n');
        }

        if let Some(error) = scope_error {
            log_text.push_str(&error.to_string());
            has_errors = true;
        }
        if has_errors {
            return Err(ShaderError::Compilation {
                label: label.to_string(),
                log: log_text,
            });
        }
        Ok(module)
    }

    pub fn register_pipeline(&mut self, id: PipelineId, config: PipelineConfig) {
        self.pipeline_configs.insert(id, config);
    }

    /// Builds every registered pipeline that is not built yet
    pub fn create_all_pipelines(&mut self) -> Result<(), Vec<ShaderError>> {
        let mut errors = Vec::new();
        let pending: Vec<(PipelineId, PipelineConfig)> = self
            .pipeline_configs
            .iter()
            .filter(|(id, _)| !self.pipelines.contains_key(id))
            .map(|(id, config)| (*id, config.clone()))
            .collect();

        for (id, config) in pending {
            match self.create_pipeline_from_config(&config) {
                Ok(pipeline) => {
                    self.pipelines.insert(id, pipeline);
                }
                Err(err) => {
                    log::error!("Failed to create pipeline {:?}: {}", id, err);
                    errors.push(err);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The built pipeline for `id`.
    ///
    /// A missing pipeline means its shader failed to build; callers skip the
    /// draw and debug builds assert.
    pub fn get(&self, id: PipelineId) -> Option<&RenderPipeline> {
        let pipeline = self.lookup(id);
        if pipeline.is_none() {
            log::error!("Pipeline {:?} is not available", id);
            debug_assert!(false, "pipeline {:?} used before it was built", id);
        }
        pipeline
    }

    /// Like [`Self::get`] for callers that already reported the failure
    pub fn lookup(&self, id: PipelineId) -> Option<&RenderPipeline> {
        self.pipelines.get(&id)
    }

    /// The ids in `ids` that have no built pipeline
    pub fn missing(&self, ids: &[PipelineId]) -> Vec<PipelineId> {
        ids.iter().copied().filter(|id| !self.pipelines.contains_key(id)).collect()
    }

    fn create_pipeline_from_config(&self, config: &PipelineConfig) -> Result<RenderPipeline, ShaderError> {
        let modules = self
            .shader_modules
            .get(&config.shader)
            .ok_or_else(|| ShaderError::NotFound(config.shader.clone()))?;

        let bind_group_layout_refs: Vec<&BindGroupLayout> = config.bind_group_layouts.iter().collect();

        self.device.push_error_scope(ErrorFilter::Validation);
        let pipeline_layout = self.device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some(&format!("{} Layout", config.label)),
            bind_group_layouts: &bind_group_layout_refs,
            push_constant_ranges: &[],
        });

        let fragment_state = modules.fragment.as_ref().map(|module| FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &config.color_targets,
            compilation_options: PipelineCompilationOptions::default(),
        });

        let vertex_buffers = config.vertex_input.layouts();

        let pipeline = self.device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some(&config.label),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &modules.vertex,
                entry_point: Some("vs_main"),
                buffers: &vertex_buffers,
                compilation_options: PipelineCompilationOptions::default(),
            },
            fragment: fragment_state,
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: FrontFace::Ccw,
                cull_mode: config.cull_mode,
                polygon_mode: PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: config.depth_stencil.clone(),
            multisample: MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(ShaderError::Link {
                label: config.label.clone(),
                log: error.to_string(),
            });
        }
        Ok(pipeline)
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_shaders_split_into_stages() {
        for (name, source) in builtin_shaders() {
            let stages = split_stages(name, source).unwrap_or_else(|err| panic!("{}", err));
            assert!(stages.vertex.contains("fn vs_main"), "{} has no vs_main", name);
            if let Some(fragment) = &stages.fragment {
                assert!(fragment.contains("fn fs_main"), "{} has no fs_main", name);
            }
        }
    }

    #[test]
    fn only_the_shadow_pass_is_depth_only() {
        for (name, source) in builtin_shaders() {
            let stages = split_stages(name, source).unwrap();
            assert_eq!(stages.fragment.is_none(), *name == "shadow_depth.wgsl", "{}", name);
        }
    }
}
