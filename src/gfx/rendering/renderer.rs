//! Deferred renderer
//!
//! Owns every GPU object of the pipeline and runs the fixed pass table in
//! [`FRAME_PASSES`] once per [`Renderer::draw_scene`]. Camera matrices are
//! pushed separately through [`Renderer::update_projection_matrix`] and
//! [`Renderer::update_view_matrix`]; the camera itself is never stored.

use std::mem::offset_of;
use std::path::Path;
use std::sync::Arc;

use cgmath::{Matrix4, Point3};
use image::{Rgba32FImage, RgbaImage};

use super::bloom::BloomRenderer;
use super::ibl::{gradient_sky, mean_radiance, IblBaker, IblMaps};
use super::layouts::RenderLayouts;
use super::pass_pipelines::{gbuffer_pipeline, register_pass_pipelines};
use super::passes::{plan_geometry, validate_pass_order, FramePlan, PassKind, FRAME_PASSES, INIT_RESOURCES};
use super::pipeline_manager::{PipelineId, PipelineManager};
use super::shadow::{compute_cascade_splits, frustum_corners_world, fit_cascade, CascadeFit};
use super::ssao::{generate_kernel, generate_noise, SsaoUniform, SSAO_NOISE_SIZE};
use super::targets::{RenderTargets, ShadowCascades};
use crate::config::{RendererConfig, SHADOW_CASCADE_COUNT};
use crate::error::{AssetError, FramebufferError, RendererError};
use crate::gfx::camera::camera_utils::{inverse_or_identity, Camera, CameraUniform};
use crate::gfx::framebuffer::Framebuffer;
use crate::gfx::geometry::{
    generate_cube, generate_fullscreen_quad, generate_sphere, sphere_enclosing_scale, Aabb,
};
use crate::gfx::lights::{DirectionalLight, DirectionalLightUniform, LightSet, PointLight, PointLightInstance};
use crate::gfx::resources::material::{Material, MaterialId, MaterialManager};
use crate::gfx::resources::texture_manager::{load_cubemap, load_hdr_image, TextureManager};
use crate::gfx::resources::texture_resource::TextureResource;
use crate::gfx::scene::import::{self, ImportedMaterial};
use crate::gfx::scene::mesh::{DrawMesh, Mesh, MeshId, MeshManager};
use crate::gfx::scene::scene_graph::{NodeId, SceneGraph};
use crate::gfx::scene::vertex::InstanceData;
use crate::wgpu_utils::{bind_group, InstanceBuffer, UniformBuffer};

const SPHERE_SEGMENTS: (u32, u32) = (24, 16);

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct TonemapUniform {
    /// Exposure, bloom strength, bloom enabled (0/1), gamma encode (0/1)
    pub params: [f32; 4],
}

/// Bind groups that reference viewport-sized targets or IBL maps
struct FrameBindGroups {
    gbuffer: wgpu::BindGroup,
    ssao: wgpu::BindGroup,
    ssao_blur: wgpu::BindGroup,
    ambient: wgpu::BindGroup,
    skybox: wgpu::BindGroup,
    tonemap: wgpu::BindGroup,
}

/// Built-in meshes drawn by the non-scene passes
struct BuiltinMeshes {
    quad: MeshId,
    cube: MeshId,
    /// Unit-radius light volume, scaled per instance by the light radius
    sphere: MeshId,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: u32,
    pub height: u32,
}

pub struct Renderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: RendererConfig,
    output_format: wgpu::TextureFormat,
    viewport: Viewport,

    pipelines: PipelineManager,
    layouts: RenderLayouts,

    scene_graph: SceneGraph,
    meshes: MeshManager,
    textures: TextureManager,
    materials: MaterialManager,
    lights: LightSet,
    builtin: BuiltinMeshes,

    camera: UniformBuffer<CameraUniform>,
    camera_bind_group: wgpu::BindGroup,

    targets: RenderTargets,
    cascades: ShadowCascades,
    cascade_splits: Vec<f32>,
    bloom: BloomRenderer,
    ibl: IblMaps,

    ssao_uniform: UniformBuffer<SsaoUniform>,
    ssao_kernel: Vec<[f32; 4]>,
    ssao_noise: TextureResource,
    directional: UniformBuffer<DirectionalLightUniform>,
    directional_bind_group: wgpu::BindGroup,
    tonemap: UniformBuffer<TonemapUniform>,

    linear_sampler: wgpu::Sampler,
    black: TextureResource,
    frame: Option<FrameBindGroups>,

    instances: InstanceBuffer<InstanceData>,
    light_instances: InstanceBuffer<PointLightInstance>,

    shut_down: bool,
}

impl Renderer {
    /// Builds every pipeline, allocates the targets and bakes the IBL maps.
    ///
    /// Shader failures are logged and leave the affected passes disabled;
    /// framebuffer and asset failures are returned.
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        output_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        config: RendererConfig,
    ) -> Result<Self, RendererError> {
        validate_pass_order(FRAME_PASSES, INIT_RESOURCES)?;
        let (width, height) = (width.max(1), height.max(1));
        log::info!("Initializing renderer at {}x{} ({:?})", width, height, output_format);

        let layouts = RenderLayouts::new(&device);
        let materials = MaterialManager::new(&device);

        let camera = UniformBuffer::new_with_data(
            &device,
            &CameraUniform {
                viewport: [0.0, 0.0, width as f32, height as f32],
                ..Default::default()
            },
        );
        let camera_bind_group = bind_group(&device, "Camera Bind Group", &layouts.camera, &[camera.binding_resource()]);

        let mut meshes = MeshManager::new();
        let builtin = BuiltinMeshes {
            quad: meshes.add(&device, Mesh::from_geometry("Fullscreen Quad", generate_fullscreen_quad())),
            cube: meshes.add(&device, Mesh::from_geometry("Unit Cube", generate_cube())),
            sphere: {
                let (longitude, latitude) = SPHERE_SEGMENTS;
                let mut sphere = generate_sphere(longitude, latitude);
                let scale = sphere_enclosing_scale(longitude, latitude);
                for vertex in &mut sphere.vertices {
                    *vertex = vertex.map(|c| c * scale);
                }
                meshes.add(&device, Mesh::from_geometry("Light Volume", sphere))
            },
        };

        let mut targets = RenderTargets::new(&device, width, height, config.bloom_mip_count)?;
        let cascades = match ShadowCascades::new(&device, &layouts.shadow, config.shadow_map_size) {
            Ok(cascades) => cascades,
            Err(err) => {
                targets.delete();
                return Err(err.into());
            }
        };
        let cascade_splits = compute_cascade_splits(
            config.near_plane,
            config.far_plane,
            SHADOW_CASCADE_COUNT,
            config.cascade_split_lambda,
        )?;
        log::debug!("Shadow cascade splits: {:?}", cascade_splits);

        let mut pipelines = PipelineManager::new(device.clone());
        let loaded = pipelines.load_builtin_shaders();
        log::debug!("Loaded {} built-in shaders", loaded);
        register_pass_pipelines(
            &mut pipelines,
            &layouts,
            materials.layouts(),
            &targets.gbuffer,
            output_format,
        );
        if let Err(errors) = pipelines.create_all_pipelines() {
            log::error!("{} pipelines failed to build; their passes are disabled", errors.len());
        }

        let mut rng = rand::rng();
        let ssao_kernel = generate_kernel(&mut rng, config.ssao_kernel_size);
        let ssao_noise = TextureResource::from_rgba32f_tiled(
            &device,
            &queue,
            &generate_noise(&mut rng),
            SSAO_NOISE_SIZE,
            SSAO_NOISE_SIZE,
            "SSAO Noise",
        );
        let ssao_uniform = UniformBuffer::new_with_data(
            &device,
            &SsaoUniform::new(&ssao_kernel, config.ssao_radius, config.ssao_bias, width, height),
        );

        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Clamp Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Comparison Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let directional = UniformBuffer::new_with_data(&device, &DirectionalLightUniform::default());
        let mut directional_resources = vec![directional.binding_resource()];
        directional_resources.extend(cascades.views().into_iter().map(wgpu::BindingResource::TextureView));
        directional_resources.push(wgpu::BindingResource::Sampler(&shadow_sampler));
        let directional_bind_group = bind_group(
            &device,
            "Directional Light Bind Group",
            &layouts.directional,
            &directional_resources,
        );

        let tonemap = UniformBuffer::new_with_data(
            &device,
            &TonemapUniform {
                params: [
                    config.exposure,
                    config.bloom_strength,
                    0.0,
                    if output_format.is_srgb() { 0.0 } else { 1.0 },
                ],
            },
        );
        let black = TextureResource::from_rgba8(
            &device,
            &queue,
            RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255])),
            false,
            "Black Placeholder",
        );

        let radiance = environment_radiance(&config)?;
        let ibl = {
            let baker = IblBaker {
                device: &device,
                queue: &queue,
                pipelines: &pipelines,
                layouts: &layouts,
                cube: require_mesh(&meshes, builtin.cube)?,
                quad: require_mesh(&meshes, builtin.quad)?,
            };
            baker.bake(&radiance, &config)?
        };

        let mut bloom = BloomRenderer::new(&device, config.bloom_filter_radius);
        bloom.rebuild(&device, &layouts, &targets);

        let lights = LightSet::new(config.max_point_lights);
        let light_instances = InstanceBuffer::new(&device, config.max_point_lights.max(1));
        let instances = InstanceBuffer::new(&device, 64);

        let mut renderer = Self {
            device,
            queue,
            output_format,
            viewport: Viewport {
                x: 0.0,
                y: 0.0,
                width,
                height,
            },
            pipelines,
            layouts,
            scene_graph: SceneGraph::new(),
            meshes,
            textures: TextureManager::new(),
            materials,
            lights,
            builtin,
            camera,
            camera_bind_group,
            targets,
            cascades,
            cascade_splits,
            bloom,
            ibl,
            ssao_uniform,
            ssao_kernel,
            ssao_noise,
            directional,
            directional_bind_group,
            tonemap,
            linear_sampler,
            black,
            frame: None,
            instances,
            light_instances,
            shut_down: false,
            config,
        };
        renderer.rebuild_frame_bind_groups();
        log::info!(
            "Renderer ready: {} pipelines, bloom {}",
            renderer.pipelines.pipeline_count(),
            if renderer.targets.bloom_enabled() { "on" } else { "off" }
        );
        Ok(renderer)
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn output_format(&self) -> wgpu::TextureFormat {
        self.output_format
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn scene_graph(&self) -> &SceneGraph {
        &self.scene_graph
    }

    pub fn scene_graph_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene_graph
    }

    pub fn lights(&self) -> &LightSet {
        &self.lights
    }

    /// Moves the output rectangle and resizes every viewport-sized target.
    ///
    /// If a target cannot be allocated at the new size the error is returned
    /// and [`Self::draw_scene`] records nothing until a later call succeeds.
    pub fn set_viewport(&mut self, position: (f32, f32), size: (u32, u32)) -> Result<(), RendererError> {
        let (width, height) = size;
        if width == 0 || height == 0 {
            log::warn!("Ignoring zero-sized viewport {}x{}", width, height);
            return Ok(());
        }

        // A failed resize leaves no frame bind groups; any later call retries
        let resized = (width, height) != (self.viewport.width, self.viewport.height) || self.frame.is_none();
        self.viewport = Viewport {
            x: position.0,
            y: position.1,
            width,
            height,
        };
        self.camera.update_field(
            &self.queue,
            offset_of!(CameraUniform, viewport),
            &[position.0, position.1, width as f32, height as f32],
        );

        if resized {
            log::info!("Resizing render targets to {}x{}", width, height);
            if let Err(err) = self.targets.resize(&self.device, width, height) {
                // The cached bind groups still reference the released targets
                self.frame = None;
                log::error!("Frames are skipped until a viewport resize succeeds");
                return Err(err.into());
            }
            self.bloom.rebuild(&self.device, &self.layouts, &self.targets);
            self.ssao_uniform.update_content(
                &self.queue,
                SsaoUniform::new(
                    &self.ssao_kernel,
                    self.config.ssao_radius,
                    self.config.ssao_bias,
                    width,
                    height,
                ),
            );
            self.rebuild_frame_bind_groups();
        }
        Ok(())
    }

    pub fn update_projection_matrix(&mut self, camera: &impl Camera) {
        let projection = camera.projection_matrix();
        let inverse: [[f32; 4]; 4] = inverse_or_identity(projection).into();
        let projection: [[f32; 4]; 4] = projection.into();
        self.camera
            .update_field(&self.queue, offset_of!(CameraUniform, projection), &projection);
        self.camera
            .update_field(&self.queue, offset_of!(CameraUniform, inv_projection), &inverse);
    }

    pub fn update_view_matrix(&mut self, camera: &impl Camera) {
        let view = camera.view_matrix();
        let inverse: [[f32; 4]; 4] = inverse_or_identity(view).into();
        let view: [[f32; 4]; 4] = view.into();
        let position = camera.position();
        self.camera.update_field(&self.queue, offset_of!(CameraUniform, view), &view);
        self.camera
            .update_field(&self.queue, offset_of!(CameraUniform, inv_view), &inverse);
        self.camera.update_field(
            &self.queue,
            offset_of!(CameraUniform, position),
            &[position.x, position.y, position.z, 1.0],
        );
    }

    pub fn set_directional_light(&mut self, light: Option<DirectionalLight>) {
        self.lights.set_directional_light(light);
    }

    pub fn push_point_light(&mut self, light: PointLight) {
        self.lights.push_point_light(light);
    }

    pub fn pop_point_light(&mut self) -> Option<PointLight> {
        self.lights.pop_point_light()
    }

    pub fn set_point_light(&mut self, index: usize, light: PointLight) {
        self.lights.set_point_light(index, light);
    }

    /// Imports a model and links it under the scene root.
    ///
    /// Meshes whose material is unsupported or whose textures fail to load
    /// are skipped with a warning. Returns the grouping node created for
    /// every imported node.
    pub fn load_model(&mut self, path: impl AsRef<Path>, flip_uvs: bool) -> Result<Vec<NodeId>, AssetError> {
        let path = path.as_ref();
        let mut scene = import::load_model(path, flip_uvs)?;

        let materials: Vec<Option<MaterialId>> = scene
            .materials
            .iter()
            .map(|material| self.upload_material(material))
            .collect();

        let mut bindings = Vec::with_capacity(scene.meshes.len());
        let mut skipped = 0;
        for mesh in &mut scene.meshes {
            let Some(material) = mesh.material.and_then(|index| materials.get(index).copied().flatten()) else {
                log::warn!("Skipping mesh '{}' in '{}': no usable material", mesh.name, path.display());
                skipped += 1;
                bindings.push(None);
                continue;
            };
            let geometry = std::mem::take(&mut mesh.geometry);
            let id = self.meshes.add(&self.device, Mesh::from_geometry(&mesh.name, geometry));
            bindings.push(Some((id, material)));
        }

        let nodes = import::instantiate(&mut self.scene_graph, &scene, &bindings);
        log::info!(
            "Loaded '{}': {} nodes, {} meshes ({} skipped), {} materials",
            path.display(),
            nodes.len(),
            scene.meshes.len() - skipped,
            skipped,
            materials.iter().flatten().count()
        );
        Ok(nodes)
    }

    fn upload_material(&mut self, imported: &ImportedMaterial) -> Option<MaterialId> {
        if imported.textures.classify().is_none() {
            log::warn!("{}", AssetError::UnsupportedMaterial(imported.name.clone()));
            return None;
        }

        let (device, queue) = (&self.device, &self.queue);
        let textures = &mut self.textures;
        let loaded = imported
            .textures
            .clone()
            .try_map(|source, srgb| textures.load_source(device, queue, &source, srgb));
        let material = loaded.and_then(|ids| Material::from_textures(&imported.name, &ids));

        match material {
            Ok(material) => Some(self.materials.add(&self.device, &self.textures, material)),
            Err(err) => {
                log::warn!("Material '{}' failed to load: {}", imported.name, err);
                None
            }
        }
    }

    /// Replaces the radiance map and rebakes every IBL map
    pub fn set_environment_map(&mut self, path: impl AsRef<Path>) -> Result<(), RendererError> {
        let radiance = load_radiance(path.as_ref())?;
        let maps = self.ibl_baker()?.bake(&radiance, &self.config)?;
        self.install_ibl(maps);
        self.config.environment_map = Some(path.as_ref().to_path_buf());
        Ok(())
    }

    /// Uses six face images (+X, -X, +Y, -Y, +Z, -Z) as the environment.
    ///
    /// The faces are shown by the skybox as loaded; only the irradiance and
    /// prefilter maps are convolved from them.
    pub fn set_environment_cubemap(&mut self, faces: [&Path; 6]) -> Result<(), RendererError> {
        let environment = load_cubemap(&self.device, &self.queue, faces)?;
        log::info!(
            "Loaded environment cubemap '{}' ({} px faces)",
            faces[0].display(),
            environment.texture.width()
        );
        let maps = match self.ibl_baker() {
            Ok(baker) => baker.convolve(environment, &self.config),
            Err(err) => {
                environment.destroy();
                return Err(err.into());
            }
        }?;
        self.install_ibl(maps);
        self.config.environment_map = None;
        Ok(())
    }

    fn ibl_baker(&self) -> Result<IblBaker<'_>, FramebufferError> {
        Ok(IblBaker {
            device: &self.device,
            queue: &self.queue,
            pipelines: &self.pipelines,
            layouts: &self.layouts,
            cube: require_mesh(&self.meshes, self.builtin.cube)?,
            quad: require_mesh(&self.meshes, self.builtin.quad)?,
        })
    }

    fn install_ibl(&mut self, maps: IblMaps) {
        let mut previous = std::mem::replace(&mut self.ibl, maps);
        previous.delete();
        self.rebuild_frame_bind_groups();
    }

    /// World-space bounds of every mesh in the scene graph
    pub fn scene_bounds(&mut self) -> Aabb {
        let meshes = &self.meshes;
        let mut bounds = Aabb::EMPTY;
        self.scene_graph.for_each_no_instancing(|key, transform| {
            if let Some(mesh) = meshes.get(key.mesh) {
                bounds = bounds.union(mesh.bounds().transformed(&transform));
            }
        });
        bounds
    }

    fn rebuild_frame_bind_groups(&mut self) {
        self.frame = self.build_frame_bind_groups();
        if self.frame.is_none() {
            log::error!("Frame bind groups could not be built; frames will be skipped");
        }

        let bloom_enabled = self.targets.bloom_enabled();
        let mut params = [
            self.config.exposure,
            self.config.bloom_strength,
            if bloom_enabled { 1.0 } else { 0.0 },
            if self.output_format.is_srgb() { 0.0 } else { 1.0 },
        ];
        if !bloom_enabled {
            params[1] = 0.0;
        }
        self.tonemap.update_content(&self.queue, TonemapUniform { params });
    }

    fn build_frame_bind_groups(&self) -> Option<FrameBindGroups> {
        let device = &self.device;
        let targets = &self.targets;
        let view = color_view;

        let gbuffer = bind_group(
            device,
            "G-Buffer Read Bind Group",
            &self.layouts.gbuffer,
            &[
                wgpu::BindingResource::TextureView(view(&targets.gbuffer, 0)?),
                wgpu::BindingResource::TextureView(view(&targets.gbuffer, 1)?),
                wgpu::BindingResource::TextureView(view(&targets.gbuffer, 2)?),
            ],
        );
        let ssao = bind_group(
            device,
            "SSAO Bind Group",
            &self.layouts.ssao,
            &[
                self.ssao_uniform.binding_resource(),
                wgpu::BindingResource::TextureView(&self.ssao_noise.view),
            ],
        );
        let ssao_blur = bind_group(
            device,
            "SSAO Blur Bind Group",
            &self.layouts.single_texture,
            &[
                wgpu::BindingResource::TextureView(view(&targets.ssao, 0)?),
                wgpu::BindingResource::Sampler(&self.linear_sampler),
            ],
        );
        let ambient = bind_group(
            device,
            "Ambient IBL Bind Group",
            &self.layouts.ambient,
            &[
                wgpu::BindingResource::TextureView(&self.ibl.irradiance.view),
                wgpu::BindingResource::TextureView(&self.ibl.prefilter.view),
                wgpu::BindingResource::TextureView(view(&self.ibl.brdf_lut, 0)?),
                wgpu::BindingResource::Sampler(&self.ibl.prefilter.sampler),
                wgpu::BindingResource::TextureView(view(&targets.ssao_blur, 0)?),
            ],
        );
        let skybox = bind_group(
            device,
            "Skybox Bind Group",
            &self.layouts.cube_source,
            &[
                wgpu::BindingResource::TextureView(&self.ibl.environment.view),
                wgpu::BindingResource::Sampler(&self.ibl.environment.sampler),
            ],
        );

        let bloom_view = if targets.bloom_enabled() {
            targets
                .bloom
                .mips()
                .first()
                .and_then(|mip| view(mip, 0))
                .unwrap_or(&self.black.view)
        } else {
            &self.black.view
        };
        let tonemap = bind_group(
            device,
            "Tonemap Bind Group",
            &self.layouts.tonemap,
            &[
                wgpu::BindingResource::TextureView(view(&targets.hdr, 0)?),
                wgpu::BindingResource::TextureView(bloom_view),
                wgpu::BindingResource::Sampler(&self.linear_sampler),
                self.tonemap.binding_resource(),
            ],
        );

        Some(FrameBindGroups {
            gbuffer,
            ssao,
            ssao_blur,
            ambient,
            skybox,
            tonemap,
        })
    }

    /// Instanced G-buffer batches for the current scene graph, as
    /// [`Self::draw_scene`] records them
    pub fn plan_frame(&mut self) -> FramePlan {
        let materials = &self.materials;
        plan_geometry(&mut self.scene_graph, |id| materials.variant(id))
    }

    /// False while a failed resize or shutdown keeps frames from being recorded
    pub fn is_frame_ready(&self) -> bool {
        !self.shut_down && self.frame.is_some()
    }

    /// Records one frame into `encoder`, finishing with the tonemapped image
    /// in the viewport rectangle of `output`.
    pub fn draw_scene(&mut self, encoder: &mut wgpu::CommandEncoder, output: &wgpu::TextureView, camera: &impl Camera) {
        if self.shut_down {
            log::warn!("draw_scene called after shutdown");
            return;
        }

        let plan = self.plan_frame();
        if !plan.instances.is_empty() {
            self.instances.upload(&self.device, &self.queue, &plan.instances);
        }
        let light_data: Vec<PointLightInstance> = self.lights.point_lights().iter().map(PointLight::instance).collect();
        if !light_data.is_empty() {
            self.light_instances.upload(&self.device, &self.queue, &light_data);
        }
        let has_shadows = self.update_directional_light(camera);
        log::debug!(
            "Frame: {} batches, {} instances, {} point lights",
            plan.batches.len(),
            plan.instance_count(),
            light_data.len()
        );

        let Some(frame) = self.frame.as_ref() else {
            return;
        };

        for pass in FRAME_PASSES {
            match pass.kind {
                PassKind::GBuffer => self.gbuffer_pass(encoder, &plan),
                PassKind::Ssao => self.ssao_pass(encoder, frame),
                PassKind::SsaoBlur => self.ssao_blur_pass(encoder, frame),
                PassKind::Shadow if has_shadows => self.shadow_pass(encoder, &plan),
                PassKind::Shadow => {}
                PassKind::Ambient => self.ambient_pass(encoder, frame),
                PassKind::PointLights => self.point_light_pass(encoder, frame, light_data.len() as u32),
                PassKind::DirectionalLight if has_shadows => self.directional_pass(encoder, frame),
                PassKind::DirectionalLight => {}
                PassKind::DepthBlit => {
                    self.targets.gbuffer.blit_depth_to(encoder, &self.targets.hdr);
                }
                PassKind::DebugLights if self.config.debug_light_markers => {
                    self.debug_light_pass(encoder, light_data.len() as u32)
                }
                PassKind::DebugLights => {}
                PassKind::Skybox if self.config.skybox => self.skybox_pass(encoder, frame),
                PassKind::Skybox => {}
                PassKind::BloomDownsample | PassKind::BloomUpsample if !self.targets.bloom_enabled() => {}
                PassKind::BloomDownsample => {
                    if let Some(quad) = self.meshes.get(self.builtin.quad) {
                        self.bloom.downsample(encoder, &self.pipelines, quad, &self.targets);
                    }
                }
                PassKind::BloomUpsample => {
                    if let Some(quad) = self.meshes.get(self.builtin.quad) {
                        self.bloom.upsample(encoder, &self.pipelines, quad, &self.targets);
                    }
                }
                PassKind::Tonemap => self.tonemap_pass(encoder, frame, output),
            }
        }
    }

    /// Fits the cascades to `camera` and uploads the light block.
    ///
    /// Returns false when no directional light is set.
    fn update_directional_light(&mut self, camera: &impl Camera) -> bool {
        let Some(light) = self.lights.directional_light().copied() else {
            return false;
        };

        let fit = CascadeFit {
            xy_margin: self.config.cascade_xy_margin,
            z_multiplier: self.config.cascade_z_multiplier,
        };
        let view = camera.view_matrix();
        let light_spaces: Vec<Matrix4<f32>> = self
            .cascade_splits
            .windows(2)
            .map(|range| {
                let corners = frustum_corners_world(camera.projection_for_range(range[0], range[1]), view);
                fit_cascade(&corners, light.direction(), fit)
            })
            .collect();
        self.cascades.update(&self.queue, &light_spaces);

        let mut uniform = DirectionalLightUniform {
            direction: light.direction().extend(0.0).into(),
            color: light.color().extend(1.0).into(),
            ..Default::default()
        };
        for (i, light_space) in light_spaces.iter().enumerate().take(SHADOW_CASCADE_COUNT) {
            uniform.light_space[i] = (*light_space).into();
            uniform.cascade_far[i] = self.cascade_splits[i + 1];
        }
        self.directional.update_content(&self.queue, uniform);
        true
    }

    fn quad(&self) -> Option<&Mesh> {
        self.meshes.get(self.builtin.quad)
    }

    fn gbuffer_pass(&self, encoder: &mut wgpu::CommandEncoder, plan: &FramePlan) {
        let Some(mut pass) = self.targets.gbuffer.bind_write(encoder, clear(wgpu::Color::TRANSPARENT), Some(clear_depth()))
        else {
            return;
        };
        if plan.batches.is_empty() {
            return;
        }

        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        pass.set_vertex_buffer(1, self.instances.buffer().slice(..));
        for batch in &plan.batches {
            let Some(pipeline) = self.pipelines.get(gbuffer_pipeline(batch.variant)) else {
                continue;
            };
            let (Some(mesh), Some(material)) = (
                self.meshes.get(batch.key.mesh),
                self.materials.bind_group(batch.key.material),
            ) else {
                log::debug!("Skipping batch {:?}: mesh or material missing", batch.key);
                continue;
            };
            pass.set_pipeline(pipeline);
            pass.set_bind_group(1, material, &[]);
            pass.draw_mesh_instanced(mesh, batch.instances.clone());
        }
    }

    fn ssao_pass(&self, encoder: &mut wgpu::CommandEncoder, frame: &FrameBindGroups) {
        let (Some(pipeline), Some(quad)) = (self.pipelines.get(PipelineId::Ssao), self.quad()) else {
            return;
        };
        let Some(mut pass) = self.targets.ssao.bind_write(encoder, clear(wgpu::Color::WHITE), None) else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        pass.set_bind_group(1, &frame.gbuffer, &[]);
        pass.set_bind_group(2, &frame.ssao, &[]);
        pass.draw_mesh(quad);
    }

    fn ssao_blur_pass(&self, encoder: &mut wgpu::CommandEncoder, frame: &FrameBindGroups) {
        let (Some(pipeline), Some(quad)) = (self.pipelines.get(PipelineId::SsaoBlur), self.quad()) else {
            return;
        };
        let Some(mut pass) = self.targets.ssao_blur.bind_write(encoder, clear(wgpu::Color::WHITE), None) else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &frame.ssao_blur, &[]);
        pass.draw_mesh(quad);
    }

    fn shadow_pass(&self, encoder: &mut wgpu::CommandEncoder, plan: &FramePlan) {
        let Some(pipeline) = self.pipelines.get(PipelineId::ShadowDepth) else {
            return;
        };
        for (cascade, map) in self.cascades.maps().iter().enumerate() {
            let Some(cascade_group) = self.cascades.bind_group(cascade) else {
                continue;
            };
            let Some(mut pass) = map.bind_write(encoder, clear(wgpu::Color::BLACK), Some(clear_depth())) else {
                continue;
            };
            if plan.batches.is_empty() {
                continue;
            }
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, cascade_group, &[]);
            pass.set_vertex_buffer(1, self.instances.buffer().slice(..));
            for batch in &plan.batches {
                if let Some(mesh) = self.meshes.get(batch.key.mesh) {
                    pass.draw_mesh_instanced(mesh, batch.instances.clone());
                }
            }
        }
    }

    fn ambient_pass(&self, encoder: &mut wgpu::CommandEncoder, frame: &FrameBindGroups) {
        let Some(mut pass) = self.targets.hdr.bind_write(encoder, clear(wgpu::Color::BLACK), None) else {
            return;
        };
        let (Some(pipeline), Some(quad)) = (self.pipelines.get(PipelineId::LightingAmbient), self.quad()) else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        pass.set_bind_group(1, &frame.gbuffer, &[]);
        pass.set_bind_group(2, &frame.ambient, &[]);
        pass.draw_mesh(quad);
    }

    fn point_light_pass(&self, encoder: &mut wgpu::CommandEncoder, frame: &FrameBindGroups, count: u32) {
        if count == 0 {
            return;
        }
        let (Some(pipeline), Some(sphere)) = (
            self.pipelines.get(PipelineId::LightingPoint),
            self.meshes.get(self.builtin.sphere),
        ) else {
            return;
        };
        let Some(mut pass) = self.targets.hdr.bind_write(encoder, load(), None) else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        pass.set_bind_group(1, &frame.gbuffer, &[]);
        pass.set_vertex_buffer(1, self.light_instances.buffer().slice(..));
        pass.draw_mesh_instanced(sphere, 0..count);
    }

    fn directional_pass(&self, encoder: &mut wgpu::CommandEncoder, frame: &FrameBindGroups) {
        let (Some(pipeline), Some(quad)) = (self.pipelines.get(PipelineId::LightingDirectional), self.quad()) else {
            return;
        };
        let Some(mut pass) = self.targets.hdr.bind_write(encoder, load(), None) else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        pass.set_bind_group(1, &frame.gbuffer, &[]);
        pass.set_bind_group(2, &self.directional_bind_group, &[]);
        pass.draw_mesh(quad);
    }

    fn debug_light_pass(&self, encoder: &mut wgpu::CommandEncoder, count: u32) {
        if count == 0 {
            return;
        }
        let (Some(pipeline), Some(sphere)) = (
            self.pipelines.get(PipelineId::DebugLight),
            self.meshes.get(self.builtin.sphere),
        ) else {
            return;
        };
        let Some(mut pass) = self.targets.hdr.bind_write(encoder, load(), Some(load_depth())) else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        pass.set_vertex_buffer(1, self.light_instances.buffer().slice(..));
        pass.draw_mesh_instanced(sphere, 0..count);
    }

    fn skybox_pass(&self, encoder: &mut wgpu::CommandEncoder, frame: &FrameBindGroups) {
        let (Some(pipeline), Some(cube)) = (
            self.pipelines.get(PipelineId::Skybox),
            self.meshes.get(self.builtin.cube),
        ) else {
            return;
        };
        let Some(mut pass) = self.targets.hdr.bind_write(encoder, load(), Some(load_depth())) else {
            return;
        };
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        pass.set_bind_group(1, &frame.skybox, &[]);
        pass.draw_mesh(cube);
    }

    fn tonemap_pass(&self, encoder: &mut wgpu::CommandEncoder, frame: &FrameBindGroups, output: &wgpu::TextureView) {
        let (Some(pipeline), Some(quad)) = (self.pipelines.get(PipelineId::Tonemap), self.quad()) else {
            return;
        };
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Tonemap Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
                resolve_target: None,
                ops: clear(wgpu::Color::BLACK),
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_viewport(
            self.viewport.x,
            self.viewport.y,
            self.viewport.width as f32,
            self.viewport.height as f32,
            0.0,
            1.0,
        );
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &frame.tonemap, &[]);
        pass.draw_mesh(quad);
    }

    /// Releases every GPU object. The renderer draws nothing afterwards.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            log::warn!("Renderer shut down twice");
            return;
        }
        self.frame = None;
        self.targets.delete();
        self.cascades.delete();
        self.ibl.delete();
        self.meshes.delete_all();
        self.textures.delete_all();
        self.instances.destroy();
        self.light_instances.destroy();
        self.ssao_noise.destroy();
        self.black.destroy();
        self.shut_down = true;
        log::info!("Renderer shut down");
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if !self.shut_down {
            log::warn!("Renderer dropped without shutdown(); GPU objects were not released explicitly");
        }
    }
}

fn clear(color: wgpu::Color) -> wgpu::Operations<wgpu::Color> {
    wgpu::Operations {
        load: wgpu::LoadOp::Clear(color),
        store: wgpu::StoreOp::Store,
    }
}

fn load() -> wgpu::Operations<wgpu::Color> {
    wgpu::Operations {
        load: wgpu::LoadOp::Load,
        store: wgpu::StoreOp::Store,
    }
}

fn clear_depth() -> wgpu::Operations<f32> {
    wgpu::Operations {
        load: wgpu::LoadOp::Clear(1.0),
        store: wgpu::StoreOp::Store,
    }
}

fn load_depth() -> wgpu::Operations<f32> {
    wgpu::Operations {
        load: wgpu::LoadOp::Load,
        store: wgpu::StoreOp::Store,
    }
}

fn color_view(framebuffer: &Framebuffer, index: usize) -> Option<&wgpu::TextureView> {
    framebuffer.color_attachment(index).map(|attachment| &attachment.view)
}

fn require_mesh(meshes: &MeshManager, id: MeshId) -> Result<&Mesh, FramebufferError> {
    meshes.get(id).ok_or_else(|| FramebufferError::Device {
        label: "IBL Capture".to_string(),
        message: format!("built-in mesh {:?} is missing", id),
    })
}

fn load_radiance(path: &Path) -> Result<Rgba32FImage, AssetError> {
    let radiance = load_hdr_image(path)?;
    let mean = mean_radiance(&radiance);
    log::info!(
        "Loaded radiance map '{}' ({}x{}, mean {:.3} {:.3} {:.3})",
        path.display(),
        radiance.width(),
        radiance.height(),
        mean[0],
        mean[1],
        mean[2]
    );
    Ok(radiance)
}

fn environment_radiance(config: &RendererConfig) -> Result<Rgba32FImage, AssetError> {
    match &config.environment_map {
        Some(path) => load_radiance(path),
        None => {
            log::info!("No environment map configured; using a gradient sky");
            Ok(gradient_sky(256, 128))
        }
    }
}

/// Centre and distance that frame `bounds` for a camera with vertical field
/// of view `fov_y`
pub fn framing_distance(bounds: &Aabb, fov_y: cgmath::Rad<f32>) -> (Point3<f32>, f32) {
    if bounds.is_empty() {
        return (Point3::new(0.0, 0.0, 0.0), 5.0);
    }
    let radius = bounds.radius().max(1e-3);
    let distance = radius / (fov_y.0 * 0.5).sin();
    (bounds.center(), distance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Rad};

    #[test]
    fn framing_distance_fits_bounding_sphere() {
        let bounds = Aabb::from_points([Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)]);
        let (center, distance) = framing_distance(&bounds, Rad::from(Deg(60.0)));
        assert_eq!(center, Point3::new(0.0, 0.0, 0.0));
        // sin(30 deg) = 0.5
        assert!((distance - bounds.radius() * 2.0).abs() < 1e-4);
    }

    #[test]
    fn empty_scene_frames_the_origin() {
        let (center, distance) = framing_distance(&Aabb::EMPTY, Rad::from(Deg(45.0)));
        assert_eq!(center, Point3::new(0.0, 0.0, 0.0));
        assert!(distance > 0.0);
    }

    #[test]
    fn tonemap_uniform_is_one_vec4() {
        assert_eq!(std::mem::size_of::<TonemapUniform>(), 16);
    }
}
