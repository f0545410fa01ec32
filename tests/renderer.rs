//! Whole frames through the renderer on a real device. Skipped when no adapter exists.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cgmath::{Deg, Point3, Vector3};
use umbra::gfx::geometry::{generate_cube, generate_fullscreen_quad};
use umbra::gfx::lights::{DirectionalLight, PointLight};
use umbra::gfx::rendering::ibl::{gradient_sky, IblBaker, CAPTURE_PIPELINES, CONVOLVE_PIPELINES};
use umbra::gfx::rendering::layouts::RenderLayouts;
use umbra::gfx::rendering::PipelineManager;
use umbra::gfx::scene::mesh::Mesh;
use umbra::gfx::FpsCamera;
use umbra::{Renderer, RendererConfig};

const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

fn device() -> Option<(Arc<wgpu::Device>, Arc<wgpu::Queue>)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default())).ok()?;
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("Renderer Test Device"),
        required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
        ..Default::default()
    }))
    .ok()?;
    Some((Arc::new(device), Arc::new(queue)))
}

fn small_config() -> RendererConfig {
    RendererConfig {
        environment_face_size: 32,
        irradiance_face_size: 8,
        prefilter_face_size: 16,
        prefilter_mip_count: 3,
        brdf_lut_size: 32,
        ..Default::default()
    }
    .with_shadow_map_size(256)
    .with_ssao_kernel_size(8)
    .with_bloom(3, 0.005, 0.04)
    .with_max_point_lights(4)
}

const QUAD_OBJ: &str = "mtllib tile.mtl\n\
    o tile\n\
    v -1 0 -1\nv 1 0 -1\nv 1 0 1\nv -1 0 1\n\
    vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
    vn 0 1 0\n\
    usemtl slate\n\
    f 1/1/1 4/4/1 3/3/1 2/2/1\n";

const QUAD_MTL: &str = "newmtl slate\n\
    map_Kd slate_albedo.png\n\
    norm slate_normal.png\n\
    map_ORM slate_arm.png\n";

fn write_tile(dir: &Path) -> PathBuf {
    let texture = |name: &str, rgba: [u8; 4]| {
        image::RgbaImage::from_pixel(4, 4, image::Rgba(rgba))
            .save(dir.join(name))
            .unwrap();
    };
    texture("slate_albedo.png", [90, 100, 110, 255]);
    texture("slate_normal.png", [128, 128, 255, 255]);
    texture("slate_arm.png", [255, 200, 0, 255]);
    std::fs::write(dir.join("tile.mtl"), QUAD_MTL).unwrap();

    let obj = dir.join("tile.obj");
    std::fs::write(&obj, QUAD_OBJ).unwrap();
    obj
}

fn output_view(device: &wgpu::Device) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("Test Output"),
            size: wgpu::Extent3d {
                width: 128,
                height: 128,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn draw(renderer: &mut Renderer, output: &wgpu::TextureView, camera: &FpsCamera) {
    renderer.update_projection_matrix(camera);
    renderer.update_view_matrix(camera);
    let mut encoder = renderer
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Test Frame"),
        });
    renderer.draw_scene(&mut encoder, output, camera);
    renderer.queue().submit(std::iter::once(encoder.finish()));
}

fn lit_renderer(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Renderer {
    let mut renderer = Renderer::new(device, queue, OUTPUT_FORMAT, 64, 64, small_config()).unwrap();
    renderer.set_directional_light(Some(DirectionalLight::new(
        Vector3::new(-0.3, -1.0, -0.2),
        Vector3::new(3.0, 3.0, 3.0),
    )));
    renderer.push_point_light(PointLight::new(Point3::new(0.0, 1.0, 0.0), Vector3::new(5.0, 4.0, 3.0)).unwrap());
    renderer
}

#[test]
fn single_mesh_model_draws_as_one_instanced_batch() {
    let Some((device, queue)) = device() else {
        eprintln!("no wgpu adapter available, skipping");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let output = output_view(&device);
    let mut renderer = lit_renderer(device, queue);

    let nodes = renderer.load_model(write_tile(dir.path()), true).unwrap();
    assert_eq!(nodes.len(), 1);

    let camera = FpsCamera::new(Point3::new(0.0, 2.0, 4.0), Deg(45.0), 1.0, 0.1, 150.0);
    draw(&mut renderer, &output, &camera);
    draw(&mut renderer, &output, &camera);
    renderer.set_viewport((0.0, 0.0), (80, 48)).unwrap();
    draw(&mut renderer, &output, &camera);

    let plan = renderer.plan_frame();
    assert_eq!(plan.batches.len(), 1);
    assert_eq!(plan.batches[0].instances.len(), 1);
    assert!(renderer.is_frame_ready());

    renderer.shutdown();
    assert!(!renderer.is_frame_ready());
}

#[test]
fn failed_resize_skips_frames_until_a_valid_size_arrives() {
    let Some((device, queue)) = device() else {
        eprintln!("no wgpu adapter available, skipping");
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let output = output_view(&device);
    let too_wide = device.limits().max_texture_dimension_2d + 1;
    let mut renderer = lit_renderer(device, queue);
    renderer.load_model(write_tile(dir.path()), true).unwrap();
    let camera = FpsCamera::new(Point3::new(0.0, 2.0, 4.0), Deg(45.0), 1.0, 0.1, 150.0);
    draw(&mut renderer, &output, &camera);

    assert!(renderer.set_viewport((0.0, 0.0), (too_wide, 16)).is_err());
    assert!(!renderer.is_frame_ready());
    // Records nothing instead of sampling released targets
    draw(&mut renderer, &output, &camera);

    renderer.set_viewport((0.0, 0.0), (96, 64)).unwrap();
    assert!(renderer.is_frame_ready());
    draw(&mut renderer, &output, &camera);

    renderer.shutdown();
}

#[test]
fn baking_without_ibl_pipelines_leaves_black_maps() {
    let Some((device, queue)) = device() else {
        eprintln!("no wgpu adapter available, skipping");
        return;
    };
    let pipelines = PipelineManager::new(device.clone());
    assert_eq!(pipelines.missing(&CAPTURE_PIPELINES), CAPTURE_PIPELINES.to_vec());
    assert_eq!(pipelines.missing(&CONVOLVE_PIPELINES), CONVOLVE_PIPELINES.to_vec());

    let layouts = RenderLayouts::new(&device);
    let mut cube = Mesh::from_geometry("Unit Cube", generate_cube());
    let mut quad = Mesh::from_geometry("Fullscreen Quad", generate_fullscreen_quad());
    cube.init(&device);
    quad.init(&device);

    let baker = IblBaker {
        device: &device,
        queue: &queue,
        pipelines: &pipelines,
        layouts: &layouts,
        cube: &cube,
        quad: &quad,
    };
    let mut maps = baker.bake(&gradient_sky(64, 32), &small_config()).unwrap();
    assert_eq!(maps.irradiance.texture.width(), 8);
    assert_eq!(maps.prefilter.texture.mip_level_count(), 3);

    maps.delete();
    cube.delete();
    quad.delete();
}
