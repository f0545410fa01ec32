//! Interactive model viewer
//!
//! ```text
//! viewer <model.obj|model.gltf|model.glb> [environment.hdr|skybox_dir]
//! ```
//!
//! A skybox directory holds `px`, `nx`, `py`, `ny`, `pz` and `nz` images.
//!
//! WASD/Space/Shift to fly, drag with the left mouse button to look around,
//! mouse wheel scales the movement speed. Escape quits. Dropping a model
//! file on the window replaces the scene; dropping an `.hdr` replaces the
//! environment.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use cgmath::{InnerSpace, Point3, Vector3};
use umbra::gfx::camera::{Camera, CameraController, FpsCamera};
use umbra::gfx::lights::{DirectionalLight, PointLight};
use umbra::gfx::rendering::framing_distance;
use umbra::{Renderer, RendererConfig};
use winit::{
    application::ApplicationHandler,
    dpi::{LogicalSize, PhysicalSize},
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowAttributes, WindowId},
};

struct Args {
    model: PathBuf,
    environment: Option<PathBuf>,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = std::env::args_os().skip(1);
        let Some(model) = args.next() else {
            bail!("usage: viewer <model.obj|model.gltf|model.glb> [environment.hdr|skybox_dir]");
        };
        Ok(Self {
            model: PathBuf::from(model),
            environment: args.next().map(PathBuf::from),
        })
    }

    fn skybox_dir(&self) -> Option<&Path> {
        self.environment.as_deref().filter(|path| path.is_dir())
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// OBJ texture space starts bottom-left, glTF top-left
fn flip_uvs(path: &Path) -> bool {
    has_extension(path, "obj")
}

/// Everything that only exists once the window does
struct Viewer {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    renderer: Renderer,
    camera: FpsCamera,
    controller: CameraController,
    last_frame: Instant,
}

impl Viewer {
    async fn new(window: Arc<Window>, args: &Args) -> Result<Self> {
        let size = window.inner_size();
        let (width, height) = (size.width.max(1), size.height.max(1));

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("failed to request adapter")?;
        log::info!("Using adapter {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Umbra Device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits {
                    max_texture_dimension_2d: 8192,
                    ..wgpu::Limits::downlevel_defaults()
                }
                .using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to request device")?;

        let capabilities = surface.get_capabilities(&adapter);
        let Some(&first_format) = capabilities.formats.first() else {
            bail!("surface reports no supported formats");
        };
        // Tonemapping gamma-encodes itself when the surface is linear
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .unwrap_or(first_format);

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: capabilities
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let mut config = RendererConfig::default();
        if let Some(environment) = args.environment.as_ref().filter(|_| args.skybox_dir().is_none()) {
            config = config.with_environment_map(environment);
        }
        let (near, far, fov_y) = (config.near_plane, config.far_plane, config.fov_y);

        let mut renderer = Renderer::new(Arc::new(device), Arc::new(queue), format, width, height, config)
            .context("failed to create renderer")?;

        if let Some(dir) = args.skybox_dir() {
            let faces = find_skybox_faces(dir)?;
            renderer
                .set_environment_cubemap(faces.each_ref().map(PathBuf::as_path))
                .with_context(|| format!("failed to load skybox from {}", dir.display()))?;
        }

        renderer
            .load_model(&args.model, flip_uvs(&args.model))
            .with_context(|| format!("failed to load {}", args.model.display()))?;

        let mut camera = FpsCamera::new(Point3::new(0.0, 1.0, 5.0), fov_y, width as f32 / height as f32, near, far);
        let bounds = renderer.scene_bounds();
        let (center, distance) = framing_distance(&bounds, camera.fov_y());
        camera.look_at(center, distance);

        add_lights(&mut renderer, center, bounds.radius())?;

        renderer.update_projection_matrix(&camera);
        renderer.update_view_matrix(&camera);

        let move_speed = (bounds.radius() * 0.5).max(1.0);
        Ok(Self {
            window,
            surface,
            surface_config,
            renderer,
            camera,
            controller: CameraController::new(move_speed, 0.1),
            last_frame: Instant::now(),
        })
    }

    fn resize(&mut self, size: PhysicalSize<u32>) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.surface_config.width = size.width;
        self.surface_config.height = size.height;
        self.surface.configure(self.renderer.device(), &self.surface_config);

        if let Err(err) = self.renderer.set_viewport((0.0, 0.0), (size.width, size.height)) {
            log::error!("Failed to resize render targets: {}", err);
            return;
        }
        self.camera.set_aspect(size.width, size.height);
        self.renderer.update_projection_matrix(&self.camera);
    }

    /// `.hdr` files replace the environment, anything else replaces the model
    fn open_dropped(&mut self, path: &Path) {
        if has_extension(path, "hdr") {
            if let Err(err) = self.renderer.set_environment_map(path) {
                log::error!("Failed to load environment {}: {}", path.display(), err);
            }
            return;
        }

        self.renderer.scene_graph_mut().clear();
        match self.renderer.load_model(path, flip_uvs(path)) {
            Ok(_) => {
                let bounds = self.renderer.scene_bounds();
                let (center, distance) = framing_distance(&bounds, self.camera.fov_y());
                self.camera.look_at(center, distance);
                self.renderer.update_view_matrix(&self.camera);
                self.window.set_title(&format!("umbra - {}", path.display()));
            }
            Err(err) => log::error!("Failed to load {}: {}", path.display(), err),
        }
    }

    /// Returns false when the surface is gone for good
    fn redraw(&mut self) -> bool {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        if self.controller.update(&mut self.camera, dt) {
            self.renderer.update_view_matrix(&self.camera);
        }

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(self.renderer.device(), &self.surface_config);
                return true;
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Surface out of memory");
                return false;
            }
            Err(err) => {
                log::warn!("Skipping frame: {}", err);
                return true;
            }
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .renderer
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });
        let camera = self.camera;
        self.renderer.draw_scene(&mut encoder, &view, &camera);
        self.renderer.queue().submit(std::iter::once(encoder.finish()));
        self.window.pre_present_notify();
        frame.present();
        true
    }
}

fn find_skybox_faces(dir: &Path) -> Result<[PathBuf; 6]> {
    let mut faces: [PathBuf; 6] = Default::default();
    for (slot, name) in faces.iter_mut().zip(["px", "nx", "py", "ny", "pz", "nz"]) {
        let found = ["png", "jpg", "jpeg"]
            .iter()
            .map(|ext| dir.join(format!("{}.{}", name, ext)))
            .find(|path| path.is_file());
        let Some(path) = found else {
            bail!("skybox face '{}' not found in {}", name, dir.display());
        };
        *slot = path;
    }
    Ok(faces)
}

/// A key light plus a ring of coloured point lights around the model
fn add_lights(renderer: &mut Renderer, center: Point3<f32>, radius: f32) -> Result<()> {
    renderer.set_directional_light(Some(DirectionalLight::new(
        Vector3::new(-0.4, -1.0, -0.3).normalize(),
        Vector3::new(3.0, 2.9, 2.7),
    )));

    let ring = radius.max(1.0) * 0.8;
    let colors = [
        Vector3::new(4.0, 1.0, 0.6),
        Vector3::new(0.6, 1.5, 4.0),
        Vector3::new(0.8, 4.0, 1.0),
        Vector3::new(3.0, 3.0, 3.0),
    ];
    for (i, color) in colors.into_iter().enumerate() {
        let angle = std::f32::consts::FRAC_PI_2 * i as f32;
        let position = center + Vector3::new(angle.cos() * ring, ring * 0.5, angle.sin() * ring);
        renderer.push_point_light(PointLight::new(position, color)?);
    }
    Ok(())
}

struct App {
    args: Args,
    viewer: Option<Viewer>,
    error: Option<anyhow::Error>,
}

impl App {
    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.error = Some(err);
        self.exit(event_loop);
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut viewer) = self.viewer.take() {
            viewer.renderer.shutdown();
        }
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_some() {
            return;
        }
        let title = format!("umbra - {}", self.args.model.display());
        let window = match event_loop.create_window(
            WindowAttributes::default()
                .with_title(title)
                .with_inner_size(LogicalSize::new(1280, 800)),
        ) {
            Ok(window) => Arc::new(window),
            Err(err) => return self.fail(event_loop, err.into()),
        };

        match pollster::block_on(Viewer::new(window, &self.args)) {
            Ok(viewer) => self.viewer = Some(viewer),
            Err(err) => self.fail(event_loop, err),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        let Some(viewer) = self.viewer.as_mut() else {
            return;
        };
        if window_id != viewer.window.id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => self.exit(event_loop),
            WindowEvent::KeyboardInput { event, .. } => viewer.controller.process_key_event(&event),
            WindowEvent::Resized(size) => viewer.resize(size),
            WindowEvent::DroppedFile(path) => viewer.open_dropped(&path),
            WindowEvent::RedrawRequested => {
                if !viewer.redraw() {
                    self.exit(event_loop);
                }
            }
            _ => {}
        }
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        if let Some(viewer) = self.viewer.as_mut() {
            if viewer.controller.process_device_event(&event, &mut viewer.camera) {
                viewer.renderer.update_view_matrix(&viewer.camera);
            }
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(viewer) = &self.viewer {
            viewer.window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse()?;
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        args,
        viewer: None,
        error: None,
    };
    event_loop.run_app(&mut app).context("event loop failed")?;

    match app.error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
