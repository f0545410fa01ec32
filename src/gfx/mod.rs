//! # Graphics Module
//!
//! Everything the deferred renderer is made of:
//!
//! - **Camera** ([`camera`]) - the [`camera::Camera`] trait and an FPS camera
//! - **Framebuffers** ([`framebuffer`]) - declarative render targets
//! - **Geometry** ([`geometry`]) - CPU meshes, primitives and bounds
//! - **Lights** ([`lights`]) - point and directional lights
//! - **Rendering** ([`rendering`]) - pipelines, passes and the [`Renderer`]
//! - **Resources** ([`resources`]) - textures and materials
//! - **Scene** ([`scene`]) - scene graph, meshes and model import
//!
//! [`Renderer`]: rendering::Renderer

pub mod camera;
pub mod framebuffer;
pub mod geometry;
pub mod lights;
pub mod rendering;
pub mod resources;
pub mod scene;

// Re-export commonly used types
pub use camera::{Camera, FpsCamera};
pub use lights::{DirectionalLight, PointLight};
pub use rendering::Renderer;
