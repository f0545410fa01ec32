// src/lib.rs
//! Umbra deferred renderer
//!
//! A physically-based deferred renderer built on wgpu: cascaded shadow maps,
//! screen-space ambient occlusion, image-based lighting, bloom and tonemapping
//! driven by an instancing scene graph.

pub mod config;
pub mod error;
pub mod gfx;
pub mod wgpu_utils;

// Re-export main types for convenience
pub use config::{RendererConfig, SHADOW_CASCADE_COUNT};
pub use error::{AssetError, RendererError};
pub use gfx::rendering::renderer::Renderer;
