// src/gfx/resources/mod.rs
//! GPU resource management
//!
//! Handles textures and the materials that bind them.

pub mod material;
pub mod texture_manager;
pub mod texture_resource;

// Re-export main types
pub use material::{Material, MaterialId, MaterialManager, MaterialTextures, MaterialVariant};
pub use texture_manager::{TextureId, TextureManager, TextureSource};
pub use texture_resource::TextureResource;
