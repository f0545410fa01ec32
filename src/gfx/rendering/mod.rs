// src/gfx/rendering/mod.rs
//! Core rendering functionality
//!
//! Pipelines, render targets, the per-frame pass table and the one-time
//! IBL precompute, tied together by [`Renderer`].

pub mod bloom;
pub mod ibl;
pub mod layouts;
pub mod pass_pipelines;
pub mod passes;
pub mod pipeline_manager;
pub mod renderer;
pub mod shader_source;
pub mod shadow;
pub mod ssao;
pub mod targets;

// Re-export main types
pub use passes::{FramePlan, PassKind, FRAME_PASSES};
pub use pipeline_manager::{PipelineConfig, PipelineId, PipelineManager};
pub use renderer::{framing_distance, Renderer, Viewport};
