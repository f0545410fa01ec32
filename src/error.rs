//! Error types shared across the renderer
//!
//! Asset errors are the only ones callers are expected to recover from.
//! Everything else describes a configuration or programming mistake and is
//! surfaced so the caller can log it and stop.

use std::path::PathBuf;

use thiserror::Error;

use crate::gfx::framebuffer::attachment::{AttachmentFormat, AttachmentKind, AttachmentSize};
use crate::gfx::rendering::passes::FrameResource;

/// Failure to map a semantic attachment descriptor to a native texture format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AttachmentFormatError {
    #[error("bad format: {format:?} has no {size:?}-bit {kind:?} representation")]
    BadFormat {
        format: AttachmentFormat,
        size: AttachmentSize,
        kind: AttachmentKind,
    },
    #[error("bad size: {kind:?} attachments cannot be {size:?} bits wide ({format:?})")]
    BadSize {
        format: AttachmentFormat,
        size: AttachmentSize,
        kind: AttachmentKind,
    },
}

/// The reason a framebuffer failed its completeness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FramebufferIncompleteness {
    /// The framebuffer has no defined extent.
    #[error("framebuffer undefined")]
    Undefined,
    /// An attachment cannot exist with the requested extent.
    #[error("incomplete attachment")]
    IncompleteAttachment,
    /// Neither a color nor a depth/stencil attachment was requested.
    #[error("missing attachment")]
    MissingAttachment,
    /// The device cannot render to the requested combination of attachments.
    #[error("unsupported attachment combination")]
    Unsupported,
    /// Attachments disagree on, or the device rejects, the sample count.
    #[error("incomplete multisample")]
    IncompleteMultisample,
}

#[derive(Debug, Error)]
pub enum FramebufferError {
    #[error("framebuffer '{label}' is not complete: {reason} ({detail})")]
    Incomplete {
        label: String,
        reason: FramebufferIncompleteness,
        detail: String,
    },
    #[error("framebuffer '{label}': {source}")]
    Format {
        label: String,
        #[source]
        source: AttachmentFormatError,
    },
    #[error("framebuffer '{label}' rejected by the device: {message}")]
    Device { label: String, message: String },
}

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("shader '{label}' failed to compile:\n{log}")]
    Compilation { label: String, log: String },
    #[error("pipeline '{label}' failed to link:\n{log}")]
    Link { label: String, log: String },
    #[error("shader module '{0}' was never loaded")]
    NotFound(String),
    #[error("shader '{label}': {message}")]
    BadSource { label: String, message: String },
}

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode image '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to parse OBJ '{path}': {source}")]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },
    #[error("failed to parse glTF '{path}': {source}")]
    Gltf {
        path: PathBuf,
        #[source]
        source: gltf::Error,
    },
    #[error("unsupported model format '{0}'")]
    UnsupportedFormat(PathBuf),
    #[error("mesh '{mesh}' in '{path}' has no {attribute} data")]
    MissingAttribute {
        path: PathBuf,
        mesh: String,
        attribute: &'static str,
    },
    #[error("material '{0}' does not provide a supported set of texture slots")]
    UnsupportedMaterial(String),
    #[error("cubemap face '{path}' is {width}x{height}, expected a square {expected}x{expected} face")]
    CubemapFace {
        path: PathBuf,
        width: u32,
        height: u32,
        expected: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SceneGraphError {
    #[error("scene graph node {0} does not exist")]
    InvalidNode(usize),
    #[error("the scene root cannot have siblings")]
    RootSibling,
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum LightError {
    #[error("light colour channel {0} is not finite and non-negative")]
    InvalidColor(f32),
    #[error("light with brightest channel {max_channel} is too dim for a real attenuation radius")]
    RadiusNotReal { max_channel: f32 },
    #[error("cascade range [{near}, {far}) is empty or starts behind the camera")]
    InvalidCascadeRange { near: f32, far: f32 },
}

/// A pass samples a resource that no earlier pass or initialization step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("pass '{pass}' reads {resource:?} before anything writes it")]
pub struct PassOrderError {
    pub pass: &'static str,
    pub resource: FrameResource,
}

/// Top level error returned by [`crate::Renderer`] entry points.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error(transparent)]
    Framebuffer(#[from] FramebufferError),
    #[error(transparent)]
    Shader(#[from] ShaderError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    SceneGraph(#[from] SceneGraphError),
    #[error(transparent)]
    Light(#[from] LightError),
    #[error(transparent)]
    PassOrder(#[from] PassOrderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incompleteness_reasons_read_as_plain_text() {
        assert_eq!(FramebufferIncompleteness::Undefined.to_string(), "framebuffer undefined");
        assert_eq!(
            FramebufferIncompleteness::Unsupported.to_string(),
            "unsupported attachment combination"
        );
        assert_eq!(
            FramebufferIncompleteness::IncompleteMultisample.to_string(),
            "incomplete multisample"
        );

        let err = FramebufferError::Incomplete {
            label: "G-Buffer".to_string(),
            reason: FramebufferIncompleteness::MissingAttachment,
            detail: "no attachments".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "framebuffer 'G-Buffer' is not complete: missing attachment (no attachments)"
        );
    }
}
