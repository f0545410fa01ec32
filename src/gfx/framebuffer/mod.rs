//! Framebuffers built from declarative descriptions
//!
//! A [`Framebuffer`] owns N color attachments and an optional depth attachment
//! created from a [`FramebufferDescription`]. GPU objects follow an explicit
//! two-phase lifecycle: [`Framebuffer::init`] creates them and
//! [`Framebuffer::delete`] releases them. Dropping a framebuffer that is still
//! initialized only logs a warning.
//!
//! "Binding" maps onto wgpu as follows: writing is a render pass over the
//! attachments ([`Framebuffer::bind_write`]), reading is sampling the
//! attachment views, and unbinding is the end of the pass.

pub mod attachment;
pub mod bloom;

use crate::error::{FramebufferError, FramebufferIncompleteness};

use attachment::{get_attachment_type, AttachmentFormat, AttachmentKind, AttachmentSize, AttachmentStorage};

/// Format of every depth attachment; copyable so depth can be blitted between targets
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorAttachmentDescription {
    pub format: AttachmentFormat,
    pub size: AttachmentSize,
    pub kind: AttachmentKind,
    pub storage: AttachmentStorage,
}

impl ColorAttachmentDescription {
    pub fn new(format: AttachmentFormat, size: AttachmentSize, kind: AttachmentKind) -> Self {
        Self {
            format,
            size,
            kind,
            storage: AttachmentStorage::Texture,
        }
    }

    pub fn renderbuffer(mut self) -> Self {
        self.storage = AttachmentStorage::Renderbuffer;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilDescription {
    pub storage: AttachmentStorage,
}

/// Declarative render target description
#[derive(Debug, Clone, PartialEq)]
pub struct FramebufferDescription {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub color_attachments: Vec<ColorAttachmentDescription>,
    pub depth_stencil: Option<DepthStencilDescription>,
    pub sample_count: u32,
}

impl FramebufferDescription {
    pub fn new(label: &str, width: u32, height: u32) -> Self {
        Self {
            label: label.to_string(),
            width,
            height,
            color_attachments: Vec::new(),
            depth_stencil: None,
            sample_count: 1,
        }
    }

    pub fn with_color(
        mut self,
        format: AttachmentFormat,
        size: AttachmentSize,
        kind: AttachmentKind,
    ) -> Self {
        self.color_attachments
            .push(ColorAttachmentDescription::new(format, size, kind));
        self
    }

    pub fn with_color_attachment(mut self, attachment: ColorAttachmentDescription) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    pub fn with_depth_stencil(mut self, storage: AttachmentStorage) -> Self {
        self.depth_stencil = Some(DepthStencilDescription { storage });
        self
    }

    pub fn with_sample_count(mut self, sample_count: u32) -> Self {
        self.sample_count = sample_count;
        self
    }

    /// Native formats for every color attachment, in order
    pub fn resolve_color_formats(&self) -> Result<Vec<wgpu::TextureFormat>, FramebufferError> {
        self.color_attachments
            .iter()
            .map(|a| {
                get_attachment_type(a.format, a.size, a.kind).map_err(|source| {
                    FramebufferError::Format {
                        label: self.label.clone(),
                        source,
                    }
                })
            })
            .collect()
    }
}

/// Validates a description against device limits without touching the GPU.
///
/// Mirrors a completeness check: every failure names the violated rule.
pub fn check_completeness(
    description: &FramebufferDescription,
    limits: &wgpu::Limits,
) -> Result<(), FramebufferError> {
    let incomplete = |reason: FramebufferIncompleteness, detail: String| FramebufferError::Incomplete {
        label: description.label.clone(),
        reason,
        detail,
    };

    if description.width == 0 || description.height == 0 {
        return Err(incomplete(
            FramebufferIncompleteness::Undefined,
            format!("extent {}x{}", description.width, description.height),
        ));
    }

    if description.color_attachments.is_empty() && description.depth_stencil.is_none() {
        return Err(incomplete(
            FramebufferIncompleteness::MissingAttachment,
            "no color or depth/stencil attachment".to_string(),
        ));
    }

    let max_dimension = limits.max_texture_dimension_2d;
    if description.width > max_dimension || description.height > max_dimension {
        return Err(incomplete(
            FramebufferIncompleteness::IncompleteAttachment,
            format!(
                "extent {}x{} exceeds the device maximum {}",
                description.width, description.height, max_dimension
            ),
        ));
    }

    if description.color_attachments.len() > limits.max_color_attachments as usize {
        return Err(incomplete(
            FramebufferIncompleteness::Unsupported,
            format!(
                "{} color attachments requested, device supports {}",
                description.color_attachments.len(),
                limits.max_color_attachments
            ),
        ));
    }

    let formats = description.resolve_color_formats()?;

    if !matches!(description.sample_count, 1 | 4) {
        return Err(incomplete(
            FramebufferIncompleteness::IncompleteMultisample,
            format!("sample count {} is not 1 or 4", description.sample_count),
        ));
    }
    if description.sample_count > 1 {
        if let Some(format) = formats
            .iter()
            .find(|f| !matches!(f.sample_type(None, None), Some(wgpu::TextureSampleType::Float { .. })))
        {
            return Err(incomplete(
                FramebufferIncompleteness::IncompleteMultisample,
                format!("{:?} cannot be multisampled", format),
            ));
        }
    }

    let mut bytes_per_sample = 0u32;
    for format in &formats {
        let (Some(cost), Some(alignment)) =
            (format.target_pixel_byte_cost(), format.target_component_alignment())
        else {
            return Err(incomplete(
                FramebufferIncompleteness::Unsupported,
                format!("{:?} is not color-renderable", format),
            ));
        };
        bytes_per_sample = bytes_per_sample.next_multiple_of(alignment) + cost;
    }
    if bytes_per_sample > limits.max_color_attachment_bytes_per_sample {
        return Err(incomplete(
            FramebufferIncompleteness::Unsupported,
            format!(
                "{} bytes per sample exceeds the device limit {}",
                bytes_per_sample, limits.max_color_attachment_bytes_per_sample
            ),
        ));
    }

    Ok(())
}

/// One live attachment
#[derive(Debug)]
pub struct FramebufferAttachment {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
}

pub struct Framebuffer {
    description: FramebufferDescription,
    color_attachments: Vec<FramebufferAttachment>,
    depth_stencil: Option<FramebufferAttachment>,
    initialized: bool,
}

impl Framebuffer {
    /// Creates an uninitialized framebuffer; call [`Framebuffer::init`] before use
    pub fn new(description: FramebufferDescription) -> Self {
        Self {
            description,
            color_attachments: Vec::new(),
            depth_stencil: None,
            initialized: false,
        }
    }

    /// Allocates every attachment and verifies the result.
    ///
    /// Validation runs before allocation; device-side rejection is caught with
    /// an error scope so a bad description never leaves half-built handles.
    pub fn init(&mut self, device: &wgpu::Device) -> Result<(), FramebufferError> {
        if self.initialized {
            log::warn!(
                "Framebuffer '{}' initialized twice; releasing the previous attachments",
                self.description.label
            );
            self.delete();
        }

        if let Err(err) = check_completeness(&self.description, &device.limits()) {
            log::error!("{}", err);
            return Err(err);
        }
        let formats = self.description.resolve_color_formats()?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let size = wgpu::Extent3d {
            width: self.description.width,
            height: self.description.height,
            depth_or_array_layers: 1,
        };

        let color_attachments: Vec<FramebufferAttachment> = self
            .description
            .color_attachments
            .iter()
            .zip(&formats)
            .enumerate()
            .map(|(i, (attachment, format))| {
                let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC;
                if attachment.storage == AttachmentStorage::Texture {
                    usage |= wgpu::TextureUsages::TEXTURE_BINDING;
                }
                let label = format!("{} Color {}", self.description.label, i);
                create_attachment(device, &label, size, self.description.sample_count, *format, usage)
            })
            .collect();

        let depth_stencil = self.description.depth_stencil.map(|depth| {
            let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST;
            if depth.storage == AttachmentStorage::Texture {
                usage |= wgpu::TextureUsages::TEXTURE_BINDING;
            }
            let label = format!("{} Depth", self.description.label);
            create_attachment(device, &label, size, self.description.sample_count, DEPTH_FORMAT, usage)
        });

        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            let err = FramebufferError::Device {
                label: self.description.label.clone(),
                message: error.to_string(),
            };
            log::error!("{}", err);
            for attachment in color_attachments.iter().chain(depth_stencil.iter()) {
                attachment.texture.destroy();
            }
            return Err(err);
        }

        self.color_attachments = color_attachments;
        self.depth_stencil = depth_stencil;
        self.initialized = true;

        log::debug!(
            "Framebuffer '{}' initialized at {}x{} ({} color, depth: {})",
            self.description.label,
            self.description.width,
            self.description.height,
            self.color_attachments.len(),
            self.depth_stencil.is_some()
        );
        Ok(())
    }

    /// Releases the attachments and reinitializes at the new extent
    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<(), FramebufferError> {
        if self.initialized {
            self.delete();
        }
        self.description.width = width;
        self.description.height = height;
        self.init(device)
    }

    pub fn delete(&mut self) {
        if !self.initialized {
            log::warn!(
                "Deleting framebuffer '{}' that was never initialized",
                self.description.label
            );
            return;
        }
        for attachment in self.color_attachments.drain(..).chain(self.depth_stencil.take()) {
            attachment.texture.destroy();
        }
        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn description(&self) -> &FramebufferDescription {
        &self.description
    }

    pub fn label(&self) -> &str {
        &self.description.label
    }

    pub fn size(&self) -> (u32, u32) {
        (self.description.width, self.description.height)
    }

    pub fn color_attachment_count(&self) -> usize {
        self.color_attachments.len()
    }

    pub fn color_attachment(&self, index: usize) -> Option<&FramebufferAttachment> {
        let attachment = self.color_attachments.get(index);
        if attachment.is_none() {
            log::error!(
                "Framebuffer '{}' has no color attachment {} (initialized: {})",
                self.description.label,
                index,
                self.initialized
            );
        }
        attachment
    }

    pub fn depth_stencil_attachment(&self) -> Option<&FramebufferAttachment> {
        self.depth_stencil.as_ref()
    }

    /// Color target states for pipelines that render into this framebuffer
    pub fn color_targets(&self, blend: Option<wgpu::BlendState>) -> Vec<Option<wgpu::ColorTargetState>> {
        self.description
            .resolve_color_formats()
            .unwrap_or_default()
            .into_iter()
            .map(|format| {
                Some(wgpu::ColorTargetState {
                    format,
                    blend,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect()
    }

    /// Begins a render pass writing to every attachment.
    ///
    /// Returns `None` (and logs) when the framebuffer is not initialized.
    pub fn bind_write<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        color_ops: wgpu::Operations<wgpu::Color>,
        depth_ops: Option<wgpu::Operations<f32>>,
    ) -> Option<wgpu::RenderPass<'e>> {
        if !self.initialized {
            log::error!(
                "Binding framebuffer '{}' that is not initialized",
                self.description.label
            );
            debug_assert!(self.initialized, "framebuffer bound before init");
            return None;
        }

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = self
            .color_attachments
            .iter()
            .map(|attachment| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &attachment.view,
                    resolve_target: None,
                    ops: color_ops,
                })
            })
            .collect();

        let depth_stencil_attachment = match (&self.depth_stencil, depth_ops) {
            (Some(depth), Some(ops)) => Some(wgpu::RenderPassDepthStencilAttachment {
                view: &depth.view,
                depth_ops: Some(ops),
                stencil_ops: None,
            }),
            _ => None,
        };

        Some(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(&self.description.label),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            timestamp_writes: None,
            occlusion_query_set: None,
        }))
    }

    /// Copies this framebuffer's depth into `target`'s depth attachment
    pub fn blit_depth_to(&self, encoder: &mut wgpu::CommandEncoder, target: &Framebuffer) -> bool {
        let (Some(src), Some(dst)) = (&self.depth_stencil, &target.depth_stencil) else {
            log::error!(
                "Depth blit '{}' -> '{}' needs a depth attachment on both sides",
                self.description.label,
                target.description.label
            );
            return false;
        };
        if self.size() != target.size() || self.description.sample_count != target.description.sample_count {
            log::error!(
                "Depth blit '{}' -> '{}' between mismatched targets",
                self.description.label,
                target.description.label
            );
            return false;
        }

        encoder.copy_texture_to_texture(
            src.texture.as_image_copy(),
            dst.texture.as_image_copy(),
            src.texture.size(),
        );
        true
    }

    /// Copies color attachment `index` into one layer and mip of `destination`
    pub fn copy_color_to(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        index: usize,
        destination: &wgpu::Texture,
        layer: u32,
        mip_level: u32,
    ) -> bool {
        let Some(src) = self.color_attachment(index) else {
            return false;
        };
        encoder.copy_texture_to_texture(
            src.texture.as_image_copy(),
            wgpu::TexelCopyTextureInfo {
                texture: destination,
                mip_level,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: self.description.width,
                height: self.description.height,
                depth_or_array_layers: 1,
            },
        );
        true
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        if self.initialized {
            log::warn!(
                "Framebuffer '{}' dropped while still initialized; call delete() first",
                self.description.label
            );
        }
    }
}

fn create_attachment(
    device: &wgpu::Device,
    label: &str,
    size: wgpu::Extent3d,
    sample_count: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
) -> FramebufferAttachment {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

    FramebufferAttachment { texture, view, format }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gbuffer_like(width: u32, height: u32) -> FramebufferDescription {
        FramebufferDescription::new("test", width, height)
            .with_color(AttachmentFormat::Rgba, AttachmentSize::Sixteen, AttachmentKind::Float)
            .with_color(AttachmentFormat::Rgba, AttachmentSize::Sixteen, AttachmentKind::Float)
            .with_depth_stencil(AttachmentStorage::Texture)
    }

    fn reason(result: Result<(), FramebufferError>) -> Option<FramebufferIncompleteness> {
        match result {
            Err(FramebufferError::Incomplete { reason, .. }) => Some(reason),
            _ => None,
        }
    }

    #[test]
    fn complete_description_passes() {
        assert!(check_completeness(&gbuffer_like(256, 256), &wgpu::Limits::default()).is_ok());
    }

    #[test]
    fn zero_extent_is_undefined() {
        let result = check_completeness(&gbuffer_like(0, 256), &wgpu::Limits::default());
        assert_eq!(reason(result), Some(FramebufferIncompleteness::Undefined));
    }

    #[test]
    fn no_attachments_is_missing_attachment() {
        let empty = FramebufferDescription::new("empty", 64, 64);
        let result = check_completeness(&empty, &wgpu::Limits::default());
        assert_eq!(reason(result), Some(FramebufferIncompleteness::MissingAttachment));
    }

    #[test]
    fn depth_only_is_complete() {
        let depth = FramebufferDescription::new("shadow", 2048, 2048).with_depth_stencil(AttachmentStorage::Texture);
        assert!(check_completeness(&depth, &wgpu::Limits::default()).is_ok());
    }

    #[test]
    fn oversized_extent_is_incomplete_attachment() {
        let limits = wgpu::Limits::default();
        let result = check_completeness(&gbuffer_like(limits.max_texture_dimension_2d + 1, 4), &limits);
        assert_eq!(reason(result), Some(FramebufferIncompleteness::IncompleteAttachment));
    }

    #[test]
    fn too_many_bytes_per_sample_is_unsupported() {
        let mut description = FramebufferDescription::new("fat", 64, 64);
        for _ in 0..4 {
            description = description.with_color(AttachmentFormat::Rgba, AttachmentSize::ThirtyTwo, AttachmentKind::Float);
        }
        let result = check_completeness(&description, &wgpu::Limits::default());
        assert_eq!(reason(result), Some(FramebufferIncompleteness::Unsupported));
    }

    #[test]
    fn odd_sample_count_is_incomplete_multisample() {
        let result = check_completeness(&gbuffer_like(64, 64).with_sample_count(3), &wgpu::Limits::default());
        assert_eq!(reason(result), Some(FramebufferIncompleteness::IncompleteMultisample));
    }

    #[test]
    fn bad_format_surfaces_before_allocation() {
        let description = FramebufferDescription::new("bad", 64, 64).with_color(
            AttachmentFormat::Rgb,
            AttachmentSize::Sixteen,
            AttachmentKind::Int,
        );
        assert!(matches!(
            check_completeness(&description, &wgpu::Limits::default()),
            Err(FramebufferError::Format { .. })
        ));
    }

    #[test]
    fn uninitialized_framebuffer_exposes_no_attachments() {
        let framebuffer = Framebuffer::new(gbuffer_like(16, 16));
        assert!(!framebuffer.is_initialized());
        assert_eq!(framebuffer.color_attachment_count(), 0);
        assert!(framebuffer.depth_stencil_attachment().is_none());
        assert_eq!(framebuffer.color_targets(None).len(), 2);
    }
}
