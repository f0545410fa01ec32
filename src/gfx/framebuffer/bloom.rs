//! Bloom mip chain render targets

use super::{
    attachment::{AttachmentFormat, AttachmentKind, AttachmentSize},
    Framebuffer, FramebufferDescription,
};
use crate::error::FramebufferError;

/// Extents of each bloom mip, halving from the source extent.
///
/// The chain stops early once both dimensions reach one pixel.
pub fn bloom_mip_sizes(width: u32, height: u32, mip_count: u32) -> Vec<(u32, u32)> {
    let mut sizes = Vec::with_capacity(mip_count as usize);
    let (mut w, mut h) = (width, height);
    for _ in 0..mip_count {
        if w <= 1 && h <= 1 {
            break;
        }
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        sizes.push((w, h));
    }
    sizes
}

/// One single-attachment RGBA16F framebuffer per bloom mip
pub struct BloomFramebuffer {
    mips: Vec<Framebuffer>,
    mip_count: u32,
}

impl BloomFramebuffer {
    pub fn new(mip_count: u32) -> Self {
        Self {
            mips: Vec::new(),
            mip_count,
        }
    }

    /// Allocates the chain for a `width` x `height` source.
    ///
    /// On failure every mip created so far is released and the error is
    /// returned for the caller to decide whether bloom stays enabled.
    pub fn init(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<(), FramebufferError> {
        self.delete();

        let mut mips: Vec<Framebuffer> = Vec::new();
        for (i, (w, h)) in bloom_mip_sizes(width, height, self.mip_count).into_iter().enumerate() {
            let mut mip = Framebuffer::new(
                FramebufferDescription::new(&format!("Bloom Mip {}", i), w, h).with_color(
                    AttachmentFormat::Rgb,
                    AttachmentSize::Sixteen,
                    AttachmentKind::Float,
                ),
            );
            if let Err(err) = mip.init(device) {
                for mut created in mips {
                    created.delete();
                }
                return Err(err);
            }
            mips.push(mip);
        }

        self.mips = mips;
        Ok(())
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) -> Result<(), FramebufferError> {
        self.init(device, width, height)
    }

    pub fn delete(&mut self) {
        for mut mip in self.mips.drain(..) {
            mip.delete();
        }
    }

    pub fn is_initialized(&self) -> bool {
        !self.mips.is_empty()
    }

    pub fn mips(&self) -> &[Framebuffer] {
        &self.mips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_sizes_halve() {
        assert_eq!(
            bloom_mip_sizes(1280, 720, 4),
            vec![(640, 360), (320, 180), (160, 90), (80, 45)]
        );
    }

    #[test]
    fn mip_chain_stops_at_one_pixel() {
        let sizes = bloom_mip_sizes(8, 2, 10);
        assert_eq!(sizes, vec![(4, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn uninitialized_chain_is_empty() {
        let bloom = BloomFramebuffer::new(6);
        assert!(!bloom.is_initialized());
        assert!(bloom.mips().is_empty());
    }
}
