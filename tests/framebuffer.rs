//! Framebuffer lifecycle against a real device. Skipped when no adapter exists.

use umbra::gfx::framebuffer::attachment::{AttachmentFormat, AttachmentKind, AttachmentSize, AttachmentStorage};
use umbra::gfx::framebuffer::bloom::BloomFramebuffer;
use umbra::gfx::framebuffer::{check_completeness, Framebuffer, FramebufferDescription, DEPTH_FORMAT};

fn device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default())).ok()?;
    pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("Framebuffer Test Device"),
        required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
        ..Default::default()
    }))
    .ok()
}

fn two_color_description() -> FramebufferDescription {
    FramebufferDescription::new("Round Trip", 256, 256)
        .with_color(AttachmentFormat::Rgba, AttachmentSize::Sixteen, AttachmentKind::Float)
        .with_color(AttachmentFormat::Red, AttachmentSize::Eight, AttachmentKind::Unsigned)
        .with_depth_stencil(AttachmentStorage::Texture)
}

#[test]
fn resize_to_same_size_keeps_attachments() {
    let Some((device, _queue)) = device() else {
        eprintln!("no wgpu adapter available, skipping");
        return;
    };

    let mut framebuffer = Framebuffer::new(two_color_description());
    framebuffer.init(&device).unwrap();
    let formats: Vec<wgpu::TextureFormat> = (0..framebuffer.color_attachment_count())
        .filter_map(|i| framebuffer.color_attachment(i).map(|a| a.format))
        .collect();
    assert_eq!(formats, vec![wgpu::TextureFormat::Rgba16Float, wgpu::TextureFormat::R8Unorm]);

    framebuffer.resize(&device, 256, 256).unwrap();

    assert!(framebuffer.is_initialized());
    assert!(check_completeness(framebuffer.description(), &device.limits()).is_ok());
    assert_eq!(framebuffer.size(), (256, 256));
    assert_eq!(framebuffer.color_attachment_count(), 2);
    let resized: Vec<wgpu::TextureFormat> = (0..framebuffer.color_attachment_count())
        .filter_map(|i| framebuffer.color_attachment(i).map(|a| a.format))
        .collect();
    assert_eq!(resized, formats);
    assert_eq!(
        framebuffer.depth_stencil_attachment().map(|a| a.format),
        Some(DEPTH_FORMAT)
    );

    framebuffer.delete();
    assert!(!framebuffer.is_initialized());
}

#[test]
fn resize_changes_the_attachment_extent() {
    let Some((device, _queue)) = device() else {
        eprintln!("no wgpu adapter available, skipping");
        return;
    };

    let mut framebuffer = Framebuffer::new(two_color_description());
    framebuffer.init(&device).unwrap();
    framebuffer.resize(&device, 128, 64).unwrap();

    let size = framebuffer.color_attachment(0).map(|a| a.texture.size());
    assert_eq!(size.map(|s| (s.width, s.height)), Some((128, 64)));
    framebuffer.delete();
}

#[test]
fn bloom_chain_allocates_one_target_per_mip() {
    let Some((device, _queue)) = device() else {
        eprintln!("no wgpu adapter available, skipping");
        return;
    };

    let mut bloom = BloomFramebuffer::new(4);
    bloom.init(&device, 160, 96).unwrap();
    let sizes: Vec<(u32, u32)> = bloom.mips().iter().map(|mip| mip.size()).collect();
    assert_eq!(sizes, vec![(80, 48), (40, 24), (20, 12), (10, 6)]);

    bloom.resize(&device, 8, 2).unwrap();
    assert_eq!(bloom.mips().len(), 3);

    bloom.delete();
    assert!(!bloom.is_initialized());
}
