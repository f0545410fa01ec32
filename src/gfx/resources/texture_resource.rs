//! GPU texture resources
//!
//! Creates textures, views and samplers for material maps, cubemaps and
//! the float radiance maps consumed by image-based lighting.

use image::{imageops::FilterType, Rgba32FImage, RgbaImage};

/// GPU texture resource containing texture, view, and sampler
pub struct TextureResource {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

/// Number of mip levels down to 1x1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Box-filtered mip chain, level 0 first
pub fn generate_mip_chain(image: RgbaImage) -> Vec<RgbaImage> {
    let levels = mip_level_count(image.width(), image.height());
    let mut chain = Vec::with_capacity(levels as usize);
    chain.push(image);
    for _ in 1..levels {
        let Some(previous) = chain.last() else { break };
        let width = (previous.width() / 2).max(1);
        let height = (previous.height() / 2).max(1);
        let next = image::imageops::resize(previous, width, height, FilterType::Triangle);
        chain.push(next);
    }
    chain
}

impl TextureResource {
    /// Creates a mipmapped 2D texture from decoded RGBA8 pixels.
    ///
    /// Colour maps are stored as sRGB so sampling returns linear values;
    /// data maps (normal, roughness, ...) stay linear.
    pub fn from_rgba8(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: RgbaImage,
        srgb: bool,
        label: &str,
    ) -> Self {
        let format = if srgb {
            wgpu::TextureFormat::Rgba8UnormSrgb
        } else {
            wgpu::TextureFormat::Rgba8Unorm
        };
        let mips = generate_mip_chain(image);
        let (width, height) = mips[0].dimensions();

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mips.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (level, mip) in mips.iter().enumerate() {
            write_layer(queue, &texture, level as u32, 0, mip.as_raw(), mip.width(), mip.height(), 4);
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", label)),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Creates a cubemap from six equally sized square faces in
    /// +X, -X, +Y, -Y, +Z, -Z order
    pub fn cubemap_from_faces(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        faces: &[RgbaImage],
        label: &str,
    ) -> Self {
        debug_assert_eq!(faces.len(), 6);
        let size = faces.first().map_or(1, |face| face.width());
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (layer, face) in faces.iter().take(6).enumerate() {
            write_layer(queue, &texture, 0, layer as u32, face.as_raw(), size, size, 4);
        }

        let view = cube_view(&texture, label);
        let sampler = clamped_linear_sampler(device, label, false);
        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Uploads an equirectangular radiance map as `Rgba32Float`.
    ///
    /// 32-bit float textures are not filterable without an optional device
    /// feature, so the sampler uses nearest filtering.
    pub fn from_equirect_hdr(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        image: &Rgba32FImage,
        label: &str,
    ) -> Self {
        let (width, height) = image.dimensions();
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        write_layer(
            queue,
            &texture,
            0,
            0,
            bytemuck::cast_slice(image.as_raw()),
            width,
            height,
            16,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", label)),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Empty cubemap that IBL capture passes copy rendered faces into
    pub fn render_cubemap(
        device: &wgpu::Device,
        size: u32,
        mip_level_count: u32,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let view = cube_view(&texture, label);
        let sampler = clamped_linear_sampler(device, label, mip_level_count > 1);
        Self {
            texture,
            view,
            sampler,
        }
    }

    /// Small tiling texture with raw float texels (SSAO rotation noise)
    pub fn from_rgba32f_tiled(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        texels: &[[f32; 4]],
        width: u32,
        height: u32,
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        write_layer(queue, &texture, 0, 0, bytemuck::cast_slice(texels), width, height, 16);

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", label)),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    pub fn destroy(&self) {
        self.texture.destroy();
    }
}

#[allow(clippy::too_many_arguments)]
fn write_layer(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    mip_level: u32,
    layer: u32,
    data: &[u8],
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level,
            origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(bytes_per_pixel * width),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

fn cube_view(texture: &wgpu::Texture, label: &str) -> wgpu::TextureView {
    texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(&format!("{} View", label)),
        dimension: Some(wgpu::TextureViewDimension::Cube),
        array_layer_count: Some(6),
        ..Default::default()
    })
}

fn clamped_linear_sampler(device: &wgpu::Device, label: &str, mipmapped: bool) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(&format!("{} Sampler", label)),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: if mipmapped {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        },
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_count_reaches_one_pixel() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(300, 17), 9);
    }

    #[test]
    fn mip_chain_halves_each_level() {
        let chain = generate_mip_chain(RgbaImage::new(8, 2));
        let sizes: Vec<(u32, u32)> = chain.iter().map(|m| m.dimensions()).collect();
        assert_eq!(sizes, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
    }
}
