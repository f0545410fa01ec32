//! Deduplicating texture store
//!
//! Textures are loaded once per (source, colour space) and referenced by
//! [`TextureId`] afterwards. Handles are never reused.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{Rgba32FImage, RgbaImage};

use super::texture_resource::TextureResource;
use crate::error::AssetError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub usize);

/// Where a material texture comes from
#[derive(Debug, Clone, PartialEq)]
pub enum TextureSource {
    File(PathBuf),
    /// Pixels decoded while importing a model, identified by `key`
    Embedded { key: String, image: Arc<RgbaImage> },
}

impl TextureSource {
    pub fn label(&self) -> String {
        match self {
            TextureSource::File(path) => path.display().to_string(),
            TextureSource::Embedded { key, .. } => key.clone(),
        }
    }

    fn cache_key(&self) -> CacheKey {
        match self {
            TextureSource::File(path) => CacheKey::File(path.clone()),
            TextureSource::Embedded { key, .. } => CacheKey::Embedded(key.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    File(PathBuf),
    Embedded(String),
}

#[derive(Default)]
pub struct TextureManager {
    textures: Vec<TextureResource>,
    cache: HashMap<(CacheKey, bool), TextureId>,
}

pub(crate) fn decode_rgba8(path: &Path) -> Result<RgbaImage, AssetError> {
    let image = image::open(path).map_err(|source| image_error(path, source))?;
    Ok(image.to_rgba8())
}

fn image_error(path: &Path, source: image::ImageError) -> AssetError {
    match source {
        image::ImageError::IoError(source) => AssetError::Io {
            path: path.to_path_buf(),
            source,
        },
        source => AssetError::Image {
            path: path.to_path_buf(),
            source,
        },
    }
}

/// Decodes an equirectangular radiance map into linear RGBA floats
pub fn load_hdr_image(path: &Path) -> Result<Rgba32FImage, AssetError> {
    let image = image::open(path).map_err(|source| image_error(path, source))?;
    Ok(image.to_rgba32f())
}

/// Loads six square faces (+X, -X, +Y, -Y, +Z, -Z) into one cubemap
pub fn load_cubemap(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    faces: [&Path; 6],
) -> Result<TextureResource, AssetError> {
    let mut images = Vec::with_capacity(6);
    for path in faces {
        images.push(decode_rgba8(path)?);
    }
    check_cubemap_faces(&faces, &images)?;

    let label = format!("Cubemap {}", faces[0].display());
    Ok(TextureResource::cubemap_from_faces(device, queue, &images, &label))
}

fn check_cubemap_faces(faces: &[&Path; 6], images: &[RgbaImage]) -> Result<(), AssetError> {
    let expected = images.first().map_or(0, |image| image.width());
    for (path, image) in faces.iter().zip(images) {
        if image.width() != expected || image.height() != expected {
            return Err(AssetError::CubemapFace {
                path: path.to_path_buf(),
                width: image.width(),
                height: image.height(),
                expected,
            });
        }
    }
    Ok(())
}

impl TextureManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a 2D texture, returning the cached handle if it was loaded before
    pub fn load(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        path: &Path,
        srgb: bool,
    ) -> Result<TextureId, AssetError> {
        let key = (CacheKey::File(path.to_path_buf()), srgb);
        if let Some(id) = self.cache.get(&key) {
            return Ok(*id);
        }

        let image = decode_rgba8(path)?;
        log::debug!(
            "Loaded texture '{}' ({}x{}, srgb: {})",
            path.display(),
            image.width(),
            image.height(),
            srgb
        );
        let resource = TextureResource::from_rgba8(device, queue, image, srgb, &path.display().to_string());
        let id = self.insert(resource);
        self.cache.insert(key, id);
        Ok(id)
    }

    /// Loads a file or uploads embedded pixels, deduplicated like [`Self::load`]
    pub fn load_source(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &TextureSource,
        srgb: bool,
    ) -> Result<TextureId, AssetError> {
        let image = match source {
            TextureSource::File(path) => return self.load(device, queue, path, srgb),
            TextureSource::Embedded { image, .. } => image,
        };

        let key = (source.cache_key(), srgb);
        if let Some(id) = self.cache.get(&key) {
            return Ok(*id);
        }
        log::debug!(
            "Uploading embedded texture '{}' ({}x{}, srgb: {})",
            source.label(),
            image.width(),
            image.height(),
            srgb
        );
        let resource = TextureResource::from_rgba8(device, queue, image.as_ref().clone(), srgb, &source.label());
        let id = self.insert(resource);
        self.cache.insert(key, id);
        Ok(id)
    }

    /// Stores a texture created elsewhere (generated or rendered)
    pub fn insert(&mut self, texture: TextureResource) -> TextureId {
        self.textures.push(texture);
        TextureId(self.textures.len() - 1)
    }

    pub fn get(&self, id: TextureId) -> Option<&TextureResource> {
        self.textures.get(id.0)
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn delete_all(&mut self) {
        for texture in self.textures.drain(..) {
            texture.destroy();
        }
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_an_error() {
        let result = decode_rgba8(Path::new("does/not/exist.png"));
        assert!(matches!(result, Err(AssetError::Io { .. })));
    }

    #[test]
    fn embedded_sources_share_a_cache_entry_by_key() {
        let pixels = Arc::new(RgbaImage::new(2, 2));
        let embedded = |key: &str| TextureSource::Embedded {
            key: key.to_string(),
            image: pixels.clone(),
        };

        assert_eq!(embedded("tile.glb#image0").cache_key(), embedded("tile.glb#image0").cache_key());
        assert_ne!(embedded("tile.glb#image0").cache_key(), embedded("tile.glb#image1").cache_key());
        assert_ne!(
            TextureSource::File(PathBuf::from("tile.glb#image0")).cache_key(),
            embedded("tile.glb#image0").cache_key()
        );
        assert_eq!(embedded("tile.glb#image1").label(), "tile.glb#image1");
    }

    #[test]
    fn mismatched_cubemap_face_is_named() {
        let paths = ["px", "nx", "py", "ny", "pz", "nz"].map(PathBuf::from);
        let faces = [0, 1, 2, 3, 4, 5].map(|i| paths[i].as_path());
        let mut images = vec![RgbaImage::new(8, 8); 6];
        images[3] = RgbaImage::new(8, 4);

        match check_cubemap_faces(&faces, &images) {
            Err(AssetError::CubemapFace { path, height, expected, .. }) => {
                assert_eq!(path, PathBuf::from("ny"));
                assert_eq!((height, expected), (4, 8));
            }
            other => panic!("expected a face error, got {:?}", other),
        }
        images[3] = RgbaImage::new(8, 8);
        assert!(check_cubemap_faces(&faces, &images).is_ok());
    }

    #[test]
    fn hdr_decode_keeps_float_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sky.hdr");
        let pixels = image::Rgb32FImage::from_pixel(4, 2, image::Rgb([4.0, 2.0, 0.5]));
        image::DynamicImage::ImageRgb32F(pixels).save(&path).unwrap();

        let loaded = load_hdr_image(&path).unwrap();
        assert_eq!(loaded.dimensions(), (4, 2));
        assert!(loaded.get_pixel(0, 0)[0] > 1.0);
    }
}
