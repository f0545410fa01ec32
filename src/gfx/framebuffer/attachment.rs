//! Semantic attachment formats
//!
//! Render targets are requested as channel layout x bit depth x numeric kind
//! and resolved to a concrete [`wgpu::TextureFormat`] here.

use wgpu::TextureFormat;

use crate::error::AttachmentFormatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentFormat {
    Red,
    Rg,
    Rgb,
    Rgba,
}

/// Bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentSize {
    Eight,
    Sixteen,
    ThirtyTwo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    /// 8 bit: unsigned normalized; 16/32 bit: unsigned integer
    Unsigned,
    Int,
    Float,
}

/// Whether later passes sample the attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachmentStorage {
    #[default]
    Texture,
    /// Render-only; never bound for sampling
    Renderbuffer,
}

/// Resolves a semantic descriptor to a native format.
///
/// Three-channel requests have no native equivalent and are promoted to the
/// four-channel format of the same width for normalized and float kinds.
/// Every combination either maps or returns an explicit error.
pub fn get_attachment_type(
    format: AttachmentFormat,
    size: AttachmentSize,
    kind: AttachmentKind,
) -> Result<TextureFormat, AttachmentFormatError> {
    use AttachmentFormat as F;
    use AttachmentKind as K;
    use AttachmentSize as S;

    let bad_format = AttachmentFormatError::BadFormat { format, size, kind };
    let bad_size = AttachmentFormatError::BadSize { format, size, kind };

    let native = match (format, size, kind) {
        (_, S::Eight, K::Float) => return Err(bad_size),

        (F::Red, S::Eight, K::Unsigned) => TextureFormat::R8Unorm,
        (F::Red, S::Eight, K::Int) => TextureFormat::R8Sint,
        (F::Red, S::Sixteen, K::Unsigned) => TextureFormat::R16Uint,
        (F::Red, S::Sixteen, K::Int) => TextureFormat::R16Sint,
        (F::Red, S::Sixteen, K::Float) => TextureFormat::R16Float,
        (F::Red, S::ThirtyTwo, K::Unsigned) => TextureFormat::R32Uint,
        (F::Red, S::ThirtyTwo, K::Int) => TextureFormat::R32Sint,
        (F::Red, S::ThirtyTwo, K::Float) => TextureFormat::R32Float,

        (F::Rg, S::Eight, K::Unsigned) => TextureFormat::Rg8Unorm,
        (F::Rg, S::Eight, K::Int) => TextureFormat::Rg8Sint,
        (F::Rg, S::Sixteen, K::Unsigned) => TextureFormat::Rg16Uint,
        (F::Rg, S::Sixteen, K::Int) => TextureFormat::Rg16Sint,
        (F::Rg, S::Sixteen, K::Float) => TextureFormat::Rg16Float,
        (F::Rg, S::ThirtyTwo, K::Unsigned) => TextureFormat::Rg32Uint,
        (F::Rg, S::ThirtyTwo, K::Int) => TextureFormat::Rg32Sint,
        (F::Rg, S::ThirtyTwo, K::Float) => TextureFormat::Rg32Float,

        (F::Rgb, S::Eight, K::Unsigned) => TextureFormat::Rgba8Unorm,
        (F::Rgb, S::Sixteen, K::Float) => TextureFormat::Rgba16Float,
        (F::Rgb, S::ThirtyTwo, K::Float) => TextureFormat::Rgba32Float,
        (F::Rgb, _, K::Unsigned | K::Int) => return Err(bad_format),

        (F::Rgba, S::Eight, K::Unsigned) => TextureFormat::Rgba8Unorm,
        (F::Rgba, S::Eight, K::Int) => TextureFormat::Rgba8Sint,
        (F::Rgba, S::Sixteen, K::Unsigned) => TextureFormat::Rgba16Uint,
        (F::Rgba, S::Sixteen, K::Int) => TextureFormat::Rgba16Sint,
        (F::Rgba, S::Sixteen, K::Float) => TextureFormat::Rgba16Float,
        (F::Rgba, S::ThirtyTwo, K::Unsigned) => TextureFormat::Rgba32Uint,
        (F::Rgba, S::ThirtyTwo, K::Int) => TextureFormat::Rgba32Sint,
        (F::Rgba, S::ThirtyTwo, K::Float) => TextureFormat::Rgba32Float,
    };

    Ok(native)
}

/// Shader sample type matching a resolved format
pub fn sample_type(format: TextureFormat) -> wgpu::TextureSampleType {
    format
        .sample_type(None, None)
        .unwrap_or(wgpu::TextureSampleType::Float { filterable: false })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORMATS: [AttachmentFormat; 4] = [
        AttachmentFormat::Red,
        AttachmentFormat::Rg,
        AttachmentFormat::Rgb,
        AttachmentFormat::Rgba,
    ];
    const SIZES: [AttachmentSize; 3] = [
        AttachmentSize::Eight,
        AttachmentSize::Sixteen,
        AttachmentSize::ThirtyTwo,
    ];
    const KINDS: [AttachmentKind; 3] = [
        AttachmentKind::Unsigned,
        AttachmentKind::Int,
        AttachmentKind::Float,
    ];

    #[test]
    fn commonly_requested_combinations_resolve() {
        assert_eq!(
            get_attachment_type(AttachmentFormat::Rgba, AttachmentSize::Sixteen, AttachmentKind::Float),
            Ok(TextureFormat::Rgba16Float)
        );
        assert_eq!(
            get_attachment_type(AttachmentFormat::Red, AttachmentSize::Eight, AttachmentKind::Unsigned),
            Ok(TextureFormat::R8Unorm)
        );
        assert_eq!(
            get_attachment_type(AttachmentFormat::Rg, AttachmentSize::Sixteen, AttachmentKind::Float),
            Ok(TextureFormat::Rg16Float)
        );
    }

    #[test]
    fn rgb_is_promoted_to_rgba() {
        assert_eq!(
            get_attachment_type(AttachmentFormat::Rgb, AttachmentSize::Sixteen, AttachmentKind::Float),
            Ok(TextureFormat::Rgba16Float)
        );
        assert_eq!(
            get_attachment_type(AttachmentFormat::Rgb, AttachmentSize::ThirtyTwo, AttachmentKind::Unsigned),
            Err(AttachmentFormatError::BadFormat {
                format: AttachmentFormat::Rgb,
                size: AttachmentSize::ThirtyTwo,
                kind: AttachmentKind::Unsigned,
            })
        );
    }

    #[test]
    fn eight_bit_float_is_a_size_error() {
        for format in FORMATS {
            assert!(matches!(
                get_attachment_type(format, AttachmentSize::Eight, AttachmentKind::Float),
                Err(AttachmentFormatError::BadSize { .. })
            ));
        }
    }

    #[test]
    fn every_combination_is_decided() {
        let mut resolved = 0;
        let mut rejected = 0;
        for format in FORMATS {
            for size in SIZES {
                for kind in KINDS {
                    match get_attachment_type(format, size, kind) {
                        Ok(native) => {
                            resolved += 1;
                            assert!(!native.is_depth_stencil_format());
                        }
                        Err(_) => rejected += 1,
                    }
                }
            }
        }
        assert_eq!(resolved + rejected, 36);
        // 8-bit float for every layout, plus the five RGB integer requests
        assert_eq!(rejected, 4 + 5);
    }

    #[test]
    fn integer_formats_sample_as_integers() {
        assert_eq!(sample_type(TextureFormat::R32Uint), wgpu::TextureSampleType::Uint);
        assert_eq!(sample_type(TextureFormat::Rg16Sint), wgpu::TextureSampleType::Sint);
    }
}
