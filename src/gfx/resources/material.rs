//! PBR materials
//!
//! A material is a closed set of texture layouts. The variant alone decides
//! which G-buffer pipeline draws it and which bind group layout it uses.

use super::texture_manager::{TextureId, TextureManager};
use crate::error::AssetError;
use crate::wgpu_utils::binding_types;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(pub usize);

/// Shading pipeline selected by a material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialVariant {
    PbrNormal,
    PbrNormalNoAo,
    PbrNormalArm,
}

impl MaterialVariant {
    pub const ALL: [MaterialVariant; 3] = [Self::PbrNormal, Self::PbrNormalNoAo, Self::PbrNormalArm];

    /// Textures bound by the variant's G-buffer shader, in binding order
    pub fn texture_count(self) -> usize {
        match self {
            Self::PbrNormal => 5,
            Self::PbrNormalNoAo => 4,
            Self::PbrNormalArm => 3,
        }
    }

    fn index(self) -> usize {
        match self {
            Self::PbrNormal => 0,
            Self::PbrNormalNoAo => 1,
            Self::PbrNormalArm => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Material {
    Invalid,
    PbrNormal {
        base_color: TextureId,
        normal: TextureId,
        ambient_occlusion: TextureId,
        roughness: TextureId,
        metallic: TextureId,
    },
    PbrNormalNoAo {
        base_color: TextureId,
        normal: TextureId,
        roughness: TextureId,
        metallic: TextureId,
    },
    /// Ambient occlusion, roughness and metallic packed in R, G and B
    PbrNormalArm {
        base_color: TextureId,
        normal: TextureId,
        arm: TextureId,
    },
}

/// Named texture slots of an imported material.
///
/// Generic over the slot payload so import can classify on paths before any
/// texture is uploaded.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialTextures<T> {
    pub base_color: Option<T>,
    pub normal: Option<T>,
    pub ambient_occlusion: Option<T>,
    pub roughness: Option<T>,
    pub metallic: Option<T>,
    pub arm: Option<T>,
}

impl<T> Default for MaterialTextures<T> {
    fn default() -> Self {
        Self {
            base_color: None,
            normal: None,
            ambient_occlusion: None,
            roughness: None,
            metallic: None,
            arm: None,
        }
    }
}

impl<T> MaterialTextures<T> {
    /// The variant these slots can drive, if any.
    ///
    /// A packed ARM map wins over separate maps.
    pub fn classify(&self) -> Option<MaterialVariant> {
        if self.base_color.is_none() || self.normal.is_none() {
            return None;
        }
        if self.arm.is_some() {
            return Some(MaterialVariant::PbrNormalArm);
        }
        match (&self.ambient_occlusion, &self.roughness, &self.metallic) {
            (Some(_), Some(_), Some(_)) => Some(MaterialVariant::PbrNormal),
            (None, Some(_), Some(_)) => Some(MaterialVariant::PbrNormalNoAo),
            _ => None,
        }
    }

    /// Converts every filled slot, failing on the first error
    pub fn try_map<U, E>(self, mut f: impl FnMut(T, bool) -> Result<U, E>) -> Result<MaterialTextures<U>, E> {
        let mut convert = |slot: Option<T>, srgb: bool| slot.map(|value| f(value, srgb)).transpose();
        Ok(MaterialTextures {
            base_color: convert(self.base_color, true)?,
            normal: convert(self.normal, false)?,
            ambient_occlusion: convert(self.ambient_occlusion, false)?,
            roughness: convert(self.roughness, false)?,
            metallic: convert(self.metallic, false)?,
            arm: convert(self.arm, false)?,
        })
    }
}

impl Material {
    pub fn from_textures(name: &str, textures: &MaterialTextures<TextureId>) -> Result<Self, AssetError> {
        let unsupported = || AssetError::UnsupportedMaterial(name.to_string());
        let variant = textures.classify().ok_or_else(unsupported)?;
        let (Some(base_color), Some(normal)) = (textures.base_color, textures.normal) else {
            return Err(unsupported());
        };

        let material = match variant {
            MaterialVariant::PbrNormalArm => Material::PbrNormalArm {
                base_color,
                normal,
                arm: textures.arm.ok_or_else(unsupported)?,
            },
            MaterialVariant::PbrNormal => Material::PbrNormal {
                base_color,
                normal,
                ambient_occlusion: textures.ambient_occlusion.ok_or_else(unsupported)?,
                roughness: textures.roughness.ok_or_else(unsupported)?,
                metallic: textures.metallic.ok_or_else(unsupported)?,
            },
            MaterialVariant::PbrNormalNoAo => Material::PbrNormalNoAo {
                base_color,
                normal,
                roughness: textures.roughness.ok_or_else(unsupported)?,
                metallic: textures.metallic.ok_or_else(unsupported)?,
            },
        };
        Ok(material)
    }

    pub fn variant(&self) -> Option<MaterialVariant> {
        match self {
            Material::Invalid => None,
            Material::PbrNormal { .. } => Some(MaterialVariant::PbrNormal),
            Material::PbrNormalNoAo { .. } => Some(MaterialVariant::PbrNormalNoAo),
            Material::PbrNormalArm { .. } => Some(MaterialVariant::PbrNormalArm),
        }
    }

    /// Textures in shader binding order
    pub fn textures(&self) -> Vec<TextureId> {
        match *self {
            Material::Invalid => Vec::new(),
            Material::PbrNormal {
                base_color,
                normal,
                ambient_occlusion,
                roughness,
                metallic,
            } => vec![base_color, normal, ambient_occlusion, roughness, metallic],
            Material::PbrNormalNoAo {
                base_color,
                normal,
                roughness,
                metallic,
            } => vec![base_color, normal, roughness, metallic],
            Material::PbrNormalArm { base_color, normal, arm } => vec![base_color, normal, arm],
        }
    }
}

/// Bind group layouts for the three G-buffer variants (group 1).
///
/// Binding 0 is the sampler, followed by the variant's textures.
pub struct MaterialLayouts {
    layouts: [wgpu::BindGroupLayout; 3],
}

impl MaterialLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let make = |variant: MaterialVariant| {
            let mut types = vec![binding_types::sampler(wgpu::SamplerBindingType::Filtering)];
            types.extend(std::iter::repeat_n(binding_types::texture_2d(), variant.texture_count()));
            binding_types::layout(
                device,
                &format!("{:?} Material Layout", variant),
                wgpu::ShaderStages::FRAGMENT,
                &types,
            )
        };
        Self {
            layouts: MaterialVariant::ALL.map(make),
        }
    }

    pub fn get(&self, variant: MaterialVariant) -> &wgpu::BindGroupLayout {
        &self.layouts[variant.index()]
    }
}

/// Append-only material store with one bind group per material
pub struct MaterialManager {
    layouts: MaterialLayouts,
    materials: Vec<Material>,
    bind_groups: Vec<Option<wgpu::BindGroup>>,
}

impl MaterialManager {
    pub fn new(device: &wgpu::Device) -> Self {
        Self {
            layouts: MaterialLayouts::new(device),
            materials: Vec::new(),
            bind_groups: Vec::new(),
        }
    }

    pub fn layouts(&self) -> &MaterialLayouts {
        &self.layouts
    }

    /// Stores `material` and builds its bind group from `textures`
    pub fn add(&mut self, device: &wgpu::Device, textures: &TextureManager, material: Material) -> MaterialId {
        let bind_group = material.variant().and_then(|variant| {
            let resources: Option<Vec<_>> = material.textures().into_iter().map(|id| textures.get(id)).collect();
            let Some(resources) = resources else {
                log::error!("Material references a texture that was never loaded");
                return None;
            };
            let sampler = &resources.first()?.sampler;
            let mut bindings = vec![wgpu::BindingResource::Sampler(sampler)];
            bindings.extend(resources.iter().map(|t| wgpu::BindingResource::TextureView(&t.view)));
            Some(binding_types::bind_group(
                device,
                &format!("{:?} Material", variant),
                self.layouts.get(variant),
                &bindings,
            ))
        });

        self.materials.push(material);
        self.bind_groups.push(bind_group);
        MaterialId(self.materials.len() - 1)
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    pub fn bind_group(&self, id: MaterialId) -> Option<&wgpu::BindGroup> {
        self.bind_groups.get(id.0).and_then(Option::as_ref)
    }

    /// Pipeline variant for `id`; invalid or unknown materials are logged
    pub fn variant(&self, id: MaterialId) -> Option<MaterialVariant> {
        match self.get(id) {
            Some(material) => material.variant(),
            None => {
                log::warn!("Unknown material handle {:?}", id);
                None
            }
        }
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slots(names: &[&str]) -> MaterialTextures<&'static str> {
        let mut textures = MaterialTextures::default();
        for name in names {
            match *name {
                "base" => textures.base_color = Some("base.png"),
                "normal" => textures.normal = Some("normal.png"),
                "ao" => textures.ambient_occlusion = Some("ao.png"),
                "rough" => textures.roughness = Some("rough.png"),
                "metal" => textures.metallic = Some("metal.png"),
                "arm" => textures.arm = Some("arm.png"),
                _ => unreachable!(),
            }
        }
        textures
    }

    #[test]
    fn classification_picks_variant_from_slots() {
        assert_eq!(
            slots(&["base", "normal", "arm"]).classify(),
            Some(MaterialVariant::PbrNormalArm)
        );
        assert_eq!(
            slots(&["base", "normal", "ao", "rough", "metal"]).classify(),
            Some(MaterialVariant::PbrNormal)
        );
        assert_eq!(
            slots(&["base", "normal", "rough", "metal"]).classify(),
            Some(MaterialVariant::PbrNormalNoAo)
        );
    }

    #[test]
    fn incomplete_slots_are_unsupported() {
        assert_eq!(slots(&["base"]).classify(), None);
        assert_eq!(slots(&["base", "normal"]).classify(), None);
        assert_eq!(slots(&["normal", "arm"]).classify(), None);
        assert_eq!(slots(&["base", "normal", "ao", "rough"]).classify(), None);
    }

    #[test]
    fn material_from_textures_keeps_binding_order() {
        let textures = MaterialTextures {
            base_color: Some(TextureId(3)),
            normal: Some(TextureId(4)),
            arm: Some(TextureId(5)),
            ..Default::default()
        };
        let material = Material::from_textures("brick", &textures).unwrap();
        assert_eq!(material.variant(), Some(MaterialVariant::PbrNormalArm));
        assert_eq!(material.textures(), vec![TextureId(3), TextureId(4), TextureId(5)]);

        let err = Material::from_textures("bare", &MaterialTextures::default()).unwrap_err();
        assert!(matches!(err, AssetError::UnsupportedMaterial(name) if name == "bare"));
    }

    #[test]
    fn try_map_marks_colour_slots_srgb() {
        let mapped = slots(&["base", "normal", "arm"])
            .try_map(|path, srgb| Ok::<_, ()>((path.len(), srgb)))
            .unwrap();
        assert_eq!(mapped.base_color, Some((8, true)));
        assert_eq!(mapped.normal, Some((10, false)));
        assert_eq!(mapped.roughness, None);
    }
}
