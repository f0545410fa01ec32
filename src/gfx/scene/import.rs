//! Model import
//!
//! `.obj` and `.gltf`/`.glb` files are read into an [`ImportedScene`]: a node
//! tree with transforms and mesh lists, CPU geometry and material texture
//! sources. Textures on disk stay paths; images embedded in a glTF (buffer
//! views or `data:` URIs) are decoded here, as are the packed ARM maps built
//! from glTF occlusion and metallic-roughness images. Nothing here touches
//! the GPU; [`instantiate`] links an imported scene into a [`SceneGraph`]
//! once its meshes and materials are uploaded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cgmath::{Matrix4, SquareMatrix};
use image::RgbaImage;

use super::mesh::MeshId;
use super::scene_graph::{NodeId, SceneGraph};
use crate::error::AssetError;
use crate::gfx::geometry::GeometryData;
use crate::gfx::resources::material::{MaterialId, MaterialTextures};
use crate::gfx::resources::texture_manager::{decode_rgba8, TextureSource};

#[derive(Debug, Clone)]
pub struct ImportedNode {
    pub name: String,
    pub transform: Matrix4<f32>,
    /// Indices into [`ImportedScene::meshes`]
    pub meshes: Vec<usize>,
    /// Indices into [`ImportedScene::nodes`]
    pub children: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct ImportedMesh {
    pub name: String,
    pub geometry: GeometryData,
    pub material: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ImportedMaterial {
    pub name: String,
    pub textures: MaterialTextures<TextureSource>,
}

#[derive(Debug, Clone, Default)]
pub struct ImportedScene {
    pub nodes: Vec<ImportedNode>,
    pub roots: Vec<usize>,
    pub meshes: Vec<ImportedMesh>,
    pub materials: Vec<ImportedMaterial>,
}

/// Reads a model file, picking the importer from the extension.
///
/// With `flip_uvs` every texture coordinate becomes `(u, 1 - v)`; OBJ files
/// put the texture origin at the bottom left and usually want it.
pub fn load_model(path: &Path, flip_uvs: bool) -> Result<ImportedScene, AssetError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let mut scene = match extension.as_deref() {
        Some("obj") => load_obj(path)?,
        Some("gltf") | Some("glb") => load_gltf(path)?,
        _ => return Err(AssetError::UnsupportedFormat(path.to_path_buf())),
    };

    if flip_uvs {
        for mesh in &mut scene.meshes {
            for uv in &mut mesh.geometry.tex_coords {
                uv[1] = 1.0 - uv[1];
            }
        }
    }
    Ok(scene)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string())
}

fn texture_path(base: &Path, name: &str) -> PathBuf {
    base.join(name.trim().replace('\\', "/"))
}

fn texture_file(base: &Path, name: &str) -> TextureSource {
    TextureSource::File(texture_path(base, name))
}

/// Generates missing tangents, or returns `None` for geometry without a
/// single triangle (point and line groups, empty primitives)
fn finish_geometry(mut geometry: GeometryData, name: &str, path: &Path) -> Option<GeometryData> {
    if !geometry.has_triangles() {
        log::warn!(
            "Skipping mesh '{}' in '{}': no triangles ({} vertices, {} indices)",
            name,
            path.display(),
            geometry.vertices.len(),
            geometry.indices.len()
        );
        return None;
    }
    geometry.ensure_tangents();
    Some(geometry)
}

/// One root node holding every OBJ object as a mesh
pub fn load_obj(path: &Path) -> Result<ImportedScene, AssetError> {
    let (models, materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
    )
    .map_err(|source| AssetError::Obj {
        path: path.to_path_buf(),
        source,
    })?;

    let materials = materials.unwrap_or_else(|err| {
        log::warn!("No usable MTL for '{}': {}", path.display(), err);
        Vec::new()
    });
    let base = path.parent().unwrap_or_else(|| Path::new(""));

    let materials = materials
        .iter()
        .map(|mtl| {
            let param = |keys: &[&str]| {
                keys.iter()
                    .find_map(|key| mtl.unknown_param.get(*key))
                    .map(|name| texture_file(base, name))
            };
            ImportedMaterial {
                name: mtl.name.clone(),
                textures: MaterialTextures {
                    base_color: mtl.diffuse_texture.as_deref().map(|name| texture_file(base, name)),
                    normal: mtl
                        .normal_texture
                        .as_deref()
                        .map(|name| texture_file(base, name))
                        .or_else(|| param(&["norm", "map_Kn"])),
                    ambient_occlusion: mtl
                        .ambient_texture
                        .as_deref()
                        .map(|name| texture_file(base, name))
                        .or_else(|| param(&["map_ao", "map_AO"])),
                    roughness: param(&["map_Pr"]),
                    metallic: param(&["map_Pm"]),
                    arm: param(&["map_ORM", "map_orm", "map_arm", "map_ARM"]),
                },
            }
        })
        .collect();

    let meshes: Vec<ImportedMesh> = models
        .into_iter()
        .filter_map(|model| {
            let mesh = model.mesh;
            let vertices: Vec<[f32; 3]> = mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]).collect();
            let normals = if mesh.normals.len() == mesh.positions.len() {
                mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]).collect()
            } else {
                Vec::new()
            };
            let tex_coords = if mesh.texcoords.len() / 2 == vertices.len() {
                mesh.texcoords.chunks_exact(2).map(|t| [t[0], t[1]]).collect()
            } else {
                Vec::new()
            };

            let geometry = GeometryData {
                vertices,
                tex_coords,
                normals,
                tangents: Vec::new(),
                indices: mesh.indices,
            };

            Some(ImportedMesh {
                geometry: finish_geometry(geometry, &model.name, path)?,
                name: model.name,
                material: mesh.material_id,
            })
        })
        .collect();

    Ok(ImportedScene {
        nodes: vec![ImportedNode {
            name: file_stem(path),
            transform: Matrix4::identity(),
            meshes: (0..meshes.len()).collect(),
            children: Vec::new(),
        }],
        roots: vec![0],
        meshes,
        materials,
    })
}

/// Node hierarchy of the default scene; one mesh per triangle primitive
pub fn load_gltf(path: &Path) -> Result<ImportedScene, AssetError> {
    let gltf_error = |source| AssetError::Gltf {
        path: path.to_path_buf(),
        source,
    };
    let gltf = gltf::Gltf::open(path).map_err(gltf_error)?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    let buffers = gltf::import_buffers(&gltf.document, Some(base), gltf.blob.clone()).map_err(gltf_error)?;
    let document = &gltf.document;

    let mut images = GltfImages {
        path,
        base,
        buffers: &buffers,
        decoded: HashMap::new(),
    };
    let materials = document
        .materials()
        .map(|material| {
            let pbr = material.pbr_metallic_roughness();
            ImportedMaterial {
                name: material
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("material_{}", material.index().unwrap_or(0))),
                textures: MaterialTextures {
                    base_color: pbr
                        .base_color_texture()
                        .and_then(|info| images.source(info.texture().source())),
                    normal: material
                        .normal_texture()
                        .and_then(|normal| images.source(normal.texture().source())),
                    arm: images.arm(&material),
                    ..Default::default()
                },
            }
        })
        .collect();

    let mut meshes = Vec::new();
    let mut mesh_primitives: Vec<Vec<usize>> = Vec::new();
    for mesh in document.meshes() {
        let mut primitives = Vec::new();
        for primitive in mesh.primitives() {
            let name = format!("{}#{}", mesh.name().unwrap_or("mesh"), primitive.index());
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!("Skipping primitive '{}' with mode {:?}", name, primitive.mode());
                continue;
            }

            let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| data.0.as_slice()));
            let vertices: Vec<[f32; 3]> = reader
                .read_positions()
                .ok_or_else(|| AssetError::MissingAttribute {
                    path: path.to_path_buf(),
                    mesh: name.clone(),
                    attribute: "position",
                })?
                .collect();
            let indices = match reader.read_indices() {
                Some(indices) => indices.into_u32().collect(),
                None => (0..vertices.len() as u32).collect(),
            };
            let geometry = GeometryData {
                normals: reader.read_normals().map(|n| n.collect()).unwrap_or_default(),
                tex_coords: reader
                    .read_tex_coords(0)
                    .map(|t| t.into_f32().collect())
                    .unwrap_or_default(),
                tangents: reader.read_tangents().map(|t| t.collect()).unwrap_or_default(),
                vertices,
                indices,
            };
            let Some(geometry) = finish_geometry(geometry, &name, path) else {
                continue;
            };

            primitives.push(meshes.len());
            meshes.push(ImportedMesh {
                name,
                geometry,
                material: primitive.material().index(),
            });
        }
        mesh_primitives.push(primitives);
    }

    let nodes = document
        .nodes()
        .map(|node| ImportedNode {
            name: node.name().map(str::to_string).unwrap_or_else(|| format!("node_{}", node.index())),
            transform: Matrix4::from(node.transform().matrix()),
            meshes: node
                .mesh()
                .and_then(|mesh| mesh_primitives.get(mesh.index()).cloned())
                .unwrap_or_default(),
            children: node.children().map(|child| child.index()).collect(),
        })
        .collect();

    let roots = match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => scene.nodes().map(|node| node.index()).collect(),
        None => Vec::new(),
    };

    Ok(ImportedScene {
        nodes,
        roots,
        meshes,
        materials,
    })
}

/// How the packed ARM slot of a glTF material is filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArmSource {
    /// The occlusion map is the metallic-roughness image, already packed
    Shared(usize),
    /// Red comes from the occlusion image (white without one), green and
    /// blue from the metallic-roughness image
    Packed {
        occlusion: Option<usize>,
        metallic_roughness: usize,
    },
}

fn arm_source(occlusion: Option<usize>, metallic_roughness: Option<usize>) -> Option<ArmSource> {
    match (occlusion, metallic_roughness?) {
        (Some(occlusion), metallic_roughness) if occlusion == metallic_roughness => {
            Some(ArmSource::Shared(metallic_roughness))
        }
        (occlusion, metallic_roughness) => Some(ArmSource::Packed {
            occlusion,
            metallic_roughness,
        }),
    }
}

/// Builds an ARM map: ambient occlusion from the red channel of `occlusion`,
/// roughness and metallic from the green and blue channels of
/// `metallic_roughness`. The result has the metallic-roughness extent.
pub fn pack_arm(occlusion: Option<&RgbaImage>, metallic_roughness: &RgbaImage) -> RgbaImage {
    let (width, height) = metallic_roughness.dimensions();
    let resized;
    let occlusion = match occlusion {
        Some(image) if image.dimensions() != (width, height) => {
            resized = image::imageops::resize(image, width, height, image::imageops::FilterType::Triangle);
            Some(&resized)
        }
        other => other,
    };

    RgbaImage::from_fn(width, height, |x, y| {
        let packed = metallic_roughness.get_pixel(x, y);
        let ao = occlusion.map_or(255, |image| image.get_pixel(x, y)[0]);
        image::Rgba([ao, packed[1], packed[2], 255])
    })
}

/// Expands decoded glTF pixels to RGBA8; 16-bit channels keep their high byte
fn rgba8_from_gltf(data: gltf::image::Data) -> Option<RgbaImage> {
    use gltf::image::Format;

    let (channels, wide) = match data.format {
        Format::R8 => (1, false),
        Format::R8G8 => (2, false),
        Format::R8G8B8 => (3, false),
        Format::R8G8B8A8 => (4, false),
        Format::R16 => (1, true),
        Format::R16G16 => (2, true),
        Format::R16G16B16 => (3, true),
        Format::R16G16B16A16 => (4, true),
        Format::R32G32B32FLOAT | Format::R32G32B32A32FLOAT => return None,
    };
    let samples: Vec<u8> = if wide {
        data.pixels
            .chunks_exact(2)
            .map(|pair| (u16::from_ne_bytes([pair[0], pair[1]]) >> 8) as u8)
            .collect()
    } else {
        data.pixels
    };
    let rgba = samples
        .chunks_exact(channels)
        .flat_map(|pixel| match *pixel {
            [value] => [value, value, value, 255],
            [value, alpha] => [value, value, value, alpha],
            [r, g, b] => [r, g, b, 255],
            [r, g, b, a] => [r, g, b, a],
            _ => [0, 0, 0, 255],
        })
        .collect();
    RgbaImage::from_raw(data.width, data.height, rgba)
}

/// Resolves glTF images into texture sources, decoding each embedded image once
struct GltfImages<'a> {
    path: &'a Path,
    base: &'a Path,
    buffers: &'a [gltf::buffer::Data],
    decoded: HashMap<usize, Option<Arc<RgbaImage>>>,
}

impl GltfImages<'_> {
    fn key(&self, suffix: &str) -> String {
        format!("{}#{}", self.path.display(), suffix)
    }

    fn source(&mut self, image: gltf::Image<'_>) -> Option<TextureSource> {
        if let gltf::image::Source::Uri { uri, .. } = image.source() {
            if !uri.starts_with("data:") {
                return Some(texture_file(self.base, uri));
            }
        }
        let pixels = self.pixels(&image)?;
        Some(TextureSource::Embedded {
            key: self.key(&format!("image{}", image.index())),
            image: pixels,
        })
    }

    fn pixels(&mut self, image: &gltf::Image<'_>) -> Option<Arc<RgbaImage>> {
        if let Some(decoded) = self.decoded.get(&image.index()) {
            return decoded.clone();
        }

        let result = match image.source() {
            gltf::image::Source::Uri { uri, .. } if !uri.starts_with("data:") => {
                decode_rgba8(&texture_path(self.base, uri)).map_err(|err| err.to_string())
            }
            source => gltf::image::Data::from_source(source, Some(self.base), self.buffers)
                .map_err(|err| err.to_string())
                .and_then(|data| {
                    let format = data.format;
                    rgba8_from_gltf(data).ok_or_else(|| format!("{:?} pixels are not supported", format))
                }),
        };
        let decoded = match result {
            Ok(pixels) => Some(Arc::new(pixels)),
            Err(err) => {
                log::warn!(
                    "Image {} in '{}' could not be decoded, slot left empty: {}",
                    image.index(),
                    self.path.display(),
                    err
                );
                None
            }
        };
        self.decoded.insert(image.index(), decoded.clone());
        decoded
    }

    fn arm(&mut self, material: &gltf::Material<'_>) -> Option<TextureSource> {
        let metallic_roughness = material
            .pbr_metallic_roughness()
            .metallic_roughness_texture()
            .map(|info| info.texture().source());
        let occlusion = material.occlusion_texture().map(|info| info.texture().source());

        let plan = arm_source(
            occlusion.as_ref().map(gltf::Image::index),
            metallic_roughness.as_ref().map(gltf::Image::index),
        )?;
        let metallic_roughness = metallic_roughness?;
        match plan {
            ArmSource::Shared(_) => self.source(metallic_roughness),
            ArmSource::Packed {
                occlusion: occlusion_index,
                metallic_roughness: packed_index,
            } => {
                let packed = self.pixels(&metallic_roughness)?;
                let ao = occlusion.as_ref().and_then(|image| self.pixels(image));
                let suffix = match occlusion_index {
                    Some(index) => format!("arm{}-{}", index, packed_index),
                    None => format!("arm-{}", packed_index),
                };
                log::debug!(
                    "Packing ARM map for material '{}' ({})",
                    material.name().unwrap_or("unnamed"),
                    suffix
                );
                Some(TextureSource::Embedded {
                    key: self.key(&suffix),
                    image: Arc::new(pack_arm(ao.as_deref(), &packed)),
                })
            }
        }
    }
}

/// Links an imported scene into `graph`.
///
/// Every imported node becomes a grouping node carrying its transform, with
/// one child per mesh. `bindings[i]` is the uploaded mesh/material for
/// imported mesh `i`; meshes bound to `None` are left out. Returns the new
/// grouping nodes in depth-first order.
pub fn instantiate(
    graph: &mut SceneGraph,
    scene: &ImportedScene,
    bindings: &[Option<(MeshId, MaterialId)>],
) -> Vec<NodeId> {
    let mut created = Vec::new();
    let mut stack: Vec<(Option<NodeId>, usize)> = scene.roots.iter().rev().map(|root| (None, *root)).collect();

    while let Some((parent, index)) = stack.pop() {
        let Some(node) = scene.nodes.get(index) else {
            log::warn!("Imported node {} does not exist", index);
            continue;
        };

        let id = match parent {
            None => graph.add_element_to_root(None, None, node.transform),
            Some(parent) => match graph.add_child(parent, None, None, node.transform) {
                Ok(id) => id,
                Err(err) => {
                    log::warn!("Skipping node '{}': {}", node.name, err);
                    continue;
                }
            },
        };
        created.push(id);

        for mesh in &node.meshes {
            let Some(Some((mesh_id, material_id))) = bindings.get(*mesh) else {
                continue;
            };
            if let Err(err) = graph.add_child(id, Some(*mesh_id), Some(*material_id), Matrix4::identity()) {
                log::warn!("Skipping mesh {} of node '{}': {}", mesh, node.name, err);
            }
        }

        for child in node.children.iter().rev() {
            stack.push((Some(id), *child));
        }
    }

    created
}
