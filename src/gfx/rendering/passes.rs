//! Frame pass table and geometry planning
//!
//! The per-frame pass order is data: each descriptor names the resources it
//! samples and the ones it writes. [`validate_pass_order`] checks that every
//! read is satisfied by an earlier pass or by one-time initialization.

use std::ops::Range;

use crate::error::PassOrderError;
use crate::gfx::resources::material::{MaterialId, MaterialVariant};
use crate::gfx::scene::scene_graph::{SceneGraph, SceneGraphElementIndex};
use crate::gfx::scene::vertex::InstanceData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    GBuffer,
    Ssao,
    SsaoBlur,
    Shadow,
    Ambient,
    PointLights,
    DirectionalLight,
    DepthBlit,
    DebugLights,
    Skybox,
    BloomDownsample,
    BloomUpsample,
    Tonemap,
}

/// Render targets and textures passed between passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameResource {
    GBuffer,
    GBufferDepth,
    Ssao,
    SsaoBlurred,
    ShadowCascades,
    Hdr,
    HdrDepth,
    Bloom,
    Output,
    EnvironmentMap,
    IrradianceMap,
    PrefilterMap,
    BrdfLut,
    SsaoNoise,
}

#[derive(Debug, Clone, Copy)]
pub struct PassDescriptor {
    pub kind: PassKind,
    pub label: &'static str,
    pub inputs: &'static [FrameResource],
    pub outputs: &'static [FrameResource],
}

/// Resources created once at initialization
pub const INIT_RESOURCES: &[FrameResource] = &[
    FrameResource::EnvironmentMap,
    FrameResource::IrradianceMap,
    FrameResource::PrefilterMap,
    FrameResource::BrdfLut,
    FrameResource::SsaoNoise,
];

use FrameResource as R;

pub const FRAME_PASSES: &[PassDescriptor] = &[
    PassDescriptor {
        kind: PassKind::GBuffer,
        label: "G-Buffer",
        inputs: &[],
        outputs: &[R::GBuffer, R::GBufferDepth],
    },
    PassDescriptor {
        kind: PassKind::Ssao,
        label: "SSAO",
        inputs: &[R::GBuffer, R::SsaoNoise],
        outputs: &[R::Ssao],
    },
    PassDescriptor {
        kind: PassKind::SsaoBlur,
        label: "SSAO Blur",
        inputs: &[R::Ssao],
        outputs: &[R::SsaoBlurred],
    },
    PassDescriptor {
        kind: PassKind::Shadow,
        label: "Shadow Cascades",
        inputs: &[],
        outputs: &[R::ShadowCascades],
    },
    PassDescriptor {
        kind: PassKind::Ambient,
        label: "Ambient IBL",
        inputs: &[
            R::GBuffer,
            R::SsaoBlurred,
            R::IrradianceMap,
            R::PrefilterMap,
            R::BrdfLut,
        ],
        outputs: &[R::Hdr],
    },
    PassDescriptor {
        kind: PassKind::PointLights,
        label: "Point Lights",
        inputs: &[R::GBuffer, R::Hdr],
        outputs: &[R::Hdr],
    },
    PassDescriptor {
        kind: PassKind::DirectionalLight,
        label: "Directional Light",
        inputs: &[R::GBuffer, R::ShadowCascades, R::Hdr],
        outputs: &[R::Hdr],
    },
    PassDescriptor {
        kind: PassKind::DepthBlit,
        label: "Depth Blit",
        inputs: &[R::GBufferDepth],
        outputs: &[R::HdrDepth],
    },
    PassDescriptor {
        kind: PassKind::DebugLights,
        label: "Debug Lights",
        inputs: &[R::Hdr, R::HdrDepth],
        outputs: &[R::Hdr],
    },
    PassDescriptor {
        kind: PassKind::Skybox,
        label: "Skybox",
        inputs: &[R::Hdr, R::HdrDepth, R::EnvironmentMap],
        outputs: &[R::Hdr],
    },
    PassDescriptor {
        kind: PassKind::BloomDownsample,
        label: "Bloom Downsample",
        inputs: &[R::Hdr],
        outputs: &[R::Bloom],
    },
    PassDescriptor {
        kind: PassKind::BloomUpsample,
        label: "Bloom Upsample",
        inputs: &[R::Bloom],
        outputs: &[R::Bloom],
    },
    PassDescriptor {
        kind: PassKind::Tonemap,
        label: "Tonemap",
        inputs: &[R::Hdr, R::Bloom],
        outputs: &[R::Output],
    },
];

/// Checks that every pass input exists by the time the pass runs
pub fn validate_pass_order(passes: &[PassDescriptor], initial: &[FrameResource]) -> Result<(), PassOrderError> {
    let mut available: Vec<FrameResource> = initial.to_vec();
    for pass in passes {
        if let Some(missing) = pass.inputs.iter().find(|input| !available.contains(input)) {
            return Err(PassOrderError {
                pass: pass.label,
                resource: *missing,
            });
        }
        available.extend(pass.outputs.iter().copied());
    }
    Ok(())
}

/// One instanced draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawBatch {
    pub key: SceneGraphElementIndex,
    pub variant: MaterialVariant,
    /// Range into [`FramePlan::instances`]
    pub instances: Range<u32>,
}

/// Instanced draws for one frame, sharing one instance buffer.
///
/// Batches own disjoint instance ranges, so they can be issued in any order.
#[derive(Debug, Default, Clone)]
pub struct FramePlan {
    pub batches: Vec<DrawBatch>,
    pub instances: Vec<InstanceData>,
}

impl FramePlan {
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

/// Turns the scene graph's instancing groups into draw batches.
///
/// Groups whose material has no pipeline variant are skipped.
pub fn plan_geometry(
    graph: &mut SceneGraph,
    variant_of: impl Fn(MaterialId) -> Option<MaterialVariant>,
) -> FramePlan {
    let mut plan = FramePlan::default();
    graph.for_each(|key, transforms| {
        let Some(variant) = variant_of(key.material) else {
            log::debug!("Skipping {} instances of {:?}: no pipeline for material", transforms.len(), key);
            return;
        };
        let start = plan.instances.len() as u32;
        plan.instances
            .extend(transforms.iter().map(|transform| InstanceData::from_matrix(*transform)));
        plan.batches.push(DrawBatch {
            key,
            variant,
            instances: start..plan.instances.len() as u32,
        });
    });
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gfx::scene::mesh::MeshId;
    use cgmath::{Matrix4, SquareMatrix, Vector3};

    #[test]
    fn frame_pass_table_is_well_ordered() {
        assert!(validate_pass_order(FRAME_PASSES, INIT_RESOURCES).is_ok());
    }

    #[test]
    fn reading_before_writing_is_reported() {
        let mut passes = FRAME_PASSES.to_vec();
        let tonemap = passes.pop().unwrap();
        passes.insert(0, tonemap);
        let err = validate_pass_order(&passes, INIT_RESOURCES).unwrap_err();
        assert_eq!(err.pass, "Tonemap");
        assert_eq!(err.resource, FrameResource::Hdr);
    }

    #[test]
    fn ibl_maps_must_exist_before_ambient() {
        let err = validate_pass_order(FRAME_PASSES, &[FrameResource::SsaoNoise]).unwrap_err();
        assert_eq!(err.pass, "Ambient IBL");
    }

    #[test]
    fn plan_assigns_disjoint_instance_ranges() {
        let mut graph = SceneGraph::new();
        let (cube, sphere) = (MeshId(0), MeshId(1));
        let brick = MaterialId(0);
        for i in 0..3 {
            graph.add_element_to_root(
                Some(cube),
                Some(brick),
                Matrix4::from_translation(Vector3::new(i as f32, 0.0, 0.0)),
            );
        }
        let group = graph.add_element_to_root(None, None, Matrix4::identity());
        graph.add_child(group, Some(sphere), Some(brick), Matrix4::identity()).unwrap();
        graph.add_child(group, Some(cube), Some(brick), Matrix4::identity()).unwrap();

        let plan = plan_geometry(&mut graph, |_| Some(MaterialVariant::PbrNormalArm));
        assert_eq!(plan.instance_count(), 5);
        assert_eq!(plan.batches.len(), 2);
        assert_eq!(plan.batches[0].key.mesh, cube);
        assert_eq!(plan.batches[0].instances, 0..4);
        assert_eq!(plan.batches[1].instances, 4..5);
    }

    #[test]
    fn materials_without_variant_are_skipped() {
        let mut graph = SceneGraph::new();
        graph.add_element_to_root(Some(MeshId(0)), Some(MaterialId(0)), Matrix4::identity());
        graph.add_element_to_root(Some(MeshId(0)), Some(MaterialId(1)), Matrix4::identity());

        let plan = plan_geometry(&mut graph, |id| (id == MaterialId(1)).then_some(MaterialVariant::PbrNormal));
        assert_eq!(plan.batches.len(), 1);
        assert_eq!(plan.batches[0].key.material, MaterialId(1));
        assert_eq!(plan.batches[0].instances, 0..1);
    }
}
