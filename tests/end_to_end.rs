//! OBJ on disk through import, the scene graph and frame planning

use std::io::Write;
use std::path::{Path, PathBuf};

use cgmath::{Matrix4, Vector3};
use umbra::gfx::rendering::passes::plan_geometry;
use umbra::gfx::resources::{MaterialId, MaterialVariant};
use umbra::gfx::scene::import::{self, load_model};
use umbra::gfx::scene::{MeshId, SceneGraph};

const CUBE_OBJ: &str = "mtllib crate.mtl\n\
    o crate\n\
    v -1 -1 -1\nv 1 -1 -1\nv 1 1 -1\nv -1 1 -1\n\
    v -1 -1 1\nv 1 -1 1\nv 1 1 1\nv -1 1 1\n\
    vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
    usemtl wood\n\
    f 1/1 2/2 3/3 4/4\n\
    f 5/1 8/4 7/3 6/2\n\
    f 1/1 5/2 6/3 2/4\n\
    f 4/1 3/2 7/3 8/4\n\
    f 1/1 4/2 8/3 5/4\n\
    f 2/1 6/2 7/3 3/4\n";

const CUBE_MTL: &str = "newmtl wood\n\
    map_Kd wood_albedo.png\n\
    norm wood_normal.png\n\
    map_AO wood_ao.png\n\
    map_Pr wood_roughness.png\n\
    map_Pm wood_metallic.png\n";

fn write_crate(dir: &Path) -> PathBuf {
    let obj = dir.join("crate.obj");
    std::fs::File::create(&obj).unwrap().write_all(CUBE_OBJ.as_bytes()).unwrap();
    std::fs::File::create(dir.join("crate.mtl"))
        .unwrap()
        .write_all(CUBE_MTL.as_bytes())
        .unwrap();
    obj
}

#[test]
fn obj_reaches_the_gbuffer_plan_as_one_batch() {
    let dir = tempfile::tempdir().unwrap();
    let scene = load_model(&write_crate(dir.path()), true).unwrap();

    assert_eq!(scene.meshes.len(), 1);
    let geometry = &scene.meshes[0].geometry;
    assert_eq!(geometry.triangle_count(), 12);
    assert_eq!(geometry.normals.len(), geometry.vertices.len());
    assert_eq!(geometry.tangents.len(), geometry.vertices.len());

    let variant = scene.materials[0].textures.classify();
    assert_eq!(variant, Some(MaterialVariant::PbrNormal));

    let mut graph = SceneGraph::new();
    let bindings = [Some((MeshId(0), MaterialId(0)))];
    let groups = import::instantiate(&mut graph, &scene, &bindings);
    assert_eq!(groups.len(), 1);

    // A second copy of the same model shares the instancing group
    let copies = import::instantiate(&mut graph, &scene, &bindings);
    graph
        .translate_element(copies[0], Vector3::new(5.0, 0.0, 0.0))
        .unwrap();

    let plan = plan_geometry(&mut graph, |_| variant);
    assert_eq!(plan.batches.len(), 1);
    assert_eq!(plan.batches[0].variant, MaterialVariant::PbrNormal);
    assert_eq!(plan.batches[0].instances, 0..2);
    assert_eq!(plan.instance_count(), 2);

    let translations: Vec<[f32; 4]> = plan.instances.iter().map(|i| i.model[3]).collect();
    assert!(translations.contains(&[0.0, 0.0, 0.0, 1.0]));
    assert!(translations.contains(&[5.0, 0.0, 0.0, 1.0]));
}

#[test]
fn unclassified_materials_are_left_out_of_the_plan() {
    let mut graph = SceneGraph::new();
    graph.add_element_to_root(Some(MeshId(0)), Some(MaterialId(3)), Matrix4::from_scale(2.0));

    let plan = plan_geometry(&mut graph, |_| None);
    assert!(plan.batches.is_empty());
    assert_eq!(plan.instance_count(), 0);
}
