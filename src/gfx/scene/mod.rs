//! # Scene Management Module
//!
//! The instancing scene graph, GPU meshes and model import.
//!
//! - [`SceneGraph`] - arena of nodes linked parent / first child / next sibling
//! - [`MeshManager`] - append-only store of uploaded meshes
//! - [`import`] - OBJ and glTF files to an [`import::ImportedScene`]
//! - [`Vertex3D`] / [`InstanceData`] - vertex and per-instance layouts

pub mod import;
pub mod mesh;
pub mod scene_graph;
pub mod vertex;

// Re-export main types
pub use mesh::{DrawMesh, Mesh, MeshId, MeshManager};
pub use scene_graph::{NodeId, SceneGraph, SceneGraphElementIndex};
pub use vertex::{InstanceData, Vertex3D};
