//! Instancing scene graph
//!
//! Nodes live in an arena and form a first-child / next-sibling tree under a
//! synthetic super-root at index 0. Each node points at an element that
//! carries the optional mesh and material handles plus its transforms.
//! Every node also caches its last child so appends never walk the chain.
//! Elements without both handles are pure grouping nodes: they contribute
//! their transform to descendants but are never drawn.

use std::collections::HashMap;

use cgmath::{InnerSpace, Matrix4, Rad, SquareMatrix, Vector3};

use crate::error::SceneGraphError;
use crate::gfx::resources::material::MaterialId;
use crate::gfx::scene::mesh::MeshId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Instancing key: every element sharing it is drawn in one call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneGraphElementIndex {
    pub mesh: MeshId,
    pub material: MaterialId,
}

#[derive(Debug, Clone)]
pub struct SceneGraphElement {
    pub mesh: Option<MeshId>,
    pub material: Option<MaterialId>,
    pub local_transform: Matrix4<f32>,
    /// Product of every ancestor's local transform; refreshed by each traversal
    pub parent_transform: Matrix4<f32>,
}

impl SceneGraphElement {
    fn new(mesh: Option<MeshId>, material: Option<MaterialId>, local_transform: Matrix4<f32>) -> Self {
        Self {
            mesh,
            material,
            local_transform,
            parent_transform: Matrix4::identity(),
        }
    }

    pub fn index(&self) -> Option<SceneGraphElementIndex> {
        Some(SceneGraphElementIndex {
            mesh: self.mesh?,
            material: self.material?,
        })
    }

    pub fn world_transform(&self) -> Matrix4<f32> {
        self.parent_transform * self.local_transform
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SceneGraphNode {
    pub element: usize,
    pub parent: Option<NodeId>,
    pub child: Option<NodeId>,
    pub sibling: Option<NodeId>,
    /// Tail of the child chain
    pub last_child: Option<NodeId>,
}

pub struct SceneGraph {
    nodes: Vec<SceneGraphNode>,
    elements: Vec<SceneGraphElement>,
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneGraph {
    pub const ROOT: NodeId = NodeId(0);

    pub fn new() -> Self {
        Self {
            nodes: vec![SceneGraphNode {
                element: 0,
                parent: None,
                child: None,
                sibling: None,
                last_child: None,
            }],
            elements: vec![SceneGraphElement::new(None, None, Matrix4::identity())],
        }
    }

    /// Number of nodes, super-root included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Drops every node except the super-root
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneGraphNode> {
        self.nodes.get(id.0)
    }

    pub fn element(&self, id: NodeId) -> Option<&SceneGraphElement> {
        self.node(id).map(|node| &self.elements[node.element])
    }

    /// Direct children of `id` in sibling-chain order
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut children = Vec::new();
        let mut next = self.node(id).and_then(|n| n.child);
        while let Some(child) = next {
            children.push(child);
            next = self.nodes[child.0].sibling;
        }
        children
    }

    fn check(&self, id: NodeId) -> Result<(), SceneGraphError> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(SceneGraphError::InvalidNode(id.0))
        }
    }

    fn push(&mut self, parent: NodeId, element: SceneGraphElement) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(SceneGraphNode {
            element: self.elements.len(),
            parent: Some(parent),
            child: None,
            sibling: None,
            last_child: None,
        });
        self.elements.push(element);
        id
    }

    /// Adds a new top-level node
    pub fn add_element_to_root(
        &mut self,
        mesh: Option<MeshId>,
        material: Option<MaterialId>,
        local_transform: Matrix4<f32>,
    ) -> NodeId {
        let element = SceneGraphElement::new(mesh, material, local_transform);
        self.link_child(Self::ROOT, element)
    }

    /// Appends a child to `parent`.
    ///
    /// The first call sets the parent's child link; later calls extend the
    /// existing child's sibling chain, so the link is never overwritten.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        mesh: Option<MeshId>,
        material: Option<MaterialId>,
        local_transform: Matrix4<f32>,
    ) -> Result<NodeId, SceneGraphError> {
        self.check(parent)?;
        let element = SceneGraphElement::new(mesh, material, local_transform);
        Ok(self.link_child(parent, element))
    }

    fn link_child(&mut self, parent: NodeId, element: SceneGraphElement) -> NodeId {
        let id = self.push(parent, element);
        match self.nodes[parent.0].last_child {
            None => self.nodes[parent.0].child = Some(id),
            Some(last) => self.nodes[last.0].sibling = Some(id),
        }
        self.nodes[parent.0].last_child = Some(id);
        id
    }

    /// Appends a node at the end of `sibling`'s chain (same parent)
    pub fn add_sibling(
        &mut self,
        sibling: NodeId,
        mesh: Option<MeshId>,
        material: Option<MaterialId>,
        local_transform: Matrix4<f32>,
    ) -> Result<NodeId, SceneGraphError> {
        self.check(sibling)?;
        let parent = self.nodes[sibling.0].parent.ok_or(SceneGraphError::RootSibling)?;
        let element = SceneGraphElement::new(mesh, material, local_transform);
        Ok(self.link_child(parent, element))
    }

    fn local_mut(&mut self, id: NodeId) -> Result<&mut Matrix4<f32>, SceneGraphError> {
        self.check(id)?;
        let element = self.nodes[id.0].element;
        Ok(&mut self.elements[element].local_transform)
    }

    pub fn translate_element(&mut self, id: NodeId, offset: Vector3<f32>) -> Result<(), SceneGraphError> {
        let local = self.local_mut(id)?;
        *local = *local * Matrix4::from_translation(offset);
        Ok(())
    }

    pub fn rotate_element(
        &mut self,
        id: NodeId,
        axis: Vector3<f32>,
        angle: impl Into<Rad<f32>>,
    ) -> Result<(), SceneGraphError> {
        let local = self.local_mut(id)?;
        *local = *local * Matrix4::from_axis_angle(axis.normalize(), angle);
        Ok(())
    }

    pub fn scale_element(&mut self, id: NodeId, scale: Vector3<f32>) -> Result<(), SceneGraphError> {
        let local = self.local_mut(id)?;
        *local = *local * Matrix4::from_nonuniform_scale(scale.x, scale.y, scale.z);
        Ok(())
    }

    pub fn set_local_transform(&mut self, id: NodeId, transform: Matrix4<f32>) -> Result<(), SceneGraphError> {
        *self.local_mut(id)? = transform;
        Ok(())
    }

    /// Depth-first walk from the super-root with an explicit stack.
    ///
    /// Siblings are pushed before children so each child subtree completes
    /// before its next sibling. Refreshes every cached parent transform and
    /// calls `visit` for each drawable element with its world transform.
    fn traverse(&mut self, mut visit: impl FnMut(SceneGraphElementIndex, Matrix4<f32>)) {
        let mut stack: Vec<(NodeId, Matrix4<f32>)> = Vec::new();
        if let Some(first) = self.nodes[0].child {
            stack.push((first, Matrix4::identity()));
        }

        while let Some((id, parent_transform)) = stack.pop() {
            let node = self.nodes[id.0];
            let element = &mut self.elements[node.element];
            element.parent_transform = parent_transform;
            let world = element.world_transform();

            if let Some(index) = element.index() {
                visit(index, world);
            }

            if let Some(sibling) = node.sibling {
                stack.push((sibling, parent_transform));
            }
            if let Some(child) = node.child {
                stack.push((child, world));
            }
        }
    }

    /// Visits each distinct (mesh, material) pair once with all its world transforms.
    ///
    /// Keys are reported in the order they are first met during traversal.
    pub fn for_each(&mut self, mut visitor: impl FnMut(SceneGraphElementIndex, &[Matrix4<f32>])) {
        let mut slots: HashMap<SceneGraphElementIndex, usize> = HashMap::new();
        let mut batches: Vec<(SceneGraphElementIndex, Vec<Matrix4<f32>>)> = Vec::new();

        self.traverse(|index, world| {
            let slot = *slots.entry(index).or_insert_with(|| {
                batches.push((index, Vec::new()));
                batches.len() - 1
            });
            batches[slot].1.push(world);
        });

        for (index, transforms) in &batches {
            visitor(*index, transforms);
        }
    }

    /// Visits every drawable element individually
    pub fn for_each_no_instancing(&mut self, visitor: impl FnMut(SceneGraphElementIndex, Matrix4<f32>)) {
        self.traverse(visitor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Deg, Vector4};

    fn mesh(i: usize) -> Option<MeshId> {
        Some(MeshId(i))
    }

    fn material(i: usize) -> Option<MaterialId> {
        Some(MaterialId(i))
    }

    fn assert_matrix_eq(a: Matrix4<f32>, b: Matrix4<f32>) {
        let a: &[f32; 16] = a.as_ref();
        let b: &[f32; 16] = b.as_ref();
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-5, "{:?} != {:?}", a, b);
        }
    }

    #[test]
    fn three_level_chain_composes_root_to_leaf() {
        let mut graph = SceneGraph::new();
        let t = Matrix4::from_translation(Vector3::new(1.0, 2.0, 3.0));
        let r = Matrix4::from_angle_y(Deg(90.0_f32));
        let s = Matrix4::from_scale(2.0);

        let a = graph.add_element_to_root(None, None, t);
        let b = graph.add_child(a, None, None, r).unwrap();
        let c = graph.add_child(b, mesh(0), material(0), s).unwrap();

        let mut seen = Vec::new();
        graph.for_each(|_, transforms| seen.extend_from_slice(transforms));

        assert_eq!(seen.len(), 1);
        assert_matrix_eq(seen[0], t * r * s);
        assert_matrix_eq(graph.element(c).unwrap().parent_transform, t * r);

        // scale to (2,0,0), yaw 90 degrees to (0,0,-2), translate to (1,2,1)
        let point = seen[0] * Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert!((point.x - 1.0).abs() < 1e-5);
        assert!((point.y - 2.0).abs() < 1e-5);
        assert!((point.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn same_pair_at_different_depths_forms_one_batch() {
        let mut graph = SceneGraph::new();
        let top = graph.add_element_to_root(mesh(7), material(3), Matrix4::identity());
        let group = graph.add_element_to_root(None, None, Matrix4::identity());
        let mid = graph.add_child(group, mesh(7), material(3), Matrix4::identity()).unwrap();
        let deep = graph.add_child(mid, None, None, Matrix4::identity()).unwrap();
        graph.add_child(deep, mesh(7), material(3), Matrix4::identity()).unwrap();
        graph.add_child(top, mesh(7), material(3), Matrix4::identity()).unwrap();
        graph.add_sibling(mid, mesh(7), material(3), Matrix4::identity()).unwrap();
        graph.add_element_to_root(mesh(1), material(3), Matrix4::identity());

        let mut calls = Vec::new();
        graph.for_each(|key, transforms| calls.push((key, transforms.len())));

        let key = SceneGraphElementIndex {
            mesh: MeshId(7),
            material: MaterialId(3),
        };
        assert_eq!(calls.iter().filter(|(k, _)| *k == key).count(), 1);
        assert_eq!(calls.iter().find(|(k, _)| *k == key).unwrap().1, 5);
        assert_eq!(calls.len(), 2);
    }

    #[test]
    fn repeated_add_child_builds_stable_sibling_chain() {
        let mut graph = SceneGraph::new();
        let parent = graph.add_element_to_root(None, None, Matrix4::identity());
        let children: Vec<NodeId> = (0..4)
            .map(|i| {
                graph
                    .add_child(parent, mesh(i), material(0), Matrix4::identity())
                    .unwrap()
            })
            .collect();

        assert_eq!(graph.node(parent).unwrap().child, Some(children[0]));
        assert_eq!(graph.children(parent), children);

        let mut visited = Vec::new();
        graph.for_each_no_instancing(|key, _| visited.push(key.mesh));
        assert_eq!(visited, vec![MeshId(0), MeshId(1), MeshId(2), MeshId(3)]);
    }

    #[test]
    fn appends_keep_insertion_order_across_child_and_sibling_calls() {
        let mut graph = SceneGraph::new();
        let mut expected: Vec<NodeId> = (0..2000)
            .map(|i| graph.add_element_to_root(mesh(i), material(0), Matrix4::identity()))
            .collect();

        // add_sibling on an early node still lands at the tail of the chain
        expected.push(graph.add_sibling(expected[3], mesh(2000), material(0), Matrix4::identity()).unwrap());
        expected.push(graph.add_element_to_root(mesh(2001), material(0), Matrix4::identity()));
        assert_eq!(graph.children(SceneGraph::ROOT), expected);
        assert_eq!(graph.node(SceneGraph::ROOT).unwrap().last_child, expected.last().copied());

        let parent = expected[10];
        let first = graph.add_child(parent, mesh(0), material(1), Matrix4::identity()).unwrap();
        let second = graph.add_sibling(first, mesh(1), material(1), Matrix4::identity()).unwrap();
        let third = graph.add_child(parent, mesh(2), material(1), Matrix4::identity()).unwrap();
        assert_eq!(graph.children(parent), vec![first, second, third]);
        assert_eq!(graph.node(second).unwrap().parent, Some(parent));

        graph.clear();
        assert_eq!(graph.node(SceneGraph::ROOT).unwrap().last_child, None);
    }

    #[test]
    fn grouping_nodes_and_partial_handles_are_skipped() {
        let mut graph = SceneGraph::new();
        graph.add_element_to_root(mesh(0), None, Matrix4::identity());
        graph.add_element_to_root(None, material(0), Matrix4::identity());
        graph.add_element_to_root(None, None, Matrix4::identity());

        let mut calls = 0;
        graph.for_each(|_, _| calls += 1);
        assert_eq!(calls, 0);
    }

    #[test]
    fn no_instancing_reports_each_element() {
        let mut graph = SceneGraph::new();
        for x in 0..3 {
            graph.add_element_to_root(
                mesh(0),
                material(0),
                Matrix4::from_translation(Vector3::new(x as f32, 0.0, 0.0)),
            );
        }
        let mut xs = Vec::new();
        graph.for_each_no_instancing(|_, world| xs.push(world.w.x));
        assert_eq!(xs, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn transform_edits_post_multiply() {
        let mut graph = SceneGraph::new();
        let node = graph.add_element_to_root(mesh(0), material(0), Matrix4::identity());
        graph.scale_element(node, Vector3::new(2.0, 2.0, 2.0)).unwrap();
        graph.translate_element(node, Vector3::new(1.0, 0.0, 0.0)).unwrap();

        // translation happens in the scaled frame
        assert_eq!(graph.element(node).unwrap().local_transform.w.x, 2.0);

        graph
            .rotate_element(node, Vector3::unit_y(), Deg(0.0_f32))
            .unwrap();
        assert_eq!(graph.element(node).unwrap().local_transform.w.x, 2.0);

        graph.set_local_transform(node, Matrix4::identity()).unwrap();
        assert_eq!(graph.element(node).unwrap().local_transform, Matrix4::identity());
    }

    #[test]
    fn invalid_handles_are_errors() {
        let mut graph = SceneGraph::new();
        assert_eq!(
            graph.add_child(NodeId(42), None, None, Matrix4::identity()),
            Err(SceneGraphError::InvalidNode(42))
        );
        assert_eq!(
            graph.add_sibling(SceneGraph::ROOT, None, None, Matrix4::identity()),
            Err(SceneGraphError::RootSibling)
        );
        assert_eq!(
            graph.translate_element(NodeId(3), Vector3::unit_x()),
            Err(SceneGraphError::InvalidNode(3))
        );
    }
}
