//! In-memory scene backend.
//!
//! Keeps a node arena instead of GPU objects. Assets are read with the `gltf`
//! crate: one node per glTF node, hierarchy preserved, mesh bounds taken from
//! the POSITION accessor min/max. Used by the `mirror` binary when no
//! renderer is attached, and by tests.

use crate::{
    scene::{Aabb, ImportError, SceneBackend},
    transform::DecomposedTransform,
};
use glam::{Mat4, Quat, Vec3};
use std::{collections::HashMap, path::Path};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub transform: DecomposedTransform,
    pub mesh_bounds: Option<Aabb>,
    pub collider: Option<Aabb>,
}

#[derive(Debug, Default)]
pub struct HeadlessScene {
    nodes: HashMap<NodeId, Node>,
    next_id: u32,
    camera_rotation: Quat,
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// Root nodes, oldest first.
    pub fn roots(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| *id)
            .collect();
        roots.sort();
        roots
    }

    pub fn set_camera_rotation(&mut self, rotation: Quat) {
        self.camera_rotation = rotation;
    }

    /// Adds an empty node, optionally under `parent`.
    pub fn spawn_node(&mut self, name: impl Into<String>, parent: Option<NodeId>) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let parent = parent.filter(|p| self.nodes.contains_key(p));
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.push(id);
        }

        self.nodes.insert(
            id,
            Node {
                name: name.into(),
                parent,
                children: Vec::new(),
                transform: DecomposedTransform::IDENTITY,
                mesh_bounds: None,
                collider: None,
            },
        );
        id
    }

    pub fn set_mesh_bounds(&mut self, id: NodeId, bounds: Aabb) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.mesh_bounds = Some(bounds);
        }
    }

    /// Imports `source` and its subtree. `ancestors` holds the glTF indices
    /// on the current path; meeting one again means the hierarchy is cyclic.
    fn import_node(
        &mut self,
        source: &gltf::Node,
        parent: NodeId,
        ancestors: &mut Vec<usize>,
    ) -> Result<(), ImportError> {
        if ancestors.contains(&source.index()) {
            return Err(ImportError::Parse(format!(
                "node {} is its own ancestor",
                source.index()
            )));
        }

        let name = source
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node_{}", source.index()));
        let id = self.spawn_node(name, Some(parent));

        let (translation, rotation, scale) = source.transform().decomposed();
        let mesh_bounds = source.mesh().and_then(|mesh| mesh_bounds(&mesh));
        if let Some(node) = self.nodes.get_mut(&id) {
            node.transform = DecomposedTransform {
                position: Vec3::from_array(translation),
                rotation: Quat::from_array(rotation),
                scale: Vec3::from_array(scale),
            };
            node.mesh_bounds = mesh_bounds;
        }

        ancestors.push(source.index());
        for child in source.children() {
            self.import_node(&child, id, ancestors)?;
        }
        ancestors.pop();
        Ok(())
    }

    fn collect_bounds(&self, id: NodeId, to_handle: Mat4, acc: &mut Option<Aabb>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if let Some(bounds) = node.mesh_bounds {
            let moved = transform_aabb(&bounds, to_handle);
            let merged = match acc.take() {
                Some(existing) => existing.union(&moved),
                None => moved,
            };
            *acc = Some(merged);
        }
        for child in &node.children {
            if let Some(child_node) = self.nodes.get(child) {
                self.collect_bounds(*child, to_handle * child_node.transform.to_mat4(), acc);
            }
        }
    }
}

impl SceneBackend for HeadlessScene {
    type Handle = NodeId;

    fn instantiate(&mut self, path: &Path, name: &str) -> Result<NodeId, ImportError> {
        let document = gltf::Gltf::open(path).map_err(|e| ImportError::Parse(e.to_string()))?;

        let root = self.spawn_node(name, None);
        if let Some(scene) = document.default_scene().or_else(|| document.scenes().next()) {
            let mut ancestors = Vec::new();
            let imported = scene
                .nodes()
                .try_for_each(|node| self.import_node(&node, root, &mut ancestors));
            if let Err(err) = imported {
                self.destroy(root);
                return Err(err);
            }
        }

        debug!(name, nodes = document.nodes().count(), "imported asset");
        Ok(root)
    }

    fn destroy(&mut self, handle: NodeId) {
        let Some(node) = self.nodes.remove(&handle) else {
            return;
        };
        if let Some(parent) = node.parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|child| *child != handle);
        }

        let mut pending = node.children;
        while let Some(id) = pending.pop() {
            if let Some(child) = self.nodes.remove(&id) {
                pending.extend(child.children);
            }
        }
    }

    fn parent(&self, handle: NodeId) -> Option<NodeId> {
        self.nodes.get(&handle).and_then(|node| node.parent)
    }

    fn set_transform(&mut self, handle: NodeId, transform: &DecomposedTransform) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.transform = *transform;
        }
    }

    fn render_bounds(&self, handle: NodeId) -> Option<Aabb> {
        let mut bounds = None;
        self.collect_bounds(handle, Mat4::IDENTITY, &mut bounds);
        bounds
    }

    fn has_collider(&self, handle: NodeId) -> bool {
        self.nodes
            .get(&handle)
            .is_some_and(|node| node.collider.is_some())
    }

    fn attach_collider(&mut self, handle: NodeId, collider: Aabb) {
        if let Some(node) = self.nodes.get_mut(&handle) {
            node.collider = Some(collider);
        }
    }

    fn camera_rotation(&self) -> Quat {
        self.camera_rotation
    }
}

fn mesh_bounds(mesh: &gltf::Mesh) -> Option<Aabb> {
    mesh.primitives()
        .filter_map(|primitive| {
            let accessor = primitive.get(&gltf::Semantic::Positions)?;
            let min = vec3_from_json(&accessor.min()?)?;
            let max = vec3_from_json(&accessor.max()?)?;
            Some(Aabb::new(min, max))
        })
        .reduce(|a, b| a.union(&b))
}

fn vec3_from_json(value: &gltf::json::Value) -> Option<Vec3> {
    let items = value.as_array()?;
    if items.len() != 3 {
        return None;
    }
    let x = items[0].as_f64()? as f32;
    let y = items[1].as_f64()? as f32;
    let z = items[2].as_f64()? as f32;
    Some(Vec3::new(x, y, z))
}

fn transform_aabb(bounds: &Aabb, matrix: Mat4) -> Aabb {
    let corners = [
        Vec3::new(bounds.min.x, bounds.min.y, bounds.min.z),
        Vec3::new(bounds.max.x, bounds.min.y, bounds.min.z),
        Vec3::new(bounds.min.x, bounds.max.y, bounds.min.z),
        Vec3::new(bounds.max.x, bounds.max.y, bounds.min.z),
        Vec3::new(bounds.min.x, bounds.min.y, bounds.max.z),
        Vec3::new(bounds.max.x, bounds.min.y, bounds.max.z),
        Vec3::new(bounds.min.x, bounds.max.y, bounds.max.z),
        Vec3::new(bounds.max.x, bounds.max.y, bounds.max.z),
    ];
    let mut min = Vec3::splat(f32::INFINITY);
    let mut max = Vec3::splat(f32::NEG_INFINITY);
    for corner in corners {
        let p = matrix.transform_point3(corner);
        min = min.min(p);
        max = max.max(p);
    }
    Aabb { min, max }
}
