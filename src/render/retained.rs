//! In-process retained-mode node tree.
//!
//! Mirrors the shape of a real retained renderer (nodes, parent links, a
//! live scene that is the only thing drawn) without any GPU behind it. The
//! host binary draws through it and the tests inspect it.

use crate::render::engine::{
    AttachPoint, CameraPose, NodeGeometry, RayHit, RenderEngine, RenderError, RenderHandle,
};
use glam::{Mat4, Vec3};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Parent {
    Live,
    Node(RenderHandle),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<Parent>,
    children: Vec<RenderHandle>,
    transform: Mat4,
    geometry: Option<NodeGeometry>,
}

#[derive(Debug, Default)]
pub struct RetainedScene {
    nodes: HashMap<RenderHandle, Node>,
    live_roots: Vec<RenderHandle>,
    next_id: u32,
    camera: Option<CameraPose>,
    frames: u64,
}

impl RetainedScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, node: RenderHandle) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn live_roots(&self) -> &[RenderHandle] {
        &self.live_roots
    }

    /// Parent node of `node`; `None` for unattached nodes and live roots.
    pub fn parent_of(&self, node: RenderHandle) -> Option<RenderHandle> {
        match self.nodes.get(&node)?.parent? {
            Parent::Node(parent) => Some(parent),
            Parent::Live => None,
        }
    }

    pub fn children_of(&self, node: RenderHandle) -> &[RenderHandle] {
        self.nodes
            .get(&node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn camera(&self) -> Option<&CameraPose> {
        self.camera.as_ref()
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Composed transform from the live scene down to `node`.
    pub fn world_matrix(&self, node: RenderHandle) -> Option<Mat4> {
        let mut matrix = self.nodes.get(&node)?.transform;
        let mut current = node;
        let mut guard = self.nodes.len();
        while let Some(Parent::Node(parent)) = self.nodes.get(&current).and_then(|n| n.parent) {
            let parent_node = self.nodes.get(&parent)?;
            matrix = parent_node.transform * matrix;
            current = parent;
            guard = guard.checked_sub(1)?;
        }
        Some(matrix)
    }

    fn is_ancestor(&self, ancestor: RenderHandle, node: RenderHandle) -> bool {
        let mut current = Some(node);
        let mut guard = self.nodes.len() + 1;
        while let Some(handle) = current {
            if handle == ancestor {
                return true;
            }
            if guard == 0 {
                return false;
            }
            guard -= 1;
            current = match self.nodes.get(&handle).and_then(|n| n.parent) {
                Some(Parent::Node(parent)) => Some(parent),
                _ => None,
            };
        }
        false
    }

    fn unlink(&mut self, node: RenderHandle) {
        let Some(parent) = self.nodes.get_mut(&node).and_then(|n| n.parent.take()) else {
            return;
        };
        match parent {
            Parent::Live => self.live_roots.retain(|h| *h != node),
            Parent::Node(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.retain(|h| *h != node);
                }
            }
        }
    }
}

impl RenderEngine for RetainedScene {
    fn create_node(&mut self) -> RenderHandle {
        self.next_id += 1;
        let handle = RenderHandle { id: self.next_id };
        self.nodes.insert(
            handle,
            Node {
                parent: None,
                children: Vec::new(),
                transform: Mat4::IDENTITY,
                geometry: None,
            },
        );
        handle
    }

    fn destroy_node(&mut self, node: RenderHandle) {
        self.unlink(node);
        if let Some(removed) = self.nodes.remove(&node) {
            for child in removed.children {
                if let Some(child_node) = self.nodes.get_mut(&child) {
                    child_node.parent = None;
                }
            }
        }
    }

    fn attach(&mut self, node: RenderHandle, parent: AttachPoint) -> Result<(), RenderError> {
        if !self.nodes.contains_key(&node) {
            return Err(RenderError::UnknownNode(node));
        }
        let link = match parent {
            AttachPoint::LiveScene => Parent::Live,
            AttachPoint::Node(parent) => {
                if !self.nodes.contains_key(&parent) {
                    return Err(RenderError::UnknownNode(parent));
                }
                if self.is_ancestor(node, parent) {
                    return Err(RenderError::AttachCycle { node, parent });
                }
                Parent::Node(parent)
            }
        };
        if self.nodes.get(&node).and_then(|n| n.parent) == Some(link) {
            return Ok(());
        }
        self.unlink(node);
        match link {
            Parent::Live => self.live_roots.push(node),
            Parent::Node(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.push(node);
                }
            }
        }
        if let Some(n) = self.nodes.get_mut(&node) {
            n.parent = Some(link);
        }
        Ok(())
    }

    fn detach(&mut self, node: RenderHandle) {
        self.unlink(node);
    }

    fn set_transform(&mut self, node: RenderHandle, matrix: Mat4) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.transform = matrix;
        }
    }

    fn transform(&self, node: RenderHandle) -> Option<Mat4> {
        self.nodes.get(&node).map(|n| n.transform)
    }

    fn set_geometry(&mut self, node: RenderHandle, geometry: Option<NodeGeometry>) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.geometry = geometry;
        }
    }

    fn geometry(&self, node: RenderHandle) -> Option<NodeGeometry> {
        self.nodes.get(&node).and_then(|n| n.geometry)
    }

    fn is_reachable(&self, node: RenderHandle) -> bool {
        let mut current = node;
        let mut guard = self.nodes.len() + 1;
        loop {
            match self.nodes.get(&current).and_then(|n| n.parent) {
                Some(Parent::Live) => return true,
                Some(Parent::Node(parent)) => current = parent,
                None => return false,
            }
            if guard == 0 {
                return false;
            }
            guard -= 1;
        }
    }

    fn raycast(&self, origin: Vec3, dir: Vec3) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        for (&handle, node) in &self.nodes {
            let Some(geometry) = node.geometry else {
                continue;
            };
            if !self.is_reachable(handle) {
                continue;
            }
            let Some(world) = self.world_matrix(handle) else {
                continue;
            };
            let model = world * geometry.fit;
            if model.determinant().abs() < 1e-12 {
                continue;
            }
            let inverse = model.inverse();
            let local_origin = inverse.transform_point3(origin);
            let local_dir = inverse.transform_vector3(dir);
            let Some(t) = geometry.bounds.intersect_ray(local_origin, local_dir) else {
                continue;
            };
            let hit_point = model.transform_point3(local_origin + local_dir * t);
            let distance = (hit_point - origin).length();
            let closer = best.map(|b| distance < b.distance).unwrap_or(true);
            if closer {
                best = Some(RayHit { handle, distance });
            }
        }
        best
    }

    fn set_camera(&mut self, pose: &CameraPose) {
        self.camera = Some(*pose);
    }

    fn render(&mut self) -> usize {
        self.frames += 1;
        self.nodes
            .iter()
            .filter(|(handle, node)| node.geometry.is_some() && self.is_reachable(**handle))
            .count()
    }
}
