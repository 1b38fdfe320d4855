//! Render-engine seam.
//!
//! The editor core never draws polygons itself. It talks to an opaque
//! retained-mode renderer through [`RenderEngine`]: nodes are created,
//! attached into a tree, given transforms and geometry, and ray-cast for
//! picking. Whatever the engine does internally between draws is its own
//! business; the only assumption is that it draws whenever asked.

use glam::{Mat4, Vec3};

/// Opaque handle to a node inside the render engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderHandle {
    pub id: u32,
}

impl std::fmt::Display for RenderHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.id)
    }
}

/// Where a node gets attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachPoint {
    /// The engine's live scene; anything reachable from here is drawn.
    LiveScene,
    Node(RenderHandle),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_extent(center: Vec3, extent: Vec3) -> Self {
        Self {
            min: center - extent,
            max: center + extent,
        }
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half-size along each axis.
    pub fn extent(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    pub fn longest_axis(&self) -> f32 {
        let size = self.max - self.min;
        size.x.max(size.y).max(size.z)
    }

    /// Slab test. Returns the entry distance along `dir`, or 0 when the
    /// origin is inside the box.
    pub fn intersect_ray(&self, origin: Vec3, dir: Vec3) -> Option<f32> {
        let inv = Vec3::new(
            if dir.x != 0.0 { 1.0 / dir.x } else { f32::INFINITY },
            if dir.y != 0.0 { 1.0 / dir.y } else { f32::INFINITY },
            if dir.z != 0.0 { 1.0 / dir.z } else { f32::INFINITY },
        );
        let t1 = (self.min - origin) * inv;
        let t2 = (self.max - origin) * inv;
        let tmin = t1.min(t2).max_element();
        let tmax = t1.max(t2).min_element();
        if tmax >= tmin && tmax >= 0.0 {
            Some(tmin.max(0.0))
        } else {
            None
        }
    }

    /// Axis-aligned bounds of this box after `matrix` is applied.
    pub fn transformed(&self, matrix: Mat4) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            let p = matrix.transform_point3(corner);
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }
}

/// What a node draws.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    /// Decoded model geometry, identified by the loader's asset key.
    Model { asset_key: u64 },
    /// Stand-in shown when a model failed to load.
    Placeholder,
    /// Camera/light/gizmo helper shapes.
    Helper,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeGeometry {
    pub kind: GeometryKind,
    /// Bounds in the geometry's own space, before `fit` is applied.
    pub bounds: Aabb,
    /// Geometry-space adjustment applied beneath the node transform
    /// (model normalization). Identity for helpers.
    pub fit: Mat4,
}

impl NodeGeometry {
    pub fn helper(bounds: Aabb) -> Self {
        Self {
            kind: GeometryKind::Helper,
            bounds,
            fit: Mat4::IDENTITY,
        }
    }

    /// Bounds in node-local space.
    pub fn local_bounds(&self) -> Aabb {
        self.bounds.transformed(self.fit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub handle: RenderHandle,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    pub eye: Vec3,
    pub target: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("unknown render node {0}")]
    UnknownNode(RenderHandle),
    #[error("attaching {node} under {parent} would create a cycle")]
    AttachCycle {
        node: RenderHandle,
        parent: RenderHandle,
    },
}

/// The retained-mode renderer as seen by the editor core.
///
/// Only the scene bridge, entities and the helper paths that go through the
/// bridge call the attach/detach half of this trait.
pub trait RenderEngine {
    fn create_node(&mut self) -> RenderHandle;
    /// Destroys a node and detaches its children (they stay alive, unattached).
    fn destroy_node(&mut self, node: RenderHandle);
    /// Attaches `node` under `parent`, moving it if it is already attached.
    fn attach(&mut self, node: RenderHandle, parent: AttachPoint) -> Result<(), RenderError>;
    fn detach(&mut self, node: RenderHandle);
    fn set_transform(&mut self, node: RenderHandle, matrix: Mat4);
    fn transform(&self, node: RenderHandle) -> Option<Mat4>;
    fn set_geometry(&mut self, node: RenderHandle, geometry: Option<NodeGeometry>);
    fn geometry(&self, node: RenderHandle) -> Option<NodeGeometry>;
    /// True when `node` can be reached from the live scene.
    fn is_reachable(&self, node: RenderHandle) -> bool;
    /// Nearest reachable node with geometry hit by the ray.
    fn raycast(&self, origin: Vec3, dir: Vec3) -> Option<RayHit>;
    fn set_camera(&mut self, pose: &CameraPose);
    /// Draws the live scene. Returns the number of nodes with geometry drawn.
    fn render(&mut self) -> usize;
}
