//! Selection set and the translate gizmo that follows the primary selection.
//!
//! The gizmo's render nodes exist exactly while the selection is non-empty.
//! Every call that changes the selection creates, destroys or relocates
//! them before returning.

use crate::render::camera::CameraRig;
use crate::render::engine::{Aabb, NodeGeometry, RenderEngine, RenderHandle};
use crate::scene::{EntityId, SceneError, SceneGraphBridge, Transform};
use glam::{Mat4, Vec2, Vec3};

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("invalid axis mask {0:#05b}")]
    InvalidAxisMask(u8),
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Which world axes a gizmo drag may move along.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisMask(u8);

impl AxisMask {
    pub const X: Self = Self(0b001);
    pub const Y: Self = Self(0b010);
    pub const Z: Self = Self(0b100);
    pub const XY: Self = Self(0b011);
    pub const XZ: Self = Self(0b101);
    pub const YZ: Self = Self(0b110);
    pub const FREE: Self = Self(0b111);

    pub const ALL: [Self; 7] = [
        Self::X,
        Self::Y,
        Self::Z,
        Self::XY,
        Self::XZ,
        Self::YZ,
        Self::FREE,
    ];

    pub fn from_bits(bits: u8) -> Result<Self, SelectionError> {
        if bits == 0 || bits > 0b111 {
            return Err(SelectionError::InvalidAxisMask(bits));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    /// 1.0 on allowed axes, 0.0 elsewhere.
    pub fn weights(self) -> Vec3 {
        Vec3::new(
            f32::from(self.0 & 0b001),
            f32::from((self.0 >> 1) & 1),
            f32::from((self.0 >> 2) & 1),
        )
    }

    /// The axis direction when exactly one axis is allowed.
    pub fn single_axis(self) -> Option<Vec3> {
        match self {
            Self::X => Some(Vec3::X),
            Self::Y => Some(Vec3::Y),
            Self::Z => Some(Vec3::Z),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self.0 {
            0b001 => "X",
            0b010 => "Y",
            0b100 => "Z",
            0b011 => "XY",
            0b101 => "XZ",
            0b110 => "YZ",
            _ => "XYZ",
        }
    }
}

impl Default for AxisMask {
    fn default() -> Self {
        Self::FREE
    }
}

/// Gizmo size relative to camera distance, so it keeps its screen size.
const GIZMO_SCREEN_FRACTION: f32 = 0.15;

fn handle_bounds(mask: AxisMask) -> Aabb {
    const ARM: f32 = 0.04;
    const PLANE: f32 = 0.12;
    match mask {
        AxisMask::X => Aabb::new(Vec3::new(0.1, -ARM, -ARM), Vec3::new(1.0, ARM, ARM)),
        AxisMask::Y => Aabb::new(Vec3::new(-ARM, 0.1, -ARM), Vec3::new(ARM, 1.0, ARM)),
        AxisMask::Z => Aabb::new(Vec3::new(-ARM, -ARM, 0.1), Vec3::new(ARM, ARM, 1.0)),
        AxisMask::XY => Aabb::from_center_extent(
            Vec3::new(0.3, 0.3, 0.0),
            Vec3::new(PLANE, PLANE, 0.01),
        ),
        AxisMask::XZ => Aabb::from_center_extent(
            Vec3::new(0.3, 0.0, 0.3),
            Vec3::new(PLANE, 0.01, PLANE),
        ),
        AxisMask::YZ => Aabb::from_center_extent(
            Vec3::new(0.0, 0.3, 0.3),
            Vec3::new(0.01, PLANE, PLANE),
        ),
        _ => Aabb::from_center_extent(Vec3::ZERO, Vec3::splat(0.08)),
    }
}

#[derive(Debug)]
struct GizmoHandle {
    node: RenderHandle,
    mask: AxisMask,
    bounds: Aabb,
}

#[derive(Debug)]
struct Gizmo {
    root: RenderHandle,
    handles: Vec<GizmoHandle>,
    world: Mat4,
}

#[derive(Debug, Default)]
pub struct SelectionAndGizmo {
    selected: Vec<EntityId>,
    primary: Option<EntityId>,
    active_axis: AxisMask,
    gizmo: Option<Gizmo>,
}

impl SelectionAndGizmo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> &[EntityId] {
        &self.selected
    }

    pub fn primary(&self) -> Option<EntityId> {
        self.primary
    }

    pub fn is_selected(&self, id: EntityId) -> bool {
        self.selected.contains(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn active_axis(&self) -> AxisMask {
        self.active_axis
    }

    pub fn set_active_axis(&mut self, mask: AxisMask) {
        log::debug!("Gizmo axis -> {}", mask.label());
        self.active_axis = mask;
    }

    pub fn gizmo_root(&self) -> Option<RenderHandle> {
        self.gizmo.as_ref().map(|gizmo| gizmo.root)
    }

    pub fn gizmo_handles(&self) -> Vec<RenderHandle> {
        self.gizmo
            .as_ref()
            .map(|gizmo| gizmo.handles.iter().map(|h| h.node).collect())
            .unwrap_or_default()
    }

    pub fn gizmo_position(&self) -> Option<Vec3> {
        self.gizmo
            .as_ref()
            .map(|gizmo| gizmo.world.transform_point3(Vec3::ZERO))
    }

    /// Axis mask of a gizmo handle node, for raycast hits.
    pub fn axis_for_handle(&self, node: RenderHandle) -> Option<AxisMask> {
        self.gizmo.as_ref().and_then(|gizmo| {
            gizmo
                .handles
                .iter()
                .find(|handle| handle.node == node)
                .map(|handle| handle.mask)
        })
    }

    /// Nearest gizmo handle hit by a world ray.
    pub fn pick_gizmo(&self, origin: Vec3, dir: Vec3) -> Option<AxisMask> {
        let gizmo = self.gizmo.as_ref()?;
        if gizmo.world.determinant().abs() < 1e-12 {
            return None;
        }
        let inverse = gizmo.world.inverse();
        let local_origin = inverse.transform_point3(origin);
        let local_dir = inverse.transform_vector3(dir);
        gizmo
            .handles
            .iter()
            .filter_map(|handle| {
                handle
                    .bounds
                    .intersect_ray(local_origin, local_dir)
                    .map(|t| (handle.mask, t))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(mask, _)| mask)
    }

    /// Replaces the selection with `id`.
    pub fn select<E: RenderEngine>(
        &mut self,
        bridge: &mut SceneGraphBridge<E>,
        rig: &CameraRig,
        id: EntityId,
    ) -> Result<(), SelectionError> {
        if !bridge.contains(id) {
            return Err(SceneError::UnknownEntity(id).into());
        }
        self.selected.clear();
        self.selected.push(id);
        self.primary = Some(id);
        self.sync_gizmo(bridge, rig)
    }

    /// Adds `id` and makes it the primary selection.
    pub fn add_to_selection<E: RenderEngine>(
        &mut self,
        bridge: &mut SceneGraphBridge<E>,
        rig: &CameraRig,
        id: EntityId,
    ) -> Result<(), SelectionError> {
        if !bridge.contains(id) {
            return Err(SceneError::UnknownEntity(id).into());
        }
        if !self.selected.contains(&id) {
            self.selected.push(id);
        }
        self.primary = Some(id);
        self.sync_gizmo(bridge, rig)
    }

    pub fn deselect<E: RenderEngine>(
        &mut self,
        bridge: &mut SceneGraphBridge<E>,
        rig: &CameraRig,
        id: EntityId,
    ) -> Result<(), SelectionError> {
        self.selected.retain(|selected| *selected != id);
        if self.primary == Some(id) {
            self.primary = self.selected.last().copied();
        }
        self.sync_gizmo(bridge, rig)
    }

    pub fn clear<E: RenderEngine>(&mut self, bridge: &mut SceneGraphBridge<E>) {
        self.selected.clear();
        self.primary = None;
        self.destroy_gizmo(bridge);
    }

    /// Drops removed entities from the selection in the same step as the
    /// removal itself.
    pub fn evict<E: RenderEngine>(
        &mut self,
        bridge: &mut SceneGraphBridge<E>,
        rig: &CameraRig,
        removed: &[EntityId],
    ) -> Result<(), SelectionError> {
        if removed.is_empty() {
            return Ok(());
        }
        self.selected.retain(|id| !removed.contains(id));
        if self.primary.map(|p| removed.contains(&p)).unwrap_or(false) {
            self.primary = self.selected.last().copied();
        }
        self.sync_gizmo(bridge, rig)
    }

    /// Creates, destroys or relocates the gizmo to match the selection, the
    /// primary entity's world position and the camera distance.
    pub fn sync_gizmo<E: RenderEngine>(
        &mut self,
        bridge: &mut SceneGraphBridge<E>,
        rig: &CameraRig,
    ) -> Result<(), SelectionError> {
        self.selected.retain(|id| bridge.contains(*id));
        if self.primary.map(|p| !bridge.contains(p)).unwrap_or(true) {
            self.primary = self.selected.last().copied();
        }
        let Some(position) = self.primary.and_then(|id| bridge.world_position(id)) else {
            self.destroy_gizmo(bridge);
            return Ok(());
        };
        if self.gizmo.is_none() {
            self.gizmo = Some(Self::build_gizmo(bridge)?);
        }
        let world = Mat4::from_scale_rotation_translation(
            Vec3::splat(rig.distance() * GIZMO_SCREEN_FRACTION),
            glam::Quat::IDENTITY,
            position,
        );
        if let Some(gizmo) = self.gizmo.as_mut() {
            gizmo.world = world;
            bridge.set_helper_transform(gizmo.root, world);
        }
        Ok(())
    }

    /// Moves the primary selection by a screen-space drag, constrained to
    /// `mask`, then relocates the gizmo. `delta` is in pixels with +y up.
    /// Returns the new parent-relative position, or `None` with nothing
    /// selected.
    pub fn drag_gizmo<E: RenderEngine>(
        &mut self,
        bridge: &mut SceneGraphBridge<E>,
        rig: &CameraRig,
        mask: AxisMask,
        delta: Vec2,
    ) -> Result<Option<Vec3>, SelectionError> {
        let Some(id) = self.primary else {
            return Ok(None);
        };
        let entity = bridge.entity(id).ok_or(SceneError::UnknownEntity(id))?;
        let transform = *entity.transform();
        let parent = entity.parent();

        let world_delta = drag_to_world(rig, mask, delta);
        let local_delta = match parent.and_then(|p| bridge.world_transform(p)) {
            Some(parent_world) if parent_world.determinant().abs() > 1e-12 => {
                parent_world.inverse().transform_vector3(world_delta)
            }
            _ => world_delta,
        };
        let moved = Transform {
            position: transform.position + local_delta,
            ..transform
        };
        bridge.set_transform(id, moved)?;
        self.sync_gizmo(bridge, rig)?;
        Ok(Some(moved.position))
    }

    fn build_gizmo<E: RenderEngine>(
        bridge: &mut SceneGraphBridge<E>,
    ) -> Result<Gizmo, SelectionError> {
        let root = bridge.create_helper_node(None);
        bridge.attach_helper(root, None)?;
        let mut handles = Vec::with_capacity(AxisMask::ALL.len());
        for mask in AxisMask::ALL {
            let bounds = handle_bounds(mask);
            let node = bridge.create_helper_node(Some(NodeGeometry::helper(bounds)));
            bridge.attach_helper(node, Some(root))?;
            handles.push(GizmoHandle { node, mask, bounds });
        }
        log::debug!("Gizmo created at {}", root);
        Ok(Gizmo {
            root,
            handles,
            world: Mat4::IDENTITY,
        })
    }

    fn destroy_gizmo<E: RenderEngine>(&mut self, bridge: &mut SceneGraphBridge<E>) {
        if let Some(gizmo) = self.gizmo.take() {
            for handle in gizmo.handles {
                bridge.destroy_helper(handle.node);
            }
            bridge.destroy_helper(gizmo.root);
            log::debug!("Gizmo destroyed");
        }
    }
}

/// World translation for a screen drag. Single axes follow the drag's
/// component along the axis as it appears on screen; planes and free moves
/// use the camera's right/up basis and drop the disallowed components.
fn drag_to_world(rig: &CameraRig, mask: AxisMask, delta: Vec2) -> Vec3 {
    let scale = rig.world_units_per_pixel();
    let pose = rig.pose();
    if let Some(axis) = mask.single_axis() {
        let on_screen = Vec2::new(axis.dot(pose.right), axis.dot(pose.up));
        let amount = if on_screen.length() > 0.2 {
            delta.dot(on_screen.normalize()) / on_screen.length()
        } else {
            // Axis points at the camera; vertical drag pushes it along.
            delta.y
        };
        return axis * amount * scale;
    }
    (pose.right * delta.x + pose.up * delta.y) * scale * mask.weights()
}
