use crate::render::engine::{Aabb, NodeGeometry, RenderEngine, RenderHandle};
use glam::{EulerRot, Mat4, Quat, Vec3};

/// Stable entity identity. Assigned once, never reused within a scene.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Parent-relative transform. For top-level entities this is also the world transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    /// Euler angles in degrees, applied Z * Y * X.
    pub rotation_deg: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation_deg: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_euler(
            EulerRot::ZYX,
            self.rotation_deg.z.to_radians(),
            self.rotation_deg.y.to_radians(),
            self.rotation_deg.x.to_radians(),
        )
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation(), self.position)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CameraData {
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
    pub active: bool,
}

impl Default for CameraData {
    fn default() -> Self {
        Self {
            fov_deg: 45.0,
            near: 0.05,
            far: 1000.0,
            active: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightKind {
    Directional,
    Point,
    Spot,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LightData {
    pub kind: LightKind,
    pub intensity: f32,
    pub color: [f32; 3],
    pub range: f32,
}

impl Default for LightData {
    fn default() -> Self {
        Self {
            kind: LightKind::Directional,
            intensity: 100_000.0,
            color: [1.0, 1.0, 1.0],
            range: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    #[default]
    Unloaded,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelData {
    pub source: String,
    pub load_state: LoadState,
    /// Generation of the latest load request; completions carrying any other value are stale.
    pub generation: u64,
    pub source_hash: Option<String>,
    /// Bounds after normalization, once loaded (or the placeholder's bounds after a failure).
    pub bounds: Option<Aabb>,
}

impl ModelData {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Camera(CameraData),
    Light(LightData),
    Model(ModelData),
}

impl EntityKind {
    pub fn type_tag(&self) -> &'static str {
        match self {
            EntityKind::Camera(_) => "camera",
            EntityKind::Light(_) => "light",
            EntityKind::Model(_) => "model",
        }
    }

    fn default_name(&self) -> String {
        match self {
            EntityKind::Camera(_) => "Camera".to_string(),
            EntityKind::Light(_) => "Light".to_string(),
            EntityKind::Model(data) => std::path::Path::new(&data.source)
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or("Model")
                .to_string(),
        }
    }

    /// Pickable helper shape for cameras and lights; models get theirs from the loader.
    fn helper_geometry(&self) -> Option<NodeGeometry> {
        match self {
            EntityKind::Camera(_) | EntityKind::Light(_) => Some(NodeGeometry::helper(
                Aabb::from_center_extent(Vec3::ZERO, Vec3::splat(0.15)),
            )),
            EntityKind::Model(_) => None,
        }
    }
}

/// An editable scene object bound to exactly one render node.
///
/// Transform writes go straight through to the node; there is no staging
/// copy that a renderer could observe out of date.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    name: String,
    transform: Transform,
    kind: EntityKind,
    handle: RenderHandle,
    pub(crate) parent: Option<EntityId>,
    pub(crate) children: Vec<EntityId>,
}

impl Entity {
    /// Allocates the render node together with the entity. The node starts
    /// unattached; the scene bridge decides when it becomes visible.
    pub fn create(
        engine: &mut dyn RenderEngine,
        id: EntityId,
        name: Option<String>,
        kind: EntityKind,
        transform: Transform,
    ) -> Self {
        let handle = engine.create_node();
        engine.set_transform(handle, transform.matrix());
        engine.set_geometry(handle, kind.helper_geometry());
        Self {
            id,
            name: name.unwrap_or_else(|| kind.default_name()),
            transform,
            kind,
            handle,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut EntityKind {
        &mut self.kind
    }

    pub fn handle(&self) -> RenderHandle {
        self.handle
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn set_transform(&mut self, engine: &mut dyn RenderEngine, transform: Transform) {
        self.transform = transform;
        engine.set_transform(self.handle, transform.matrix());
    }

    pub fn set_position(&mut self, engine: &mut dyn RenderEngine, position: Vec3) {
        let transform = Transform {
            position,
            ..self.transform
        };
        self.set_transform(engine, transform);
    }

    pub(crate) fn destroy(self, engine: &mut dyn RenderEngine) {
        engine.detach(self.handle);
        engine.destroy_node(self.handle);
    }

    /// A second value pointing at this entity's node, for exercising the
    /// bridge's one-node-per-entity checks.
    #[cfg(test)]
    pub(crate) fn sharing_node(&self, id: EntityId) -> Self {
        Self {
            id,
            name: self.name.clone(),
            transform: self.transform,
            kind: self.kind.clone(),
            handle: self.handle,
            parent: None,
            children: Vec::new(),
        }
    }
}
