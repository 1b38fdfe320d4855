pub mod entity;
pub mod serialization;

pub use entity::{
    CameraData, Entity, EntityId, EntityKind, LightData, LightKind, LoadState, ModelData,
    Transform,
};

use crate::render::engine::{
    Aabb, AttachPoint, CameraPose, NodeGeometry, RayHit, RenderEngine, RenderError, RenderHandle,
};
use glam::{Mat4, Vec3};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("entity id {0} already exists in the scene")]
    DuplicateEntityId(EntityId),
    #[error("scene graph is not connected to the live render scene")]
    SceneGraphNotConnected,
    #[error("no entity with id {0}")]
    UnknownEntity(EntityId),
    #[error("{parent:?} cannot become the parent of {child}")]
    InvalidParent {
        child: EntityId,
        parent: Option<EntityId>,
    },
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Change notifications for whoever mirrors the scene (outliner, inspector).
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    Connected,
    EntityAdded(EntityId),
    EntityRemoved(EntityId),
    TransformChanged(EntityId),
    Renamed(EntityId),
    Reparented(EntityId),
    LoadStateChanged(EntityId, LoadState),
}

/// Owns the entities of one open scene and the connection between their
/// render nodes and the engine's live scene.
///
/// Lifecycle is two-phase: entities can be added before [`connect`] runs,
/// but none of them is visible until it does. `connect` attaches the
/// aggregate root and then every node that was added in the meantime.
///
/// [`connect`]: SceneGraphBridge::connect
pub struct SceneGraphBridge<E: RenderEngine> {
    engine: E,
    root: RenderHandle,
    connected: bool,
    entities: HashMap<EntityId, Entity>,
    order: Vec<EntityId>,
    by_handle: HashMap<RenderHandle, EntityId>,
    // helper node -> helper parent (None = under the aggregate root)
    helpers: HashMap<RenderHandle, Option<RenderHandle>>,
    next_id: u64,
    // Shared by all models and never reset, so completions from an earlier
    // session can't match a restored entity that reuses an id.
    load_generation: u64,
    events: Vec<SceneEvent>,
}

impl<E: RenderEngine> SceneGraphBridge<E> {
    pub fn new(mut engine: E) -> Self {
        let root = engine.create_node();
        Self {
            engine,
            root,
            connected: false,
            entities: HashMap::new(),
            order: Vec::new(),
            by_handle: HashMap::new(),
            helpers: HashMap::new(),
            next_id: 1,
            load_generation: 0,
            events: Vec::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn root_handle(&self) -> RenderHandle {
        self.root
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn ensure_connected(&self) -> Result<(), SceneError> {
        if self.connected {
            Ok(())
        } else {
            Err(SceneError::SceneGraphNotConnected)
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entities in insertion (UI) order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> + '_ {
        self.order.iter().filter_map(|id| self.entities.get(id))
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.order
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn find_entity_by_handle(&self, handle: RenderHandle) -> Option<&Entity> {
        self.by_handle
            .get(&handle)
            .and_then(|id| self.entities.get(id))
    }

    pub fn take_events(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn allocate_id(&mut self) -> EntityId {
        while self.entities.contains_key(&EntityId(self.next_id)) {
            self.next_id += 1;
        }
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Allocates a fresh id and its render node together. The entity is not
    /// part of the scene until passed to [`add_entity`](Self::add_entity).
    pub fn build_entity(
        &mut self,
        kind: EntityKind,
        name: Option<String>,
        transform: Transform,
    ) -> Entity {
        let id = self.allocate_id();
        Entity::create(&mut self.engine, id, name, kind, transform)
    }

    /// Same as [`build_entity`](Self::build_entity) under a caller-chosen id (scene restore).
    pub fn build_entity_with_id(
        &mut self,
        id: EntityId,
        kind: EntityKind,
        name: Option<String>,
        transform: Transform,
    ) -> Entity {
        Entity::create(&mut self.engine, id, name, kind, transform)
    }

    pub fn create_entity(
        &mut self,
        kind: EntityKind,
        name: Option<String>,
        transform: Transform,
    ) -> Result<EntityId, SceneError> {
        let entity = self.build_entity(kind, name, transform);
        self.add_entity(entity)
    }

    /// Appends a top-level entity built by this bridge. Its node is attached
    /// right away when the bridge is connected, otherwise on
    /// [`connect`](Self::connect). A rejected entity's node is destroyed
    /// unless a live entity owns that node.
    pub fn add_entity(&mut self, mut entity: Entity) -> Result<EntityId, SceneError> {
        let id = entity.id();
        let handle = entity.handle();
        if self.entities.contains_key(&id) || self.by_handle.contains_key(&handle) {
            log::warn!("Rejected entity {}: duplicate id", id);
            if !self.by_handle.contains_key(&handle) {
                entity.destroy(&mut self.engine);
            }
            return Err(SceneError::DuplicateEntityId(id));
        }

        if self.connected {
            if let Err(err) = self.engine.attach(handle, AttachPoint::Node(self.root)) {
                log::warn!("Rejected entity {}: {}", id, err);
                entity.destroy(&mut self.engine);
                return Err(err.into());
            }
        } else {
            log::debug!("Entity {} added before connect; attach deferred", id);
        }
        entity.parent = None;
        entity.children.clear();
        self.next_id = self.next_id.max(id.0 + 1);
        self.by_handle.insert(handle, id);
        self.entities.insert(id, entity);
        self.order.push(id);
        self.events.push(SceneEvent::EntityAdded(id));
        Ok(id)
    }

    /// Removes `id` and its whole subtree. Returns every removed id, children
    /// first; an unknown id removes nothing.
    pub fn remove_entity(&mut self, id: EntityId) -> Vec<EntityId> {
        if !self.entities.contains_key(&id) {
            return Vec::new();
        }
        if let Some(parent) = self.entities.get(&id).and_then(|e| e.parent) {
            if let Some(parent_entity) = self.entities.get_mut(&parent) {
                parent_entity.children.retain(|child| *child != id);
            }
        }

        let mut removed = Vec::new();
        self.collect_subtree(id, &mut removed);
        for &gone in &removed {
            let Some(entity) = self.entities.remove(&gone) else {
                continue;
            };
            self.by_handle.remove(&entity.handle());
            entity.destroy(&mut self.engine);
            self.events.push(SceneEvent::EntityRemoved(gone));
        }
        self.order.retain(|existing| !removed.contains(existing));
        log::debug!("Removed {} entities rooted at {}", removed.len(), id);
        removed
    }

    fn collect_subtree(&self, id: EntityId, out: &mut Vec<EntityId>) {
        if let Some(entity) = self.entities.get(&id) {
            for &child in &entity.children {
                self.collect_subtree(child, out);
            }
            out.push(id);
        }
    }

    /// Removes every entity. Helper nodes are left alone.
    pub fn clear(&mut self) {
        let top_level: Vec<EntityId> = self
            .order
            .iter()
            .copied()
            .filter(|id| self.entities.get(id).map(|e| e.parent.is_none()).unwrap_or(false))
            .collect();
        for id in top_level {
            self.remove_entity(id);
        }
    }

    /// Ends the session: entities and helpers are destroyed and the aggregate
    /// root leaves the live scene, so the next `connect` starts over.
    pub fn reset_session(&mut self) {
        self.clear();
        let helpers: Vec<RenderHandle> = self.helpers.keys().copied().collect();
        for node in helpers {
            self.destroy_helper(node);
        }
        self.engine.detach(self.root);
        self.connected = false;
        log::info!("Scene session reset");
    }

    /// Attaches the aggregate root to the live scene and then every node
    /// that was added while disconnected. Runs once; later calls only warn.
    pub fn connect(&mut self) -> Result<(), SceneError> {
        if self.connected {
            log::warn!("Scene graph already connected; ignoring second connect");
            return Ok(());
        }
        self.engine.attach(self.root, AttachPoint::LiveScene)?;
        for id in &self.order {
            let Some(entity) = self.entities.get(id) else {
                continue;
            };
            let parent = entity
                .parent
                .and_then(|parent| self.entities.get(&parent))
                .map(|parent| parent.handle())
                .unwrap_or(self.root);
            self.engine
                .attach(entity.handle(), AttachPoint::Node(parent))?;
        }
        for (&node, &parent) in &self.helpers {
            self.engine
                .attach(node, AttachPoint::Node(parent.unwrap_or(self.root)))?;
        }
        self.connected = true;
        self.events.push(SceneEvent::Connected);
        log::info!(
            "Scene graph connected: {} entities, {} helper nodes",
            self.order.len(),
            self.helpers.len()
        );
        Ok(())
    }

    pub fn set_transform(&mut self, id: EntityId, transform: Transform) -> Result<(), SceneError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(SceneError::UnknownEntity(id))?;
        entity.set_transform(&mut self.engine, transform);
        self.events.push(SceneEvent::TransformChanged(id));
        Ok(())
    }

    pub fn rename(&mut self, id: EntityId, name: impl Into<String>) -> Result<(), SceneError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(SceneError::UnknownEntity(id))?;
        entity.set_name(name);
        self.events.push(SceneEvent::Renamed(id));
        Ok(())
    }

    /// Moves `child` under `parent`, or back to the top level for `None`.
    /// The child's transform stays parent-relative.
    pub fn set_parent(
        &mut self,
        child: EntityId,
        parent: Option<EntityId>,
    ) -> Result<(), SceneError> {
        let current = self
            .entities
            .get(&child)
            .ok_or(SceneError::UnknownEntity(child))?
            .parent;
        if current == parent {
            return Ok(());
        }
        if let Some(parent_id) = parent {
            if !self.entities.contains_key(&parent_id) {
                return Err(SceneError::UnknownEntity(parent_id));
            }
            if parent_id == child || self.is_descendant(parent_id, child) {
                return Err(SceneError::InvalidParent { child, parent });
            }
        }

        if let Some(old) = current.and_then(|old| self.entities.get_mut(&old)) {
            old.children.retain(|c| *c != child);
        }
        let parent_handle = match parent.and_then(|p| self.entities.get_mut(&p)) {
            Some(new_parent) => {
                new_parent.children.push(child);
                new_parent.handle()
            }
            None => self.root,
        };
        let handle = match self.entities.get_mut(&child) {
            Some(entity) => {
                entity.parent = parent;
                entity.handle()
            }
            None => return Err(SceneError::UnknownEntity(child)),
        };
        if self.connected {
            self.engine
                .attach(handle, AttachPoint::Node(parent_handle))?;
        }
        self.events.push(SceneEvent::Reparented(child));
        Ok(())
    }

    pub fn add_child(&mut self, parent: EntityId, child: EntityId) -> Result<(), SceneError> {
        self.set_parent(child, Some(parent))
    }

    /// Detaches `child` from `parent` and returns it to the top level.
    pub fn remove_child(&mut self, parent: EntityId, child: EntityId) -> Result<(), SceneError> {
        let entity = self
            .entities
            .get(&child)
            .ok_or(SceneError::UnknownEntity(child))?;
        if entity.parent != Some(parent) {
            return Err(SceneError::InvalidParent {
                child,
                parent: Some(parent),
            });
        }
        self.set_parent(child, None)
    }

    /// True when `node` sits somewhere below `ancestor`.
    pub fn is_descendant(&self, node: EntityId, ancestor: EntityId) -> bool {
        let mut current = self.entities.get(&node).and_then(|e| e.parent);
        let mut guard = self.entities.len();
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            if guard == 0 {
                return false;
            }
            guard -= 1;
            current = self.entities.get(&id).and_then(|e| e.parent);
        }
        false
    }

    pub fn world_transform(&self, id: EntityId) -> Option<Mat4> {
        let entity = self.entities.get(&id)?;
        let mut matrix = entity.transform().matrix();
        let mut current = entity.parent;
        let mut guard = self.entities.len();
        while let Some(parent_id) = current {
            let parent = self.entities.get(&parent_id)?;
            matrix = parent.transform().matrix() * matrix;
            current = parent.parent;
            guard = guard.checked_sub(1)?;
        }
        Some(matrix)
    }

    pub fn world_position(&self, id: EntityId) -> Option<Vec3> {
        self.world_transform(id)
            .map(|matrix| matrix.transform_point3(Vec3::ZERO))
    }

    /// World-space bounds of the entity's geometry, if it has any.
    pub fn world_bounds(&self, id: EntityId) -> Option<Aabb> {
        let entity = self.entities.get(&id)?;
        let geometry = self.engine.geometry(entity.handle())?;
        let world = self.world_transform(id)?;
        Some(geometry.local_bounds().transformed(world))
    }

    /// Marks `id` as the only active camera and returns its lens data.
    pub fn set_active_camera(&mut self, id: EntityId) -> Result<CameraData, SceneError> {
        if !matches!(
            self.entities.get(&id).map(|e| e.kind()),
            Some(EntityKind::Camera(_))
        ) {
            return Err(SceneError::UnknownEntity(id));
        }
        let mut selected = None;
        for entity in self.entities.values_mut() {
            let entity_id = entity.id();
            if let EntityKind::Camera(data) = entity.kind_mut() {
                data.active = entity_id == id;
                if data.active {
                    selected = Some(*data);
                }
            }
        }
        selected.ok_or(SceneError::UnknownEntity(id))
    }

    pub fn active_camera(&self) -> Option<(EntityId, CameraData)> {
        self.entities().find_map(|entity| match entity.kind() {
            EntityKind::Camera(data) if data.active => Some((entity.id(), *data)),
            _ => None,
        })
    }

    /// Flips a model to `Loading` and gives it a fresh generation. Returns the source
    /// and the generation the eventual completion must carry.
    pub fn begin_model_load(&mut self, id: EntityId) -> Result<(String, u64), SceneError> {
        let entity = self
            .entities
            .get_mut(&id)
            .ok_or(SceneError::UnknownEntity(id))?;
        let EntityKind::Model(model) = entity.kind_mut() else {
            return Err(SceneError::UnknownEntity(id));
        };
        self.load_generation += 1;
        model.generation = self.load_generation;
        model.load_state = LoadState::Loading;
        let ticket = (model.source.clone(), model.generation);
        self.events
            .push(SceneEvent::LoadStateChanged(id, LoadState::Loading));
        Ok(ticket)
    }

    /// True when a completion for `(id, generation)` is still wanted.
    pub fn is_current_load(&self, id: EntityId, generation: u64) -> bool {
        matches!(
            self.entities.get(&id).map(|e| e.kind()),
            Some(EntityKind::Model(model))
                if model.generation == generation && model.load_state == LoadState::Loading
        )
    }

    /// Applies a finished load: the geometry goes onto the entity's own node
    /// and the model flips to `state`. Stale completions are ignored.
    pub fn finish_model_load(
        &mut self,
        id: EntityId,
        generation: u64,
        geometry: NodeGeometry,
        state: LoadState,
        source_hash: Option<String>,
    ) -> bool {
        if !self.is_current_load(id, generation) {
            log::debug!(
                "Discarding stale load completion for {} (generation {})",
                id,
                generation
            );
            return false;
        }
        let Some(entity) = self.entities.get_mut(&id) else {
            return false;
        };
        let handle = entity.handle();
        if let EntityKind::Model(model) = entity.kind_mut() {
            model.load_state = state;
            model.bounds = Some(geometry.local_bounds());
            if source_hash.is_some() {
                model.source_hash = source_hash;
            }
        }
        self.engine.set_geometry(handle, Some(geometry));
        self.events.push(SceneEvent::LoadStateChanged(id, state));
        true
    }

    /// Creates an unattached helper node (gizmo parts and the like).
    pub fn create_helper_node(&mut self, geometry: Option<NodeGeometry>) -> RenderHandle {
        let node = self.engine.create_node();
        self.engine.set_geometry(node, geometry);
        node
    }

    /// Attaches a helper under another helper, or under the aggregate root
    /// for `None`. Deferred until connect like entity nodes.
    pub fn attach_helper(
        &mut self,
        node: RenderHandle,
        parent: Option<RenderHandle>,
    ) -> Result<(), SceneError> {
        self.helpers.insert(node, parent);
        if self.connected {
            self.engine
                .attach(node, AttachPoint::Node(parent.unwrap_or(self.root)))?;
        }
        Ok(())
    }

    pub fn set_helper_transform(&mut self, node: RenderHandle, matrix: Mat4) {
        if self.helpers.contains_key(&node) {
            self.engine.set_transform(node, matrix);
        }
    }

    pub fn destroy_helper(&mut self, node: RenderHandle) {
        self.helpers.remove(&node);
        self.engine.detach(node);
        self.engine.destroy_node(node);
    }

    /// Pick against the live scene.
    pub fn raycast(&self, origin: Vec3, dir: Vec3) -> Result<Option<RayHit>, SceneError> {
        self.ensure_connected()?;
        Ok(self.engine.raycast(origin, dir))
    }

    pub fn set_camera(&mut self, pose: &CameraPose) {
        self.engine.set_camera(pose);
    }

    pub fn render(&mut self) -> usize {
        self.engine.render()
    }
}
