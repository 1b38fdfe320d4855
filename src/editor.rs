//! Per-scene editor context.
//!
//! One `EditorContext` exists per open scene and owns every piece of
//! editor state. Hosts feed it gestures and commands and call [`tick`]
//! once per scheduling quantum; nothing else mutates the scene.
//!
//! [`tick`]: EditorContext::tick

use crate::app::schedule::{scheduler_for, DeferredQueue, Scheduler};
use crate::assets::{AssetPipeline, ApplyReport};
use crate::config::{ConfigError, EditorConfig};
use crate::render::camera::{CameraRig, InteractionMode};
use crate::render::engine::{Aabb, RenderEngine};
use crate::render::overlay::{OverlayBackend, OverlayError, OverlaySyncLayer};
use crate::scene::serialization::{self, RestoreReport, SerializationError};
use crate::scene::{
    CameraData, EntityId, EntityKind, LightData, LightKind, ModelData, SceneError,
    SceneGraphBridge, Transform,
};
use crate::selection::{AxisMask, SelectionAndGizmo, SelectionError};
use glam::{Vec2, Vec3};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error(transparent)]
    Scene(#[from] SceneError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Overlay(#[from] OverlayError),
}

/// Normalized input from the platform layer. Drag deltas are in pixels
/// with +y pointing up; points are window pixels from the top-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Gesture {
    /// `pan` is the secondary drag (right button / two fingers).
    Drag { delta: Vec2, pan: bool },
    /// Positive values zoom in.
    Scroll(f32),
    /// Above 1 zooms in.
    Pinch(f32),
    Tap(Vec2),
    LongPress(Vec2),
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditorCommand {
    AddCamera,
    AddLight(LightKind),
    AddModel { source: String },
    RemoveEntity(EntityId),
    RemoveSelected,
    Select(EntityId),
    AddToSelection(EntityId),
    ClearSelection,
    ToggleMode,
    SetAxis(AxisMask),
    Rename(EntityId, String),
    SetTransform(EntityId, Transform),
    SetParent {
        child: EntityId,
        parent: Option<EntityId>,
    },
    SetActiveCamera(EntityId),
    ReloadModel(EntityId),
    FrameSelection,
    ResizeViewport { width: u32, height: u32 },
    Gesture(Gesture),
    SaveScene(PathBuf),
    LoadScene(PathBuf),
}

/// What a tap landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    Gizmo(AxisMask),
    Entity(EntityId),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub deferred_applied: usize,
    pub assets: ApplyReport,
    pub drew: bool,
    pub nodes_drawn: usize,
}

pub struct EditorContext<E: RenderEngine> {
    config: EditorConfig,
    bridge: SceneGraphBridge<E>,
    rig: CameraRig,
    selection: SelectionAndGizmo,
    overlay: OverlaySyncLayer,
    scheduler: Box<dyn Scheduler>,
    assets: AssetPipeline,
    deferred: DeferredQueue<EditorCommand>,
}

impl<E: RenderEngine> EditorContext<E> {
    pub fn new(engine: E, config: EditorConfig, assets: AssetPipeline) -> Self {
        let scheduler = scheduler_for(&config.schedule);
        Self::with_scheduler(engine, config, assets, scheduler)
    }

    pub fn with_scheduler(
        engine: E,
        config: EditorConfig,
        assets: AssetPipeline,
        scheduler: Box<dyn Scheduler>,
    ) -> Self {
        Self {
            rig: CameraRig::new(&config.camera),
            bridge: SceneGraphBridge::new(engine),
            selection: SelectionAndGizmo::new(),
            overlay: OverlaySyncLayer::default(),
            scheduler,
            assets,
            deferred: DeferredQueue::new(),
            config,
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn bridge(&self) -> &SceneGraphBridge<E> {
        &self.bridge
    }

    /// Entity edits that bypass the command path (inspector panels).
    pub fn bridge_mut(&mut self) -> &mut SceneGraphBridge<E> {
        self.scheduler.mark_dirty();
        &mut self.bridge
    }

    pub fn rig(&self) -> &CameraRig {
        &self.rig
    }

    pub fn selection(&self) -> &SelectionAndGizmo {
        &self.selection
    }

    pub fn overlay(&self) -> &OverlaySyncLayer {
        &self.overlay
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        self.scheduler.as_ref()
    }

    pub fn mode(&self) -> InteractionMode {
        self.rig.mode()
    }

    pub fn pending_deferred(&self) -> usize {
        self.deferred.len()
    }

    pub fn connect(&mut self) -> Result<(), EditorError> {
        self.bridge.connect()?;
        self.scheduler.mark_dirty();
        Ok(())
    }

    /// Queues a command for the start of the next quantum.
    pub fn defer(&mut self, command: EditorCommand) {
        self.deferred.push(command);
    }

    pub fn apply(&mut self, command: EditorCommand) -> Result<(), EditorError> {
        log::trace!("Applying {:?}", command);
        match command {
            EditorCommand::AddCamera => {
                self.add_camera()?;
            }
            EditorCommand::AddLight(kind) => {
                self.add_light(kind)?;
            }
            EditorCommand::AddModel { source } => {
                self.add_model(source)?;
            }
            EditorCommand::RemoveEntity(id) => {
                self.remove_entity(id)?;
            }
            EditorCommand::RemoveSelected => {
                for id in self.selection.selected().to_vec() {
                    self.remove_entity(id)?;
                }
            }
            EditorCommand::Select(id) => {
                self.selection.select(&mut self.bridge, &self.rig, id)?;
            }
            EditorCommand::AddToSelection(id) => {
                self.selection
                    .add_to_selection(&mut self.bridge, &self.rig, id)?;
            }
            EditorCommand::ClearSelection => self.selection.clear(&mut self.bridge),
            EditorCommand::ToggleMode => {
                self.rig.toggle_mode();
            }
            EditorCommand::SetAxis(mask) => self.selection.set_active_axis(mask),
            EditorCommand::Rename(id, name) => self.bridge.rename(id, name)?,
            EditorCommand::SetTransform(id, transform) => {
                self.bridge.set_transform(id, transform)?;
                self.selection.sync_gizmo(&mut self.bridge, &self.rig)?;
            }
            EditorCommand::SetParent { child, parent } => {
                self.bridge.set_parent(child, parent)?;
                self.selection.sync_gizmo(&mut self.bridge, &self.rig)?;
            }
            EditorCommand::SetActiveCamera(id) => {
                self.set_active_camera(id)?;
            }
            EditorCommand::ReloadModel(id) => {
                self.assets.request_load(&mut self.bridge, id)?;
            }
            EditorCommand::FrameSelection => {
                self.frame_selection()?;
            }
            EditorCommand::ResizeViewport { width, height } => {
                self.rig.set_viewport(width, height);
            }
            EditorCommand::Gesture(gesture) => self.handle_gesture(gesture)?,
            EditorCommand::SaveScene(path) => self.save_scene(&path)?,
            EditorCommand::LoadScene(path) => {
                self.load_scene(&path)?;
            }
        }
        self.scheduler.mark_dirty();
        Ok(())
    }

    /// Routes a gesture by interaction mode. Drags move the camera in
    /// Environment mode and the gizmo in Entity mode, never both. Taps pick
    /// in either mode.
    pub fn handle_gesture(&mut self, gesture: Gesture) -> Result<(), EditorError> {
        match (self.rig.mode(), gesture) {
            (_, Gesture::Tap(point)) => match self.pick(point)? {
                Some(Pick::Gizmo(mask)) => self.selection.set_active_axis(mask),
                Some(Pick::Entity(id)) => {
                    self.selection.select(&mut self.bridge, &self.rig, id)?
                }
                None => self.selection.clear(&mut self.bridge),
            },
            (_, Gesture::LongPress(point)) => {
                if let Some(Pick::Entity(id)) = self.pick(point)? {
                    self.selection
                        .add_to_selection(&mut self.bridge, &self.rig, id)?;
                }
            }
            (InteractionMode::Environment, Gesture::Drag { delta, pan: false }) => {
                self.rig.orbit(-delta.x, delta.y);
                self.selection.sync_gizmo(&mut self.bridge, &self.rig)?;
            }
            (InteractionMode::Environment, Gesture::Drag { delta, pan: true }) => {
                self.rig.pan(-delta.x, -delta.y);
            }
            (InteractionMode::Environment, Gesture::Scroll(amount)) => {
                self.rig.zoom(amount);
                self.selection.sync_gizmo(&mut self.bridge, &self.rig)?;
            }
            (InteractionMode::Environment, Gesture::Pinch(factor)) => {
                self.rig.zoom_by_factor(factor);
                self.selection.sync_gizmo(&mut self.bridge, &self.rig)?;
            }
            (InteractionMode::Entity, Gesture::Drag { delta, .. }) => {
                let mask = self.selection.active_axis();
                self.selection
                    .drag_gizmo(&mut self.bridge, &self.rig, mask, delta)?;
            }
            (InteractionMode::Entity, Gesture::Scroll(_) | Gesture::Pinch(_)) => {
                log::trace!("Zoom ignored in entity mode");
            }
        }
        self.scheduler.mark_dirty();
        Ok(())
    }

    /// Hit test from a window pixel. Gizmo handles win over entities.
    pub fn pick(&self, point: Vec2) -> Result<Option<Pick>, EditorError> {
        self.bridge.ensure_connected()?;
        let (width, height) = self.rig.viewport();
        let (origin, dir) = self.rig.screen_ray(point.x, point.y, width, height);
        if let Some(mask) = self.selection.pick_gizmo(origin, dir) {
            return Ok(Some(Pick::Gizmo(mask)));
        }
        let Some(hit) = self.bridge.raycast(origin, dir)? else {
            return Ok(None);
        };
        if let Some(mask) = self.selection.axis_for_handle(hit.handle) {
            return Ok(Some(Pick::Gizmo(mask)));
        }
        Ok(self
            .bridge
            .find_entity_by_handle(hit.handle)
            .map(|entity| Pick::Entity(entity.id())))
    }

    pub fn add_camera(&mut self) -> Result<EntityId, EditorError> {
        let transform = Transform::from_position(self.rig.eye());
        let id = self.bridge.create_entity(
            EntityKind::Camera(CameraData {
                fov_deg: self.rig.lens().fov_deg,
                near: self.rig.lens().near,
                far: self.rig.lens().far,
                active: false,
            }),
            None,
            transform,
        )?;
        self.scheduler.mark_dirty();
        Ok(id)
    }

    pub fn add_light(&mut self, kind: LightKind) -> Result<EntityId, EditorError> {
        let id = self.bridge.create_entity(
            EntityKind::Light(LightData {
                kind,
                ..LightData::default()
            }),
            None,
            Transform::from_position(self.rig.target() + Vec3::new(0.0, 2.0, 0.0)),
        )?;
        self.scheduler.mark_dirty();
        Ok(id)
    }

    /// Adds a model at the camera target and starts loading it.
    pub fn add_model(&mut self, source: impl Into<String>) -> Result<EntityId, EditorError> {
        let id = self.bridge.create_entity(
            EntityKind::Model(ModelData::new(source)),
            None,
            Transform::from_position(self.rig.target()),
        )?;
        self.assets.request_load(&mut self.bridge, id)?;
        self.scheduler.mark_dirty();
        Ok(id)
    }

    /// Removes `id` with its subtree and evicts all of it from the
    /// selection before returning.
    pub fn remove_entity(&mut self, id: EntityId) -> Result<Vec<EntityId>, EditorError> {
        let removed = self.bridge.remove_entity(id);
        self.selection
            .evict(&mut self.bridge, &self.rig, &removed)?;
        self.scheduler.mark_dirty();
        Ok(removed)
    }

    /// Makes `id` the active camera and gives the rig its lens, so the
    /// retained scene and the overlay project the same way.
    pub fn set_active_camera(&mut self, id: EntityId) -> Result<CameraData, EditorError> {
        let data = self.bridge.set_active_camera(id)?;
        self.rig.set_lens(data.into());
        self.scheduler.mark_dirty();
        Ok(data)
    }

    /// Retargets the rig on the primary selection. Returns false with
    /// nothing selected.
    pub fn frame_selection(&mut self) -> Result<bool, EditorError> {
        let Some(id) = self.selection.primary() else {
            return Ok(false);
        };
        let bounds = match self.bridge.world_bounds(id) {
            Some(bounds) => bounds,
            None => match self.bridge.world_position(id) {
                Some(position) => Aabb::from_center_extent(position, Vec3::splat(0.5)),
                None => return Ok(false),
            },
        };
        self.rig.frame_bounds(&bounds);
        self.selection.sync_gizmo(&mut self.bridge, &self.rig)?;
        self.scheduler.mark_dirty();
        Ok(true)
    }

    pub fn save_scene(&self, path: &Path) -> Result<(), EditorError> {
        let records = serialization::snapshot(&self.bridge);
        serialization::save_scene_to_file(&records, path)?;
        log::info!("Saved {} entities to {}", records.len(), path.display());
        Ok(())
    }

    /// Replaces the open scene with the file's contents. The file is parsed
    /// before anything is torn down, so a broken file leaves the scene alone.
    pub fn load_scene(&mut self, path: &Path) -> Result<RestoreReport, EditorError> {
        let load = serialization::load_scene_from_file(path)?;
        self.selection.clear(&mut self.bridge);
        self.bridge.reset_session();
        let report = serialization::restore(&mut self.bridge, load);
        for skipped in &report.skipped {
            log::warn!(
                "Skipped entity record {} ({:?}): {}",
                skipped.index,
                skipped.id,
                skipped.reason
            );
        }
        let models: Vec<EntityId> = self
            .bridge
            .entities()
            .filter(|entity| matches!(entity.kind(), EntityKind::Model(_)))
            .map(|entity| entity.id())
            .collect();
        for id in models {
            self.assets.request_load(&mut self.bridge, id)?;
        }
        if let Some((_, camera)) = self.bridge.active_camera() {
            self.rig.set_lens(camera.into());
        }
        self.scheduler.mark_dirty();
        log::info!("Loaded scene from {}", path.display());
        Ok(report)
    }

    /// One scheduling quantum: deferred commands from the previous draw,
    /// then finished asset loads, then (if the scheduler says so) a draw of
    /// both renderers against the same state.
    pub fn tick(
        &mut self,
        now: Instant,
        overlay_backend: &mut dyn OverlayBackend<EditorCommand>,
    ) -> TickReport {
        let mut report = TickReport::default();
        for command in self.deferred.drain() {
            report.deferred_applied += 1;
            if let Err(err) = self.apply(command) {
                log::warn!("Deferred command failed: {}", err);
            }
        }

        report.assets = self.assets.apply_completions(&mut self.bridge);
        if report.assets.loaded + report.assets.failed > 0 {
            self.scheduler.mark_dirty();
        }

        if self.scheduler.should_draw(now) {
            if let Err(err) = self.selection.sync_gizmo(&mut self.bridge, &self.rig) {
                log::warn!("Gizmo sync failed: {}", err);
            }
            self.bridge.set_camera(self.rig.pose());
            report.nodes_drawn = self.bridge.render();
            self.overlay
                .draw(&self.rig, overlay_backend, &mut self.deferred);
            self.scheduler.did_draw(now);
            report.drew = true;
        }
        report
    }

    /// When the host should run the next quantum without new input.
    pub fn next_wake(&self, now: Instant) -> Option<Instant> {
        if !self.deferred.is_empty() {
            return Some(now);
        }
        let scheduled = self.scheduler.next_wake(now);
        if self.assets.in_flight() > 0 {
            let poll = now + Duration::from_millis(16);
            return Some(scheduled.map_or(poll, |at| at.min(poll)));
        }
        scheduled
    }

    /// Short description for window titles and logs.
    pub fn status_line(&self) -> String {
        let selection = match self.selection.primary() {
            Some(id) => format!(
                "{} selected ({} axis {})",
                self.selection.selected().len(),
                id,
                self.selection.active_axis().label()
            ),
            None => "nothing selected".to_string(),
        };
        format!(
            "{} mode | {} | {} entities | {}",
            self.rig.mode().label(),
            self.rig.describe(),
            self.bridge.len(),
            selection
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{EditorCommand, EditorContext, EditorError, Gesture, Pick};
    use crate::app::schedule::{DeferredQueue, DirtyFlagScheduler, FixedRateScheduler};
    use crate::assets::{AssetPipeline, ObjBoundsLoader};
    use crate::config::EditorConfig;
    use crate::render::camera::InteractionMode;
    use crate::render::engine::RenderEngine;
    use crate::render::overlay::{CpuOverlay, OverlayBackend, OverlayFrame};
    use crate::render::retained::RetainedScene;
    use crate::scene::{EntityId, EntityKind, LightKind, SceneError, Transform};
    use crate::selection::AxisMask;
    use glam::{Vec2, Vec3};
    use std::sync::Arc;
    use std::time::Instant;

    fn editor() -> EditorContext<RetainedScene> {
        let config = EditorConfig::default();
        let assets = AssetPipeline::inline(Arc::new(ObjBoundsLoader::new()), config.assets);
        let mut editor = EditorContext::with_scheduler(
            RetainedScene::new(),
            config,
            assets,
            Box::new(DirtyFlagScheduler::new()),
        );
        editor.apply(EditorCommand::ResizeViewport {
            width: 800,
            height: 600,
        })
        .unwrap();
        editor
    }

    /// Backend that asks for a mode toggle from inside its draw.
    struct Reentrant {
        draws: usize,
    }

    impl OverlayBackend<EditorCommand> for Reentrant {
        fn draw(&mut self, _frame: &OverlayFrame, deferred: &mut DeferredQueue<EditorCommand>) {
            self.draws += 1;
            deferred.push(EditorCommand::ToggleMode);
        }
    }

    #[test]
    fn drag_in_environment_mode_never_moves_entities() {
        let mut editor = editor();
        editor.connect().unwrap();
        let id = editor.add_light(LightKind::Point).unwrap();
        editor.apply(EditorCommand::Select(id)).unwrap();
        let before = *editor.bridge().entity(id).unwrap().transform();
        let eye = editor.rig().eye();

        editor
            .handle_gesture(Gesture::Drag {
                delta: Vec2::new(40.0, 10.0),
                pan: false,
            })
            .unwrap();
        assert_eq!(*editor.bridge().entity(id).unwrap().transform(), before);
        assert_ne!(editor.rig().eye(), eye);
    }

    #[test]
    fn drag_in_entity_mode_never_moves_camera() {
        let mut editor = editor();
        editor.connect().unwrap();
        let id = editor.add_light(LightKind::Point).unwrap();
        editor.apply(EditorCommand::Select(id)).unwrap();
        editor.apply(EditorCommand::ToggleMode).unwrap();
        editor.apply(EditorCommand::SetAxis(AxisMask::Y)).unwrap();
        let eye = editor.rig().eye();
        let before = editor.bridge().world_position(id).unwrap();

        editor
            .handle_gesture(Gesture::Drag {
                delta: Vec2::new(5.0, 5.0),
                pan: false,
            })
            .unwrap();
        editor.handle_gesture(Gesture::Scroll(3.0)).unwrap();
        assert_eq!(editor.rig().eye(), eye);
        let after = editor.bridge().world_position(id).unwrap();
        assert_eq!(after.x, before.x);
        assert_eq!(after.z, before.z);
        assert!(after.y > before.y);
    }

    #[test]
    fn tap_selects_entity_and_empty_tap_clears() {
        let mut editor = editor();
        editor.connect().unwrap();
        let id = editor
            .bridge_mut()
            .create_entity(
                EntityKind::Light(Default::default()),
                None,
                Transform::IDENTITY,
            )
            .unwrap();
        // The rig looks at the origin, so the window center hits the light.
        editor
            .handle_gesture(Gesture::Tap(Vec2::new(400.0, 300.0)))
            .unwrap();
        assert_eq!(editor.selection().primary(), Some(id));

        editor.handle_gesture(Gesture::Tap(Vec2::new(2.0, 2.0))).unwrap();
        assert!(editor.selection().is_empty());
        assert!(editor.selection().gizmo_root().is_none());
    }

    #[test]
    fn picking_before_connect_is_reported() {
        let editor = editor();
        assert!(matches!(
            editor.pick(Vec2::new(10.0, 10.0)),
            Err(EditorError::Scene(SceneError::SceneGraphNotConnected))
        ));
    }

    #[test]
    fn tap_on_gizmo_handle_sets_axis() {
        let mut editor = editor();
        editor.connect().unwrap();
        let id = editor.add_light(LightKind::Point).unwrap();
        editor
            .apply(EditorCommand::SetTransform(id, Transform::IDENTITY))
            .unwrap();
        editor.apply(EditorCommand::Select(id)).unwrap();
        // Looking straight at the free-move cube at the target.
        assert_eq!(
            editor.pick(Vec2::new(400.0, 300.0)).unwrap(),
            Some(Pick::Gizmo(AxisMask::FREE))
        );
    }

    #[test]
    fn removing_selected_parent_evicts_whole_subtree() {
        let mut editor = editor();
        editor.connect().unwrap();
        let parent = editor.add_light(LightKind::Point).unwrap();
        let child = editor.add_light(LightKind::Spot).unwrap();
        editor
            .apply(EditorCommand::SetParent {
                child,
                parent: Some(parent),
            })
            .unwrap();
        editor.apply(EditorCommand::Select(parent)).unwrap();
        editor.apply(EditorCommand::AddToSelection(child)).unwrap();

        editor.apply(EditorCommand::RemoveSelected).unwrap();
        assert!(editor.bridge().is_empty());
        assert!(editor.selection().is_empty());
        assert!(editor.selection().gizmo_root().is_none());
    }

    #[test]
    fn commands_from_draw_apply_next_quantum() {
        let mut editor = editor();
        editor.connect().unwrap();
        let mut backend = Reentrant { draws: 0 };
        let now = Instant::now();

        let report = editor.tick(now, &mut backend);
        assert!(report.drew);
        assert_eq!(backend.draws, 1);
        // Still in the original mode: the toggle only got queued.
        assert_eq!(editor.mode(), InteractionMode::Environment);
        assert_eq!(editor.pending_deferred(), 1);
        assert_eq!(editor.next_wake(now), Some(now));

        let report = editor.tick(now, &mut backend);
        assert_eq!(report.deferred_applied, 1);
        assert_eq!(editor.mode(), InteractionMode::Entity);
    }

    #[test]
    fn on_demand_draws_only_when_dirty() {
        let mut editor = editor();
        editor.connect().unwrap();
        let mut cpu = CpuOverlay::new();
        let now = Instant::now();
        assert!(editor.tick(now, &mut cpu).drew);
        assert!(!editor.tick(now, &mut cpu).drew);
        editor.handle_gesture(Gesture::Scroll(1.0)).unwrap();
        assert!(editor.tick(now, &mut cpu).drew);
    }

    #[test]
    fn fixed_rate_draws_without_changes() {
        let config = EditorConfig::default();
        let assets = AssetPipeline::inline(Arc::new(ObjBoundsLoader::new()), config.assets);
        let scheduler = FixedRateScheduler::new(60);
        let step = scheduler.interval();
        let mut editor = EditorContext::with_scheduler(
            RetainedScene::new(),
            config,
            assets,
            Box::new(scheduler),
        );
        editor.connect().unwrap();
        let mut cpu = CpuOverlay::new();
        let start = Instant::now();
        let drawn = (0..5u32)
            .filter(|i| editor.tick(start + step * *i, &mut cpu).drew)
            .count();
        assert_eq!(drawn, 5);
        assert_eq!(editor.overlay().frames_drawn(), 5);
    }

    #[test]
    fn one_draw_sees_camera_entity_and_gizmo_consistently() {
        let mut editor = editor();
        editor.connect().unwrap();
        let id = editor.add_light(LightKind::Point).unwrap();
        editor.apply(EditorCommand::Select(id)).unwrap();
        editor.apply(EditorCommand::ToggleMode).unwrap();
        editor
            .handle_gesture(Gesture::Drag {
                delta: Vec2::new(12.0, -7.0),
                pan: false,
            })
            .unwrap();
        let mut cpu = CpuOverlay::new();
        editor.tick(Instant::now(), &mut cpu);

        let frame = cpu.last_frame().unwrap();
        let engine = editor.bridge().engine();
        assert_eq!(engine.camera().unwrap().eye, frame.eye);
        let entity = editor.bridge().world_position(id).unwrap();
        assert!((editor.selection().gizmo_position().unwrap() - entity).length() < 1e-6);
        let handle = editor.bridge().entity(id).unwrap().handle();
        let on_node = engine.transform(handle).unwrap().transform_point3(Vec3::ZERO);
        assert!((on_node - entity).length() < 1e-6);
    }

    #[test]
    fn active_camera_lens_reaches_rig() {
        let mut editor = editor();
        let id = editor.add_camera().unwrap();
        let other = editor.add_camera().unwrap();
        let data = editor.set_active_camera(id).unwrap();
        assert!(data.active);
        assert_eq!(editor.rig().lens().fov_deg, data.fov_deg);
        assert_eq!(editor.bridge().active_camera().map(|(active, _)| active), Some(id));

        editor.apply(EditorCommand::SetActiveCamera(other)).unwrap();
        assert_eq!(editor.bridge().active_camera().map(|(active, _)| active), Some(other));
        assert!(editor
            .apply(EditorCommand::SetActiveCamera(EntityId(99)))
            .is_err());
    }

    #[test]
    fn frame_selection_retargets_rig() {
        let mut editor = editor();
        editor.connect().unwrap();
        let id = editor.add_light(LightKind::Point).unwrap();
        editor
            .apply(EditorCommand::SetTransform(
                id,
                Transform::from_position(Vec3::new(4.0, 1.0, -3.0)),
            ))
            .unwrap();
        assert!(!editor.frame_selection().unwrap());
        editor.apply(EditorCommand::Select(id)).unwrap();
        assert!(editor.frame_selection().unwrap());
        assert!((editor.rig().target() - Vec3::new(4.0, 1.0, -3.0)).length() < 1e-5);
    }

    #[test]
    fn save_then_load_restores_scene_and_reconnects() {
        let mut editor = editor();
        editor.connect().unwrap();
        let camera = editor.add_camera().unwrap();
        let light = editor.add_light(LightKind::Directional).unwrap();
        editor.add_model("/missing/ship.obj").unwrap();
        editor.apply(EditorCommand::Select(light)).unwrap();
        let path = std::env::temp_dir().join(format!(
            "scenewright_editor_{}.json",
            std::process::id()
        ));
        editor.save_scene(&path).unwrap();

        let mut other = self::editor();
        let report = other.load_scene(&path).unwrap();
        assert_eq!(report.added.len(), 3);
        assert!(other.bridge().is_connected());
        assert!(other.bridge().contains(camera));
        assert!(other.selection().is_empty());
        for entity in other.bridge().entities() {
            assert!(other.bridge().engine().is_reachable(entity.handle()));
        }

        // Loading again replaces rather than duplicates.
        let report = other.load_scene(&path).unwrap();
        assert_eq!(report.added.len(), 3);
        assert_eq!(other.bridge().len(), 3);

        let mut cpu = CpuOverlay::new();
        let tick = other.tick(Instant::now(), &mut cpu);
        assert_eq!(tick.assets.failed, 1);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn broken_scene_file_leaves_scene_alone() {
        let mut editor = editor();
        editor.connect().unwrap();
        editor.add_light(LightKind::Point).unwrap();
        let path = std::env::temp_dir().join(format!(
            "scenewright_broken_{}.json",
            std::process::id()
        ));
        std::fs::write(&path, "{ not json").unwrap();
        assert!(editor.load_scene(&path).is_err());
        assert_eq!(editor.bridge().len(), 1);
        assert!(editor.bridge().is_connected());
        let _ = std::fs::remove_file(&path);
    }
}
