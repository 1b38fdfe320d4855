//! Model loading.
//!
//! Loads run off the mutation path. A request flips the model to `Loading`
//! and captures its generation; the completion comes back through a queue
//! and is applied on the owner thread, where stale generations are dropped.

use crate::config::AssetConfig;
use crate::render::engine::{Aabb, GeometryKind, NodeGeometry, RenderEngine};
use crate::scene::{EntityId, LoadState, SceneError, SceneGraphBridge};
use crossbeam_channel::{Receiver, Sender};
use glam::{Mat4, Vec3};
use sha2::{Digest, Sha256};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("failed to load model {url}: {reason}")]
    ModelLoadFailed { url: String, reason: String },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed model data in {path} at line {line}")]
    Parse { path: String, line: usize },
}

/// Opaque decoded geometry as far as the editor core is concerned: an id
/// for the renderer plus bounds to place it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedGeometry {
    pub asset_key: u64,
    pub bounds: Aabb,
    pub vertex_count: usize,
    /// Hex SHA-256 of the source bytes.
    pub content_hash: String,
}

pub trait AssetLoader: Send + Sync {
    fn load(&self, source: &str) -> Result<LoadedGeometry, AssetError>;
}

/// Reads Wavefront OBJ vertex positions for bounds. Faces, normals and
/// materials are left to the renderer.
#[derive(Debug, Clone, Default)]
pub struct ObjBoundsLoader {
    base_dir: Option<PathBuf>,
}

impl ObjBoundsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Relative sources resolve against `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    fn resolve(&self, source: &str) -> PathBuf {
        let raw = source.strip_prefix("file://").unwrap_or(source);
        let path = Path::new(raw);
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl AssetLoader for ObjBoundsLoader {
    fn load(&self, source: &str) -> Result<LoadedGeometry, AssetError> {
        let path = self.resolve(source);
        let is_obj = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("obj"))
            .unwrap_or(false);
        if !is_obj {
            return Err(AssetError::ModelLoadFailed {
                url: source.to_string(),
                reason: "unsupported model format".to_string(),
            });
        }
        let bytes = std::fs::read(&path).map_err(|source| AssetError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes);

        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        let mut vertex_count = 0usize;
        for (index, line) in text.lines().enumerate() {
            let mut parts = line.split_whitespace();
            if parts.next() != Some("v") {
                continue;
            }
            let mut coords = [0.0f32; 3];
            for coord in &mut coords {
                *coord = parts
                    .next()
                    .and_then(|value| value.parse::<f32>().ok())
                    .filter(|value| value.is_finite())
                    .ok_or_else(|| AssetError::Parse {
                        path: path.display().to_string(),
                        line: index + 1,
                    })?;
            }
            let p = Vec3::from(coords);
            min = min.min(p);
            max = max.max(p);
            vertex_count += 1;
        }
        if vertex_count == 0 {
            return Err(AssetError::ModelLoadFailed {
                url: source.to_string(),
                reason: "no vertex positions".to_string(),
            });
        }

        let digest = Sha256::digest(&bytes);
        let mut key_bytes = [0u8; 8];
        key_bytes.copy_from_slice(&digest[..8]);
        let content_hash = digest.iter().map(|b| format!("{b:02x}")).collect::<String>();
        Ok(LoadedGeometry {
            asset_key: u64::from_le_bytes(key_bytes),
            bounds: Aabb::new(min, max),
            vertex_count,
            content_hash,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub entity: EntityId,
    pub generation: u64,
    pub source: String,
}

#[derive(Debug)]
pub struct LoadCompletion {
    pub entity: EntityId,
    pub generation: u64,
    pub source: String,
    pub result: Result<LoadedGeometry, AssetError>,
}

/// Runs load requests somewhere and hands completions back on `poll`.
pub trait LoadExecutor {
    fn submit(&mut self, request: LoadRequest);
    fn poll(&mut self) -> Vec<LoadCompletion>;
    fn in_flight(&self) -> usize;
}

/// Loads on the calling thread at submit time. Completions still wait for
/// the next `poll`, so they are applied in the same place as threaded ones.
pub struct InlineExecutor {
    loader: Arc<dyn AssetLoader>,
    ready: Vec<LoadCompletion>,
}

impl InlineExecutor {
    pub fn new(loader: Arc<dyn AssetLoader>) -> Self {
        Self {
            loader,
            ready: Vec::new(),
        }
    }
}

impl LoadExecutor for InlineExecutor {
    fn submit(&mut self, request: LoadRequest) {
        let result = self.loader.load(&request.source);
        self.ready.push(LoadCompletion {
            entity: request.entity,
            generation: request.generation,
            source: request.source,
            result,
        });
    }

    fn poll(&mut self) -> Vec<LoadCompletion> {
        std::mem::take(&mut self.ready)
    }

    fn in_flight(&self) -> usize {
        self.ready.len()
    }
}

/// One worker thread per request; completions come back over a channel.
pub struct ThreadedExecutor {
    loader: Arc<dyn AssetLoader>,
    tx: Sender<LoadCompletion>,
    rx: Receiver<LoadCompletion>,
    in_flight: usize,
}

impl ThreadedExecutor {
    pub fn new(loader: Arc<dyn AssetLoader>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            loader,
            tx,
            rx,
            in_flight: 0,
        }
    }
}

impl LoadExecutor for ThreadedExecutor {
    fn submit(&mut self, request: LoadRequest) {
        let loader = Arc::clone(&self.loader);
        let tx = self.tx.clone();
        let LoadRequest {
            entity,
            generation,
            source,
        } = request;
        let worker_source = source.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("asset-load-{}", entity))
            .spawn(move || {
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    loader.load(&worker_source)
                }))
                .unwrap_or_else(|payload| {
                    Err(AssetError::ModelLoadFailed {
                        url: worker_source.clone(),
                        reason: format!("loader panicked: {}", panic_message(payload.as_ref())),
                    })
                });
                let _ = tx.send(LoadCompletion {
                    entity,
                    generation,
                    source: worker_source,
                    result,
                });
            });
        self.in_flight += 1;
        if let Err(err) = spawned {
            log::error!("Failed to spawn asset load thread: {}", err);
            let _ = self.tx.send(LoadCompletion {
                entity,
                generation,
                result: Err(AssetError::ModelLoadFailed {
                    url: source.clone(),
                    reason: format!("no load thread: {}", err),
                }),
                source,
            });
        }
    }

    fn poll(&mut self) -> Vec<LoadCompletion> {
        let completions: Vec<LoadCompletion> = self.rx.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(completions.len());
        completions
    }

    fn in_flight(&self) -> usize {
        self.in_flight
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Maps loaded bounds onto the normalization target: centered on the node
/// origin, longest axis equal to `reference_size`. The entity transform is
/// left alone; the adjustment lives in the geometry's `fit` matrix.
pub fn normalized_geometry(loaded: &LoadedGeometry, reference_size: f32) -> NodeGeometry {
    let longest = loaded.bounds.longest_axis();
    let scale = if longest > f32::EPSILON {
        reference_size / longest
    } else {
        1.0
    };
    NodeGeometry {
        kind: GeometryKind::Model {
            asset_key: loaded.asset_key,
        },
        bounds: loaded.bounds,
        fit: Mat4::from_scale(Vec3::splat(scale)) * Mat4::from_translation(-loaded.bounds.center()),
    }
}

pub fn placeholder_geometry(extent: f32) -> NodeGeometry {
    NodeGeometry {
        kind: GeometryKind::Placeholder,
        bounds: Aabb::from_center_extent(Vec3::ZERO, Vec3::splat(extent)),
        fit: Mat4::IDENTITY,
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    pub loaded: usize,
    pub failed: usize,
    pub discarded: usize,
}

pub struct AssetPipeline {
    executor: Box<dyn LoadExecutor>,
    config: AssetConfig,
}

impl AssetPipeline {
    pub fn new(executor: Box<dyn LoadExecutor>, config: AssetConfig) -> Self {
        Self { executor, config }
    }

    pub fn inline(loader: Arc<dyn AssetLoader>, config: AssetConfig) -> Self {
        Self::new(Box::new(InlineExecutor::new(loader)), config)
    }

    pub fn threaded(loader: Arc<dyn AssetLoader>, config: AssetConfig) -> Self {
        Self::new(Box::new(ThreadedExecutor::new(loader)), config)
    }

    pub fn in_flight(&self) -> usize {
        self.executor.in_flight()
    }

    /// Starts (or restarts) loading the model's source. Any completion of
    /// an earlier request for the same entity becomes stale.
    pub fn request_load<E: RenderEngine>(
        &mut self,
        bridge: &mut SceneGraphBridge<E>,
        id: EntityId,
    ) -> Result<u64, SceneError> {
        let (source, generation) = bridge.begin_model_load(id)?;
        log::debug!("Loading {} for {} (generation {})", source, id, generation);
        self.executor.submit(LoadRequest {
            entity: id,
            generation,
            source,
        });
        Ok(generation)
    }

    /// Applies every completion that arrived since the last call. Failures
    /// put a placeholder on the entity and mark it `Failed`.
    pub fn apply_completions<E: RenderEngine>(
        &mut self,
        bridge: &mut SceneGraphBridge<E>,
    ) -> ApplyReport {
        let mut report = ApplyReport::default();
        for completion in self.executor.poll() {
            if !bridge.is_current_load(completion.entity, completion.generation) {
                log::debug!(
                    "Dropping stale load of {} for {} (generation {})",
                    completion.source,
                    completion.entity,
                    completion.generation
                );
                report.discarded += 1;
                continue;
            }
            let (geometry, state, hash) = match completion.result {
                Ok(loaded) => {
                    log::info!(
                        "Loaded {} ({} vertices) for {}",
                        completion.source,
                        loaded.vertex_count,
                        completion.entity
                    );
                    report.loaded += 1;
                    (
                        normalized_geometry(&loaded, self.config.reference_size),
                        LoadState::Loaded,
                        Some(loaded.content_hash),
                    )
                }
                Err(err) => {
                    log::warn!("Model load failed for {}: {}", completion.entity, err);
                    report.failed += 1;
                    (
                        placeholder_geometry(self.config.placeholder_extent),
                        LoadState::Failed,
                        None,
                    )
                }
            };
            bridge.finish_model_load(
                completion.entity,
                completion.generation,
                geometry,
                state,
                hash,
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AssetError, AssetLoader, AssetPipeline, ObjBoundsLoader, normalized_geometry,
        LoadedGeometry,
    };
    use crate::config::AssetConfig;
    use crate::render::engine::{Aabb, GeometryKind, RenderEngine};
    use crate::render::retained::RetainedScene;
    use crate::scene::{EntityId, EntityKind, LoadState, ModelData, SceneGraphBridge, Transform};
    use glam::Vec3;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    fn write_obj(name: &str, body: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "scenewright_{}_{}.obj",
            std::process::id(),
            name
        ));
        std::fs::write(&path, body).unwrap();
        path
    }

    const BOX_OBJ: &str = "# box\nv -2 0 -1\nv 2 1 1\nv 0 0.5 0\nf 1 2 3\n";

    fn model(bridge: &mut SceneGraphBridge<RetainedScene>, source: &str) -> EntityId {
        bridge
            .create_entity(
                EntityKind::Model(ModelData::new(source)),
                None,
                Transform::IDENTITY,
            )
            .unwrap()
    }

    fn load_state(bridge: &SceneGraphBridge<RetainedScene>, id: EntityId) -> LoadState {
        match bridge.entity(id).unwrap().kind() {
            EntityKind::Model(data) => data.load_state,
            _ => unreachable!(),
        }
    }

    #[test]
    fn obj_loader_reads_bounds_and_hash() {
        let path = write_obj("bounds", BOX_OBJ);
        let loaded = ObjBoundsLoader::new()
            .load(path.to_str().unwrap())
            .unwrap();
        assert_eq!(loaded.vertex_count, 3);
        assert_eq!(loaded.bounds, Aabb::new(Vec3::new(-2.0, 0.0, -1.0), Vec3::new(2.0, 1.0, 1.0)));
        assert_eq!(loaded.content_hash.len(), 64);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn obj_loader_reports_bad_line() {
        let path = write_obj("badline", "v 0 0 0\nv 1 nope 2\n");
        let err = ObjBoundsLoader::new()
            .load(path.to_str().unwrap())
            .unwrap_err();
        assert!(matches!(err, AssetError::Parse { line: 2, .. }));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_and_wrong_format_fail() {
        let loader = ObjBoundsLoader::new();
        assert!(matches!(
            loader.load("/definitely/not/here.obj"),
            Err(AssetError::Read { .. })
        ));
        assert!(matches!(
            loader.load("scene.fbx"),
            Err(AssetError::ModelLoadFailed { .. })
        ));
    }

    #[test]
    fn normalization_scales_longest_axis_to_reference() {
        let loaded = LoadedGeometry {
            asset_key: 9,
            bounds: Aabb::new(Vec3::new(10.0, 0.0, 0.0), Vec3::new(14.0, 2.0, 1.0)),
            vertex_count: 8,
            content_hash: String::new(),
        };
        let geometry = normalized_geometry(&loaded, 1.0);
        let local = geometry.local_bounds();
        assert!((local.longest_axis() - 1.0).abs() < 1e-5);
        assert!(local.center().length() < 1e-5);
    }

    #[test]
    fn successful_load_normalizes_on_the_entity_node() {
        let path = write_obj("success", BOX_OBJ);
        let mut bridge = SceneGraphBridge::new(RetainedScene::new());
        bridge.connect().unwrap();
        let id = model(&mut bridge, path.to_str().unwrap());
        let mut pipeline =
            AssetPipeline::inline(Arc::new(ObjBoundsLoader::new()), AssetConfig::default());

        pipeline.request_load(&mut bridge, id).unwrap();
        assert_eq!(load_state(&bridge, id), LoadState::Loading);
        let report = pipeline.apply_completions(&mut bridge);
        assert_eq!(report.loaded, 1);
        assert_eq!(load_state(&bridge, id), LoadState::Loaded);

        let bounds = bridge.world_bounds(id).unwrap();
        assert!((bounds.longest_axis() - 1.0).abs() < 1e-5);
        // Normalization never touches the entity transform.
        assert_eq!(*bridge.entity(id).unwrap().transform(), Transform::IDENTITY);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn failed_load_shows_placeholder() {
        let mut bridge = SceneGraphBridge::new(RetainedScene::new());
        bridge.connect().unwrap();
        let id = model(&mut bridge, "/missing/model.obj");
        let mut pipeline =
            AssetPipeline::inline(Arc::new(ObjBoundsLoader::new()), AssetConfig::default());
        pipeline.request_load(&mut bridge, id).unwrap();
        let report = pipeline.apply_completions(&mut bridge);
        assert_eq!(report.failed, 1);
        assert_eq!(load_state(&bridge, id), LoadState::Failed);
        let handle = bridge.entity(id).unwrap().handle();
        let geometry = bridge.engine().geometry(handle).unwrap();
        assert_eq!(geometry.kind, GeometryKind::Placeholder);
        assert!(bridge.engine().is_reachable(handle));
    }

    #[test]
    fn superseded_and_removed_loads_are_discarded() {
        let path = write_obj("stale", BOX_OBJ);
        let mut bridge = SceneGraphBridge::new(RetainedScene::new());
        let id = model(&mut bridge, path.to_str().unwrap());
        let gone = model(&mut bridge, path.to_str().unwrap());
        let mut pipeline =
            AssetPipeline::inline(Arc::new(ObjBoundsLoader::new()), AssetConfig::default());

        pipeline.request_load(&mut bridge, id).unwrap();
        pipeline.request_load(&mut bridge, id).unwrap();
        pipeline.request_load(&mut bridge, gone).unwrap();
        bridge.remove_entity(gone);

        let report = pipeline.apply_completions(&mut bridge);
        assert_eq!(report.loaded, 1);
        assert_eq!(report.discarded, 2);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn threaded_executor_delivers_through_channel() {
        let path = write_obj("threaded", BOX_OBJ);
        let mut bridge = SceneGraphBridge::new(RetainedScene::new());
        let id = model(&mut bridge, path.to_str().unwrap());
        let mut pipeline =
            AssetPipeline::threaded(Arc::new(ObjBoundsLoader::new()), AssetConfig::default());
        pipeline.request_load(&mut bridge, id).unwrap();
        assert_eq!(pipeline.in_flight(), 1);

        let mut loaded = 0;
        for _ in 0..500 {
            loaded += pipeline.apply_completions(&mut bridge).loaded;
            if loaded > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(loaded, 1);
        assert_eq!(pipeline.in_flight(), 0);
        assert_eq!(load_state(&bridge, id), LoadState::Loaded);
        let _ = std::fs::remove_file(path);
    }

    struct PanickingLoader;

    impl AssetLoader for PanickingLoader {
        fn load(&self, source: &str) -> Result<LoadedGeometry, AssetError> {
            panic!("decoder blew up on {}", source)
        }
    }

    #[test]
    fn panicking_loader_fails_the_model_instead_of_hanging() {
        let mut bridge = SceneGraphBridge::new(RetainedScene::new());
        bridge.connect().unwrap();
        let id = model(&mut bridge, "assets/cursed.obj");
        let mut pipeline = AssetPipeline::threaded(Arc::new(PanickingLoader), AssetConfig::default());
        pipeline.request_load(&mut bridge, id).unwrap();

        let mut failed = 0;
        for _ in 0..500 {
            failed += pipeline.apply_completions(&mut bridge).failed;
            if failed > 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(failed, 1);
        assert_eq!(pipeline.in_flight(), 0);
        assert_eq!(load_state(&bridge, id), LoadState::Failed);
        let handle = bridge.entity(id).unwrap().handle();
        assert_eq!(
            bridge.engine().geometry(handle).unwrap().kind,
            GeometryKind::Placeholder
        );
    }
}
