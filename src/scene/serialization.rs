use crate::render::engine::RenderEngine;
use crate::scene::{
    CameraData, EntityId, EntityKind, LightData, ModelData, SceneError, SceneGraphBridge,
    Transform,
};
use glam::Vec3;
use std::path::Path;

pub const SCENE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown entity type '{0}'")]
    UnknownEntityTypeOnDeserialize(String),
    #[error("entity record {index} is malformed: {message}")]
    MalformedEntity { index: usize, message: String },
    #[error("entity rejected by scene: {0}")]
    Rejected(#[from] SceneError),
}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Flat, renderer-free description of one entity, in scene order.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub id: EntityId,
    pub name: String,
    pub parent: Option<EntityId>,
    pub transform: Transform,
    pub kind: EntityKind,
}

/// A record that could not be brought back.
#[derive(Debug)]
pub struct SkippedEntity {
    pub index: usize,
    pub id: Option<EntityId>,
    pub reason: SerializationError,
}

#[derive(Debug, Default)]
pub struct SceneLoad {
    pub records: Vec<EntityRecord>,
    pub skipped: Vec<SkippedEntity>,
}

#[derive(Debug, Default)]
pub struct RestoreReport {
    pub added: Vec<EntityId>,
    pub skipped: Vec<SkippedEntity>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct SceneDocument {
    version: u32,
    entities: Vec<serde_json::Value>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct TransformRecord {
    position: [f32; 3],
    rotation_deg: [f32; 3],
    scale: [f32; 3],
}

impl Default for TransformRecord {
    fn default() -> Self {
        Self::from(&Transform::IDENTITY)
    }
}

impl From<&Transform> for TransformRecord {
    fn from(t: &Transform) -> Self {
        Self {
            position: t.position.to_array(),
            rotation_deg: t.rotation_deg.to_array(),
            scale: t.scale.to_array(),
        }
    }
}

impl From<TransformRecord> for Transform {
    fn from(t: TransformRecord) -> Self {
        Self {
            position: Vec3::from_array(t.position),
            rotation_deg: Vec3::from_array(t.rotation_deg),
            scale: Vec3::from_array(t.scale),
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct RawRecord {
    id: EntityId,
    #[serde(rename = "type")]
    type_tag: String,
    name: String,
    #[serde(default)]
    parent: Option<EntityId>,
    #[serde(default)]
    transform: TransformRecord,
    #[serde(default)]
    data: serde_json::Value,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ModelRecord {
    source: String,
    #[serde(default)]
    source_hash: Option<String>,
}

/// Flattens the scene into records, in `entities` order.
pub fn snapshot<E: RenderEngine>(bridge: &SceneGraphBridge<E>) -> Vec<EntityRecord> {
    bridge
        .entities()
        .map(|entity| EntityRecord {
            id: entity.id(),
            name: entity.name().to_string(),
            parent: entity.parent(),
            transform: *entity.transform(),
            kind: entity.kind().clone(),
        })
        .collect()
}

fn record_to_value(record: &EntityRecord) -> Result<serde_json::Value> {
    let data = match &record.kind {
        EntityKind::Camera(data) => serde_json::to_value(data)?,
        EntityKind::Light(data) => serde_json::to_value(data)?,
        EntityKind::Model(model) => serde_json::to_value(ModelRecord {
            source: model.source.clone(),
            source_hash: model.source_hash.clone(),
        })?,
    };
    let raw = RawRecord {
        id: record.id,
        type_tag: record.kind.type_tag().to_string(),
        name: record.name.clone(),
        parent: record.parent,
        transform: TransformRecord::from(&record.transform),
        data,
    };
    Ok(serde_json::to_value(raw)?)
}

fn record_from_value(index: usize, value: serde_json::Value) -> std::result::Result<EntityRecord, SkippedEntity> {
    let id = value
        .get("id")
        .and_then(|v| v.as_u64())
        .map(EntityId);
    let skip = |reason| SkippedEntity { index, id, reason };
    let malformed = |err: serde_json::Error| {
        skip(SerializationError::MalformedEntity {
            index,
            message: err.to_string(),
        })
    };

    let raw: RawRecord = serde_json::from_value(value).map_err(|e| malformed(e))?;
    let kind = match raw.type_tag.as_str() {
        "camera" => EntityKind::Camera(
            serde_json::from_value::<CameraData>(raw.data).map_err(|e| malformed(e))?,
        ),
        "light" => EntityKind::Light(
            serde_json::from_value::<LightData>(raw.data).map_err(|e| malformed(e))?,
        ),
        "model" => {
            let model: ModelRecord = serde_json::from_value(raw.data).map_err(|e| malformed(e))?;
            EntityKind::Model(ModelData {
                source_hash: model.source_hash,
                ..ModelData::new(model.source)
            })
        }
        other => {
            return Err(skip(SerializationError::UnknownEntityTypeOnDeserialize(
                other.to_string(),
            )))
        }
    };
    Ok(EntityRecord {
        id: raw.id,
        name: raw.name,
        parent: raw.parent,
        transform: raw.transform.into(),
        kind,
    })
}

pub fn to_json(records: &[EntityRecord]) -> Result<String> {
    let entities = records
        .iter()
        .map(record_to_value)
        .collect::<Result<Vec<_>>>()?;
    let document = SceneDocument {
        version: SCENE_FORMAT_VERSION,
        entities,
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

/// Parses a scene document. Only a document that is not valid JSON (or has
/// no entity list) fails as a whole; bad records land in `skipped`.
pub fn from_json(json: &str) -> Result<SceneLoad> {
    let document: SceneDocument = serde_json::from_str(json)?;
    if document.version > SCENE_FORMAT_VERSION {
        log::warn!(
            "Scene format version {} is newer than supported {}; loading what we can",
            document.version,
            SCENE_FORMAT_VERSION
        );
    }
    let mut load = SceneLoad::default();
    for (index, value) in document.entities.into_iter().enumerate() {
        match record_from_value(index, value) {
            Ok(record) => load.records.push(record),
            Err(skipped) => {
                log::warn!("Skipping entity record {}: {}", index, skipped.reason);
                load.skipped.push(skipped);
            }
        }
    }
    Ok(load)
}

pub fn save_scene_to_file(records: &[EntityRecord], path: &Path) -> Result<()> {
    let json = to_json(records)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn load_scene_from_file(path: &Path) -> Result<SceneLoad> {
    let json = std::fs::read_to_string(path)?;
    from_json(&json)
}

/// Rebuilds a scene: every record is added, parents are linked, then the
/// bridge is connected once. Records the bridge rejects are skipped and
/// reported alongside the ones the parser already skipped.
pub fn restore<E: RenderEngine>(bridge: &mut SceneGraphBridge<E>, load: SceneLoad) -> RestoreReport {
    let mut report = RestoreReport {
        added: Vec::with_capacity(load.records.len()),
        skipped: load.skipped,
    };
    let mut links = Vec::new();
    for (index, record) in load.records.into_iter().enumerate() {
        let entity = bridge.build_entity_with_id(
            record.id,
            record.kind,
            Some(record.name),
            record.transform,
        );
        match bridge.add_entity(entity) {
            Ok(id) => {
                report.added.push(id);
                if let Some(parent) = record.parent {
                    links.push((id, parent));
                }
            }
            Err(err) => report.skipped.push(SkippedEntity {
                index,
                id: Some(record.id),
                reason: err.into(),
            }),
        }
    }
    for (child, parent) in links {
        if let Err(err) = bridge.set_parent(child, Some(parent)) {
            log::warn!("Entity {} keeps top level: {}", child, err);
        }
    }
    if let Err(err) = bridge.connect() {
        log::warn!("Connecting restored scene failed: {}", err);
    }
    log::info!(
        "Restored {} entities ({} skipped)",
        report.added.len(),
        report.skipped.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::{from_json, restore, snapshot, to_json, SerializationError};
    use crate::render::engine::RenderEngine;
    use crate::render::retained::RetainedScene;
    use crate::scene::{
        CameraData, EntityId, EntityKind, LightData, LightKind, ModelData, SceneGraphBridge,
        Transform,
    };
    use glam::Vec3;

    fn sample_scene() -> SceneGraphBridge<RetainedScene> {
        let mut bridge = SceneGraphBridge::new(RetainedScene::new());
        let camera = bridge
            .create_entity(
                EntityKind::Camera(CameraData {
                    fov_deg: 60.0,
                    active: true,
                    ..CameraData::default()
                }),
                Some("Main Camera".to_string()),
                Transform::from_position(Vec3::new(0.0, 2.0, 8.0)),
            )
            .unwrap();
        let light = bridge
            .create_entity(
                EntityKind::Light(LightData {
                    kind: LightKind::Spot,
                    intensity: 5_000.0,
                    color: [1.0, 0.8, 0.6],
                    range: 12.0,
                }),
                None,
                Transform::IDENTITY,
            )
            .unwrap();
        bridge
            .create_entity(
                EntityKind::Model(ModelData::new("assets/models/helmet.obj")),
                None,
                Transform {
                    position: Vec3::new(1.0, 2.0, 3.0),
                    rotation_deg: Vec3::new(10.0, 20.0, 30.0),
                    scale: Vec3::splat(2.0),
                },
            )
            .unwrap();
        bridge.add_child(camera, light).unwrap();
        bridge
    }

    #[test]
    fn test_empty_scene_serialization() {
        let json = to_json(&[]).unwrap();
        let loaded = from_json(&json).unwrap();
        assert!(loaded.records.is_empty());
        assert!(loaded.skipped.is_empty());
    }

    #[test]
    fn test_records_keep_scene_order_and_fields() {
        let bridge = sample_scene();
        let records = snapshot(&bridge);
        let json = to_json(&records).unwrap();
        let loaded = from_json(&json).unwrap();
        assert_eq!(loaded.records, records);
        assert_eq!(loaded.records[1].parent, Some(EntityId(1)));
    }

    #[test]
    fn test_runtime_fields_are_not_serialized() {
        let bridge = sample_scene();
        let json = to_json(&snapshot(&bridge)).unwrap();
        assert!(!json.contains("load_state"));
        assert!(!json.contains("generation"));
        assert!(!json.contains("handle"));
    }

    #[test]
    fn test_partial_deserialize_skips_unknown_type() {
        let json = r#"{
            "version": 1,
            "entities": [
                { "id": 1, "type": "light", "name": "Sun",
                  "data": { "kind": "directional", "intensity": 1.0, "color": [1.0, 1.0, 1.0], "range": 5.0 } },
                { "id": 2, "type": "particle_system", "name": "Smoke", "data": {} },
                { "id": 3, "type": "model", "name": "Crate", "data": { "source": "crate.obj" } }
            ]
        }"#;
        let loaded = from_json(json).unwrap();
        assert_eq!(loaded.records.len(), 2);
        assert_eq!(loaded.skipped.len(), 1);
        let skipped = &loaded.skipped[0];
        assert_eq!(skipped.index, 1);
        assert_eq!(skipped.id, Some(EntityId(2)));
        assert!(matches!(
            &skipped.reason,
            SerializationError::UnknownEntityTypeOnDeserialize(tag) if tag == "particle_system"
        ));

        let mut bridge = SceneGraphBridge::new(RetainedScene::new());
        let report = restore(&mut bridge, loaded);
        assert_eq!(report.added, vec![EntityId(1), EntityId(3)]);
        assert_eq!(report.skipped.len(), 1);
        assert!(bridge.is_connected());
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let json = r#"{ "version": 1, "entities": [
            { "id": 1, "type": "camera", "name": "Cam", "data": { "fov_deg": "wide" } },
            { "id": 2, "type": "camera", "name": "Cam 2",
              "data": { "fov_deg": 50.0, "near": 0.1, "far": 100.0, "active": false } }
        ] }"#;
        let loaded = from_json(json).unwrap();
        assert_eq!(loaded.records.len(), 1);
        assert!(matches!(
            loaded.skipped[0].reason,
            SerializationError::MalformedEntity { index: 0, .. }
        ));
    }

    #[test]
    fn test_restore_rejects_duplicate_ids_without_aborting() {
        let bridge = sample_scene();
        let mut records = snapshot(&bridge);
        let mut dup = records[2].clone();
        dup.name = "Copy".to_string();
        records.push(dup);
        let loaded = from_json(&to_json(&records).unwrap()).unwrap();

        let mut restored = SceneGraphBridge::new(RetainedScene::new());
        let report = restore(&mut restored, loaded);
        assert_eq!(report.added.len(), 3);
        assert_eq!(report.skipped.len(), 1);
        assert!(matches!(report.skipped[0].reason, SerializationError::Rejected(_)));
    }

    #[test]
    fn test_restore_connects_and_links_parents() {
        let records = snapshot(&sample_scene());
        let loaded = from_json(&to_json(&records).unwrap()).unwrap();
        let mut bridge = SceneGraphBridge::new(RetainedScene::new());
        restore(&mut bridge, loaded);

        for entity in bridge.entities() {
            assert!(bridge.engine().is_reachable(entity.handle()));
        }
        let camera = bridge.entity(EntityId(1)).unwrap();
        assert_eq!(camera.children(), &[EntityId(2)]);
        let light_handle = bridge.entity(EntityId(2)).unwrap().handle();
        assert_eq!(bridge.engine().parent_of(light_handle), Some(camera.handle()));
    }

    #[test]
    fn test_save_load_stress_loop_via_file() {
        let mut records = snapshot(&sample_scene());

        let mut path = std::env::temp_dir();
        let nonce = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        path.push(format!(
            "scenewright_scene_stress_{}_{}.json",
            std::process::id(),
            nonce
        ));

        for _ in 0..50 {
            super::save_scene_to_file(&records, &path).unwrap();
            let loaded = super::load_scene_from_file(&path).unwrap();
            assert!(loaded.skipped.is_empty());
            records = loaded.records;
            assert_eq!(records.len(), 3);
            match &records[2].kind {
                EntityKind::Model(model) => {
                    assert_eq!(model.source, "assets/models/helmet.obj");
                }
                _ => panic!("Expected third record to be a model"),
            }
        }

        let _ = std::fs::remove_file(path);
    }
}
