//! Scenewright: the core of an interactive 3D scene editor.
//!
//! Entities live in a [`scene::SceneGraphBridge`] that mirrors them into a
//! [`render::RenderEngine`]. An [`editor::EditorContext`] ties the bridge to
//! the orbit camera, the selection gizmo, the overlay layer and the update
//! scheduler. The [`app`] module hosts a context in a winit window.

pub mod app;
pub mod assets;
pub mod config;
pub mod editor;
pub mod render;
pub mod scene;
pub mod selection;

pub use config::EditorConfig;
pub use editor::{EditorCommand, EditorContext, EditorError, Gesture};
pub use scene::{EntityId, SceneGraphBridge};
