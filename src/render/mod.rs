pub mod camera;
pub mod engine;
pub mod overlay;
pub mod retained;

pub use camera::{CameraRig, InteractionMode, Lens};
pub use engine::{Aabb, CameraPose, NodeGeometry, RenderEngine, RenderError, RenderHandle};
pub use overlay::{CpuOverlay, OverlayBackend, OverlayFrame, OverlaySyncLayer};
pub use retained::RetainedScene;
