//! Desktop host: a winit window driving one [`EditorContext`].

pub mod schedule;

mod input;
mod timing;

use crate::assets::{AssetPipeline, ObjBoundsLoader};
use crate::config::EditorConfig;
use crate::editor::{EditorCommand, EditorContext, Gesture};
use crate::render::overlay::CpuOverlay;
use crate::render::retained::RetainedScene;
use glam::Vec2;
use input::{InputState, KeyAction, PointerButton};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use timing::FrameTiming;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

/// Model file the `M` key adds.
pub const MODEL_ENV: &str = "SCENEWRIGHT_MODEL";
const DEFAULT_MODEL: &str = "assets/model.obj";
const DEFAULT_SCENE: &str = "scene.json";
const CAPTURE_DIR: &str = "captures";
/// Pixel-delta scroll events are converted to lines at this rate.
const PIXELS_PER_LINE: f32 = 40.0;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),
}

#[derive(Debug, Clone)]
pub struct HostOptions {
    pub scene_path: PathBuf,
    pub model_source: String,
    pub capture_dir: PathBuf,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            scene_path: PathBuf::from(DEFAULT_SCENE),
            model_source: std::env::var(MODEL_ENV).unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            capture_dir: PathBuf::from(CAPTURE_DIR),
        }
    }
}

struct App {
    window: Option<Arc<Window>>,
    editor: EditorContext<RetainedScene>,
    overlay: CpuOverlay,
    input: InputState,
    timing: FrameTiming,
    scene_path: PathBuf,
    capture_dir: PathBuf,
    captures: u32,
    close_requested: bool,
}

impl App {
    fn new(config: EditorConfig, options: HostOptions) -> Self {
        let loader = Arc::new(ObjBoundsLoader::new());
        let assets = AssetPipeline::threaded(loader, config.assets);
        let editor = EditorContext::new(RetainedScene::new(), config, assets);
        Self {
            window: None,
            input: InputState::new(config.input, options.model_source),
            editor,
            overlay: CpuOverlay::new(),
            timing: FrameTiming::new("Scenewright".to_string(), Instant::now()),
            scene_path: options.scene_path,
            capture_dir: options.capture_dir,
            captures: 0,
            close_requested: false,
        }
    }

    fn apply(&mut self, command: EditorCommand) {
        if let Err(err) = self.editor.apply(command) {
            log::warn!("Command failed: {}", err);
        }
    }

    fn gesture(&mut self, gesture: Gesture) {
        self.apply(EditorCommand::Gesture(gesture));
    }

    fn handle_save_scene_action(&mut self) {
        let file_name = self
            .scene_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(DEFAULT_SCENE)
            .to_string();
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("Scene", &["json"])
            .set_file_name(file_name)
            .save_file()
        {
            self.apply(EditorCommand::SaveScene(path.clone()));
            self.scene_path = path;
        }
    }

    fn handle_load_scene_action(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Scene", &["json"])
            .pick_file()
        else {
            return;
        };
        self.apply(EditorCommand::LoadScene(path.clone()));
        self.scene_path = path;
    }

    fn handle_add_model_action(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Wavefront OBJ", &["obj"])
            .pick_file()
        else {
            return;
        };
        let Some(source) = path.to_str() else {
            log::warn!("Model path is not valid UTF-8: {:?}", path);
            return;
        };
        self.apply(EditorCommand::AddModel {
            source: source.to_string(),
        });
    }

    fn capture_overlay(&mut self) {
        self.captures += 1;
        let path = self
            .capture_dir
            .join(format!("overlay_{:04}.png", self.captures));
        if let Err(err) = self.overlay.capture_png(&path) {
            log::error!("Overlay capture failed: {}", err);
        }
    }

    /// Runs one scheduling quantum and refreshes the title if a frame was drawn.
    fn quantum(&mut self, now: Instant) {
        if let Some(gesture) = self.input.poll_long_press(now) {
            self.gesture(gesture);
        }
        let report = self.editor.tick(now, &mut self.overlay);
        if report.assets.loaded + report.assets.failed + report.assets.discarded > 0 {
            log::debug!("Asset completions: {:?}", report.assets);
        }
        if report.drew {
            let status = self.editor.status_line();
            if let Some(title) = self.timing.update(now, &status) {
                if let Some(window) = self.window.as_ref() {
                    window.set_title(&title);
                }
            }
        }
    }

    fn schedule_wake(&self, event_loop: &ActiveEventLoop, now: Instant) {
        let wake = match (self.editor.next_wake(now), self.input.long_press_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        match wake {
            Some(at) => event_loop.set_control_flow(ControlFlow::WaitUntil(at)),
            None => event_loop.set_control_flow(ControlFlow::Wait),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.timing.base_title())
            .with_inner_size(PhysicalSize::new(1280u32, 720u32))
            .with_resizable(true);
        let window = match event_loop.create_window(attrs) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                log::error!("Failed to create window: {}", err);
                event_loop.exit();
                return;
            }
        };
        let size = window.inner_size();
        self.apply(EditorCommand::ResizeViewport {
            width: size.width,
            height: size.height,
        });
        if let Err(err) = self.editor.connect() {
            log::error!("Failed to connect scene to renderer: {}", err);
            event_loop.exit();
            return;
        }
        log::info!("Editor ready: {}", self.editor.status_line());
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.close_requested = true;
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let pressed = event.state == ElementState::Pressed;
                match self.input.handle_key(event.physical_key, pressed) {
                    KeyAction::None => {}
                    KeyAction::Command(command) => self.apply(command),
                    KeyAction::CaptureOverlay => self.capture_overlay(),
                    KeyAction::SaveSceneDialog => self.handle_save_scene_action(),
                    KeyAction::LoadSceneDialog => self.handle_load_scene_action(),
                    KeyAction::AddModelDialog => self.handle_add_model_action(),
                    KeyAction::Exit => {
                        self.close_requested = true;
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                self.input.set_ctrl(modifiers.state().control_key());
            }
            WindowEvent::Resized(size) => {
                self.apply(EditorCommand::ResizeViewport {
                    width: size.width,
                    height: size.height,
                });
            }
            WindowEvent::CursorMoved { position, .. } => {
                let position = Vec2::new(position.x as f32, position.y as f32);
                if let Some(gesture) = self.input.pointer_moved(position) {
                    self.gesture(gesture);
                }
            }
            WindowEvent::CursorLeft { .. } => self.input.cursor_left(),
            WindowEvent::MouseInput { state, button, .. } => {
                let button = match button {
                    MouseButton::Left => PointerButton::Primary,
                    MouseButton::Right | MouseButton::Middle => PointerButton::Secondary,
                    _ => return,
                };
                let now = Instant::now();
                match state {
                    ElementState::Pressed => self.input.pointer_pressed(button, now),
                    ElementState::Released => {
                        if let Some(gesture) = self.input.pointer_released(button, now) {
                            self.gesture(gesture);
                        }
                    }
                }
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let lines = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_LINE,
                };
                let gesture = self.input.scroll(lines);
                self.gesture(gesture);
            }
            WindowEvent::PinchGesture { delta, .. } => {
                self.gesture(Gesture::Pinch(1.0 + delta as f32));
            }
            WindowEvent::RedrawRequested => {
                self.quantum(Instant::now());
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.close_requested {
            return;
        }
        let now = Instant::now();
        let due = self.editor.next_wake(now).is_some_and(|at| at <= now)
            || self.input.long_press_deadline().is_some_and(|at| at <= now);
        if due {
            self.quantum(now);
        }
        self.schedule_wake(event_loop, Instant::now());
    }
}

pub fn run(config: EditorConfig, options: HostOptions) -> Result<(), AppError> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);
    let mut app = App::new(config, options);
    event_loop.run_app(&mut app)?;
    Ok(())
}
