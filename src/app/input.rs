use crate::config::InputConfig;
use crate::editor::{EditorCommand, Gesture};
use crate::scene::LightKind;
use crate::selection::AxisMask;
use glam::Vec2;
use std::time::{Duration, Instant};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Pixels an arrow key turns the camera by.
const ARROW_STEP_PX: f32 = 12.0;

#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    None,
    Command(EditorCommand),
    CaptureOverlay,
    /// Chords that need a file dialog; the host owns those.
    SaveSceneDialog,
    LoadSceneDialog,
    AddModelDialog,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy)]
struct Press {
    button: PointerButton,
    origin: Vec2,
    last: Vec2,
    started: Instant,
    dragging: bool,
    long_press_fired: bool,
}

/// Turns raw pointer and key events into editor gestures and commands.
/// Knows nothing about the scene; the editor decides what a gesture means.
#[derive(Debug)]
pub struct InputState {
    config: InputConfig,
    ctrl: bool,
    cursor: Option<Vec2>,
    press: Option<Press>,
    model_source: String,
}

impl InputState {
    pub fn new(config: InputConfig, model_source: String) -> Self {
        Self {
            config,
            ctrl: false,
            cursor: None,
            press: None,
            model_source,
        }
    }

    pub fn set_ctrl(&mut self, ctrl: bool) {
        self.ctrl = ctrl;
    }

    pub fn cursor_left(&mut self) {
        self.cursor = None;
    }

    pub fn handle_key(&mut self, key: PhysicalKey, pressed: bool) -> KeyAction {
        if !pressed {
            return KeyAction::None;
        }
        let PhysicalKey::Code(code) = key else {
            return KeyAction::None;
        };
        let command = match code {
            KeyCode::Escape => return KeyAction::Exit,
            KeyCode::F12 => return KeyAction::CaptureOverlay,
            KeyCode::KeyS if self.ctrl => return KeyAction::SaveSceneDialog,
            KeyCode::KeyO if self.ctrl => return KeyAction::LoadSceneDialog,
            KeyCode::KeyM if self.ctrl => return KeyAction::AddModelDialog,
            _ if self.ctrl => return KeyAction::None,
            KeyCode::Tab => EditorCommand::ToggleMode,
            KeyCode::KeyX => EditorCommand::SetAxis(AxisMask::X),
            KeyCode::KeyY => EditorCommand::SetAxis(AxisMask::Y),
            KeyCode::KeyZ => EditorCommand::SetAxis(AxisMask::Z),
            KeyCode::Digit1 => EditorCommand::SetAxis(AxisMask::XY),
            KeyCode::Digit2 => EditorCommand::SetAxis(AxisMask::XZ),
            KeyCode::Digit3 => EditorCommand::SetAxis(AxisMask::YZ),
            KeyCode::KeyV => EditorCommand::SetAxis(AxisMask::FREE),
            KeyCode::KeyC => EditorCommand::AddCamera,
            KeyCode::KeyL => EditorCommand::AddLight(LightKind::Point),
            KeyCode::KeyM => EditorCommand::AddModel {
                source: self.model_source.clone(),
            },
            KeyCode::Delete | KeyCode::Backspace => EditorCommand::RemoveSelected,
            KeyCode::KeyF => EditorCommand::FrameSelection,
            KeyCode::Equal | KeyCode::NumpadAdd => EditorCommand::Gesture(Gesture::Scroll(1.0)),
            KeyCode::Minus | KeyCode::NumpadSubtract => {
                EditorCommand::Gesture(Gesture::Scroll(-1.0))
            }
            KeyCode::ArrowLeft => self.arrow(Vec2::new(-ARROW_STEP_PX, 0.0)),
            KeyCode::ArrowRight => self.arrow(Vec2::new(ARROW_STEP_PX, 0.0)),
            KeyCode::ArrowUp => self.arrow(Vec2::new(0.0, ARROW_STEP_PX)),
            KeyCode::ArrowDown => self.arrow(Vec2::new(0.0, -ARROW_STEP_PX)),
            _ => return KeyAction::None,
        };
        KeyAction::Command(command)
    }

    fn arrow(&self, delta: Vec2) -> EditorCommand {
        EditorCommand::Gesture(Gesture::Drag { delta, pan: false })
    }

    pub fn pointer_pressed(&mut self, button: PointerButton, now: Instant) {
        let Some(position) = self.cursor else {
            return;
        };
        self.press = Some(Press {
            button,
            origin: position,
            last: position,
            started: now,
            dragging: false,
            long_press_fired: false,
        });
    }

    /// Drag gesture once the pointer has left the tap slop radius.
    pub fn pointer_moved(&mut self, position: Vec2) -> Option<Gesture> {
        self.cursor = Some(position);
        let press = self.press.as_mut()?;
        if press.long_press_fired {
            return None;
        }
        if !press.dragging {
            if position.distance(press.origin) <= self.config.tap_slop_px {
                return None;
            }
            press.dragging = true;
        }
        let pixels = position - press.last;
        press.last = position;
        let per_unit = self.config.drag_pixels_per_unit.max(f32::EPSILON);
        // Window y grows downward; gestures use +y up.
        let delta = Vec2::new(pixels.x, -pixels.y) / per_unit;
        Some(Gesture::Drag {
            delta,
            pan: press.button == PointerButton::Secondary,
        })
    }

    pub fn pointer_released(&mut self, button: PointerButton, now: Instant) -> Option<Gesture> {
        if self.press.map(|press| press.button) != Some(button) {
            return None;
        }
        let press = self.press.take()?;
        if press.dragging || press.long_press_fired || press.button != PointerButton::Primary {
            return None;
        }
        if now.saturating_duration_since(press.started) >= self.long_press() {
            Some(Gesture::LongPress(press.origin))
        } else {
            Some(Gesture::Tap(press.origin))
        }
    }

    /// Fires a long press while the pointer is still held.
    pub fn poll_long_press(&mut self, now: Instant) -> Option<Gesture> {
        let long_press = self.long_press();
        let press = self.press.as_mut()?;
        if press.dragging
            || press.long_press_fired
            || press.button != PointerButton::Primary
            || now.saturating_duration_since(press.started) < long_press
        {
            return None;
        }
        press.long_press_fired = true;
        Some(Gesture::LongPress(press.origin))
    }

    pub fn long_press_deadline(&self) -> Option<Instant> {
        self.press
            .filter(|press| {
                !press.dragging && !press.long_press_fired && press.button == PointerButton::Primary
            })
            .map(|press| press.started + self.long_press())
    }

    pub fn scroll(&self, lines: f32) -> Gesture {
        Gesture::Scroll(lines * self.config.scroll_line_units)
    }

    fn long_press(&self) -> Duration {
        Duration::from_millis(self.config.long_press_ms)
    }
}
