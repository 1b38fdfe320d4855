//! Sky gradient and reference grid drawn behind the retained scene.
//!
//! The layer owns no camera state. Each draw reads the rig once, builds an
//! [`OverlayFrame`] from it and hands that to the backend in the same call.

use crate::app::schedule::DeferredQueue;
use crate::render::camera::CameraRig;
use glam::{Mat4, Vec3, Vec4};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("no overlay frame has been drawn yet")]
    NoFrame,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayStyle {
    pub sky_zenith: [f32; 3],
    pub sky_horizon: [f32; 3],
    pub ground: [f32; 3],
    pub grid_minor: [f32; 3],
    pub grid_major: [f32; 3],
    pub axis_x: [f32; 3],
    pub axis_z: [f32; 3],
    /// World units between minor lines.
    pub spacing: f32,
    pub major_every: u32,
    /// Line half-width in pixels.
    pub line_px: f32,
    /// Grid fades out completely at this distance from the eye.
    pub fade_distance: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            sky_zenith: [0.16, 0.30, 0.58],
            sky_horizon: [0.62, 0.72, 0.84],
            ground: [0.22, 0.23, 0.25],
            grid_minor: [0.38, 0.39, 0.42],
            grid_major: [0.55, 0.56, 0.60],
            axis_x: [0.85, 0.25, 0.25],
            axis_z: [0.25, 0.45, 0.90],
            spacing: 1.0,
            major_every: 10,
            line_px: 0.75,
            fade_distance: 80.0,
        }
    }
}

/// Everything a backend needs for one overlay draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayFrame {
    pub index: u64,
    pub eye: Vec3,
    pub forward: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub inverse_view_projection: Mat4,
    pub viewport: (u32, u32),
    pub style: OverlayStyle,
}

impl OverlayFrame {
    /// World-space direction through a pixel center.
    pub fn pixel_ray(&self, x: f32, y: f32) -> Vec3 {
        let (width, height) = (self.viewport.0.max(1) as f32, self.viewport.1.max(1) as f32);
        let ndc_x = 2.0 * x / width - 1.0;
        let ndc_y = 1.0 - 2.0 * y / height;
        let near = self.unproject(ndc_x, ndc_y, 0.0);
        let far = self.unproject(ndc_x, ndc_y, 1.0);
        (far - near).normalize_or_zero()
    }

    fn unproject(&self, x: f32, y: f32, z: f32) -> Vec3 {
        let p = self.inverse_view_projection * Vec4::new(x, y, z, 1.0);
        if p.w.abs() > f32::EPSILON {
            p.truncate() / p.w
        } else {
            p.truncate()
        }
    }
}

/// Consumer of overlay frames (GPU pipeline, CPU rasterizer, test recorder).
///
/// A backend must not mutate editor state from inside `draw`; anything it
/// wants changed goes into `deferred` and is applied next quantum.
pub trait OverlayBackend<C> {
    fn draw(&mut self, frame: &OverlayFrame, deferred: &mut DeferredQueue<C>);
}

#[derive(Debug, Default)]
pub struct OverlaySyncLayer {
    style: OverlayStyle,
    frames_drawn: u64,
}

impl OverlaySyncLayer {
    pub fn new(style: OverlayStyle) -> Self {
        Self {
            style,
            frames_drawn: 0,
        }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Matrices for the rig as it is right now.
    pub fn frame(&self, rig: &CameraRig) -> OverlayFrame {
        let view = rig.view_matrix();
        let projection = rig.projection_matrix();
        let view_projection = projection * view;
        OverlayFrame {
            index: self.frames_drawn,
            eye: rig.eye(),
            forward: rig.pose().forward,
            view,
            projection,
            view_projection,
            inverse_view_projection: view_projection.inverse(),
            viewport: rig.viewport(),
            style: self.style,
        }
    }

    pub fn draw<C>(
        &mut self,
        rig: &CameraRig,
        backend: &mut dyn OverlayBackend<C>,
        deferred: &mut DeferredQueue<C>,
    ) -> OverlayFrame {
        let frame = self.frame(rig);
        backend.draw(&frame, deferred);
        self.frames_drawn += 1;
        frame
    }
}

/// Keeps the latest frame and rasterizes it on the CPU on request.
#[derive(Debug, Default)]
pub struct CpuOverlay {
    last: Option<OverlayFrame>,
}

impl CpuOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_frame(&self) -> Option<&OverlayFrame> {
        self.last.as_ref()
    }

    pub fn capture_png(&self, path: &Path) -> Result<(), OverlayError> {
        let frame = self.last.as_ref().ok_or(OverlayError::NoFrame)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let image = rasterize(frame);
        image.save_with_format(path, image::ImageFormat::Png)?;
        log::info!(
            "Overlay capture written to {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(())
    }
}

impl<C> OverlayBackend<C> for CpuOverlay {
    fn draw(&mut self, frame: &OverlayFrame, _deferred: &mut DeferredQueue<C>) {
        self.last = Some(*frame);
    }
}

pub fn rasterize(frame: &OverlayFrame) -> image::RgbaImage {
    let (width, height) = (frame.viewport.0.max(1), frame.viewport.1.max(1));
    // Pixel footprint at unit distance, from the projection's focal term.
    let focal = frame.projection.y_axis.y.abs().max(f32::EPSILON);
    let footprint = 2.0 / (focal * height as f32);
    image::RgbaImage::from_fn(width, height, |x, y| {
        let dir = frame.pixel_ray(x as f32 + 0.5, y as f32 + 0.5);
        let rgb = shade(frame, dir, footprint);
        image::Rgba([to_u8(rgb.x), to_u8(rgb.y), to_u8(rgb.z), 255])
    })
}

fn shade(frame: &OverlayFrame, dir: Vec3, footprint: f32) -> Vec3 {
    let style = &frame.style;
    let sky = Vec3::from(style.sky_horizon).lerp(Vec3::from(style.sky_zenith), dir.y.max(0.0).sqrt());
    if dir.y.abs() < 1e-6 {
        return sky;
    }
    let t = -frame.eye.y / dir.y;
    if t <= 0.0 {
        return sky;
    }
    let hit = frame.eye + dir * t;
    let fade = 1.0 - (t / style.fade_distance).clamp(0.0, 1.0);
    let width = style.line_px * footprint * t;

    let mut color = Vec3::from(style.ground);
    if let Some(major) = grid_line(hit.x, style, width).or(grid_line(hit.z, style, width)) {
        let line = if major {
            Vec3::from(style.grid_major)
        } else {
            Vec3::from(style.grid_minor)
        };
        color = color.lerp(line, fade);
    }
    if hit.z.abs() < width {
        color = color.lerp(Vec3::from(style.axis_x), fade);
    } else if hit.x.abs() < width {
        color = color.lerp(Vec3::from(style.axis_z), fade);
    }
    // Distant ground blends into the horizon.
    Vec3::from(style.sky_horizon).lerp(color, fade.max(0.25))
}

/// `Some(is_major)` when `coord` lies on a grid line.
fn grid_line(coord: f32, style: &OverlayStyle, width: f32) -> Option<bool> {
    let cells = coord / style.spacing;
    let nearest = cells.round();
    if (cells - nearest).abs() * style.spacing > width {
        return None;
    }
    let every = style.major_every.max(1) as i64;
    Some((nearest as i64).rem_euclid(every) == 0)
}

fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
