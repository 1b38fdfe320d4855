use crate::config::{CameraConfig, LensConfig};
use crate::render::engine::{Aabb, CameraPose};
use crate::scene::CameraData;
use glam::{Mat4, Vec3};

/// Where gesture input goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionMode {
    /// Drags orbit/pan the camera, scroll zooms.
    #[default]
    Environment,
    /// Drags go to the selection gizmo; the camera is frozen.
    Entity,
}

impl InteractionMode {
    pub fn label(self) -> &'static str {
        match self {
            InteractionMode::Environment => "environment",
            InteractionMode::Entity => "entity",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lens {
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl From<LensConfig> for Lens {
    fn from(config: LensConfig) -> Self {
        Self {
            fov_deg: config.fov_deg,
            near: config.near,
            far: config.far,
        }
    }
}

impl From<CameraData> for Lens {
    fn from(data: CameraData) -> Self {
        Self {
            fov_deg: data.fov_deg,
            near: data.near,
            far: data.far,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraLimits {
    pub min_distance: f32,
    pub max_distance: f32,
    /// Radians.
    pub max_elevation: f32,
}

/// Orbit camera around a target point.
///
/// `distance`, `azimuth`, `elevation` and `target` are the only stored
/// state. The pose (eye and basis) is derived from them and refreshed by
/// every mutator before it returns, so any reader that comes after a call
/// sees a pose matching the parameters.
#[derive(Debug, Clone)]
pub struct CameraRig {
    distance: f32,
    azimuth: f32,
    elevation: f32,
    target: Vec3,
    limits: CameraLimits,
    orbit_sensitivity: f32,
    pan_sensitivity: f32,
    zoom_sensitivity: f32,
    mode: InteractionMode,
    lens: Lens,
    viewport: (u32, u32),
    pose: CameraPose,
}

impl CameraRig {
    pub fn new(config: &CameraConfig) -> Self {
        let limits = CameraLimits {
            min_distance: config.min_distance,
            max_distance: config.max_distance,
            max_elevation: config.max_elevation_deg.to_radians(),
        };
        let mut rig = Self {
            distance: config
                .initial_distance
                .clamp(limits.min_distance, limits.max_distance),
            azimuth: wrap_angle(config.initial_azimuth_deg.to_radians()),
            elevation: config
                .initial_elevation_deg
                .to_radians()
                .clamp(-limits.max_elevation, limits.max_elevation),
            target: Vec3::ZERO,
            limits,
            orbit_sensitivity: config.orbit_sensitivity,
            pan_sensitivity: config.pan_sensitivity,
            zoom_sensitivity: config.zoom_sensitivity,
            mode: InteractionMode::Environment,
            lens: config.lens.into(),
            viewport: (1280, 720),
            pose: CameraPose {
                eye: Vec3::Z,
                target: Vec3::ZERO,
                forward: Vec3::NEG_Z,
                right: Vec3::X,
                up: Vec3::Y,
            },
        };
        rig.refresh_pose();
        rig
    }

    pub fn distance(&self) -> f32 {
        self.distance
    }

    pub fn azimuth(&self) -> f32 {
        self.azimuth
    }

    pub fn elevation(&self) -> f32 {
        self.elevation
    }

    pub fn target(&self) -> Vec3 {
        self.target
    }

    pub fn limits(&self) -> CameraLimits {
        self.limits
    }

    pub fn max_elevation(&self) -> f32 {
        self.limits.max_elevation
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn lens(&self) -> Lens {
        self.lens
    }

    pub fn aspect(&self) -> f32 {
        self.viewport.0 as f32 / self.viewport.1 as f32
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    pub fn pose(&self) -> &CameraPose {
        &self.pose
    }

    pub fn eye(&self) -> Vec3 {
        self.pose.eye
    }

    /// The only mode transition.
    pub fn toggle_mode(&mut self) -> InteractionMode {
        self.mode = match self.mode {
            InteractionMode::Environment => InteractionMode::Entity,
            InteractionMode::Entity => InteractionMode::Environment,
        };
        log::debug!("Interaction mode -> {}", self.mode.label());
        self.mode
    }

    /// `dx` turns around the vertical axis, `dy` tilts. Elevation clamps at
    /// the limit instead of wrapping over the pole.
    pub fn orbit(&mut self, dx: f32, dy: f32) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        self.azimuth = wrap_angle(self.azimuth + dx * self.orbit_sensitivity);
        self.elevation = (self.elevation + dy * self.orbit_sensitivity)
            .clamp(-self.limits.max_elevation, self.limits.max_elevation);
        self.refresh_pose();
    }

    /// Moves the target along the current right/up basis. Travel scales with
    /// distance so a drag feels the same near and far.
    pub fn pan(&mut self, dx: f32, dy: f32) {
        if !dx.is_finite() || !dy.is_finite() {
            return;
        }
        let scale = self.pan_sensitivity * self.distance;
        self.target += (self.pose.right * dx + self.pose.up * dy) * scale;
        self.refresh_pose();
    }

    /// Positive `delta` moves closer. Scaling is exponential, so `zoom(d)`
    /// followed by `zoom(-d)` restores the distance unless a limit was hit.
    pub fn zoom(&mut self, delta: f32) {
        self.set_distance(self.distance * (-delta * self.zoom_sensitivity).exp());
    }

    /// Pinch: a factor above 1 moves closer.
    pub fn zoom_by_factor(&mut self, factor: f32) {
        if factor.is_finite() && factor > 0.0 {
            self.set_distance(self.distance / factor);
        }
    }

    pub fn set_distance(&mut self, distance: f32) {
        if !distance.is_nan() {
            self.distance = distance.clamp(self.limits.min_distance, self.limits.max_distance);
        }
        self.refresh_pose();
    }

    pub fn set_target(&mut self, target: Vec3) {
        if target.is_finite() {
            self.target = target;
        }
        self.refresh_pose();
    }

    pub fn set_lens(&mut self, lens: Lens) {
        self.lens = lens;
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.viewport = (width, height);
        }
    }

    /// Centers on `bounds` at a distance that fits them, keeping the current
    /// azimuth and elevation.
    pub fn frame_bounds(&mut self, bounds: &Aabb) {
        let radius = bounds.extent().max_element();
        let distance = if radius > 0.0 { radius * 3.0 } else { 3.0 };
        self.target = bounds.center();
        self.distance = distance.clamp(self.limits.min_distance, self.limits.max_distance);
        self.refresh_pose();
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.pose.eye, self.pose.target, self.pose.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.lens.fov_deg.to_radians(),
            self.aspect(),
            self.lens.near,
            self.lens.far,
        )
    }

    /// Size of one screen pixel at the target's depth, in world units.
    pub fn world_units_per_pixel(&self) -> f32 {
        let tan_half = (self.lens.fov_deg.to_radians() * 0.5).tan();
        2.0 * self.distance * tan_half / self.viewport.1 as f32
    }

    /// World-space ray through a pixel. `(0, 0)` is the top-left corner.
    pub fn screen_ray(&self, x: f32, y: f32, width: u32, height: u32) -> (Vec3, Vec3) {
        let width = width.max(1) as f32;
        let height = height.max(1) as f32;
        let ndc_x = 2.0 * x / width - 1.0;
        let ndc_y = 1.0 - 2.0 * y / height;
        let tan_half = (self.lens.fov_deg.to_radians() * 0.5).tan();
        let aspect = width / height;
        let dir = self.pose.forward
            + self.pose.right * (ndc_x * tan_half * aspect)
            + self.pose.up * (ndc_y * tan_half);
        (self.pose.eye, dir.normalize_or_zero())
    }

    pub fn describe(&self) -> String {
        format!(
            "az {:.0}° el {:.0}° dist {:.2}",
            self.azimuth.to_degrees(),
            self.elevation.to_degrees(),
            self.distance
        )
    }

    fn refresh_pose(&mut self) {
        let (sin_az, cos_az) = self.azimuth.sin_cos();
        let (sin_el, cos_el) = self.elevation.sin_cos();
        let offset = Vec3::new(sin_az * cos_el, sin_el, cos_az * cos_el) * self.distance;
        let eye = self.target + offset;
        let forward = (self.target - eye).normalize_or_zero();
        let right = forward.cross(Vec3::Y).normalize_or_zero();
        let up = right.cross(forward).normalize_or_zero();
        self.pose = CameraPose {
            eye,
            target: self.target,
            forward,
            right,
            up,
        };
    }
}

fn wrap_angle(angle: f32) -> f32 {
    const TWO_PI: f32 = std::f32::consts::PI * 2.0;
    if angle.is_finite() {
        (angle + std::f32::consts::PI).rem_euclid(TWO_PI) - std::f32::consts::PI
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::{CameraRig, InteractionMode};
    use crate::config::CameraConfig;
    use crate::render::engine::Aabb;
    use glam::Vec3;

    fn rig() -> CameraRig {
        CameraRig::new(&CameraConfig::default())
    }

    fn close(a: Vec3, b: Vec3) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn new_state_is_finite() {
        let rig = rig();
        assert!(rig.eye().is_finite());
        assert!(rig.pose().forward.is_finite());
        assert!((rig.distance() - 6.0).abs() < 1e-6);
    }

    #[test]
    fn orbit_round_trip_restores_position() {
        let mut rig = rig();
        let before = rig.eye();
        rig.orbit(37.0, -12.0);
        assert!(!close(rig.eye(), before));
        rig.orbit(-37.0, 12.0);
        assert!(close(rig.eye(), before));
    }

    #[test]
    fn orbit_clamps_elevation_exactly() {
        let mut rig = rig();
        rig.orbit(0.0, 10_000.0);
        assert_eq!(rig.elevation(), rig.max_elevation());
        rig.orbit(0.0, -1_000_000.0);
        assert_eq!(rig.elevation(), -rig.max_elevation());
    }

    #[test]
    fn non_finite_orbit_and_pan_are_ignored() {
        let mut rig = rig();
        let eye = rig.eye();
        let target = rig.target();
        rig.orbit(0.0, f32::NAN);
        rig.orbit(f32::INFINITY, 0.0);
        rig.pan(f32::NAN, 1.0);
        rig.pan(0.0, f32::NEG_INFINITY);
        assert!(close(rig.eye(), eye));
        assert!(close(rig.target(), target));

        rig.orbit(0.0, 0.1);
        assert!(rig.elevation().is_finite());
        assert!(rig.eye().is_finite());
    }

    #[test]
    fn zoom_is_reversible_in_log_space() {
        let mut rig = rig();
        let before = rig.distance();
        rig.zoom(3.0);
        assert!(rig.distance() < before);
        rig.zoom(-3.0);
        assert!((rig.distance().ln() - before.ln()).abs() < 1e-5);
    }

    #[test]
    fn zoom_clamps_to_limits() {
        let mut rig = rig();
        rig.zoom(1_000.0);
        assert_eq!(rig.distance(), rig.limits().min_distance);
        rig.zoom(-1_000.0);
        assert_eq!(rig.distance(), rig.limits().max_distance);
    }

    #[test]
    fn pose_matches_spherical_formula_after_every_call() {
        let mut rig = rig();
        rig.pan(10.0, -4.0);
        rig.orbit(5.0, 3.0);
        rig.zoom(0.5);
        let (az, el, d) = (rig.azimuth(), rig.elevation(), rig.distance());
        let expected =
            rig.target() + Vec3::new(az.sin() * el.cos(), el.sin(), az.cos() * el.cos()) * d;
        assert!(close(rig.eye(), expected));
        assert!(close(rig.pose().forward, (rig.target() - expected).normalize()));
    }

    #[test]
    fn pan_speed_scales_with_distance() {
        let mut near = rig();
        near.set_distance(2.0);
        let mut far = rig();
        far.set_distance(8.0);
        near.pan(10.0, 0.0);
        far.pan(10.0, 0.0);
        let ratio = far.target().length() / near.target().length();
        assert!((ratio - 4.0).abs() < 1e-4);
    }

    #[test]
    fn toggle_mode_flips_between_two_states() {
        let mut rig = rig();
        assert_eq!(rig.mode(), InteractionMode::Environment);
        assert_eq!(rig.toggle_mode(), InteractionMode::Entity);
        assert_eq!(rig.toggle_mode(), InteractionMode::Environment);
    }

    #[test]
    fn frame_bounds_preserves_orientation() {
        let mut rig = rig();
        rig.orbit(40.0, -20.0);
        let (az, el) = (rig.azimuth(), rig.elevation());
        rig.frame_bounds(&Aabb::new(Vec3::new(4.0, 0.0, 0.0), Vec3::new(6.0, 2.0, 2.0)));
        assert!((rig.azimuth() - az).abs() < 1e-6);
        assert!((rig.elevation() - el).abs() < 1e-6);
        assert!(close(rig.target(), Vec3::new(5.0, 1.0, 1.0)));
        assert!((rig.distance() - 3.0).abs() < 1e-5);
    }

    #[test]
    fn center_ray_points_at_target() {
        let rig = rig();
        let (origin, dir) = rig.screen_ray(400.0, 300.0, 800, 600);
        assert!(close(origin, rig.eye()));
        assert!(close(dir, rig.pose().forward));
    }
}
