//! Editor configuration.
//!
//! Every section falls back to defaults, so a config file only has to name
//! what it changes.

use std::path::Path;

pub const CONFIG_ENV: &str = "SCENEWRIGHT_CONFIG";
pub const SCHEDULE_ENV: &str = "SCENEWRIGHT_SCHEDULE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct LensConfig {
    pub fov_deg: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for LensConfig {
    fn default() -> Self {
        Self {
            fov_deg: 45.0,
            near: 0.05,
            far: 1000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Radians per normalized drag unit.
    pub orbit_sensitivity: f32,
    /// Target travel per drag unit, as a fraction of the orbit distance.
    pub pan_sensitivity: f32,
    /// Log-space distance change per zoom unit.
    pub zoom_sensitivity: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub max_elevation_deg: f32,
    pub initial_distance: f32,
    pub initial_azimuth_deg: f32,
    pub initial_elevation_deg: f32,
    pub lens: LensConfig,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            orbit_sensitivity: 0.01,
            pan_sensitivity: 0.002,
            zoom_sensitivity: 0.1,
            min_distance: 0.1,
            max_distance: 500.0,
            max_elevation_deg: 89.0,
            initial_distance: 6.0,
            initial_azimuth_deg: 35.0,
            initial_elevation_deg: 25.0,
            lens: LensConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleMode {
    OnDemand,
    FixedRate,
}

impl ScheduleMode {
    /// Apple hosts drive the overlay from a display-rate timer; everything
    /// else redraws when something changed.
    pub fn platform_default() -> Self {
        if cfg!(any(target_os = "macos", target_os = "ios")) {
            ScheduleMode::FixedRate
        } else {
            ScheduleMode::OnDemand
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "on_demand" | "on-demand" | "ondemand" | "dirty" => Some(ScheduleMode::OnDemand),
            "fixed_rate" | "fixed-rate" | "fixed" | "timer" => Some(ScheduleMode::FixedRate),
            _ => None,
        }
    }
}

impl Default for ScheduleMode {
    fn default() -> Self {
        Self::platform_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub mode: ScheduleMode,
    pub tick_hz: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            mode: ScheduleMode::default(),
            tick_hz: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    /// Loaded models are scaled so their longest axis has this length.
    pub reference_size: f32,
    /// Half-size of the box shown for a model that failed to load.
    pub placeholder_extent: f32,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            reference_size: 1.0,
            placeholder_extent: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub tap_slop_px: f32,
    pub long_press_ms: u64,
    /// Screen pixels that make one normalized drag unit.
    pub drag_pixels_per_unit: f32,
    /// Zoom units per scroll line.
    pub scroll_line_units: f32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            tap_slop_px: 4.0,
            long_press_ms: 500,
            drag_pixels_per_unit: 1.0,
            scroll_line_units: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub camera: CameraConfig,
    pub schedule: ScheduleConfig,
    pub assets: AssetConfig,
    pub input: InputConfig,
}

impl EditorConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EditorConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Defaults, then the file named by `SCENEWRIGHT_CONFIG`, then the
    /// `SCENEWRIGHT_SCHEDULE` override.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => {
                log::info!("Loading editor config from {:?}", path);
                Self::load_from_file(Path::new(&path))?
            }
            None => Self::default(),
        };
        if let Ok(value) = std::env::var(SCHEDULE_ENV) {
            config.schedule.mode = ScheduleMode::parse(&value).ok_or_else(|| {
                ConfigError::InvalidValue(format!("{SCHEDULE_ENV}={value}"))
            })?;
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let camera = &self.camera;
        if !(camera.min_distance > 0.0) {
            return Err(ConfigError::InvalidValue(
                "camera.min_distance must be positive".to_string(),
            ));
        }
        if camera.min_distance > camera.max_distance {
            return Err(ConfigError::InvalidValue(
                "camera.min_distance exceeds camera.max_distance".to_string(),
            ));
        }
        if !(camera.max_elevation_deg > 0.0 && camera.max_elevation_deg < 90.0) {
            return Err(ConfigError::InvalidValue(
                "camera.max_elevation_deg must be inside (0, 90)".to_string(),
            ));
        }
        if !(camera.lens.near > 0.0 && camera.lens.near < camera.lens.far) {
            return Err(ConfigError::InvalidValue(
                "camera.lens needs 0 < near < far".to_string(),
            ));
        }
        if self.schedule.tick_hz == 0 {
            return Err(ConfigError::InvalidValue(
                "schedule.tick_hz must be non-zero".to_string(),
            ));
        }
        if !(self.assets.reference_size > 0.0) {
            return Err(ConfigError::InvalidValue(
                "assets.reference_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
