//! Compile-time defaults and persisted user settings.
//!
//! Constants are used directly by the engine; [`Settings`] carries the subset
//! a user may override through `scnodes.json` in the config directory.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::paths::{self, PathConfig};

/// Settings file name inside the config directory.
pub const SETTINGS_FILE: &str = "scnodes.json";

/// Edge length of one export tile in pixels.
pub const DEFAULT_TILE_SIZE: usize = 1024;

/// Pixel size (nm) assumed for frames that carry no calibration.
pub const DEFAULT_PIXEL_SIZE: f64 = 64.0;

/// Half edge of a scale/rotate gizmo icon, in screen pixels.
pub const GIZMO_ICON_HALF_SIZE: f64 = 6.0;
/// Distance between a frame corner and its scale gizmo centre, in screen pixels.
pub const GIZMO_SCALE_OFFSET: f64 = 8.0;
/// Distance between a frame corner and its rotate gizmo centre, in screen pixels.
pub const GIZMO_ROTATE_OFFSET: f64 = 26.0;
/// Half edge of the pivot and location markers, in screen pixels.
pub const GIZMO_MARKER_HALF_SIZE: f64 = 9.0;

/// Fraction of the smaller viewport dimension a focused frame fills.
pub const FOCUS_FOV_FRACTION: f64 = 0.8;

/// Depth range of the orthographic projection.
pub const CAMERA_Z_NEAR: f64 = -100.0;
pub const CAMERA_Z_FAR: f64 = 100.0;

/// Zoom limits for interactive zooming.
pub const CAMERA_MIN_ZOOM: f64 = 1.0e-6;
pub const CAMERA_MAX_ZOOM: f64 = 1.0e4;

/// Upper bound on the pixel count of one reconstruction raster (1 GiB of `f32`).
pub const MAX_RECONSTRUCTION_PIXELS: usize = 1 << 28;

/// Frames evaluated per batch during parallel export.
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// Maximum number of notifications kept by the error log.
pub const ERROR_LOG_CAPACITY: usize = 64;

/// User-overridable settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tile_size: usize,
    pub default_pixel_size: f64,
    pub batch_size: usize,
    /// Worker threads for batched export; 0 = `num_cpus * 3 / 4`.
    pub export_threads: usize,
    pub error_log_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            default_pixel_size: DEFAULT_PIXEL_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            export_threads: 0,
            error_log_capacity: ERROR_LOG_CAPACITY,
        }
    }
}

impl Settings {
    /// Load settings from the resolved config directory.
    ///
    /// Missing or unreadable files fall back to defaults with a warning.
    pub fn load(config: &PathConfig) -> Self {
        let path = paths::config_file(SETTINGS_FILE, config);
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Self::default();
        }
        match Self::from_file(&path) {
            Ok(settings) => {
                log::info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                log::warn!("Ignoring settings file {}: {:#}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let json = fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&json)?;
        Ok(settings.sanitized())
    }

    pub fn save(&self, config: &PathConfig) -> anyhow::Result<()> {
        paths::ensure_dirs(config)?;
        let path = paths::config_file(SETTINGS_FILE, config);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        log::info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Resolved worker count for batched export.
    pub fn export_threads(&self) -> usize {
        if self.export_threads > 0 {
            self.export_threads
        } else {
            (num_cpus::get() * 3 / 4).max(1)
        }
    }

    fn sanitized(mut self) -> Self {
        self.tile_size = self.tile_size.max(16);
        self.batch_size = self.batch_size.max(1);
        self.error_log_capacity = self.error_log_capacity.max(1);
        if !(self.default_pixel_size > 0.0) {
            self.default_pixel_size = DEFAULT_PIXEL_SIZE;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_roundtrip_and_sanitize() {
        let dir = std::env::temp_dir().join(format!("scnodes-cfg-{}", uuid::Uuid::new_v4()));
        let config = PathConfig { config_dir: Some(dir.clone()) };

        let settings = Settings { tile_size: 4, batch_size: 0, ..Settings::default() };
        settings.save(&config).unwrap();

        let loaded = Settings::load(&config);
        assert_eq!(loaded.tile_size, 16);
        assert_eq!(loaded.batch_size, 1);
        assert_eq!(loaded.default_pixel_size, DEFAULT_PIXEL_SIZE);

        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_settings_use_defaults() {
        let dir = std::env::temp_dir().join(format!("scnodes-none-{}", uuid::Uuid::new_v4()));
        let config = PathConfig { config_dir: Some(dir) };
        assert_eq!(Settings::load(&config), Settings::default());
    }
}
