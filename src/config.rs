//! Viewer configuration, persisted as YAML (or JSON by file extension).

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::view::ViewSettings;
use crate::error::ConfigError;
use crate::render::style::Style;

/// Render scheduler and compositor tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Bounded wait of the scheduling thread between checks.
    pub wake_timeout_ms: u64,
    /// Upper bound of the repaint rate limit.
    pub max_rate_limit_ms: u64,
    /// Rate limit as a multiple of the last paint duration.
    pub rate_limit_factor: f64,
    /// Number of paint durations in the rolling average.
    pub timing_window: usize,
    /// A paint faster than this share of the average resets the average.
    pub regime_change_ratio: f64,
    /// Share of the paint interval above which a paint counts as overtime.
    pub overtime_ratio: f64,
    /// Paint groups concurrently into private pixmaps.
    pub group_parallel: bool,
    /// Worker threads for view calculation; 0 uses the global rayon pool.
    pub calc_threads: usize,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            wake_timeout_ms: 16,
            max_rate_limit_ms: 1000,
            rate_limit_factor: 2.0,
            timing_window: 30,
            regime_change_ratio: 0.25,
            overtime_ratio: 0.5,
            group_parallel: true,
            calc_threads: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub render: RenderSettings,
    /// Style preset: "dark", "light" or "high_contrast".
    pub style: String,
    /// Settings given to newly created views.
    pub view_defaults: ViewSettings,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            render: RenderSettings::default(),
            style: "dark".to_string(),
            view_defaults: ViewSettings::default(),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

impl ViewerConfig {
    pub fn style(&self) -> Style {
        Style::from_name(&self.style)
    }

    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home = std::env::var_os("HOME").ok_or(ConfigError::NoHome)?;
        Ok(PathBuf::from(home).join(".scopeview").join("viewer.yaml"))
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<ViewerConfig, ConfigError> {
        let path = path.as_ref();
        let s = fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        let config = if is_json(path) { serde_json::from_str(&s)? } else { serde_yaml::from_str(&s)? };
        Ok(config)
    }

    /// Load `~/.scopeview/viewer.yaml`, or the defaults if it is missing or broken.
    pub fn load_from_default_path() -> ViewerConfig {
        let path = match Self::default_path() {
            Ok(path) => path,
            Err(e) => {
                log::debug!("{e}; using default viewer config");
                return ViewerConfig::default();
            }
        };
        if !path.exists() {
            return ViewerConfig::default();
        }
        match Self::load_from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("ignoring {}: {e}", path.display());
                ViewerConfig::default()
            }
        }
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let io_err = |source| ConfigError::Io { path: path.display().to_string(), source };
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(io_err)?;
        }
        let s = if is_json(path) { serde_json::to_string_pretty(self)? } else { serde_yaml::to_string(self)? };
        let mut f = fs::File::create(path).map_err(io_err)?;
        f.write_all(s.as_bytes()).map_err(io_err)?;
        Ok(())
    }

    pub fn save_to_default_path(&self) -> Result<(), ConfigError> {
        self.save_to_path(Self::default_path()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::trigger::TriggerMode;

    #[test]
    fn partial_yaml_fills_defaults() {
        let yaml = "render:\n  wake_timeout_ms: 5\nview_defaults:\n  trigger_mode: RisingAuto\n  zoom: 0.5\n";
        let config: ViewerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.render.wake_timeout_ms, 5);
        assert_eq!(config.render.max_rate_limit_ms, 1000);
        assert_eq!(config.view_defaults.trigger_mode, TriggerMode::RisingAuto);
        assert_eq!(config.view_defaults.zoom, 0.5);
        assert!(config.view_defaults.visible);
        assert_eq!(config.style(), Style::dark());
    }

    #[test]
    fn save_and_load_by_extension() {
        let dir = std::env::temp_dir().join(format!("scopeview-config-{}", std::process::id()));
        let mut config = ViewerConfig::default();
        config.style = "light".into();
        config.render.group_parallel = false;
        for name in ["viewer.yaml", "viewer.json"] {
            let path = dir.join(name);
            config.save_to_path(&path).unwrap();
            assert_eq!(ViewerConfig::load_from_path(&path).unwrap(), config);
        }
        let json = fs::read_to_string(dir.join("viewer.json")).unwrap();
        assert!(json.trim_start().starts_with('{'));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = ViewerConfig::load_from_path("/nonexistent/scopeview.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
