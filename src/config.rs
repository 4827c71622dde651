//! Editor configuration.
//!
//! Settings are read from an optional JSON file. Every field has a default,
//! so a partial file (or none at all) is valid.

use std::path::Path;

use egui::Vec2;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::DEFAULT_COLOR;
use crate::transform::DEFAULT_FIT_MARGIN;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Size of the drawing stage in points
    pub viewport_width: f32,
    pub viewport_height: f32,

    /// Initial draw color
    pub default_color: String,

    /// Share of the viewport a freshly fitted image occupies
    pub fit_margin: f32,

    pub min_zoom: f32,
    pub max_zoom: f32,

    pub log_level: LogLevel,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1200.0,
            viewport_height: 700.0,
            default_color: DEFAULT_COLOR.to_string(),
            fit_margin: DEFAULT_FIT_MARGIN,
            min_zoom: 0.1,
            max_zoom: 10.0,
            log_level: LogLevel::default(),
        }
    }
}

impl EditorConfig {
    pub fn viewport(&self) -> Vec2 {
        Vec2::new(self.viewport_width, self.viewport_height)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = |v: f32| v.is_finite() && v > 0.0;

        if !(positive(self.viewport_width) && positive(self.viewport_height)) {
            return Err(ConfigError::InvalidViewport {
                width: self.viewport_width,
                height: self.viewport_height,
            });
        }
        if !(positive(self.min_zoom) && positive(self.max_zoom) && self.min_zoom <= self.max_zoom)
        {
            return Err(ConfigError::InvalidZoom {
                min: self.min_zoom,
                max: self.max_zoom,
            });
        }
        if !(positive(self.fit_margin) && self.fit_margin <= 1.0) {
            return Err(ConfigError::InvalidFitMargin(self.fit_margin));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = EditorConfig::from_json("{}").unwrap();
        assert_eq!(config, EditorConfig::default());
        assert_eq!(config.viewport(), Vec2::new(1200.0, 700.0));
    }

    #[test]
    fn test_partial_override() {
        let config =
            EditorConfig::from_json(r##"{"default_color":"#2196F3","log_level":"debug"}"##)
                .unwrap();
        assert_eq!(config.default_color, "#2196F3");
        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.viewport_width, 1200.0);
    }

    #[test]
    fn test_rejects_bad_viewport() {
        let err = EditorConfig::from_json(r#"{"viewport_width":0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidViewport { .. }));
    }

    #[test]
    fn test_rejects_inverted_zoom() {
        let err = EditorConfig::from_json(r#"{"min_zoom":5.0,"max_zoom":1.0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidZoom { .. }));

        let err = EditorConfig::from_json(r#"{"min_zoom":0.0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidZoom { .. }));
    }

    #[test]
    fn test_accepts_fixed_zoom() {
        let config = EditorConfig::from_json(r#"{"min_zoom":2.0,"max_zoom":2.0}"#).unwrap();
        assert_eq!(1.1f32.clamp(config.min_zoom, config.max_zoom), 2.0);
    }

    #[test]
    fn test_rejects_zero_fit_margin() {
        let err = EditorConfig::from_json(r#"{"fit_margin":0.0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFitMargin(_)));

        let err = EditorConfig::from_json(r#"{"fit_margin":1.5}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFitMargin(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = EditorConfig::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("editor.json");
        std::fs::write(&path, r#"{"viewport_width":800,"viewport_height":600}"#).unwrap();
        let config = EditorConfig::load(&path).unwrap();
        assert_eq!(config.viewport(), Vec2::new(800.0, 600.0));
    }
}
