//! World configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::EngineError;

/// Settings shared by the whole world.
///
/// Every field has a default, so a JSON document only needs the keys it
/// overrides:
///
/// ```
/// use tessel_engine::config::WorldConfig;
///
/// let config = WorldConfig::from_json_str(r#"{ "camera_zoom": 80.0 }"#).unwrap();
/// assert_eq!(config.camera_zoom, 80.0);
/// assert_eq!(config.movement_duration_ms, 250);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// How long one tile step takes, for the movement system and animations.
    pub movement_duration_ms: u64,
    /// Pixels per tile for the renderer.
    pub camera_zoom: f32,
    /// Map size in tiles, `[width, height]`.
    pub map_size: [u32; 2],
    /// Whether the world starts paused.
    pub start_paused: bool,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            movement_duration_ms: 250,
            camera_zoom: 64.0,
            map_size: [1, 1],
            start_paused: false,
        }
    }
}

impl WorldConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: WorldConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.movement_duration_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "movement_duration_ms must be positive".to_owned(),
            ));
        }
        if !(self.camera_zoom.is_finite() && self.camera_zoom > 0.0) {
            return Err(EngineError::InvalidConfig(format!(
                "camera_zoom must be positive and finite, got {}",
                self.camera_zoom
            )));
        }
        if self.map_size.contains(&0) {
            return Err(EngineError::InvalidConfig(format!(
                "map_size must be at least 1x1, got {}x{}",
                self.map_size[0], self.map_size[1]
            )));
        }
        Ok(())
    }

    pub fn movement_duration(&self) -> Duration {
        Duration::from_millis(self.movement_duration_ms)
    }
}
