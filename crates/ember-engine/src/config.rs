//! Engine configuration.
//!
//! [`EngineConfig`] is a plain serde struct passed explicitly to every system
//! through the per-frame [`FrameContext`](crate::schedule::FrameContext).
//! It can also be built from (and updated by) a flat key/value map, which is
//! how an external configuration source hands values to the engine:
//!
//! ```
//! use ember_engine::config::EngineConfig;
//! use serde_json::json;
//!
//! let flat = json!({"max_velocity": 400.0, "world_max_x": 640.0, "world_max_y": 480.0});
//! let config = EngineConfig::from_flat(flat.as_object().unwrap()).unwrap();
//! assert_eq!(config.max_velocity, 400.0);
//! assert_eq!(config.world_bounds.unwrap().max_x, 640.0);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("configuration key '{key}' expects {expected}, got {found}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: String,
    },

    #[error("configuration value '{key}' out of range: {reason}")]
    OutOfRange { key: String, reason: String },
}

// ---------------------------------------------------------------------------
// WorldBounds
// ---------------------------------------------------------------------------

/// Axis-aligned rectangle entities are kept inside.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            min_y: 0.0,
            max_x: 800.0,
            max_y: 600.0,
        }
    }
}

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Speed limit for velocities that do not set their own.
    pub max_velocity: f64,
    /// Velocity components below this magnitude snap to zero.
    pub min_velocity: f64,
    pub gravity_x: f64,
    pub gravity_y: f64,
    /// Retention factor per 60 Hz frame for velocities that do not set their own.
    pub default_drag: f64,
    /// Positions are clamped component-wise to `[-max_position, max_position]`.
    pub max_position: f64,
    pub grid_cell_size: f64,
    /// Seconds between forced spatial grid rebuilds.
    pub grid_rebuild_interval: f64,
    pub world_bounds: Option<WorldBounds>,
    pub entity_pool_capacity: usize,
    pub component_pool_capacity: usize,
    pub template_pool_capacity: usize,
    pub pooling_enabled: bool,
    pub min_dt: f64,
    pub max_dt: f64,
    pub frame_budget_ms: f64,
    /// Seconds of simulated time between diagnostic summaries.
    pub diagnostics_interval: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_velocity: 1000.0,
            min_velocity: 0.01,
            gravity_x: 0.0,
            gravity_y: 0.0,
            default_drag: 1.0,
            max_position: 1.0e6,
            grid_cell_size: 64.0,
            grid_rebuild_interval: 0.1,
            world_bounds: None,
            entity_pool_capacity: 1000,
            component_pool_capacity: 500,
            template_pool_capacity: 100,
            pooling_enabled: true,
            min_dt: 0.001,
            max_dt: 0.033,
            frame_budget_ms: 16.67,
            diagnostics_interval: 5.0,
        }
    }
}

impl EngineConfig {
    /// Build a config from a flat key/value map. Keys not present keep their
    /// defaults.
    pub fn from_flat(map: &serde_json::Map<String, Value>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for (key, value) in map {
            config.set_flat(key, value)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Set a single flat key. Does not validate the resulting config.
    ///
    /// World bounds use `world_min_x`, `world_min_y`, `world_max_x` and
    /// `world_max_y`; setting any of them to `null` removes the bounds.
    pub fn set_flat(&mut self, key: &str, value: &Value) -> Result<(), ConfigError> {
        match key {
            "max_velocity" => self.max_velocity = as_f64(key, value)?,
            "min_velocity" => self.min_velocity = as_f64(key, value)?,
            "gravity_x" => self.gravity_x = as_f64(key, value)?,
            "gravity_y" => self.gravity_y = as_f64(key, value)?,
            "default_drag" => self.default_drag = as_f64(key, value)?,
            "max_position" => self.max_position = as_f64(key, value)?,
            "grid_cell_size" => self.grid_cell_size = as_f64(key, value)?,
            "grid_rebuild_interval" => self.grid_rebuild_interval = as_f64(key, value)?,
            "entity_pool_capacity" => self.entity_pool_capacity = as_usize(key, value)?,
            "component_pool_capacity" => self.component_pool_capacity = as_usize(key, value)?,
            "template_pool_capacity" => self.template_pool_capacity = as_usize(key, value)?,
            "pooling_enabled" => {
                self.pooling_enabled = value.as_bool().ok_or_else(|| wrong_type(key, "a boolean", value))?;
            }
            "min_dt" => self.min_dt = as_f64(key, value)?,
            "max_dt" => self.max_dt = as_f64(key, value)?,
            "frame_budget_ms" => self.frame_budget_ms = as_f64(key, value)?,
            "diagnostics_interval" => self.diagnostics_interval = as_f64(key, value)?,
            "world_min_x" | "world_min_y" | "world_max_x" | "world_max_y" => {
                if value.is_null() {
                    self.world_bounds = None;
                    return Ok(());
                }
                let v = as_f64(key, value)?;
                let bounds = self.world_bounds.get_or_insert_with(WorldBounds::default);
                match key {
                    "world_min_x" => bounds.min_x = v,
                    "world_min_y" => bounds.min_y = v,
                    "world_max_x" => bounds.max_x = v,
                    _ => bounds.max_y = v,
                }
            }
            _ => return Err(ConfigError::UnknownKey(key.to_owned())),
        }
        Ok(())
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("max_velocity", self.max_velocity)?;
        non_negative("min_velocity", self.min_velocity)?;
        finite("gravity_x", self.gravity_x)?;
        finite("gravity_y", self.gravity_y)?;
        if !(self.default_drag > 0.0 && self.default_drag <= 1.0) {
            return Err(out_of_range("default_drag", format!("must be in (0, 1], got {}", self.default_drag)));
        }
        positive("max_position", self.max_position)?;
        positive("grid_cell_size", self.grid_cell_size)?;
        non_negative("grid_rebuild_interval", self.grid_rebuild_interval)?;
        positive("min_dt", self.min_dt)?;
        positive("max_dt", self.max_dt)?;
        if self.min_dt > self.max_dt {
            return Err(out_of_range(
                "min_dt",
                format!("min_dt {} exceeds max_dt {}", self.min_dt, self.max_dt),
            ));
        }
        positive("frame_budget_ms", self.frame_budget_ms)?;
        positive("diagnostics_interval", self.diagnostics_interval)?;
        if let Some(b) = &self.world_bounds {
            for (key, v) in [("world_min_x", b.min_x), ("world_min_y", b.min_y), ("world_max_x", b.max_x), ("world_max_y", b.max_y)] {
                finite(key, v)?;
            }
            if !(b.min_x < b.max_x && b.min_y < b.max_y) {
                return Err(out_of_range(
                    "world_bounds",
                    format!("empty rectangle ({}, {})..({}, {})", b.min_x, b.min_y, b.max_x, b.max_y),
                ));
            }
        }
        Ok(())
    }

    /// Clamp a frame delta into `[min_dt, max_dt]`. Non-finite values become
    /// `min_dt`.
    pub fn clamp_dt(&self, dt: f64) -> f64 {
        if !dt.is_finite() {
            return self.min_dt;
        }
        dt.clamp(self.min_dt, self.max_dt)
    }
}

fn as_f64(key: &str, value: &Value) -> Result<f64, ConfigError> {
    value.as_f64().ok_or_else(|| wrong_type(key, "a number", value))
}

fn as_usize(key: &str, value: &Value) -> Result<usize, ConfigError> {
    value
        .as_u64()
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| wrong_type(key, "a non-negative integer", value))
}

fn wrong_type(key: &str, expected: &'static str, value: &Value) -> ConfigError {
    ConfigError::WrongType {
        key: key.to_owned(),
        expected,
        found: value.to_string(),
    }
}

fn out_of_range(key: &str, reason: String) -> ConfigError {
    ConfigError::OutOfRange {
        key: key.to_owned(),
        reason,
    }
}

fn finite(key: &str, v: f64) -> Result<(), ConfigError> {
    if v.is_finite() {
        Ok(())
    } else {
        Err(out_of_range(key, format!("must be finite, got {v}")))
    }
}

fn positive(key: &str, v: f64) -> Result<(), ConfigError> {
    if v.is_finite() && v > 0.0 {
        Ok(())
    } else {
        Err(out_of_range(key, format!("must be positive, got {v}")))
    }
}

fn non_negative(key: &str, v: f64) -> Result<(), ConfigError> {
    if v.is_finite() && v >= 0.0 {
        Ok(())
    } else {
        Err(out_of_range(key, format!("must be non-negative, got {v}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
