//! Simulation configuration, loadable from JSON.

use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Error loading or validating a [`FluidConfig`].
#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    Io(std::io::Error),
    /// Config file is not valid JSON for this schema.
    Parse(serde_json::Error),
    /// Parsed values fail validation; carries a description.
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to read config: {e}"),
            ConfigError::Parse(e) => write!(f, "failed to parse config: {e}"),
            ConfigError::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// All tunable simulation parameters.
///
/// Every field has a default matching the reference tuning for a 2D
/// screen-space fluid, so a partial JSON file (or none at all) yields a
/// working system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FluidConfig {
    /// Number of particles. Fixed for the lifetime of the system.
    #[serde(default = "default_particle_count")]
    pub particle_count: usize,
    /// SPH smoothing radius in world units; also the spatial grid cell size.
    #[serde(default = "default_smoothing_radius")]
    pub smoothing_radius: f32,
    /// Rest density the pressure term pushes toward.
    #[serde(default = "default_target_density")]
    pub target_density: f32,
    /// Stiffness of the density-error pressure response.
    #[serde(default = "default_pressure_multiplier")]
    pub pressure_multiplier: f32,
    /// Stiffness of the short-range (near-density) repulsion.
    #[serde(default = "default_near_pressure_multiplier")]
    pub near_pressure_multiplier: f32,
    /// Constant acceleration applied to every particle each step.
    #[serde(default = "default_gravity")]
    pub gravity: [f32; 2],
    /// Velocity retained along the hit axis on a wall bounce, in (0, 1].
    #[serde(default = "default_collision_damping")]
    pub collision_damping: f32,
    /// Lower-left corner of the domain rectangle.
    #[serde(default)]
    pub bounds_origin: [f32; 2],
    /// Width and height of the domain rectangle.
    #[serde(default = "default_bounds_size")]
    pub bounds_size: [f32; 2],
}

fn default_particle_count() -> usize {
    1024
}
fn default_smoothing_radius() -> f32 {
    200.0
}
fn default_target_density() -> f32 {
    0.05
}
fn default_pressure_multiplier() -> f32 {
    0.05
}
fn default_near_pressure_multiplier() -> f32 {
    0.01
}
fn default_gravity() -> [f32; 2] {
    [0.0, -980.0]
}
fn default_collision_damping() -> f32 {
    0.95
}
fn default_bounds_size() -> [f32; 2] {
    [1280.0, 720.0]
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self {
            particle_count: default_particle_count(),
            smoothing_radius: default_smoothing_radius(),
            target_density: default_target_density(),
            pressure_multiplier: default_pressure_multiplier(),
            near_pressure_multiplier: default_near_pressure_multiplier(),
            gravity: default_gravity(),
            collision_damping: default_collision_damping(),
            bounds_origin: [0.0, 0.0],
            bounds_size: default_bounds_size(),
        }
    }
}

impl FluidConfig {
    /// Load and validate a config from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::Io)?;
        let config: Self = serde_json::from_str(&text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Check parameter ranges. Called by [`load`](Self::load); construct-
    /// by-hand callers should call it themselves.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.particle_count == 0 {
            return Err(ConfigError::Invalid("particle_count must be > 0".into()));
        }
        if !(self.smoothing_radius > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "smoothing_radius must be positive, got {}",
                self.smoothing_radius
            )));
        }
        if !(self.collision_damping > 0.0 && self.collision_damping <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "collision_damping must be in (0, 1], got {}",
                self.collision_damping
            )));
        }
        if !(self.bounds_size[0] > 0.0 && self.bounds_size[1] > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "bounds_size must be positive, got {:?}",
                self.bounds_size
            )));
        }
        if !(self.target_density >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "target_density must be non-negative, got {}",
                self.target_density
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        FluidConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_json_yields_defaults() {
        let config: FluidConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.particle_count, 1024);
        assert_eq!(config.smoothing_radius, 200.0);
        assert_eq!(config.collision_damping, 0.95);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config: FluidConfig =
            serde_json::from_str(r#"{"particle_count": 64, "smoothing_radius": 1.5}"#).unwrap();
        assert_eq!(config.particle_count, 64);
        assert_eq!(config.smoothing_radius, 1.5);
        assert_eq!(config.target_density, 0.05);
    }

    #[test]
    fn rejects_zero_particles() {
        let config = FluidConfig {
            particle_count: 0,
            ..FluidConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_bad_damping() {
        for damping in [0.0, -0.5, 1.5, f32::NAN] {
            let config = FluidConfig {
                collision_damping: damping,
                ..FluidConfig::default()
            };
            assert!(
                config.validate().is_err(),
                "damping {damping} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_negative_radius() {
        let config = FluidConfig {
            smoothing_radius: -1.0,
            ..FluidConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let config = FluidConfig {
            particle_count: 256,
            gravity: [0.0, -9.81],
            ..FluidConfig::default()
        };
        let text = serde_json::to_string(&config).unwrap();
        let back: FluidConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.particle_count, 256);
        assert_eq!(back.gravity, [0.0, -9.81]);
    }
}
