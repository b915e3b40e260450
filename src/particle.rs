//! Struct-of-arrays particle storage.

use glam::Vec2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::FluidConfig;

/// Spawn lattice extent in world units (square region centered in the
/// domain).
const SPAWN_EXTENT: f32 = 500.0;

/// Magnitude of the random jitter applied to each spawn position.
const SPAWN_JITTER: f32 = 4.0;

/// All per-particle state, stored as parallel arrays so each field uploads
/// to the GPU as one contiguous slice.
///
/// Array lengths are fixed at construction and never change; the per-frame
/// pipeline mutates them in place.
#[derive(Debug, Clone)]
pub struct ParticleArrays {
    /// World-space positions.
    pub positions: Vec<Vec2>,
    /// Look-ahead positions used for neighbor search and force evaluation.
    pub predicted: Vec<Vec2>,
    /// Velocities.
    pub velocities: Vec<Vec2>,
    /// SPH densities from the last density pass.
    pub densities: Vec<f32>,
    /// Near-density (short-range repulsion) terms.
    pub near_densities: Vec<f32>,
}

impl ParticleArrays {
    /// Allocate zeroed storage for `count` particles.
    pub fn new(count: usize) -> Self {
        Self {
            positions: vec![Vec2::ZERO; count],
            predicted: vec![Vec2::ZERO; count],
            velocities: vec![Vec2::ZERO; count],
            densities: vec![0.0; count],
            near_densities: vec![0.0; count],
        }
    }

    /// Number of particles.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// True when the system holds no particles.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Spawn particles on a centered square lattice with a small
    /// deterministic jitter (seeded RNG, so runs are reproducible).
    ///
    /// The lattice is roughly `sqrt(N)` per side, centered in the config's
    /// domain rectangle. Predicted positions start equal to positions,
    /// velocities zero.
    pub fn spawn_grid(config: &FluidConfig) -> Self {
        let count = config.particle_count;
        let mut arrays = Self::new(count);
        let mut rng = StdRng::seed_from_u64(0);

        let center = Vec2::new(
            config.bounds_origin[0] + config.bounds_size[0] / 2.0,
            config.bounds_origin[1] + config.bounds_size[1] / 2.0,
        );

        let per_row = (count as f32).sqrt().ceil() as usize;
        let rows = count.div_ceil(per_row);

        for i in 0..count {
            let x = i % per_row;
            let y = i / per_row;
            // Normalized lattice coordinate in [0, 1]; a single row or
            // column sits at the center.
            let tx = if per_row <= 1 {
                0.5
            } else {
                x as f32 / (per_row - 1) as f32
            };
            let ty = if rows <= 1 {
                0.5
            } else {
                y as f32 / (rows - 1) as f32
            };

            let lattice = Vec2::new((tx - 0.5) * SPAWN_EXTENT, (ty - 0.5) * SPAWN_EXTENT);
            let angle = rng.random_range(0.0..std::f32::consts::TAU);
            let jitter = Vec2::from_angle(angle) * rng.random_range(0.0..SPAWN_JITTER);

            arrays.positions[i] = center + lattice + jitter;
            arrays.predicted[i] = arrays.positions[i];
        }

        arrays
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(count: usize) -> FluidConfig {
        FluidConfig {
            particle_count: count,
            ..FluidConfig::default()
        }
    }

    #[test]
    fn new_is_zeroed() {
        let arrays = ParticleArrays::new(8);
        assert_eq!(arrays.len(), 8);
        assert!(arrays.velocities.iter().all(|v| *v == Vec2::ZERO));
        assert!(arrays.densities.iter().all(|d| *d == 0.0));
    }

    #[test]
    fn spawn_centers_particles_in_domain() {
        let config = test_config(100);
        let arrays = ParticleArrays::spawn_grid(&config);

        let center = Vec2::new(
            config.bounds_origin[0] + config.bounds_size[0] / 2.0,
            config.bounds_origin[1] + config.bounds_size[1] / 2.0,
        );
        let mean = arrays.positions.iter().sum::<Vec2>() / arrays.len() as f32;
        assert!(
            (mean - center).length() < 20.0,
            "spawn mean {mean} far from domain center {center}"
        );
    }

    #[test]
    fn spawn_is_deterministic() {
        let config = test_config(25);
        let a = ParticleArrays::spawn_grid(&config);
        let b = ParticleArrays::spawn_grid(&config);
        assert_eq!(a.positions, b.positions);
    }

    #[test]
    fn spawn_initializes_predicted_and_velocities() {
        let arrays = ParticleArrays::spawn_grid(&test_config(16));
        assert_eq!(arrays.positions, arrays.predicted);
        assert!(arrays.velocities.iter().all(|v| *v == Vec2::ZERO));
    }

    #[test]
    fn spawn_positions_are_distinct() {
        let arrays = ParticleArrays::spawn_grid(&test_config(64));
        for i in 0..arrays.len() {
            for j in (i + 1)..arrays.len() {
                assert_ne!(
                    arrays.positions[i], arrays.positions[j],
                    "particles {i} and {j} spawned coincident"
                );
            }
        }
    }
}
