//! Per-frame simulation pipeline.
//!
//! [`ParticleSystem::simulate`] runs the fixed step order: external forces,
//! spatial rebuild, density pass, pressure pass, integration, boundary
//! resolution. The two physics passes go through a [`ComputeBackend`] so the
//! same pipeline drives either the CPU reference implementation or the GPU
//! compute kernels.

use glam::Vec2;
use tracing::info;

use crate::boundary::BoundaryRect;
use crate::config::{ConfigError, FluidConfig};
use crate::particle::ParticleArrays;
use crate::spatial::SpatialHashMap;
use crate::sph::{
    density_kernel, density_kernel_derivative, near_density_kernel,
    near_density_kernel_derivative, KernelCoefficients,
};
use crate::SimError;

/// Position look-ahead applied before neighbor search, independent of the
/// frame dt.
const PREDICTION_FACTOR: f32 = 1.0 / 120.0;

/// Fallback force direction for exactly coincident particle pairs.
const COINCIDENT_DIR: Vec2 = Vec2::new(0.0, 1.0);

/// Per-step parameters handed to the physics backends.
#[derive(Debug, Clone, Copy)]
pub struct StepParams {
    /// Frame time step in seconds.
    pub dt: f32,
    /// SPH smoothing radius.
    pub smoothing_radius: f32,
    /// Rest density.
    pub target_density: f32,
    /// Pressure stiffness.
    pub pressure_multiplier: f32,
    /// Near-pressure stiffness.
    pub near_pressure_multiplier: f32,
    /// Precomputed kernel normalization factors.
    pub coeffs: KernelCoefficients,
}

/// The two per-frame physics passes.
///
/// Both passes read predicted positions and the rebuilt spatial index.
/// `compute_densities` fills the density arrays; `apply_pressure` reads them
/// and updates velocities in place.
pub trait ComputeBackend {
    /// Accumulate density and near-density for every particle.
    fn compute_densities(
        &mut self,
        spatial: &SpatialHashMap,
        particles: &mut ParticleArrays,
        params: &StepParams,
    ) -> Result<(), SimError>;

    /// Convert densities to pressures and apply the pairwise pressure force
    /// to velocities.
    fn apply_pressure(
        &mut self,
        spatial: &SpatialHashMap,
        particles: &mut ParticleArrays,
        params: &StepParams,
    ) -> Result<(), SimError>;
}

/// Single-threaded reference backend. Always available; the GPU path is
/// validated against it.
#[derive(Debug, Default)]
pub struct CpuBackend;

/// Density error to pressure.
#[inline]
fn density_to_pressure(density: f32, params: &StepParams) -> f32 {
    (density - params.target_density) * params.pressure_multiplier
}

/// Near-density to near-pressure. No rest term: the near force only ever
/// repels.
#[inline]
fn near_density_to_pressure(near_density: f32, params: &StepParams) -> f32 {
    near_density * params.near_pressure_multiplier
}

impl ComputeBackend for CpuBackend {
    fn compute_densities(
        &mut self,
        spatial: &SpatialHashMap,
        particles: &mut ParticleArrays,
        params: &StepParams,
    ) -> Result<(), SimError> {
        let radius = params.smoothing_radius;
        for i in 0..particles.len() {
            let mut density = 0.0;
            let mut near_density = 0.0;
            // Pair sums only: a particle with no neighbors in range keeps
            // density exactly zero.
            spatial.for_each_neighbor(i, &particles.predicted, radius, |j, d2| {
                if j == i {
                    return;
                }
                let dst = d2.sqrt();
                density += density_kernel(dst, radius, &params.coeffs);
                near_density += near_density_kernel(dst, radius, &params.coeffs);
            });
            particles.densities[i] = density;
            particles.near_densities[i] = near_density;
        }
        Ok(())
    }

    fn apply_pressure(
        &mut self,
        spatial: &SpatialHashMap,
        particles: &mut ParticleArrays,
        params: &StepParams,
    ) -> Result<(), SimError> {
        let radius = params.smoothing_radius;
        for i in 0..particles.len() {
            let density_i = particles.densities[i];
            if density_i <= 0.0 {
                continue;
            }
            let pressure_i = density_to_pressure(density_i, params);
            let near_pressure_i = near_density_to_pressure(particles.near_densities[i], params);
            let pos_i = particles.predicted[i];

            let mut force = Vec2::ZERO;
            spatial.for_each_neighbor(i, &particles.predicted, radius, |j, d2| {
                if j == i {
                    return;
                }
                let density_j = particles.densities[j];
                if density_j <= 0.0 {
                    return;
                }
                let dst = d2.sqrt();
                let dir = if dst > 0.0 {
                    (particles.predicted[j] - pos_i) / dst
                } else {
                    COINCIDENT_DIR
                };

                // Symmetric shared pressure keeps the pair force equal and
                // opposite.
                let shared_pressure = (pressure_i + density_to_pressure(density_j, params)) / 2.0;
                let shared_near = (near_pressure_i
                    + near_density_to_pressure(particles.near_densities[j], params))
                    / 2.0;

                force += dir
                    * density_kernel_derivative(dst, radius, &params.coeffs)
                    * shared_pressure
                    / density_j;

                let near_density_j = particles.near_densities[j];
                if near_density_j > 0.0 {
                    force += dir
                        * near_density_kernel_derivative(dst, radius, &params.coeffs)
                        * shared_near
                        / near_density_j;
                }
            });

            particles.velocities[i] += force / density_i * params.dt;
        }
        Ok(())
    }
}

/// The fluid system: particle state, spatial index, boundary, and backend.
pub struct ParticleSystem {
    config: FluidConfig,
    coeffs: KernelCoefficients,
    particles: ParticleArrays,
    spatial: SpatialHashMap,
    bounds: BoundaryRect,
    backend: Box<dyn ComputeBackend>,
    /// dt of the most recent step; used as the impulse window when the
    /// boundary moves.
    last_dt: f32,
}

impl ParticleSystem {
    /// Build a system with the CPU reference backend.
    pub fn new(config: FluidConfig) -> Result<Self, ConfigError> {
        Self::with_backend(config, Box::new(CpuBackend))
    }

    /// Build a system with an explicit backend (e.g. a GPU backend the
    /// caller constructed and can fall back from).
    pub fn with_backend(
        config: FluidConfig,
        backend: Box<dyn ComputeBackend>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let particles = ParticleArrays::spawn_grid(&config);
        let spatial = SpatialHashMap::new(config.particle_count);
        let bounds = BoundaryRect::new(
            Vec2::from(config.bounds_origin),
            Vec2::from(config.bounds_size),
        );
        let coeffs = KernelCoefficients::from_radius(config.smoothing_radius);

        info!(
            particles = config.particle_count,
            smoothing_radius = config.smoothing_radius,
            "particle system initialized"
        );

        Ok(Self {
            config,
            coeffs,
            particles,
            spatial,
            bounds,
            backend,
            last_dt: 0.0,
        })
    }

    /// Advance the simulation by `dt` seconds.
    pub fn simulate(&mut self, dt: f32) -> Result<(), SimError> {
        let gravity = Vec2::from(self.config.gravity);

        // External forces and position prediction.
        for i in 0..self.particles.len() {
            self.particles.velocities[i] += gravity * dt;
            self.particles.predicted[i] =
                self.particles.positions[i] + self.particles.velocities[i] * PREDICTION_FACTOR;
        }

        self.spatial
            .rebuild(&self.particles.predicted, self.config.smoothing_radius);

        let params = self.step_params(dt);
        self.backend
            .compute_densities(&self.spatial, &mut self.particles, &params)?;
        self.backend
            .apply_pressure(&self.spatial, &mut self.particles, &params)?;

        // Integrate and keep everything inside the boundary.
        for i in 0..self.particles.len() {
            let vel = self.particles.velocities[i];
            self.particles.positions[i] += vel * dt;
            self.bounds.resolve_collision(
                &mut self.particles.positions[i],
                &mut self.particles.velocities[i],
                self.config.collision_damping,
            );
        }

        self.last_dt = dt;
        Ok(())
    }

    fn step_params(&self, dt: f32) -> StepParams {
        StepParams {
            dt,
            smoothing_radius: self.config.smoothing_radius,
            target_density: self.config.target_density,
            pressure_multiplier: self.config.pressure_multiplier,
            near_pressure_multiplier: self.config.near_pressure_multiplier,
            coeffs: self.coeffs,
        }
    }

    /// Move the boundary rectangle's origin. Particles stranded outside are
    /// clamped back in and receive the displacement as a velocity impulse.
    pub fn set_window_position(&mut self, x: f32, y: f32) {
        self.bounds.origin = Vec2::new(x, y);
        self.absorb_displaced();
    }

    /// Resize the boundary rectangle.
    pub fn update_screen_size(&mut self, width: f32, height: f32) {
        self.bounds.size = Vec2::new(width, height);
        self.absorb_displaced();
    }

    fn absorb_displaced(&mut self) {
        for i in 0..self.particles.len() {
            self.bounds.absorb_displaced(
                &mut self.particles.positions[i],
                &mut self.particles.velocities[i],
                self.last_dt,
            );
        }
    }

    /// Number of particles.
    pub fn count(&self) -> usize {
        self.particles.len()
    }

    /// World-space positions after the last step.
    pub fn positions(&self) -> &[Vec2] {
        &self.particles.positions
    }

    /// Velocities after the last step.
    pub fn velocities(&self) -> &[Vec2] {
        &self.particles.velocities
    }

    /// Densities from the last density pass.
    pub fn densities(&self) -> &[f32] {
        &self.particles.densities
    }

    /// Near-densities from the last density pass.
    pub fn near_densities(&self) -> &[f32] {
        &self.particles.near_densities
    }

    /// Per-particle spatial cell keys, for debug coloring. Borrowed from
    /// storage the spatial index reuses across frames.
    pub fn cell_keys(&self) -> &[f32] {
        self.spatial.cell_keys()
    }

    /// The current boundary rectangle.
    pub fn bounds(&self) -> BoundaryRect {
        self.bounds
    }

    /// The active configuration.
    pub fn config(&self) -> &FluidConfig {
        &self.config
    }

    /// Mutable particle state, for tests and custom scenarios.
    #[doc(hidden)]
    pub fn particles_mut(&mut self) -> &mut ParticleArrays {
        &mut self.particles
    }
}
