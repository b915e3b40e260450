//! 2D SPH Fluid Simulation Kernel
//!
//! This crate provides the core simulation kernel for a 2D smoothed-particle
//! hydrodynamics (SPH) fluid rendered as points by an external render loop.
//! It is compute-focused: windowing, input, and drawing are the caller's
//! concern. The caller invokes [`ParticleSystem::simulate`] once per frame
//! and reads back the position / density / velocity / cell-key arrays.
//!
//! # Modules
//! - [`particle`] -- Struct-of-arrays particle storage.
//! - [`sph`] -- Spiky smoothing kernels, derivatives, and scaling factors.
//! - [`spatial`] -- Uniform-grid spatial hash for neighbor search.
//! - [`boundary`] -- Rectangular domain boundary with damped reflection.
//! - [`config`] -- Simulation configuration record (JSON-loadable).
//! - [`system`] -- The per-frame pipeline orchestrator.
//! - [`gpu`] -- wgpu compute offload: buffer layout, storage buffers, kernel runner.

#![warn(missing_docs)]

pub mod boundary;
pub mod config;
pub mod particle;
pub mod spatial;
pub mod sph;
pub mod system;

#[cfg(feature = "gpu")]
#[allow(missing_docs)]
pub mod gpu;

pub use boundary::BoundaryRect;
pub use config::{ConfigError, FluidConfig};
pub use particle::ParticleArrays;
pub use spatial::{SpatialEntry, SpatialHashMap};
pub use sph::KernelCoefficients;
pub use system::{ComputeBackend, CpuBackend, ParticleSystem, StepParams};

#[cfg(feature = "gpu")]
pub use gpu::{gpu_available, BufferLayout, GpuBackend, GpuContext, KernelRunner, StorageBuffer};

use std::fmt;

/// Error type for simulation contract violations and device failures.
///
/// Numerical degeneracies (zero density, coincident particle pairs) are
/// absorbed inside the kernels and never surface here; every variant below is
/// either a programming error caught before a device call or a fatal driver
/// failure.
#[derive(Debug, Clone, PartialEq)]
pub enum SimError {
    /// A buffer field name was queried that was never added to the layout.
    FieldNotFound(String),
    /// A field was declared with an alignment that is not a nonzero power
    /// of two.
    InvalidAlignment {
        /// Name of the offending field.
        name: String,
        /// The rejected alignment value.
        alignment: u64,
    },
    /// A field was added to a layout after its offsets were finalized.
    LayoutFinalized,
    /// A layout was queried before `finalize()` was called.
    LayoutNotFinalized,
    /// A read or write would run past the end of the allocated buffer.
    BufferOverflow {
        /// Byte offset of the attempted access.
        offset: u64,
        /// Length in bytes of the attempted access.
        len: u64,
        /// Allocated buffer capacity in bytes.
        capacity: u64,
    },
    /// A compute shader failed to compile or link; carries the diagnostic.
    KernelCompile(String),
    /// GPU device or adapter initialization failed.
    GpuInit(String),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::FieldNotFound(name) => write!(f, "buffer field not found: {name}"),
            SimError::InvalidAlignment { name, alignment } => write!(
                f,
                "field {name}: alignment {alignment} is not a nonzero power of two"
            ),
            SimError::LayoutFinalized => {
                write!(f, "cannot add fields to a finalized buffer layout")
            }
            SimError::LayoutNotFinalized => {
                write!(f, "buffer layout queried before finalize()")
            }
            SimError::BufferOverflow {
                offset,
                len,
                capacity,
            } => write!(
                f,
                "buffer overflow: access of {len} bytes at offset {offset} exceeds capacity {capacity}"
            ),
            SimError::KernelCompile(diag) => write!(f, "kernel compilation failed: {diag}"),
            SimError::GpuInit(msg) => write!(f, "GPU initialization failed: {msg}"),
        }
    }
}

impl std::error::Error for SimError {}
