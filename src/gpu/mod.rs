//! wgpu compute offload for the density and pressure passes.
//!
//! # Dispatch protocol
//! Each pass owns a [`KernelRunner`] with one input and one output storage
//! buffer. Per frame: named fields are written into the input buffer at
//! their layout offsets, the uniform params (including each field's word
//! offset) are uploaded, one compute pass runs with a thread per particle,
//! and results are read back from the output buffer by field name.
//!
//! # Bind group layout
//! - Binding 0: input storage buffer (read)
//! - Binding 1: output storage buffer (read_write)
//! - Binding 2: SimParams uniform

pub mod buffers;
pub mod layout;

use bytemuck::{Pod, Zeroable};
use tracing::info;

use crate::particle::ParticleArrays;
use crate::spatial::SpatialHashMap;
use crate::system::{ComputeBackend, StepParams};
use crate::SimError;

pub use buffers::StorageBuffer;
pub use layout::BufferLayout;

/// Threads per workgroup for all compute dispatches.
const WORKGROUP_SIZE: u32 = 64;

/// Check whether any GPU adapter is available.
pub fn gpu_available() -> bool {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }));
    adapter.is_some()
}

/// Shared device and queue for all kernel runners.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Initialize the wgpu instance, adapter, device, and queue.
    ///
    /// Returns `Err(SimError::GpuInit)` when no adapter is found, allowing
    /// callers to fall back to the CPU backend.
    pub fn new() -> Result<Self, SimError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| SimError::GpuInit("no suitable GPU adapter found".into()))?;

        info!("GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("fluid_gpu_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| SimError::GpuInit(format!("failed to create device: {e}")))?;

        Ok(Self { device, queue })
    }
}

/// Uniform parameter block shared by both compute shaders.
/// Must match the SimParams struct in the WGSL sources exactly.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct SimParams {
    pub num_particles: u32,
    pub dt: f32,
    pub smoothing_radius: f32,
    pub target_density: f32,
    pub pressure_multiplier: f32,
    pub near_pressure_multiplier: f32,
    pub spiky_pow2: f32,
    pub spiky_pow3: f32,
    pub spiky_pow2_deriv: f32,
    pub spiky_pow3_deriv: f32,
    // Word (u32) offsets of each named field within the input buffer.
    pub in_velocities: u32,
    pub in_densities: u32,
    pub in_near_densities: u32,
    pub in_offsets: u32,
    pub in_positions: u32,
    pub in_entries: u32,
    // Word offsets within the output buffer.
    pub out_densities: u32,
    pub out_near_densities: u32,
    pub out_velocities: u32,
    pub _pad: u32,
}

/// One compute kernel: pipeline, bind group, and its input/output buffers.
pub struct KernelRunner {
    label: String,
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    input_layout: BufferLayout,
    output_layout: BufferLayout,
    input: StorageBuffer,
    output: StorageBuffer,
    params_buffer: wgpu::Buffer,
}

fn bgl_storage(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bgl_uniform(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

impl KernelRunner {
    /// Build a runner: finalize both layouts, size the buffers, compile the
    /// shader, and create the pipeline and bind group.
    ///
    /// Shader compilation runs inside a validation error scope; any
    /// diagnostic becomes `Err(SimError::KernelCompile)` here rather than a
    /// deferred device error.
    pub fn new(
        ctx: &GpuContext,
        label: &str,
        source: &str,
        mut input_layout: BufferLayout,
        mut output_layout: BufferLayout,
    ) -> Result<Self, SimError> {
        if !input_layout.is_finalized() {
            input_layout.finalize()?;
        }
        if !output_layout.is_finalized() {
            output_layout.finalize()?;
        }

        let input = StorageBuffer::new(ctx, &format!("{label}_in"), input_layout.total_size()?);
        let output = StorageBuffer::new(ctx, &format!("{label}_out"), output_layout.total_size()?);

        let params_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label}_params")),
            size: std::mem::size_of::<SimParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{label}_bgl")),
                    entries: &[
                        bgl_storage(0, true),  // input
                        bgl_storage(1, false), // output
                        bgl_uniform(2),        // params
                    ],
                });

        let pipeline_layout = ctx
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{label}_pl")),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        // Compile inside a validation scope so a broken shader fails
        // construction instead of surfacing as a later device error.
        ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let wg_str = format!("@workgroup_size({WORKGROUP_SIZE})");
        let source = source.replace("@workgroup_size(64)", &wg_str);
        let module = ctx
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        let pipeline = ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            });

        if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
            return Err(SimError::KernelCompile(format!("{label}: {err}")));
        }

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}_bg")),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input.raw().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: output.raw().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        info!(
            kernel = label,
            input_bytes = input.size(),
            output_bytes = output.size(),
            "compute kernel ready"
        );

        Ok(Self {
            label: label.to_owned(),
            pipeline,
            bind_group,
            input_layout,
            output_layout,
            input,
            output,
            params_buffer,
        })
    }

    /// Word (u32) offset of a named input field, for SimParams.
    pub fn input_word_offset(&self, name: &str) -> Result<u32, SimError> {
        Ok((self.input_layout.offset_of(name)? / 4) as u32)
    }

    /// Word offset of a named output field.
    pub fn output_word_offset(&self, name: &str) -> Result<u32, SimError> {
        Ok((self.output_layout.offset_of(name)? / 4) as u32)
    }

    /// Upload `bytes` to a named input field.
    pub fn write_field(&self, ctx: &GpuContext, name: &str, bytes: &[u8]) -> Result<(), SimError> {
        let offset = self.input_layout.offset_of(name)?;
        self.input.write(ctx, bytes, offset)
    }

    /// Read `len` bytes of a named output field.
    pub fn read_field(&self, ctx: &GpuContext, name: &str, len: u64) -> Result<Vec<u8>, SimError> {
        let offset = self.output_layout.offset_of(name)?;
        self.output.read(ctx, len, offset)
    }

    /// Upload the uniforms and run one compute pass over `n` particles.
    pub fn dispatch(&self, ctx: &GpuContext, params: &SimParams, n: u32) {
        ctx.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(params));

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&self.label),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(&self.label),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(n.div_ceil(WORKGROUP_SIZE), 1, 1);
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));
    }
}

/// GPU implementation of the density and pressure passes.
pub struct GpuBackend {
    ctx: GpuContext,
    density: KernelRunner,
    pressure: KernelRunner,
}

impl GpuBackend {
    /// Initialize the device and both kernel runners for a fixed particle
    /// count.
    pub fn new(particle_count: usize) -> Result<Self, SimError> {
        let ctx = GpuContext::new()?;
        let n = particle_count as u64;

        let mut density_in = BufferLayout::new();
        density_in.add_field(4, 4, n, "spatial_offsets")?;
        density_in.add_field(8, 8, n, "predicted_positions")?;
        density_in.add_field(16, 16, n, "spatial_entries")?;

        let mut density_out = BufferLayout::new();
        density_out.add_field(4, 4, n, "densities")?;
        density_out.add_field(4, 4, n, "near_densities")?;

        let density = KernelRunner::new(
            &ctx,
            "density",
            include_str!("shaders/density.wgsl"),
            density_in,
            density_out,
        )?;

        let mut pressure_in = BufferLayout::new();
        pressure_in.add_field(8, 8, n, "velocities")?;
        pressure_in.add_field(4, 4, n, "densities")?;
        pressure_in.add_field(4, 4, n, "near_densities")?;
        pressure_in.add_field(4, 4, n, "spatial_offsets")?;
        pressure_in.add_field(8, 8, n, "predicted_positions")?;
        pressure_in.add_field(16, 16, n, "spatial_entries")?;

        let mut pressure_out = BufferLayout::new();
        pressure_out.add_field(8, 8, n, "velocities")?;

        let pressure = KernelRunner::new(
            &ctx,
            "pressure",
            include_str!("shaders/pressure.wgsl"),
            pressure_in,
            pressure_out,
        )?;

        Ok(Self {
            ctx,
            density,
            pressure,
        })
    }

    fn base_params(&self, n: u32, params: &StepParams) -> SimParams {
        SimParams {
            num_particles: n,
            dt: params.dt,
            smoothing_radius: params.smoothing_radius,
            target_density: params.target_density,
            pressure_multiplier: params.pressure_multiplier,
            near_pressure_multiplier: params.near_pressure_multiplier,
            spiky_pow2: params.coeffs.spiky_pow2,
            spiky_pow3: params.coeffs.spiky_pow3,
            spiky_pow2_deriv: params.coeffs.spiky_pow2_deriv,
            spiky_pow3_deriv: params.coeffs.spiky_pow3_deriv,
            in_velocities: 0,
            in_densities: 0,
            in_near_densities: 0,
            in_offsets: 0,
            in_positions: 0,
            in_entries: 0,
            out_densities: 0,
            out_near_densities: 0,
            out_velocities: 0,
            _pad: 0,
        }
    }
}

impl ComputeBackend for GpuBackend {
    fn compute_densities(
        &mut self,
        spatial: &SpatialHashMap,
        particles: &mut ParticleArrays,
        params: &StepParams,
    ) -> Result<(), SimError> {
        let n = particles.len() as u32;
        let runner = &self.density;

        runner.write_field(
            &self.ctx,
            "spatial_offsets",
            bytemuck::cast_slice(spatial.offsets()),
        )?;
        runner.write_field(
            &self.ctx,
            "predicted_positions",
            bytemuck::cast_slice(&particles.predicted),
        )?;
        runner.write_field(
            &self.ctx,
            "spatial_entries",
            bytemuck::cast_slice(spatial.entries()),
        )?;

        let mut sim_params = self.base_params(n, params);
        sim_params.in_offsets = runner.input_word_offset("spatial_offsets")?;
        sim_params.in_positions = runner.input_word_offset("predicted_positions")?;
        sim_params.in_entries = runner.input_word_offset("spatial_entries")?;
        sim_params.out_densities = runner.output_word_offset("densities")?;
        sim_params.out_near_densities = runner.output_word_offset("near_densities")?;

        runner.dispatch(&self.ctx, &sim_params, n);

        let len = n as u64 * 4;
        let densities = runner.read_field(&self.ctx, "densities", len)?;
        let near = runner.read_field(&self.ctx, "near_densities", len)?;
        particles
            .densities
            .copy_from_slice(bytemuck::cast_slice(&densities));
        particles
            .near_densities
            .copy_from_slice(bytemuck::cast_slice(&near));
        Ok(())
    }

    fn apply_pressure(
        &mut self,
        spatial: &SpatialHashMap,
        particles: &mut ParticleArrays,
        params: &StepParams,
    ) -> Result<(), SimError> {
        let n = particles.len() as u32;
        let runner = &self.pressure;

        runner.write_field(
            &self.ctx,
            "velocities",
            bytemuck::cast_slice(&particles.velocities),
        )?;
        runner.write_field(
            &self.ctx,
            "densities",
            bytemuck::cast_slice(&particles.densities),
        )?;
        runner.write_field(
            &self.ctx,
            "near_densities",
            bytemuck::cast_slice(&particles.near_densities),
        )?;
        runner.write_field(
            &self.ctx,
            "spatial_offsets",
            bytemuck::cast_slice(spatial.offsets()),
        )?;
        runner.write_field(
            &self.ctx,
            "predicted_positions",
            bytemuck::cast_slice(&particles.predicted),
        )?;
        runner.write_field(
            &self.ctx,
            "spatial_entries",
            bytemuck::cast_slice(spatial.entries()),
        )?;

        let mut sim_params = self.base_params(n, params);
        sim_params.in_velocities = runner.input_word_offset("velocities")?;
        sim_params.in_densities = runner.input_word_offset("densities")?;
        sim_params.in_near_densities = runner.input_word_offset("near_densities")?;
        sim_params.in_offsets = runner.input_word_offset("spatial_offsets")?;
        sim_params.in_positions = runner.input_word_offset("predicted_positions")?;
        sim_params.in_entries = runner.input_word_offset("spatial_entries")?;
        sim_params.out_velocities = runner.output_word_offset("velocities")?;

        runner.dispatch(&self.ctx, &sim_params, n);

        let vel = runner.read_field(&self.ctx, "velocities", n as u64 * 8)?;
        particles
            .velocities
            .copy_from_slice(bytemuck::cast_slice(&vel));
        Ok(())
    }
}
