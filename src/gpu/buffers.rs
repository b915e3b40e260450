//! Storage buffer wrapper with bounds-checked upload and blocking readback.

use crate::SimError;

use super::GpuContext;

/// A GPU storage buffer paired with a persistent MAP_READ staging buffer of
/// equal size for readback.
///
/// Writes go through `queue.write_buffer`, so they land before any dispatch
/// submitted afterwards on the same queue. Reads encode a copy into the
/// staging buffer, submit it, and block until the map completes.
pub struct StorageBuffer {
    buffer: wgpu::Buffer,
    staging: wgpu::Buffer,
    size: u64,
    label: String,
}

/// wgpu requires non-zero buffer allocations.
const MIN_BUF_SIZE: u64 = 4;

fn create_pair(device: &wgpu::Device, label: &str, size: u64) -> (wgpu::Buffer, wgpu::Buffer) {
    let alloc = size.max(MIN_BUF_SIZE);
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: alloc,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(&format!("{label}_staging")),
        size: alloc,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    (buffer, staging)
}

impl StorageBuffer {
    /// Allocate a zero-filled storage/staging pair of `size` bytes.
    pub fn new(ctx: &GpuContext, label: &str, size: u64) -> Self {
        let (buffer, staging) = create_pair(&ctx.device, label, size);
        Self {
            buffer,
            staging,
            size,
            label: label.to_owned(),
        }
    }

    /// Resize to `size` bytes. A no-op when the size already matches;
    /// otherwise both allocations are recreated zero-filled.
    pub fn allocate(&mut self, ctx: &GpuContext, size: u64) {
        if size == self.size {
            return;
        }
        let (buffer, staging) = create_pair(&ctx.device, &self.label, size);
        self.buffer = buffer;
        self.staging = staging;
        self.size = size;
    }

    /// Logical size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// The underlying wgpu buffer, for bind group entries.
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Upload `data` at `offset`, bounds-checked before touching the device.
    pub fn write(&self, ctx: &GpuContext, data: &[u8], offset: u64) -> Result<(), SimError> {
        let len = data.len() as u64;
        if offset + len > self.size {
            return Err(SimError::BufferOverflow {
                offset,
                len,
                capacity: self.size,
            });
        }
        if data.is_empty() {
            return Ok(());
        }
        ctx.queue.write_buffer(&self.buffer, offset, data);
        Ok(())
    }

    /// Read `len` bytes starting at `offset`.
    ///
    /// Submits a copy into the staging buffer (ordering it after all prior
    /// work on the queue) and blocks until the map resolves.
    pub fn read(&self, ctx: &GpuContext, len: u64, offset: u64) -> Result<Vec<u8>, SimError> {
        if len == 0 || self.size == 0 {
            return Ok(Vec::new());
        }
        if offset + len > self.size {
            return Err(SimError::BufferOverflow {
                offset,
                len,
                capacity: self.size,
            });
        }

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(&format!("{}_readback", self.label)),
            });
        encoder.copy_buffer_to_buffer(&self.buffer, offset, &self.staging, 0, len);
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = self.staging.slice(0..len);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| SimError::GpuInit("buffer map callback dropped".into()))?
            .map_err(|e| SimError::GpuInit(format!("buffer map failed: {e:?}")))?;

        let data = slice.get_mapped_range();
        let result = data.to_vec();
        drop(data);
        self.staging.unmap();
        Ok(result)
    }
}
