//! Blocking GPU → host buffer readback.
//!
//! The steady-state trail pipeline never reads back; this exists for
//! diagnostics and tests that inspect ring, bounds, index and vertex
//! buffers after the GPU has executed.

use crate::error::TrailError;
use crate::gpu::render_context::RenderContext;

/// Copy `count` items of `T` starting at `byte_offset` out of `source`
/// (which must have `COPY_SRC` usage) and block until they are mapped.
///
/// # Errors
///
/// Returns [`TrailError::Readback`] if the staging buffer cannot be mapped.
pub fn read_buffer<T: bytemuck::Pod>(
    context: &RenderContext,
    source: &wgpu::Buffer,
    byte_offset: u64,
    count: usize,
) -> Result<Vec<T>, TrailError> {
    let size = (size_of::<T>() * count) as u64;
    if size == 0 {
        return Ok(Vec::new());
    }
    // copy_buffer_to_buffer requires 4-byte aligned sizes.
    let padded = size.next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);

    let staging = context.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Trail Readback Staging Buffer"),
        size: padded,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = context.create_encoder("Trail Readback Encoder");
    encoder.copy_buffer_to_buffer(source, byte_offset, &staging, 0, padded);
    context.submit(encoder);

    let slice = staging.slice(..);
    let (sender, receiver) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    let _ = context.device.poll(wgpu::PollType::Wait);

    match receiver.recv() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(TrailError::Readback(e.to_string())),
        Err(e) => return Err(TrailError::Readback(e.to_string())),
    }

    let data = slice.get_mapped_range();
    let items = bytemuck::cast_slice::<u8, T>(&data[..size as usize]).to_vec();
    drop(data);
    staging.unmap();

    Ok(items)
}
