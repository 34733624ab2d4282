//! Fixed-count typed GPU buffers with reallocate-on-resize.
//!
//! Trail pipeline buffers are strict functions of the configuration
//! (`trail_num`, nodes per trail, LOD step), so unlike a growable buffer
//! these are sized exactly and recreated whenever the required count
//! changes.

use std::marker::PhantomData;

use wgpu::util::DeviceExt;

/// A GPU buffer holding exactly `len` items of `T`.
///
/// Never resized in place (GPU buffers cannot be); [`SizedBuffer::ensure_len`]
/// replaces the underlying buffer and the caller must rebuild any bind
/// groups that referenced the old one.
pub struct SizedBuffer<T> {
    buffer: wgpu::Buffer,
    len: usize,
    usage: wgpu::BufferUsages,
    label: String,
    _marker: PhantomData<T>,
}

impl<T: bytemuck::Pod> SizedBuffer<T> {
    /// Zero-initialized buffer of `len` items.
    pub fn new(
        device: &wgpu::Device,
        label: &str,
        len: usize,
        usage: wgpu::BufferUsages,
    ) -> Self {
        let buffer = Self::create(device, label, len, usage);
        Self {
            buffer,
            len,
            usage,
            label: label.to_owned(),
            _marker: PhantomData,
        }
    }

    /// Buffer initialized from existing data.
    pub fn new_with_data(
        device: &wgpu::Device,
        label: &str,
        data: &[T],
        usage: wgpu::BufferUsages,
    ) -> Self {
        let buffer =
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: usage
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            });

        Self {
            buffer,
            len: data.len(),
            usage,
            label: label.to_owned(),
            _marker: PhantomData,
        }
    }

    fn create(
        device: &wgpu::Device,
        label: &str,
        len: usize,
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        // wgpu rejects zero-sized bindings; keep one element of backing.
        let size = (size_of::<T>() * len.max(1)) as u64;
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: usage
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        })
    }

    /// Reallocate (zeroed) if the item count differs from `len`.
    ///
    /// Returns `true` if the buffer was reallocated (bind groups need
    /// recreation).
    pub fn ensure_len(&mut self, device: &wgpu::Device, len: usize) -> bool {
        if len == self.len {
            return false;
        }
        log::info!(
            "reallocating '{}': {} -> {} items",
            self.label,
            self.len,
            len
        );
        self.buffer = Self::create(device, &self.label, len, self.usage);
        self.len = len;
        true
    }

    /// Upload `data` starting at item 0. `data` must not exceed `len`.
    pub fn write(&self, queue: &wgpu::Queue, data: &[T]) {
        debug_assert!(
            data.len() <= self.len,
            "write of {} items into '{}' sized {}",
            data.len(),
            self.label,
            self.len
        );
        if !data.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
        }
    }

    /// Zero the whole buffer on the GPU timeline.
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.buffer, 0, None);
    }

    /// The underlying wgpu buffer.
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` if the buffer holds no items.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
