//! Append buffers of trail indices and the indirect dispatches sized from
//! them.
//!
//! A [`TrailIndexBuffer`] is a GPU-side list of trail indices with an atomic
//! element counter. Kernels that append to it (culling, LOD selection)
//! bump the counter with `atomicAdd`; kernels that consume it read the
//! counter and run one invocation per element. Since the count is only
//! known on the GPU, consumers are dispatched indirectly: the
//! `CalcDispatchArgs` kernel turns the counter into `[groups, 1, 1]`.

use crate::error::TrailError;
use crate::gpu::pipeline_helpers::{
    bind_group_layout, buffer_bind_group, create_compute_pipeline, dispatch,
    storage_buffer,
};
use crate::gpu::shader_composer::{Shader, ShaderComposer};
use crate::gpu::sized_buffer::SizedBuffer;

/// GPU append buffer of trail indices.
pub struct TrailIndexBuffer {
    counter: SizedBuffer<u32>,
    data: SizedBuffer<u32>,
    dispatch_args: SizedBuffer<u32>,
    args_bind_group: wgpu::BindGroup,
}

impl TrailIndexBuffer {
    /// Empty buffer with room for `capacity` indices.
    pub fn new(
        device: &wgpu::Device,
        dispatcher: &IndexDispatcher,
        label: &str,
        capacity: u32,
    ) -> Self {
        Self::with_args_layout(device, &dispatcher.layout, label, capacity)
    }

    fn with_args_layout(
        device: &wgpu::Device,
        args_layout: &wgpu::BindGroupLayout,
        label: &str,
        capacity: u32,
    ) -> Self {
        let counter = SizedBuffer::new(
            device,
            &format!("{label} Counter"),
            1,
            wgpu::BufferUsages::STORAGE,
        );
        let data = SizedBuffer::new(
            device,
            &format!("{label} Data"),
            capacity as usize,
            wgpu::BufferUsages::STORAGE,
        );
        let dispatch_args = SizedBuffer::new(
            device,
            &format!("{label} Dispatch Args"),
            3,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDIRECT,
        );
        let args_bind_group = buffer_bind_group(
            device,
            label,
            args_layout,
            &[counter.buffer(), dispatch_args.buffer()],
        );

        Self {
            counter,
            data,
            dispatch_args,
            args_bind_group,
        }
    }

    /// Grow or shrink the index storage. The counter is untouched.
    ///
    /// Returns `true` if the data buffer was reallocated.
    pub fn ensure_capacity(
        &mut self,
        device: &wgpu::Device,
        capacity: u32,
    ) -> bool {
        self.data.ensure_len(device, capacity as usize)
    }

    /// Reset the element count to zero on the GPU timeline.
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder) {
        self.counter.clear(encoder);
    }

    /// Maximum number of indices.
    pub fn capacity(&self) -> u32 {
        self.data.len() as u32
    }

    /// The single `atomic<u32>` element count.
    pub fn counter_buffer(&self) -> &wgpu::Buffer {
        self.counter.buffer()
    }

    /// The trail indices; only the first `counter` entries are meaningful.
    pub fn data_buffer(&self) -> &wgpu::Buffer {
        self.data.buffer()
    }

    /// `[workgroups, 1, 1]` written by [`IndexDispatcher::write_args`].
    pub fn dispatch_args_buffer(&self) -> &wgpu::Buffer {
        self.dispatch_args.buffer()
    }
}

/// Owns the `CalcDispatchArgs` kernel and a one-element placeholder buffer
/// bound wherever a stage runs without an index list.
pub struct IndexDispatcher {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    placeholder: TrailIndexBuffer,
}

impl IndexDispatcher {
    /// Compose the kernel and allocate the placeholder.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::Shader`] if the kernel fails to compose.
    pub fn new(
        device: &wgpu::Device,
        shader_composer: &mut ShaderComposer,
    ) -> Result<Self, TrailError> {
        let shader = shader_composer.compose(device, Shader::IndexDispatch)?;
        let layout = bind_group_layout(
            device,
            "Calc Dispatch Args",
            &[storage_buffer(0, true), storage_buffer(1, false)],
        );
        let pipeline = create_compute_pipeline(
            device,
            &shader,
            "CalcDispatchArgs",
            &layout,
        );
        let placeholder = TrailIndexBuffer::with_args_layout(
            device,
            &layout,
            "Trail Placeholder Index",
            1,
        );

        Ok(Self {
            pipeline,
            layout,
            placeholder,
        })
    }

    /// Record `CalcDispatchArgs` for `indices`. Must come after every append
    /// to `indices` and before the indirect dispatch that consumes it.
    pub fn write_args(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        indices: &TrailIndexBuffer,
    ) {
        dispatch(
            encoder,
            "Calc Dispatch Args Pass",
            &self.pipeline,
            &indices.args_bind_group,
            1,
        );
    }

    /// Buffer bound in place of a missing index list.
    pub fn placeholder(&self) -> &TrailIndexBuffer {
        &self.placeholder
    }
}
