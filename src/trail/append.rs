use crate::error::TrailError;
use crate::gpu::pipeline_helpers::{
    bind_group_layout, buffer_bind_group, create_compute_pipeline, dispatch,
    storage_buffer, uniform_buffer, workgroup_count,
};
use crate::gpu::shader_composer::{Shader, ShaderComposer};
use crate::gpu::sized_buffer::SizedBuffer;

use super::types::{InputNode, Node, Trail};

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct AppendParams {
    trail_num: u32,
    node_num_per_trail: u32,
    time: f32,
    _pad: u32,
}

/// `AppendNode` kernel: one invocation per trail copies the trail's input
/// node into its ring and bumps `total_input_num`.
pub(crate) struct AppendNodeStage {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    params: SizedBuffer<AppendParams>,
    bind_group: wgpu::BindGroup,
}

/// Buffers the append kernel binds.
pub(crate) struct AppendBuffers<'a> {
    pub(crate) trails: &'a SizedBuffer<Trail>,
    pub(crate) nodes: &'a SizedBuffer<Node>,
    pub(crate) input: &'a SizedBuffer<InputNode>,
}

impl AppendNodeStage {
    pub(crate) fn new(
        device: &wgpu::Device,
        shader_composer: &mut ShaderComposer,
        buffers: &AppendBuffers<'_>,
    ) -> Result<Self, TrailError> {
        let shader = shader_composer.compose(device, Shader::AppendNode)?;
        let layout = bind_group_layout(
            device,
            "Append Node",
            &[
                uniform_buffer(0),
                storage_buffer(1, false),
                storage_buffer(2, false),
                storage_buffer(3, true),
            ],
        );
        let pipeline =
            create_compute_pipeline(device, &shader, "AppendNode", &layout);
        let params = SizedBuffer::new(
            device,
            "Append Node Params",
            1,
            wgpu::BufferUsages::UNIFORM,
        );
        let bind_group =
            Self::create_bind_group(device, &layout, &params, buffers);

        Ok(Self {
            pipeline,
            layout,
            params,
            bind_group,
        })
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        params: &SizedBuffer<AppendParams>,
        buffers: &AppendBuffers<'_>,
    ) -> wgpu::BindGroup {
        buffer_bind_group(
            device,
            "Append Node",
            layout,
            &[
                params.buffer(),
                buffers.trails.buffer(),
                buffers.nodes.buffer(),
                buffers.input.buffer(),
            ],
        )
    }

    /// Rebind after the trail buffers were reallocated.
    pub(crate) fn rebind(
        &mut self,
        device: &wgpu::Device,
        buffers: &AppendBuffers<'_>,
    ) {
        self.bind_group =
            Self::create_bind_group(device, &self.layout, &self.params, buffers);
    }

    pub(crate) fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        trail_num: u32,
        node_num_per_trail: u32,
        time: f32,
    ) {
        self.params.write(
            queue,
            &[AppendParams {
                trail_num,
                node_num_per_trail,
                time,
                _pad: 0,
            }],
        );
        dispatch(
            encoder,
            "Append Node Pass",
            &self.pipeline,
            &self.bind_group,
            workgroup_count(trail_num),
        );
    }
}
