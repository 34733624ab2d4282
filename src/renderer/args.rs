//! Indirect draw arguments and the stereo instance-count fix-up.

use crate::error::TrailError;
use crate::gpu::pipeline_helpers::{
    bind_group_layout, buffer_bind_group, create_compute_pipeline, dispatch,
    storage_buffer,
};
use crate::gpu::shader_composer::{Shader, ShaderComposer};
use crate::gpu::sized_buffer::SizedBuffer;

/// Layout of `draw_indexed_indirect` arguments.
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable,
)]
pub struct DrawIndexedIndirectArgs {
    /// Indices per instance.
    pub index_count: u32,
    /// Instances to draw.
    pub instance_count: u32,
    /// First index in the index buffer.
    pub first_index: u32,
    /// Added to every index before vertex fetch.
    pub base_vertex: i32,
    /// First instance id.
    pub first_instance: u32,
}

/// Byte offset of `instance_count`; the append counter is copied here.
pub const INSTANCE_COUNT_OFFSET: u64 = 4;

impl DrawIndexedIndirectArgs {
    /// Arguments drawing every trail, once per eye when `stereo`.
    #[must_use]
    pub fn all_trails(
        index_num_per_trail: u32,
        trail_num: u32,
        stereo: bool,
    ) -> Self {
        Self {
            index_count: index_num_per_trail,
            instance_count: trail_num * if stereo { 2 } else { 1 },
            first_index: 0,
            base_vertex: 0,
            first_instance: 0,
        }
    }
}

/// `ArgsBufferMultiply` kernel: doubles `instance_count` in place.
pub struct ArgsBufferMultiply {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

impl ArgsBufferMultiply {
    /// Compose the kernel.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::Shader`] if the args shader fails to compose.
    pub fn new(
        device: &wgpu::Device,
        shader_composer: &mut ShaderComposer,
    ) -> Result<Self, TrailError> {
        let shader = shader_composer.compose(device, Shader::ArgsBuffer)?;
        let layout = bind_group_layout(
            device,
            "Args Buffer Multiply",
            &[storage_buffer(0, false)],
        );
        let pipeline = create_compute_pipeline(
            device,
            &shader,
            "ArgsBufferMultiply",
            &layout,
        );
        Ok(Self { pipeline, layout })
    }

    /// Bind group for one args buffer.
    pub(crate) fn bind(
        &self,
        device: &wgpu::Device,
        args: &SizedBuffer<DrawIndexedIndirectArgs>,
    ) -> wgpu::BindGroup {
        buffer_bind_group(
            device,
            "Args Buffer Multiply",
            &self.layout,
            &[args.buffer()],
        )
    }

    /// Record the doubling for the args buffer behind `bind_group`.
    pub(crate) fn dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        bind_group: &wgpu::BindGroup,
    ) {
        dispatch(
            encoder,
            "Args Buffer Multiply Pass",
            &self.pipeline,
            bind_group,
            1,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_layout_matches_wgpu() {
        assert_eq!(size_of::<DrawIndexedIndirectArgs>(), 20);
        let args = DrawIndexedIndirectArgs {
            instance_count: 7,
            ..Default::default()
        };
        let bytes = bytemuck::bytes_of(&args);
        let offset = INSTANCE_COUNT_OFFSET as usize;
        assert_eq!(&bytes[offset..offset + 4], &7u32.to_ne_bytes());
    }

    #[test]
    fn reset_args_cover_every_trail() {
        let mono = DrawIndexedIndirectArgs::all_trails(63 * 6, 10, false);
        assert_eq!(mono.index_count, 378);
        assert_eq!(mono.instance_count, 10);

        let stereo = DrawIndexedIndirectArgs::all_trails(63 * 6, 10, true);
        assert_eq!(stereo.instance_count, 20);
    }
}
