//! GPU-resident trail history.
//!
//! [`GpuTrail`] owns one ring buffer of [`Node`]s per trail, the per-trail
//! [`Trail`] counters and the input buffer a simulation fills each frame.
//! Appending is a single compute dispatch; nothing is read back.

mod append;
/// GPU layouts and the host ring mirror.
pub mod types;

use web_time::Instant;

pub use types::{
    ring_slot, slot_by_age, Aabb, InputNode, Node, Trail, TrailRing,
};

use self::append::{AppendBuffers, AppendNodeStage};
use crate::error::TrailError;
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::ShaderComposer;
use crate::gpu::sized_buffer::SizedBuffer;

/// Per-particle position history stored entirely on the GPU.
pub struct GpuTrail {
    trail_num: u32,
    node_num_per_trail: u32,
    trails: SizedBuffer<Trail>,
    nodes: SizedBuffer<Node>,
    input: SizedBuffer<InputNode>,
    append: AppendNodeStage,
    start: Instant,
}

impl GpuTrail {
    /// Allocate zeroed buffers for `trail_num` trails of
    /// `node_num_per_trail` nodes each.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::InvalidConfig`] for zero trails or fewer than two
    /// nodes, and [`TrailError::Shader`] if the append kernel fails to
    /// compose.
    pub fn new(
        context: &RenderContext,
        shader_composer: &mut ShaderComposer,
        trail_num: u32,
        node_num_per_trail: u32,
    ) -> Result<Self, TrailError> {
        check_counts(trail_num, node_num_per_trail)?;
        let device = &context.device;

        let trails = SizedBuffer::new(
            device,
            "Trail Buffer",
            trail_num as usize,
            wgpu::BufferUsages::STORAGE,
        );
        let nodes = SizedBuffer::new(
            device,
            "Trail Node Buffer",
            (trail_num * node_num_per_trail) as usize,
            wgpu::BufferUsages::STORAGE,
        );
        let input = SizedBuffer::new(
            device,
            "Trail Input Buffer",
            trail_num as usize,
            wgpu::BufferUsages::STORAGE,
        );
        let append = AppendNodeStage::new(
            device,
            shader_composer,
            &AppendBuffers {
                trails: &trails,
                nodes: &nodes,
                input: &input,
            },
        )?;

        log::info!(
            "trail store: {trail_num} trails x {node_num_per_trail} nodes"
        );

        Ok(Self {
            trail_num,
            node_num_per_trail,
            trails,
            nodes,
            input,
            append,
            start: Instant::now(),
        })
    }

    /// Reallocate for new counts. History is lost when anything changes.
    ///
    /// Returns `true` if buffers were reallocated.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::InvalidConfig`] for zero trails or fewer than two
    /// nodes.
    pub fn resize(
        &mut self,
        device: &wgpu::Device,
        trail_num: u32,
        node_num_per_trail: u32,
    ) -> Result<bool, TrailError> {
        check_counts(trail_num, node_num_per_trail)?;
        if trail_num == self.trail_num
            && node_num_per_trail == self.node_num_per_trail
        {
            return Ok(false);
        }

        // A new ring capacity scrambles every ring even when the total node
        // count matches, so the history buffers are always recreated.
        self.trails = SizedBuffer::new(
            device,
            "Trail Buffer",
            trail_num as usize,
            wgpu::BufferUsages::STORAGE,
        );
        self.nodes = SizedBuffer::new(
            device,
            "Trail Node Buffer",
            (trail_num * node_num_per_trail) as usize,
            wgpu::BufferUsages::STORAGE,
        );
        let _ = self.input.ensure_len(device, trail_num as usize);
        log::info!(
            "trail store resized: {trail_num} trails x {node_num_per_trail} \
             nodes"
        );
        self.trail_num = trail_num;
        self.node_num_per_trail = node_num_per_trail;
        self.append.rebind(
            device,
            &AppendBuffers {
                trails: &self.trails,
                nodes: &self.nodes,
                input: &self.input,
            },
        );
        Ok(true)
    }

    /// Upload this frame's input nodes (one per trail, in trail order).
    pub fn write_input(&self, queue: &wgpu::Queue, input: &[InputNode]) {
        self.input.write(queue, input);
    }

    /// Input buffer for simulations that write nodes on the GPU directly.
    pub fn input_buffer(&self) -> &wgpu::Buffer {
        self.input.buffer()
    }

    /// Record the `AppendNode` dispatch: every trail takes its input node,
    /// stamped with `time`.
    pub fn append_node(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        queue: &wgpu::Queue,
        time: f32,
    ) {
        self.append.dispatch(
            encoder,
            queue,
            self.trail_num,
            self.node_num_per_trail,
            time,
        );
    }

    /// Restart every trail without reallocating.
    pub fn reset(&self, encoder: &mut wgpu::CommandEncoder) {
        self.trails.clear(encoder);
    }

    /// Seconds since this store was created; the default node timestamp.
    pub fn frame_time(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Number of trails.
    pub fn trail_num(&self) -> u32 {
        self.trail_num
    }

    /// Ring capacity of each trail.
    pub fn node_num_per_trail(&self) -> u32 {
        self.node_num_per_trail
    }

    /// Per-trail counters.
    pub fn trail_buffer(&self) -> &wgpu::Buffer {
        self.trails.buffer()
    }

    /// Ring storage, `trail_num * node_num_per_trail` nodes.
    pub fn node_buffer(&self) -> &wgpu::Buffer {
        self.nodes.buffer()
    }
}

fn check_counts(
    trail_num: u32,
    node_num_per_trail: u32,
) -> Result<(), TrailError> {
    if trail_num == 0 || node_num_per_trail < 2 {
        return Err(TrailError::InvalidConfig(format!(
            "need at least 1 trail and 2 nodes per trail, got {trail_num} x \
             {node_num_per_trail}"
        )));
    }
    // Every ribbon vertex (two per node) must stay addressable as u32.
    if trail_num
        .checked_mul(node_num_per_trail)
        .and_then(|nodes| nodes.checked_mul(2))
        .is_none()
    {
        return Err(TrailError::InvalidConfig(format!(
            "{trail_num} trails x {node_num_per_trail} nodes overflows the \
             vertex count"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_reject_degenerate_and_overflowing_shapes() {
        assert!(check_counts(10, 64).is_ok());
        assert!(check_counts(0, 64).is_err());
        assert!(check_counts(10, 1).is_err());
        assert!(check_counts(u32::MAX, 2).is_err());
        assert!(check_counts(1 << 16, 1 << 15).is_err());
        assert!(check_counts(1 << 16, (1 << 15) - 1).is_ok());
    }
}
