//! Per-trail axis-aligned bounds, reduced on the GPU.
//!
//! `InitBounds` seeds one box per ring slot, `CalcBounds` halves the window
//! `ceil(log2(N))` times, and `CopyBounds` publishes element 0 of every
//! trail (inflated by half the ribbon width) to the result buffer read by
//! culling. The reduction windows are precomputed on the host and stored
//! in one uniform buffer addressed with dynamic offsets, so every pass is
//! recorded into a single compute pass.

use std::num::NonZeroU64;

use glam::Vec3;

use crate::error::TrailError;
use crate::gpu::pipeline_helpers::{
    bind_group_layout, create_compute_pipeline, dynamic_uniform_buffer,
    storage_buffer, uniform_buffer, workgroup_count, workgroup_grid,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::{Shader, ShaderComposer};
use crate::gpu::sized_buffer::SizedBuffer;
use crate::trail::{slot_by_age, Aabb, GpuTrail, TrailRing};

/// One reduction pass: invocation `i < len / 2` merges `i` with `i + step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundsPass {
    /// Distance between merged elements, `ceil(len / 2)`.
    pub step: u32,
    /// Window length entering this pass.
    pub len: u32,
}

/// Reduction windows for rings of `node_num` slots.
#[must_use]
pub fn reduction_passes(node_num: u32) -> Vec<BoundsPass> {
    let mut passes = Vec::new();
    let mut len = node_num;
    while len > 1 {
        let step = len.div_ceil(2);
        passes.push(BoundsPass { step, len });
        len = step;
    }
    passes
}

/// Bounds of `positions` computed with the same stride pattern as the
/// GPU reduction.
#[must_use]
pub fn reduce_bounds(positions: &[Vec3]) -> Aabb {
    let mut work: Vec<Aabb> =
        positions.iter().copied().map(Aabb::from_point).collect();
    if work.is_empty() {
        return Aabb::EMPTY;
    }
    for pass in reduction_passes(work.len() as u32) {
        for i in 0..(pass.len / 2) as usize {
            work[i] = work[i].merge(&work[i + pass.step as usize]);
        }
    }
    work[0]
}

/// Bounds the GPU publishes for one trail: unwritten slots take the oldest
/// written node, and the result grows by `trail_width / 2`.
#[must_use]
pub fn trail_bounds(ring: &TrailRing, trail_width: f32) -> Aabb {
    let capacity = ring.capacity();
    let Some(oldest) = slot_by_age(ring.total(), capacity, capacity) else {
        return Aabb::EMPTY;
    };
    let written = ring.total().min(capacity);
    let slots: Vec<Vec3> = ring
        .slots()
        .iter()
        .enumerate()
        .map(|(slot, &p)| {
            if (slot as u32) < written {
                p
            } else {
                ring.slots()[oldest as usize]
            }
        })
        .collect();
    reduce_bounds(&slots).inflate(trail_width * 0.5)
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct BoundsParams {
    trail_num: u32,
    node_num_per_trail: u32,
    half_width: f32,
    _pad: u32,
}

/// One [`BoundsPass`] padded to the dynamic-offset alignment.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct PassSlot {
    step: u32,
    len: u32,
    _pad_a: [u32; 2],
    _pad_b: [[u32; 4]; 15],
}

const PASS_SLOT_SIZE: u64 = size_of::<PassSlot>() as u64;
const PASS_PARAMS_SIZE: u64 = 16;

/// Owns the three bounds kernels and the per-slot working buffer.
pub struct TrailBoundsCalculator {
    init_pipeline: wgpu::ComputePipeline,
    calc_pipeline: wgpu::ComputePipeline,
    copy_pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    params: SizedBuffer<BoundsParams>,
    pass_slots: SizedBuffer<PassSlot>,
    passes: Vec<BoundsPass>,
    work: SizedBuffer<Aabb>,
    bounds: SizedBuffer<Aabb>,
}

impl TrailBoundsCalculator {
    /// Compose the kernels and size the buffers for `trail`.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::Shader`] if the bounds shader fails to compose.
    pub fn new(
        device: &wgpu::Device,
        shader_composer: &mut ShaderComposer,
        trail: &GpuTrail,
    ) -> Result<Self, TrailError> {
        let shader = shader_composer.compose(device, Shader::Bounds)?;
        let layout = bind_group_layout(
            device,
            "Trail Bounds",
            &[
                uniform_buffer(0),
                dynamic_uniform_buffer(1, PASS_PARAMS_SIZE),
                storage_buffer(2, true),
                storage_buffer(3, true),
                storage_buffer(4, false),
                storage_buffer(5, false),
            ],
        );

        let mut calculator = Self {
            init_pipeline: create_compute_pipeline(
                device,
                &shader,
                "InitBounds",
                &layout,
            ),
            calc_pipeline: create_compute_pipeline(
                device,
                &shader,
                "CalcBounds",
                &layout,
            ),
            copy_pipeline: create_compute_pipeline(
                device,
                &shader,
                "CopyBounds",
                &layout,
            ),
            layout,
            params: SizedBuffer::new(
                device,
                "Trail Bounds Params",
                1,
                wgpu::BufferUsages::UNIFORM,
            ),
            pass_slots: SizedBuffer::new(
                device,
                "Trail Bounds Pass Params",
                1,
                wgpu::BufferUsages::UNIFORM,
            ),
            passes: Vec::new(),
            work: SizedBuffer::new(
                device,
                "Trail Bounds Work Buffer",
                0,
                wgpu::BufferUsages::STORAGE,
            ),
            bounds: SizedBuffer::new(
                device,
                "Trail Bounds Buffer",
                0,
                wgpu::BufferUsages::STORAGE,
            ),
        };
        calculator.resize(device, trail);
        Ok(calculator)
    }

    fn resize(&mut self, device: &wgpu::Device, trail: &GpuTrail) {
        let trail_num = trail.trail_num() as usize;
        let node_num = trail.node_num_per_trail();
        let _ = self.work.ensure_len(device, trail_num * node_num as usize);
        let _ = self.bounds.ensure_len(device, trail_num);

        let passes = reduction_passes(node_num);
        if passes != self.passes {
            let _ = self.pass_slots.ensure_len(device, passes.len().max(1));
            self.passes = passes;
        }
    }

    /// Record the full bounds computation for `trail`.
    pub fn calc_bounds(
        &mut self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        trail: &GpuTrail,
        trail_width: f32,
    ) {
        let device = &context.device;
        self.resize(device, trail);

        let trail_num = trail.trail_num();
        let node_num = trail.node_num_per_trail();
        self.params.write(
            &context.queue,
            &[BoundsParams {
                trail_num,
                node_num_per_trail: node_num,
                half_width: trail_width * 0.5,
                _pad: 0,
            }],
        );
        let slots: Vec<PassSlot> = self
            .passes
            .iter()
            .map(|p| PassSlot {
                step: p.step,
                len: p.len,
                _pad_a: [0; 2],
                _pad_b: [[0; 4]; 15],
            })
            .collect();
        self.pass_slots.write(&context.queue, &slots);

        let bind_group = self.create_bind_group(device, trail);

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Trail Bounds Pass"),
            timestamp_writes: None,
        });

        pass.set_bind_group(0, &bind_group, &[0]);
        pass.set_pipeline(&self.init_pipeline);
        let [x, y] = workgroup_grid(trail_num * node_num);
        pass.dispatch_workgroups(x, y, 1);

        pass.set_pipeline(&self.calc_pipeline);
        for (i, bounds_pass) in self.passes.iter().enumerate() {
            let offset = (i as u64 * PASS_SLOT_SIZE) as u32;
            pass.set_bind_group(0, &bind_group, &[offset]);
            let [x, y] = workgroup_grid(trail_num * (bounds_pass.len / 2));
            pass.dispatch_workgroups(x, y, 1);
        }

        pass.set_bind_group(0, &bind_group, &[0]);
        pass.set_pipeline(&self.copy_pipeline);
        pass.dispatch_workgroups(workgroup_count(trail_num), 1, 1);
    }

    fn create_bind_group(
        &self,
        device: &wgpu::Device,
        trail: &GpuTrail,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trail Bounds Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.params.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Buffer(
                        wgpu::BufferBinding {
                            buffer: self.pass_slots.buffer(),
                            offset: 0,
                            size: NonZeroU64::new(PASS_PARAMS_SIZE),
                        },
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: trail.trail_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: trail.node_buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: self.work.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: self.bounds.buffer().as_entire_binding(),
                },
            ],
        })
    }

    /// Published per-trail bounds, `trail_num` [`Aabb`]s.
    pub fn bounds_buffer(&self) -> &wgpu::Buffer {
        self.bounds.buffer()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    fn naive_bounds(positions: &[Vec3]) -> Aabb {
        positions
            .iter()
            .fold(Aabb::EMPTY, |acc, &p| acc.merge(&Aabb::from_point(p)))
    }

    #[test]
    fn pass_count_is_ceil_log2() {
        assert!(reduction_passes(1).is_empty());
        assert_eq!(reduction_passes(2).len(), 1);
        assert_eq!(reduction_passes(5).len(), 3);
        assert_eq!(reduction_passes(64).len(), 6);
        assert_eq!(reduction_passes(65).len(), 7);

        let passes = reduction_passes(5);
        assert_eq!(passes[0], BoundsPass { step: 3, len: 5 });
        assert_eq!(passes[1], BoundsPass { step: 2, len: 3 });
        assert_eq!(passes[2], BoundsPass { step: 1, len: 2 });
    }

    #[test]
    fn reduction_matches_naive_for_any_length() {
        let mut rng = StdRng::seed_from_u64(7);
        for n in 1..=130 {
            let positions: Vec<Vec3> = (0..n)
                .map(|_| {
                    Vec3::new(
                        rng.random_range(-100.0..100.0),
                        rng.random_range(-100.0..100.0),
                        rng.random_range(-100.0..100.0),
                    )
                })
                .collect();
            assert_eq!(reduce_bounds(&positions), naive_bounds(&positions));
        }
    }

    #[test]
    fn partially_filled_ring_ignores_unwritten_slots() {
        let mut ring = TrailRing::new(8);
        ring.push(Vec3::new(1.0, 1.0, 1.0));
        ring.push(Vec3::new(3.0, 2.0, 1.0));

        let b = trail_bounds(&ring, 0.0);
        // Zeroed slots would have pulled min to the origin.
        assert_eq!(b.min_vec(), Vec3::new(1.0, 1.0, 1.0));
        assert_eq!(b.max_vec(), Vec3::new(3.0, 2.0, 1.0));

        let wide = trail_bounds(&ring, 2.0);
        assert_eq!(wide.min_vec(), Vec3::ZERO);
        assert_eq!(wide.max_vec(), Vec3::new(4.0, 3.0, 2.0));
    }

    #[test]
    fn unwritten_trail_has_empty_bounds() {
        assert!(trail_bounds(&TrailRing::new(8), 1.0).is_empty());
        assert!(reduce_bounds(&[]).is_empty());
    }

    #[test]
    fn pass_slot_matches_dynamic_offset_alignment() {
        assert_eq!(PASS_SLOT_SIZE, 256);
    }
}
