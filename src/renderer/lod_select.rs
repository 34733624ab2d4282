//! Distance-banded partitioning of trails into LOD tiers.

use glam::Vec3;

use super::index_buffer::{IndexDispatcher, TrailIndexBuffer};
use crate::error::TrailError;
use crate::gpu::pipeline_helpers::{
    bind_group_layout, buffer_bind_group, create_compute_pipeline, dispatch,
    dispatch_indirect, storage_buffer, uniform_buffer, workgroup_count,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::{Shader, ShaderComposer};
use crate::gpu::sized_buffer::SizedBuffer;
use crate::trail::GpuTrail;

/// `[min, max)` camera-distance band of every tier. The first band starts
/// at 0 and the last one is open-ended.
#[must_use]
pub fn lod_intervals(start_distances: &[f32]) -> Vec<(f32, f32)> {
    let last = start_distances.len().saturating_sub(1);
    start_distances
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let min = if i == 0 { 0.0 } else { start };
            let max = if i == last {
                f32::MAX
            } else {
                start_distances[i + 1]
            };
            (min, max)
        })
        .collect()
}

/// Tier a trail `distance` units from the camera falls into.
#[must_use]
pub fn select_lod(distance: f32, start_distances: &[f32]) -> usize {
    let intervals = lod_intervals(start_distances);
    intervals
        .iter()
        .position(|&(min, max)| distance >= min && distance < max)
        .unwrap_or_else(|| intervals.len().saturating_sub(1))
}

/// Camera-side inputs to LOD selection.
#[derive(Debug, Clone, Copy)]
pub struct LodBands<'a> {
    /// Start distance of every tier, ascending.
    pub start_distances: &'a [f32],
    /// World-space camera position distances are measured from.
    pub camera_pos: Vec3,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct LodParams {
    camera_pos: [f32; 3],
    min_distance: f32,
    max_distance: f32,
    trail_num: u32,
    node_num_per_trail: u32,
    use_candidates: u32,
}

/// `CalcLod` kernel plus one trail list and one parameter block per tier.
pub struct TrailLodSelector {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    params: Vec<SizedBuffer<LodParams>>,
    lists: Vec<TrailIndexBuffer>,
}

impl TrailLodSelector {
    /// Compose the kernel. Tier lists are allocated on first use.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::Shader`] if the LOD shader fails to compose.
    pub fn new(
        device: &wgpu::Device,
        shader_composer: &mut ShaderComposer,
    ) -> Result<Self, TrailError> {
        let shader = shader_composer.compose(device, Shader::CalcLod)?;
        let layout = bind_group_layout(
            device,
            "Trail Calc Lod",
            &[
                uniform_buffer(0),
                storage_buffer(1, true),
                storage_buffer(2, true),
                storage_buffer(3, true),
                storage_buffer(4, true),
                storage_buffer(5, false),
                storage_buffer(6, false),
            ],
        );
        let pipeline =
            create_compute_pipeline(device, &shader, "CalcLod", &layout);

        Ok(Self {
            pipeline,
            layout,
            params: Vec::new(),
            lists: Vec::new(),
        })
    }

    fn ensure_tiers(
        &mut self,
        device: &wgpu::Device,
        dispatcher: &IndexDispatcher,
        tier_num: usize,
        trail_num: u32,
    ) {
        if self.lists.len() != tier_num {
            log::info!("lod selector: {tier_num} tiers");
        }
        self.lists.truncate(tier_num);
        self.params.truncate(tier_num);
        while self.lists.len() < tier_num {
            let i = self.lists.len();
            self.lists.push(TrailIndexBuffer::new(
                device,
                dispatcher,
                &format!("Trail Lod {i} Index"),
                trail_num,
            ));
            self.params.push(SizedBuffer::new(
                device,
                &format!("Trail Lod {i} Params"),
                1,
                wgpu::BufferUsages::UNIFORM,
            ));
        }
        for list in &mut self.lists {
            let _ = list.ensure_capacity(device, trail_num);
        }
    }

    /// Split `candidates` (or every trail when `None`) into one list per
    /// tier of `bands`. Never-written trails land in no list.
    pub fn calc_trail_index_buffers(
        &mut self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        dispatcher: &IndexDispatcher,
        bands: &LodBands<'_>,
        trail: &GpuTrail,
        candidates: Option<&TrailIndexBuffer>,
    ) -> &[TrailIndexBuffer] {
        let device = &context.device;
        let trail_num = trail.trail_num();
        let intervals = lod_intervals(bands.start_distances);
        self.ensure_tiers(device, dispatcher, intervals.len(), trail_num);

        let source = candidates.unwrap_or_else(|| dispatcher.placeholder());
        for (tier, &(min_distance, max_distance)) in intervals.iter().enumerate()
        {
            let list = &self.lists[tier];
            let params = &self.params[tier];
            params.write(
                &context.queue,
                &[LodParams {
                    camera_pos: bands.camera_pos.to_array(),
                    min_distance,
                    max_distance,
                    trail_num,
                    node_num_per_trail: trail.node_num_per_trail(),
                    use_candidates: u32::from(candidates.is_some()),
                }],
            );
            let bind_group = buffer_bind_group(
                device,
                "Trail Calc Lod",
                &self.layout,
                &[
                    params.buffer(),
                    trail.trail_buffer(),
                    trail.node_buffer(),
                    source.counter_buffer(),
                    source.data_buffer(),
                    list.counter_buffer(),
                    list.data_buffer(),
                ],
            );

            list.clear(encoder);
            match candidates {
                Some(candidates) => dispatch_indirect(
                    encoder,
                    "Trail Calc Lod Pass",
                    &self.pipeline,
                    &bind_group,
                    candidates.dispatch_args_buffer(),
                    0,
                ),
                None => dispatch(
                    encoder,
                    "Trail Calc Lod Pass",
                    &self.pipeline,
                    &bind_group,
                    workgroup_count(trail_num),
                ),
            }
        }

        for list in &self.lists {
            dispatcher.write_args(encoder, list);
        }
        &self.lists
    }

    /// Lists written by the last [`Self::calc_trail_index_buffers`].
    pub fn index_buffers(&self) -> &[TrailIndexBuffer] {
        &self.lists
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_band_starts_at_zero_and_last_is_open() {
        let intervals = lod_intervals(&[5.0, 50.0, 200.0]);
        assert_eq!(
            intervals,
            vec![(0.0, 50.0), (50.0, 200.0), (200.0, f32::MAX)]
        );
    }

    #[test]
    fn two_tier_routing() {
        let starts = [0.0, 50.0];
        assert_eq!(select_lod(10.0, &starts), 0);
        assert_eq!(select_lod(49.999, &starts), 0);
        // Lower bound inclusive.
        assert_eq!(select_lod(50.0, &starts), 1);
        assert_eq!(select_lod(80.0, &starts), 1);
        assert_eq!(select_lod(1.0e30, &starts), 1);
    }

    #[test]
    fn single_tier_takes_everything() {
        assert_eq!(select_lod(0.0, &[25.0]), 0);
        assert_eq!(select_lod(1000.0, &[25.0]), 0);
    }

    #[test]
    fn bands_partition_distances() {
        let starts = [0.0, 10.0, 20.0, 40.0];
        let intervals = lod_intervals(&starts);
        for d in (0..1000).map(|i| i as f32 * 0.1) {
            let hits = intervals
                .iter()
                .filter(|&&(min, max)| d >= min && d < max)
                .count();
            assert_eq!(hits, 1, "distance {d} hit {hits} tiers");
        }
    }
}
