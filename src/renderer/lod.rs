//! One LOD tier: ribbon vertex generation, indirect args and the draw.
//!
//! Each tier owns a vertex buffer with `2 * NodeNumPerTrailWithLod` vertices
//! per trail, a static triangle index buffer shared by every instance, and
//! a `draw_indexed_indirect` args buffer. A trail's vertices are only
//! regenerated when it received new nodes, moved to this tier, or a forced
//! update was requested.

use glam::Vec3;

use super::args::{
    ArgsBufferMultiply, DrawIndexedIndirectArgs, INSTANCE_COUNT_OFFSET,
};
use super::index_buffer::{IndexDispatcher, TrailIndexBuffer};
use super::pipeline_util;
use crate::camera::core::Camera;
use crate::error::TrailError;
use crate::gpu::pipeline_helpers::{
    bind_group_layout, buffer_bind_group, create_compute_pipeline, dispatch,
    dispatch_indirect, storage_buffer, uniform_buffer, workgroup_count,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::{Shader, ShaderComposer};
use crate::gpu::sized_buffer::SizedBuffer;
use crate::options::{LodSetting, MaterialUniform, TrailBlend, TrailMaterial};
use crate::trail::{slot_by_age, GpuTrail, TrailRing};

/// Ribbon vertex written by `UpdateVertex`.
#[repr(C)]
#[derive(
    Debug, Copy, Clone, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable,
)]
pub struct TrailVertex {
    /// World-space position.
    pub position: [f32; 3],
    pub(crate) _pad_a: f32,
    /// `x`: 0 at the newest node, 1 at the oldest. `y`: 0 left, 1 right.
    pub uv: [f32; 2],
    pub(crate) _pad_b: [f32; 2],
    /// Color of the source node.
    pub color: [f32; 4],
}

/// Ribbon width at the newest and oldest node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailWidths {
    /// Width at the newest node.
    pub start: f32,
    /// Width at the oldest node.
    pub end: f32,
}

/// Where a tier's trail list came from on a given frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexSource {
    /// No list; every trail is processed.
    All,
    /// The frustum culling output.
    Culling,
    /// This tier's LOD selection output.
    Lod,
}

/// Triangle list for one ribbon of `node_num_with_lod` vertex pairs.
#[must_use]
pub fn ribbon_indices(node_num_with_lod: u32) -> Vec<u32> {
    (0..node_num_with_lod.saturating_sub(1))
        .flat_map(|s| {
            let v = s * 2;
            [v, v + 1, v + 2, v + 2, v + 1, v + 3]
        })
        .collect()
}

fn any_perpendicular(v: Vec3) -> Vec3 {
    let axis = if v.x.abs() > 0.9 { Vec3::Y } else { Vec3::X };
    v.cross(axis).try_normalize().unwrap_or(Vec3::X)
}

/// Unit vector across the ribbon at a node with segment direction `dir`.
#[must_use]
pub fn side_vector(dir: Vec3, to_camera: Vec3) -> Vec3 {
    let side = dir.cross(to_camera);
    if side.length_squared() > 1e-12 {
        return side.normalize();
    }
    if dir.length_squared() > 1e-12 {
        return any_perpendicular(dir);
    }
    any_perpendicular(to_camera)
}

/// Host rendition of `UpdateVertex` for one trail.
#[must_use]
pub fn generate_trail_vertices(
    ring: &TrailRing,
    lod_node_step: u32,
    widths: TrailWidths,
    camera: &Camera,
) -> Vec<TrailVertex> {
    let capacity = ring.capacity();
    let node_num_with_lod = capacity / lod_node_step.max(1);
    let mut vertices =
        vec![TrailVertex::default(); (node_num_with_lod * 2) as usize];
    if ring.total() == 0 || node_num_with_lod == 0 {
        return vertices;
    }

    let last = node_num_with_lod - 1;
    let retained = |k: u32| -> Vec3 {
        slot_by_age(ring.total(), capacity, k * lod_node_step)
            .map_or(Vec3::ZERO, |slot| ring.slots()[slot as usize])
    };

    for k in 0..node_num_with_lod {
        let position = retained(k);
        let newer = retained(k.max(1) - 1);
        let older = retained((k + 1).min(last));
        let to_camera = if camera.is_orthographic() {
            -camera.forward()
        } else {
            camera.eye - position
        };
        let side = side_vector(newer - older, to_camera);

        let t = if last > 0 { k as f32 / last as f32 } else { 0.0 };
        let half_width = (widths.start + (widths.end - widths.start) * t) * 0.5;
        let pair = ((last - k) * 2) as usize;

        vertices[pair] = TrailVertex {
            position: (position - side * half_width).to_array(),
            uv: [t, 0.0],
            ..Default::default()
        };
        vertices[pair + 1] = TrailVertex {
            position: (position + side * half_width).to_array(),
            uv: [t, 1.0],
            ..Default::default()
        };
    }
    vertices
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct VertexParams {
    camera_pos: [f32; 3],
    is_orthographic: u32,
    camera_forward: [f32; 3],
    start_width: f32,
    end_width: f32,
    trail_num: u32,
    node_num_per_trail: u32,
    lod_node_step: u32,
    node_num_with_lod: u32,
    lod_index: u32,
    frame_count: u32,
    force_update: u32,
    use_index_buffer: u32,
    _pad: [u32; 3],
}

/// Pipelines and layouts shared by every tier.
pub struct LodPipelines {
    update_vertex: wgpu::ComputePipeline,
    vertex_layout: wgpu::BindGroupLayout,
    draw_layout: wgpu::BindGroupLayout,
    draw_alpha: wgpu::RenderPipeline,
    draw_additive: wgpu::RenderPipeline,
    args_multiply: ArgsBufferMultiply,
}

impl LodPipelines {
    /// Compose the vertex, args and draw shaders and build one draw
    /// pipeline per blend mode for the context's target formats.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::Shader`] if a shader fails to compose.
    pub fn new(
        context: &RenderContext,
        shader_composer: &mut ShaderComposer,
    ) -> Result<Self, TrailError> {
        let device = &context.device;
        let shader = shader_composer.compose(device, Shader::UpdateVertex)?;
        let vertex_layout = bind_group_layout(
            device,
            "Trail Update Vertex",
            &[
                uniform_buffer(0),
                storage_buffer(1, false),
                storage_buffer(2, true),
                storage_buffer(3, true),
                storage_buffer(4, true),
                storage_buffer(5, false),
            ],
        );
        let update_vertex = create_compute_pipeline(
            device,
            &shader,
            "UpdateVertex",
            &vertex_layout,
        );

        let read_only = wgpu::BufferBindingType::Storage { read_only: true };
        let draw_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Trail Draw Bind Group Layout"),
                entries: &[
                    pipeline_util::raster_buffer(
                        0,
                        wgpu::ShaderStages::VERTEX,
                        wgpu::BufferBindingType::Uniform,
                    ),
                    pipeline_util::raster_buffer(
                        1,
                        wgpu::ShaderStages::VERTEX_FRAGMENT,
                        wgpu::BufferBindingType::Uniform,
                    ),
                    pipeline_util::raster_buffer(
                        2,
                        wgpu::ShaderStages::VERTEX,
                        read_only,
                    ),
                    pipeline_util::raster_buffer(
                        3,
                        wgpu::ShaderStages::VERTEX,
                        read_only,
                    ),
                ],
            });

        let draw_shader = shader_composer.compose(device, Shader::TrailDraw)?;
        let draw_alpha = Self::create_draw_pipeline(
            context,
            &draw_shader,
            &draw_layout,
            TrailBlend::Alpha,
        );
        let draw_additive = Self::create_draw_pipeline(
            context,
            &draw_shader,
            &draw_layout,
            TrailBlend::Additive,
        );

        Ok(Self {
            update_vertex,
            vertex_layout,
            draw_layout,
            draw_alpha,
            draw_additive,
            args_multiply: ArgsBufferMultiply::new(device, shader_composer)?,
        })
    }

    fn create_draw_pipeline(
        context: &RenderContext,
        shader: &wgpu::ShaderModule,
        layout: &wgpu::BindGroupLayout,
        blend: TrailBlend,
    ) -> wgpu::RenderPipeline {
        let label = match blend {
            TrailBlend::Alpha => "Trail Draw Alpha",
            TrailBlend::Additive => "Trail Draw Additive",
        };
        let pipeline_layout = context.device.create_pipeline_layout(
            &wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{label} Pipeline Layout")),
                bind_group_layouts: &[layout],
                push_constant_ranges: &[],
            },
        );

        context
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&format!("{label} Pipeline")),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: shader,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader,
                    entry_point: Some("fs_main"),
                    targets: &pipeline_util::color_target(
                        context.color_format,
                        blend,
                    ),
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: context
                    .depth_format
                    .map(pipeline_util::depth_stencil_state),
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
    }

    fn draw_pipeline(&self, blend: TrailBlend) -> &wgpu::RenderPipeline {
        match blend {
            TrailBlend::Alpha => &self.draw_alpha,
            TrailBlend::Additive => &self.draw_additive,
        }
    }
}

/// Per-frame inputs to [`TrailLod::update_vertex_buffer`].
pub struct VertexUpdate<'a> {
    /// Camera the ribbons face.
    pub camera: &'a Camera,
    /// Trail history to expand.
    pub trail: &'a GpuTrail,
    /// Ribbon widths.
    pub widths: TrailWidths,
    /// Regenerate every listed trail regardless of its counters.
    pub force_update: bool,
    /// Trails to process; `None` means all of them.
    pub trail_indices: Option<&'a TrailIndexBuffer>,
    /// Where `trail_indices` came from.
    pub index_source: IndexSource,
    /// Stored into `Trail::last_updated_frame`.
    pub frame_count: u32,
}

/// GPU resources of one LOD tier.
pub struct TrailLod {
    lod_index: u32,
    setting: LodSetting,
    node_num_with_lod: u32,
    trail_num: u32,
    vertices: SizedBuffer<TrailVertex>,
    indices: SizedBuffer<u32>,
    args: SizedBuffer<DrawIndexedIndirectArgs>,
    args_bind_group: wgpu::BindGroup,
    vertex_params: SizedBuffer<VertexParams>,
    material: SizedBuffer<MaterialUniform>,
    last_source: Option<IndexSource>,
    dirty: bool,
}

impl TrailLod {
    /// Allocate tier `lod_index` for `trail`.
    pub fn new(
        device: &wgpu::Device,
        pipelines: &LodPipelines,
        lod_index: u32,
        setting: &LodSetting,
        trail: &GpuTrail,
    ) -> Self {
        let node_num = trail.node_num_per_trail();
        debug_assert!(
            setting.lod_node_step > 0 && setting.lod_node_step < node_num,
            "lod_node_step {} outside (0, {node_num})",
            setting.lod_node_step
        );
        let node_num_with_lod = setting.node_num_per_trail_with_lod(node_num);
        let trail_num = trail.trail_num();

        let vertices = SizedBuffer::new(
            device,
            &format!("Trail Lod {lod_index} Vertices"),
            (trail_num * node_num_with_lod * 2) as usize,
            wgpu::BufferUsages::STORAGE,
        );
        let indices = SizedBuffer::new_with_data(
            device,
            &format!("Trail Lod {lod_index} Indices"),
            &ribbon_indices(node_num_with_lod.max(2)),
            wgpu::BufferUsages::INDEX,
        );
        let args = SizedBuffer::new(
            device,
            &format!("Trail Lod {lod_index} Args"),
            1,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::INDIRECT,
        );
        let args_bind_group = pipelines.args_multiply.bind(device, &args);

        log::info!(
            "lod {lod_index}: step {}, {node_num_with_lod} nodes, {trail_num} \
             trails",
            setting.lod_node_step
        );

        Self {
            lod_index,
            setting: setting.clone(),
            node_num_with_lod,
            trail_num,
            vertices,
            indices,
            args,
            args_bind_group,
            vertex_params: SizedBuffer::new(
                device,
                &format!("Trail Lod {lod_index} Vertex Params"),
                1,
                wgpu::BufferUsages::UNIFORM,
            ),
            material: SizedBuffer::new(
                device,
                &format!("Trail Lod {lod_index} Material"),
                1,
                wgpu::BufferUsages::UNIFORM,
            ),
            last_source: None,
            dirty: true,
        }
    }

    /// `true` if this tier was built for `setting` and `trail`'s counts.
    pub fn matches(&self, setting: &LodSetting, trail: &GpuTrail) -> bool {
        self.setting.lod_node_step == setting.lod_node_step
            && self.trail_num == trail.trail_num()
            && self.node_num_with_lod
                == setting
                    .node_num_per_trail_with_lod(trail.node_num_per_trail())
    }

    /// Adopt `setting`'s enable flag, start distance and material. Buffer
    /// shapes are unaffected.
    pub fn apply_setting(&mut self, setting: &LodSetting) {
        self.setting = setting.clone();
    }

    /// Force the next vertex update to rebuild every listed trail.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Settings this tier runs with.
    pub fn setting(&self) -> &LodSetting {
        &self.setting
    }

    /// Vertex pairs per trail.
    pub fn node_num_with_lod(&self) -> u32 {
        self.node_num_with_lod
    }

    /// Vertices per trail.
    pub fn vertex_num_per_trail(&self) -> u32 {
        self.node_num_with_lod * 2
    }

    /// Indices per trail instance.
    pub fn index_num_per_trail(&self) -> u32 {
        self.node_num_with_lod.saturating_sub(1) * 6
    }

    /// Regenerate ribbons for the listed trails that need it.
    pub fn update_vertex_buffer(
        &mut self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &LodPipelines,
        dispatcher: &IndexDispatcher,
        update: &VertexUpdate<'_>,
    ) {
        let source_changed = self.last_source != Some(update.index_source);
        let force_update =
            update.force_update || source_changed || self.dirty;
        if force_update && !update.force_update {
            log::debug!(
                "lod {}: forcing vertex update (source {:?} -> {:?})",
                self.lod_index,
                self.last_source,
                update.index_source
            );
        }
        self.last_source = Some(update.index_source);
        self.dirty = false;

        let camera = update.camera;
        self.vertex_params.write(
            &context.queue,
            &[VertexParams {
                camera_pos: camera.eye.to_array(),
                is_orthographic: u32::from(camera.is_orthographic()),
                camera_forward: camera.forward().to_array(),
                start_width: update.widths.start,
                end_width: update.widths.end,
                trail_num: self.trail_num,
                node_num_per_trail: update.trail.node_num_per_trail(),
                lod_node_step: self.setting.lod_node_step,
                node_num_with_lod: self.node_num_with_lod,
                lod_index: self.lod_index,
                frame_count: update.frame_count,
                force_update: u32::from(force_update),
                use_index_buffer: u32::from(update.trail_indices.is_some()),
                _pad: [0; 3],
            }],
        );

        let list = update
            .trail_indices
            .unwrap_or_else(|| dispatcher.placeholder());
        let bind_group = buffer_bind_group(
            &context.device,
            "Trail Update Vertex",
            &pipelines.vertex_layout,
            &[
                self.vertex_params.buffer(),
                update.trail.trail_buffer(),
                update.trail.node_buffer(),
                list.counter_buffer(),
                list.data_buffer(),
                self.vertices.buffer(),
            ],
        );

        match update.trail_indices {
            Some(indices) => dispatch_indirect(
                encoder,
                "Trail Update Vertex Pass",
                &pipelines.update_vertex,
                &bind_group,
                indices.dispatch_args_buffer(),
                0,
            ),
            None => dispatch(
                encoder,
                "Trail Update Vertex Pass",
                &pipelines.update_vertex,
                &bind_group,
                workgroup_count(self.trail_num),
            ),
        }
    }

    /// Draw exactly the trails in `trail_indices`: copy its counter into
    /// `instance_count`, doubled for stereo.
    pub fn update_args_buffer(
        &self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        pipelines: &LodPipelines,
        trail_indices: &TrailIndexBuffer,
        stereo: bool,
    ) {
        self.args.write(
            &context.queue,
            &[DrawIndexedIndirectArgs::all_trails(
                self.index_num_per_trail(),
                0,
                false,
            )],
        );
        encoder.copy_buffer_to_buffer(
            trail_indices.counter_buffer(),
            0,
            self.args.buffer(),
            INSTANCE_COUNT_OFFSET,
            4,
        );
        if stereo {
            pipelines
                .args_multiply
                .dispatch(encoder, &self.args_bind_group);
        }
    }

    /// Draw every trail.
    pub fn reset_args_buffer(&self, queue: &wgpu::Queue, stereo: bool) {
        self.args.write(
            queue,
            &[DrawIndexedIndirectArgs::all_trails(
                self.index_num_per_trail(),
                self.trail_num,
                stereo,
            )],
        );
    }

    /// Upload the material uniform and build the draw bind group for this
    /// frame's trail list.
    pub(crate) fn prepare_draw(
        &self,
        context: &RenderContext,
        pipelines: &LodPipelines,
        dispatcher: &IndexDispatcher,
        camera_uniform: &wgpu::Buffer,
        material: &TrailMaterial,
        trail_indices: Option<&TrailIndexBuffer>,
    ) -> wgpu::BindGroup {
        self.material.write(
            &context.queue,
            &[MaterialUniform::new(
                material,
                self.vertex_num_per_trail(),
                trail_indices.is_some(),
            )],
        );
        let list = trail_indices.unwrap_or_else(|| dispatcher.placeholder());
        buffer_bind_group(
            &context.device,
            "Trail Draw",
            &pipelines.draw_layout,
            &[
                camera_uniform,
                self.material.buffer(),
                self.vertices.buffer(),
                list.data_buffer(),
            ],
        )
    }

    /// Record the indexed-indirect draw.
    pub(crate) fn draw(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        pipelines: &LodPipelines,
        material: &TrailMaterial,
        bind_group: &wgpu::BindGroup,
    ) {
        if self.index_num_per_trail() == 0 {
            return;
        }
        pass.set_pipeline(pipelines.draw_pipeline(material.blend));
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_index_buffer(
            self.indices.buffer().slice(..),
            wgpu::IndexFormat::Uint32,
        );
        pass.draw_indexed_indirect(self.args.buffer(), 0);
    }

    /// Vertex storage, `trail_num * vertex_num_per_trail` vertices.
    pub fn vertex_buffer(&self) -> &wgpu::Buffer {
        self.vertices.buffer()
    }

    /// Draw arguments.
    pub fn args_buffer(&self) -> &wgpu::Buffer {
        self.args.buffer()
    }
}
