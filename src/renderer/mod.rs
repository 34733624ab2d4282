//! The trail rendering pipeline.
//!
//! [`TrailRenderer`] owns the trail store and every GPU stage and drives
//! them in dependency order:
//!
//! - [`TrailRenderer::update`] (once per frame): append nodes, compute
//!   bounds.
//! - [`TrailRenderer::render_camera`] (once per visible camera): cull,
//!   select LOD, regenerate vertices, assemble indirect args, draw.
//!
//! Each call records into its own command encoder and submits it, so the
//! uniforms written for one camera never leak into another camera's
//! commands.

/// Indirect draw arguments and the stereo multiply kernel.
pub mod args;
/// Per-trail bounds reduction.
pub mod bounds;
/// Frustum culling of trails.
pub mod culling;
/// Append buffers of trail indices and indirect dispatch sizing.
pub mod index_buffer;
/// One LOD tier: vertex generation, args and draw.
pub mod lod;
/// Distance-based LOD partitioning.
pub mod lod_select;
mod pipeline_util;

use glam::Vec3;

use self::bounds::TrailBoundsCalculator;
use self::culling::TrailCulling;
use self::index_buffer::{IndexDispatcher, TrailIndexBuffer};
use self::lod::{IndexSource, LodPipelines, TrailLod, TrailWidths, VertexUpdate};
use self::lod_select::{LodBands, TrailLodSelector};
use crate::camera::core::CameraUniform;
use crate::camera::view::CameraView;
use crate::error::TrailError;
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::ShaderComposer;
use crate::gpu::sized_buffer::SizedBuffer;
use crate::options::TrailOptions;
use crate::trail::{GpuTrail, InputNode};

/// Views trails are drawn into. Depth must be present exactly when the
/// context was created with a depth format.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget<'a> {
    /// Color attachment; loaded, blended over and stored.
    pub color: &'a wgpu::TextureView,
    /// Scene depth; tested, never written.
    pub depth: Option<&'a wgpu::TextureView>,
}

/// `true` if the camera moved since the previous render call (or there was
/// none), which forces every visible ribbon to be rebuilt.
#[must_use]
pub fn camera_moved(previous: Option<Vec3>, eye: Vec3) -> bool {
    previous.is_none_or(|p| p.distance(eye) > f32::EPSILON)
}

/// Index list a tier consumes given the culling toggle and tier count.
#[must_use]
pub fn index_source(culling: bool, tier_num: usize) -> IndexSource {
    if tier_num > 1 {
        IndexSource::Lod
    } else if culling {
        IndexSource::Culling
    } else {
        IndexSource::All
    }
}

/// GPU particle-trail renderer.
pub struct TrailRenderer {
    options: TrailOptions,
    trail: GpuTrail,
    dispatcher: IndexDispatcher,
    bounds: TrailBoundsCalculator,
    culling: TrailCulling,
    lod_selector: TrailLodSelector,
    lod_pipelines: LodPipelines,
    lods: Vec<TrailLod>,
    camera_uniform: SizedBuffer<CameraUniform>,
    last_camera_pos: Option<Vec3>,
    frame_count: u32,
}

impl TrailRenderer {
    /// Build every stage for `options`.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::InvalidConfig`] if `options` fail validation and
    /// [`TrailError::Shader`] if a shader fails to compose.
    pub fn new(
        context: &RenderContext,
        options: TrailOptions,
    ) -> Result<Self, TrailError> {
        let mut options = options;
        options.validate()?;

        let device = &context.device;
        let mut shader_composer = ShaderComposer::new()?;
        let trail = GpuTrail::new(
            context,
            &mut shader_composer,
            options.trail_num,
            options.node_num_per_trail,
        )?;
        let dispatcher = IndexDispatcher::new(device, &mut shader_composer)?;
        let bounds =
            TrailBoundsCalculator::new(device, &mut shader_composer, &trail)?;
        let mut culling = TrailCulling::new(
            device,
            &mut shader_composer,
            &dispatcher,
            options.trail_num,
        )?;
        culling.debug_camera_offset =
            options.debug.camera_offset.map(Vec3::from_array);
        let lod_selector = TrailLodSelector::new(device, &mut shader_composer)?;
        let lod_pipelines = LodPipelines::new(context, &mut shader_composer)?;
        let camera_uniform = SizedBuffer::new(
            device,
            "Trail Camera Uniform",
            1,
            wgpu::BufferUsages::UNIFORM,
        );

        let mut renderer = Self {
            options,
            trail,
            dispatcher,
            bounds,
            culling,
            lod_selector,
            lod_pipelines,
            lods: Vec::new(),
            camera_uniform,
            last_camera_pos: None,
            frame_count: 0,
        };
        renderer.sync_lods(device);
        Ok(renderer)
    }

    /// Current options.
    pub fn options(&self) -> &TrailOptions {
        &self.options
    }

    /// Apply new options. Changing the trail or node count reallocates the
    /// store and drops all history; LOD changes rebuild the affected tiers.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::InvalidConfig`] if `options` fail validation.
    pub fn set_options(
        &mut self,
        context: &RenderContext,
        options: TrailOptions,
    ) -> Result<(), TrailError> {
        let mut options = options;
        options.validate()?;
        let _ = self.trail.resize(
            &context.device,
            options.trail_num,
            options.node_num_per_trail,
        )?;
        self.culling.debug_camera_offset =
            options.debug.camera_offset.map(Vec3::from_array);
        self.options = options;
        self.sync_lods(&context.device);
        Ok(())
    }

    /// Rebuild the tier list if the tier count or any tier's buffer shape
    /// changed; otherwise refresh enable flags, distances and materials.
    fn sync_lods(&mut self, device: &wgpu::Device) {
        let settings = &self.options.lods;
        let up_to_date = self.lods.len() == settings.len()
            && self
                .lods
                .iter()
                .zip(settings)
                .all(|(lod, setting)| lod.matches(setting, &self.trail));

        if up_to_date {
            for (lod, setting) in self.lods.iter_mut().zip(settings) {
                lod.apply_setting(setting);
            }
            return;
        }

        log::info!("rebuilding {} lod tiers", settings.len());
        self.lods = settings
            .iter()
            .enumerate()
            .map(|(i, setting)| {
                TrailLod::new(
                    device,
                    &self.lod_pipelines,
                    i as u32,
                    setting,
                    &self.trail,
                )
            })
            .collect();
    }

    /// Upload this frame's input nodes (one per trail, in trail order).
    pub fn write_input(&self, queue: &wgpu::Queue, input: &[InputNode]) {
        self.trail.write_input(queue, input);
    }

    /// Per-frame simulation step: append nodes, then compute bounds for
    /// culling. Call once per frame before any [`Self::render_camera`].
    pub fn update(&mut self, context: &RenderContext) {
        self.sync_lods(&context.device);
        let debug = &self.options.debug;

        let mut encoder = context.create_encoder("Trail Update Encoder");
        if debug.append_node {
            self.trail.append_node(
                &mut encoder,
                &context.queue,
                self.trail.frame_time(),
            );
        }
        if debug.culling {
            self.bounds.calc_bounds(
                context,
                &mut encoder,
                &self.trail,
                self.options.max_width(),
            );
        }
        context.submit(encoder);
        self.frame_count = self.frame_count.wrapping_add(1);
    }

    /// Cull, select LOD, rebuild ribbons and draw for one camera.
    ///
    /// Does nothing if the view is not the target camera or does not render
    /// the trail layer.
    pub fn render_camera(
        &mut self,
        context: &RenderContext,
        view: &CameraView<'_>,
        target: &RenderTarget<'_>,
    ) {
        if !view.accepts(self.options.target_camera, self.options.layer) {
            return;
        }
        debug_assert_eq!(
            target.depth.is_some(),
            context.depth_format.is_some(),
            "render target depth must match the context depth format"
        );
        self.sync_lods(&context.device);

        let camera = view.camera;
        let force_update = camera_moved(self.last_camera_pos, camera.eye);
        if force_update {
            log::debug!("camera moved, forcing vertex update");
        }
        self.last_camera_pos = Some(camera.eye);

        let stereo_eyes = view.stereo_eyes.filter(|_| self.options.stereo);
        self.camera_uniform.write(
            &context.queue,
            &[CameraUniform::new(camera, stereo_eyes)],
        );

        let mut encoder = context.create_encoder("Trail Render Encoder");
        let culling = self.options.debug.culling;
        let trail_num = self.trail.trail_num();
        if culling {
            let _ = self.culling.calc_trail_index_buffer(
                context,
                &mut encoder,
                &self.dispatcher,
                camera,
                self.bounds.bounds_buffer(),
                trail_num,
            );
        }

        let source = index_source(culling, self.lods.len());
        if source == IndexSource::Lod {
            let start_distances: Vec<f32> = self
                .lods
                .iter()
                .map(|lod| lod.setting().start_distance)
                .collect();
            let _ = self.lod_selector.calc_trail_index_buffers(
                context,
                &mut encoder,
                &self.dispatcher,
                &LodBands {
                    start_distances: &start_distances,
                    camera_pos: camera.eye,
                },
                &self.trail,
                culling.then(|| self.culling.index_buffer()),
            );
        }

        let lists: Vec<Option<&TrailIndexBuffer>> = (0..self.lods.len())
            .map(|i| match source {
                IndexSource::Lod => self.lod_selector.index_buffers().get(i),
                IndexSource::Culling => Some(self.culling.index_buffer()),
                IndexSource::All => None,
            })
            .collect();

        let widths = TrailWidths {
            start: self.options.start_width,
            end: self.options.end_width,
        };
        let stereo = stereo_eyes.is_some();
        for (lod, &list) in self.lods.iter_mut().zip(&lists) {
            if !lod.setting().enable {
                continue;
            }
            if self.options.debug.update_vertex {
                lod.update_vertex_buffer(
                    context,
                    &mut encoder,
                    &self.lod_pipelines,
                    &self.dispatcher,
                    &VertexUpdate {
                        camera,
                        trail: &self.trail,
                        widths,
                        force_update,
                        trail_indices: list,
                        index_source: source,
                        frame_count: self.frame_count,
                    },
                );
            }
            match list {
                Some(list) => lod.update_args_buffer(
                    context,
                    &mut encoder,
                    &self.lod_pipelines,
                    list,
                    stereo,
                ),
                None => lod.reset_args_buffer(&context.queue, stereo),
            }
        }

        if self.options.debug.rendering {
            self.draw(context, &mut encoder, &lists, target);
        }
        context.submit(encoder);
    }

    fn draw(
        &self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        lists: &[Option<&TrailIndexBuffer>],
        target: &RenderTarget<'_>,
    ) {
        let draws: Vec<(&TrailLod, wgpu::BindGroup)> = self
            .lods
            .iter()
            .zip(lists)
            .filter(|(lod, _)| lod.setting().enable)
            .map(|(lod, &list)| {
                let material = lod
                    .setting()
                    .material
                    .as_ref()
                    .unwrap_or(&self.options.default_material);
                let bind_group = lod.prepare_draw(
                    context,
                    &self.lod_pipelines,
                    &self.dispatcher,
                    self.camera_uniform.buffer(),
                    material,
                    list,
                );
                (lod, bind_group)
            })
            .collect();

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Trail Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: target.depth.map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            ..Default::default()
        });

        for (lod, bind_group) in &draws {
            let material = lod
                .setting()
                .material
                .as_ref()
                .unwrap_or(&self.options.default_material);
            lod.draw(&mut pass, &self.lod_pipelines, material, bind_group);
        }
    }

    /// Restart every trail without reallocating.
    pub fn reset(&mut self, context: &RenderContext) {
        let mut encoder = context.create_encoder("Trail Reset Encoder");
        self.trail.reset(&mut encoder);
        context.submit(encoder);
        for lod in &mut self.lods {
            lod.mark_dirty();
        }
        log::info!("trails reset");
    }

    /// The trail store.
    pub fn gpu_trail(&self) -> &GpuTrail {
        &self.trail
    }

    /// Configured tiers, in ascending distance order.
    pub fn lods(&self) -> &[TrailLod] {
        &self.lods
    }

    /// Per-trail bounds from the last [`Self::update`] with culling on.
    pub fn bounds_buffer(&self) -> &wgpu::Buffer {
        self.bounds.bounds_buffer()
    }

    /// Visible-trail list from the last culled [`Self::render_camera`].
    pub fn culling_index_buffer(&self) -> &TrailIndexBuffer {
        self.culling.index_buffer()
    }

    /// Per-tier lists from the last multi-tier [`Self::render_camera`].
    pub fn lod_index_buffers(&self) -> &[TrailIndexBuffer] {
        self.lod_selector.index_buffers()
    }

    /// Frames stepped by [`Self::update`].
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_render_and_moves_force_update() {
        let eye = Vec3::new(1.0, 2.0, 3.0);
        assert!(camera_moved(None, eye));
        assert!(!camera_moved(Some(eye), eye));
        assert!(camera_moved(Some(eye), eye + Vec3::new(0.0, 0.01, 0.0)));
    }

    #[test]
    fn index_source_follows_toggles() {
        assert_eq!(index_source(false, 1), IndexSource::All);
        assert_eq!(index_source(true, 1), IndexSource::Culling);
        assert_eq!(index_source(true, 3), IndexSource::Lod);
        // Culling off with several tiers: LOD selection over every trail.
        assert_eq!(index_source(false, 2), IndexSource::Lod);
    }
}
