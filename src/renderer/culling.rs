//! Frustum culling of whole trails against their published bounds.

use glam::Vec3;

use super::index_buffer::{IndexDispatcher, TrailIndexBuffer};
use crate::camera::core::Camera;
use crate::camera::frustum::{Frustum, Plane};
use crate::error::TrailError;
use crate::gpu::pipeline_helpers::{
    bind_group_layout, buffer_bind_group, create_compute_pipeline, dispatch,
    storage_buffer, uniform_buffer, workgroup_count,
};
use crate::gpu::render_context::RenderContext;
use crate::gpu::shader_composer::{Shader, ShaderComposer};
use crate::gpu::sized_buffer::SizedBuffer;
use crate::trail::Aabb;

/// Side planes used for culling `camera`, optionally moved as if the
/// camera had been translated by `debug_offset` in its local axes.
#[must_use]
pub fn culling_planes(camera: &Camera, debug_offset: Option<Vec3>) -> [Plane; 4] {
    let planes =
        Frustum::from_view_projection(camera.build_matrix()).side_planes();
    match debug_offset {
        Some(offset) => {
            let world = camera.rotation() * offset;
            planes.map(|plane| plane.translated(world))
        }
        None => planes,
    }
}

/// `true` if `bounds` is non-empty and not entirely outside any plane.
#[must_use]
pub fn aabb_visible(planes: &[Plane; 4], bounds: &Aabb) -> bool {
    !bounds.is_empty()
        && planes.iter().all(|plane| {
            plane.aabb_not_behind(bounds.min_vec(), bounds.max_vec())
        })
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CullingParams {
    planes: [[f32; 4]; 4],
    trail_num: u32,
    _pad: [u32; 3],
}

/// `UpdateTrailIdxBuffer` kernel and the visible-trail list it fills.
pub struct TrailCulling {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    params: SizedBuffer<CullingParams>,
    visible: TrailIndexBuffer,
    /// Cull as if the camera sat at this camera-local offset.
    pub debug_camera_offset: Option<Vec3>,
}

impl TrailCulling {
    /// Compose the kernel and allocate a list for `trail_num` trails.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::Shader`] if the culling shader fails to compose.
    pub fn new(
        device: &wgpu::Device,
        shader_composer: &mut ShaderComposer,
        dispatcher: &IndexDispatcher,
        trail_num: u32,
    ) -> Result<Self, TrailError> {
        let shader = shader_composer.compose(device, Shader::Culling)?;
        let layout = bind_group_layout(
            device,
            "Trail Culling",
            &[
                uniform_buffer(0),
                storage_buffer(1, true),
                storage_buffer(2, false),
                storage_buffer(3, false),
            ],
        );
        let pipeline = create_compute_pipeline(
            device,
            &shader,
            "UpdateTrailIdxBuffer",
            &layout,
        );

        Ok(Self {
            pipeline,
            layout,
            params: SizedBuffer::new(
                device,
                "Trail Culling Params",
                1,
                wgpu::BufferUsages::UNIFORM,
            ),
            visible: TrailIndexBuffer::new(
                device,
                dispatcher,
                "Trail Culling Index",
                trail_num,
            ),
            debug_camera_offset: None,
        })
    }

    /// Rebuild the visible-trail list for `camera` from `bounds` and size
    /// its indirect dispatch arguments. Returns the list.
    pub fn calc_trail_index_buffer(
        &mut self,
        context: &RenderContext,
        encoder: &mut wgpu::CommandEncoder,
        dispatcher: &IndexDispatcher,
        camera: &Camera,
        bounds: &wgpu::Buffer,
        trail_num: u32,
    ) -> &TrailIndexBuffer {
        let device = &context.device;
        let _ = self.visible.ensure_capacity(device, trail_num);

        let planes = culling_planes(camera, self.debug_camera_offset);
        self.params.write(
            &context.queue,
            &[CullingParams {
                planes: planes.map(|p| p.to_array()),
                trail_num,
                _pad: [0; 3],
            }],
        );

        let bind_group = buffer_bind_group(
            device,
            "Trail Culling",
            &self.layout,
            &[
                self.params.buffer(),
                bounds,
                self.visible.counter_buffer(),
                self.visible.data_buffer(),
            ],
        );

        self.visible.clear(encoder);
        dispatch(
            encoder,
            "Trail Culling Pass",
            &self.pipeline,
            &bind_group,
            workgroup_count(trail_num),
        );
        dispatcher.write_args(encoder, &self.visible);
        &self.visible
    }

    /// The list written by the last [`Self::calc_trail_index_buffer`].
    pub fn index_buffer(&self) -> &TrailIndexBuffer {
        &self.visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_at_origin() -> Camera {
        Camera {
            eye: Vec3::ZERO,
            target: Vec3::NEG_Z,
            aspect: 1.0,
            fovy: 90.0,
            ..Camera::default()
        }
    }

    #[test]
    fn box_in_front_is_visible_and_behind_is_culled() {
        let planes = culling_planes(&camera_at_origin(), None);
        let front = Aabb::new(Vec3::new(-1.0, -1.0, -6.0), Vec3::new(1.0, 1.0, -4.0));
        let behind = Aabb::new(Vec3::new(-1.0, -1.0, 4.0), Vec3::new(1.0, 1.0, 6.0));
        let far_left =
            Aabb::new(Vec3::new(-50.0, -1.0, -6.0), Vec3::new(-40.0, 1.0, -4.0));

        assert!(aabb_visible(&planes, &front));
        assert!(!aabb_visible(&planes, &behind));
        assert!(!aabb_visible(&planes, &far_left));
    }

    #[test]
    fn near_and_far_planes_are_ignored() {
        // Beyond zfar and inside the side planes.
        let planes = culling_planes(&camera_at_origin(), None);
        let beyond_far = Aabb::new(
            Vec3::new(-1.0, -1.0, -5000.0),
            Vec3::new(1.0, 1.0, -4000.0),
        );
        assert!(aabb_visible(&planes, &beyond_far));
    }

    #[test]
    fn straddling_box_is_visible() {
        let planes = culling_planes(&camera_at_origin(), None);
        let straddle =
            Aabb::new(Vec3::new(-20.0, -1.0, -6.0), Vec3::new(-4.0, 1.0, -4.0));
        assert!(aabb_visible(&planes, &straddle));
    }

    #[test]
    fn empty_bounds_are_culled() {
        let planes = culling_planes(&camera_at_origin(), None);
        assert!(!aabb_visible(&planes, &Aabb::EMPTY));
    }

    #[test]
    fn debug_offset_moves_planes_not_camera() {
        let camera = camera_at_origin();
        let target =
            Aabb::new(Vec3::new(29.0, -1.0, -6.0), Vec3::new(31.0, 1.0, -4.0));
        assert!(!aabb_visible(&culling_planes(&camera, None), &target));

        // Sliding the culling frustum 30 units right brings the box in view.
        let shifted = culling_planes(&camera, Some(Vec3::new(30.0, 0.0, 0.0)));
        assert!(aabb_visible(&shifted, &target));
        assert_eq!(camera, camera_at_origin());
    }
}
