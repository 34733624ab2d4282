use glam::{Mat4, Quat, Vec3};

/// Projection model of a [`Camera`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Perspective projection with `Camera::fovy` vertical field of view.
    Perspective,
    /// Orthographic projection spanning `height` world units vertically.
    Orthographic {
        /// Visible world-space height of the view volume.
        height: f32,
    },
}

/// Camera defined by eye position, target, and projection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Eye (camera) position in world space.
    pub eye: Vec3,
    /// Look-at target position.
    pub target: Vec3,
    /// Up direction vector.
    pub up: Vec3,
    /// Viewport aspect ratio (width / height).
    pub aspect: f32,
    /// Vertical field of view in degrees (perspective only).
    pub fovy: f32,
    /// Near clipping plane distance.
    pub znear: f32,
    /// Far clipping plane distance.
    pub zfar: f32,
    /// Perspective or orthographic.
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::new(0.0, 0.0, 10.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            aspect: 16.0 / 9.0,
            fovy: 60.0,
            znear: 0.1,
            zfar: 1000.0,
            projection: Projection::Perspective,
        }
    }
}

impl Camera {
    /// View matrix (world → camera space).
    pub fn build_view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Projection matrix.
    pub fn build_projection(&self) -> Mat4 {
        // *_rh already uses [0,1] depth range (wgpu/Vulkan convention)
        match self.projection {
            Projection::Perspective => Mat4::perspective_rh(
                self.fovy.to_radians(),
                self.aspect,
                self.znear,
                self.zfar,
            ),
            Projection::Orthographic { height } => {
                let half_h = height * 0.5;
                let half_w = half_h * self.aspect;
                Mat4::orthographic_rh(
                    -half_w, half_w, -half_h, half_h, self.znear, self.zfar,
                )
            }
        }
    }

    /// Build the combined view-projection matrix.
    pub fn build_matrix(&self) -> Mat4 {
        self.build_projection() * self.build_view()
    }

    /// Unit direction the camera looks along.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.eye).normalize_or(Vec3::NEG_Z)
    }

    /// Camera-to-world rotation (camera looks down its local -Z).
    pub fn rotation(&self) -> Quat {
        Quat::from_mat4(&self.build_view().inverse())
    }

    /// `true` for orthographic cameras.
    pub fn is_orthographic(&self) -> bool {
        matches!(self.projection, Projection::Orthographic { .. })
    }
}

/// GPU uniform consumed by the trail draw shader.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    /// View-projection matrix per eye; both equal for mono rendering.
    pub view_proj: [[[f32; 4]; 4]; 2],
    /// Camera world-space position.
    pub position: [f32; 3],
    /// Non-zero when the instance index encodes `trail * 2 + eye`.
    pub stereo: u32,
}

impl CameraUniform {
    /// Uniform for a mono camera, or a stereo pair when `eyes` is given.
    pub fn new(camera: &Camera, eyes: Option<[Mat4; 2]>) -> Self {
        let mono = camera.build_matrix();
        let [left, right] = eyes.unwrap_or([mono, mono]);
        Self {
            view_proj: [left.to_cols_array_2d(), right.to_cols_array_2d()],
            position: camera.eye.to_array(),
            stereo: u32::from(eyes.is_some()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_maps_local_forward_to_view_direction() {
        let camera = Camera {
            eye: Vec3::new(5.0, 2.0, 0.0),
            target: Vec3::new(5.0, 2.0, -10.0),
            ..Camera::default()
        };
        let fwd = camera.rotation() * Vec3::NEG_Z;
        assert!((fwd - camera.forward()).length() < 1e-5);
    }

    #[test]
    fn stereo_uniform_flags_instances() {
        let camera = Camera::default();
        assert_eq!(CameraUniform::new(&camera, None).stereo, 0);
        let eyes = [Mat4::IDENTITY, Mat4::IDENTITY];
        assert_eq!(CameraUniform::new(&camera, Some(eyes)).stereo, 1);
    }
}
