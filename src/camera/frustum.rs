//! View frustum for culling
//!
//! Extracts the side planes from the view-projection matrix and tests
//! axis-aligned boxes against them.

use glam::{Mat4, Vec3, Vec4};

/// A plane in 3D space, represented as (normal.x, normal.y, normal.z, distance)
/// where the plane equation is: ax + by + cz + d = 0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal pointing into the positive half-space.
    pub normal: Vec3,
    /// Signed distance from origin (`n · p + d = 0`).
    pub distance: f32,
}

impl Plane {
    /// Create a plane from coefficients and normalize it
    pub fn from_coefficients(a: f32, b: f32, c: f32, d: f32) -> Self {
        let len = (a * a + b * b + c * c).sqrt();
        if len > 0.0 {
            Self {
                normal: Vec3::new(a / len, b / len, c / len),
                distance: d / len,
            }
        } else {
            Self {
                normal: Vec3::ZERO,
                distance: 0.0,
            }
        }
    }

    /// Signed distance from point to plane (positive = in front, negative =
    /// behind)
    #[inline]
    pub fn distance_to_point(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }

    /// The same plane moved by `offset` in world space.
    #[must_use]
    pub fn translated(&self, offset: Vec3) -> Self {
        Self {
            normal: self.normal,
            distance: self.distance - self.normal.dot(offset),
        }
    }

    /// `false` only if the box lies entirely behind the plane. Tests the
    /// box corner furthest along the normal (the "positive vertex").
    #[inline]
    pub fn aabb_not_behind(&self, min: Vec3, max: Vec3) -> bool {
        let positive = Vec3::select(self.normal.cmpge(Vec3::ZERO), max, min);
        self.distance_to_point(positive) >= 0.0
    }

    /// `(normal, distance)` packed for GPU upload.
    pub fn to_array(&self) -> [f32; 4] {
        self.normal.extend(self.distance).to_array()
    }
}

/// Side planes of a view frustum. Near and far are never extracted:
/// trails are culled against the sides only.
#[derive(Debug, Clone)]
pub struct Frustum {
    /// Inward-facing planes: left, right, bottom, top.
    pub planes: [Plane; 4],
}

impl Frustum {
    /// Extract the side planes from a view-projection matrix
    /// (Gribb/Hartmann). Planes point inward.
    pub fn from_view_projection(vp: Mat4) -> Self {
        // glam is column-major; rebuild the rows we need
        let row0 =
            Vec4::new(vp.x_axis.x, vp.y_axis.x, vp.z_axis.x, vp.w_axis.x);
        let row1 =
            Vec4::new(vp.x_axis.y, vp.y_axis.y, vp.z_axis.y, vp.w_axis.y);
        let row3 =
            Vec4::new(vp.x_axis.w, vp.y_axis.w, vp.z_axis.w, vp.w_axis.w);

        let plane = |v: Vec4| Plane::from_coefficients(v.x, v.y, v.z, v.w);
        Self {
            planes: [
                plane(row3 + row0),
                plane(row3 - row0),
                plane(row3 + row1),
                plane(row3 - row1),
            ],
        }
    }

    /// The four side planes (left, right, bottom, top).
    pub const fn side_planes(&self) -> [Plane; 4] {
        self.planes
    }
}
