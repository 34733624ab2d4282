use glam::Mat4;

use super::core::Camera;

/// A camera as seen by one `render_camera` call.
///
/// The host's render loop drives trail rendering explicitly, one call per
/// visible camera per frame, and identifies cameras by `id` so trails can be
/// pinned to a single target camera.
#[derive(Debug, Clone, Copy)]
pub struct CameraView<'a> {
    /// Pose and projection.
    pub camera: &'a Camera,
    /// Host-assigned camera identifier.
    pub id: u32,
    /// Layers this camera renders; tested against the trail layer bit.
    pub culling_mask: u32,
    /// Per-eye view-projection matrices for single-pass instanced stereo.
    pub stereo_eyes: Option<[Mat4; 2]>,
}

impl<'a> CameraView<'a> {
    /// Mono view rendering every layer.
    pub fn new(camera: &'a Camera, id: u32) -> Self {
        Self {
            camera,
            id,
            culling_mask: u32::MAX,
            stereo_eyes: None,
        }
    }

    /// Restrict the layers this view renders.
    #[must_use]
    pub fn with_culling_mask(mut self, culling_mask: u32) -> Self {
        self.culling_mask = culling_mask;
        self
    }

    /// Render both eyes in one pass with the given view-projections.
    #[must_use]
    pub fn with_stereo_eyes(mut self, eyes: [Mat4; 2]) -> Self {
        self.stereo_eyes = Some(eyes);
        self
    }

    /// `true` if a trail on `layer` is visible to this view and the view
    /// matches `target_camera` (when one is set).
    pub fn accepts(&self, target_camera: Option<u32>, layer: u32) -> bool {
        if target_camera.is_some_and(|id| id != self.id) {
            return false;
        }
        let bit = 1u32.checked_shl(layer).unwrap_or(0);
        self.culling_mask & bit != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_camera_and_layer_filter() {
        let camera = Camera::default();
        let view = CameraView::new(&camera, 3).with_culling_mask(0b0101);

        assert!(view.accepts(None, 0));
        assert!(view.accepts(Some(3), 2));
        assert!(!view.accepts(Some(4), 0));
        assert!(!view.accepts(None, 1));
        assert!(!view.accepts(None, 40));
    }
}
