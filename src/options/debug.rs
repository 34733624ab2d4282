use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Per-stage toggles. Each can be switched off independently without
/// breaking the downstream stages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Debug", inline)]
#[serde(default)]
pub struct DebugOptions {
    /// Append one node per trail each frame.
    #[schemars(title = "Append Nodes")]
    pub append_node: bool,
    /// Frustum-cull trails before LOD selection and drawing.
    #[schemars(title = "Culling")]
    pub culling: bool,
    /// Regenerate ribbon vertices.
    #[schemars(title = "Update Vertices")]
    pub update_vertex: bool,
    /// Issue draw calls.
    #[schemars(title = "Rendering")]
    pub rendering: bool,
    /// Cull as if the camera sat at this camera-local offset.
    #[schemars(skip)]
    pub camera_offset: Option<[f32; 3]>,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            append_node: true,
            culling: true,
            update_vertex: true,
            rendering: true,
            camera_offset: None,
        }
    }
}
