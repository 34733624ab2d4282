use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::material::TrailMaterial;

/// One distance-banded quality tier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "LOD", inline)]
#[serde(default)]
pub struct LodSetting {
    /// Disabled tiers still claim their distance band; their trails are
    /// simply not drawn.
    #[schemars(title = "Enable")]
    pub enable: bool,
    /// Camera distance where this tier starts. The nearest tier is treated
    /// as starting at 0.
    #[schemars(title = "Start Distance", range(min = 0.0))]
    pub start_distance: f32,
    /// Node stride used to generate vertices: 1 = every node, 2 = every
    /// other node, ...
    #[schemars(title = "Node Step", range(min = 1))]
    pub lod_node_step: u32,
    /// Tier-specific material; the renderer's default material is used
    /// when absent.
    #[schemars(skip)]
    pub material: Option<TrailMaterial>,
}

impl Default for LodSetting {
    fn default() -> Self {
        Self {
            enable: true,
            start_distance: 0.0,
            lod_node_step: 1,
            material: None,
        }
    }
}

impl LodSetting {
    /// Nodes that produce vertices at this tier.
    #[must_use]
    pub fn node_num_per_trail_with_lod(&self, node_num_per_trail: u32) -> u32 {
        node_num_per_trail / self.lod_node_step.max(1)
    }
}
