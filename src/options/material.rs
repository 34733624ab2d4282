use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How trail fragments combine with the render target.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default,
    JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TrailBlend {
    /// Standard premultiplied-free alpha blending.
    #[default]
    Alpha,
    /// Additive glow; ignores destination alpha.
    Additive,
}

impl TrailBlend {
    /// Both blend modes; one draw pipeline is built per mode.
    pub const ALL: [Self; 2] = [Self::Alpha, Self::Additive];

    /// wgpu blend state for this mode.
    pub fn blend_state(self) -> wgpu::BlendState {
        match self {
            Self::Alpha => wgpu::BlendState::ALPHA_BLENDING,
            Self::Additive => wgpu::BlendState {
                color: wgpu::BlendComponent {
                    src_factor: wgpu::BlendFactor::SrcAlpha,
                    dst_factor: wgpu::BlendFactor::One,
                    operation: wgpu::BlendOperation::Add,
                },
                alpha: wgpu::BlendComponent::OVER,
            },
        }
    }
}

/// Surface appearance of a LOD tier's ribbons.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[schemars(title = "Material", inline)]
#[serde(default)]
pub struct TrailMaterial {
    /// Tint multiplied with the per-node color.
    #[schemars(title = "Color")]
    pub color: [f32; 4],
    /// Blend mode.
    #[schemars(title = "Blend")]
    pub blend: TrailBlend,
    /// Fade alpha toward the oldest node.
    #[schemars(title = "Fade Tail")]
    pub fade_tail: bool,
}

impl Default for TrailMaterial {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
            blend: TrailBlend::Alpha,
            fade_tail: true,
        }
    }
}

/// GPU uniform for [`TrailMaterial`].
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    /// Tint color.
    pub color: [f32; 4],
    /// 1 when the tail fades out.
    pub fade_tail: u32,
    /// Vertices per trail for the tier being drawn.
    pub vertex_num_per_trail: u32,
    /// 1 when instances are looked up through a trail index buffer.
    pub use_index_buffer: u32,
    pub(crate) _pad: u32,
}

impl MaterialUniform {
    /// Pack `material` for a tier with `vertex_num_per_trail` vertices.
    pub fn new(
        material: &TrailMaterial,
        vertex_num_per_trail: u32,
        use_index_buffer: bool,
    ) -> Self {
        Self {
            color: material.color,
            fade_tail: u32::from(material.fade_tail),
            vertex_num_per_trail,
            use_index_buffer: u32::from(use_index_buffer),
            _pad: 0,
        }
    }
}
