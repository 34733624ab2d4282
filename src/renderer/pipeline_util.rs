use crate::options::TrailBlend;

/// Single color target in `format` blended with `blend`.
pub(crate) fn color_target(
    format: wgpu::TextureFormat,
    blend: TrailBlend,
) -> [Option<wgpu::ColorTargetState>; 1] {
    [Some(wgpu::ColorTargetState {
        format,
        blend: Some(blend.blend_state()),
        write_mask: wgpu::ColorWrites::ALL,
    })]
}

/// Depth state for translucent ribbons: tested against the scene, never
/// written.
pub(crate) fn depth_stencil_state(
    format: wgpu::TextureFormat,
) -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format,
        depth_write_enabled: false,
        depth_compare: wgpu::CompareFunction::LessEqual,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

/// Raster-stage buffer binding visible to `visibility`.
pub(crate) fn raster_buffer(
    binding: u32,
    visibility: wgpu::ShaderStages,
    ty: wgpu::BufferBindingType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
