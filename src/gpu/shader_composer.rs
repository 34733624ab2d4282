use std::borrow::Cow;

use naga_oil::compose::{
    ComposableModuleDescriptor, Composer, NagaModuleDescriptor,
    ShaderLanguage, ShaderType,
};

use crate::error::TrailError;

/// Every shader the trail pipeline compiles.
///
/// Kernel entry point names inside these sources are part of the pipeline's
/// boundary contract (`InitBounds`, `CalcBounds`, `UpdateVertex`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shader {
    /// `AppendNode`: writes one input node per trail into its ring.
    AppendNode,
    /// `InitBounds` / `CalcBounds` / `CopyBounds`: per-trail AABB reduction.
    Bounds,
    /// `UpdateTrailIdxBuffer`: frustum culling into an append buffer.
    Culling,
    /// `CalcLod`: distance-banded LOD partitioning.
    CalcLod,
    /// `UpdateVertex`: ribbon vertex expansion for one LOD tier.
    UpdateVertex,
    /// `ArgsBufferMultiply`: stereo instance-count correction.
    ArgsBuffer,
    /// `CalcDispatchArgs`: indirect dispatch sizing from an append counter.
    IndexDispatch,
    /// `vs_main` / `fs_main`: indexed-indirect ribbon draw.
    TrailDraw,
}

impl Shader {
    /// All shaders, in pipeline order.
    pub const ALL: [Self; 8] = [
        Self::AppendNode,
        Self::Bounds,
        Self::Culling,
        Self::CalcLod,
        Self::UpdateVertex,
        Self::ArgsBuffer,
        Self::IndexDispatch,
        Self::TrailDraw,
    ];

    /// Debug label for the shader module.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::AppendNode => "Trail Append Node Shader",
            Self::Bounds => "Trail Bounds Shader",
            Self::Culling => "Trail Culling Shader",
            Self::CalcLod => "Trail Calc Lod Shader",
            Self::UpdateVertex => "Trail Update Vertex Shader",
            Self::ArgsBuffer => "Trail Args Buffer Shader",
            Self::IndexDispatch => "Trail Index Dispatch Shader",
            Self::TrailDraw => "Trail Draw Shader",
        }
    }

    /// Path used for naga-oil diagnostics.
    #[must_use]
    pub const fn file_path(self) -> &'static str {
        match self {
            Self::AppendNode => "compute/append_node.wgsl",
            Self::Bounds => "compute/calc_bounds.wgsl",
            Self::Culling => "compute/culling.wgsl",
            Self::CalcLod => "compute/calc_lod.wgsl",
            Self::UpdateVertex => "compute/update_vertex.wgsl",
            Self::ArgsBuffer => "compute/args_buffer.wgsl",
            Self::IndexDispatch => "compute/index_dispatch.wgsl",
            Self::TrailDraw => "raster/trail.wgsl",
        }
    }

    /// WGSL source, embedded at compile time.
    #[must_use]
    pub const fn source(self) -> &'static str {
        match self {
            Self::AppendNode => {
                include_str!("../../assets/shaders/compute/append_node.wgsl")
            }
            Self::Bounds => {
                include_str!("../../assets/shaders/compute/calc_bounds.wgsl")
            }
            Self::Culling => {
                include_str!("../../assets/shaders/compute/culling.wgsl")
            }
            Self::CalcLod => {
                include_str!("../../assets/shaders/compute/calc_lod.wgsl")
            }
            Self::UpdateVertex => {
                include_str!("../../assets/shaders/compute/update_vertex.wgsl")
            }
            Self::ArgsBuffer => {
                include_str!("../../assets/shaders/compute/args_buffer.wgsl")
            }
            Self::IndexDispatch => {
                include_str!("../../assets/shaders/compute/index_dispatch.wgsl")
            }
            Self::TrailDraw => {
                include_str!("../../assets/shaders/raster/trail.wgsl")
            }
        }
    }
}

/// Wraps `naga_oil::compose::Composer` to provide shader composition with
/// `#import` support.
///
/// Pre-loads the shared WGSL modules at construction time. Consuming shaders
/// use `#import gpu_trail::types::{...}` to pull in the GPU data layouts. The
/// composer produces `naga::Module` IR directly, skipping WGSL re-parse at
/// runtime.
pub struct ShaderComposer {
    composer: Composer,
}

/// Shared module definition: (source, file_path)
struct ModuleDef {
    source: &'static str,
    file_path: &'static str,
}

impl ShaderComposer {
    /// Create a composer with all shared modules registered.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::Shader`] if a shared module fails to parse.
    pub fn new() -> Result<Self, TrailError> {
        let mut composer = Composer::default();

        // Register shared modules in dependency order.
        let modules: &[ModuleDef] = &[ModuleDef {
            source: include_str!(
                "../../assets/shaders/modules/trail_types.wgsl"
            ),
            file_path: "modules/trail_types.wgsl",
        }];

        for m in modules {
            let _ = composer
                .add_composable_module(ComposableModuleDescriptor {
                    source: m.source,
                    file_path: m.file_path,
                    language: ShaderLanguage::Wgsl,
                    ..Default::default()
                })
                .map_err(|e| {
                    TrailError::Shader(format!(
                        "failed to register shader module '{}': {e:?}",
                        m.file_path
                    ))
                })?;
        }

        Ok(Self { composer })
    }

    /// Compose a shader into a `wgpu::ShaderModule` ready for pipeline
    /// creation.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::Shader`] if composition fails.
    pub fn compose(
        &mut self,
        device: &wgpu::Device,
        shader: Shader,
    ) -> Result<wgpu::ShaderModule, TrailError> {
        let naga_module = self.compose_naga(shader)?;

        Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(shader.label()),
            source: wgpu::ShaderSource::Naga(Cow::Owned(naga_module)),
        }))
    }

    /// Compose a shader into a `naga::Module` without creating a wgpu shader
    /// module. Useful for validating shaders without a GPU device.
    ///
    /// # Errors
    ///
    /// Returns [`TrailError::Shader`] if composition fails.
    pub fn compose_naga(
        &mut self,
        shader: Shader,
    ) -> Result<naga::Module, TrailError> {
        self.composer
            .make_naga_module(NagaModuleDescriptor {
                source: shader.source(),
                file_path: shader.file_path(),
                shader_type: ShaderType::Wgsl,
                ..Default::default()
            })
            .map_err(|e| {
                TrailError::Shader(format!(
                    "failed to compose shader '{}': {e}",
                    shader.file_path()
                ))
            })
    }
}
