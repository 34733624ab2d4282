//! GPU resource management utilities.
//!
//! Provides wgpu device initialization, fixed-count typed buffers, compute
//! pipeline boilerplate, shader composition, and diagnostic readback.

/// Shared wgpu boilerplate helpers for compute kernels.
pub mod pipeline_helpers;
/// Blocking buffer readback for diagnostics and tests.
pub mod readback;
/// wgpu device and queue initialization.
pub mod render_context;
/// WGSL shader composition with `#import` support via naga-oil.
pub mod shader_composer;
/// Exactly-sized typed GPU buffers with reallocate-on-resize.
pub mod sized_buffer;
