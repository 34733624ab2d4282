// -- Lint policy ---------------------------------------------------------
// This is the single source of truth for crate-wide lints.

// Broad lint groups
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
// Documentation
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::bare_urls)]
// No panicking in library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
// No debug/print artifacts
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
// Import hygiene
#![deny(clippy::wildcard_imports)]
// Complexity limits
#![deny(clippy::cognitive_complexity)]
#![deny(clippy::excessive_nesting)]
// Function signature hygiene
#![deny(clippy::too_many_arguments)]
#![deny(clippy::fn_params_excessive_bools)]
// Clone / pass-by-value hygiene
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::implicit_clone)]
// String hygiene
#![deny(clippy::inefficient_to_string)]
#![deny(clippy::redundant_closure_for_method_calls)]
#![deny(clippy::manual_string_new)]
#![deny(clippy::str_to_string)]
// Cargo lints (warn, not deny since cargo lints can be noisy)
#![warn(clippy::cargo)]
// Unused / redundant code
#![deny(unused_results)]
#![deny(unused_qualifications)]
// Cast hygiene
#![deny(trivial_casts)]
#![deny(trivial_numeric_casts)]

//! GPU-resident particle trails built on wgpu.
//!
//! Every particle leaves a ribbon behind it. The position history of each
//! particle lives in a GPU ring buffer, and everything derived from it
//! (bounds, frustum culling, LOD selection, ribbon vertices, indirect draw
//! arguments) is computed by compute kernels. The host only records
//! dispatches; it never reads trail data back in the steady state.
//!
//! # Key entry points
//!
//! - [`renderer::TrailRenderer`] - owns the pipeline; call
//!   [`update`](renderer::TrailRenderer::update) once per frame and
//!   [`render_camera`](renderer::TrailRenderer::render_camera) once per
//!   camera
//! - [`trail::GpuTrail`] - the ring-buffer trail store
//! - [`options::TrailOptions`] - runtime configuration with TOML presets
//! - [`camera::view::CameraView`] - the camera a render call targets
//!
//! # Frame flow
//!
//! `update`: append node → bounds. `render_camera`: cull → LOD select →
//! vertex update (per tier) → args (per tier) → indexed-indirect draw (per
//! tier).

pub mod camera;
pub mod error;
pub mod gpu;
pub mod options;
pub mod renderer;
pub mod trail;

pub use error::TrailError;
