//! Camera types consumed by the trail pipeline.
//!
//! The host owns camera control; trails only need the camera's pose,
//! projection and frustum for culling, LOD distances and billboarding.

/// Core camera struct and GPU uniform types.
pub mod core;
/// View frustum extraction and intersection tests.
pub mod frustum;
/// Per-call description of the camera being rendered.
pub mod view;
