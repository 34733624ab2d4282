//! Crate-level error types.

use std::fmt;

use crate::gpu::render_context::RenderContextError;

/// Errors produced by the gpu-trail crate.
#[derive(Debug)]
pub enum TrailError {
    /// GPU context initialization failure.
    Gpu(RenderContextError),
    /// A WGSL shader failed to compose or validate.
    Shader(String),
    /// Generic I/O failure.
    Io(std::io::Error),
    /// TOML options parsing/serialization failure.
    OptionsParse(String),
    /// Options that cannot describe a valid trail pipeline.
    InvalidConfig(String),
    /// Mapping a buffer for host readback failed.
    Readback(String),
}

impl fmt::Display for TrailError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu(e) => write!(f, "GPU error: {e}"),
            Self::Shader(msg) => write!(f, "shader error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OptionsParse(msg) => {
                write!(f, "options parse error: {msg}")
            }
            Self::InvalidConfig(msg) => {
                write!(f, "invalid trail configuration: {msg}")
            }
            Self::Readback(msg) => write!(f, "buffer readback failed: {msg}"),
        }
    }
}

impl std::error::Error for TrailError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gpu(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RenderContextError> for TrailError {
    fn from(e: RenderContextError) -> Self {
        Self::Gpu(e)
    }
}

impl From<std::io::Error> for TrailError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
