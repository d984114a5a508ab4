//! Error types for glimpse construction and sampling.

use thiserror::Error;

use crate::grid::GridShape;

pub type Result<T> = std::result::Result<T, GlimpseError>;

/// Errors raised by the glimpse core.
///
/// Most of these are configuration/wiring failures detected before a forward
/// pass runs. The rest reject a window that cannot be sampled: a non-finite
/// corner, or a bad scale under `ScalePolicy::Reject`. Out-of-bounds sample
/// coordinates are never an error.
#[derive(Debug, Error)]
pub enum GlimpseError {
    #[error("invalid grid shape {width}x{height}: both dimensions must be positive")]
    InvalidGridShape { width: usize, height: usize },

    #[error("num_iterations must be at least 1")]
    InvalidIterations,

    /// A collaborator's declared size does not line up with what it is wired to.
    #[error("shape mismatch for {what}: expected {expected}, actual {actual}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Builder and extractor disagree on the glimpse resolution.
    #[error("grid shape mismatch: builder samples {expected}, extractor expects {actual}")]
    GridShapeMismatch {
        expected: GridShape,
        actual: GridShape,
    },

    /// Scale is not a positive finite number.
    #[error("invalid glimpse scale {0}: must be positive and finite")]
    InvalidScale(f32),

    #[error("glimpse corner ({x}, {y}) is not finite")]
    NonFiniteLocation { x: f32, y: f32 },

    #[error("image has an empty dimension: {width}x{height}x{channels}")]
    EmptyImage {
        width: usize,
        height: usize,
        channels: usize,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl GlimpseError {
    pub fn shape_mismatch(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::ShapeMismatch {
            what,
            expected,
            actual,
        }
    }
}
