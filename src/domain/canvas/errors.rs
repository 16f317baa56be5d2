//! Canvas Context - Errors

use thiserror::Error;

use super::LayerHandle;

#[derive(Debug, Error)]
pub enum CanvasError {
    #[error("Canvas is empty: no image has been created yet")]
    Empty,

    #[error("Invalid canvas dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Layer not found: {0}")]
    LayerNotFound(LayerHandle),

    #[error("Layer size {actual_width}x{actual_height} does not match canvas {width}x{height}")]
    SizeMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Invalid opacity: {0} (expected 0-100)")]
    InvalidOpacity(f32),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Invalid blend mode: {0}")]
    InvalidBlendMode(String),

    #[error("Cannot remove the last layer")]
    LastLayer,

    #[error("Region out of bounds: {0}")]
    OutOfBounds(String),

    #[error("No undo checkpoint available")]
    NoCheckpoint,
}
