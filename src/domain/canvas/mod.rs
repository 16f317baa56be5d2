//! Canvas Bounded Context
//!
//! 可编辑图像：图层 arena、合成与编解码

mod aggregate;
pub mod codec;
mod errors;
mod value_objects;

pub use aggregate::{Canvas, CanvasSummary, Layer, LayerPatch, LayerSummary, MAX_DIMENSION};
pub use errors::CanvasError;
pub use value_objects::{BlendMode, Color, LayerHandle, Opacity};
