//! Canvas Transforms - 画布级操作

use async_trait::async_trait;
use image::imageops::FilterType;

use super::run_blocking;
use crate::application::ports::{Transform, TransformError, TransformInput, TransformOutcome};
use crate::domain::canvas::codec::EncodeFormat;
use crate::domain::canvas::{Canvas, Color};
use crate::domain::session::CanvasMutation;

fn filter_type(name: &str) -> Result<FilterType, TransformError> {
    match name {
        "nearest" => Ok(FilterType::Nearest),
        "triangle" | "linear" => Ok(FilterType::Triangle),
        "catmull_rom" | "cubic" => Ok(FilterType::CatmullRom),
        "gaussian" => Ok(FilterType::Gaussian),
        "lanczos3" | "lanczos" => Ok(FilterType::Lanczos3),
        other => Err(TransformError::invalid(format!("unknown interpolation: {}", other))),
    }
}

fn dimensions_field(canvas: &Canvas) -> serde_json::Value {
    serde_json::json!({ "width": canvas.width(), "height": canvas.height() })
}

/// create_image - 新建纯色画布，替换当前图像
pub struct CreateImage;

#[async_trait]
impl Transform for CreateImage {
    fn name(&self) -> &'static str {
        "create_image"
    }

    fn description(&self) -> &'static str {
        "Create a new image with a single background layer"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let width = input.params.require_u32("width")?;
        let height = input.params.require_u32("height")?;
        let fill = input.params.color_or("fill", Color::WHITE)?;

        let canvas = Canvas::new(width, height, fill)?;
        let dims = dimensions_field(&canvas);
        Ok(TransformOutcome::mutate(CanvasMutation::Replace(canvas)).with_field("image_dimensions", dims))
    }
}

/// resize_image - 缩放所有图层；只给出一边时保持宽高比
pub struct ResizeImage;

#[async_trait]
impl Transform for ResizeImage {
    fn name(&self) -> &'static str {
        "resize_image"
    }

    fn description(&self) -> &'static str {
        "Scale every layer to a new size"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let canvas = input.require_canvas()?;
        let (w, h) = canvas.dimensions();
        let (width, height) = match (input.params.u32("width")?, input.params.u32("height")?) {
            (Some(width), Some(height)) => (width, height),
            (Some(width), None) => (width, ((h as u64 * width as u64) / w as u64).max(1) as u32),
            (None, Some(height)) => (((w as u64 * height as u64) / h as u64).max(1) as u32, height),
            (None, None) => {
                return Err(TransformError::invalid("width or height is required"));
            }
        };
        let filter = filter_type(input.params.str_or("interpolation", "lanczos3")?)?;

        let source = canvas.clone();
        let resized = run_blocking(move || Ok(source.resized(width, height, filter)?)).await?;
        let dims = dimensions_field(&resized);
        Ok(TransformOutcome::mutate(CanvasMutation::Replace(resized)).with_field("image_dimensions", dims))
    }
}

/// crop_image - 裁剪所有图层
pub struct CropImage;

#[async_trait]
impl Transform for CropImage {
    fn name(&self) -> &'static str {
        "crop_image"
    }

    fn description(&self) -> &'static str {
        "Crop every layer to a rectangle"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let canvas = input.require_canvas()?;
        let x = input.params.u32("x")?.unwrap_or(0);
        let y = input.params.u32("y")?.unwrap_or(0);
        let width = input.params.require_u32("width")?;
        let height = input.params.require_u32("height")?;

        let cropped = canvas.cropped(x, y, width, height)?;
        let dims = dimensions_field(&cropped);
        Ok(TransformOutcome::mutate(CanvasMutation::Replace(cropped)).with_field("image_dimensions", dims))
    }
}

/// flatten_image - 合并所有可见图层
pub struct FlattenImage;

#[async_trait]
impl Transform for FlattenImage {
    fn name(&self) -> &'static str {
        "flatten_image"
    }

    fn description(&self) -> &'static str {
        "Merge all visible layers into one"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let source = input.require_canvas()?.clone();
        let flattened = run_blocking(move || Ok(source.flattened()?)).await?;
        Ok(TransformOutcome::mutate(CanvasMutation::Replace(flattened)))
    }
}

/// export_image - 导出合成图像为二进制输出 `image`
pub struct ExportImage;

#[async_trait]
impl Transform for ExportImage {
    fn name(&self) -> &'static str {
        "export_image"
    }

    fn description(&self) -> &'static str {
        "Export the composited image as a binary output"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let format_name = input.params.str_or("format", "png")?.to_ascii_lowercase();
        let format = EncodeFormat::parse(&format_name)
            .map_err(|e| TransformError::invalid(e.to_string()))?;

        let source = input.require_canvas()?.clone();
        let image = run_blocking(move || Ok(source.flatten()?)).await?;
        let (width, height) = image.dimensions();

        Ok(TransformOutcome::new()
            .with_field("format", format_name)
            .with_field("width", width)
            .with_field("height", height)
            .with_encoded_output("image", image, format))
    }
}
