//! Filter Transforms - 作用于单个图层的像素滤镜
//!
//! 目标图层由 `layer` 参数指定，缺省为活动图层。

use async_trait::async_trait;
use image::{imageops, RgbaImage};

use super::run_blocking;
use crate::application::ports::{
    Transform, TransformError, TransformInput, TransformOutcome, TransformParams,
};
use crate::domain::canvas::{Canvas, LayerHandle};
use crate::domain::session::CanvasMutation;

const MAX_BLUR_RADIUS: u32 = 500;

/// 取出目标图层像素的副本
fn target_pixels(canvas: &Canvas, params: &TransformParams) -> Result<(LayerHandle, RgbaImage), TransformError> {
    let handle = params.layer_or_active(canvas)?;
    let pixels = canvas.layer(handle)?.pixels().clone();
    Ok((handle, pixels))
}

fn replace(layer: LayerHandle, pixels: RgbaImage) -> TransformOutcome {
    TransformOutcome::mutate(CanvasMutation::ReplacePixels { layer, pixels })
}

fn luma(r: u8, g: u8, b: u8) -> f32 {
    0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32
}

/// apply_blur - 高斯模糊
pub struct ApplyBlur;

#[async_trait]
impl Transform for ApplyBlur {
    fn name(&self) -> &'static str {
        "apply_blur"
    }

    fn description(&self) -> &'static str {
        "Gaussian blur of the target layer"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let canvas = input.require_canvas()?;
        let radius = input.params.u32("radius")?.unwrap_or(5);
        if radius > MAX_BLUR_RADIUS {
            return Err(TransformError::invalid(format!(
                "parameter `radius` must be at most {}",
                MAX_BLUR_RADIUS
            )));
        }
        let (layer, pixels) = target_pixels(canvas, input.params)?;

        if radius == 0 {
            return Ok(replace(layer, pixels));
        }

        let sigma = radius as f32 / 2.0;
        let blurred = run_blocking(move || Ok(imageops::blur(&pixels, sigma))).await?;
        Ok(replace(layer, blurred))
    }
}

/// apply_sharpen - 反锐化掩模
pub struct ApplySharpen;

#[async_trait]
impl Transform for ApplySharpen {
    fn name(&self) -> &'static str {
        "apply_sharpen"
    }

    fn description(&self) -> &'static str {
        "Unsharp mask of the target layer"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let canvas = input.require_canvas()?;
        let amount = input.params.f64_in("amount", 1.0, 0.0, 10.0)? as f32;
        let threshold = input.params.u32("threshold")?.unwrap_or(0);
        if threshold > 255 {
            return Err(TransformError::invalid("parameter `threshold` must be at most 255"));
        }
        let (layer, pixels) = target_pixels(canvas, input.params)?;

        if amount == 0.0 {
            return Ok(replace(layer, pixels));
        }

        let sharpened =
            run_blocking(move || Ok(imageops::unsharpen(&pixels, amount, threshold as i32))).await?;
        Ok(replace(layer, sharpened))
    }
}

/// adjust_brightness_contrast - 亮度与对比度，取值 -100..=100
pub struct AdjustBrightnessContrast;

#[async_trait]
impl Transform for AdjustBrightnessContrast {
    fn name(&self) -> &'static str {
        "adjust_brightness_contrast"
    }

    fn description(&self) -> &'static str {
        "Adjust brightness and contrast of the target layer"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let canvas = input.require_canvas()?;
        let brightness = input.params.f64_in("brightness", 0.0, -100.0, 100.0)? as f32;
        let contrast = input.params.f64_in("contrast", 0.0, -100.0, 100.0)? as f32;
        let (layer, pixels) = target_pixels(canvas, input.params)?;

        let adjusted = run_blocking(move || Ok(brightness_contrast(pixels, brightness, contrast))).await?;
        Ok(replace(layer, adjusted))
    }
}

/// 对比度围绕不透明像素的平均亮度展开
fn brightness_contrast(mut pixels: RgbaImage, brightness: f32, contrast: f32) -> RgbaImage {
    let (sum, count) = pixels
        .pixels()
        .filter(|p| p[3] > 0)
        .fold((0.0f64, 0u64), |(sum, count), p| (sum + luma(p[0], p[1], p[2]) as f64, count + 1));
    let mean = if count == 0 { 127.5 } else { (sum / count as f64) as f32 };

    let offset = brightness / 100.0 * 255.0;
    let factor = if contrast >= 0.0 {
        1.0 + contrast / 100.0 * 3.0
    } else {
        1.0 + contrast / 100.0
    };

    for p in pixels.pixels_mut() {
        for c in 0..3 {
            let v = (p[c] as f32 - mean) * factor + mean + offset;
            p[c] = v.round().clamp(0.0, 255.0) as u8;
        }
    }
    pixels
}

/// desaturate - 去色
pub struct Desaturate;

#[derive(Debug, Clone, Copy)]
enum DesaturateMode {
    Luminosity,
    Average,
    Lightness,
}

impl DesaturateMode {
    fn parse(s: &str) -> Result<Self, TransformError> {
        match s {
            "luminosity" | "luminance" => Ok(Self::Luminosity),
            "average" => Ok(Self::Average),
            "lightness" => Ok(Self::Lightness),
            other => Err(TransformError::invalid(format!("unknown desaturate mode: {}", other))),
        }
    }

    fn gray(&self, r: u8, g: u8, b: u8) -> u8 {
        let v = match self {
            Self::Luminosity => luma(r, g, b),
            Self::Average => (r as f32 + g as f32 + b as f32) / 3.0,
            Self::Lightness => (r.max(g).max(b) as f32 + r.min(g).min(b) as f32) / 2.0,
        };
        v.round().clamp(0.0, 255.0) as u8
    }
}

#[async_trait]
impl Transform for Desaturate {
    fn name(&self) -> &'static str {
        "desaturate"
    }

    fn description(&self) -> &'static str {
        "Convert the target layer to grayscale"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let canvas = input.require_canvas()?;
        let mode = DesaturateMode::parse(input.params.str_or("mode", "luminosity")?)?;
        let (layer, mut pixels) = target_pixels(canvas, input.params)?;

        for p in pixels.pixels_mut() {
            let g = mode.gray(p[0], p[1], p[2]);
            p[0] = g;
            p[1] = g;
            p[2] = g;
        }
        Ok(replace(layer, pixels).with_field("mode", format!("{:?}", mode).to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use image::Rgba;
    use serde_json::json;

    use crate::application::ports::ProgressReporter;
    use crate::domain::canvas::Color;

    async fn run<T: Transform>(t: &T, canvas: &Canvas, params: serde_json::Value) -> Result<TransformOutcome, TransformError> {
        let params: TransformParams = serde_json::from_value(params).unwrap();
        let images = HashMap::new();
        let progress = ProgressReporter::detached();
        t.apply(TransformInput {
            canvas,
            params: &params,
            images: &images,
            progress: &progress,
        })
        .await
    }

    fn pixels(outcome: TransformOutcome) -> RgbaImage {
        match outcome.mutation {
            Some(CanvasMutation::ReplacePixels { pixels, .. }) => pixels,
            other => panic!("unexpected mutation: {:?}", other),
        }
    }

    fn checkerboard() -> Canvas {
        let img = RgbaImage::from_fn(8, 8, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        Canvas::from_image(img).unwrap()
    }

    #[tokio::test]
    async fn test_blur_smooths() {
        let canvas = checkerboard();
        let out = pixels(run(&ApplyBlur, &canvas, json!({"radius": 4})).await.unwrap());
        let v = out.get_pixel(4, 4)[0];
        assert!(v > 60 && v < 200, "value {}", v);
    }

    #[tokio::test]
    async fn test_blur_rejects_bad_radius() {
        let canvas = checkerboard();
        for params in [json!({"radius": -1}), json!({"radius": 1.5}), json!({"radius": 501})] {
            let err = run(&ApplyBlur, &canvas, params).await.unwrap_err();
            assert!(matches!(err, TransformError::InvalidParams(_)));
        }
        let err = run(&ApplyBlur, &canvas, json!({"layer": 7})).await.unwrap_err();
        assert!(matches!(err, TransformError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_sharpen_range() {
        let canvas = checkerboard();
        assert!(run(&ApplySharpen, &canvas, json!({"amount": 2.0})).await.is_ok());
        assert!(run(&ApplySharpen, &canvas, json!({"amount": 11})).await.is_err());
    }

    #[tokio::test]
    async fn test_brightness() {
        let canvas = Canvas::new(2, 2, Color::rgba(100, 100, 100, 255)).unwrap();
        let out = pixels(
            run(&AdjustBrightnessContrast, &canvas, json!({"brightness": 20}))
                .await
                .unwrap(),
        );
        assert_eq!(out.get_pixel(0, 0)[0], 151);

        let err = run(&AdjustBrightnessContrast, &canvas, json!({"contrast": 150}))
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_contrast_spreads_around_mean() {
        let img = RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgba([100, 100, 100, 255])
            } else {
                Rgba([150, 150, 150, 255])
            }
        });
        let canvas = Canvas::from_image(img).unwrap();
        let out = pixels(
            run(&AdjustBrightnessContrast, &canvas, json!({"contrast": 50}))
                .await
                .unwrap(),
        );
        assert!(out.get_pixel(0, 0)[0] < 100);
        assert!(out.get_pixel(1, 0)[0] > 150);
    }

    #[tokio::test]
    async fn test_desaturate_modes() {
        let canvas = Canvas::new(1, 1, Color::rgba(255, 0, 0, 255)).unwrap();
        let lightness = pixels(run(&Desaturate, &canvas, json!({"mode": "lightness"})).await.unwrap());
        assert_eq!(lightness.get_pixel(0, 0).0, [128, 128, 128, 255]);

        let average = pixels(run(&Desaturate, &canvas, json!({"mode": "average"})).await.unwrap());
        assert_eq!(average.get_pixel(0, 0).0, [85, 85, 85, 255]);

        assert!(run(&Desaturate, &canvas, json!({"mode": "sepia"})).await.is_err());
    }
}
