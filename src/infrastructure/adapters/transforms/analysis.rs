//! Analysis Transforms - 只读的图像统计
//!
//! 不修改画布，结果全部写入返回字段。

use async_trait::async_trait;
use image::RgbaImage;
use serde_json::{json, Value};

use super::run_blocking;
use crate::application::ports::{
    TaskStatus, Transform, TransformError, TransformInput, TransformOutcome,
};

const HISTOGRAM_BINS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnalysisLevel {
    Basic,
    Detailed,
}

impl AnalysisLevel {
    fn parse(s: &str) -> Result<Self, TransformError> {
        match s {
            "basic" => Ok(Self::Basic),
            "detailed" => Ok(Self::Detailed),
            other => Err(TransformError::invalid(format!("unknown analysis_type: {}", other))),
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Detailed => "detailed",
        }
    }
}

/// 单图层像素统计
#[derive(Debug, Clone, PartialEq)]
struct PixelStats {
    pixel_count: u64,
    transparent: u64,
    opaque: u64,
    mean_rgb: [f64; 3],
    brightness: f64,
    contrast: f64,
    histogram: [[u64; HISTOGRAM_BINS]; 4],
}

impl PixelStats {
    /// 颜色与亮度只统计 alpha > 0 的像素
    fn collect(pixels: &RgbaImage) -> Self {
        let mut transparent = 0u64;
        let mut opaque = 0u64;
        let mut sum_rgb = [0f64; 3];
        let mut sum_luma = 0f64;
        let mut sum_luma_sq = 0f64;
        let mut histogram = [[0u64; HISTOGRAM_BINS]; 4];
        let bin = |v: u8| v as usize * HISTOGRAM_BINS / 256;

        for p in pixels.pixels() {
            match p[3] {
                0 => {
                    transparent += 1;
                    continue;
                }
                255 => opaque += 1,
                _ => {}
            }
            let luma = 0.2126 * p[0] as f64 + 0.7152 * p[1] as f64 + 0.0722 * p[2] as f64;
            for c in 0..3 {
                sum_rgb[c] += p[c] as f64;
                histogram[c][bin(p[c])] += 1;
            }
            histogram[3][bin(luma.round().clamp(0.0, 255.0) as u8)] += 1;
            sum_luma += luma;
            sum_luma_sq += luma * luma;
        }

        let pixel_count = pixels.width() as u64 * pixels.height() as u64;
        let counted = pixel_count - transparent;
        let (mean_rgb, brightness, contrast) = if counted == 0 {
            ([0.0; 3], 0.0, 0.0)
        } else {
            let n = counted as f64;
            let mean = sum_luma / n;
            let variance = (sum_luma_sq / n - mean * mean).max(0.0);
            (sum_rgb.map(|s| s / n), mean, variance.sqrt())
        };

        Self {
            pixel_count,
            transparent,
            opaque,
            mean_rgb,
            brightness,
            contrast,
            histogram,
        }
    }

    fn fraction(&self, count: u64) -> f64 {
        if self.pixel_count == 0 {
            0.0
        } else {
            round2(count as f64 / self.pixel_count as f64)
        }
    }

    fn average_color(&self) -> [u8; 3] {
        self.mean_rgb.map(|v| v.round().clamp(0.0, 255.0) as u8)
    }

    fn is_grayscale(&self) -> bool {
        let [r, g, b] = self.mean_rgb;
        (r - g).abs() < 5.0 && (r - b).abs() < 5.0
    }

    fn color_json(&self) -> Value {
        let [r, g, b] = self.average_color();
        json!({
            "average_color": {
                "rgb": [r, g, b],
                "hex": format!("#{:02x}{:02x}{:02x}", r, g, b),
            },
            "brightness": round2(self.brightness),
            "contrast": round2(self.contrast),
            "is_grayscale": self.is_grayscale(),
        })
    }

    fn alpha_json(&self) -> Value {
        let partial = self.pixel_count - self.transparent - self.opaque;
        json!({
            "transparent_fraction": self.fraction(self.transparent),
            "translucent_fraction": self.fraction(partial),
            "opaque_fraction": self.fraction(self.opaque),
            "has_transparency": self.opaque < self.pixel_count,
        })
    }

    fn histogram_json(&self) -> Value {
        let [r, g, b, luma] = &self.histogram;
        json!({
            "bins": HISTOGRAM_BINS,
            "red": r.to_vec(),
            "green": g.to_vec(),
            "blue": b.to_vec(),
            "luma": luma.to_vec(),
        })
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// analyze_image - 画布与图层的统计摘要
pub struct AnalyzeImage;

#[async_trait]
impl Transform for AnalyzeImage {
    fn name(&self) -> &'static str {
        "analyze_image"
    }

    fn description(&self) -> &'static str {
        "Report dimensions, layers and color statistics of the target layer"
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let canvas = input.require_canvas()?;
        let level = AnalysisLevel::parse(input.params.str_or("analysis_type", "basic")?)?;
        let handle = input.params.layer_or_active(canvas)?;
        let pixels = canvas.layer(handle)?.pixels().clone();

        input
            .progress
            .report(0.3, TaskStatus::Running, "processing image data");
        let stats = run_blocking(move || Ok(PixelStats::collect(&pixels))).await?;

        let (width, height) = canvas.dimensions();
        let summary = canvas.summary();
        let visible = summary.layers.iter().filter(|l| l.visible).count();

        let mut outcome = TransformOutcome::new()
            .with_field("analysis_level", level.as_str())
            .with_field(
                "dimensions",
                json!({
                    "width": width,
                    "height": height,
                    "aspect_ratio": round2(width as f64 / height.max(1) as f64),
                }),
            )
            .with_field("layer_count", canvas.layer_count())
            .with_field("visible_layer_count", visible)
            .with_field("analyzed_layer", handle.as_u32())
            .with_field("color_analysis", stats.color_json())
            .with_field("alpha", stats.alpha_json());

        if level == AnalysisLevel::Detailed {
            let layers = serde_json::to_value(&summary.layers)
                .map_err(|e| TransformError::Fault(format!("layer summary: {}", e)))?;
            outcome = outcome
                .with_field("histogram", stats.histogram_json())
                .with_field("layer_analysis", layers);
        }
        Ok(outcome)
    }
}
