//! Local Model Backend - 进程内的确定性近似实现
//!
//! 不依赖外部服务，用于开发、测试和无 GPU 环境：
//! - inpainting: 遮罩区域用模糊后的邻域填充
//! - style_transfer: 按风格调色并色阶化，再按强度与原图混合
//! - background_removal: 以边缘平均色为背景色，按色差生成 alpha
//! - upscale: Lanczos3 放大，可选降噪与锐化

use std::time::Duration;

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgba, RgbaImage};
use serde_json::{Map, Value};

use crate::application::ports::{
    ModelBackendPort, ModelError, ModelKind, ModelRequest, ModelResponse,
};

/// 内置风格
pub const DEFAULT_STYLES: &[&str] = &["candy", "mosaic", "rain_princess", "starry_night", "udnie"];

pub struct LocalModelBackend {
    /// 模拟推理延迟
    latency: Duration,
}

impl LocalModelBackend {
    pub fn new() -> Self {
        Self {
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl Default for LocalModelBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelBackendPort for LocalModelBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn infer(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let kind = request.kind;
        // 像素运算放到阻塞线程池
        let response = tokio::task::spawn_blocking(move || run(request))
            .await
            .map_err(|e| ModelError::ServiceError(format!("local {} worker failed: {}", kind.as_str(), e)))??;

        tracing::debug!(
            kind = kind.as_str(),
            width = response.image.width(),
            height = response.image.height(),
            "Local model inference completed"
        );
        Ok(response)
    }
}

fn run(request: ModelRequest) -> Result<ModelResponse, ModelError> {
    let options = &request.options;
    match request.kind {
        ModelKind::Inpainting => {
            let mask = request
                .mask
                .as_ref()
                .ok_or_else(|| ModelError::Unsupported("inpainting requires a mask".to_string()))?;
            Ok(plain(inpaint(&request.image, mask)))
        }
        ModelKind::StyleTransfer => {
            let style = option_str(options, "style").unwrap_or("starry_night");
            let strength = option_f32(options, "strength").unwrap_or(1.0);
            Ok(plain(stylize(&request.image, style, strength)?))
        }
        ModelKind::BackgroundRemoval => {
            let threshold = option_f32(options, "threshold").unwrap_or(0.5);
            let (image, mask) = remove_background(&request.image, threshold);
            Ok(ModelResponse {
                image,
                mask: Some(mask),
                metadata: Map::new(),
            })
        }
        ModelKind::Upscale => {
            let factor = option_f32(options, "scale_factor").unwrap_or(2.0) as u32;
            let denoise = option_f32(options, "denoise_level").unwrap_or(0.0);
            let sharpen = options.get("sharpen").and_then(Value::as_bool).unwrap_or(false);
            Ok(plain(upscale(&request.image, factor, denoise, sharpen)))
        }
    }
}

fn plain(image: RgbaImage) -> ModelResponse {
    ModelResponse {
        image,
        mask: None,
        metadata: Map::new(),
    }
}

fn option_str<'a>(options: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
    options.get(name).and_then(Value::as_str)
}

fn option_f32(options: &Map<String, Value>, name: &str) -> Option<f32> {
    options.get(name).and_then(Value::as_f64).map(|v| v as f32)
}

fn luma(px: &Rgba<u8>) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

fn inpaint(image: &RgbaImage, mask: &RgbaImage) -> RgbaImage {
    let (w, h) = image.dimensions();
    let mask = if mask.dimensions() == (w, h) {
        mask.clone()
    } else {
        imageops::resize(mask, w, h, FilterType::Nearest)
    };
    let sigma = (w.min(h) as f32 / 32.0).max(2.0);
    let filler = imageops::blur(image, sigma);

    let mut out = image.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        if luma(mask.get_pixel(x, y)) > 127.0 {
            *px = *filler.get_pixel(x, y);
        }
    }
    out
}

/// 风格色板：(暗部, 亮部, 色阶数)
fn palette(style: &str) -> Result<([f32; 3], [f32; 3], u8), ModelError> {
    match style {
        "starry_night" => Ok(([18.0, 32.0, 92.0], [250.0, 214.0, 72.0], 6)),
        "mosaic" => Ok(([40.0, 70.0, 60.0], [236.0, 180.0, 120.0], 4)),
        "candy" => Ok(([90.0, 20.0, 110.0], [255.0, 170.0, 200.0], 5)),
        "udnie" => Ok(([60.0, 30.0, 20.0], [230.0, 200.0, 150.0], 5)),
        "rain_princess" => Ok(([30.0, 20.0, 60.0], [240.0, 120.0, 60.0], 6)),
        other => Err(ModelError::Unsupported(format!("unknown style: {}", other))),
    }
}

fn stylize(image: &RgbaImage, style: &str, strength: f32) -> Result<RgbaImage, ModelError> {
    let (dark, light, levels) = palette(style)?;
    let strength = strength.clamp(0.0, 1.0);
    let steps = (levels - 1) as f32;

    let mut out = image.clone();
    for px in out.pixels_mut() {
        let t = ((luma(px) / 255.0) * steps).round() / steps;
        for c in 0..3 {
            let styled = dark[c] + (light[c] - dark[c]) * t;
            let mixed = px[c] as f32 * (1.0 - strength) + styled * strength;
            px[c] = mixed.round().clamp(0.0, 255.0) as u8;
        }
    }
    Ok(out)
}

fn remove_background(image: &RgbaImage, threshold: f32) -> (RgbaImage, RgbaImage) {
    let (w, h) = image.dimensions();

    let mut sum = [0f64; 3];
    let mut count = 0f64;
    for (x, y, px) in image.enumerate_pixels() {
        if x == 0 || y == 0 || x + 1 == w || y + 1 == h {
            for c in 0..3 {
                sum[c] += px[c] as f64;
            }
            count += 1.0;
        }
    }
    let background = sum.map(|s| (s / count.max(1.0)) as f32);

    // 最大 RGB 距离 ≈ 441.7
    let cutoff = threshold.clamp(0.0, 1.0) * 441.7 * 0.25;
    let mut mask = GrayImage::new(w, h);
    let mut out = image.clone();
    for (x, y, px) in out.enumerate_pixels_mut() {
        let distance = (0..3)
            .map(|c| (px[c] as f32 - background[c]).powi(2))
            .sum::<f32>()
            .sqrt();
        let keep = distance > cutoff;
        if !keep {
            px[3] = 0;
        }
        mask.put_pixel(x, y, Luma([if keep { 255 } else { 0 }]));
    }

    let mask = RgbaImage::from_fn(w, h, |x, y| {
        let v = mask.get_pixel(x, y)[0];
        Rgba([v, v, v, 255])
    });
    (out, mask)
}

fn upscale(image: &RgbaImage, factor: u32, denoise: f32, sharpen: bool) -> RgbaImage {
    let (w, h) = image.dimensions();
    let mut out = imageops::resize(
        image,
        w.saturating_mul(factor.max(1)),
        h.saturating_mul(factor.max(1)),
        FilterType::Lanczos3,
    );
    if denoise > 0.0 {
        out = imageops::blur(&out, denoise * 1.5);
    }
    if sharpen {
        out = imageops::unsharpen(&out, 1.0, 2);
    }
    out
}
