//! AI Transforms - 调用模型后端的变换
//!
//! 参数在调用模型前全部校验。调用前后各检查一次取消令牌。
//! 放大作用于合成后的整幅图像；其余操作作用于目标图层，
//! `as_new_layer` 为 true 时结果作为新图层添加。

use std::sync::Arc;

use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde_json::{Map, Value};

use crate::application::ports::{
    ModelBackendPort, ModelError, ModelKind, ModelRequest, TaskStatus, Transform, TransformError,
    TransformInput, TransformKind, TransformOutcome, TransformParams,
};
use crate::domain::canvas::{Canvas, Layer, MAX_DIMENSION};
use crate::domain::session::CanvasMutation;
use crate::infrastructure::adapters::model::DEFAULT_STYLES;

const SCALE_FACTORS: [u32; 3] = [2, 4, 8];

pub struct ModelTransform {
    kind: ModelKind,
    backend: Arc<dyn ModelBackendPort>,
    styles: Arc<Vec<String>>,
}

impl ModelTransform {
    pub fn new(kind: ModelKind, backend: Arc<dyn ModelBackendPort>, styles: Arc<Vec<String>>) -> Self {
        Self { kind, backend, styles }
    }

    /// 每种模型一个变换；风格列表为空时使用内置风格
    pub fn all(backend: Arc<dyn ModelBackendPort>, styles: Arc<Vec<String>>) -> Vec<ModelTransform> {
        let styles = if styles.is_empty() {
            Arc::new(DEFAULT_STYLES.iter().map(|s| s.to_string()).collect())
        } else {
            styles
        };
        ModelKind::ALL
            .iter()
            .map(|kind| ModelTransform::new(*kind, Arc::clone(&backend), Arc::clone(&styles)))
            .collect()
    }

    /// 校验参数并生成模型选项
    fn options(
        &self,
        params: &TransformParams,
        (width, height): (u32, u32),
    ) -> Result<Map<String, Value>, TransformError> {
        let mut options = Map::new();
        match self.kind {
            ModelKind::Inpainting => {}
            ModelKind::StyleTransfer => {
                let style = match params.str("style_name")? {
                    Some(style) => style,
                    None => params.str_or("style", "starry_night")?,
                };
                if !self.styles.iter().any(|s| s == style) {
                    return Err(TransformError::invalid(format!(
                        "unknown style `{}`; available: {}",
                        style,
                        self.styles.join(", ")
                    )));
                }
                let strength = params.f64_in("strength", 1.0, 0.0, 1.0)?;
                options.insert("style".into(), Value::from(style));
                options.insert("strength".into(), Value::from(strength));
            }
            ModelKind::BackgroundRemoval => {
                let threshold = params.f64_in("threshold", 0.5, 0.0, 1.0)?;
                options.insert("threshold".into(), Value::from(threshold));
            }
            ModelKind::Upscale => {
                let factor = params.u32("scale_factor")?.unwrap_or(2);
                if !SCALE_FACTORS.contains(&factor) {
                    return Err(TransformError::invalid("scale_factor must be 2, 4, or 8"));
                }
                // 结果尺寸在调用模型前确定，超限时不分配缓冲区
                let fits = |side: u32| side.checked_mul(factor).is_some_and(|v| v <= MAX_DIMENSION);
                if !fits(width) || !fits(height) {
                    return Err(TransformError::invalid(format!(
                        "upscaled size {}x{} exceeds the {} pixel limit",
                        u64::from(width) * u64::from(factor),
                        u64::from(height) * u64::from(factor),
                        MAX_DIMENSION
                    )));
                }
                let denoise = params.f64_in("denoise_level", 0.0, 0.0, 1.0)?;
                let sharpen = params.bool_or("sharpen", false)?;
                options.insert("scale_factor".into(), Value::from(factor));
                options.insert("denoise_level".into(), Value::from(denoise));
                options.insert("sharpen".into(), Value::from(sharpen));
            }
        }
        Ok(options)
    }

    fn layer_name(&self, params: &TransformParams) -> Result<String, TransformError> {
        if let Some(name) = params.str("layer_name")? {
            return Ok(name.to_string());
        }
        Ok(match self.kind {
            ModelKind::Inpainting => "Inpainted".to_string(),
            ModelKind::StyleTransfer => {
                let style = params.str("style_name")?.or(params.str("style")?).unwrap_or("starry_night");
                format!("Style: {}", style)
            }
            ModelKind::BackgroundRemoval => "Background Removed".to_string(),
            ModelKind::Upscale => "Upscaled".to_string(),
        })
    }
}

fn model_error(err: ModelError) -> TransformError {
    match err {
        ModelError::Unsupported(message) => TransformError::InvalidParams(message),
        other => TransformError::Backend(other.to_string()),
    }
}

/// 掩码尺寸与画布不同时按最近邻缩放
fn fit_mask(mask: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if mask.dimensions() == (width, height) {
        mask.clone()
    } else {
        imageops::resize(mask, width, height, FilterType::Nearest)
    }
}

#[async_trait]
impl Transform for ModelTransform {
    fn name(&self) -> &'static str {
        self.kind.operation()
    }

    fn kind(&self) -> TransformKind {
        TransformKind::Ai
    }

    fn description(&self) -> &'static str {
        match self.kind {
            ModelKind::Inpainting => "Fill the masked region using an inpainting model",
            ModelKind::StyleTransfer => "Apply an artistic style",
            ModelKind::BackgroundRemoval => "Remove the background and produce a mask",
            ModelKind::Upscale => "Upscale the image by 2x, 4x or 8x",
        }
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
        let canvas = input.require_canvas()?;
        let params = input.params;
        let options = self.options(params, canvas.dimensions())?;
        let as_new_layer = params.bool_or("as_new_layer", false)? && self.kind != ModelKind::Upscale;

        let (target, source) = if self.kind == ModelKind::Upscale {
            (None, canvas.flatten()?)
        } else {
            let handle = params.layer_or_active(canvas)?;
            (Some(handle), canvas.layer(handle)?.pixels().clone())
        };
        let (width, height) = source.dimensions();
        let mask = match self.kind {
            ModelKind::Inpainting => Some(fit_mask(input.require_image("mask")?, width, height)),
            _ => None,
        };
        let layer_name = self.layer_name(params)?;

        let progress = input.progress;
        progress.checkpoint()?;
        progress.report(
            0.2,
            TaskStatus::LoadingResources,
            format!("loading {} model", self.kind.as_str()),
        );
        progress.report(0.4, TaskStatus::Running, format!("running {}", self.kind.as_str()));

        tracing::debug!(
            operation = %self.kind.operation(),
            backend = %self.backend.name(),
            width,
            height,
            "Invoking model backend"
        );

        let response = self
            .backend
            .infer(ModelRequest {
                kind: self.kind,
                image: source,
                mask,
                options,
            })
            .await
            .map_err(model_error)?;

        progress.checkpoint()?;
        progress.report(0.9, TaskStatus::Running, "applying result");

        let expected = match self.kind {
            ModelKind::Upscale => None,
            _ => Some((width, height)),
        };
        if let Some((w, h)) = expected {
            if response.image.dimensions() != (w, h) {
                let (rw, rh) = response.image.dimensions();
                return Err(TransformError::Backend(format!(
                    "model returned {}x{} image, expected {}x{}",
                    rw, rh, w, h
                )));
            }
        }

        let mutation = match target {
            None => CanvasMutation::Replace(Canvas::from_image(response.image.clone())?),
            Some(_) if as_new_layer => {
                CanvasMutation::AppendLayer(Layer::new(layer_name, response.image.clone()))
            }
            Some(layer) => CanvasMutation::ReplacePixels {
                layer,
                pixels: response.image.clone(),
            },
        };

        let (out_w, out_h) = response.image.dimensions();
        let mut outcome = TransformOutcome::mutate(mutation)
            .with_field("model", self.backend.name())
            .with_field("width", out_w)
            .with_field("height", out_h);
        for (key, value) in response.metadata {
            outcome = outcome.with_field(key, value);
        }
        outcome = outcome.with_output("image", response.image);
        if let Some(mask) = response.mask {
            outcome = outcome.with_output("mask", mask);
        }
        Ok(outcome)
    }
}
