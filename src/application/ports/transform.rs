//! Transform Port - 图像变换
//!
//! 每个变换是一个纯函数式的步骤：
//! 读取画布与参数，返回待提交的变更、结构化字段和二进制输出。
//! 变换不直接修改会话。

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::ProgressReporter;
use crate::domain::canvas::codec::EncodeFormat;
use crate::domain::canvas::{Canvas, CanvasError, Color, LayerHandle};
use crate::domain::session::CanvasMutation;

/// 变换错误
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("{0}")]
    InvalidParams(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Model backend error: {0}")]
    Backend(String),

    #[error("{0}")]
    Fault(String),
}

impl TransformError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }
}

// 变换阶段的画布错误来自参数或会话状态
impl From<CanvasError> for TransformError {
    fn from(err: CanvasError) -> Self {
        Self::InvalidParams(err.to_string())
    }
}

/// 变换类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    /// 本地确定性编辑
    Edit,
    /// 依赖模型后端
    Ai,
}

/// 命令参数（JSON 对象）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformParams(Map<String, Value>);

impl TransformParams {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn f64(&self, name: &str) -> Result<Option<f64>, TransformError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v
                .as_f64()
                .filter(|f| f.is_finite())
                .map(Some)
                .ok_or_else(|| TransformError::invalid(format!("parameter `{}` must be a number", name))),
        }
    }

    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64, TransformError> {
        Ok(self.f64(name)?.unwrap_or(default))
    }

    /// 数值参数，限定在闭区间内
    pub fn f64_in(&self, name: &str, default: f64, min: f64, max: f64) -> Result<f64, TransformError> {
        let value = self.f64_or(name, default)?;
        if value < min || value > max {
            return Err(TransformError::invalid(format!(
                "parameter `{}` must be between {} and {}, got {}",
                name, min, max, value
            )));
        }
        Ok(value)
    }

    pub fn u32(&self, name: &str) -> Result<Option<u32>, TransformError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
                .and_then(|n| u32::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| {
                    TransformError::invalid(format!(
                        "parameter `{}` must be a non-negative integer",
                        name
                    ))
                }),
        }
    }

    pub fn require_u32(&self, name: &str) -> Result<u32, TransformError> {
        self.u32(name)?
            .ok_or_else(|| TransformError::invalid(format!("missing parameter `{}`", name)))
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool, TransformError> {
        match self.get(name) {
            None => Ok(default),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| TransformError::invalid(format!("parameter `{}` must be a boolean", name))),
        }
    }

    pub fn str(&self, name: &str) -> Result<Option<&str>, TransformError> {
        match self.get(name) {
            None => Ok(None),
            Some(v) => v
                .as_str()
                .map(Some)
                .ok_or_else(|| TransformError::invalid(format!("parameter `{}` must be a string", name))),
        }
    }

    pub fn str_or<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str, TransformError> {
        Ok(self.str(name)?.unwrap_or(default))
    }

    /// 颜色：颜色名、十六进制字符串或 `[r, g, b(, a)]`
    pub fn color_or(&self, name: &str, default: Color) -> Result<Color, TransformError> {
        let invalid = || TransformError::invalid(format!("parameter `{}` is not a valid color", name));
        match self.get(name) {
            None => Ok(default),
            Some(Value::String(s)) => Color::parse(s).map_err(|_| invalid()),
            Some(Value::Array(items)) => {
                let channels = items
                    .iter()
                    .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .ok_or_else(invalid)?;
                Color::from_channels(&channels).map_err(|_| invalid())
            }
            Some(_) => Err(invalid()),
        }
    }

    /// 目标图层：`layer` 参数或活动图层
    pub fn layer_or_active(&self, canvas: &Canvas) -> Result<LayerHandle, TransformError> {
        match self.u32("layer")? {
            Some(index) => {
                let handle = LayerHandle::new(index);
                canvas.layer(handle)?;
                Ok(handle)
            }
            None => Ok(canvas.active_handle()?),
        }
    }
}

/// 变换输入
pub struct TransformInput<'a> {
    pub canvas: &'a Canvas,
    pub params: &'a TransformParams,
    /// 已解码的二进制参数（含 `input_from` 引用的前序输出）
    pub images: &'a HashMap<String, RgbaImage>,
    pub progress: &'a ProgressReporter,
}

impl<'a> TransformInput<'a> {
    pub fn image(&self, name: &str) -> Option<&'a RgbaImage> {
        self.images.get(name)
    }

    pub fn require_image(&self, name: &str) -> Result<&'a RgbaImage, TransformError> {
        self.image(name)
            .ok_or_else(|| TransformError::invalid(format!("missing binary parameter `{}`", name)))
    }

    /// 非空画布
    pub fn require_canvas(&self) -> Result<&'a Canvas, TransformError> {
        if self.canvas.is_empty() {
            return Err(TransformError::invalid(
                "session has no image; run create_image first",
            ));
        }
        Ok(self.canvas)
    }
}

/// 二进制输出：图像及其线路编码格式
#[derive(Debug, Clone)]
pub struct BinaryOutput {
    pub image: RgbaImage,
    pub format: EncodeFormat,
}

impl BinaryOutput {
    pub fn new(image: RgbaImage, format: EncodeFormat) -> Self {
        Self { image, format }
    }

    pub fn png(image: RgbaImage) -> Self {
        Self::new(image, EncodeFormat::Png)
    }
}

/// 变换结果
#[derive(Debug, Default)]
pub struct TransformOutcome {
    pub mutation: Option<CanvasMutation>,
    pub fields: Map<String, Value>,
    pub outputs: BTreeMap<String, BinaryOutput>,
}

impl TransformOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mutate(mutation: CanvasMutation) -> Self {
        Self {
            mutation: Some(mutation),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, image: RgbaImage) -> Self {
        self.outputs.insert(name.into(), BinaryOutput::png(image));
        self
    }

    pub fn with_encoded_output(
        mut self,
        name: impl Into<String>,
        image: RgbaImage,
        format: EncodeFormat,
    ) -> Self {
        self.outputs.insert(name.into(), BinaryOutput::new(image, format));
        self
    }
}

/// Transform Port
#[async_trait]
pub trait Transform: Send + Sync {
    /// 注册名（全局唯一）
    fn name(&self) -> &'static str;

    fn kind(&self) -> TransformKind {
        TransformKind::Edit
    }

    fn description(&self) -> &'static str {
        ""
    }

    async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError>;
}
