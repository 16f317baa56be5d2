//! Model Backend Port - AI 模型推理抽象
//!
//! 定义 AI 图像模型推理的抽象接口，具体实现在 infrastructure/adapters 层

use async_trait::async_trait;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// 模型错误
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Service error: {0}")]
    ServiceError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unsupported option: {0}")]
    Unsupported(String),
}

/// 模型类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Inpainting,
    StyleTransfer,
    BackgroundRemoval,
    Upscale,
}

impl ModelKind {
    pub const ALL: [ModelKind; 4] = [
        ModelKind::Inpainting,
        ModelKind::StyleTransfer,
        ModelKind::BackgroundRemoval,
        ModelKind::Upscale,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Inpainting => "inpainting",
            ModelKind::StyleTransfer => "style_transfer",
            ModelKind::BackgroundRemoval => "background_removal",
            ModelKind::Upscale => "upscale",
        }
    }

    /// 对应的变换名
    pub fn operation(&self) -> &'static str {
        match self {
            ModelKind::Inpainting => "ai_inpainting",
            ModelKind::StyleTransfer => "ai_style_transfer",
            ModelKind::BackgroundRemoval => "ai_background_removal",
            ModelKind::Upscale => "ai_upscale",
        }
    }

    pub fn from_operation(operation: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.operation() == operation)
    }
}

/// 推理请求
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub kind: ModelKind,
    pub image: RgbaImage,
    /// 修复区域（白色为需修复）
    pub mask: Option<RgbaImage>,
    /// 已校验的模型参数
    pub options: Map<String, Value>,
}

/// 推理响应
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub image: RgbaImage,
    /// 背景移除等模型产出的遮罩
    pub mask: Option<RgbaImage>,
    pub metadata: Map<String, Value>,
}

/// Model Backend Port
///
/// 外部模型服务的抽象接口
#[async_trait]
pub trait ModelBackendPort: Send + Sync {
    /// 后端名称（用于日志）
    fn name(&self) -> &'static str;

    /// 执行推理
    async fn infer(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;

    /// 检查模型服务是否可用
    async fn health_check(&self) -> bool {
        true
    }
}
