//! Session Commands - 会话相关命令

use crate::domain::canvas::{CanvasSummary, Color};

/// 创建会话命令
///
/// 初始画布来源优先级：image_data > width/height > 空画布
#[derive(Debug, Clone, Default)]
pub struct CreateSessionCommand {
    pub image_data: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub fill: Option<Color>,
}

/// 创建会话响应
#[derive(Debug, Clone)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub canvas: CanvasSummary,
}

/// 关闭会话命令
#[derive(Debug, Clone)]
pub struct CloseSessionCommand {
    pub session_id: String,
}

/// 关闭会话响应
#[derive(Debug, Clone)]
pub struct CloseSessionResponse {
    pub session_id: String,
}
