//! Session Queries - 会话查询

use chrono::{DateTime, Utc};

use crate::domain::canvas::CanvasSummary;

/// 获取会话详情
#[derive(Debug, Clone)]
pub struct GetSessionQuery {
    pub session_id: String,
    pub include_image_data: bool,
}

/// 会话详情响应
#[derive(Debug, Clone)]
pub struct GetSessionResponse {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub canvas: CanvasSummary,
    pub history: Vec<String>,
    pub undo_available: bool,
    pub image: Option<image::RgbaImage>,
}
