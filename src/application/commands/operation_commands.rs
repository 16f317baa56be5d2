//! Operation Commands - 单次 AI 操作（无会话）

use std::collections::BTreeMap;

use image::RgbaImage;
use serde_json::{Map, Value};

use crate::application::ports::{BinaryOutput, ModelKind, TransformParams};

/// 单次模型操作命令
#[derive(Debug, Clone)]
pub struct RunModelOperationCommand {
    pub kind: ModelKind,
    pub image_data: String,
    pub mask_data: Option<String>,
    pub params: TransformParams,
    pub task_id: Option<String>,
    /// 立即返回 task_id，结果写入任务终态快照
    pub detach: bool,
}

/// 单次模型操作响应
#[derive(Debug, Clone)]
pub enum RunModelOperationResponse {
    Completed {
        task_id: String,
        image: RgbaImage,
        fields: Map<String, Value>,
        outputs: BTreeMap<String, BinaryOutput>,
    },
    Accepted {
        task_id: String,
    },
}
