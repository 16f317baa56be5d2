//! Batch Commands - 批量执行图像命令

use std::collections::BTreeMap;

use image::RgbaImage;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::application::error::{ApplicationError, ErrorKind};
use crate::application::ports::{BinaryOutput, TransformParams};
use crate::domain::canvas::CanvasSummary;

/// 单条图像命令
#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    pub operation: String,
    #[serde(default)]
    pub params: TransformParams,
    /// 二进制参数：名称 → base64 图像
    #[serde(default)]
    pub binary: BTreeMap<String, String>,
    /// 引用同批次前序命令的二进制输出
    #[serde(default)]
    pub input_from: Vec<InputRef>,
}

impl Command {
    pub fn new(operation: impl Into<String>, params: TransformParams) -> Self {
        Self {
            operation: operation.into(),
            params,
            binary: BTreeMap::new(),
            input_from: Vec::new(),
        }
    }
}

/// 前序输出引用
#[derive(Debug, Clone, Deserialize)]
pub struct InputRef {
    /// 前序命令下标（从 0 开始）
    pub command: usize,
    /// 前序命令的输出名
    pub output: String,
    /// 作为本命令的哪个二进制参数，缺省与 output 同名
    #[serde(default)]
    pub param: Option<String>,
}

impl InputRef {
    pub fn param_name(&self) -> &str {
        self.param.as_deref().unwrap_or(&self.output)
    }
}

/// 批量执行命令
#[derive(Debug, Clone, Default)]
pub struct ExecuteBatchCommand {
    /// 为空时新建会话
    pub session_id: Option<String>,
    /// 新建会话的初始图像
    pub image_data: Option<String>,
    pub commands: Vec<Command>,
    pub include_image_data: bool,
    /// 客户端指定的任务 ID
    pub task_id: Option<String>,
}

/// 命令成功结果
#[derive(Debug, Clone)]
pub struct CommandSuccess {
    pub operation: String,
    pub fields: Map<String, Value>,
    pub outputs: BTreeMap<String, BinaryOutput>,
}

/// 命令失败结果
#[derive(Debug, Clone)]
pub struct CommandFailure {
    pub operation: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl CommandFailure {
    pub fn new(operation: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            kind,
            message: message.into(),
        }
    }
}

/// 单条命令的结局
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Success(CommandSuccess),
    Failure(CommandFailure),
    /// 前序命令失败，未执行
    NotAttempted { operation: String },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success(_))
    }

    pub fn operation(&self) -> &str {
        match self {
            CommandOutcome::Success(s) => &s.operation,
            CommandOutcome::Failure(f) => &f.operation,
            CommandOutcome::NotAttempted { operation } => operation,
        }
    }
}

/// 批量执行结果
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub session_id: String,
    pub task_id: String,
    pub session_created: bool,
    /// 所有命令均成功
    pub success: bool,
    pub outcomes: Vec<CommandOutcome>,
    pub canvas: CanvasSummary,
    /// 合成后的图像（仅当 include_image_data）
    pub image: Option<RgbaImage>,
}

impl BatchResult {
    pub fn first_failure(&self) -> Option<&CommandFailure> {
        self.outcomes.iter().find_map(|o| match o {
            CommandOutcome::Failure(f) => Some(f),
            _ => None,
        })
    }
}

impl From<CommandFailure> for ApplicationError {
    fn from(failure: CommandFailure) -> Self {
        match failure.kind {
            ErrorKind::InvalidParams => ApplicationError::InvalidParams(failure.message),
            ErrorKind::UnknownOperation => ApplicationError::UnknownOperation(failure.operation),
            ErrorKind::TransformFault => ApplicationError::TransformFault(failure.message),
            _ => ApplicationError::InternalError(failure.message),
        }
    }
}
