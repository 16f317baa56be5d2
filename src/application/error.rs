//! 应用层错误定义
//!
//! 统一的命令/查询错误类型，以及对外暴露的错误分类

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ports::{ProgressError, SessionError, TransformError};

/// 错误分类（对外稳定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ParseError,
    InvalidRequest,
    UnknownMethod,
    InvalidParams,
    NotFound,
    SessionBusy,
    UnknownOperation,
    TransformFault,
    Timeout,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ParseError => "ParseError",
            ErrorKind::InvalidRequest => "InvalidRequest",
            ErrorKind::UnknownMethod => "UnknownMethod",
            ErrorKind::InvalidParams => "InvalidParams",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::SessionBusy => "SessionBusy",
            ErrorKind::UnknownOperation => "UnknownOperation",
            ErrorKind::TransformFault => "TransformFault",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::InternalError => "InternalError",
        }
    }

    /// JSON-RPC 错误码
    pub fn code(&self) -> i64 {
        match self {
            ErrorKind::ParseError => -32700,
            ErrorKind::InvalidRequest => -32600,
            ErrorKind::UnknownMethod => -32601,
            ErrorKind::InvalidParams => -32602,
            ErrorKind::InternalError => -32603,
            ErrorKind::NotFound => -32001,
            ErrorKind::SessionBusy => -32002,
            ErrorKind::UnknownOperation => -32003,
            ErrorKind::TransformFault => -32004,
            ErrorKind::Timeout => -32005,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    UnknownMethod(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    #[error("Session is busy: {0}")]
    SessionBusy(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Transform failed: {0}")]
    TransformFault(String),

    #[error("Call timed out after {0} ms")]
    Timeout(u64),

    /// 内部错误（细节只写日志，不返回给客户端）
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type,
            id: id.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ParseError(_) => ErrorKind::ParseError,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::UnknownMethod(_) => ErrorKind::UnknownMethod,
            Self::InvalidParams(_) => ErrorKind::InvalidParams,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::SessionBusy(_) => ErrorKind::SessionBusy,
            Self::UnknownOperation(_) => ErrorKind::UnknownOperation,
            Self::TransformFault(_) => ErrorKind::TransformFault,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::InternalError(_) => ErrorKind::InternalError,
        }
    }

    /// 返回给客户端的消息
    pub fn public_message(&self) -> String {
        match self {
            Self::InternalError(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<SessionError> for ApplicationError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound(id) => Self::not_found("Session", id),
            SessionError::Busy(id) => Self::SessionBusy(id),
        }
    }
}

impl From<ProgressError> for ApplicationError {
    fn from(err: ProgressError) -> Self {
        match err {
            ProgressError::NotFound(id) => Self::not_found("Task", id),
            ProgressError::AlreadyExists(id) => {
                Self::InvalidParams(format!("task_id already in use: {}", id))
            }
            ProgressError::OutOfRange(_) => Self::InvalidParams(err.to_string()),
            other => Self::InternalError(other.to_string()),
        }
    }
}

impl From<TransformError> for ApplicationError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::InvalidParams(msg) => Self::InvalidParams(msg),
            other => Self::TransformFault(other.to_string()),
        }
    }
}
