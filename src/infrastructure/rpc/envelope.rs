//! JSON-RPC 2.0 信封
//!
//! 回复总是回显请求的 id；无法解析出 id 时为 null。

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::application::{ApplicationError, ErrorKind};

pub const JSONRPC_VERSION: &str = "2.0";

/// 请求信封
#[derive(Debug, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    /// 调用方截止时间（毫秒）
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl RpcRequest {
    pub fn new(id: impl Into<Value>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: Some(JSONRPC_VERSION.to_string()),
            id: id.into(),
            method: method.into(),
            params,
            timeout_ms: None,
        }
    }
}

/// 错误对象
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    pub data: RpcErrorData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorData {
    pub kind: ErrorKind,
}

impl From<&ApplicationError> for RpcErrorObject {
    fn from(err: &ApplicationError) -> Self {
        let kind = err.kind();
        Self {
            code: kind.code(),
            message: err.public_message(),
            data: RpcErrorData { kind },
        }
    }
}

/// 回复信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, err: &ApplicationError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(err.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// 序列化失败时退回到固定的内部错误回复
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to serialize RPC response");
            json!({
                "jsonrpc": JSONRPC_VERSION,
                "id": self.id,
                "error": {
                    "code": ErrorKind::InternalError.code(),
                    "message": "Internal error",
                    "data": { "kind": ErrorKind::InternalError },
                }
            })
            .to_string()
        })
    }
}

/// 解析请求文本
///
/// JSON 无效时返回 ParseError；结构不符时返回 InvalidRequest，
/// 并尽量带上能读到的 id。
pub fn parse_request(text: &str) -> Result<RpcRequest, (Value, ApplicationError)> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| (Value::Null, ApplicationError::ParseError(e.to_string())))?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    if !value.is_object() {
        return Err((id, ApplicationError::InvalidRequest("request must be a JSON object".into())));
    }
    if !matches!(id, Value::Null | Value::String(_) | Value::Number(_)) {
        return Err((Value::Null, ApplicationError::InvalidRequest("id must be a string or number".into())));
    }

    let request: RpcRequest = serde_json::from_value(value)
        .map_err(|e| (id.clone(), ApplicationError::InvalidRequest(e.to_string())))?;

    match request.jsonrpc.as_deref() {
        None | Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err((
                id,
                ApplicationError::InvalidRequest(format!("unsupported jsonrpc version: {}", other)),
            ));
        }
    }
    if request.method.trim().is_empty() {
        return Err((id, ApplicationError::InvalidRequest("method must not be empty".into())));
    }
    if !matches!(request.params, Value::Null | Value::Object(_)) {
        return Err((id, ApplicationError::InvalidParams("params must be an object".into())));
    }

    Ok(request)
}
