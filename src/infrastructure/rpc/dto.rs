//! RPC Data Transfer Objects
//!
//! 参数反序列化与结果编码。图像在线路上是 data URL 字符串。

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::application::ports::{BinaryOutput, TransformParams};
use crate::application::{
    ApplicationError, BatchResult, Command, CommandOutcome, ErrorKind, ExecuteBatchCommand,
    GetSessionResponse, RunModelOperationResponse,
};
use crate::domain::canvas::codec::{self, EncodeFormat};
use crate::domain::canvas::{CanvasSummary, Color};

/// 反序列化方法参数；缺省 params 视为空对象
pub fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, ApplicationError> {
    let params = match params {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    serde_json::from_value(params).map_err(|e| ApplicationError::invalid_params(e.to_string()))
}

fn encode(image: &image::RgbaImage, format: EncodeFormat) -> Result<String, ApplicationError> {
    codec::encode_image(image, format).map_err(|e| ApplicationError::internal(e.to_string()))
}

fn encode_outputs(outputs: &BTreeMap<String, BinaryOutput>) -> Result<BTreeMap<String, String>, ApplicationError> {
    outputs
        .iter()
        .map(|(name, output)| Ok((name.clone(), encode(&output.image, output.format)?)))
        .collect()
}

fn to_value<T: Serialize>(value: T) -> Result<Value, ApplicationError> {
    serde_json::to_value(value).map_err(|e| ApplicationError::internal(e.to_string()))
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateSessionParams {
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub fill: Option<String>,
}

impl CreateSessionParams {
    pub fn fill_color(&self) -> Result<Option<Color>, ApplicationError> {
        self.fill
            .as_deref()
            .map(Color::parse)
            .transpose()
            .map_err(|e| ApplicationError::invalid_params(e.to_string()))
    }
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResult {
    pub session_id: String,
    pub canvas: CanvasSummary,
}

#[derive(Debug, Deserialize)]
pub struct SessionIdParams {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct CloseSessionResult {
    pub session_id: String,
    pub closed: bool,
}

#[derive(Debug, Deserialize)]
pub struct GetSessionParams {
    pub session_id: String,
    #[serde(default)]
    pub include_image_data: bool,
}

#[derive(Debug, Serialize)]
pub struct GetSessionResult {
    pub session_id: String,
    pub created_at: String,
    pub last_access: String,
    pub canvas: CanvasSummary,
    pub history: Vec<String>,
    pub undo_available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

impl GetSessionResult {
    pub fn encode(response: GetSessionResponse) -> Result<Self, ApplicationError> {
        let image_data = response
            .image
            .as_ref()
            .map(|img| encode(img, EncodeFormat::Png))
            .transpose()?;
        Ok(Self {
            session_id: response.session_id,
            created_at: response.created_at.to_rfc3339(),
            last_access: response.last_access.to_rfc3339(),
            canvas: response.canvas,
            history: response.history,
            undo_available: response.undo_available,
            image_data,
        })
    }
}

// ============================================================================
// Batch
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ExecuteCommandsParams {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub image_data: Option<String>,
    pub commands: Vec<Command>,
    #[serde(default)]
    pub include_image_data: bool,
    #[serde(default)]
    pub task_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CommandErrorDto {
    pub kind: ErrorKind,
    pub message: String,
}

/// 单条命令结果
#[derive(Debug, Serialize)]
pub struct CommandResultDto {
    pub operation: String,
    /// success | error | not_attempted
    pub status: &'static str,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CommandErrorDto>,
}

impl CommandResultDto {
    fn encode(outcome: &CommandOutcome) -> Result<Self, ApplicationError> {
        Ok(match outcome {
            CommandOutcome::Success(s) => Self {
                operation: s.operation.clone(),
                status: "success",
                fields: s.fields.clone(),
                outputs: encode_outputs(&s.outputs)?,
                error: None,
            },
            CommandOutcome::Failure(f) => Self {
                operation: f.operation.clone(),
                status: "error",
                fields: Map::new(),
                outputs: BTreeMap::new(),
                error: Some(CommandErrorDto {
                    kind: f.kind,
                    message: f.message.clone(),
                }),
            },
            CommandOutcome::NotAttempted { operation } => Self {
                operation: operation.clone(),
                status: "not_attempted",
                fields: Map::new(),
                outputs: BTreeMap::new(),
                error: None,
            },
        })
    }
}

#[derive(Debug, Serialize)]
pub struct BatchResultDto {
    pub success: bool,
    pub session_id: String,
    pub task_id: String,
    pub session_created: bool,
    pub results: Vec<CommandResultDto>,
    pub canvas: CanvasSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
}

impl BatchResultDto {
    pub fn encode(result: BatchResult) -> Result<Self, ApplicationError> {
        let results = result
            .outcomes
            .iter()
            .map(CommandResultDto::encode)
            .collect::<Result<Vec<_>, _>>()?;
        let image_data = result
            .image
            .as_ref()
            .map(|img| encode(img, EncodeFormat::Png))
            .transpose()?;

        Ok(Self {
            success: result.success,
            session_id: result.session_id,
            task_id: result.task_id,
            session_created: result.session_created,
            results,
            canvas: result.canvas,
            image_data,
        })
    }
}

// ============================================================================
// Single operation against a session
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RunOperationParams {
    #[serde(default)]
    pub session_id: Option<String>,
    /// 新建会话的初始图像（不能与 session_id 同时给出）
    #[serde(default)]
    pub image_data: Option<String>,
    pub operation: String,
    #[serde(default)]
    pub params: TransformParams,
    #[serde(default)]
    pub binary: BTreeMap<String, String>,
    #[serde(default)]
    pub include_image_data: bool,
    #[serde(default)]
    pub task_id: Option<String>,
}

impl RunOperationParams {
    /// 单条命令的批次
    pub fn into_batch(self) -> ExecuteBatchCommand {
        let mut command = Command::new(self.operation, self.params);
        command.binary = self.binary;
        ExecuteBatchCommand {
            session_id: self.session_id,
            image_data: self.image_data,
            commands: vec![command],
            include_image_data: self.include_image_data,
            task_id: self.task_id,
        }
    }
}

/// 扁平结果：字段与 `{name}_data` 输出直接位于顶层
pub fn flat_operation_result(result: BatchResult) -> Result<Value, ApplicationError> {
    let success = match result.outcomes.into_iter().next() {
        Some(CommandOutcome::Success(success)) => success,
        Some(CommandOutcome::Failure(failure)) => return Err(failure.into()),
        _ => return Err(ApplicationError::internal("operation produced no outcome")),
    };

    let mut out = success.fields;
    for (name, data) in encode_outputs(&success.outputs)? {
        out.insert(format!("{}_data", name), Value::String(data));
    }
    out.insert("success".into(), Value::Bool(true));
    out.insert("operation".into(), Value::String(success.operation));
    out.insert("session_id".into(), Value::String(result.session_id));
    out.insert("task_id".into(), Value::String(result.task_id));
    out.insert("canvas".into(), to_value(&result.canvas)?);
    if let Some(img) = result.image.as_ref() {
        out.insert("image_data".into(), Value::String(encode(img, EncodeFormat::Png)?));
    }
    Ok(Value::Object(out))
}

// ============================================================================
// Tasks
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TaskIdParams {
    pub task_id: String,
}

#[derive(Debug, Serialize)]
pub struct CancelTaskResult {
    pub task_id: String,
    pub cancelled: bool,
}

// ============================================================================
// One-shot AI operations
// ============================================================================

/// 除下列字段外的所有参数都交给变换
#[derive(Debug, Deserialize)]
pub struct ModelOperationParams {
    pub image_data: String,
    #[serde(default)]
    pub mask_data: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default, rename = "async")]
    pub detach: bool,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

pub fn model_operation_result(response: RunModelOperationResponse) -> Result<Value, ApplicationError> {
    match response {
        RunModelOperationResponse::Accepted { task_id } => Ok(serde_json::json!({
            "task_id": task_id,
            "status": "accepted",
        })),
        RunModelOperationResponse::Completed {
            task_id,
            image,
            fields,
            outputs,
        } => {
            let mut out = Map::new();
            out.insert("task_id".into(), Value::String(task_id));
            out.insert("status".into(), Value::String("completed".into()));
            out.insert("image_data".into(), Value::String(encode(&image, EncodeFormat::Png)?));
            out.insert("width".into(), Value::from(image.width()));
            out.insert("height".into(), Value::from(image.height()));
            for (name, output) in outputs.iter().filter(|(name, _)| name.as_str() != "image") {
                out.insert(
                    format!("{}_data", name),
                    Value::String(encode(&output.image, output.format)?),
                );
            }
            out.insert("metadata".into(), Value::Object(fields));
            Ok(Value::Object(out))
        }
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Serialize)]
pub struct InitializeResult {
    pub server: &'static str,
    pub version: &'static str,
    pub protocol_version: &'static str,
    pub methods: Vec<&'static str>,
    pub operations: Vec<&'static str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{CommandFailure, CommandSuccess};
    use crate::domain::canvas::Canvas;
    use image::{Rgba, RgbaImage};
    use serde_json::json;

    fn batch(outcomes: Vec<CommandOutcome>, image: Option<RgbaImage>) -> BatchResult {
        BatchResult {
            session_id: "s".into(),
            task_id: "t".into(),
            session_created: false,
            success: outcomes.iter().all(CommandOutcome::is_success),
            outcomes,
            canvas: Canvas::new(2, 2, Color::WHITE).unwrap().summary(),
            image,
        }
    }

    #[test]
    fn test_missing_param_is_named() {
        let err = parse_params::<SessionIdParams>(json!({})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
        assert!(err.to_string().contains("session_id"));

        let err = parse_params::<TaskIdParams>(Value::Null).unwrap_err();
        assert!(err.to_string().contains("task_id"));
    }

    #[test]
    fn test_model_params_collect_extras() {
        let p: ModelOperationParams = parse_params(json!({
            "image_data": "abc",
            "async": true,
            "scale_factor": 4,
            "sharpen": true
        }))
        .unwrap();
        assert!(p.detach);
        assert_eq!(p.params["scale_factor"], 4);
        assert!(!p.params.contains_key("image_data"));
    }

    #[test]
    fn test_batch_result_encoding() {
        let mut outputs = BTreeMap::new();
        outputs.insert("image".to_string(), BinaryOutput::png(RgbaImage::from_pixel(1, 1, Rgba([1, 2, 3, 255]))));
        let result = batch(
            vec![
                CommandOutcome::Success(CommandSuccess {
                    operation: "export_image".into(),
                    fields: Map::new(),
                    outputs,
                }),
                CommandOutcome::Failure(CommandFailure::new("apply_blur", ErrorKind::InvalidParams, "bad radius")),
                CommandOutcome::NotAttempted {
                    operation: "undo".into(),
                },
            ],
            Some(RgbaImage::new(2, 2)),
        );

        let value = serde_json::to_value(BatchResultDto::encode(result).unwrap()).unwrap();
        assert_eq!(value["success"], false);
        assert!(value["results"][0]["outputs"]["image"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
        assert_eq!(value["results"][1]["error"]["kind"], "InvalidParams");
        assert_eq!(value["results"][2]["status"], "not_attempted");
        assert!(value["image_data"].is_string());
    }

    #[test]
    fn test_flat_result_failure_becomes_error() {
        let result = batch(
            vec![CommandOutcome::Failure(CommandFailure::new(
                "resize_image",
                ErrorKind::InvalidParams,
                "width or height is required",
            ))],
            None,
        );
        let err = flat_operation_result(result).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
    }
}
