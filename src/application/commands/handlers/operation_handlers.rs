//! Model Operation Handler - 单次 AI 操作
//!
//! 不创建会话：解码输入图像，在一次性画布上执行对应的 AI 变换。
//! `detach` 模式下立即返回 task_id，结果写入任务终态快照。

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::application::commands::batch_commands::{Command, CommandSuccess};
use crate::application::commands::handlers::batch_handlers::{decode_canvas, CommandExecutor};
use crate::application::commands::operation_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{
    ProgressReporter, ProgressTrackerPort, TaskFailure, TaskOutcome,
};
use crate::domain::canvas::codec::{self, EncodeFormat};
use crate::domain::canvas::Canvas;

#[derive(Clone)]
pub struct RunModelOperationHandler {
    executor: Arc<CommandExecutor>,
    progress_tracker: Arc<dyn ProgressTrackerPort>,
}

impl RunModelOperationHandler {
    pub fn new(executor: Arc<CommandExecutor>, progress_tracker: Arc<dyn ProgressTrackerPort>) -> Self {
        Self {
            executor,
            progress_tracker,
        }
    }

    pub async fn handle(
        &self,
        cmd: RunModelOperationCommand,
    ) -> Result<RunModelOperationResponse, ApplicationError> {
        let canvas = decode_canvas(&cmd.image_data)?;
        let mut command = Command::new(cmd.kind.operation(), cmd.params);
        if let Some(mask) = cmd.mask_data {
            command.binary.insert("mask".to_string(), mask);
        }

        let task_id = self.progress_tracker.begin(cmd.task_id)?;
        let token = self.progress_tracker.cancellation_token(&task_id)?;
        let reporter = ProgressReporter::new(Arc::clone(&self.progress_tracker), task_id.clone(), token);

        tracing::info!(
            task_id = %task_id,
            operation = %command.operation,
            detach = cmd.detach,
            "Model operation started"
        );

        if cmd.detach {
            let this = self.clone();
            let id = task_id.clone();
            tokio::spawn(async move {
                if let Err(e) = this.run(id.clone(), canvas, command, reporter, true).await {
                    tracing::warn!(task_id = %id, error = %e, "Detached model operation failed");
                }
            });
            return Ok(RunModelOperationResponse::Accepted { task_id });
        }

        self.run(task_id, canvas, command, reporter, false).await
    }

    async fn run(
        &self,
        task_id: String,
        canvas: Canvas,
        command: Command,
        reporter: ProgressReporter,
        embed_result: bool,
    ) -> Result<RunModelOperationResponse, ApplicationError> {
        match self.executor.execute_transient(canvas, &command, &reporter).await {
            Ok((canvas, success)) => {
                let image = match success.outputs.get("image") {
                    Some(output) => output.image.clone(),
                    None => canvas
                        .flatten()
                        .map_err(|e| ApplicationError::internal(e.to_string()))?,
                };

                let result = if embed_result {
                    match encode_result(&image, &success) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            let failure = TaskFailure::new(e.kind(), e.public_message());
                            self.finish(&task_id, TaskOutcome::Failed(failure));
                            return Err(e);
                        }
                    }
                } else {
                    Some(json!({ "operation": success.operation }))
                };
                self.finish(&task_id, TaskOutcome::Completed(result));

                Ok(RunModelOperationResponse::Completed {
                    task_id,
                    image,
                    fields: success.fields,
                    outputs: success.outputs,
                })
            }
            Err(failure) => {
                tracing::warn!(
                    task_id = %task_id,
                    operation = %failure.operation,
                    kind = %failure.kind,
                    error = %failure.message,
                    "Model operation failed"
                );
                self.finish(
                    &task_id,
                    TaskOutcome::Failed(TaskFailure::new(failure.kind, failure.message.clone())),
                );
                Err(failure.into())
            }
        }
    }

    fn finish(&self, task_id: &str, outcome: TaskOutcome) {
        if let Err(e) = self.progress_tracker.finish(task_id, outcome) {
            tracing::warn!(task_id = %task_id, error = %e, "Failed to finish task");
        }
    }
}

/// 终态快照中的结果：图像、字段与其他输出
fn encode_result(image: &image::RgbaImage, success: &CommandSuccess) -> Result<Value, ApplicationError> {
    let encode = |img: &image::RgbaImage, format: EncodeFormat| {
        codec::encode_image(img, format).map_err(|e| ApplicationError::internal(e.to_string()))
    };

    let mut outputs = Map::new();
    for (name, output) in success.outputs.iter().filter(|(name, _)| name.as_str() != "image") {
        outputs.insert(name.clone(), Value::String(encode(&output.image, output.format)?));
    }

    Ok(json!({
        "operation": success.operation,
        "image_data": encode(image, EncodeFormat::Png)?,
        "width": image.width(),
        "height": image.height(),
        "fields": success.fields,
        "outputs": outputs,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::application::error::ErrorKind;
    use crate::application::ports::{BusyPolicy, ModelKind, TaskStatus, TransformParams};
    use crate::infrastructure::adapters::model::LocalModelBackend;
    use crate::infrastructure::adapters::transforms::standard_registry;
    use crate::infrastructure::memory::{InMemoryProgressTracker, InMemorySessionStore};
    use image::{Rgba, RgbaImage};

    fn handler() -> (RunModelOperationHandler, Arc<InMemoryProgressTracker>) {
        let tracker = InMemoryProgressTracker::new().arc();
        let registry = standard_registry(Arc::new(LocalModelBackend::new()), Vec::new()).unwrap();
        let executor = Arc::new(CommandExecutor::new(
            InMemorySessionStore::new().arc(),
            tracker.clone(),
            Arc::new(registry),
            BusyPolicy::Wait,
        ));
        (RunModelOperationHandler::new(executor, tracker.clone()), tracker)
    }

    fn params(value: serde_json::Value) -> TransformParams {
        serde_json::from_value(value).unwrap()
    }

    fn image_data(w: u32, h: u32) -> String {
        codec::encode_png(&RgbaImage::from_pixel(w, h, Rgba([40, 90, 200, 255]))).unwrap()
    }

    #[tokio::test]
    async fn test_upscale_inline() {
        let (handler, tracker) = handler();
        let response = handler
            .handle(RunModelOperationCommand {
                kind: ModelKind::Upscale,
                image_data: image_data(4, 3),
                mask_data: None,
                params: params(serde_json::json!({"scale_factor": 2})),
                task_id: Some("up-1".into()),
                detach: false,
            })
            .await
            .unwrap();

        match response {
            RunModelOperationResponse::Completed { task_id, image, .. } => {
                assert_eq!(task_id, "up-1");
                assert_eq!(image.dimensions(), (8, 6));
            }
            other => panic!("unexpected response: {:?}", other),
        }
        assert_eq!(tracker.read("up-1").unwrap().status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_invalid_scale_factor() {
        let (handler, tracker) = handler();
        let err = handler
            .handle(RunModelOperationCommand {
                kind: ModelKind::Upscale,
                image_data: image_data(4, 3),
                mask_data: None,
                params: params(serde_json::json!({"scale_factor": 3})),
                task_id: Some("up-2".into()),
                detach: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
        assert_eq!(tracker.read("up-2").unwrap().status, TaskStatus::Error);
    }

    #[tokio::test]
    async fn test_detached_result_in_snapshot() {
        let (handler, tracker) = handler();
        let response = handler
            .handle(RunModelOperationCommand {
                kind: ModelKind::BackgroundRemoval,
                image_data: image_data(6, 6),
                mask_data: None,
                params: TransformParams::default(),
                task_id: None,
                detach: true,
            })
            .await
            .unwrap();

        let RunModelOperationResponse::Accepted { task_id } = response else {
            panic!("expected accepted response");
        };

        let mut rx = tracker.subscribe(&task_id).unwrap();
        let snapshot = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if rx.borrow_and_update().is_terminal() {
                    return rx.borrow().clone();
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();

        assert_eq!(snapshot.status, TaskStatus::Completed);
        let result = snapshot.result.unwrap();
        assert!(result["image_data"].as_str().unwrap().starts_with("data:image/png"));
        assert!(result["outputs"]["mask"].is_string());
    }

    #[tokio::test]
    async fn test_bad_image_data() {
        let (handler, tracker) = handler();
        let err = handler
            .handle(RunModelOperationCommand {
                kind: ModelKind::StyleTransfer,
                image_data: "not-an-image".into(),
                mask_data: None,
                params: TransformParams::default(),
                task_id: None,
                detach: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
        assert!(tracker.is_empty());
    }
}
