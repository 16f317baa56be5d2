//! Command Executor - 批量命令执行
//!
//! 执行流程：
//! 1. 校验请求（任何会话修改之前）
//! 2. 解析或创建会话，登记任务
//! 3. 持有会话租约，按顺序执行命令
//! 4. 首个失败之后的命令标记为 not_attempted
//! 5. 释放租约，写入任务终态

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use image::RgbaImage;

use crate::application::commands::batch_commands::*;
use crate::application::error::{ApplicationError, ErrorKind};
use crate::application::ports::{
    BinaryOutput, BusyPolicy, ProgressReporter, ProgressTrackerPort, SessionStorePort,
    TaskFailure, TaskOutcome, TaskStatus, TransformError, TransformInput,
};
use crate::application::registry::TransformRegistry;
use crate::domain::canvas::{codec, Canvas, CanvasError};
use crate::domain::session::EditingState;

pub struct CommandExecutor {
    session_store: Arc<dyn SessionStorePort>,
    progress_tracker: Arc<dyn ProgressTrackerPort>,
    registry: Arc<TransformRegistry>,
    busy_policy: BusyPolicy,
}

impl CommandExecutor {
    pub fn new(
        session_store: Arc<dyn SessionStorePort>,
        progress_tracker: Arc<dyn ProgressTrackerPort>,
        registry: Arc<TransformRegistry>,
        busy_policy: BusyPolicy,
    ) -> Self {
        Self {
            session_store,
            progress_tracker,
            registry,
            busy_policy,
        }
    }

    pub fn registry(&self) -> &TransformRegistry {
        &self.registry
    }

    pub fn busy_policy(&self) -> BusyPolicy {
        self.busy_policy
    }

    pub async fn execute(&self, cmd: ExecuteBatchCommand) -> Result<BatchResult, ApplicationError> {
        Self::validate(&cmd)?;

        let initial = match (&cmd.session_id, &cmd.image_data) {
            (Some(_), Some(_)) => {
                return Err(ApplicationError::invalid_params(
                    "image_data can only be used when creating a new session",
                ))
            }
            (None, Some(data)) => Some(decode_canvas(data)?),
            _ => None,
        };

        let task_id = self.progress_tracker.begin(cmd.task_id.clone())?;

        let (session_id, session_created) = match cmd.session_id {
            Some(id) => (id, false),
            None => {
                let state = EditingState::new(initial.unwrap_or_else(Canvas::empty));
                (self.session_store.create(state), true)
            }
        };

        self.progress_tracker
            .update(
                &task_id,
                0.0,
                TaskStatus::LoadingResources,
                Some("waiting for session".to_string()),
            )
            .map_err(ApplicationError::from)?;

        let mut lease = match self.session_store.acquire(&session_id, self.busy_policy).await {
            Ok(lease) => lease,
            Err(e) => {
                let err = ApplicationError::from(e);
                self.fail_task(&task_id, TaskFailure::new(err.kind(), err.to_string()));
                return Err(err);
            }
        };

        tracing::info!(
            session_id = %session_id,
            task_id = %task_id,
            commands = cmd.commands.len(),
            "Executing command batch"
        );

        let token = self.progress_tracker.cancellation_token(&task_id)?;
        let reporter = ProgressReporter::new(Arc::clone(&self.progress_tracker), task_id.clone(), token);
        reporter.report(0.0, TaskStatus::Running, "executing commands");

        let total = cmd.commands.len();
        let mut outcomes: Vec<CommandOutcome> = Vec::with_capacity(total);
        let mut failed = false;

        for (index, command) in cmd.commands.iter().enumerate() {
            if failed {
                outcomes.push(CommandOutcome::NotAttempted {
                    operation: command.operation.clone(),
                });
                continue;
            }

            let span = reporter.scoped(index as f32 / total as f32, (index + 1) as f32 / total as f32);
            let outcome = if span.is_cancelled() {
                CommandOutcome::Failure(CommandFailure::new(
                    &command.operation,
                    ErrorKind::TransformFault,
                    "cancelled",
                ))
            } else {
                self.run_command(lease.state_mut(), index, command, &outcomes, &span)
                    .await
            };

            if let CommandOutcome::Failure(f) = &outcome {
                tracing::warn!(
                    session_id = %session_id,
                    task_id = %task_id,
                    index = index,
                    operation = %f.operation,
                    kind = %f.kind,
                    error = %f.message,
                    "Command failed, stopping batch"
                );
                failed = true;
            }
            outcomes.push(outcome);
        }

        let canvas = lease.state().canvas().summary();
        let flattened = if cmd.include_image_data {
            Some(lease.state().canvas().flatten())
        } else {
            None
        };
        drop(lease);

        let image = match flattened {
            Some(Ok(image)) => Some(image),
            None | Some(Err(CanvasError::Empty)) => None,
            Some(Err(e)) => {
                tracing::error!(
                    session_id = %session_id,
                    task_id = %task_id,
                    error = %e,
                    "Failed to flatten canvas for batch result"
                );
                let err = ApplicationError::internal(format!("could not flatten canvas: {}", e));
                self.fail_task(&task_id, TaskFailure::new(err.kind(), err.to_string()));
                if session_created {
                    if let Err(e) = self.session_store.close(&session_id).await {
                        tracing::warn!(session_id = %session_id, error = %e, "Failed to close session");
                    }
                }
                return Err(err);
            }
        };

        if !cmd.include_image_data {
            for outcome in outcomes.iter_mut() {
                if let CommandOutcome::Success(s) = outcome {
                    s.outputs.clear();
                }
            }
        }

        let result = BatchResult {
            session_id,
            task_id,
            session_created,
            success: !failed,
            outcomes,
            canvas,
            image,
        };

        let outcome = match result.first_failure() {
            Some(f) => TaskOutcome::Failed(TaskFailure::new(f.kind, f.message.clone())),
            None => TaskOutcome::Completed(Some(serde_json::json!({
                "session_id": result.session_id,
                "commands": total,
            }))),
        };
        if let Err(e) = self.progress_tracker.finish(&result.task_id, outcome) {
            tracing::warn!(task_id = %result.task_id, error = %e, "Failed to finish task");
        }

        tracing::info!(
            session_id = %result.session_id,
            task_id = %result.task_id,
            success = result.success,
            "Command batch finished"
        );

        Ok(result)
    }

    /// 在一次性画布上执行单条命令（不涉及会话）
    pub async fn execute_transient(
        &self,
        canvas: Canvas,
        command: &Command,
        reporter: &ProgressReporter,
    ) -> Result<(Canvas, CommandSuccess), CommandFailure> {
        let mut state = EditingState::new(canvas);
        match self.run_command(&mut state, 0, command, &[], reporter).await {
            CommandOutcome::Success(success) => {
                let canvas = state.canvas().clone();
                Ok((canvas, success))
            }
            CommandOutcome::Failure(failure) => Err(failure),
            CommandOutcome::NotAttempted { operation } => Err(CommandFailure::new(
                operation,
                ErrorKind::InternalError,
                "command was not attempted",
            )),
        }
    }

    /// 结构校验：空批次、非法的前序引用
    fn validate(cmd: &ExecuteBatchCommand) -> Result<(), ApplicationError> {
        if cmd.commands.is_empty() {
            return Err(ApplicationError::invalid_params("commands must not be empty"));
        }
        for (index, command) in cmd.commands.iter().enumerate() {
            if command.operation.trim().is_empty() {
                return Err(ApplicationError::invalid_params(format!(
                    "command {} has an empty operation",
                    index
                )));
            }
            for input in &command.input_from {
                if input.command >= index {
                    return Err(ApplicationError::invalid_params(format!(
                        "command {} references command {}, which does not precede it",
                        index, input.command
                    )));
                }
            }
        }
        Ok(())
    }

    async fn run_command(
        &self,
        state: &mut EditingState,
        index: usize,
        command: &Command,
        previous: &[CommandOutcome],
        reporter: &ProgressReporter,
    ) -> CommandOutcome {
        let operation = command.operation.as_str();
        let failure = |kind: ErrorKind, message: String| {
            CommandOutcome::Failure(CommandFailure::new(operation, kind, message))
        };

        let Some(transform) = self.registry.get(operation) else {
            return failure(
                ErrorKind::UnknownOperation,
                format!("Unknown operation: {}", operation),
            );
        };

        let images = match resolve_images(index, command, previous) {
            Ok(images) => images,
            Err(message) => return failure(ErrorKind::InvalidParams, message),
        };

        let input = TransformInput {
            canvas: state.canvas(),
            params: &command.params,
            images: &images,
            progress: reporter,
        };

        let applied = AssertUnwindSafe(transform.apply(input)).catch_unwind().await;
        let outcome = match applied {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => return failure(transform_error_kind(&e), transform_error_message(e)),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(operation = %operation, panic = %message, "Transform panicked");
                return failure(ErrorKind::TransformFault, "transform panicked".to_string());
            }
        };

        if let Some(mutation) = outcome.mutation {
            let kind = mutation.kind();
            if let Err(e) = state.apply(operation, mutation) {
                return failure(
                    ErrorKind::TransformFault,
                    format!("could not apply {} result: {}", kind, e),
                );
            }
        } else {
            state.record(operation);
        }

        reporter.report(1.0, TaskStatus::Running, format!("{} done", operation));

        CommandOutcome::Success(CommandSuccess {
            operation: operation.to_string(),
            fields: outcome.fields,
            outputs: outcome.outputs,
        })
    }

    fn fail_task(&self, task_id: &str, failure: TaskFailure) {
        if let Err(e) = self.progress_tracker.finish(task_id, TaskOutcome::Failed(failure)) {
            tracing::warn!(task_id = %task_id, error = %e, "Failed to finish task");
        }
    }
}

/// 解码二进制参数并解析前序输出引用
fn resolve_images(
    index: usize,
    command: &Command,
    previous: &[CommandOutcome],
) -> Result<HashMap<String, RgbaImage>, String> {
    let mut images = HashMap::with_capacity(command.binary.len() + command.input_from.len());

    for (name, encoded) in &command.binary {
        let image = codec::decode_image(encoded)
            .map_err(|e| format!("binary parameter `{}`: {}", name, e))?;
        images.insert(name.clone(), image);
    }

    for input in &command.input_from {
        let outputs: &BTreeMap<String, BinaryOutput> = match previous.get(input.command) {
            Some(CommandOutcome::Success(s)) => &s.outputs,
            _ => {
                return Err(format!(
                    "command {} references command {}, which has no outputs",
                    index, input.command
                ))
            }
        };
        let image = outputs.get(&input.output).ok_or_else(|| {
            format!(
                "command {} produced no output named `{}`",
                input.command, input.output
            )
        })?;
        images.insert(input.param_name().to_string(), image.image.clone());
    }

    Ok(images)
}

fn transform_error_kind(err: &TransformError) -> ErrorKind {
    match err {
        TransformError::InvalidParams(_) => ErrorKind::InvalidParams,
        TransformError::Cancelled | TransformError::Backend(_) | TransformError::Fault(_) => {
            ErrorKind::TransformFault
        }
    }
}

fn transform_error_message(err: TransformError) -> String {
    match err {
        TransformError::Cancelled => "cancelled".to_string(),
        other => other.to_string(),
    }
}

pub(crate) fn decode_canvas(encoded: &str) -> Result<Canvas, ApplicationError> {
    let image = codec::decode_image(encoded)
        .map_err(|e| ApplicationError::invalid_params(format!("image_data: {}", e)))?;
    Canvas::from_image(image).map_err(|e| ApplicationError::invalid_params(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::application::ports::{
        Transform, TransformOutcome, TransformParams,
    };
    use crate::domain::canvas::Color;
    use crate::domain::session::CanvasMutation;
    use crate::infrastructure::adapters::transforms::standard_registry;
    use crate::infrastructure::adapters::model::LocalModelBackend;
    use crate::infrastructure::memory::{InMemoryProgressTracker, InMemorySessionStore};

    struct Fixture {
        store: Arc<InMemorySessionStore>,
        tracker: Arc<InMemoryProgressTracker>,
        executor: Arc<CommandExecutor>,
    }

    fn fixture_with(registry: TransformRegistry, policy: BusyPolicy) -> Fixture {
        let store = InMemorySessionStore::new().arc();
        let tracker = InMemoryProgressTracker::new().arc();
        let executor = Arc::new(CommandExecutor::new(
            store.clone(),
            tracker.clone(),
            Arc::new(registry),
            policy,
        ));
        Fixture {
            store,
            tracker,
            executor,
        }
    }

    fn fixture() -> Fixture {
        let registry =
            standard_registry(Arc::new(LocalModelBackend::new()), Vec::new()).unwrap();
        fixture_with(registry, BusyPolicy::Wait)
    }

    fn command(value: serde_json::Value) -> Command {
        serde_json::from_value(value).unwrap()
    }

    fn batch(session_id: Option<String>, commands: Vec<serde_json::Value>) -> ExecuteBatchCommand {
        ExecuteBatchCommand {
            session_id,
            commands: commands.into_iter().map(command).collect(),
            ..Default::default()
        }
    }

    async fn session_with_canvas(f: &Fixture, w: u32, h: u32) -> String {
        f.store
            .create(EditingState::new(Canvas::new(w, h, Color::WHITE).unwrap()))
    }

    #[tokio::test]
    async fn test_blur_then_invalid_blur() {
        let f = fixture();
        let id = session_with_canvas(&f, 100, 100).await;

        let result = f
            .executor
            .execute(batch(
                Some(id.clone()),
                vec![json!({"operation": "apply_blur", "params": {"radius": 3}})],
            ))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.outcomes[0].is_success());
        assert_eq!(result.canvas.width, 100);
        assert!(result.image.is_none());

        let before = f.store.acquire(&id, BusyPolicy::Wait).await.unwrap().state().history().len();

        let result = f
            .executor
            .execute(batch(
                Some(id.clone()),
                vec![json!({"operation": "apply_blur", "params": {"radius": -1}})],
            ))
            .await
            .unwrap();
        assert!(!result.success);
        match &result.outcomes[0] {
            CommandOutcome::Failure(fail) => assert_eq!(fail.kind, ErrorKind::InvalidParams),
            other => panic!("unexpected outcome: {:?}", other),
        }

        let lease = f.store.acquire(&id, BusyPolicy::Wait).await.unwrap();
        assert_eq!(lease.state().history().len(), before);
        assert_eq!(lease.state().canvas().dimensions(), (100, 100));
    }

    #[tokio::test]
    async fn test_failure_stops_batch() {
        let f = fixture();
        let id = session_with_canvas(&f, 10, 10).await;

        let result = f
            .executor
            .execute(batch(
                Some(id.clone()),
                vec![
                    json!({"operation": "resize_image", "params": {"width": 20, "height": 20}}),
                    json!({"operation": "no_such_operation"}),
                    json!({"operation": "resize_image", "params": {"width": 40, "height": 40}}),
                ],
            ))
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.outcomes[0].is_success());
        assert!(matches!(
            &result.outcomes[1],
            CommandOutcome::Failure(f) if f.kind == ErrorKind::UnknownOperation
        ));
        assert!(matches!(&result.outcomes[2], CommandOutcome::NotAttempted { .. }));

        // 第一条命令的效果保留
        assert_eq!((result.canvas.width, result.canvas.height), (20, 20));

        let snap = f.tracker.read(&result.task_id).unwrap();
        assert_eq!(snap.status, TaskStatus::Error);
        assert_eq!(snap.error.unwrap().kind, ErrorKind::UnknownOperation);
    }

    #[tokio::test]
    async fn test_new_session_from_batch() {
        let f = fixture();
        let result = f
            .executor
            .execute(ExecuteBatchCommand {
                commands: vec![command(
                    json!({"operation": "create_image", "params": {"width": 8, "height": 6}}),
                )],
                include_image_data: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.session_created);
        assert!(f.store.exists(&result.session_id));
        assert_eq!(result.image.unwrap().dimensions(), (8, 6));
        assert_eq!(
            f.tracker.read(&result.task_id).unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_validation_before_mutation() {
        let f = fixture();

        let err = f.executor.execute(batch(None, vec![])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);

        let err = f
            .executor
            .execute(batch(
                None,
                vec![json!({"operation": "apply_blur", "input_from": [{"command": 0, "output": "x"}]})],
            ))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParams);
        assert!(f.store.is_empty());
        assert!(f.tracker.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let f = fixture();
        let err = f
            .executor
            .execute(batch(Some("missing".into()), vec![json!({"operation": "apply_blur"})]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_input_from_previous_output() {
        let f = fixture();
        let id = session_with_canvas(&f, 6, 6).await;

        let result = f
            .executor
            .execute(ExecuteBatchCommand {
                session_id: Some(id),
                commands: vec![
                    command(json!({"operation": "export_image", "params": {"format": "png"}})),
                    command(json!({
                        "operation": "create_layer",
                        "params": {"name": "copy"},
                        "input_from": [{"command": 0, "output": "image", "param": "image"}]
                    })),
                ],
                include_image_data: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(result.success, "{:?}", result.outcomes);
        assert_eq!(result.canvas.layers.len(), 2);
        assert_eq!(result.canvas.layers[1].name, "copy");
    }

    #[tokio::test]
    async fn test_outputs_gated_by_flag() {
        let f = fixture();
        let id = session_with_canvas(&f, 4, 4).await;

        let result = f
            .executor
            .execute(batch(Some(id), vec![json!({"operation": "export_image"})]))
            .await
            .unwrap();
        match &result.outcomes[0] {
            CommandOutcome::Success(s) => {
                assert!(s.outputs.is_empty());
                assert_eq!(s.fields["format"], "png");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    /// 记录并发执行数量的变换
    struct Overlap {
        active: Arc<AtomicUsize>,
        max_seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transform for Overlap {
        fn name(&self) -> &'static str {
            "overlap"
        }

        async fn apply(&self, _input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(15)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(TransformOutcome::new())
        }
    }

    struct Panics;

    #[async_trait]
    impl Transform for Panics {
        fn name(&self) -> &'static str {
            "panics"
        }

        async fn apply(&self, _input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
            panic!("transform bug");
        }
    }

    struct Replaces;

    #[async_trait]
    impl Transform for Replaces {
        fn name(&self) -> &'static str {
            "replaces"
        }

        async fn apply(&self, input: TransformInput<'_>) -> Result<TransformOutcome, TransformError> {
            input.progress.checkpoint()?;
            let canvas = Canvas::new(3, 3, Color::BLACK)?;
            Ok(TransformOutcome::mutate(CanvasMutation::Replace(canvas)))
        }
    }

    fn instrumented_fixture(policy: BusyPolicy) -> (Fixture, Arc<AtomicUsize>) {
        let max_seen = Arc::new(AtomicUsize::new(0));
        let registry = TransformRegistry::builder()
            .register(Overlap {
                active: Arc::new(AtomicUsize::new(0)),
                max_seen: max_seen.clone(),
            })
            .register(Panics)
            .register(Replaces)
            .build()
            .unwrap();
        (fixture_with(registry, policy), max_seen)
    }

    #[tokio::test]
    async fn test_batches_on_same_session_are_serialized() {
        let (f, max_seen) = instrumented_fixture(BusyPolicy::Wait);
        let id = session_with_canvas(&f, 2, 2).await;

        let mut handles = Vec::new();
        for _ in 0..4 {
            let executor = f.executor.clone();
            let cmd = batch(
                Some(id.clone()),
                vec![json!({"operation": "overlap"}), json!({"operation": "overlap"})],
            );
            handles.push(tokio::spawn(async move { executor.execute(cmd).await }));
        }
        for h in handles {
            assert!(h.await.unwrap().unwrap().success);
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_sessions_run_concurrently() {
        let (f, max_seen) = instrumented_fixture(BusyPolicy::Wait);
        let a = session_with_canvas(&f, 2, 2).await;
        let b = session_with_canvas(&f, 2, 2).await;

        let (ra, rb) = tokio::join!(
            f.executor.execute(batch(Some(a), vec![json!({"operation": "overlap"})])),
            f.executor.execute(batch(Some(b), vec![json!({"operation": "overlap"})])),
        );
        assert!(ra.unwrap().success && rb.unwrap().success);
        assert_eq!(max_seen.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fail_fast_policy() {
        let (f, _) = instrumented_fixture(BusyPolicy::FailFast);
        let id = session_with_canvas(&f, 2, 2).await;

        let _held = f.store.acquire(&id, BusyPolicy::Wait).await.unwrap();
        let err = f
            .executor
            .execute(batch(Some(id), vec![json!({"operation": "overlap"})]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SessionBusy);
    }

    #[tokio::test]
    async fn test_panic_becomes_transform_fault() {
        let (f, _) = instrumented_fixture(BusyPolicy::Wait);
        let id = session_with_canvas(&f, 2, 2).await;

        let result = f
            .executor
            .execute(batch(
                Some(id.clone()),
                vec![json!({"operation": "panics"}), json!({"operation": "replaces"})],
            ))
            .await
            .unwrap();
        assert!(matches!(
            &result.outcomes[0],
            CommandOutcome::Failure(f) if f.kind == ErrorKind::TransformFault
        ));
        assert!(matches!(&result.outcomes[1], CommandOutcome::NotAttempted { .. }));

        // 会话仍可用
        let lease = f.store.acquire(&id, BusyPolicy::Wait).await.unwrap();
        assert_eq!(lease.state().canvas().dimensions(), (2, 2));
    }

    #[tokio::test]
    async fn test_close_during_batch_waits() {
        let (f, _) = instrumented_fixture(BusyPolicy::Wait);
        let id = session_with_canvas(&f, 2, 2).await;

        let running = {
            let executor = f.executor.clone();
            let cmd = batch(
                Some(id.clone()),
                vec![json!({"operation": "overlap"}), json!({"operation": "replaces"})],
            );
            tokio::spawn(async move { executor.execute(cmd).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        f.store.close(&id).await.unwrap();
        let result = running.await.unwrap().unwrap();
        assert!(result.success);

        let err = f
            .executor
            .execute(batch(Some(id), vec![json!({"operation": "overlap"})]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_include_image_on_empty_canvas() {
        let (f, _) = instrumented_fixture(BusyPolicy::Wait);
        let id = f.store.create(EditingState::new(Canvas::empty()));

        let result = f
            .executor
            .execute(ExecuteBatchCommand {
                session_id: Some(id),
                commands: vec![command(json!({"operation": "overlap"}))],
                include_image_data: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.image.is_none());
        assert_eq!(result.canvas.width, 0);
        assert_eq!(
            f.tracker.read(&result.task_id).unwrap().status,
            TaskStatus::Completed
        );
    }

    /// 一次 N 条命令的批次与 N 次单命令批次结果一致
    #[tokio::test]
    async fn test_batch_equals_sequence_of_single_batches() {
        let f = fixture();
        let gradient = || {
            let img = RgbaImage::from_fn(16, 12, |x, y| {
                image::Rgba([(x * 16) as u8, (y * 20) as u8, ((x + y) * 7) as u8, 255])
            });
            EditingState::new(Canvas::from_image(img).unwrap())
        };
        let a = f.store.create(gradient());
        let b = f.store.create(gradient());

        let commands = vec![
            json!({"operation": "apply_blur", "params": {"radius": 2}}),
            json!({"operation": "create_layer", "params": {
                "name": "tint", "fill": "#ff0000", "opacity": 40, "blend_mode": "multiply"
            }}),
            json!({"operation": "adjust_brightness_contrast", "params": {
                "brightness": 10, "contrast": 20, "layer": 0
            }}),
            json!({"operation": "set_layer_properties", "params": {"layer": 1, "opacity": 60}}),
            json!({"operation": "desaturate", "params": {"layer": 0, "mode": "average"}}),
            json!({"operation": "resize_image", "params": {"width": 12, "height": 10}}),
        ];

        let whole = f
            .executor
            .execute(batch(Some(a.clone()), commands.clone()))
            .await
            .unwrap();
        assert!(whole.success, "{:?}", whole.outcomes);

        for c in commands {
            let single = f
                .executor
                .execute(batch(Some(b.clone()), vec![c]))
                .await
                .unwrap();
            assert!(single.success, "{:?}", single.outcomes);
        }

        let lease_a = f.store.acquire(&a, BusyPolicy::Wait).await.unwrap();
        let lease_b = f.store.acquire(&b, BusyPolicy::Wait).await.unwrap();
        let (canvas_a, canvas_b) = (lease_a.state().canvas(), lease_b.state().canvas());

        assert_eq!(canvas_a.dimensions(), (12, 10));
        assert_eq!(
            serde_json::to_value(canvas_a.summary()).unwrap(),
            serde_json::to_value(canvas_b.summary()).unwrap()
        );
        assert_eq!(
            canvas_a.flatten().unwrap().into_raw(),
            canvas_b.flatten().unwrap().into_raw()
        );
    }

    #[tokio::test]
    async fn test_transient_execution() {
        let f = fixture();
        let reporter = ProgressReporter::detached();
        let cmd = Command::new("desaturate", TransformParams::default());
        let canvas = Canvas::new(2, 2, Color::rgba(200, 10, 10, 255)).unwrap();

        let (canvas, success) = f
            .executor
            .execute_transient(canvas, &cmd, &reporter)
            .await
            .unwrap();
        assert_eq!(success.operation, "desaturate");
        let px = canvas.flatten().unwrap().get_pixel(0, 0).0;
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }
}
