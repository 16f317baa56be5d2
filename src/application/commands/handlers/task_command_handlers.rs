//! Task Command Handlers

use std::sync::Arc;

use crate::application::commands::task_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::ProgressTrackerPort;

/// Cancel Task Handler
///
/// 只设置取消标记；变换在检查点观察到后以 "cancelled" 结束任务。
pub struct CancelTaskHandler {
    progress_tracker: Arc<dyn ProgressTrackerPort>,
}

impl CancelTaskHandler {
    pub fn new(progress_tracker: Arc<dyn ProgressTrackerPort>) -> Self {
        Self { progress_tracker }
    }

    pub async fn handle(&self, cmd: CancelTaskCommand) -> Result<CancelTaskResponse, ApplicationError> {
        let cancelled = self.progress_tracker.cancel(&cmd.task_id)?;

        tracing::info!(task_id = %cmd.task_id, cancelled = cancelled, "Cancel requested");

        Ok(CancelTaskResponse {
            task_id: cmd.task_id,
            cancelled,
        })
    }
}
