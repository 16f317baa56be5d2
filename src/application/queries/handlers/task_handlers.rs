//! Task Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::ports::{ProgressTrackerPort, TaskSnapshot};
use crate::application::queries::GetProgressQuery;

/// Get Progress Handler - 读取任务快照
pub struct GetProgressHandler {
    progress_tracker: Arc<dyn ProgressTrackerPort>,
}

impl GetProgressHandler {
    pub fn new(progress_tracker: Arc<dyn ProgressTrackerPort>) -> Self {
        Self { progress_tracker }
    }

    pub async fn handle(&self, query: GetProgressQuery) -> Result<TaskSnapshot, ApplicationError> {
        Ok(self.progress_tracker.read(&query.task_id)?)
    }
}
