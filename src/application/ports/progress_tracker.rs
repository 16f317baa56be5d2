//! Progress Tracker Port - 任务进度
//!
//! 定义进度跟踪的抽象接口，具体实现在 infrastructure/memory 层
//!
//! 状态机：initializing → loading_resources → running → completed | error
//! - 状态只能前进
//! - 进度单调不减
//! - 终态之后快照不可变

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::TransformError;
use crate::application::error::ErrorKind;

/// Progress Tracker 错误
#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task already exists: {0}")]
    AlreadyExists(String),

    #[error("Task {0} is already finished")]
    Finished(String),

    #[error("Invalid state transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Progress of task {task_id} cannot decrease ({current} -> {requested})")]
    Regression {
        task_id: String,
        current: f32,
        requested: f32,
    },

    #[error("Invalid progress value: {0}")]
    OutOfRange(f32),
}

/// 任务状态（声明顺序即推进顺序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Initializing,
    LoadingResources,
    Running,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Initializing => "initializing",
            TaskStatus::LoadingResources => "loading_resources",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Error)
    }

    /// 非终态状态之间只能前进；终态只能由 finish 写入
    pub fn can_advance_to(&self, next: TaskStatus) -> bool {
        !self.is_terminal() && !next.is_terminal() && next >= *self
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务失败信息
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::TransformFault, "cancelled")
    }
}

/// 任务终态
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Completed(Option<serde_json::Value>),
    Failed(TaskFailure),
}

/// 任务快照
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub progress: f32,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskSnapshot {
    pub fn new(task_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            progress: 0.0,
            status: TaskStatus::Initializing,
            detail: None,
            error: None,
            result: None,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Progress Tracker Port
pub trait ProgressTrackerPort: Send + Sync {
    /// 创建任务；`task_id` 为空时生成新 ID，重复 ID 返回 AlreadyExists
    fn begin(&self, task_id: Option<String>) -> Result<String, ProgressError>;

    /// 推进进度与状态
    fn update(
        &self,
        task_id: &str,
        progress: f32,
        status: TaskStatus,
        detail: Option<String>,
    ) -> Result<TaskSnapshot, ProgressError>;

    /// 写入终态
    fn finish(&self, task_id: &str, outcome: TaskOutcome) -> Result<TaskSnapshot, ProgressError>;

    /// 读取快照
    fn read(&self, task_id: &str) -> Result<TaskSnapshot, ProgressError>;

    /// 订阅快照变化
    fn subscribe(&self, task_id: &str) -> Result<watch::Receiver<TaskSnapshot>, ProgressError>;

    /// 请求取消；任务已结束时返回 Ok(false)
    fn cancel(&self, task_id: &str) -> Result<bool, ProgressError>;

    /// 任务的取消令牌
    fn cancellation_token(&self, task_id: &str) -> Result<CancellationToken, ProgressError>;

    /// 清理结束超过 `retention` 的任务，返回被清理的 ID
    fn evict_expired(&self, retention: Duration) -> Vec<String>;

    /// 当前任务数
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 进度上报器
///
/// 交给变换使用：把局部进度 [0, 1] 映射到任务中的区间，
/// 并且只向前推进，不会触发 Regression。
#[derive(Clone)]
pub struct ProgressReporter {
    tracker: Option<Arc<dyn ProgressTrackerPort>>,
    task_id: Option<String>,
    start: f32,
    width: f32,
    token: CancellationToken,
}

impl ProgressReporter {
    pub fn new(
        tracker: Arc<dyn ProgressTrackerPort>,
        task_id: impl Into<String>,
        token: CancellationToken,
    ) -> Self {
        Self {
            tracker: Some(tracker),
            task_id: Some(task_id.into()),
            start: 0.0,
            width: 1.0,
            token,
        }
    }

    /// 不关联任务的上报器
    pub fn detached() -> Self {
        Self {
            tracker: None,
            task_id: None,
            start: 0.0,
            width: 1.0,
            token: CancellationToken::new(),
        }
    }

    /// 子区间上报器，`from`/`to` 为当前区间内的比例
    pub fn scoped(&self, from: f32, to: f32) -> Self {
        let from = from.clamp(0.0, 1.0);
        let to = to.clamp(from, 1.0);
        Self {
            tracker: self.tracker.clone(),
            task_id: self.task_id.clone(),
            start: self.start + from * self.width,
            width: (to - from) * self.width,
            token: self.token.clone(),
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    pub fn report(&self, fraction: f32, status: TaskStatus, detail: impl Into<String>) {
        let (Some(tracker), Some(task_id)) = (&self.tracker, &self.task_id) else {
            return;
        };
        let current = match tracker.read(task_id) {
            Ok(snapshot) if !snapshot.is_terminal() => snapshot,
            _ => return,
        };

        let mapped = (self.start + fraction.clamp(0.0, 1.0) * self.width).clamp(0.0, 1.0);
        let progress = mapped.max(current.progress);
        let status = status.max(current.status);

        if let Err(e) = tracker.update(task_id, progress, status, Some(detail.into())) {
            tracing::debug!(task_id = %task_id, error = %e, "Progress update skipped");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 取消检查点
    pub fn checkpoint(&self) -> Result<(), TransformError> {
        if self.token.is_cancelled() {
            Err(TransformError::Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("task_id", &self.task_id)
            .field("start", &self.start)
            .field("width", &self.width)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_order() {
        assert!(TaskStatus::Initializing.can_advance_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_advance_to(TaskStatus::Running));
        assert!(!TaskStatus::Running.can_advance_to(TaskStatus::LoadingResources));
        assert!(!TaskStatus::Running.can_advance_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_advance_to(TaskStatus::Completed));
        assert!(TaskStatus::Error.is_terminal());
    }

    #[test]
    fn test_scoped_reporter_span() {
        let root = ProgressReporter::detached();
        let second_of_four = root.scoped(0.25, 0.5);
        assert!((second_of_four.start - 0.25).abs() < f32::EPSILON);
        assert!((second_of_four.width - 0.25).abs() < f32::EPSILON);

        let nested = second_of_four.scoped(0.5, 1.0);
        assert!((nested.start - 0.375).abs() < 1e-6);
        assert!((nested.width - 0.125).abs() < 1e-6);
    }

    #[test]
    fn test_detached_checkpoint() {
        let reporter = ProgressReporter::detached();
        reporter.report(0.5, TaskStatus::Running, "noop");
        assert!(reporter.checkpoint().is_ok());
        reporter.token().cancel();
        assert!(matches!(reporter.checkpoint(), Err(TransformError::Cancelled)));
    }
}
