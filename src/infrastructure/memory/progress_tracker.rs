//! In-Memory Progress Tracker Implementation

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::new_token;
use crate::application::ports::{
    ProgressError, ProgressTrackerPort, TaskOutcome, TaskSnapshot, TaskStatus,
};

struct TaskEntry {
    snapshot: TaskSnapshot,
    sender: watch::Sender<TaskSnapshot>,
    token: CancellationToken,
    finished: Option<Instant>,
}

impl TaskEntry {
    fn publish(&mut self) -> TaskSnapshot {
        self.snapshot.updated_at = Utc::now();
        // 没有订阅者时 send_replace 仍会更新值
        self.sender.send_replace(self.snapshot.clone());
        self.snapshot.clone()
    }
}

/// 内存进度跟踪器
pub struct InMemoryProgressTracker {
    /// task_id -> TaskEntry
    tasks: DashMap<String, TaskEntry>,
}

impl InMemoryProgressTracker {
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for InMemoryProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTrackerPort for InMemoryProgressTracker {
    fn begin(&self, task_id: Option<String>) -> Result<String, ProgressError> {
        let task_id = match task_id {
            Some(id) if !id.trim().is_empty() => id,
            _ => new_token(),
        };

        match self.tasks.entry(task_id.clone()) {
            Entry::Occupied(_) => Err(ProgressError::AlreadyExists(task_id)),
            Entry::Vacant(slot) => {
                let snapshot = TaskSnapshot::new(task_id.clone());
                let (sender, _) = watch::channel(snapshot.clone());
                slot.insert(TaskEntry {
                    snapshot,
                    sender,
                    token: CancellationToken::new(),
                    finished: None,
                });
                tracing::debug!(task_id = %task_id, "Task started");
                Ok(task_id)
            }
        }
    }

    fn update(
        &self,
        task_id: &str,
        progress: f32,
        status: TaskStatus,
        detail: Option<String>,
    ) -> Result<TaskSnapshot, ProgressError> {
        if !progress.is_finite() || !(0.0..=1.0).contains(&progress) {
            return Err(ProgressError::OutOfRange(progress));
        }

        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| ProgressError::NotFound(task_id.to_string()))?;

        let current = &entry.snapshot;
        if current.is_terminal() {
            return Err(ProgressError::Finished(task_id.to_string()));
        }
        if !current.status.can_advance_to(status) {
            return Err(ProgressError::InvalidTransition {
                task_id: task_id.to_string(),
                from: current.status,
                to: status,
            });
        }
        if progress < current.progress {
            return Err(ProgressError::Regression {
                task_id: task_id.to_string(),
                current: current.progress,
                requested: progress,
            });
        }

        entry.snapshot.progress = progress;
        entry.snapshot.status = status;
        if detail.is_some() {
            entry.snapshot.detail = detail;
        }
        Ok(entry.publish())
    }

    fn finish(&self, task_id: &str, outcome: TaskOutcome) -> Result<TaskSnapshot, ProgressError> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| ProgressError::NotFound(task_id.to_string()))?;

        if entry.snapshot.is_terminal() {
            return Err(ProgressError::Finished(task_id.to_string()));
        }

        let now = Utc::now();
        entry.snapshot.progress = 1.0;
        entry.snapshot.finished_at = Some(now);
        match outcome {
            TaskOutcome::Completed(result) => {
                entry.snapshot.status = TaskStatus::Completed;
                entry.snapshot.detail = Some("completed".to_string());
                entry.snapshot.result = result;
            }
            TaskOutcome::Failed(failure) => {
                entry.snapshot.status = TaskStatus::Error;
                entry.snapshot.detail = Some(failure.message.clone());
                entry.snapshot.error = Some(failure);
            }
        }
        entry.finished = Some(Instant::now());

        tracing::debug!(
            task_id = %task_id,
            status = %entry.snapshot.status,
            "Task finished"
        );
        Ok(entry.publish())
    }

    fn read(&self, task_id: &str) -> Result<TaskSnapshot, ProgressError> {
        self.tasks
            .get(task_id)
            .map(|e| e.snapshot.clone())
            .ok_or_else(|| ProgressError::NotFound(task_id.to_string()))
    }

    fn subscribe(&self, task_id: &str) -> Result<watch::Receiver<TaskSnapshot>, ProgressError> {
        self.tasks
            .get(task_id)
            .map(|e| e.sender.subscribe())
            .ok_or_else(|| ProgressError::NotFound(task_id.to_string()))
    }

    fn cancel(&self, task_id: &str) -> Result<bool, ProgressError> {
        let mut entry = self
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| ProgressError::NotFound(task_id.to_string()))?;

        if entry.snapshot.is_terminal() {
            return Ok(false);
        }

        entry.token.cancel();
        if !entry.snapshot.cancel_requested {
            entry.snapshot.cancel_requested = true;
            entry.publish();
            tracing::info!(task_id = %task_id, "Task cancellation requested");
        }
        Ok(true)
    }

    fn cancellation_token(&self, task_id: &str) -> Result<CancellationToken, ProgressError> {
        self.tasks
            .get(task_id)
            .map(|e| e.token.clone())
            .ok_or_else(|| ProgressError::NotFound(task_id.to_string()))
    }

    fn evict_expired(&self, retention: Duration) -> Vec<String> {
        let expired: Vec<String> = self
            .tasks
            .iter()
            .filter(|e| e.finished.is_some_and(|at| at.elapsed() >= retention))
            .map(|e| e.key().clone())
            .collect();

        for task_id in &expired {
            self.tasks.remove(task_id);
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "Evicted finished tasks");
        }
        expired
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::error::ErrorKind;
    use crate::application::ports::TaskFailure;

    #[test]
    fn test_task_lifecycle() {
        let tracker = InMemoryProgressTracker::new();

        let id = tracker.begin(None).unwrap();
        let snap = tracker.read(&id).unwrap();
        assert_eq!(snap.status, TaskStatus::Initializing);
        assert_eq!(snap.progress, 0.0);

        tracker
            .update(&id, 0.2, TaskStatus::LoadingResources, Some("loading model".into()))
            .unwrap();
        tracker.update(&id, 0.4, TaskStatus::Running, None).unwrap();
        let snap = tracker.read(&id).unwrap();
        assert_eq!(snap.detail.as_deref(), Some("loading model"));

        let snap = tracker
            .finish(&id, TaskOutcome::Completed(Some(serde_json::json!({"ok": true}))))
            .unwrap();
        assert_eq!(snap.status, TaskStatus::Completed);
        assert_eq!(snap.progress, 1.0);
        assert!(snap.finished_at.is_some());
    }

    #[test]
    fn test_client_task_id_and_duplicates() {
        let tracker = InMemoryProgressTracker::new();
        assert_eq!(tracker.begin(Some("job-1".into())).unwrap(), "job-1");
        assert!(matches!(
            tracker.begin(Some("job-1".into())),
            Err(ProgressError::AlreadyExists(_))
        ));
        // 空字符串视为未指定
        assert_eq!(tracker.begin(Some("  ".into())).unwrap().len(), 32);
    }

    #[test]
    fn test_progress_is_monotonic() {
        let tracker = InMemoryProgressTracker::new();
        let id = tracker.begin(None).unwrap();

        tracker.update(&id, 0.5, TaskStatus::Running, None).unwrap();
        assert!(matches!(
            tracker.update(&id, 0.4, TaskStatus::Running, None),
            Err(ProgressError::Regression { .. })
        ));
        assert!(matches!(
            tracker.update(&id, 0.6, TaskStatus::LoadingResources, None),
            Err(ProgressError::InvalidTransition { .. })
        ));
        assert!(matches!(
            tracker.update(&id, 1.5, TaskStatus::Running, None),
            Err(ProgressError::OutOfRange(_))
        ));
        assert!(matches!(
            tracker.update(&id, 0.9, TaskStatus::Completed, None),
            Err(ProgressError::InvalidTransition { .. })
        ));
        assert_eq!(tracker.read(&id).unwrap().progress, 0.5);
    }

    #[test]
    fn test_terminal_is_immutable() {
        let tracker = InMemoryProgressTracker::new();
        let id = tracker.begin(None).unwrap();
        tracker
            .finish(&id, TaskOutcome::Failed(TaskFailure::new(ErrorKind::TransformFault, "boom")))
            .unwrap();

        assert!(matches!(
            tracker.update(&id, 1.0, TaskStatus::Running, None),
            Err(ProgressError::Finished(_))
        ));
        assert!(matches!(
            tracker.finish(&id, TaskOutcome::Completed(None)),
            Err(ProgressError::Finished(_))
        ));
        let snap = tracker.read(&id).unwrap();
        assert_eq!(snap.status, TaskStatus::Error);
        assert_eq!(snap.error.unwrap().message, "boom");
    }

    #[test]
    fn test_cancel() {
        let tracker = InMemoryProgressTracker::new();
        let id = tracker.begin(None).unwrap();
        let token = tracker.cancellation_token(&id).unwrap();

        assert!(tracker.cancel(&id).unwrap());
        assert!(token.is_cancelled());
        assert!(tracker.read(&id).unwrap().cancel_requested);

        tracker
            .finish(&id, TaskOutcome::Failed(TaskFailure::cancelled()))
            .unwrap();
        assert!(!tracker.cancel(&id).unwrap());
        assert!(matches!(tracker.cancel("nope"), Err(ProgressError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_subscribe_sees_updates() {
        let tracker = InMemoryProgressTracker::new();
        let id = tracker.begin(None).unwrap();
        let mut rx = tracker.subscribe(&id).unwrap();

        tracker.update(&id, 0.3, TaskStatus::Running, None).unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().progress, 0.3);

        tracker.finish(&id, TaskOutcome::Completed(None)).unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_terminal());
    }

    #[test]
    fn test_evict_only_finished() {
        let tracker = InMemoryProgressTracker::new();
        let running = tracker.begin(None).unwrap();
        let done = tracker.begin(None).unwrap();
        tracker.finish(&done, TaskOutcome::Completed(None)).unwrap();

        assert!(tracker.evict_expired(Duration::from_secs(60)).is_empty());
        assert_eq!(tracker.evict_expired(Duration::ZERO), vec![done.clone()]);
        assert!(tracker.read(&running).is_ok());
        assert!(matches!(tracker.read(&done), Err(ProgressError::NotFound(_))));
    }
}
