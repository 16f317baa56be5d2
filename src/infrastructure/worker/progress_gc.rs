//! Progress GC - 终态任务回收
//!
//! 终态任务在保留窗口内仍可查询，过期后由此 worker 逐出。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ProgressTrackerPort;

/// GC 配置
#[derive(Debug, Clone)]
pub struct ProgressGcConfig {
    /// 终态任务保留时长
    pub retention: Duration,
    /// 回收间隔
    pub interval: Duration,
}

impl Default for ProgressGcConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(120),
            interval: Duration::from_secs(30),
        }
    }
}

pub struct ProgressGc {
    config: ProgressGcConfig,
    progress_tracker: Arc<dyn ProgressTrackerPort>,
}

impl ProgressGc {
    pub fn new(config: ProgressGcConfig, progress_tracker: Arc<dyn ProgressTrackerPort>) -> Self {
        Self {
            config,
            progress_tracker,
        }
    }

    /// 执行一轮回收，返回逐出的任务数
    pub fn collect_once(&self) -> usize {
        self.progress_tracker
            .evict_expired(self.config.retention)
            .len()
    }

    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            retention_secs = self.config.retention.as_secs(),
            interval_secs = self.config.interval.as_secs(),
            "ProgressGc started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = self.collect_once();
                    if evicted > 0 {
                        tracing::debug!(
                            evicted,
                            remaining = self.progress_tracker.len(),
                            "Progress GC pass"
                        );
                    }
                }
            }
        }

        tracing::info!("ProgressGc stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::TaskOutcome;
    use crate::infrastructure::memory::InMemoryProgressTracker;

    fn gc(tracker: Arc<InMemoryProgressTracker>, retention: Duration) -> ProgressGc {
        ProgressGc::new(
            ProgressGcConfig {
                retention,
                interval: Duration::from_millis(10),
            },
            tracker,
        )
    }

    #[test]
    fn test_only_terminal_tasks_are_collected() {
        let tracker = InMemoryProgressTracker::new().arc();
        let running = tracker.begin(None).unwrap();
        let done = tracker.begin(None).unwrap();
        tracker.finish(&done, TaskOutcome::Completed(None)).unwrap();

        assert_eq!(gc(tracker.clone(), Duration::from_secs(60)).collect_once(), 0);
        assert!(tracker.read(&done).is_ok());

        assert_eq!(gc(tracker.clone(), Duration::ZERO).collect_once(), 1);
        assert!(tracker.read(&done).is_err());
        assert!(tracker.read(&running).is_ok());
    }

    #[tokio::test]
    async fn test_run_collects_and_stops() {
        let tracker = InMemoryProgressTracker::new().arc();
        let done = tracker.begin(None).unwrap();
        tracker.finish(&done, TaskOutcome::Completed(None)).unwrap();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(gc(tracker.clone(), Duration::ZERO).run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(tracker.is_empty());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
