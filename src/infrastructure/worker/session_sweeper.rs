//! Session Sweeper - 空闲会话回收
//!
//! 周期性关闭空闲超时的会话；正在执行批处理的会话（锁被占用）跳过，下一轮再检查。

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::SessionStorePort;

/// Sweeper 配置
#[derive(Debug, Clone)]
pub struct SessionSweeperConfig {
    /// 空闲超时
    pub idle_timeout: Duration,
    /// 扫描间隔
    pub interval: Duration,
}

impl Default for SessionSweeperConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(1800),
            interval: Duration::from_secs(60),
        }
    }
}

pub struct SessionSweeper {
    config: SessionSweeperConfig,
    session_store: Arc<dyn SessionStorePort>,
}

impl SessionSweeper {
    pub fn new(config: SessionSweeperConfig, session_store: Arc<dyn SessionStorePort>) -> Self {
        Self {
            config,
            session_store,
        }
    }

    /// 执行一轮扫描，返回关闭的会话数
    pub fn sweep_once(&self) -> usize {
        let candidates = self.session_store.idle_sessions(self.config.idle_timeout);
        let closed = candidates
            .iter()
            .filter(|id| self.session_store.close_if_idle(id, self.config.idle_timeout))
            .count();

        if closed > 0 {
            tracing::info!(
                closed,
                remaining = self.session_store.len(),
                "Closed idle sessions"
            );
        }
        closed
    }

    /// 运行直到 shutdown 被取消
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(
            idle_timeout_secs = self.config.idle_timeout.as_secs(),
            interval_secs = self.config.interval.as_secs(),
            "SessionSweeper started"
        );

        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // 第一次 tick 立即完成，跳过
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep_once();
                }
            }
        }

        tracing::info!("SessionSweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::BusyPolicy;
    use crate::domain::canvas::{Canvas, Color};
    use crate::domain::session::EditingState;
    use crate::infrastructure::memory::InMemorySessionStore;

    fn state() -> EditingState {
        EditingState::new(Canvas::new(2, 2, Color::WHITE).unwrap())
    }

    fn sweeper(store: Arc<InMemorySessionStore>, idle: Duration) -> SessionSweeper {
        SessionSweeper::new(
            SessionSweeperConfig {
                idle_timeout: idle,
                interval: Duration::from_millis(10),
            },
            store,
        )
    }

    #[tokio::test]
    async fn test_sweep_respects_idle_threshold() {
        let store = InMemorySessionStore::new().arc();
        let id = store.create(state());

        assert_eq!(sweeper(store.clone(), Duration::from_secs(3600)).sweep_once(), 0);
        assert!(store.exists(&id));

        assert_eq!(sweeper(store.clone(), Duration::ZERO).sweep_once(), 1);
        assert!(!store.exists(&id));
    }

    #[tokio::test]
    async fn test_sweep_skips_in_flight_session() {
        let store = InMemorySessionStore::new().arc();
        let busy = store.create(state());
        let idle = store.create(state());

        let lease = store.acquire(&busy, BusyPolicy::Wait).await.unwrap();
        assert_eq!(sweeper(store.clone(), Duration::ZERO).sweep_once(), 1);
        assert!(store.exists(&busy));
        assert!(!store.exists(&idle));

        drop(lease);
        assert_eq!(sweeper(store.clone(), Duration::ZERO).sweep_once(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let store = InMemorySessionStore::new().arc();
        let id = store.create(state());
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(sweeper(store.clone(), Duration::ZERO).run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!store.exists(&id));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
