//! In-Memory Session Store Implementation

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::new_token;
use crate::application::ports::{
    BusyPolicy, SessionActivity, SessionCell, SessionError, SessionInfo, SessionLease,
    SessionStorePort,
};
use crate::domain::session::EditingState;

struct SessionSlot {
    activity: Arc<SessionActivity>,
    cell: Arc<Mutex<SessionCell>>,
}

/// 内存会话存储
///
/// 每个会话一把 tokio 互斥锁（FIFO 公平），map 只在查找时短暂加锁。
pub struct InMemorySessionStore {
    sessions: DashMap<String, Arc<SessionSlot>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn slot(&self, session_id: &str) -> Result<Arc<SessionSlot>, SessionError> {
        self.sessions
            .get(session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// 关闭路径：标记关闭并释放图像缓冲区
    fn release(session_id: &str, cell: &mut SessionCell, reason: &str) {
        cell.closed = true;
        cell.state.release();
        tracing::info!(session_id = %session_id, reason = reason, "Session closed");
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStorePort for InMemorySessionStore {
    fn create(&self, state: EditingState) -> String {
        let session_id = new_token();
        let slot = SessionSlot {
            activity: Arc::new(SessionActivity::new()),
            cell: Arc::new(Mutex::new(SessionCell::new(state))),
        };
        self.sessions.insert(session_id.clone(), Arc::new(slot));
        tracing::info!(session_id = %session_id, "Session created");
        session_id
    }

    fn get(&self, session_id: &str) -> Result<SessionInfo, SessionError> {
        let slot = self.slot(session_id)?;
        Ok(SessionInfo {
            session_id: session_id.to_string(),
            created_at: slot.activity.created_at(),
            last_access: slot.activity.last_access(),
            idle_secs: slot.activity.idle_for().as_secs(),
        })
    }

    fn exists(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    fn touch(&self, session_id: &str) -> Result<(), SessionError> {
        self.slot(session_id)?.activity.touch();
        Ok(())
    }

    async fn acquire(&self, session_id: &str, policy: BusyPolicy) -> Result<SessionLease, SessionError> {
        let slot = self.slot(session_id)?;

        let guard = match policy {
            BusyPolicy::Wait => Arc::clone(&slot.cell).lock_owned().await,
            BusyPolicy::FailFast => Arc::clone(&slot.cell)
                .try_lock_owned()
                .map_err(|_| SessionError::Busy(session_id.to_string()))?,
        };

        // 等待期间会话可能已被关闭
        if guard.closed {
            return Err(SessionError::NotFound(session_id.to_string()));
        }

        slot.activity.touch();
        tracing::debug!(session_id = %session_id, "Session acquired");
        Ok(SessionLease::new(session_id, Arc::clone(&slot.activity), guard))
    }

    async fn close(&self, session_id: &str) -> Result<(), SessionError> {
        // 先从表中移除，新请求立即看到 NotFound
        let (_, slot) = self
            .sessions
            .remove(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        // 已排队的请求先执行，然后才轮到关闭
        let mut cell = slot.cell.lock().await;
        Self::release(session_id, &mut cell, "requested");
        Ok(())
    }

    fn close_if_idle(&self, session_id: &str, idle: Duration) -> bool {
        let Ok(slot) = self.slot(session_id) else {
            return false;
        };

        let Ok(mut cell) = slot.cell.try_lock() else {
            tracing::debug!(session_id = %session_id, "Session busy, skipping idle sweep");
            return false;
        };
        if cell.closed || slot.activity.idle_for() < idle {
            return false;
        }

        self.sessions
            .remove_if(session_id, |_, current| Arc::ptr_eq(current, &slot));
        Self::release(session_id, &mut cell, "idle");
        true
    }

    fn idle_sessions(&self, idle: Duration) -> Vec<String> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().activity.idle_for() >= idle)
            .map(|entry| entry.key().clone())
            .collect()
    }

    async fn close_all(&self) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut closed = 0;
        for id in ids {
            if self.close(&id).await.is_ok() {
                closed += 1;
            }
        }
        closed
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
