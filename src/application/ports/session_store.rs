//! Session Store Port - 编辑会话管理
//!
//! 定义会话存储的抽象接口，具体实现在 infrastructure/memory 层
//!
//! 并发约束：
//! - 同一会话同一时刻只有一个持有者（`SessionLease`）
//! - 关闭会话会等待当前持有者释放
//! - 释放后的会话对所有后续请求表现为 NotFound

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;

use crate::domain::session::EditingState;

/// Session Store 错误
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session is busy: {0}")]
    Busy(String),
}

/// 会话被占用时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusyPolicy {
    /// 排队等待（FIFO）
    #[default]
    Wait,
    /// 立即返回 SessionBusy
    FailFast,
}

/// 会话锁内的状态
#[derive(Debug, Default)]
pub struct SessionCell {
    pub closed: bool,
    pub state: EditingState,
}

impl SessionCell {
    pub fn new(state: EditingState) -> Self {
        Self {
            closed: false,
            state,
        }
    }
}

/// 会话活跃度（锁外可读）
#[derive(Debug)]
pub struct SessionActivity {
    created_at: DateTime<Utc>,
    last: Mutex<(Instant, DateTime<Utc>)>,
}

impl SessionActivity {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            last: Mutex::new((Instant::now(), now)),
        }
    }

    pub fn touch(&self) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        *last = (Instant::now(), Utc::now());
    }

    pub fn idle_for(&self) -> Duration {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).0.elapsed()
    }

    pub fn last_access(&self) -> DateTime<Utc> {
        self.last.lock().unwrap_or_else(|e| e.into_inner()).1
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Default for SessionActivity {
    fn default() -> Self {
        Self::new()
    }
}

/// 会话的独占租约
///
/// 持有期间其他请求无法访问该会话；释放时刷新活跃时间。
pub struct SessionLease {
    session_id: String,
    activity: Arc<SessionActivity>,
    guard: OwnedMutexGuard<SessionCell>,
}

impl SessionLease {
    pub fn new(
        session_id: impl Into<String>,
        activity: Arc<SessionActivity>,
        guard: OwnedMutexGuard<SessionCell>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            activity,
            guard,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> &EditingState {
        &self.guard.state
    }

    pub fn state_mut(&mut self) -> &mut EditingState {
        &mut self.guard.state
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        // 先刷新活跃时间，guard 随后释放
        self.activity.touch();
    }
}

impl std::fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLease")
            .field("session_id", &self.session_id)
            .finish_non_exhaustive()
    }
}

/// 会话信息
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    pub idle_secs: u64,
}

/// Session Store Port
///
/// 管理编辑会话的生命周期，所有状态存储在内存中
#[async_trait]
pub trait SessionStorePort: Send + Sync {
    /// 创建会话，返回不可猜测的会话 ID
    fn create(&self, state: EditingState) -> String;

    /// 获取会话信息（不加锁）
    fn get(&self, session_id: &str) -> Result<SessionInfo, SessionError>;

    /// 检查会话是否存在
    fn exists(&self, session_id: &str) -> bool;

    /// 刷新最后访问时间（不加锁）
    fn touch(&self, session_id: &str) -> Result<(), SessionError>;

    /// 获取会话独占租约
    async fn acquire(&self, session_id: &str, policy: BusyPolicy) -> Result<SessionLease, SessionError>;

    /// 关闭会话，等待当前持有者释放后清理
    async fn close(&self, session_id: &str) -> Result<(), SessionError>;

    /// 若会话空闲超过 `idle` 且未被占用则关闭，返回是否关闭
    fn close_if_idle(&self, session_id: &str, idle: Duration) -> bool;

    /// 列出空闲超过 `idle` 的会话
    fn idle_sessions(&self, idle: Duration) -> Vec<String>;

    /// 关闭所有会话（停机时调用）
    async fn close_all(&self) -> usize;

    /// 当前会话数
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
