//! Application State
//!
//! HTTP 层共享状态：RPC 分发器、进度追踪器（websocket 订阅）与鉴权设置

use std::collections::HashSet;
use std::sync::Arc;

use crate::application::ProgressTrackerPort;
use crate::infrastructure::rpc::RpcDispatcher;

/// API Key 鉴权设置
#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    pub enabled: bool,
    api_keys: HashSet<String>,
}

impl AuthSettings {
    pub fn new(enabled: bool, api_keys: impl IntoIterator<Item = String>) -> Self {
        Self {
            enabled,
            api_keys: api_keys.into_iter().collect(),
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn accepts(&self, key: &str) -> bool {
        self.api_keys.contains(key)
    }
}

/// 应用状态
pub struct AppState {
    pub dispatcher: Arc<RpcDispatcher>,
    pub progress_tracker: Arc<dyn ProgressTrackerPort>,
    pub auth: AuthSettings,
}

impl AppState {
    pub fn new(dispatcher: Arc<RpcDispatcher>, auth: AuthSettings) -> Self {
        let progress_tracker = dispatcher.services().progress_tracker.clone();
        Self {
            dispatcher,
            progress_tracker,
            auth,
        }
    }
}
