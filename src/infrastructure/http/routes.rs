//! HTTP Routes
//!
//! API Endpoints:
//! - /jsonrpc                 POST  JSON-RPC 2.0 调用
//! - /api/progress/{task_id}  GET   任务快照
//! - /ws/progress/{task_id}   WS    任务快照推送，直到终态
//! - /api/ping                GET   健康检查（不鉴权）

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use super::handlers;
use super::middleware::api_key_middleware;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    let protected = Router::new()
        .route("/jsonrpc", post(handlers::jsonrpc))
        .route("/api/progress/:task_id", get(handlers::get_progress))
        .route("/ws/progress/:task_id", get(handlers::progress_websocket))
        .route_layer(middleware::from_fn_with_state(state, api_key_middleware));

    Router::new()
        .route("/api/ping", get(handlers::ping))
        .merge(protected)
}
