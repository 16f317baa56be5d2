//! JSON-RPC Handler
//!
//! 请求体按原文交给分发器，解析错误也以 JSON-RPC 错误回复。

use std::sync::Arc;

use axum::{
    extract::State,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};

use crate::infrastructure::http::state::AppState;

pub async fn jsonrpc(State(state): State<Arc<AppState>>, body: String) -> Response {
    let reply = state.dispatcher.handle_text(&body).await;
    ([(CONTENT_TYPE, "application/json")], reply.to_json()).into_response()
}
