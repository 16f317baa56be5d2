//! WebSocket Handler - 任务进度推送
//!
//! 连接后立即推送当前快照，此后每次变化推送一次，终态推送后关闭。
//! 任务被回收（发送端销毁）时同样关闭连接。

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;

use crate::application::{ApplicationError, TaskSnapshot};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::state::AppState;

pub async fn progress_websocket(
    ws: WebSocketUpgrade,
    Path(task_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let rx = match state.progress_tracker.subscribe(&task_id) {
        Ok(rx) => rx,
        Err(e) => return ApiError::from(ApplicationError::from(e)).into_response(),
    };

    ws.on_upgrade(move |socket| stream_progress(socket, task_id, rx))
}

async fn stream_progress(socket: WebSocket, task_id: String, mut rx: watch::Receiver<TaskSnapshot>) {
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(task_id = %task_id, "Progress WebSocket connected");

    let mut pending = true;
    loop {
        if pending {
            let snapshot = rx.borrow_and_update().clone();
            let msg = match serde_json::to_string(&snapshot) {
                Ok(json) => Message::Text(json),
                Err(e) => {
                    tracing::error!(task_id = %task_id, error = %e, "Failed to serialize snapshot");
                    break;
                }
            };
            if let Err(e) = sender.send(msg).await {
                tracing::debug!(task_id = %task_id, error = %e, "Failed to send WebSocket message");
                break;
            }
            if snapshot.is_terminal() {
                break;
            }
            pending = false;
        }

        tokio::select! {
            changed = rx.changed() => match changed {
                Ok(()) => pending = true,
                Err(_) => {
                    tracing::debug!(task_id = %task_id, "Task evicted while streaming");
                    break;
                }
            },
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | None => {
                    tracing::info!(task_id = %task_id, "WebSocket closed by client");
                    break;
                }
                Some(Err(e)) => {
                    tracing::debug!(task_id = %task_id, error = %e, "WebSocket error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sender.close().await;
    tracing::info!(task_id = %task_id, "Progress WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use serde_json::Value;
    use tokio::net::TcpListener;
    use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
    use tokio_util::sync::CancellationToken;

    use crate::application::ports::TaskFailure;
    use crate::application::{BusyPolicy, ProgressTrackerPort, TaskOutcome, TaskStatus};
    use crate::infrastructure::adapters::model::LocalModelBackend;
    use crate::infrastructure::adapters::transforms::standard_registry;
    use crate::infrastructure::http::{AppState, AuthSettings, HttpServer, ServerConfig};
    use crate::infrastructure::memory::{InMemoryProgressTracker, InMemorySessionStore};
    use crate::infrastructure::rpc::{RpcDispatcher, RpcServices, RpcTimeouts};

    /// 在随机端口上启动完整路由，返回地址与追踪器
    async fn serve() -> (String, Arc<InMemoryProgressTracker>) {
        let tracker = InMemoryProgressTracker::new().arc();
        let registry = standard_registry(Arc::new(LocalModelBackend::new()), Vec::new()).unwrap();
        let services = RpcServices::new(
            InMemorySessionStore::new().arc(),
            tracker.clone(),
            Arc::new(registry),
            Vec::new(),
            BusyPolicy::Wait,
        );
        let dispatcher =
            RpcDispatcher::new(Arc::new(services), RpcTimeouts::default(), CancellationToken::new()).unwrap();
        let router = HttpServer::new(
            ServerConfig::default(),
            AppState::new(Arc::new(dispatcher), AuthSettings::disabled()),
        )
        .build_router();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (addr.to_string(), tracker)
    }

    fn snapshot(msg: WsMessage) -> Value {
        match msg {
            WsMessage::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stream_ends_after_terminal_snapshot() {
        let (addr, tracker) = serve().await;
        let task_id = tracker.begin(None).unwrap();

        let url = format!("ws://{}/ws/progress/{}", addr, task_id);
        let (mut ws, _) = connect_async(url).await.unwrap();

        let first = snapshot(ws.next().await.unwrap().unwrap());
        assert_eq!(first["task_id"], task_id.as_str());
        assert_eq!(first["status"], "initializing");

        tracker
            .update(&task_id, 0.5, TaskStatus::Running, Some("half way".to_string()))
            .unwrap();
        tracker
            .finish(&task_id, TaskOutcome::Completed(Some(serde_json::json!({"ok": true}))))
            .unwrap();

        // watch 通道可能合并中间快照，只检查顺序与终态
        let mut frames = Vec::new();
        let mut closed = false;
        while let Ok(Some(msg)) = tokio::time::timeout(Duration::from_secs(2), ws.next()).await {
            match msg {
                Ok(WsMessage::Close(_)) | Err(_) => {
                    closed = true;
                    break;
                }
                Ok(msg) => frames.push(snapshot(msg)),
            }
        }
        assert!(closed, "server did not close the stream");

        let last = frames.last().unwrap();
        assert_eq!(last["status"], "completed");
        assert_eq!(last["result"]["ok"], true);
        assert_eq!(
            frames.iter().filter(|f| f["status"] == "completed").count(),
            1,
            "frames after terminal snapshot: {:?}",
            frames
        );
        let progress: Vec<f64> = frames.iter().map(|f| f["progress"].as_f64().unwrap()).collect();
        assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
    }

    #[tokio::test]
    async fn test_terminal_task_sends_single_frame() {
        let (addr, tracker) = serve().await;
        let task_id = tracker.begin(None).unwrap();
        tracker
            .finish(&task_id, TaskOutcome::Failed(TaskFailure::cancelled()))
            .unwrap();

        let url = format!("ws://{}/ws/progress/{}", addr, task_id);
        let (mut ws, _) = connect_async(url).await.unwrap();

        let only = snapshot(ws.next().await.unwrap().unwrap());
        assert_eq!(only["status"], "error");
        assert!(!matches!(ws.next().await, Some(Ok(WsMessage::Text(_)))));
    }

    #[tokio::test]
    async fn test_unknown_task_is_rejected_before_upgrade() {
        let (addr, _) = serve().await;
        let url = format!("ws://{}/ws/progress/missing", addr);
        assert!(connect_async(url).await.is_err());
    }
}
