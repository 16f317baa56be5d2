//! Socket Server
//!
//! 每个连接拆成读写两半：读取循环把每行交给分发器并发处理，
//! 写任务从 mpsc 队列取出已完成的响应写回。

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::application::ApplicationError;
use crate::infrastructure::rpc::{RpcDispatcher, RpcResponse};

/// 单个连接允许排队的响应数
const REPLY_QUEUE_SIZE: usize = 64;

/// Socket 服务器配置
#[derive(Debug, Clone)]
pub struct SocketServerConfig {
    pub host: String,
    pub port: u16,
    /// 单行最大字节数（超长行回复 InvalidRequest 后断开连接）
    pub max_line_bytes: usize,
}

impl Default for SocketServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9876,
            max_line_bytes: 64 * 1024 * 1024,
        }
    }
}

impl SocketServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TCP JSON-RPC 服务器
pub struct SocketServer {
    config: SocketServerConfig,
    dispatcher: Arc<RpcDispatcher>,
}

impl SocketServer {
    pub fn new(config: SocketServerConfig, dispatcher: Arc<RpcDispatcher>) -> Self {
        Self { config, dispatcher }
    }

    /// 绑定地址并运行，直到 shutdown 被取消
    pub async fn run_with_shutdown(self, shutdown: CancellationToken) -> Result<(), std::io::Error> {
        let addr = self.config.addr();
        let listener = TcpListener::bind(&addr).await?;
        tracing::info!("Starting socket server on {}", addr);
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// 在已绑定的 listener 上接受连接
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!(peer = %peer, "Socket client connected");
                        tokio::spawn(handle_connection(
                            stream,
                            peer,
                            self.dispatcher.clone(),
                            self.config.max_line_bytes,
                            shutdown.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept socket connection");
                    }
                },
            }
        }

        tracing::info!("Socket server stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: Arc<RpcDispatcher>,
    max_line_bytes: usize,
    shutdown: CancellationToken,
) {
    let framed = Framed::new(stream, LinesCodec::new_with_max_length(max_line_bytes));
    let (mut sink, mut lines) = framed.split();
    let (reply_tx, mut reply_rx) = mpsc::channel::<String>(REPLY_QUEUE_SIZE);

    let writer = tokio::spawn(async move {
        while let Some(reply) = reply_rx.recv().await {
            if let Err(e) = sink.send(reply).await {
                tracing::debug!(error = %e, "Socket write failed");
                break;
            }
        }
    });

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = lines.next() => next,
        };

        match next {
            Some(Ok(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let dispatcher = dispatcher.clone();
                let reply_tx = reply_tx.clone();
                tokio::spawn(async move {
                    let reply = dispatcher.handle_text(&line).await;
                    let _ = reply_tx.send(reply.to_json()).await;
                });
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                tracing::warn!(peer = %peer, limit = max_line_bytes, "Socket request line too long");
                let err = ApplicationError::InvalidRequest(format!(
                    "Request line exceeds {} bytes",
                    max_line_bytes
                ));
                let _ = reply_tx
                    .send(RpcResponse::failure(Value::Null, &err).to_json())
                    .await;
                break;
            }
            Some(Err(LinesCodecError::Io(e))) => {
                tracing::debug!(peer = %peer, error = %e, "Socket read failed");
                break;
            }
            None => break,
        }
    }

    // 等待在途请求的响应写完
    drop(reply_tx);
    let _ = writer.await;
    tracing::debug!(peer = %peer, "Socket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use crate::application::BusyPolicy;
    use crate::infrastructure::adapters::model::LocalModelBackend;
    use crate::infrastructure::adapters::transforms::standard_registry;
    use crate::infrastructure::memory::{InMemoryProgressTracker, InMemorySessionStore};
    use crate::infrastructure::rpc::{RpcServices, RpcTimeouts};

    async fn start(max_line_bytes: usize) -> (SocketAddr, CancellationToken) {
        let registry = standard_registry(Arc::new(LocalModelBackend::new()), Vec::new()).unwrap();
        let services = RpcServices::new(
            InMemorySessionStore::new().arc(),
            InMemoryProgressTracker::new().arc(),
            Arc::new(registry),
            Vec::new(),
            BusyPolicy::Wait,
        );
        let shutdown = CancellationToken::new();
        let dispatcher =
            RpcDispatcher::new(Arc::new(services), RpcTimeouts::default(), shutdown.clone()).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = SocketServerConfig {
            max_line_bytes,
            ..SocketServerConfig::default()
        };
        let server = SocketServer::new(config, Arc::new(dispatcher));
        tokio::spawn(server.serve(listener, shutdown.clone()));
        (addr, shutdown)
    }

    async fn connect(addr: SocketAddr) -> Framed<TcpStream, LinesCodec> {
        let stream = TcpStream::connect(addr).await.unwrap();
        Framed::new(stream, LinesCodec::new())
    }

    #[tokio::test]
    async fn test_pipelined_requests_are_matched_by_id() {
        let (addr, shutdown) = start(1024 * 1024).await;
        let mut client = connect(addr).await;

        client
            .send(r#"{"jsonrpc":"2.0","id":1,"method":"create_session","params":{"width":4,"height":4}}"#.to_string())
            .await
            .unwrap();
        client
            .send(r#"{"jsonrpc":"2.0","id":2,"method":"list_operations"}"#.to_string())
            .await
            .unwrap();
        client
            .send(r#"{"jsonrpc":"2.0","id":3,"method":"no_such_method"}"#.to_string())
            .await
            .unwrap();

        let mut replies = HashMap::new();
        for _ in 0..3 {
            let line = client.next().await.unwrap().unwrap();
            let reply: Value = serde_json::from_str(&line).unwrap();
            replies.insert(reply["id"].as_i64().unwrap(), reply);
        }

        assert!(replies[&1]["result"]["session_id"].is_string());
        assert!(replies[&2]["result"]["operations"].is_array());
        assert_eq!(replies[&3]["error"]["code"], -32601);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_malformed_and_oversized_lines() {
        let (addr, shutdown) = start(256).await;
        let mut client = connect(addr).await;

        client.send("not json".to_string()).await.unwrap();
        let reply: Value = serde_json::from_str(&client.next().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["error"]["code"], -32700);

        client
            .send(r#"{"jsonrpc":"2.0","id":"ok","method":"initialize"}"#.to_string())
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&client.next().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["id"], "ok");
        assert!(reply["result"]["methods"].is_array());

        client.send("x".repeat(1000)).await.unwrap();
        let reply: Value = serde_json::from_str(&client.next().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["error"]["code"], -32600);

        // 超长行之后服务端关闭连接
        assert!(!matches!(client.next().await, Some(Ok(_))));

        shutdown.cancel();
    }
}
