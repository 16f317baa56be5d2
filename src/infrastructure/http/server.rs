//! HTTP Server
//!
//! Axum HTTP 服务器启动和配置

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::Router;
use http::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use super::middleware::{error_logging_middleware, API_KEY_HEADER};
use super::routes::create_routes;
use super::state::AppState;

/// 服务器配置
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// HTTP 服务器
pub struct HttpServer {
    config: ServerConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// 构建 Router
    pub fn build_router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers([AUTHORIZATION, CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)])
            .expose_headers(Any)
            .max_age(std::time::Duration::from_secs(3600));

        // 图像以 base64 放在请求体中
        create_routes(self.state.clone())
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(middleware::from_fn(error_logging_middleware))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// 启动服务器（带优雅关闭）
    pub async fn run_with_shutdown<F>(self, shutdown_signal: F) -> Result<(), std::io::Error>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.build_router();
        let addr = self.config.addr();

        info!("Starting HTTP server on {}", addr);

        let listener = TcpListener::bind(&addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tokio_util::sync::CancellationToken;
    use tower::util::ServiceExt;

    use crate::application::BusyPolicy;
    use crate::infrastructure::adapters::model::LocalModelBackend;
    use crate::infrastructure::adapters::transforms::standard_registry;
    use crate::infrastructure::http::state::AuthSettings;
    use crate::infrastructure::memory::{InMemoryProgressTracker, InMemorySessionStore};
    use crate::infrastructure::rpc::{RpcDispatcher, RpcServices, RpcTimeouts};

    fn router(auth: AuthSettings) -> Router {
        let registry = standard_registry(Arc::new(LocalModelBackend::new()), Vec::new()).unwrap();
        let services = RpcServices::new(
            InMemorySessionStore::new().arc(),
            InMemoryProgressTracker::new().arc(),
            Arc::new(registry),
            Vec::new(),
            BusyPolicy::Wait,
        );
        let dispatcher =
            RpcDispatcher::new(Arc::new(services), RpcTimeouts::default(), CancellationToken::new()).unwrap();
        HttpServer::new(ServerConfig::default(), AppState::new(Arc::new(dispatcher), auth)).build_router()
    }

    fn rpc_request(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/jsonrpc")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let response = router(AuthSettings::disabled())
            .oneshot(Request::builder().uri("/api/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_jsonrpc_roundtrip() {
        let response = router(AuthSettings::disabled())
            .oneshot(rpc_request(r#"{"jsonrpc":"2.0","id":"a1","method":"create_session","params":{"width":3,"height":2}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["id"], "a1");
        assert_eq!(body["result"]["canvas"]["width"], 3);
    }

    #[tokio::test]
    async fn test_jsonrpc_parse_error_is_enveloped() {
        let response = router(AuthSettings::disabled())
            .oneshot(rpc_request("{oops"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["id"], Value::Null);
        assert_eq!(body["error"]["code"], -32700);
    }

    #[tokio::test]
    async fn test_progress_not_found() {
        let response = router(AuthSettings::disabled())
            .oneshot(Request::builder().uri("/api/progress/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["errno"], 404);
    }

    #[tokio::test]
    async fn test_api_key_required() {
        let auth = AuthSettings::new(true, vec!["secret".to_string()]);
        let app = router(auth);
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}).to_string();

        let response = app.clone().oneshot(rpc_request(&body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = rpc_request(&body);
        request.headers_mut().insert(API_KEY_HEADER, "wrong".parse().unwrap());
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let mut request = rpc_request(&body);
        request.headers_mut().insert(API_KEY_HEADER, "secret".parse().unwrap());
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(Request::builder().uri("/api/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
