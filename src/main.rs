//! Atelier - AI 图像编辑编排服务
//!
//! 启动顺序：配置 → 日志 → 端口实现 → 变换注册表 → RPC 分发器 → 传输与后台 worker

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use atelier::application::{ModelBackendPort, SessionStorePort};
use atelier::config::{load_config_from_path, print_config, AppConfig, ModelBackendKind};
use atelier::infrastructure::adapters::{
    standard_registry, HttpModelClient, HttpModelClientConfig, LocalModelBackend,
};
use atelier::infrastructure::http::{AppState, AuthSettings, HttpServer, ServerConfig};
use atelier::infrastructure::memory::{InMemoryProgressTracker, InMemorySessionStore};
use atelier::infrastructure::rpc::{RpcDispatcher, RpcServices, RpcTimeouts};
use atelier::infrastructure::socket::{SocketServer, SocketServerConfig};
use atelier::infrastructure::worker::{
    ProgressGc, ProgressGcConfig, SessionSweeper, SessionSweeperConfig,
};

/// 解析 `--config <path>`
fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

fn init_tracing(config: &AppConfig) {
    let log_filter = format!(
        "{},atelier={},tower_http=debug",
        config.log.level, config.log.level
    );
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));

    if config.log.json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn model_backend(config: &AppConfig) -> anyhow::Result<Arc<dyn ModelBackendPort>> {
    Ok(match config.models.backend {
        ModelBackendKind::Http => {
            let client_config = HttpModelClientConfig {
                base_url: config.models.url.clone(),
                timeout_secs: config.models.timeout_secs,
            };
            Arc::new(HttpModelClient::new(client_config)?)
        }
        ModelBackendKind::Local => Arc::new(LocalModelBackend::new()),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config_path = config_path_from_args();
    let config = load_config_from_path(config_path.as_deref())
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    init_tracing(&config);

    tracing::info!("Atelier - AI image editing service v{}", env!("CARGO_PKG_VERSION"));
    print_config(&config);

    // 内存状态
    let session_store = InMemorySessionStore::new().arc();
    let progress_tracker = InMemoryProgressTracker::new().arc();

    // 变换注册表（启动时校验名称唯一）
    let backend = model_backend(&config)?;
    let registry = Arc::new(standard_registry(backend, config.models.styles.clone())?);
    tracing::info!(operations = registry.len(), "Transform registry ready");

    let services = Arc::new(RpcServices::new(
        session_store.clone(),
        progress_tracker.clone(),
        registry,
        config.models.styles.clone(),
        config.session.busy_policy,
    ));

    // shutdown 由 ctrl-c 或 RPC `shutdown` 触发
    let shutdown = CancellationToken::new();
    let timeouts = RpcTimeouts::new(
        Duration::from_secs(config.rpc.default_timeout_secs),
        Duration::from_secs(config.rpc.max_timeout_secs),
    );
    let dispatcher = Arc::new(RpcDispatcher::new(services, timeouts, shutdown.clone())?);

    // 后台 worker
    let sweeper = SessionSweeper::new(
        SessionSweeperConfig {
            idle_timeout: config.session.idle_timeout(),
            interval: config.session.sweep_interval(),
        },
        session_store.clone(),
    );
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown.clone()));

    let gc = ProgressGc::new(
        ProgressGcConfig {
            retention: config.progress.retention(),
            interval: config.progress.gc_interval(),
        },
        progress_tracker,
    );
    let gc_handle = tokio::spawn(gc.run(shutdown.clone()));

    // TCP socket 服务器
    let socket_handle = if config.socket.enabled {
        let socket_config = SocketServerConfig {
            host: config.socket.host.clone(),
            port: config.socket.port,
            max_line_bytes: config.server.max_body_bytes,
        };
        let socket_server = SocketServer::new(socket_config, dispatcher.clone());
        Some(tokio::spawn(socket_server.run_with_shutdown(shutdown.clone())))
    } else {
        None
    };

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Failed to listen for ctrl-c");
                    }
                    tracing::info!("Received shutdown signal");
                    shutdown.cancel();
                }
                _ = shutdown.cancelled() => {}
            }
        });
    }

    // HTTP 服务器
    let server_config = ServerConfig::new(&config.server.host, config.server.port)
        .with_max_body_bytes(config.server.max_body_bytes);
    let auth = AuthSettings::new(config.auth.enabled, config.auth.api_keys.clone());
    let server = HttpServer::new(server_config, AppState::new(dispatcher, auth));

    let http_shutdown = shutdown.clone();
    let served = server
        .run_with_shutdown(async move { http_shutdown.cancelled().await })
        .await;
    // HTTP 异常退出时同样停止其它组件
    shutdown.cancel();

    if let Some(handle) = socket_handle {
        match handle.await {
            Ok(Err(e)) => tracing::error!(error = %e, "Socket server failed"),
            Err(e) => tracing::error!(error = %e, "Socket server task panicked"),
            Ok(Ok(())) => {}
        }
    }
    let (sweeper, gc) = tokio::join!(sweeper_handle, gc_handle);
    for (worker, joined) in [("session sweeper", sweeper), ("progress gc", gc)] {
        if let Err(e) = joined {
            tracing::error!(worker, error = %e, "Background worker task failed");
        }
    }

    let closed = session_store.close_all().await;
    tracing::info!(closed, "Closed remaining sessions");
    served?;
    tracing::info!("Server shutdown complete");

    Ok(())
}
