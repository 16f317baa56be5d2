//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::{AppConfig, ModelBackendKind, MIN_RETENTION_SECS};

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `ATELIER_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `ATELIER_SERVER__PORT=8080`
/// - `ATELIER_SESSION__IDLE_TIMEOUT_SECS=600`
/// - `ATELIER_MODELS__BACKEND=http`
/// - `ATELIER_AUTH__API_KEYS=key-a,key-b`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8000)?
        .set_default("server.max_body_bytes", 64 * 1024 * 1024)?
        .set_default("socket.enabled", true)?
        .set_default("socket.host", "127.0.0.1")?
        .set_default("socket.port", 9876)?
        .set_default("session.idle_timeout_secs", 1800)?
        .set_default("session.sweep_interval_secs", 60)?
        .set_default("session.busy_policy", "wait")?
        .set_default("progress.retention_secs", 120)?
        .set_default("progress.gc_interval_secs", 30)?
        .set_default("rpc.default_timeout_secs", 300)?
        .set_default("rpc.max_timeout_secs", 3600)?
        .set_default("models.backend", "local")?
        .set_default("models.url", "http://localhost:9000")?
        .set_default("models.timeout_secs", 300)?
        .set_default("auth.enabled", false)?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 例如: ATELIER_RPC__MAX_TIMEOUT_SECS=600
    // 列表字段以逗号分隔
    builder = builder.add_source(
        Environment::with_prefix("ATELIER")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("auth.api_keys")
            .with_list_parse_key("models.styles"),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

/// 验证配置有效性
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("Server port cannot be 0"));
    }
    if config.socket.enabled && config.socket.port == 0 {
        return Err(invalid("Socket port cannot be 0"));
    }
    if config.socket.enabled && config.socket.port == config.server.port && config.socket.host == config.server.host {
        return Err(invalid("Socket and HTTP server cannot share the same address"));
    }
    if config.server.max_body_bytes == 0 {
        return Err(invalid("Max body size cannot be 0"));
    }

    if config.session.idle_timeout_secs == 0 || config.session.sweep_interval_secs == 0 {
        return Err(invalid("Session idle timeout and sweep interval must be positive"));
    }

    if config.progress.retention_secs < MIN_RETENTION_SECS {
        return Err(invalid(format!(
            "Progress retention must be at least {} seconds",
            MIN_RETENTION_SECS
        )));
    }
    if config.progress.gc_interval_secs == 0 {
        return Err(invalid("Progress GC interval cannot be 0"));
    }

    if config.rpc.default_timeout_secs == 0 || config.rpc.max_timeout_secs == 0 {
        return Err(invalid("RPC timeouts must be positive"));
    }
    if config.rpc.default_timeout_secs > config.rpc.max_timeout_secs {
        return Err(invalid("RPC default timeout cannot exceed the max timeout"));
    }

    if config.models.backend == ModelBackendKind::Http && config.models.url.trim().is_empty() {
        return Err(invalid("Model URL cannot be empty with the http backend"));
    }
    if config.models.timeout_secs == 0 {
        return Err(invalid("Model timeout cannot be 0"));
    }

    if config.auth.enabled && config.auth.api_keys.iter().all(|k| k.trim().is_empty()) {
        return Err(invalid("Auth is enabled but no API keys are configured"));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("HTTP Server: {}", config.server.addr());
    if config.socket.enabled {
        tracing::info!("Socket Server: {}:{}", config.socket.host, config.socket.port);
    } else {
        tracing::info!("Socket Server: disabled");
    }
    tracing::info!(
        "Session: idle timeout {}s, sweep every {}s, busy policy {:?}",
        config.session.idle_timeout_secs,
        config.session.sweep_interval_secs,
        config.session.busy_policy
    );
    tracing::info!(
        "Progress: retention {}s, GC every {}s",
        config.progress.retention_secs,
        config.progress.gc_interval_secs
    );
    tracing::info!(
        "RPC Timeout: default {}s, max {}s",
        config.rpc.default_timeout_secs,
        config.rpc.max_timeout_secs
    );
    match config.models.backend {
        ModelBackendKind::Http => tracing::info!("Model Backend: http ({})", config.models.url),
        ModelBackendKind::Local => tracing::info!("Model Backend: local"),
    }
    // 不打印密钥本身
    tracing::info!(
        "Auth: {} ({} keys)",
        if config.auth.enabled { "enabled" } else { "disabled" },
        config.auth.api_keys.len()
    );
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}
