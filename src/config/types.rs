//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::time::Duration;

use crate::application::BusyPolicy;

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// HTTP 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// TCP socket 配置
    #[serde(default)]
    pub socket: SocketConfig,

    /// 会话配置
    #[serde(default)]
    pub session: SessionConfig,

    /// 任务进度配置
    #[serde(default)]
    pub progress: ProgressConfig,

    /// RPC 调用配置
    #[serde(default)]
    pub rpc: RpcConfig,

    /// 模型后端配置
    #[serde(default)]
    pub models: ModelsConfig,

    /// 鉴权配置
    #[serde(default)]
    pub auth: AuthConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,

    /// 请求体上限（base64 图像较大）
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// TCP socket 配置
#[derive(Debug, Clone, Deserialize)]
pub struct SocketConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_socket_port")]
    pub port: u16,
}

fn default_true() -> bool {
    true
}

fn default_socket_port() -> u16 {
    9876
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_socket_port(),
        }
    }
}

/// 会话配置
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 空闲超时（秒）
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// 空闲扫描间隔（秒）
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// 会话被占用时：wait 或 fail_fast
    #[serde(default)]
    pub busy_policy: BusyPolicy,
}

fn default_idle_timeout() -> u64 {
    1800 // 30 分钟
}

fn default_sweep_interval() -> u64 {
    60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            busy_policy: BusyPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// 最短保留窗口（秒）
pub const MIN_RETENTION_SECS: u64 = 60;

/// 任务进度配置
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressConfig {
    /// 终态任务保留时长（秒）
    #[serde(default = "default_retention")]
    pub retention_secs: u64,

    /// 回收间隔（秒）
    #[serde(default = "default_gc_interval")]
    pub gc_interval_secs: u64,
}

fn default_retention() -> u64 {
    120
}

fn default_gc_interval() -> u64 {
    30
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention(),
            gc_interval_secs: default_gc_interval(),
        }
    }
}

impl ProgressConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }
}

/// RPC 调用配置
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// 未指定 timeout_ms 时的调用时限（秒）
    #[serde(default = "default_rpc_timeout")]
    pub default_timeout_secs: u64,

    /// 客户端 timeout_ms 的上限（秒）
    #[serde(default = "default_rpc_max_timeout")]
    pub max_timeout_secs: u64,
}

fn default_rpc_timeout() -> u64 {
    300
}

fn default_rpc_max_timeout() -> u64 {
    3600
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_rpc_timeout(),
            max_timeout_secs: default_rpc_max_timeout(),
        }
    }
}

/// 模型后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelBackendKind {
    Http,
    /// 进程内近似实现，开发与测试使用
    #[default]
    Local,
}

/// 模型后端配置
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    #[serde(default)]
    pub backend: ModelBackendKind,

    /// 模型服务基础 URL（backend = http 时必填）
    #[serde(default = "default_model_url")]
    pub url: String,

    /// 请求超时时间（秒）
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    /// 可用风格列表，为空时使用内置列表
    #[serde(default)]
    pub styles: Vec<String>,
}

fn default_model_url() -> String {
    "http://localhost:9000".to_string()
}

fn default_model_timeout() -> u64 {
    300
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackendKind::default(),
            url: default_model_url(),
            timeout_secs: default_model_timeout(),
            styles: Vec::new(),
        }
    }
}

/// 鉴权配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// 是否要求 X-API-Key
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub api_keys: Vec<String>,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
