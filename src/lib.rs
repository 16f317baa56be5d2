//! Atelier - AI 图像编辑编排核心
//!
//! 架构设计: CQRS + Hexagonal Architecture
//!
//! 领域层 (domain/):
//! - Canvas Context: 图层画布、混合模式、合成与编解码
//! - Session Context: 编辑状态、撤销检查点与变更
//!
//! 应用层 (application/):
//! - Ports: 端口定义（SessionStore, ProgressTracker, Transform, ModelBackend）
//! - Registry: 变换注册表
//! - Commands: 批量执行（Command Executor）、会话、单次 AI 操作、任务取消
//! - Queries: 会话、进度、目录查询
//!
//! 基础设施层 (infrastructure/):
//! - RPC: JSON-RPC 2.0 信封与分发器
//! - HTTP: /jsonrpc + WebSocket 进度推送
//! - Socket: 行分隔 JSON-RPC over TCP
//! - Memory: SessionStore, ProgressTracker 内存实现
//! - Worker: 空闲会话回收、终态任务回收
//! - Adapters: 内置图像变换、AI 模型变换与模型后端

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::{load_config, AppConfig};
