//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（SessionStore、ProgressTracker、Transform、ModelBackend）
//! - registry: 变换注册表
//! - commands: CQRS 命令及处理器（批量执行、会话、单次 AI 操作、任务取消）
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod ports;
pub mod queries;
pub mod registry;

// Re-exports
pub use commands::{
    // Batch commands
    BatchResult,
    Command,
    CommandFailure,
    CommandOutcome,
    CommandSuccess,
    ExecuteBatchCommand,
    InputRef,
    // Session commands
    CloseSessionCommand,
    CloseSessionResponse,
    CreateSessionCommand,
    CreateSessionResponse,
    // Operation commands
    RunModelOperationCommand,
    RunModelOperationResponse,
    // Task commands
    CancelTaskCommand,
    CancelTaskResponse,
    // Handlers
    handlers::{
        CancelTaskHandler, CloseSessionHandler, CommandExecutor, CreateSessionHandler,
        RunModelOperationHandler,
    },
};

pub use error::{ApplicationError, ErrorKind};

pub use ports::{
    // Session store
    BusyPolicy,
    SessionError,
    SessionLease,
    SessionStorePort,
    // Progress tracker
    ProgressError,
    ProgressReporter,
    ProgressTrackerPort,
    TaskOutcome,
    TaskSnapshot,
    TaskStatus,
    // Transform
    Transform,
    TransformError,
    TransformInput,
    TransformOutcome,
    TransformParams,
    // Model backend
    ModelBackendPort,
    ModelError,
    ModelKind,
};

pub use queries::{
    GetProgressQuery,
    GetSessionQuery,
    GetSessionResponse,
    ListOperationsQuery,
    ListStylesQuery,
    // Handlers
    handlers::{GetProgressHandler, GetSessionHandler, ListOperationsHandler, ListStylesHandler},
};

pub use registry::{OperationDescriptor, RegistryError, TransformRegistry};
