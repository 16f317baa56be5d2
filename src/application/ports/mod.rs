//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod model_backend;
mod progress_tracker;
mod session_store;
mod transform;

pub use model_backend::{ModelBackendPort, ModelError, ModelKind, ModelRequest, ModelResponse};
pub use progress_tracker::{
    ProgressError, ProgressReporter, ProgressTrackerPort, TaskFailure, TaskOutcome, TaskSnapshot,
    TaskStatus,
};
pub use session_store::{
    BusyPolicy, SessionActivity, SessionCell, SessionError, SessionInfo, SessionLease,
    SessionStorePort,
};
pub use transform::{
    BinaryOutput, Transform, TransformError, TransformInput, TransformKind, TransformOutcome,
    TransformParams,
};
