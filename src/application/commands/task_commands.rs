//! Task Commands - 任务控制

/// 请求取消任务
#[derive(Debug, Clone)]
pub struct CancelTaskCommand {
    pub task_id: String,
}

/// 取消响应；任务已结束时 `cancelled` 为 false
#[derive(Debug, Clone)]
pub struct CancelTaskResponse {
    pub task_id: String,
    pub cancelled: bool,
}
