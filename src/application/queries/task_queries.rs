//! Task Queries - 任务进度查询

/// 获取任务进度
#[derive(Debug, Clone)]
pub struct GetProgressQuery {
    pub task_id: String,
}
