//! Memory Layer - In-Memory State Management
//!
//! 实现 SessionStore 和 ProgressTracker，管理编辑会话和任务进度的内存状态

mod progress_tracker;
mod session_store;

pub use progress_tracker::InMemoryProgressTracker;
pub use session_store::InMemorySessionStore;

/// 128 位随机令牌（32 位十六进制）
pub(crate) fn new_token() -> String {
    format!("{:032x}", rand::random::<u128>())
}
