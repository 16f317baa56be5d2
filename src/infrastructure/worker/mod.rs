//! Worker Layer - Background Maintenance
//!
//! 空闲会话回收与终态任务回收，均随 shutdown token 停止

mod progress_gc;
mod session_sweeper;

pub use progress_gc::{ProgressGc, ProgressGcConfig};
pub use session_sweeper::{SessionSweeper, SessionSweeperConfig};
