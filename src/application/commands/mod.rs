//! 应用层 - 命令（写操作）
//!
//! CQRS 命令侧：处理所有写操作

mod batch_commands;
mod operation_commands;
mod session_commands;
mod task_commands;

pub mod handlers;

pub use batch_commands::*;
pub use operation_commands::*;
pub use session_commands::*;
pub use task_commands::*;
