//! Command Handlers 实现
//!
//! 所有 CommandHandler 的具体实现

mod batch_handlers;
mod operation_handlers;
mod session_command_handlers;
mod task_command_handlers;

pub use batch_handlers::*;
pub use operation_handlers::*;
pub use session_command_handlers::*;
pub use task_command_handlers::*;
