//! Query Handlers 实现
//!
//! 所有 QueryHandler 的具体实现

mod catalog_handlers;
mod session_handlers;
mod task_handlers;

pub use catalog_handlers::*;
pub use session_handlers::*;
pub use task_handlers::*;
