//! Session Context
//!
//! 编辑会话的可变状态与变更模型

mod mutation;
mod state;

pub use mutation::CanvasMutation;
pub use state::{EditingState, HistoryEntry};
