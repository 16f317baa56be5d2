//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - Canvas Context: 图层画布、合成与编解码
//! - Session Context: 编辑状态与变更

pub mod canvas;
pub mod session;
