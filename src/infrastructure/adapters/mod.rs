//! Infrastructure Adapters
//!
//! 六边形架构的适配器实现

pub mod model;
pub mod transforms;

pub use model::{HttpModelClient, HttpModelClientConfig, LocalModelBackend};
pub use transforms::standard_registry;
