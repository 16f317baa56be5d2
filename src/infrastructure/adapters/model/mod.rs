//! Model Adapter - AI 模型后端实现

mod http_model_client;
mod local_model_backend;

pub use http_model_client::{HttpModelClient, HttpModelClientConfig};
pub use local_model_backend::{LocalModelBackend, DEFAULT_STYLES};
