//! RPC Layer - JSON-RPC 2.0 分发
//!
//! HTTP 与 TCP 两种传输共用同一个分发器。

pub mod dispatcher;
pub mod dto;
pub mod envelope;
pub mod methods;
pub mod services;

pub use dispatcher::{RpcDispatcher, RpcTimeouts};
pub use envelope::{parse_request, RpcErrorObject, RpcRequest, RpcResponse};
pub use methods::{Method, MethodTable, MethodTableError};
pub use services::RpcServices;
