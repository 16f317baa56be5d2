//! Socket Layer - 基于 TCP 的行分隔 JSON-RPC
//!
//! 每行一个请求信封，响应按完成顺序写回（以 id 对应）。

mod server;

pub use server::{SocketServer, SocketServerConfig};
