//! Infrastructure Layer - 基础设施层
//!
//! 提供所有端口的具体实现与对外传输

pub mod adapters;
pub mod http;
pub mod memory;
pub mod rpc;
pub mod socket;
pub mod worker;

pub use memory::{InMemoryProgressTracker, InMemorySessionStore};
pub use rpc::{RpcDispatcher, RpcServices};
pub use socket::{SocketServer, SocketServerConfig};
pub use worker::{ProgressGc, ProgressGcConfig, SessionSweeper, SessionSweeperConfig};
