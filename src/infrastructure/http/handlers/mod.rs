//! HTTP Handlers

mod ping;
mod progress;
mod rpc;
mod websocket;

pub use ping::*;
pub use progress::*;
pub use rpc::*;
pub use websocket::*;
