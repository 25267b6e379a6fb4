//! Message-oriented transports carrying encoded wire frames
//!
//! A connection is split into a sink (owned by the session actor) and a
//! source (drained by the session's receive loop task).

use async_trait::async_trait;

use crate::error::TransportError;

pub mod memory;
pub mod websocket;

pub use memory::{MemoryConnector, MemoryPeer};
pub use websocket::WebSocketConnector;

/// One encoded message
pub type Frame = Vec<u8>;

/// Sending half of a connection
#[async_trait]
pub trait FrameSink: Send {
    /// Send one frame
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Cancel the connection. Idempotent.
    async fn close(&mut self);
}

/// Receiving half of a connection
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, `None` once the peer closed the connection
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>>;
}

/// Opened connection halves
pub type Connection = (Box<dyn FrameSink>, Box<dyn FrameSource>);

/// Opens connections to endpoints
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Connection, TransportError>;
}
