//! In-process transport over tokio channels
//!
//! Used to drive a session without a network, e.g. from tests or when the
//! target lives in the same process.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::mpsc;

use super::{Connection, Connector, Frame, FrameSink, FrameSource};
use crate::error::{TransportError, WireError};
use crate::wire::{self, WireMessage};

struct MemorySink {
    tx: Option<mpsc::UnboundedSender<Frame>>,
}

struct MemorySource {
    rx: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) {
        self.tx = None;
    }
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// The far end of an in-memory connection
pub struct MemoryPeer {
    tx: Option<mpsc::UnboundedSender<Frame>>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl MemoryPeer {
    /// Send a wire message to the connected session
    pub fn send(&self, message: &WireMessage) -> Result<(), TransportError> {
        let frame = wire::encode(message).map_err(|e| TransportError::Send(e.to_string()))?;
        self.send_raw(frame)
    }

    /// Send arbitrary bytes, bypassing the codec
    pub fn send_raw(&self, frame: Frame) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        tx.send(frame).map_err(|_| TransportError::Closed)
    }

    /// Wait for the next message, `None` once the session closed its side
    pub async fn recv(&mut self) -> Option<Result<WireMessage, WireError>> {
        let frame = self.rx.recv().await?;
        Some(wire::decode(&frame))
    }

    /// Next message if one is already queued
    pub fn try_recv(&mut self) -> Option<Result<WireMessage, WireError>> {
        let frame = self.rx.try_recv().ok()?;
        Some(wire::decode(&frame))
    }

    /// Close the peer's sending side, which the session observes as closure
    pub fn close(&mut self) {
        self.tx = None;
    }
}

/// Create two connected ends
pub fn pair() -> (Connection, MemoryPeer) {
    let (to_peer_tx, to_peer_rx) = mpsc::unbounded_channel();
    let (to_local_tx, to_local_rx) = mpsc::unbounded_channel();
    (
        (
            Box::new(MemorySink {
                tx: Some(to_peer_tx),
            }),
            Box::new(MemorySource { rx: to_local_rx }),
        ),
        MemoryPeer {
            tx: Some(to_local_tx),
            rx: to_peer_rx,
        },
    )
}

/// Connector handing out connections prepared with [`MemoryConnector::add_peer`]
#[derive(Default)]
pub struct MemoryConnector {
    pending: Mutex<VecDeque<Connection>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a connection for the next `connect` call and return its far end
    pub fn add_peer(&self) -> MemoryPeer {
        let (local, peer) = pair();
        self.pending.lock().push_back(local);
        peer
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &str) -> Result<Connection, TransportError> {
        self.pending
            .lock()
            .pop_front()
            .ok_or_else(|| TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: "no peer listening".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let ((mut sink, mut source), mut peer) = pair();

        sink.send_frame(wire::encode(&WireMessage::SessionEnd).unwrap())
            .await
            .unwrap();
        assert_eq!(peer.recv().await.unwrap().unwrap(), WireMessage::SessionEnd);

        peer.send(&WireMessage::ValueBatch { values: vec![] }).unwrap();
        let frame = source.next_frame().await.unwrap().unwrap();
        assert_eq!(
            wire::decode(&frame).unwrap(),
            WireMessage::ValueBatch { values: vec![] }
        );
    }

    #[tokio::test]
    async fn test_peer_close_ends_source() {
        let ((_sink, mut source), mut peer) = pair();
        peer.close();
        assert!(source.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn test_connector_without_peer_fails() {
        let connector = MemoryConnector::new();
        assert!(matches!(
            connector.connect("mem://nowhere").await,
            Err(TransportError::Connect { .. })
        ));

        let _peer = connector.add_peer();
        assert!(connector.connect("mem://here").await.is_ok());
    }
}
