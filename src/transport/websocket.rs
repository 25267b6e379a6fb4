//! WebSocket transport (tokio-tungstenite)

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, trace};

use super::{Connection, Connector, Frame, FrameSink, FrameSource};
use crate::error::TransportError;

/// Sending half of a WebSocket
pub struct WsSink<S> {
    inner: SplitSink<WebSocketStream<S>, Message>,
    closed: bool,
}

/// Receiving half of a WebSocket
pub struct WsSource<S> {
    inner: SplitStream<WebSocketStream<S>>,
}

/// Split an established WebSocket into frame halves
pub fn split<S>(ws: WebSocketStream<S>) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, source) = ws.split();
    (
        Box::new(WsSink {
            inner: sink,
            closed: false,
        }),
        Box::new(WsSource { inner: source }),
    )
}

#[async_trait]
impl<S> FrameSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        // JSON frames go out as text so they stay readable in a sniffer
        let message = match String::from_utf8(frame) {
            Ok(text) => Message::Text(text),
            Err(e) => Message::Binary(e.into_bytes()),
        };
        self.inner
            .send(message)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.inner.close().await {
            debug!("WebSocket close: {}", e);
        }
    }
}

#[async_trait]
impl<S> FrameSource for WsSource<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn next_frame(&mut self) -> Option<Result<Frame, TransportError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.into_bytes())),
                Ok(Message::Binary(bytes)) => return Some(Ok(bytes)),
                Ok(Message::Close(frame)) => {
                    trace!("WebSocket close frame: {:?}", frame);
                    return None;
                }
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None
                }
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }
}

/// Connects to `ws://` endpoints
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, endpoint: &str) -> Result<Connection, TransportError> {
        let (ws, _response) = tokio_tungstenite::connect_async(endpoint)
            .await
            .map_err(|e| TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        info!("WebSocket connected to {}", endpoint);
        Ok(split(ws))
    }
}

/// Complete the server side handshake on an accepted socket
pub async fn accept(stream: TcpStream) -> Result<Connection, TransportError> {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let ws = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| TransportError::Connect {
            endpoint: peer.clone(),
            reason: e.to_string(),
        })?;
    debug!("Accepted WebSocket from {}", peer);
    Ok(split(ws))
}
