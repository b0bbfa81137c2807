//! Transport seam between the connection manager and the wire.
//!
//! The state machine in `connection.rs` only talks to these traits, so its
//! reconnect and teardown behavior is testable without a real server. The
//! production implementation rides on `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::events::{ClientMessage, ServerMessage};
use crate::error::SyncError;

/// Write half of an open gateway connection.
#[async_trait]
pub trait TransportSink: Send {
    async fn send(&mut self, msg: &ClientMessage) -> Result<(), SyncError>;
    async fn close(&mut self);
}

/// Read half of an open gateway connection. `None` means the remote closed.
#[async_trait]
pub trait TransportSource: Send {
    async fn next(&mut self) -> Option<Result<ServerMessage, SyncError>>;
}

/// Opens duplex connections to the gateway.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(
        &self,
        url: &str,
        session_id: &str,
    ) -> Result<(Box<dyn TransportSink>, Box<dyn TransportSource>), SyncError>;
}

/// Production transport over WebSocket.
pub struct WsTransport;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct WsSink {
    inner: futures_util::stream::SplitSink<WsStream, Message>,
}

struct WsSource {
    inner: futures_util::stream::SplitStream<WsStream>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn open(
        &self,
        url: &str,
        session_id: &str,
    ) -> Result<(Box<dyn TransportSink>, Box<dyn TransportSource>), SyncError> {
        // The session identifier is a connection parameter, per the gateway's
        // contract.
        let url = format!("{}?session_id={}", url.trim_end_matches('/'), session_id);
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        let (sink, source) = stream.split();
        Ok((
            Box::new(WsSink { inner: sink }),
            Box::new(WsSource { inner: source }),
        ))
    }
}

#[async_trait]
impl TransportSink for WsSink {
    async fn send(&mut self, msg: &ClientMessage) -> Result<(), SyncError> {
        let text = serde_json::to_string(msg)?;
        self.inner
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.inner.close().await;
    }
}

#[async_trait]
impl TransportSource for WsSource {
    async fn next(&mut self) -> Option<Result<ServerMessage, SyncError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(&text).map_err(SyncError::from));
                }
                Ok(Message::Close(_)) => return None,
                // Control frames keep the connection alive but carry nothing.
                Ok(_) => continue,
                Err(e) => return Some(Err(SyncError::Transport(e.to_string()))),
            }
        }
    }
}
