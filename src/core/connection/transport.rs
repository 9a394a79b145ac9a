//! Socket seam. The manager only ever talks to [`Connector`] and
//! [`EventSocket`]; production uses [`WsConnector`].

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

/// Application-initiated close. Anything else is treated as abnormal.
pub const NORMAL_CLOSURE: u16 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open {url}: {reason}")]
    Open { url: String, reason: String },
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Peer closed. `code` is `None` when the stream ended without a close frame.
    Closed { code: Option<u16>, reason: String },
}

#[async_trait]
pub trait EventSocket: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;
    async fn next_frame(&mut self) -> Result<Frame, TransportError>;
    /// Close with [`NORMAL_CLOSURE`].
    async fn close(&mut self);
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn open(&self, url: &str) -> Result<Box<dyn EventSocket>, TransportError>;
}

/// WebSocket transport over tokio-tungstenite.
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, url: &str) -> Result<Box<dyn EventSocket>, TransportError> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| TransportError::Open {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        debug!("WebSocket handshake completed: {}", response.status());
        Ok(Box::new(WsSocket { stream }))
    }
}

struct WsSocket {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl EventSocket for WsSocket {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn next_frame(&mut self) -> Result<Frame, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Frame::Text(text)),
                Some(Ok(Message::Binary(bytes))) => {
                    // Some proxies re-frame text as binary.
                    if let Ok(text) = String::from_utf8(bytes) {
                        return Ok(Frame::Text(text));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    return Ok(match frame {
                        Some(frame) => Frame::Closed {
                            code: Some(u16::from(frame.code)),
                            reason: frame.reason.into_owned(),
                        },
                        None => Frame::Closed {
                            code: None,
                            reason: String::new(),
                        },
                    });
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
                None => {
                    return Ok(Frame::Closed {
                        code: None,
                        reason: "stream ended".to_string(),
                    });
                }
            }
        }
    }

    async fn close(&mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "client disconnect".into(),
        };
        if let Err(e) = self.stream.close(Some(frame)).await {
            debug!("Close handshake failed: {}", e);
        }
    }
}
