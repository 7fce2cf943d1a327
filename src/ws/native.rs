//! Native live feed transport: `tokio-tungstenite`.
//!
//! Answers server pings, maps close frames to [`WsError::Closed`] and sends a
//! normal close on teardown. The ticker stream needs no subscribe message:
//! connecting starts the stream.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::WsError;
use crate::ws::{FeedConnection, FeedConnector, LiveFeedClient, LiveFeedConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector opening `ws://` / `wss://` connections.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl FeedConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn FeedConnection>, WsError> {
        let (stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| WsError::Timeout)?
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        Ok(Box::new(TungsteniteConnection { stream }))
    }
}

struct TungsteniteConnection {
    stream: WsStream,
}

#[async_trait]
impl FeedConnection for TungsteniteConnection {
    async fn next_frame(&mut self) -> Option<Result<String, WsError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Ping(data)) => {
                    if let Err(e) = self.stream.send(Message::Pong(data)).await {
                        return Some(Err(WsError::ProtocolError(e.to_string())));
                    }
                }
                Ok(Message::Close(frame)) => {
                    let (code, reason) = extract_close(frame.as_ref());
                    return Some(Err(WsError::Closed {
                        code: Some(code),
                        reason,
                    }));
                }
                Ok(_) => {} // Binary, Pong and raw frames
                Err(e) => return Some(Err(WsError::ConnectionFailed(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        let _ = self
            .stream
            .close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "Client disconnect".into(),
            }))
            .await;
    }
}

/// Extract close code and reason from an optional CloseFrame.
fn extract_close(frame: Option<&CloseFrame>) -> (u16, String) {
    match frame {
        Some(f) => (f.code.into(), f.reason.to_string()),
        None => (1006, "No close frame".into()),
    }
}

impl LiveFeedClient {
    /// Client backed by [`TungsteniteConnector`].
    pub fn native(config: LiveFeedConfig) -> Self {
        let connector = TungsteniteConnector::new(config.connect_timeout);
        LiveFeedClient::new(config, Arc::new(connector))
    }
}
