// Socket transport
//
// The connection manager sees a socket as a sequence of tagged events
// (message, error, closed). An error is always followed by a close, matching
// WebSocket semantics, so only the close drives reconnection.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{Result, StreamError};

/// Event produced by an open connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text payload from the server
    Message(String),
    /// Socket-level failure; a `Closed` follows
    Error(String),
    /// Socket closed, by either side or by failure
    Closed,
}

/// An open socket
#[async_trait]
pub trait Connection: Send {
    /// Wait for the next event. Returns `Closed` forever once closed.
    async fn recv(&mut self) -> TransportEvent;

    /// Close the socket. Idempotent.
    async fn close(&mut self);
}

/// Factory for connections
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a socket to `url`; a failed handshake is an error
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>>;
}

/// WebSocket transport
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>> {
        debug!(host = url.host_str().unwrap_or_default(), "Opening WebSocket");
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::transport(e.to_string()))?;
        info!(status = %response.status(), "WebSocket handshake complete");

        Ok(Box::new(WsConnection {
            stream,
            closed: false,
        }))
    }
}

/// Upper bound on the close handshake; a stalled peer must not block teardown
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct WsConnection {
    stream: WsStream,
    closed: bool,
}

#[async_trait]
impl Connection for WsConnection {
    async fn recv(&mut self) -> TransportEvent {
        if self.closed {
            return TransportEvent::Closed;
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return TransportEvent::Message(text.to_string()),
                Some(Ok(Message::Binary(bytes))) => {
                    return TransportEvent::Message(String::from_utf8_lossy(&bytes).into_owned())
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "Server closed WebSocket");
                    self.closed = true;
                    return TransportEvent::Closed;
                }
                // Ping/pong are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.closed = true;
                    return TransportEvent::Error(e.to_string());
                }
                None => {
                    self.closed = true;
                    return TransportEvent::Closed;
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        close_within(self.stream.close(None), CLOSE_TIMEOUT).await;
    }
}

/// Run a close handshake for at most `limit`. Returns false if it timed out.
async fn close_within<F, E>(close: F, limit: Duration) -> bool
where
    F: Future<Output = std::result::Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(limit, close).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            debug!(error = %e, "WebSocket close handshake failed");
            true
        }
        Err(_) => {
            warn!(
                timeout_ms = limit.as_millis() as u64,
                "WebSocket close handshake timed out, dropping socket"
            );
            false
        }
    }
}
