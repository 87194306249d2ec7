//! Connection Manager
//!
//! Owns the WebSocket transport for one session and performs the login
//! handshake. The read half is handed to the dispatcher; the write half
//! stays here behind an async mutex so the dispatcher (keepalive echoes) and
//! the caller (requests) can both write.
//!
//! `connect()` sends the login frame but does not wait for the
//! acknowledgement; that arrives through the dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::auth::AccessToken;
use super::codec::{CodecError, FrameCodec};
use super::messages::MessageKind;
use crate::infrastructure::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the gateway connection.
pub type FrameSink = SplitSink<WsStream, Message>;

/// Read half of the gateway connection.
pub type FrameSource = SplitStream<WsStream>;

/// Default time allowed to open the transport.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Error Type
// =============================================================================

/// Transport errors.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Opening the transport took too long.
    #[error("WebSocket connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The transport is not open.
    #[error("not connected")]
    NotConnected,
}

// =============================================================================
// Connection Manager
// =============================================================================

/// Clears the running flag when dropped, whatever path the close took.
struct RunningReset<'a>(&'a AtomicBool);

impl Drop for RunningReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owner of the gateway transport and the login handshake.
pub struct ConnectionManager {
    url: String,
    token: AccessToken,
    connect_timeout: Duration,
    codec: FrameCodec,
    sink: tokio::sync::Mutex<Option<FrameSink>>,
    source: parking_lot::Mutex<Option<FrameSource>>,
    running: AtomicBool,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.url)
            .field("token", &self.token)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager for `url`; nothing is opened yet.
    #[must_use]
    pub fn new(url: impl Into<String>, token: AccessToken, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            token,
            connect_timeout,
            codec: FrameCodec::new(),
            sink: tokio::sync::Mutex::new(None),
            source: parking_lot::Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Gateway URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the transport is open.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Open the transport and send the login frame.
    ///
    /// Does nothing if already connected.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be opened in time or the
    /// login frame cannot be written.
    pub async fn connect(&self) -> Result<(), ConnectionError> {
        let mut sink = self.sink.lock().await;
        if sink.is_some() {
            return Ok(());
        }

        tracing::debug!(url = %self.url, "Connecting to gateway");

        let (ws_stream, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(&self.url))
                .await
                .map_err(|_| ConnectionError::ConnectTimeout(self.connect_timeout))??;

        let (mut write, read) = ws_stream.split();

        let login = self.codec.encode(&self.token.login_request())?;
        write.send(Message::Text(login.into())).await.map_err(|e| {
            ConnectionError::ConnectionFailed(format!("failed to send login: {e}"))
        })?;
        metrics::record_request_sent(&MessageKind::Login);

        *self.source.lock() = Some(read);
        *sink = Some(write);
        self.running.store(true, Ordering::SeqCst);

        tracing::debug!(url = %self.url, "Gateway connected, login sent");
        Ok(())
    }

    /// Hand the read half to a dispatcher. Returns `None` if not connected
    /// or already taken.
    #[must_use]
    pub fn take_source(&self) -> Option<FrameSource> {
        self.source.lock().take()
    }

    /// Serialize `frame` and send it, connecting first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding, connecting or writing fails.
    pub async fn send<T: Serialize + Sync>(&self, frame: &T) -> Result<(), ConnectionError> {
        let text = self.codec.encode(frame)?;
        self.send_text(text).await
    }

    /// Send a raw text frame, connecting first if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if connecting or writing fails.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), ConnectionError> {
        if !self.is_running() {
            self.connect().await?;
        }
        self.reply_text(text).await
    }

    /// Write a raw text frame on the open transport without connecting.
    ///
    /// Used for replies (keepalive echoes), which must never reopen a
    /// connection that is shutting down.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectionError::NotConnected`] if the transport is closed,
    /// or the write error.
    pub async fn reply_text(&self, text: impl Into<String>) -> Result<(), ConnectionError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(ConnectionError::NotConnected)?;
        sink.send(Message::Text(text.into().into())).await?;
        Ok(())
    }

    /// Send a WebSocket-level pong.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is closed or the write fails.
    pub async fn send_pong(&self, payload: Bytes) -> Result<(), ConnectionError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(ConnectionError::NotConnected)?;
        sink.send(Message::Pong(payload)).await?;
        Ok(())
    }

    /// Close the transport. Idempotent; the running flag is cleared on every
    /// path, including a failed close handshake.
    pub async fn disconnect(&self) {
        let _reset = RunningReset(&self.running);

        let sink = self.sink.lock().await.take();
        self.source.lock().take();

        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                tracing::debug!(error = %e, "Close handshake failed");
            } else {
                tracing::debug!(url = %self.url, "Gateway connection closed");
            }
        }
    }
}
