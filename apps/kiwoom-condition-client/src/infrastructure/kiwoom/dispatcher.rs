//! Message Dispatcher
//!
//! The single reader of a session's transport. Every inbound frame is
//! classified by its `trnm` tag, strictly in arrival order:
//!
//! | Tag       | Action                                                       |
//! |-----------|--------------------------------------------------------------|
//! | `LOGIN`   | Filed under `LOGIN`; a rejection also closes the session.    |
//! | `PING`    | Echoed back as the identical text, never filed.              |
//! | `CNSRREQ` | Filed in the search mailbox under its `seq`.                 |
//! | other     | Filed in the response mailbox under its tag.                 |
//!
//! The loop ends when the transport closes, the session cancels it, the
//! login is rejected, or a frame cannot be decoded.
//!
//! Keepalive echoes are replies, not requests. They are exempt from the
//! login-first rule and go out in any session state, including while the
//! login acknowledgement is still pending.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use super::auth::check_login;
use super::codec::{FrameCodec, InboundFrame};
use super::connection::FrameSource;
use super::messages::{LoginAck, MessageKind};
use super::session::SessionContext;
use crate::infrastructure::metrics;

/// Why the dispatcher stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchExit {
    /// The session cancelled the loop.
    Cancelled,
    /// The gateway closed the transport.
    Closed,
    /// The gateway rejected the login.
    LoginRejected {
        /// Login return code.
        code: i64,
    },
    /// Transport or decode failure.
    Failed(String),
}

impl DispatchExit {
    /// Whether the loop ended without a failure.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Closed)
    }
}

/// Reader loop for one session.
pub struct MessageDispatcher {
    ctx: Arc<SessionContext>,
    source: FrameSource,
    codec: FrameCodec,
}

impl MessageDispatcher {
    /// Create a dispatcher over the session's read half.
    #[must_use]
    pub fn new(ctx: Arc<SessionContext>, source: FrameSource) -> Self {
        Self {
            ctx,
            source,
            codec: FrameCodec::new(),
        }
    }

    /// Run until the transport closes, the session cancels, or a fatal frame.
    pub async fn run(mut self) -> DispatchExit {
        let exit = self.read_loop().await;

        if exit != DispatchExit::Cancelled {
            self.ctx.state.begin_closing();
            // Wakes callers still waiting on this session.
            self.ctx.cancel.cancel();
        }

        match &exit {
            DispatchExit::Failed(reason) => {
                tracing::warn!(reason = %reason, "Dispatcher stopped on failure");
            }
            other => tracing::debug!(exit = ?other, "Dispatcher stopped"),
        }
        exit
    }

    async fn read_loop(&mut self) -> DispatchExit {
        loop {
            let msg = tokio::select! {
                () = self.ctx.cancel.cancelled() => return DispatchExit::Cancelled,
                msg = self.source.next() => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => {
                    if let Some(exit) = self.handle_text(text.as_str()).await {
                        return exit;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    self.ctx.keepalive.record_inbound();
                    if let Err(e) = self.ctx.connection.send_pong(data).await {
                        metrics::record_websocket_error("pong");
                        return DispatchExit::Failed(format!("pong failed: {e}"));
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    tracing::info!("Gateway sent close frame");
                    return DispatchExit::Closed;
                }
                Some(Ok(_)) => {
                    // Binary and pong frames carry nothing for this protocol.
                }
                Some(Err(e)) => {
                    metrics::record_websocket_error("read");
                    return DispatchExit::Failed(e.to_string());
                }
                None => {
                    tracing::debug!("WebSocket stream ended");
                    return DispatchExit::Closed;
                }
            }
        }
    }

    async fn handle_text(&self, text: &str) -> Option<DispatchExit> {
        self.ctx.keepalive.record_inbound();

        let frame = match self.codec.decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                metrics::record_websocket_error("decode");
                return Some(DispatchExit::Failed(format!("undecodable frame: {e}")));
            }
        };
        metrics::record_frame_received(&frame.kind);

        match frame.kind {
            MessageKind::Login => self.handle_login(frame).await,
            MessageKind::Ping => self.echo_keepalive(frame).await,
            MessageKind::ConditionSearch => {
                self.file_search(frame);
                None
            }
            _ => {
                let kind = frame.kind.clone();
                let outcome = self.ctx.responses.put(kind.clone(), frame);
                tracing::debug!(kind = %kind, outcome = ?outcome, "Response filed");
                None
            }
        }
    }

    async fn handle_login(&self, frame: InboundFrame) -> Option<DispatchExit> {
        let (code, verdict) = match frame.parse::<LoginAck>() {
            Ok(ack) => (
                ack.status.return_code,
                check_login(&ack).map_err(|e| e.to_string()),
            ),
            Err(e) => (-1, Err(e.to_string())),
        };

        // Filed before any teardown so the opener sees the verdict.
        self.ctx.responses.put(MessageKind::Login, frame);
        metrics::record_login(verdict.is_ok());

        match verdict {
            Ok(()) => {
                tracing::debug!("Login accepted");
                None
            }
            Err(reason) => {
                tracing::warn!(code, reason = %reason, "Login rejected, closing session");
                self.ctx.state.begin_closing();
                self.ctx.connection.disconnect().await;
                Some(DispatchExit::LoginRejected { code })
            }
        }
    }

    /// Echo a `PING` unchanged, whatever the session state.
    async fn echo_keepalive(&self, frame: InboundFrame) -> Option<DispatchExit> {
        self.ctx.keepalive.record_keepalive();

        if let Err(e) = self.ctx.connection.reply_text(frame.text).await {
            metrics::record_websocket_error("keepalive_echo");
            return Some(DispatchExit::Failed(format!("keepalive echo failed: {e}")));
        }

        self.ctx.keepalive.record_echo();
        metrics::record_keepalive_echo();
        tracing::trace!("Keepalive echoed");
        None
    }

    fn file_search(&self, frame: InboundFrame) {
        let Some(key) = frame.correlation_key() else {
            tracing::warn!(
                return_code = ?frame.return_code(),
                "Search response without seq dropped"
            );
            return;
        };

        let outcome = self.ctx.searches.put(key.clone(), frame);
        tracing::debug!(condition_id = %key, outcome = ?outcome, "Search response filed");
    }
}
